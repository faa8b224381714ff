use std::io::{self, IsTerminal, Write};
use std::sync::{Mutex, OnceLock};

/// The output mode: either normal output or completely quiet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Normal,
    Quiet,
}

/// Choices for whether to use colored output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// A simple shell abstraction for the CLI binary: verbosity, output mode,
/// and color choice. Not a logging facility — `tracing` owns that; this is
/// for the handful of direct-to-terminal messages a CLI needs regardless of
/// log level (banners, prompts, `verify-invoice` output).
#[derive(Debug)]
pub struct Shell {
    pub verbosity: u8,
    pub output_mode: OutputMode,
    pub color_choice: ColorChoice,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        Self {
            verbosity: 0,
            output_mode: OutputMode::Normal,
            color_choice: ColorChoice::Auto,
        }
    }

    pub fn print_out(&mut self, msg: &str) -> io::Result<()> {
        if self.output_mode == OutputMode::Quiet {
            return Ok(());
        }
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write!(handle, "{msg}")?;
        handle.flush()
    }

    pub fn println_out(&mut self, msg: &str) -> io::Result<()> {
        if self.output_mode == OutputMode::Quiet {
            return Ok(());
        }
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{msg}")?;
        handle.flush()
    }

    pub fn print_err(&mut self, msg: &str) -> io::Result<()> {
        if self.output_mode == OutputMode::Quiet {
            return Ok(());
        }
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        write!(handle, "{msg}")?;
        handle.flush()
    }

    pub fn println_err(&mut self, msg: &str) -> io::Result<()> {
        if self.output_mode == OutputMode::Quiet {
            return Ok(());
        }
        let stderr = io::stderr();
        let mut handle = stderr.lock();
        writeln!(handle, "{msg}")?;
        handle.flush()
    }

    pub fn warn(&mut self, msg: &str) -> io::Result<()> {
        let formatted = if self.should_color() {
            format!("{} {msg}", "Warning:".yellow())
        } else {
            format!("Warning: {msg}")
        };
        self.println_err(&formatted)
    }

    pub fn error(&mut self, msg: &str) -> io::Result<()> {
        let formatted = if self.should_color() {
            format!("{} {msg}", "Error:".red())
        } else {
            format!("Error: {msg}")
        };
        self.println_err(&formatted)
    }

    fn should_color(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

use colored::Colorize;

static GLOBAL_SHELL: OnceLock<Mutex<Shell>> = OnceLock::new();

/// Gets a lock to the global shell, initializing it with defaults on first
/// use.
pub fn get_shell() -> std::sync::MutexGuard<'static, Shell> {
    GLOBAL_SHELL
        .get_or_init(|| Mutex::new(Shell::new()))
        .lock()
        .expect("global shell mutex is poisoned")
}

/// Sets the global shell. A no-op if it has already been set.
pub fn set_shell(shell: Shell) {
    let _ = GLOBAL_SHELL.set(Mutex::new(shell));
}

#[macro_export]
macro_rules! sh_print {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::shell::get_shell().print_out(&msg)
            .unwrap_or_else(|e| eprintln!("error writing output: {e}"));
    }};
}

#[macro_export]
macro_rules! sh_println {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::shell::get_shell().println_out(&msg)
            .unwrap_or_else(|e| eprintln!("error writing output: {e}"));
    }};
}

#[macro_export]
macro_rules! sh_eprint {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::shell::get_shell().print_err(&msg)
            .unwrap_or_else(|e| eprintln!("error writing stderr: {e}"));
    }};
}

#[macro_export]
macro_rules! sh_eprintln {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::shell::get_shell().println_err(&msg)
            .unwrap_or_else(|e| eprintln!("error writing stderr: {e}"));
    }};
}

#[macro_export]
macro_rules! sh_warn {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::shell::get_shell().warn(&msg)
            .unwrap_or_else(|e| eprintln!("error writing warning: {e}"));
    }};
}

#[macro_export]
macro_rules! sh_err {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        $crate::shell::get_shell().error(&msg)
            .unwrap_or_else(|e| eprintln!("error writing error: {e}"));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_macros_do_not_panic() {
        sh_print!("Hello, ");
        sh_println!("world!");
        sh_eprint!("Error: ");
        sh_eprintln!("Something went wrong!");
        sh_warn!("This is a warning");
        sh_err!("This is an error");
    }

    #[test]
    fn quiet_mode_suppresses_output() {
        let mut shell = Shell::new();
        shell.output_mode = OutputMode::Quiet;
        shell.println_out("should not print").unwrap();
    }
}

//! Cross-cutting concerns shared by every component crate: process-wide
//! logging setup, the retry-with-jitter backoff policy, and a
//! small terminal output helper for the CLI binary.

pub mod logging;
pub mod retry;
pub mod shell;

pub use retry::JitteredExponential;

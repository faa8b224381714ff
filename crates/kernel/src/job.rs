use crate::cancel::CancelSignal;
use crate::report::JobRunReport;

/// Shared shape of the three recurring jobs (§9 "Polymorphism" — a small
/// capability each job implements, not an inheritance hierarchy).
#[async_trait::async_trait]
pub trait PipelineJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// `dry_run` executes every read path and logs intended writes but
    /// commits nothing; `force_run` skips the job's fill/quiescence gates.
    async fn execute(&self, force_run: bool, dry_run: bool, cancel: CancelSignal) -> JobRunReport;
}

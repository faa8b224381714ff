use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;

use crate::cancel::{is_cancelled, CancelSignal};
use crate::job::PipelineJob;
use crate::report::JobRunReport;

/// Drives one job on its own cron schedule: compute the next deadline,
/// sleep until it, run, repeat. Out-of-band runs (CLI `trigger-*`
/// subcommands) are a separate process invocation entirely and call
/// `PipelineJob::execute` directly rather than through a running
/// `JobRunner` — there is no live scheduler to hand a command to in that
/// case, so this type only ever needs to drive its own cron loop.
pub struct JobRunner {
    job: Arc<dyn PipelineJob>,
    schedule: Schedule,
    cancel: CancelSignal,
}

impl JobRunner {
    pub fn new(
        job: Arc<dyn PipelineJob>,
        cron_expr: &str,
        cancel: CancelSignal,
    ) -> Result<Self, cron::error::Error> {
        let schedule = Schedule::from_str(cron_expr)?;
        Ok(Self { job, schedule, cancel })
    }

    pub async fn run(mut self) {
        loop {
            if is_cancelled(&self.cancel) {
                tracing::info!(job = self.job.name(), "cancellation observed, stopping runner");
                return;
            }

            let sleep = match self.schedule.upcoming(Utc).next() {
                Some(next) => (next - Utc::now()).to_std().unwrap_or_default(),
                None => {
                    tracing::warn!(job = self.job.name(), "cron schedule has no upcoming fire time");
                    return;
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {
                    let report = self.job.execute(false, false, self.cancel.clone()).await;
                    log_report(&report);
                }
                _ = self.cancel.changed() => {
                    tracing::info!(job = self.job.name(), "cancellation observed, stopping runner");
                    return;
                }
            }
        }
    }
}

fn log_report(report: &JobRunReport) {
    tracing::info!(
        job = report.job,
        success = report.success_count,
        failure = report.failure_count,
        skipped = report.skipped_count,
        "job run complete"
    );
    for error in &report.errors {
        tracing::warn!(job = report.job, %error, "job item failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::cancel::cancel_channel;

    struct CountingJob {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl PipelineJob for CountingJob {
        fn name(&self) -> &'static str {
            "counting_job"
        }

        async fn execute(&self, _force_run: bool, _dry_run: bool, _cancel: CancelSignal) -> JobRunReport {
            self.runs.fetch_add(1, Ordering::SeqCst);
            JobRunReport::new(self.name())
        }
    }

    #[test]
    fn new_rejects_an_invalid_cron_expression() {
        let (_tx, cancel) = cancel_channel();
        let job = Arc::new(CountingJob {
            runs: Arc::new(AtomicUsize::new(0)),
        }) as Arc<dyn PipelineJob>;
        assert!(JobRunner::new(job, "not a cron expression", cancel).is_err());
    }

    #[tokio::test]
    async fn run_stops_immediately_when_already_cancelled() {
        let (tx, cancel) = cancel_channel();
        tx.send(true).unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(CountingJob { runs: runs.clone() }) as Arc<dyn PipelineJob>;
        let runner = JobRunner::new(job, "0 0 0 1 1 *", cancel).unwrap();

        tokio::time::timeout(Duration::from_secs(1), runner.run())
            .await
            .expect("run should return promptly once already cancelled");
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_executes_the_job_on_every_scheduled_fire() {
        let (tx, cancel) = cancel_channel();
        let runs = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(CountingJob { runs: runs.clone() }) as Arc<dyn PipelineJob>;
        let runner = JobRunner::new(job, "* * * * * *", cancel).unwrap();

        let handle = tokio::spawn(runner.run());
        tokio::time::sleep(Duration::from_millis(1300)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(runs.load(Ordering::SeqCst) >= 1);
    }
}

use std::time::Duration;

use clap::Args;
use serde::Deserialize;

/// Per-job tuning plus the three cron expressions: Upload every 10s, Batch
/// every 15 min, Submit every 10 min by default.
#[derive(Args, Clone, Debug, Deserialize)]
pub struct JobsConfig {
    #[arg(long, env = "UPLOAD_CRON", default_value = "*/10 * * * * *")]
    pub upload_cron: String,

    #[arg(long, env = "UPLOAD_MAX_INVOICES_PER_RUN", default_value_t = 100)]
    pub upload_max_invoices_per_run: i64,

    #[arg(long, env = "UPLOAD_CONCURRENT_UPLOADS", default_value_t = 8)]
    pub upload_concurrent_uploads: usize,

    #[arg(long, env = "BATCH_CRON", default_value = "0 */15 * * * *")]
    pub batch_cron: String,

    #[arg(long, env = "BATCH_SIZE", default_value_t = 50)]
    pub batch_size: usize,

    #[arg(long, env = "BATCH_BATCHES_PER_RUN", default_value_t = 4)]
    pub batches_per_run: usize,

    #[arg(long, env = "SUBMIT_CRON", default_value = "0 */10 * * * *")]
    pub submit_cron: String,

    #[arg(long, env = "CONFIRMATION_BLOCKS", default_value_t = 12)]
    pub confirmation_blocks: u64,

    #[arg(long, env = "CONFIRMATION_TIMEOUT_SECS", default_value_t = 3600)]
    pub confirmation_timeout_secs: u64,
}

impl JobsConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

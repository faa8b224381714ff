use std::time::Duration;

use clap::Args;
use serde::Deserialize;

#[derive(Args, Clone, Debug, Deserialize)]
pub struct IpfsConfig {
    #[arg(long, env = "IPFS_PIN_BASE_URL")]
    pub pin_base_url: String,

    #[arg(long, env = "IPFS_GATEWAY_BASE_URL")]
    pub gateway_base_url: String,

    #[arg(long, env = "IPFS_RATE_PER_MINUTE", default_value_t = 60)]
    pub rate_per_minute: u32,

    #[arg(long, env = "IPFS_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long, env = "IPFS_BASE_DELAY_MS", default_value_t = 200)]
    pub base_delay_ms: u64,

    #[arg(long, env = "IPFS_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl IpfsConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

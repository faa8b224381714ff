use std::time::Duration;

use clap::Args;
use serde::Deserialize;
use url::Url;

#[derive(Args, Clone, Deserialize)]
pub struct ChainConfig {
    #[arg(long, env = "CHAIN_RPC_URL")]
    pub rpc_url: Url,

    #[arg(long, env = "CHAIN_CONTRACT_ADDRESS")]
    pub contract_address: String,

    /// Signer private key, hex-encoded. Absent means read-only: the chain
    /// client can still poll receipts and call `verifyInvoiceByCID`, but any
    /// job that sends a transaction fails with a config error (§7 "config
    /// or signer missing").
    #[arg(long, env = "CHAIN_PRIVATE_KEY")]
    pub private_key: Option<String>,

    #[arg(long, env = "CHAIN_GAS_HEADROOM_PERCENT", default_value_t = 20)]
    pub gas_headroom_percent: u64,

    #[arg(long, env = "CHAIN_MAX_GAS_PRICE_WEI", default_value_t = 200_000_000_000)]
    pub max_gas_price_wei: u128,

    #[arg(long, env = "CHAIN_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    #[arg(long, env = "CHAIN_BASE_DELAY_MS", default_value_t = 500)]
    pub base_delay_ms: u64,
}

impl ChainConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("gas_headroom_percent", &self.gas_headroom_percent)
            .field("max_gas_price_wei", &self.max_gas_price_wei)
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .finish()
    }
}

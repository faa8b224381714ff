//! Configuration surface for the anchoring pipeline binary: one `clap::Parser`
//! struct per concern, each field overridable by an environment variable.
//! Sourcing policy (env vs. file vs. vault) is a collaborator's call; this
//! crate only defines the shape and the recurring-schedule defaults.

mod chain;
mod database;
mod ipfs;
mod jobs;

pub use chain::ChainConfig;
pub use database::DatabaseConfig;
pub use ipfs::IpfsConfig;
pub use jobs::JobsConfig;

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(name = "invoice-anchor", about = "Invoice anchoring pipeline worker")]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,
    #[command(flatten)]
    pub ipfs: IpfsConfig,
    #[command(flatten)]
    pub chain: ChainConfig,
    #[command(flatten)]
    pub jobs: JobsConfig,
}

impl Config {
    /// Parses from `std::env::args()`, falling back to each field's `env`
    /// attribute when the flag is absent.
    pub fn parse_from_env() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_args() -> Vec<&'static str> {
        vec![
            "invoice-anchor",
            "--database-url",
            "postgres://localhost/invoices",
            "--ipfs-pin-base-url",
            "https://pin.example.com",
            "--ipfs-gateway-base-url",
            "https://gw.example.com",
            "--chain-rpc-url",
            "https://rpc.example.com",
            "--chain-contract-address",
            "0x1111111111111111111111111111111111111111",
        ]
    }

    #[test]
    fn required_flags_parse_with_documented_defaults() {
        let config = Config::parse_from(minimal_args());
        assert_eq!(config.jobs.upload_cron, "*/10 * * * * *");
        assert_eq!(config.jobs.batch_cron, "0 */15 * * * *");
        assert_eq!(config.jobs.submit_cron, "0 */10 * * * *");
        assert_eq!(config.ipfs.rate_per_minute, 60);
        assert_eq!(config.chain.gas_headroom_percent, 20);
        assert!(config.chain.private_key.is_none());
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let mut args = minimal_args();
        args.extend(["--batch-size", "7"]);
        let config = Config::parse_from(args);
        assert_eq!(config.jobs.batch_size, 7);
    }

    #[test]
    fn private_key_is_redacted_in_debug_output() {
        let mut args = minimal_args();
        args.extend(["--chain-private-key", "deadbeef"]);
        let config = Config::parse_from(args);
        let rendered = format!("{:?}", config.chain);
        assert!(!rendered.contains("deadbeef"));
        assert!(rendered.contains("redacted"));
    }
}

use clap::Args;
use serde::Deserialize;

#[derive(Args, Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,
}

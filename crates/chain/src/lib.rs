//! EVM chain client (C4): `anchorBatch`, read-only verification, batch
//! metadata reads, receipt/confirmation primitives. Built on `alloy`: an
//! inline `sol!` ABI binding and a `ProviderBuilder`-assembled signing
//! provider.

mod client;
mod contract;
mod error;

pub use client::{BatchView, ChainClient, ChainClientConfig, TransactionReceiptInfo};
pub use error::ChainError;

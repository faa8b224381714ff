//! Rate-limited, retrying client for the IPFS gateway/pinning service (C2).
//! Knows nothing about invoices or batches — just pin/fetch/pin-status over
//! HTTP, with retry and back-pressure built in.

mod client;
mod error;
mod rate_limiter;

pub use client::{IpfsClient, IpfsClientConfig};
pub use error::IpfsError;
pub use rate_limiter::RateLimiter;

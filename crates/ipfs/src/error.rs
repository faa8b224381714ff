/// Errors the IPFS client can raise, split along the retry boundary (§7):
/// transient network conditions are `Retryable`, 4xx-other-than-429 and
/// malformed-response conditions are `Permanent`.
#[derive(Debug, thiserror::Error)]
pub enum IpfsError {
    #[error("transient ipfs failure: {0}")]
    Retryable(String),
    #[error("permanent ipfs failure: {0}")]
    Permanent(String),
}

impl IpfsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IpfsError::Retryable(_))
    }
}

/// Errors the chain client can raise (§7): transport/5xx/timeout is
/// retryable, a revert or invalid argument is permanent, and calling a
/// state-changing operation without a configured signer is its own
/// immediately-fatal kind (never retried, never silently skipped).
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("transient chain rpc failure: {0}")]
    Retryable(String),
    #[error("permanent chain failure: {0}")]
    Permanent(String),
    #[error("operation requires a configured signer")]
    NoSigner,
}

impl ChainError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChainError::Retryable(_))
    }
}

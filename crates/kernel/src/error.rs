/// Wraps every component error the kernel's jobs can encounter. §7's
/// "data inconsistency" and "config/signer missing" rows get their own
/// variants since no component crate speaks for them.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Db(#[from] invoice_anchor_db::DbError),
    #[error(transparent)]
    Ipfs(#[from] invoice_anchor_ipfs::IpfsError),
    #[error(transparent)]
    Chain(#[from] invoice_anchor_chain::ChainError),
    #[error(transparent)]
    Merkle(#[from] invoice_anchor_merkle::MerkleError),
    #[error("data inconsistency: {0}")]
    Inconsistent(String),
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    /// Used by per-item loops to decide whether to keep the row claimable
    /// (retryable, e.g. cancellation) or mark it terminally failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Ipfs(e) => e.is_retryable(),
            JobError::Chain(e) => e.is_retryable(),
            JobError::Cancelled => true,
            JobError::Db(_) | JobError::Merkle(_) | JobError::Inconsistent(_) => false,
        }
    }
}

/// Per-status counts backing `get_pipeline_stats`, the read surface a
/// control-surface collaborator would expose alongside `verify_invoice`.
/// Pure read, no mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub uploaded: i64,
    pub uploading_to_ipfs: i64,
    pub ipfs_stored: i64,
    pub ipfs_failed: i64,
    pub batched: i64,
    pub blockchain_pending: i64,
    pub blockchain_confirmed: i64,
    pub blockchain_failed: i64,
    pub finalized: i64,
    pub open_batches: i64,
    pub ready_batches: i64,
}

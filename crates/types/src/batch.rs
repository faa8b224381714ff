use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::BatchStatus;

/// A Merkle batch of invoice anchors waiting for, or already committed to,
/// an on-chain `anchorBatch` transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceBatch {
    pub id: Uuid,
    /// Human-facing batch identifier, unique, distinct from `id`.
    pub batch_id: String,
    pub count: i32,
    pub merkle_root: Option<String>,
    pub batch_cid: Option<String>,
    pub status: BatchStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceBatch {
    /// A batch at or past `ReadyToSend` must carry both its root and its
    /// metadata CID.
    pub fn has_required_ready_fields(&self) -> bool {
        self.merkle_root.is_some() && self.batch_cid.is_some()
    }
}

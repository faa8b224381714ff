use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use invoice_anchor_types::{BatchStatus, Invoice, InvoiceBatch, InvoiceLine, InvoiceStatus};

use crate::error::DbError;
use crate::stats::PipelineStats;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Postgres repository implementing the §4.5 claim protocol: one method per
/// claim predicate, each a short transaction committed before any network
/// call is made. Callers (the kernel's three jobs + poller) drive the
/// sequencing; this crate only knows how to move rows between states.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    fn pool_for_test(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), DbError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    // ---- 4.5a UploadToIpfsJob -------------------------------------------

    /// Candidates for upload, oldest first. `skip_quiescence` is `forceRun`:
    /// the "created more than a minute ago" guard only applies otherwise.
    pub async fn select_upload_candidates(
        &self,
        limit: i64,
        skip_quiescence: bool,
    ) -> Result<Vec<Invoice>, DbError> {
        let rows = if skip_quiescence {
            sqlx::query_as::<_, Invoice>(
                "SELECT * FROM invoices
                 WHERE status = $1 AND (cid IS NULL OR cid = '')
                 ORDER BY created_at ASC LIMIT $2",
            )
            .bind(InvoiceStatus::Uploaded)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, Invoice>(
                "SELECT * FROM invoices
                 WHERE status = $1 AND (cid IS NULL OR cid = '')
                   AND created_at < now() - interval '1 minute'
                 ORDER BY created_at ASC LIMIT $2",
            )
            .bind(InvoiceStatus::Uploaded)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    /// Claims one invoice into the `UploadingToIpfs` intermediate state.
    /// `None` means another worker already claimed it (claim contention,
    /// §7 — not an error).
    pub async fn claim_invoice_for_upload(&self, id: Uuid) -> Result<Option<Invoice>, DbError> {
        let claimed = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET status = $1, updated_at = now()
             WHERE id = $2 AND status = $3
             RETURNING *",
        )
        .bind(InvoiceStatus::UploadingToIpfs)
        .bind(id)
        .bind(InvoiceStatus::Uploaded)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    pub async fn commit_invoice_uploaded(
        &self,
        id: Uuid,
        cid: &str,
        cid_hash: &str,
        immutable_hash: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE invoices
             SET status = $1, cid = $2, cid_hash = $3, immutable_hash = $4, updated_at = now()
             WHERE id = $5",
        )
        .bind(InvoiceStatus::IpfsStored)
        .bind(cid)
        .bind(cid_hash)
        .bind(immutable_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_invoice_ipfs_failed(&self, id: Uuid) -> Result<(), DbError> {
        sqlx::query("UPDATE invoices SET status = $1, updated_at = now() WHERE id = $2")
            .bind(InvoiceStatus::IpfsFailed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- 4.5b CreateBatchJob --------------------------------------------

    pub async fn select_batch_candidates(&self, limit: i64) -> Result<Vec<Invoice>, DbError> {
        let rows = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices
             WHERE status = $1 AND cid IS NOT NULL AND batch_id IS NULL
             ORDER BY created_at ASC LIMIT $2",
        )
        .bind(InvoiceStatus::IpfsStored)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_batch(&self, batch_id: &str, count: i32) -> Result<InvoiceBatch, DbError> {
        let batch = sqlx::query_as::<_, InvoiceBatch>(
            "INSERT INTO invoice_batches (id, batch_id, count, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, now(), now())
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(batch_id)
        .bind(count)
        .bind(BatchStatus::Processing)
        .fetch_one(&self.pool)
        .await?;
        Ok(batch)
    }

    /// Claims one invoice into `batch_row_id`, transitioning it to
    /// `Batched`. `None` means another worker claimed it first — the caller
    /// simply drops this candidate from the batch (§4.5b step 2).
    pub async fn claim_invoice_for_batch(
        &self,
        invoice_id: Uuid,
        batch_row_id: Uuid,
    ) -> Result<Option<Invoice>, DbError> {
        let claimed = sqlx::query_as::<_, Invoice>(
            "UPDATE invoices SET batch_id = $1, status = $2, updated_at = now()
             WHERE id = $3 AND status = $4 AND batch_id IS NULL
             RETURNING *",
        )
        .bind(batch_row_id)
        .bind(InvoiceStatus::Batched)
        .bind(invoice_id)
        .bind(InvoiceStatus::IpfsStored)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    pub async fn update_batch_count(&self, batch_row_id: Uuid, count: i32) -> Result<(), DbError> {
        sqlx::query("UPDATE invoice_batches SET count = $1, updated_at = now() WHERE id = $2")
            .bind(count)
            .bind(batch_row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records the per-invoice Merkle proof and advances it to
    /// `BlockchainPending` — before the batch itself has a `txHash`, which
    /// is correct: invoices wait for their batch, not for an individual
    /// submission.
    pub async fn set_invoice_merkle_proof_pending(
        &self,
        invoice_id: Uuid,
        proof: &[String],
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE invoices SET merkle_proof = $1, status = $2, updated_at = now() WHERE id = $3",
        )
        .bind(proof)
        .bind(InvoiceStatus::BlockchainPending)
        .bind(invoice_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finalize_batch_ready(
        &self,
        batch_row_id: Uuid,
        merkle_root: &str,
        batch_cid: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE invoice_batches
             SET merkle_root = $1, batch_cid = $2, status = $3, updated_at = now()
             WHERE id = $4",
        )
        .bind(merkle_root)
        .bind(batch_cid)
        .bind(BatchStatus::ReadyToSend)
        .bind(batch_row_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Failure at any post-claim batching step: mark the batch
    /// `BlockchainFailed` and revert its claimed invoices to
    /// `{batchId=NULL, status=IpfsStored, merkleProof=NULL}` so they are
    /// picked up again by the next Batch run.
    pub async fn fail_batch_and_revert_invoices(&self, batch_row_id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE invoice_batches SET status = $1, updated_at = now() WHERE id = $2")
            .bind(BatchStatus::BlockchainFailed)
            .bind(batch_row_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "UPDATE invoices
             SET batch_id = NULL, status = $1, merkle_proof = NULL, updated_at = now()
             WHERE batch_id = $2",
        )
        .bind(InvoiceStatus::IpfsStored)
        .bind(batch_row_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // ---- 4.5c SubmitToBlockchainJob --------------------------------------

    pub async fn select_ready_batches(&self, limit: i64) -> Result<Vec<InvoiceBatch>, DbError> {
        let rows = sqlx::query_as::<_, InvoiceBatch>(
            "SELECT * FROM invoice_batches
             WHERE status = $1 AND merkle_root IS NOT NULL AND tx_hash IS NULL
             ORDER BY created_at ASC LIMIT $2",
        )
        .bind(BatchStatus::ReadyToSend)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Claims a batch for submission: moves it to `BlockchainPending`
    /// *before* a `txHash` exists (resolving Design Note 3/4 — the writer
    /// sets status and records `txHash` in the same logical step, and the
    /// poller's own query only ever looks at `BlockchainPending`).
    pub async fn claim_batch_for_submit(
        &self,
        batch_row_id: Uuid,
    ) -> Result<Option<InvoiceBatch>, DbError> {
        let claimed = sqlx::query_as::<_, InvoiceBatch>(
            "UPDATE invoice_batches SET status = $1, updated_at = now()
             WHERE id = $2 AND status = $3 AND tx_hash IS NULL
             RETURNING *",
        )
        .bind(BatchStatus::BlockchainPending)
        .bind(batch_row_id)
        .bind(BatchStatus::ReadyToSend)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(batch) = &claimed {
            if !batch.has_required_ready_fields() {
                return Err(DbError::Inconsistent(format!(
                    "batch {} reached ReadyToSend without a merkle root and batch cid",
                    batch.batch_id
                )));
            }
        }

        Ok(claimed)
    }

    pub async fn commit_batch_tx_hash(
        &self,
        batch_row_id: Uuid,
        tx_hash: &str,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE invoice_batches SET tx_hash = $1, updated_at = now() WHERE id = $2")
            .bind(tx_hash)
            .bind(batch_row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fail_batch_submit(&self, batch_row_id: Uuid) -> Result<(), DbError> {
        self.fail_batch_and_propagate(batch_row_id).await
    }

    // ---- 4.5d Confirmation poller ----------------------------------------

    pub async fn select_pending_confirmation_batches(
        &self,
    ) -> Result<Vec<InvoiceBatch>, DbError> {
        let rows = sqlx::query_as::<_, InvoiceBatch>(
            "SELECT * FROM invoice_batches WHERE status = $1 AND tx_hash IS NOT NULL",
        )
        .bind(BatchStatus::BlockchainPending)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn confirm_batch(&self, batch_row_id: Uuid, block_number: i64) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE invoice_batches
             SET status = $1, block_number = $2, confirmed_at = now(), updated_at = now()
             WHERE id = $3",
        )
        .bind(BatchStatus::BlockchainConfirmed)
        .bind(block_number)
        .bind(batch_row_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE invoices SET status = $1, updated_at = now() WHERE batch_id = $2")
            .bind(InvoiceStatus::BlockchainConfirmed)
            .bind(batch_row_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Used both for a failed receipt and for the confirmation timeout
    /// give-up (§4.5d).
    pub async fn fail_batch_confirmation(&self, batch_row_id: Uuid) -> Result<(), DbError> {
        self.fail_batch_and_propagate(batch_row_id).await
    }

    async fn fail_batch_and_propagate(&self, batch_row_id: Uuid) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE invoice_batches SET status = $1, updated_at = now() WHERE id = $2")
            .bind(BatchStatus::BlockchainFailed)
            .bind(batch_row_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE invoices SET status = $1, updated_at = now() WHERE batch_id = $2")
            .bind(InvoiceStatus::BlockchainFailed)
            .bind(batch_row_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn batch_updated_before(
        &self,
        batch_row_id: Uuid,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT updated_at < $1 FROM invoice_batches WHERE id = $2",
        )
        .bind(cutoff)
        .bind(batch_row_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(expired,)| expired).unwrap_or(false))
    }

    // ---- Reads -------------------------------------------------------------

    pub async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, DbError> {
        let row = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_invoice_lines(&self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, DbError> {
        let rows = sqlx::query_as::<_, InvoiceLine>(
            "SELECT * FROM invoice_lines WHERE invoice_id = $1 ORDER BY line_number ASC",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_batch(&self, batch_row_id: Uuid) -> Result<Option<InvoiceBatch>, DbError> {
        let row = sqlx::query_as::<_, InvoiceBatch>("SELECT * FROM invoice_batches WHERE id = $1")
            .bind(batch_row_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_pipeline_stats(&self) -> Result<PipelineStats, DbError> {
        let mut stats = PipelineStats::default();
        let invoice_counts: Vec<(i32, i64)> = sqlx::query_as(
            "SELECT status, count(*) FROM invoices GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        for (status, count) in invoice_counts {
            match InvoiceStatus::try_from(status) {
                Ok(InvoiceStatus::Uploaded) => stats.uploaded = count,
                Ok(InvoiceStatus::UploadingToIpfs) => stats.uploading_to_ipfs = count,
                Ok(InvoiceStatus::IpfsStored) => stats.ipfs_stored = count,
                Ok(InvoiceStatus::IpfsFailed) => stats.ipfs_failed = count,
                Ok(InvoiceStatus::Batched) => stats.batched = count,
                Ok(InvoiceStatus::BlockchainPending) => stats.blockchain_pending = count,
                Ok(InvoiceStatus::BlockchainConfirmed) => stats.blockchain_confirmed = count,
                Ok(InvoiceStatus::BlockchainFailed) => stats.blockchain_failed = count,
                Ok(InvoiceStatus::Finalized) => stats.finalized = count,
                Err(_) => {}
            }
        }

        let batch_counts: Vec<(i32, i64)> =
            sqlx::query_as("SELECT status, count(*) FROM invoice_batches GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in batch_counts {
            match BatchStatus::try_from(status) {
                Ok(BatchStatus::Processing) => stats.open_batches = count,
                Ok(BatchStatus::ReadyToSend) => stats.ready_batches = count,
                _ => {}
            }
        }

        Ok(stats)
    }
}

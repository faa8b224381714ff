use std::sync::Arc;

use rand::Rng;

use invoice_anchor_db::Repository;
use invoice_anchor_ipfs::IpfsClient;
use invoice_anchor_merkle::build_tree;
use invoice_anchor_types::Invoice;

use crate::cancel::{is_cancelled, CancelSignal};
use crate::job::PipelineJob;
use crate::report::JobRunReport;

#[derive(Debug, Clone)]
pub struct BatchJobConfig {
    pub batch_size: usize,
    pub batches_per_run: usize,
}

/// 4.5b: groups `IpfsStored` invoices with no batch into batches of
/// `batch_size`, builds a Merkle tree over their CIDs, and pins the batch
/// metadata object.
pub struct CreateBatchJob {
    repo: Repository,
    ipfs: Arc<IpfsClient>,
    config: BatchJobConfig,
}

impl CreateBatchJob {
    pub fn new(repo: Repository, ipfs: Arc<IpfsClient>, config: BatchJobConfig) -> Self {
        Self { repo, ipfs, config }
    }

    fn new_batch_id() -> String {
        let now = chrono::Utc::now().timestamp();
        let rand4: u32 = rand::thread_rng().gen_range(0..10_000);
        format!("BATCH-{now}-{rand4:04}")
    }

    async fn process_group(&self, group: Vec<Invoice>, dry_run: bool) -> Result<usize, String> {
        if dry_run {
            tracing::info!(count = group.len(), "dry-run: would create batch");
            return Ok(0);
        }

        let batch_id = Self::new_batch_id();
        let batch = self
            .repo
            .create_batch(&batch_id, group.len() as i32)
            .await
            .map_err(|e| e.to_string())?;

        let mut claimed = Vec::with_capacity(group.len());
        for invoice in group {
            if let Some(row) = self
                .repo
                .claim_invoice_for_batch(invoice.id, batch.id)
                .await
                .map_err(|e| e.to_string())?
            {
                claimed.push(row);
            }
        }

        if claimed.is_empty() {
            self.repo
                .fail_batch_and_revert_invoices(batch.id)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(0);
        }

        if claimed.len() != batch.count as usize {
            self.repo
                .update_batch_count(batch.id, claimed.len() as i32)
                .await
                .map_err(|e| e.to_string())?;
        }

        let result = self.finish_batch(batch.id, &claimed).await;
        if let Err(err) = &result {
            tracing::warn!(batch_id = %batch.batch_id, error = %err, "batch creation failed after claim, reverting");
            self.repo
                .fail_batch_and_revert_invoices(batch.id)
                .await
                .map_err(|e| e.to_string())?;
        }
        result.map(|()| claimed.len())
    }

    async fn finish_batch(&self, batch_row_id: uuid::Uuid, claimed: &[Invoice]) -> Result<(), String> {
        let mut cids: Vec<String> = claimed
            .iter()
            .map(|invoice| invoice.cid.clone().expect("claimed invoices always carry a cid"))
            .collect();
        cids.sort();

        let tree = build_tree(&cids).map_err(|e| e.to_string())?;

        let metadata = serde_json::json!({ "cids": cids });
        let name = format!(
            "batch-cids-{}-{}.json",
            batch_row_id,
            chrono::Utc::now().timestamp()
        );
        let batch_cid = self
            .ipfs
            .pin_json(&metadata, &name)
            .await
            .map_err(|e| e.to_string())?;

        for invoice in claimed {
            let cid = invoice.cid.as_deref().expect("claimed invoices always carry a cid");
            let proof = tree
                .proof_hex(cid)
                .ok_or_else(|| format!("no proof computed for cid {cid}"))?;
            self.repo
                .set_invoice_merkle_proof_pending(invoice.id, &proof)
                .await
                .map_err(|e| e.to_string())?;
        }

        self.repo
            .finalize_batch_ready(batch_row_id, &tree.root_hex(), &batch_cid)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PipelineJob for CreateBatchJob {
    fn name(&self) -> &'static str {
        "create_batch"
    }

    async fn execute(&self, force_run: bool, dry_run: bool, cancel: CancelSignal) -> JobRunReport {
        let mut report = JobRunReport::new(self.name());

        let limit = (self.config.batch_size * self.config.batches_per_run) as i64;
        let candidates = match self.repo.select_batch_candidates(limit).await {
            Ok(rows) => rows,
            Err(err) => {
                report.record_failure(err);
                return report;
            }
        };

        if candidates.len() < self.config.batch_size / 2 && !force_run {
            tracing::debug!(
                candidates = candidates.len(),
                batch_size = self.config.batch_size,
                "below fill gate, waiting for more invoices"
            );
            return report;
        }

        for group in candidates.chunks(self.config.batch_size.max(1)) {
            if is_cancelled(&cancel) {
                report.record_skip();
                break;
            }
            match self.process_group(group.to_vec(), dry_run).await {
                Ok(n) if n > 0 => {
                    for _ in 0..n {
                        report.record_success();
                    }
                }
                Ok(_) => report.record_skip(),
                Err(err) => report.record_failure(err),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::*;
    use httptest::{responders::*, Expectation, Server};
    use sqlx::PgPool;

    use invoice_anchor_db::Repository;
    use invoice_anchor_ipfs::IpfsClientConfig;

    fn ipfs_config(server: &Server) -> IpfsClientConfig {
        IpfsClientConfig {
            pin_base_url: server.url("").to_string().trim_end_matches('/').to_string(),
            gateway_base_url: server.url("").to_string().trim_end_matches('/').to_string(),
            rate_per_minute: 6000,
            max_retries: 3,
            base_delay: std::time::Duration::from_millis(1),
            request_timeout: std::time::Duration::from_secs(5),
        }
    }

    async fn insert_ipfs_stored_invoice(pool: &PgPool, cid: &str) -> uuid::Uuid {
        let id = uuid::Uuid::new_v4();
        sqlx::query(
            "INSERT INTO invoices (
                id, invoice_number, form_number, serial, tenant_org_id, issued_by_user_id,
                seller_name, seller_tax_id, seller_address,
                customer_name, customer_tax_id, customer_address,
                status, issued_date, sub_total, tax_amount, discount_amount, total_amount,
                currency, cid, created_at, updated_at
             ) VALUES (
                $1, 'INV-1', 'FORM-1', 'SER-1', 'org-1', 'user-1',
                'Seller', '000', 'addr',
                'Customer', '111', 'addr2',
                2, now(), 100.00, 8.00, 0.00, 108.00,
                'USD', $2, now(), now()
             )",
        )
        .bind(id)
        .bind(cid)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn three_invoices_form_one_ready_batch(pool: PgPool) {
        let repo = Repository::new(pool.clone());
        insert_ipfs_stored_invoice(&pool, "QmA").await;
        insert_ipfs_stored_invoice(&pool, "QmB").await;
        insert_ipfs_stored_invoice(&pool, "QmC").await;

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/pin"))
                .respond_with(json_encoded(serde_json::json!({"cid": "bafybatchmeta"}))),
        );
        let ipfs = Arc::new(invoice_anchor_ipfs::IpfsClient::new(ipfs_config(&server)));

        let job = CreateBatchJob::new(
            repo.clone(),
            ipfs,
            BatchJobConfig {
                batch_size: 3,
                batches_per_run: 1,
            },
        );
        let (_tx, cancel) = crate::cancel::cancel_channel();
        let report = job.execute(true, false, cancel).await;

        assert_eq!(report.success_count, 3);
        let stats = repo.get_pipeline_stats().await.unwrap();
        assert_eq!(stats.ready_batches, 1);
        assert_eq!(stats.blockchain_pending, 3);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn below_fill_gate_without_force_run_creates_nothing(pool: PgPool) {
        let repo = Repository::new(pool.clone());
        insert_ipfs_stored_invoice(&pool, "QmA").await;

        let server = Server::run();
        let ipfs = Arc::new(invoice_anchor_ipfs::IpfsClient::new(ipfs_config(&server)));
        let job = CreateBatchJob::new(
            repo.clone(),
            ipfs,
            BatchJobConfig {
                batch_size: 100,
                batches_per_run: 1,
            },
        );
        let (_tx, cancel) = crate::cancel::cancel_channel();
        let report = job.execute(false, false, cancel).await;

        assert_eq!(report.success_count, 0);
        let stats = repo.get_pipeline_stats().await.unwrap();
        assert_eq!(stats.open_batches, 0);
        assert_eq!(stats.ready_batches, 0);
    }
}

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;

use invoice_anchor_chain::ChainClient;
use invoice_anchor_db::Repository;

use crate::cancel::{is_cancelled, CancelSignal};
use crate::job::PipelineJob;
use crate::poller::{ConfirmationPoller, PollerConfig};
use crate::report::JobRunReport;

const SUBMIT_BATCH_CAP: i64 = 10;
const INTER_SUBMIT_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SubmitJobConfig {
    pub poller: PollerConfig,
}

/// 4.5c: first advances in-flight batches via the confirmation poller, then
/// submits newly ready batches, pacing sends 2 seconds apart.
pub struct SubmitToBlockchainJob {
    repo: Repository,
    chain: Arc<ChainClient>,
    config: SubmitJobConfig,
}

impl SubmitToBlockchainJob {
    pub fn new(repo: Repository, chain: Arc<ChainClient>, config: SubmitJobConfig) -> Self {
        Self { repo, chain, config }
    }

    async fn submit_one(&self, batch_row_id: uuid::Uuid, dry_run: bool) -> Result<bool, String> {
        if dry_run {
            tracing::info!(batch_id = %batch_row_id, "dry-run: would submit batch to chain");
            return Ok(false);
        }

        let Some(claimed) = self
            .repo
            .claim_batch_for_submit(batch_row_id)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Ok(false);
        };

        let merkle_root = claimed
            .merkle_root
            .as_deref()
            .ok_or_else(|| "ready batch missing merkle root".to_string())?;
        let root: B256 = B256::from_str(merkle_root).map_err(|e| e.to_string())?;
        let batch_cid = claimed
            .batch_cid
            .clone()
            .ok_or_else(|| "ready batch missing batch cid".to_string())?;

        match self
            .chain
            .anchor_batch(root, claimed.count as u64, &batch_cid)
            .await
        {
            Ok(tx_hash) => {
                self.repo
                    .commit_batch_tx_hash(claimed.id, &tx_hash)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(true)
            }
            Err(err) => {
                self.repo
                    .fail_batch_submit(claimed.id)
                    .await
                    .map_err(|e| e.to_string())?;
                Err(err.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl PipelineJob for SubmitToBlockchainJob {
    fn name(&self) -> &'static str {
        "submit_to_blockchain"
    }

    async fn execute(&self, _force_run: bool, dry_run: bool, cancel: CancelSignal) -> JobRunReport {
        let mut report = JobRunReport::new(self.name());

        let poller = ConfirmationPoller::new(
            self.repo.clone(),
            self.chain.clone(),
            self.config.poller.clone(),
        );
        poller.poll_once(&mut report).await;

        let ready = match self.repo.select_ready_batches(SUBMIT_BATCH_CAP).await {
            Ok(rows) => rows,
            Err(err) => {
                report.record_failure(err);
                return report;
            }
        };

        let mut first = true;
        for batch in ready {
            if is_cancelled(&cancel) {
                report.record_skip();
                break;
            }
            if !first && !dry_run {
                tokio::time::sleep(INTER_SUBMIT_PAUSE).await;
            }
            first = false;

            match self.submit_one(batch.id, dry_run).await {
                Ok(true) => report.record_success(),
                Ok(false) => report.record_skip(),
                Err(err) => report.record_failure(err),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{responders::*, Expectation, Server};
    use sqlx::PgPool;

    use invoice_anchor_chain::{ChainClient, ChainClientConfig};
    use invoice_anchor_ipfs::{IpfsClient, IpfsClientConfig};

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

    /// Never dialed: `submit_one` returns before touching the chain whenever
    /// `dry_run` is set, and `poll_once` skips the network entirely when
    /// there are no in-flight batches to check.
    fn unreachable_chain() -> Arc<ChainClient> {
        Arc::new(
            ChainClient::new(ChainClientConfig {
                rpc_url: "http://127.0.0.1:1".parse().unwrap(),
                contract_address: alloy::primitives::Address::ZERO,
                private_key: None,
                gas_headroom_percent: 20,
                max_gas_price: 200_000_000_000,
                max_retries: 1,
                base_delay: std::time::Duration::from_millis(1),
            })
            .unwrap(),
        )
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
    async fn dry_run_skips_ready_batches_without_touching_the_chain(pool: PgPool) {
        let repo = Repository::new(pool.clone());
        insert_ipfs_stored_invoice(&pool, "QmA").await;
        insert_ipfs_stored_invoice(&pool, "QmB").await;
        insert_ipfs_stored_invoice(&pool, "QmC").await;

        let server = Server::run();
        server.expect(
            Expectation::matching(httptest::matchers::request::method_path("POST", "/pin"))
                .respond_with(json_encoded(serde_json::json!({"cid": "bafybatchmeta"}))),
        );
        let ipfs = Arc::new(IpfsClient::new(ipfs_config(&server)));
        let batch_job = crate::batch::CreateBatchJob::new(
            repo.clone(),
            ipfs,
            crate::batch::BatchJobConfig {
                batch_size: 3,
                batches_per_run: 1,
            },
        );
        let (_tx, cancel) = crate::cancel::cancel_channel();
        let batch_report = batch_job.execute(true, false, cancel.clone()).await;
        assert_eq!(batch_report.success_count, 3);

        let submit_job = SubmitToBlockchainJob::new(
            repo.clone(),
            unreachable_chain(),
            SubmitJobConfig {
                poller: PollerConfig {
                    confirmation_blocks: 12,
                    timeout: std::time::Duration::from_secs(3600),
                },
            },
        );
        let report = submit_job.execute(false, true, cancel).await;

        assert_eq!(report.failure_count, 0);
        assert_eq!(report.skipped_count, 1);
    }
}

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use invoice_anchor_canon::{canonicalize, hash_cid};
use invoice_anchor_db::Repository;
use invoice_anchor_ipfs::IpfsClient;
use invoice_anchor_types::Invoice;

use crate::cancel::{is_cancelled, CancelSignal};
use crate::job::PipelineJob;
use crate::report::JobRunReport;

#[derive(Debug, Clone)]
pub struct UploadJobConfig {
    pub max_invoices_per_run: i64,
    pub concurrent_uploads: usize,
}

/// 4.5a: canonicalize, claim, pin, commit — or mark `IpfsFailed` on any
/// failure after the claim.
#[derive(Clone)]
pub struct UploadToIpfsJob {
    repo: Repository,
    ipfs: Arc<IpfsClient>,
    config: UploadJobConfig,
}

impl UploadToIpfsJob {
    pub fn new(repo: Repository, ipfs: Arc<IpfsClient>, config: UploadJobConfig) -> Self {
        Self { repo, ipfs, config }
    }

    async fn process_one(&self, invoice: Invoice, dry_run: bool) -> Result<bool, String> {
        let lines = self
            .repo
            .get_invoice_lines(invoice.id)
            .await
            .map_err(|e| e.to_string())?;
        let canonical = canonicalize(&invoice, &lines);

        if dry_run {
            tracing::info!(invoice_id = %invoice.id, "dry-run: would upload to ipfs and commit");
            return Ok(false);
        }

        let Some(_claimed) = self
            .repo
            .claim_invoice_for_upload(invoice.id)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Ok(false);
        };

        let payload: serde_json::Value = serde_json::from_slice(&canonical.bytes)
            .expect("canonical bytes are always valid json");
        let name = format!(
            "invoice-{}-{}.json",
            invoice.id,
            chrono::Utc::now().timestamp()
        );

        match self.ipfs.pin_json(&payload, &name).await {
            Ok(cid) => {
                let cid_hash = hash_cid(&cid);
                self.repo
                    .commit_invoice_uploaded(invoice.id, &cid, &cid_hash, &canonical.immutable_hash)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(true)
            }
            Err(err) => {
                self.repo
                    .mark_invoice_ipfs_failed(invoice.id)
                    .await
                    .map_err(|e| e.to_string())?;
                Err(err.to_string())
            }
        }
    }
}

#[async_trait::async_trait]
impl PipelineJob for UploadToIpfsJob {
    fn name(&self) -> &'static str {
        "upload_to_ipfs"
    }

    async fn execute(&self, force_run: bool, dry_run: bool, cancel: CancelSignal) -> JobRunReport {
        let mut report = JobRunReport::new(self.name());

        let candidates = match self
            .repo
            .select_upload_candidates(self.config.max_invoices_per_run, force_run)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                report.record_failure(err);
                return report;
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.concurrent_uploads.max(1)));
        let mut tasks = Vec::with_capacity(candidates.len());
        for invoice in candidates {
            if is_cancelled(&cancel) {
                report.record_skip();
                continue;
            }
            let semaphore = semaphore.clone();
            let job = self.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed");
                job.process_one(invoice, dry_run).await
            }));
        }

        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(true)) => report.record_success(),
                Ok(Ok(false)) => report.record_skip(),
                Ok(Err(err)) => report.record_failure(err),
                Err(join_err) => report.record_failure(join_err),
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

    use invoice_anchor_ipfs::IpfsClientConfig;
    use invoice_anchor_types::InvoiceStatus;

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

    async fn insert_invoice(pool: &PgPool) -> uuid::Uuid {
        let id = uuid::Uuid::new_v4();
        sqlx::query(
            "INSERT INTO invoices (
                id, invoice_number, form_number, serial, tenant_org_id, issued_by_user_id,
                seller_name, seller_tax_id, seller_address,
                customer_name, customer_tax_id, customer_address,
                status, issued_date, sub_total, tax_amount, discount_amount, total_amount,
                currency, created_at, updated_at
             ) VALUES (
                $1, 'INV-1', 'FORM-1', 'SER-1', 'org-1', 'user-1',
                'Seller', '000', 'addr',
                'Customer', '111', 'addr2',
                1, now(), 100.00, 8.00, 0.00, 108.00,
                'USD', now() - interval '2 minutes', now() - interval '2 minutes'
             )",
        )
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn happy_path_pins_and_commits(pool: PgPool) {
        let repo = Repository::new(pool.clone());
        let id = insert_invoice(&pool).await;

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/pin"))
                .respond_with(json_encoded(serde_json::json!({"cid": "bafyreitest"}))),
        );
        let ipfs = Arc::new(invoice_anchor_ipfs::IpfsClient::new(ipfs_config(&server)));

        let job = UploadToIpfsJob::new(
            repo.clone(),
            ipfs,
            UploadJobConfig {
                max_invoices_per_run: 10,
                concurrent_uploads: 4,
            },
        );
        let (_tx, cancel) = crate::cancel::cancel_channel();
        let report = job.execute(false, false, cancel).await;

        assert_eq!(report.success_count, 1);
        assert_eq!(report.failure_count, 0);

        let invoice = repo.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::IpfsStored);
        assert_eq!(invoice.cid.as_deref(), Some("bafyreitest"));
        assert_eq!(invoice.immutable_hash.as_deref().unwrap().len(), 64);
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn non_retryable_pin_failure_marks_ipfs_failed(pool: PgPool) {
        let repo = Repository::new(pool.clone());
        let id = insert_invoice(&pool).await;

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/pin")).respond_with(status_code(400)),
        );
        let ipfs = Arc::new(invoice_anchor_ipfs::IpfsClient::new(ipfs_config(&server)));

        let job = UploadToIpfsJob::new(
            repo.clone(),
            ipfs,
            UploadJobConfig {
                max_invoices_per_run: 10,
                concurrent_uploads: 4,
            },
        );
        let (_tx, cancel) = crate::cancel::cancel_channel();
        let report = job.execute(false, false, cancel).await;

        assert_eq!(report.failure_count, 1);
        let invoice = repo.get_invoice(id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::IpfsFailed);
    }
}

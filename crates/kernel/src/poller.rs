use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};

use invoice_anchor_chain::ChainClient;
use invoice_anchor_db::Repository;

use crate::report::JobRunReport;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub confirmation_blocks: u64,
    pub timeout: std::time::Duration,
}

/// 4.5d: advances every in-flight batch one step. Shared by
/// `SubmitToBlockchainJob`'s first phase and anything else that wants to
/// poll out of band.
pub struct ConfirmationPoller {
    repo: Repository,
    chain: Arc<ChainClient>,
    config: PollerConfig,
}

impl ConfirmationPoller {
    pub fn new(repo: Repository, chain: Arc<ChainClient>, config: PollerConfig) -> Self {
        Self { repo, chain, config }
    }

    pub async fn poll_once(&self, report: &mut JobRunReport) {
        let batches = match self.repo.select_pending_confirmation_batches().await {
            Ok(rows) => rows,
            Err(err) => {
                report.record_failure(err);
                return;
            }
        };

        for batch in batches {
            let tx_hash = match &batch.tx_hash {
                Some(hash) => hash,
                None => continue,
            };

            let receipt = match self.chain.get_transaction_receipt(tx_hash).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    report.record_failure(err);
                    continue;
                }
            };

            match receipt {
                Some(receipt) if receipt.success => {
                    let current_block = match self.chain.get_current_block().await {
                        Ok(block) => block,
                        Err(err) => {
                            report.record_failure(err);
                            continue;
                        }
                    };
                    let depth = current_block.saturating_sub(receipt.block_number) + 1;
                    if depth >= self.config.confirmation_blocks {
                        match self
                            .repo
                            .confirm_batch(batch.id, receipt.block_number as i64)
                            .await
                        {
                            Ok(()) => report.record_success(),
                            Err(err) => report.record_failure(err),
                        }
                    } else {
                        report.record_skip();
                    }
                }
                Some(_failed_receipt) => {
                    match self.repo.fail_batch_confirmation(batch.id).await {
                        Ok(()) => report.record_success(),
                        Err(err) => report.record_failure(err),
                    }
                }
                None => {
                    let cutoff = Utc::now() - ChronoDuration::from_std(self.config.timeout).unwrap_or(ChronoDuration::zero());
                    match self.repo.batch_updated_before(batch.id, cutoff).await {
                        Ok(true) => match self.repo.fail_batch_confirmation(batch.id).await {
                            Ok(()) => report.record_success(),
                            Err(err) => report.record_failure(err),
                        },
                        Ok(false) => report.record_skip(),
                        Err(err) => report.record_failure(err),
                    }
                }
            }
        }
    }
}

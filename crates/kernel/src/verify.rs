use std::str::FromStr;

use alloy::primitives::B256;
use serde::Serialize;
use uuid::Uuid;

use invoice_anchor_chain::ChainClient;
use invoice_anchor_db::Repository;
use invoice_anchor_ipfs::IpfsClient;

use crate::error::JobError;

#[derive(Debug, Clone, Serialize)]
pub struct BatchInfo {
    pub merkle_root: String,
    pub batch_size: u64,
    pub issuer: String,
    pub metadata_uri: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub batch_info: Option<BatchInfo>,
    pub metadata: Option<serde_json::Value>,
}

/// Backs the `verifyInvoice(invoiceId)` control-surface query: reads the
/// invoice, asks the contract to verify its Merkle proof against
/// the recorded root, and fetches the batch's pinned metadata.
pub async fn verify_invoice(
    repo: &Repository,
    chain: &ChainClient,
    ipfs: &IpfsClient,
    invoice_id: Uuid,
) -> Result<VerificationResult, JobError> {
    let invoice = repo
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| JobError::Inconsistent(format!("no such invoice {invoice_id}")))?;

    let (_, cid) = invoice
        .verification_anchor()
        .ok_or_else(|| JobError::Inconsistent("invoice has no anchor yet".to_string()))?;

    let batch_row_id = invoice
        .batch_id
        .ok_or_else(|| JobError::Inconsistent("invoice has no batch".to_string()))?;
    let batch = repo
        .get_batch(batch_row_id)
        .await?
        .ok_or_else(|| JobError::Inconsistent(format!("batch {batch_row_id} not found")))?;
    let merkle_root = batch
        .merkle_root
        .as_deref()
        .ok_or_else(|| JobError::Inconsistent("batch has no merkle root".to_string()))?;
    let root: B256 = B256::from_str(merkle_root)
        .map_err(|e| JobError::Inconsistent(format!("malformed merkle root: {e}")))?;

    let proof_hex = invoice.merkle_proof.clone().unwrap_or_default();
    let proof: Vec<B256> = proof_hex
        .iter()
        .map(|p| B256::from_str(p))
        .collect::<Result<_, _>>()
        .map_err(|e| JobError::Inconsistent(format!("malformed merkle proof: {e}")))?;

    let is_valid = chain.verify_invoice_by_cid(root, cid, proof).await?;

    let view = chain.get_batch(root).await?;
    let batch_info = view.map(|v| BatchInfo {
        merkle_root: format!("0x{}", hex::encode(v.merkleRoot)),
        batch_size: v.batchSize.to::<u64>(),
        issuer: v.issuer.to_string(),
        metadata_uri: v.metadataURI.clone(),
        timestamp: v.timestamp.to::<u64>(),
    });

    let metadata = match &batch.batch_cid {
        Some(batch_cid) => ipfs.get_json(batch_cid).await?,
        None => None,
    };

    Ok(VerificationResult {
        is_valid,
        batch_info,
        metadata,
    })
}

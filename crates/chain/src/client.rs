use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use backon::Retryable;
use invoice_anchor_common::JitteredExponential;
use url::Url;

use crate::contract::IInvoiceAnchor;
use crate::error::ChainError;

pub use crate::contract::IInvoiceAnchor::BatchView;

/// Everything the client needs to talk to one deployment of the anchor
/// contract on one chain. `private_key` absent means every state-changing
/// call raises `ChainError::NoSigner`.
#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    pub rpc_url: Url,
    pub contract_address: Address,
    pub private_key: Option<String>,
    pub gas_headroom_percent: u64,
    pub max_gas_price: u128,
    pub max_retries: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct TransactionReceiptInfo {
    pub success: bool,
    pub block_number: u64,
}

pub struct ChainClient {
    contract: IInvoiceAnchor::IInvoiceAnchorInstance<DynProvider>,
    provider: DynProvider,
    has_signer: bool,
    config: ChainClientConfig,
}

impl ChainClient {
    pub fn new(config: ChainClientConfig) -> Result<Self, ChainError> {
        let wallet = match &config.private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .parse()
                    .map_err(|e| ChainError::Permanent(format!("invalid private key: {e}")))?;
                Some(EthereumWallet::from(signer))
            }
            None => None,
        };
        let has_signer = wallet.is_some();
        let provider = build_provider(config.rpc_url.clone(), wallet);
        let contract = IInvoiceAnchor::new(config.contract_address, provider.clone());

        Ok(Self {
            contract,
            provider,
            has_signer,
            config,
        })
    }

    fn retry_policy(&self) -> JitteredExponential {
        JitteredExponential {
            base_delay: self.config.base_delay,
            max_retries: self.config.max_retries,
        }
    }

    /// Sends `anchorBatch`. Only the pre-send steps (gas estimation, gas
    /// price read) are retried; the send itself happens exactly once per
    /// claimed batch (§4.4 — never re-sign for the same logical operation).
    pub async fn anchor_batch(
        &self,
        merkle_root: B256,
        batch_size: u64,
        metadata_uri: &str,
    ) -> Result<String, ChainError> {
        if !self.has_signer {
            return Err(ChainError::NoSigner);
        }

        let batch_size_u256 = U256::from(batch_size);
        let (gas_limit, gas_price) = (|| {
            self.estimate_send_parameters(merkle_root, batch_size_u256, metadata_uri)
        })
        .retry(self.retry_policy())
        .when(ChainError::is_retryable)
        .await?;

        let call = self
            .contract
            .anchorBatch(merkle_root, batch_size_u256, metadata_uri.to_string())
            .gas(gas_limit)
            .gas_price(gas_price);

        let pending = call.send().await.map_err(classify_contract_error)?;
        Ok(to_hex(pending.tx_hash().as_slice()))
    }

    async fn estimate_send_parameters(
        &self,
        merkle_root: B256,
        batch_size: U256,
        metadata_uri: &str,
    ) -> Result<(u64, u128), ChainError> {
        let call = self
            .contract
            .anchorBatch(merkle_root, batch_size, metadata_uri.to_string());
        let estimated = call.estimate_gas().await.map_err(classify_contract_error)?;
        let with_headroom = estimated + (estimated * self.config.gas_headroom_percent) / 100;

        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| ChainError::Retryable(format!("gas price read failed: {e}")))?;
        let clamped = gas_price.min(self.config.max_gas_price);

        Ok((with_headroom, clamped))
    }

    /// Read-only; the kernel's `verify_invoice` query calls this directly.
    pub async fn verify_invoice_by_cid(
        &self,
        merkle_root: B256,
        cid: &str,
        proof: Vec<B256>,
    ) -> Result<bool, ChainError> {
        (|| async {
            self.contract
                .verifyInvoiceByCID(merkle_root, cid.to_string(), proof.clone())
                .call()
                .await
                .map_err(classify_contract_error)
        })
        .retry(self.retry_policy())
        .when(ChainError::is_retryable)
        .await
    }

    /// Optional indexing write; best-effort, single attempt, never blocks a
    /// batch's progress (§4.4).
    pub async fn register_individual_invoice(
        &self,
        merkle_root: B256,
        invoice_id: &str,
        cid: &str,
        invoice_hash: B256,
    ) -> Result<(), ChainError> {
        if !self.has_signer {
            return Err(ChainError::NoSigner);
        }
        self.contract
            .registerIndividualInvoice(
                merkle_root,
                invoice_id.to_string(),
                cid.to_string(),
                invoice_hash,
            )
            .send()
            .await
            .map_err(classify_contract_error)?;
        Ok(())
    }

    pub async fn get_batch(&self, merkle_root: B256) -> Result<Option<BatchView>, ChainError> {
        let view = self
            .contract
            .getBatch(merkle_root)
            .call()
            .await
            .map_err(classify_contract_error)?;
        if view.timestamp.is_zero() {
            return Ok(None);
        }
        Ok(Some(view))
    }

    pub async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceiptInfo>, ChainError> {
        let hash: B256 = tx_hash
            .parse()
            .map_err(|e| ChainError::Permanent(format!("invalid tx hash {tx_hash}: {e}")))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| ChainError::Retryable(format!("receipt lookup failed: {e}")))?;
        Ok(receipt.map(|r| TransactionReceiptInfo {
            success: r.status(),
            block_number: r.block_number.unwrap_or_default(),
        }))
    }

    pub async fn get_current_block(&self) -> Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Retryable(format!("block number read failed: {e}")))
    }

    /// True iff a receipt exists with success status and the containing
    /// block is at least `required_confirmations` deep.
    pub async fn is_confirmed(
        &self,
        tx_hash: &str,
        required_confirmations: u64,
    ) -> Result<bool, ChainError> {
        let Some(receipt) = self.get_transaction_receipt(tx_hash).await? else {
            return Ok(false);
        };
        if !receipt.success {
            return Ok(false);
        }
        let current_block = self.get_current_block().await?;
        let depth = current_block.saturating_sub(receipt.block_number) + 1;
        Ok(depth >= required_confirmations)
    }
}

fn build_provider(rpc_url: Url, wallet: Option<EthereumWallet>) -> DynProvider {
    match wallet {
        Some(wallet) => ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(rpc_url)
            .erased(),
        None => ProviderBuilder::new()
            .with_recommended_fillers()
            .on_http(rpc_url)
            .erased(),
    }
}

fn classify_contract_error(err: alloy::contract::Error) -> ChainError {
    match &err {
        alloy::contract::Error::TransportError(_) => ChainError::Retryable(err.to_string()),
        _ => ChainError::Permanent(err.to_string()),
    }
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::mock::Asserter;

    fn dummy_config() -> ChainClientConfig {
        ChainClientConfig {
            rpc_url: "http://localhost:8545".parse().unwrap(),
            contract_address: Address::ZERO,
            private_key: None,
            gas_headroom_percent: 20,
            max_gas_price: 200_000_000_000,
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn mocked_client(asserter: Asserter) -> ChainClient {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .on_mocked_client(asserter)
            .erased();
        let config = dummy_config();
        let contract = IInvoiceAnchor::new(config.contract_address, provider.clone());
        ChainClient {
            contract,
            provider,
            has_signer: false,
            config,
        }
    }

    #[test]
    fn to_hex_prefixes_lowercase_hex() {
        assert_eq!(to_hex(&[0xab, 0x01]), "0xab01");
        assert_eq!(to_hex(&[]), "0x");
    }

    #[tokio::test]
    async fn anchor_batch_rejects_without_signer_before_touching_the_network() {
        let client = ChainClient::new(dummy_config()).unwrap();
        let err = client
            .anchor_batch(B256::ZERO, 10, "ipfs://metadata")
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::NoSigner));
    }

    #[tokio::test]
    async fn register_individual_invoice_rejects_without_signer() {
        let client = ChainClient::new(dummy_config()).unwrap();
        let err = client
            .register_individual_invoice(B256::ZERO, "INV-1", "bafy...", B256::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::NoSigner));
    }

    #[tokio::test]
    async fn get_current_block_reads_the_mocked_block_number() {
        let asserter = Asserter::new();
        asserter.push_success(&serde_json::json!("0x10"));
        let client = mocked_client(asserter);
        assert_eq!(client.get_current_block().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn verify_invoice_by_cid_decodes_a_true_result() {
        let asserter = Asserter::new();
        let encoded_true = format!("0x{}1", "0".repeat(63));
        asserter.push_success(&serde_json::json!(encoded_true));
        let client = mocked_client(asserter);
        let result = client
            .verify_invoice_by_cid(B256::ZERO, "bafy...", vec![])
            .await
            .unwrap();
        assert!(result);
    }

    #[tokio::test]
    async fn verify_invoice_by_cid_decodes_a_false_result() {
        let asserter = Asserter::new();
        let encoded_false = format!("0x{}", "0".repeat(64));
        asserter.push_success(&serde_json::json!(encoded_false));
        let client = mocked_client(asserter);
        let result = client
            .verify_invoice_by_cid(B256::ZERO, "bafy...", vec![])
            .await
            .unwrap();
        assert!(!result);
    }
}

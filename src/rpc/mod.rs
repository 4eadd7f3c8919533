use std::time::Duration;

use anyhow::{Context, Result};
use jsonrpsee::core::ClientError;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use serde_json::json;

use crate::config::NetworkConfig;
use crate::crypto::{ADDRESS_BYTES, ZERO_ADDRESS, format_address, parse_address};

pub mod abi;
pub mod tx;

/// How long to poll for a transaction receipt before giving up.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const RECEIPT_MAX_ATTEMPTS: u32 = 30;

/// JSON-RPC client for one EVM network. Cloning shares the underlying
/// HTTP connection pool.
#[derive(Clone)]
pub struct EvmRpcClient {
    inner: HttpClient,
    chain_id: u64,
    timeout: Duration,
}

impl EvmRpcClient {
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        assert!(!network.rpc_url.is_empty(), "RPC endpoint must be provided");
        let timeout = network.request_timeout();
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(&network.rpc_url)
            .with_context(|| format!("Failed to build RPC client for {}", network.rpc_url))?;

        Ok(Self {
            inner: client,
            chain_id: network.chain_id,
            timeout,
        })
    }

    pub fn chain_id(&self) -> u64 {
        assert!(self.chain_id > 0, "Chain id invariant broken");
        self.chain_id
    }

    pub fn timeout(&self) -> Duration {
        assert!(
            self.timeout >= Duration::from_millis(100),
            "Timeout invariant broken"
        );
        self.timeout
    }

    /// Raw `eth_call` against the latest block.
    pub async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let params = rpc_params![json!({"to": to, "data": abi::to_hex(data)}), "latest"];
        let response: String = self
            .inner
            .request("eth_call", params)
            .await
            .with_context(|| format!("RPC call eth_call to {to} failed"))?;
        abi::parse_hex_bytes(&response)
    }

    /// ERC-721 `balanceOf`. Badge balances are tiny integers; anything
    /// larger than u64 indicates a broken contract.
    pub async fn badge_balance(&self, contract: &str, wallet: &str) -> Result<u64> {
        let wallet_bytes = parse_address(wallet)?;
        let data = abi::call_data("balanceOf(address)", &[abi::word_from_address(&wallet_bytes)]);
        let response = self.call(contract, &data).await?;
        let balance = abi::decode_u256_word(&response)?;
        assert!(
            balance <= u64::MAX as u128,
            "Badge balance exceeds u64 bounds"
        );
        Ok(balance as u64)
    }

    /// ERC-721 `ownerOf`, with the zero address as the not-minted
    /// sentinel: the call reverts for nonexistent tokens.
    pub async fn token_owner(&self, contract: &str, token_id: u64) -> Result<String> {
        let data = abi::call_data("ownerOf(uint256)", &[abi::word_from_u256(token_id as u128)]);
        let params = rpc_params![json!({"to": contract, "data": abi::to_hex(&data)}), "latest"];
        let response: Result<String, ClientError> = self.inner.request("eth_call", params).await;
        match response {
            Ok(raw) => {
                let bytes = abi::parse_hex_bytes(&raw)?;
                let owner = abi::decode_address_word(&bytes)?;
                Ok(format_address(&owner))
            }
            Err(ClientError::Call(_)) => Ok(ZERO_ADDRESS.to_string()),
            Err(err) => Err(err).with_context(|| format!("RPC call ownerOf({token_id}) failed")),
        }
    }

    /// Message hashes minted into a badge: `getMessages(uint256)`
    /// returning `bytes32[]`.
    pub async fn token_messages(&self, contract: &str, token_id: u64) -> Result<Vec<[u8; 32]>> {
        let data = abi::call_data(
            "getMessages(uint256)",
            &[abi::word_from_u256(token_id as u128)],
        );
        let response = self.call(contract, &data).await?;
        let hashes = abi::decode_bytes32_array(&response)?;
        Ok(hashes)
    }

    pub async fn transaction_count(&self, address: &[u8; ADDRESS_BYTES]) -> Result<u64> {
        let response: String = self
            .inner
            .request(
                "eth_getTransactionCount",
                rpc_params![format_address(address), "pending"],
            )
            .await
            .context("RPC call eth_getTransactionCount failed")?;
        let count = abi::parse_quantity(&response)?;
        assert!(count <= u64::MAX as u128, "Nonce exceeds u64 bounds");
        Ok(count as u64)
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let response: String = self
            .inner
            .request("eth_gasPrice", rpc_params![])
            .await
            .context("RPC call eth_gasPrice failed")?;
        abi::parse_quantity(&response)
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        let tx_hash: String = self
            .inner
            .request("eth_sendRawTransaction", rpc_params![abi::to_hex(raw)])
            .await
            .context("RPC call eth_sendRawTransaction failed")?;
        assert!(!tx_hash.is_empty(), "RPC returned empty transaction hash");
        Ok(tx_hash)
    }

    /// Poll for a receipt until the transaction lands or the attempt
    /// budget runs out.
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        for _ in 0..RECEIPT_MAX_ATTEMPTS {
            let receipt: Option<TransactionReceipt> = self
                .inner
                .request("eth_getTransactionReceipt", rpc_params![tx_hash])
                .await
                .context("RPC call eth_getTransactionReceipt failed")?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        anyhow::bail!("Transaction {tx_hash} not mined within receipt window")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub status: Option<String>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_status_interpretation() {
        let ok = TransactionReceipt {
            transaction_hash: "0xabc".into(),
            status: Some("0x1".into()),
        };
        let reverted = TransactionReceipt {
            transaction_hash: "0xdef".into(),
            status: Some("0x0".into()),
        };
        let pre_byzantium = TransactionReceipt {
            transaction_hash: "0x123".into(),
            status: None,
        };
        assert!(ok.succeeded());
        assert!(!reverted.succeeded());
        assert!(!pre_byzantium.succeeded());
    }
}

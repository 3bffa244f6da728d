//! Alloy RPC provider integration for the ledger collaborator.
//!
//! Fetches transfer logs, transaction receipts and block timestamps from an
//! EVM JSON-RPC endpoint and maps Alloy types to cycle-data schema types.

use alloy::network::Ethereum;
use alloy::primitives::{Address, B256};
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::{BlockId, BlockNumberOrTag};
use alloy::rpc::types::{Filter, Log};
use eyre::{eyre, Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::source::{BlockSource, LedgerSource};
use crate::types::{LogQuery, RawData, RawLog, RawQuantity, TxReceipt};

type ProviderType = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider<Ethereum>,
>;

/// ERC-20 `decimals()` selector.
const DECIMALS_SELECTOR: &str = "0x313ce567";

/// Read-only ledger client backed by an Alloy HTTP provider.
pub struct RpcLedger {
    provider: Arc<ProviderType>,
    rpc_url: String,
    client: Client,
}

impl RpcLedger {
    /// Creates a new ledger client and tests RPC connectivity.
    ///
    /// Verifies connection via `eth_blockNumber`. Failing here is the only
    /// fatal ledger error: the monitor never starts its loop without it.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or the connectivity test fails.
    ///
    /// # Example
    /// ```no_run
    /// # use cycle_data::ledger::RpcLedger;
    /// # async fn example() -> eyre::Result<()> {
    /// let ledger = RpcLedger::connect("https://bsc-dataseed.bnbchain.org").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider =
            ProviderBuilder::new().on_http(rpc_url.parse().wrap_err("invalid RPC URL format")?);
        let provider = Arc::new(provider);

        let block_number = provider
            .get_block_number()
            .await
            .wrap_err("failed to test RPC connectivity with eth_blockNumber")?;

        tracing::info!(
            rpc_url = %rpc_url,
            latest_block = block_number,
            "RPC connection successful"
        );

        Ok(Self {
            provider,
            rpc_url: rpc_url.to_string(),
            client: Client::new(),
        })
    }

    /// Reads an ERC-20 token's `decimals()` via `eth_call` at the latest block.
    ///
    /// # Errors
    /// Returns error if the call fails or the return word is not a `uint8`.
    #[tracing::instrument(skip(self))]
    pub async fn token_decimals(&self, token: Address) -> Result<u8> {
        let params = serde_json::json!([
            {
                "to": format!("{token:#x}"),
                "data": DECIMALS_SELECTOR,
            },
            "latest"
        ]);

        let result_hex = rpc_hex_result(&self.client, &self.rpc_url, "eth_call", params).await?;
        parse_uint8_word(&result_hex)
    }
}

impl BlockSource for RpcLedger {
    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>> {
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumberOrTag::Number(block_number)))
            .await
            .wrap_err_with(|| format!("failed to fetch block {}", block_number))?;

        match block {
            Some(block) => Ok(Some(block.header.timestamp)),
            None => {
                tracing::debug!(block_number, "block not found");
                Ok(None)
            }
        }
    }
}

impl LedgerSource for RpcLedger {
    async fn head_block(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .wrap_err("eth_blockNumber failed")
    }

    #[tracing::instrument(skip(self), fields(from = query.from_block, to = query.to_block))]
    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.topic0)
            .from_block(query.from_block)
            .to_block(query.to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .wrap_err_with(|| {
                format!(
                    "eth_getLogs failed for blocks {}..={}",
                    query.from_block, query.to_block
                )
            })?;

        Ok(logs.iter().map(map_log).collect())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .wrap_err_with(|| format!("failed to fetch receipt {}", tx_hash))?;

        Ok(receipt.map(|receipt| TxReceipt {
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            logs: receipt.inner.logs().iter().map(map_log).collect(),
        }))
    }
}

/// Maps an Alloy RPC log into the raw schema type.
fn map_log(log: &Log) -> RawLog {
    RawLog {
        address: format!("{:#x}", log.address()),
        topics: log.topics().iter().map(|t| format!("{t:#x}")).collect(),
        data: RawData::Bytes(log.data().data.to_vec()),
        block_number: RawQuantity::Number(log.block_number.unwrap_or_default()),
        transaction_hash: log
            .transaction_hash
            .map(|hash| format!("{hash:#x}"))
            .unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// Helper to make a JSON-RPC call and extract the hex result string.
async fn rpc_hex_result(
    client: &Client,
    rpc_url: &str,
    method: &str,
    params: serde_json::Value,
) -> Result<String> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let response = client
        .post(rpc_url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| eyre!("{} request failed: {}", method, e))?;

    let status = response.status();
    let rpc: RpcResponse<String> = response
        .json()
        .await
        .map_err(|e| eyre!("failed to decode {} response: {}", method, e))?;

    if !status.is_success() {
        return Err(eyre!("{} HTTP status: {}", method, status));
    }

    if let Some(error) = rpc.error {
        return Err(eyre!(
            "{} RPC error {}: {}",
            method,
            error.code,
            error.message
        ));
    }

    rpc.result.ok_or_else(|| eyre!("{} missing result", method))
}

/// Decodes a single ABI word holding a `uint8`.
fn parse_uint8_word(result_hex: &str) -> Result<u8> {
    let raw = result_hex.trim_start_matches("0x");
    if raw.is_empty() || raw.len() > 64 {
        return Err(eyre!(
            "decimals() returned {} hex chars, expected 1..=64",
            raw.len()
        ));
    }

    let trimmed = raw.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(0);
    }
    u8::from_str_radix(trimmed, 16).map_err(|e| eyre!("decimals() is not a uint8: {}", e))
}

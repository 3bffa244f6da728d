//! Type definitions shared between the ledger boundary and the cycle engine.

use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ERC-20 Transfer event signature: `keccak256("Transfer(address,address,uint256)")`.
pub const ERC20_TRANSFER_TOPIC0: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Non-indexed log payload as delivered by a log source.
///
/// Some sources hand out raw bytes, others the `0x`-prefixed hex text of the
/// same bytes. Both encodings decode to the same integer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawData {
    /// Big-endian byte sequence.
    Bytes(Vec<u8>),
    /// Hex text, with or without `0x` prefix.
    Hex(String),
}

/// A block number in whichever encoding the source used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawQuantity {
    /// Already an integer.
    Number(u64),
    /// `0x`-prefixed hex text, or plain decimal text.
    Hex(String),
    /// Big-endian byte sequence.
    Bytes(Vec<u8>),
}

/// Raw ledger log entry, before normalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    /// Address of the contract that emitted the log (hex with 0x).
    pub address: String,
    /// Topics in emission order; topic0 is the event signature (hex with 0x).
    pub topics: Vec<String>,
    /// Non-indexed log data.
    pub data: RawData,
    /// Block containing this log.
    pub block_number: RawQuantity,
    /// Transaction hash that emitted this log (hex with 0x).
    pub transaction_hash: String,
    /// Log index within the block (global ordering).
    pub log_index: u64,
}

/// Subset of a transaction receipt the engine needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// Effective gas price in Wei.
    pub effective_gas_price: u128,
    /// Every log emitted by the transaction, in emission order.
    pub logs: Vec<RawLog>,
}

/// `eth_getLogs` query for one contract and one event signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogQuery {
    /// First block (inclusive).
    pub from_block: u64,
    /// Last block (inclusive).
    pub to_block: u64,
    /// Emitting contract.
    pub address: Address,
    /// Event signature (topic0).
    pub topic0: B256,
}

/// Identity of a token contract the engine watches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenConfig {
    /// Contract address.
    pub address: Address,
    /// Transfer event signature for this contract.
    pub transfer_topic: B256,
    /// Declared decimal precision.
    pub decimals: u8,
}

/// Swap direction relative to the primary token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Stablecoin in, primary token received by the wallet.
    Buy,
    /// Primary token sent by the wallet, stablecoin out.
    Sell,
}

impl Side {
    /// Lowercase label used in the journal.
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// One line of the wallet registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletEntry {
    /// Monitored address.
    pub address: Address,
    /// Display name.
    pub name: String,
    /// Whether the wallet starts mid-cycle, waiting for its sell.
    pub starts_awaiting_sell: bool,
}

/// One accepted half-cycle for a wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleEvent {
    /// Wallet display name.
    pub wallet_name: String,
    /// Wallet address.
    pub wallet_address: Address,
    /// Direction of the half-cycle.
    pub side: Side,
    /// Stablecoin amount swapped (zero when no companion transfer was found).
    pub amount: Decimal,
    /// Half-cycle index shown as `index/limit`.
    pub half_cycle_index: u32,
    /// Configured cycle limit.
    pub cycle_limit: u32,
    /// Block timestamp in unix seconds.
    pub timestamp: u64,
    /// Realized loss for a sell with a known prior buy (negative is a gain).
    pub loss: Option<Decimal>,
    /// Native-currency fee paid by the transaction.
    pub fee_native: Decimal,
    /// Block containing the transfer.
    pub block_number: u64,
    /// Transaction hash of the transfer.
    pub tx_hash: B256,
}

/// Summary emitted once a wallet finishes its configured cycles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Wallet display name.
    pub wallet_name: String,
    /// Wallet address.
    pub wallet_address: Address,
    /// Number of cycles completed.
    pub cycles: u32,
    /// Total stablecoin spent on buys.
    pub total_stable_spent: Decimal,
    /// Sum of realized losses.
    pub total_lost: Decimal,
    /// Sum of fees in native currency.
    pub total_fees_native: Decimal,
    /// Fees converted with the run's native price.
    pub total_fees_display: Decimal,
    /// Stablecoin received by the terminal sell.
    pub final_swap_amount: Decimal,
    /// Seconds between first and last matched event.
    pub duration_secs: Option<u64>,
    /// Block of the terminal sell.
    pub block_number: u64,
}

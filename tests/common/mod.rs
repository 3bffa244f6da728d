//! Shared test helpers: an in-memory ledger, recording collaborators and
//! factories for swap transactions.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use alloy::primitives::{hex, Address, B256, U256};
use cycle_data::types::{
    CompletionReport, CycleEvent, LogQuery, RawData, RawLog, RawQuantity, TokenConfig, TxReceipt,
    WalletEntry, ERC20_TRANSFER_TOPIC0,
};
use cycle_data::{BlockSource, LedgerSource, Notifier, ReportSink};
use cycle_engine::decoder::address_topic;
use cycle_engine::{
    Emitter, Monitor, MonitorConfig, Pacing, ReportStyle, TimestampResolver, WalletBook,
};
use eyre::{eyre, Result};
use rust_decimal::Decimal;

/// Primary token contract.
pub const TOKEN: Address = Address::new([0xee; 20]);
/// Stablecoin contract.
pub const STABLE: Address = Address::new([0xcc; 20]);
/// Swap pool used as counterparty.
pub const POOL: Address = Address::new([0x50; 20]);

/// Gas used by every mock transaction.
pub const GAS_USED: u64 = 100_000;
/// 1 gwei.
pub const GAS_PRICE: u128 = 1_000_000_000;

/// Timestamp of `block` in the mock ledger.
pub fn block_time(block: u64) -> u64 {
    1_700_000_000 + block * 3
}

pub fn wallet(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn entry(n: u8, name: &str) -> WalletEntry {
    WalletEntry {
        address: wallet(n),
        name: name.to_string(),
        starts_awaiting_sell: false,
    }
}

pub fn transfer_topic() -> B256 {
    ERC20_TRANSFER_TOPIC0
        .parse()
        .expect("transfer topic constant is valid hex")
}

/// Raw amount of `units` whole tokens at 18 decimals.
pub fn units(units: u64) -> U256 {
    U256::from(units) * U256::from(10u8).pow(U256::from(18u8))
}

/// Deterministic transaction hash for a (block, log index) pair.
pub fn tx_hash(block: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[16..24].copy_from_slice(&block.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

/// A transfer log with hex-encoded payload and block number.
pub fn transfer_log(
    contract: Address,
    from: Address,
    to: Address,
    amount: U256,
    block: u64,
    log_index: u64,
) -> RawLog {
    RawLog {
        address: format!("{contract:#x}"),
        topics: vec![
            ERC20_TRANSFER_TOPIC0.to_string(),
            address_topic(from),
            address_topic(to),
        ],
        data: RawData::Hex(hex::encode_prefixed(amount.to_be_bytes::<32>())),
        block_number: RawQuantity::Hex(format!("{block:#x}")),
        transaction_hash: format!("{:#x}", tx_hash(block, log_index)),
        log_index,
    }
}

/// Same log with a byte payload and an integer block number.
pub fn as_bytes_encoded(mut log: RawLog) -> RawLog {
    if let RawData::Hex(text) = &log.data {
        let amount = U256::from_str_radix(text.trim_start_matches("0x"), 16)
            .expect("test payload is valid hex");
        log.data = RawData::Bytes(amount.to_be_bytes::<32>().to_vec());
    }
    if let RawQuantity::Hex(text) = &log.block_number {
        let block = u64::from_str_radix(text.trim_start_matches("0x"), 16)
            .expect("test block number is valid hex");
        log.block_number = RawQuantity::Number(block);
    }
    log
}

/// In-memory ledger double.
#[derive(Default)]
pub struct MockLedger {
    pub head: Cell<u64>,
    logs: RefCell<Vec<RawLog>>,
    receipts: RefCell<HashMap<B256, TxReceipt>>,
    missing_blocks: RefCell<HashSet<u64>>,
    failing_receipts: RefCell<HashSet<B256>>,
    /// Fail the next `logs` call with a transport error.
    pub fail_next_logs: Cell<bool>,
    /// Return every log in range regardless of the queried contract.
    pub ignore_address_filter: Cell<bool>,
    pub block_calls: Cell<u32>,
    pub log_calls: Cell<u32>,
    pub receipt_calls: Cell<u32>,
    pub queries: RefCell<Vec<LogQuery>>,
}

impl MockLedger {
    pub fn new(head: u64) -> Self {
        let ledger = Self::default();
        ledger.head.set(head);
        ledger
    }

    /// Adds a log that the log query returns, without a receipt.
    pub fn push_log(&self, log: RawLog) {
        self.logs.borrow_mut().push(log);
    }

    pub fn set_receipt(&self, hash: B256, receipt: TxReceipt) {
        self.receipts.borrow_mut().insert(hash, receipt);
    }

    /// A buy: the pool sends primary tokens to `buyer`, `buyer` pays `stable`
    /// whole stablecoins to the pool.
    pub fn add_buy(&self, buyer: Address, block: u64, log_index: u64, stable: u64) -> B256 {
        let primary = transfer_log(TOKEN, POOL, buyer, units(1_000), block, log_index);
        let payment = transfer_log(STABLE, buyer, POOL, units(stable), block, log_index);
        self.add_swap(primary, vec![as_bytes_encoded(payment)])
    }

    /// A sell: `seller` sends primary tokens to the pool and receives
    /// `stable` whole stablecoins.
    pub fn add_sell(&self, seller: Address, block: u64, log_index: u64, stable: u64) -> B256 {
        let primary = transfer_log(TOKEN, seller, POOL, units(1_000), block, log_index);
        let proceeds = transfer_log(STABLE, POOL, seller, units(stable), block, log_index);
        self.add_swap(primary, vec![as_bytes_encoded(proceeds)])
    }

    /// Registers `primary` as a ledger log and its receipt with the given
    /// companion logs followed by the primary log itself.
    pub fn add_swap(&self, primary: RawLog, mut companions: Vec<RawLog>) -> B256 {
        let hash: B256 = primary
            .transaction_hash
            .parse()
            .expect("test tx hash is valid");
        companions.push(primary.clone());
        self.set_receipt(
            hash,
            TxReceipt {
                gas_used: GAS_USED,
                effective_gas_price: GAS_PRICE,
                logs: companions,
            },
        );
        self.push_log(primary);
        hash
    }

    pub fn mark_block_missing(&self, block: u64) {
        self.missing_blocks.borrow_mut().insert(block);
    }

    pub fn mark_block_available(&self, block: u64) {
        self.missing_blocks.borrow_mut().remove(&block);
    }

    /// Fail the next receipt lookup for `hash` once.
    pub fn fail_receipt_once(&self, hash: B256) {
        self.failing_receipts.borrow_mut().insert(hash);
    }
}

impl BlockSource for MockLedger {
    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>> {
        self.block_calls.set(self.block_calls.get() + 1);
        if self.missing_blocks.borrow().contains(&block_number) {
            return Ok(None);
        }
        Ok(Some(block_time(block_number)))
    }
}

impl LedgerSource for MockLedger {
    async fn head_block(&self) -> Result<u64> {
        Ok(self.head.get())
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>> {
        self.log_calls.set(self.log_calls.get() + 1);
        self.queries.borrow_mut().push(*query);
        if self.fail_next_logs.replace(false) {
            return Err(eyre!("connection reset by peer"));
        }

        let contract = format!("{:#x}", query.address);
        let in_range = |log: &RawLog| {
            let block = match &log.block_number {
                RawQuantity::Number(n) => *n,
                RawQuantity::Hex(text) => {
                    u64::from_str_radix(text.trim_start_matches("0x"), 16).unwrap_or(u64::MAX)
                }
                RawQuantity::Bytes(_) => u64::MAX,
            };
            (query.from_block..=query.to_block).contains(&block)
        };

        Ok(self
            .logs
            .borrow()
            .iter()
            .filter(|log| in_range(log))
            .filter(|log| {
                self.ignore_address_filter.get() || log.address.eq_ignore_ascii_case(&contract)
            })
            .cloned()
            .collect())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        self.receipt_calls.set(self.receipt_calls.get() + 1);
        if self.failing_receipts.borrow_mut().remove(&tx_hash) {
            return Err(eyre!("receipt request timed out"));
        }
        Ok(self.receipts.borrow().get(&tx_hash).cloned())
    }
}

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: RefCell<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}

/// Report sink that keeps every record in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub events: RefCell<Vec<(CycleEvent, String)>>,
    pub completions: RefCell<Vec<(CompletionReport, String)>>,
}

impl ReportSink for RecordingSink {
    async fn record_event(&self, event: &CycleEvent, line: &str) -> Result<()> {
        self.events
            .borrow_mut()
            .push((event.clone(), line.to_string()));
        Ok(())
    }

    async fn record_completion(&self, report: &CompletionReport, line: &str) -> Result<()> {
        self.completions
            .borrow_mut()
            .push((report.clone(), line.to_string()));
        Ok(())
    }
}

pub type TestMonitor = Monitor<MockLedger, RecordingNotifier, RecordingSink>;

/// Native price used by test monitors.
pub fn native_price() -> Decimal {
    Decimal::from(600)
}

pub fn test_config(max_block_span: u64) -> MonitorConfig {
    MonitorConfig {
        token: TokenConfig {
            address: TOKEN,
            transfer_topic: transfer_topic(),
            decimals: 18,
        },
        stable: TokenConfig {
            address: STABLE,
            transfer_topic: transfer_topic(),
            decimals: 18,
        },
        max_block_span,
        pacing: Pacing::default(),
    }
}

/// Monitor over `ledger` with zero retry delay, UTC clock and a
/// 3-attempt timestamp resolver.
pub fn test_monitor(
    ledger: MockLedger,
    wallets: &[WalletEntry],
    cycle_limit: u32,
    start_block: u64,
) -> TestMonitor {
    test_monitor_with(ledger, wallets, cycle_limit, start_block, test_config(1_000))
}

pub fn test_monitor_with(
    ledger: MockLedger,
    wallets: &[WalletEntry],
    cycle_limit: u32,
    start_block: u64,
    config: MonitorConfig,
) -> TestMonitor {
    let book = WalletBook::new(wallets, cycle_limit).expect("test registry is valid");
    let style = ReportStyle {
        utc: true,
        ..ReportStyle::default()
    };
    Monitor::new(
        ledger,
        book,
        TimestampResolver::new(3, Duration::ZERO),
        Emitter::new(
            RecordingNotifier::default(),
            RecordingSink::default(),
            native_price(),
            style,
        ),
        config,
        start_block,
    )
}

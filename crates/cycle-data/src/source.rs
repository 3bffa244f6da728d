//! Collaborator seams between the cycle engine and the outside world.
//!
//! The engine is generic over these traits so the polling loop can run
//! against the JSON-RPC ledger in production and an in-memory ledger in tests.
//! All implementations are driven from a single task; none of the futures
//! need to be `Send`.

use alloy::primitives::B256;
use eyre::Result;

use crate::types::{CompletionReport, CycleEvent, LogQuery, RawLog, TxReceipt};

/// Resolves block numbers to block timestamps.
#[allow(async_fn_in_trait)]
pub trait BlockSource {
    /// Returns the block timestamp in unix seconds.
    ///
    /// `Ok(None)` means the block is not available yet and the lookup may be
    /// retried. `Err` is a transport failure.
    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>>;
}

/// Read-only view of the ledger used by the polling loop.
#[allow(async_fn_in_trait)]
pub trait LedgerSource: BlockSource {
    /// Latest block number known to the node.
    async fn head_block(&self) -> Result<u64>;

    /// Logs matching `query`, ordered by (block, log index) ascending.
    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>>;

    /// Receipt for `tx_hash`; `Ok(None)` if the node has not indexed it yet.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>>;
}

/// Best-effort outbound message delivery.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Sends `message`. Failures are swallowed by the implementation.
    async fn notify(&self, message: &str);
}

/// Persistent record of emitted report lines.
#[allow(async_fn_in_trait)]
pub trait ReportSink {
    /// Records one accepted half-cycle together with its display line.
    async fn record_event(&self, event: &CycleEvent, line: &str) -> Result<()>;

    /// Records a completion report together with its display line.
    async fn record_completion(&self, report: &CompletionReport, line: &str) -> Result<()>;
}

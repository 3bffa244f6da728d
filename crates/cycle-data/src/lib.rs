//! cycle-data crate
//!
//! Boundary types and collaborators of the swap-cycle monitor: the ledger
//! client, price quote, notifier, wallet registry and the report journal.

pub mod journal;
pub mod ledger;
pub mod notify;
pub mod price;
pub mod registry;
pub mod source;
pub mod store;
pub mod types;

pub use source::{BlockSource, LedgerSource, Notifier, ReportSink};
pub use types::{
    CompletionReport, CycleEvent, LogQuery, RawData, RawLog, RawQuantity, Side, TokenConfig,
    TxReceipt, WalletEntry,
};

//! cycle-engine crate
//!
//! Turns primary-token transfer logs into per-wallet buy/sell cycles:
//! decoding, stablecoin correlation, fee and loss accounting, timestamp
//! resolution, report emission and the polling loop that drives them.

pub mod correlate;
pub mod decoder;
pub mod fees;
pub mod monitor;
pub mod report;
pub mod timestamps;
pub mod wallet;

pub use decoder::{decode_transfer, DecodeError, TransferEvent};
pub use monitor::{Monitor, MonitorConfig, Pacing, PollOutcome, RangeSummary};
pub use report::{Emitter, ReportStyle};
pub use timestamps::{ResolveError, TimestampResolver};
pub use wallet::{BookError, Fill, Match, Phase, Transition, WalletBook, WalletSnapshot};

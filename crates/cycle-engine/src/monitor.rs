//! Sequential polling loop.
//!
//! One [`Monitor`] owns the wallet book and drives every collaborator from a
//! single task. Ranges are processed one at a time and logs within a range in
//! ledger order, so wallet transitions are applied in the order the ledger
//! recorded them.

use std::time::Duration;

use alloy::primitives::Address;
use cycle_data::types::{LogQuery, RawLog, Side, TokenConfig};
use cycle_data::{LedgerSource, Notifier, ReportSink};
use eyre::{eyre, Context, Result};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::correlate::correlate;
use crate::decoder::{decode_transfer, TransferEvent};
use crate::fees::fee_native;
use crate::report::Emitter;
use crate::timestamps::TimestampResolver;
use crate::wallet::{Fill, WalletBook, WalletSnapshot};

/// Sleep intervals of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// No new block since the last poll.
    pub idle: Duration,
    /// After a range that returned logs.
    pub after_logs: Duration,
    /// After a range without logs.
    pub after_empty: Duration,
    /// After a transient failure; the same range is retried.
    pub after_error: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            idle: Duration::from_millis(750),
            after_logs: Duration::from_millis(500),
            after_empty: Duration::from_secs(1),
            after_error: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Primary token whose transfers drive the cycles.
    pub token: TokenConfig,
    /// Stablecoin used to price each swap.
    pub stable: TokenConfig,
    /// Most blocks requested by one poll.
    pub max_block_span: u64,
    pub pacing: Pacing,
}

/// Counters for one processed block range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub from_block: u64,
    pub to_block: u64,
    /// Logs returned by the source.
    pub logs: usize,
    /// Logs that were not transfers of the expected shape.
    pub undecodable: usize,
    /// Logs handled before a retry of the same range.
    pub already_applied: usize,
    /// Logs matched to a wallet and applied.
    pub applied: usize,
    /// Matched logs dropped because their block never resolved.
    pub skipped: usize,
    /// Completion reports emitted.
    pub completions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The head has not moved past the cursor.
    Idle { head: u64 },
    Processed(RangeSummary),
}

enum Step {
    AlreadyApplied,
    Ignored,
    Skipped,
    Applied { completed: bool },
}

pub struct Monitor<S, N, R> {
    source: S,
    book: WalletBook,
    resolver: TimestampResolver,
    emitter: Emitter<N, R>,
    config: MonitorConfig,
    next_block: u64,
    last_handled: Option<(u64, u64)>,
}

impl<S, N, R> Monitor<S, N, R>
where
    S: LedgerSource,
    N: Notifier,
    R: ReportSink,
{
    /// Creates a monitor whose first poll starts at `start_block`.
    pub fn new(
        source: S,
        book: WalletBook,
        resolver: TimestampResolver,
        emitter: Emitter<N, R>,
        config: MonitorConfig,
        start_block: u64,
    ) -> Self {
        Self {
            source,
            book,
            resolver,
            emitter,
            config,
            next_block: start_block,
            last_handled: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn book(&self) -> &WalletBook {
        &self.book
    }

    pub fn emitter(&self) -> &Emitter<N, R> {
        &self.emitter
    }

    pub fn resolver(&self) -> &TimestampResolver {
        &self.resolver
    }

    /// First block the next poll will request.
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    pub fn snapshot(&self) -> Vec<WalletSnapshot> {
        self.book.snapshot()
    }

    /// Poll the head once and process at most `max_block_span` new blocks.
    ///
    /// The cursor only advances when the whole range succeeded.
    ///
    /// # Errors
    /// Returns a transient source failure; calling again retries the same range.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let head = self
            .source
            .head_block()
            .await
            .wrap_err("failed to fetch head block")?;
        if head < self.next_block {
            return Ok(PollOutcome::Idle { head });
        }

        let span = self.config.max_block_span.max(1);
        let to_block = head.min(self.next_block.saturating_add(span - 1));
        let summary = self.process_range(self.next_block, to_block).await?;
        self.next_block = to_block + 1;
        Ok(PollOutcome::Processed(summary))
    }

    /// Process every primary-token transfer in `from_block..=to_block`.
    ///
    /// Logs handled by an earlier, failed attempt at the same range are not
    /// applied twice.
    ///
    /// # Errors
    /// Returns a transient failure fetching logs, a block, or a receipt.
    #[instrument(skip(self), fields(logs = tracing::field::Empty))]
    pub async fn process_range(&mut self, from_block: u64, to_block: u64) -> Result<RangeSummary> {
        let query = LogQuery {
            from_block,
            to_block,
            address: self.config.token.address,
            topic0: self.config.token.transfer_topic,
        };
        let raw_logs = self
            .source
            .logs(&query)
            .await
            .wrap_err_with(|| format!("failed to fetch logs for blocks {from_block}..={to_block}"))?;
        tracing::Span::current().record("logs", raw_logs.len());

        let mut summary = RangeSummary {
            from_block,
            to_block,
            logs: raw_logs.len(),
            ..RangeSummary::default()
        };

        let mut transfers: Vec<TransferEvent> = Vec::with_capacity(raw_logs.len());
        for log in &raw_logs {
            match decode_transfer(log, self.config.token.transfer_topic) {
                Ok(transfer) => transfers.push(transfer),
                Err(e) => {
                    debug!(tx = %log.transaction_hash, error = %e, "skipping log");
                    summary.undecodable += 1;
                }
            }
        }
        transfers.sort_by_key(TransferEvent::position);

        for transfer in transfers {
            match self.process_transfer(&transfer).await? {
                Step::AlreadyApplied => summary.already_applied += 1,
                Step::Ignored => {}
                Step::Skipped => summary.skipped += 1,
                Step::Applied { completed } => {
                    summary.applied += 1;
                    if completed {
                        summary.completions += 1;
                    }
                }
            }
            self.last_handled = self.last_handled.max(Some(transfer.position()));
        }

        Ok(summary)
    }

    async fn process_transfer(&mut self, transfer: &TransferEvent) -> Result<Step> {
        if self
            .last_handled
            .is_some_and(|last| transfer.position() <= last)
        {
            return Ok(Step::AlreadyApplied);
        }
        if transfer.token != self.config.token.address {
            debug!(token = %transfer.token, "ignoring transfer of another contract");
            return Ok(Step::Ignored);
        }
        let Some(matched) = self.book.match_transfer(transfer) else {
            return Ok(Step::Ignored);
        };
        let wallet = self
            .book
            .address(matched.index)
            .ok_or_else(|| eyre!("matched wallet index {} out of range", matched.index))?;

        let timestamp = match self.resolver.resolve(&self.source, transfer.block_number).await {
            Ok(ts) => ts,
            Err(e) if !e.is_retryable() => {
                warn!(
                    %wallet,
                    tx = %transfer.tx_hash,
                    error = %e,
                    "skipping event, block timestamp unavailable"
                );
                return Ok(Step::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        let receipt = self
            .source
            .receipt(transfer.tx_hash)
            .await
            .wrap_err_with(|| format!("failed to fetch receipt {}", transfer.tx_hash))?
            .ok_or_else(|| eyre!("receipt {} not available yet", transfer.tx_hash))?;

        let amount = self.correlated_amount(&receipt.logs, wallet, matched.side, transfer);
        let fill = Fill {
            amount,
            fee_native: fee_native(receipt.gas_used, receipt.effective_gas_price),
            timestamp,
            block_number: transfer.block_number,
            tx_hash: transfer.tx_hash,
        };

        let Some(transition) = self.book.apply(matched, fill) else {
            return Ok(Step::Ignored);
        };
        let completed = self.emitter.emit(transition).await.is_some();
        Ok(Step::Applied { completed })
    }

    fn correlated_amount(
        &self,
        receipt_logs: &[RawLog],
        wallet: Address,
        side: Side,
        transfer: &TransferEvent,
    ) -> Decimal {
        correlate(receipt_logs, wallet, side, &self.config.stable).unwrap_or_else(|| {
            debug!(
                %wallet,
                tx = %transfer.tx_hash,
                side = side.as_str(),
                "no stablecoin leg found, recording zero amount"
            );
            Decimal::ZERO
        })
    }

    /// Poll forever, pacing between polls. Transient failures are logged and
    /// the same range is retried.
    pub async fn run(&mut self) {
        info!(
            start_block = self.next_block,
            wallets = self.book.len(),
            cycle_limit = self.book.cycle_limit(),
            "monitoring started"
        );
        let pacing = self.config.pacing;

        loop {
            let pause = match self.poll_once().await {
                Ok(PollOutcome::Idle { .. }) => pacing.idle,
                Ok(PollOutcome::Processed(summary)) => {
                    if summary.applied > 0 || summary.skipped > 0 {
                        info!(
                            from = summary.from_block,
                            to = summary.to_block,
                            applied = summary.applied,
                            skipped = summary.skipped,
                            "range processed"
                        );
                    }
                    if summary.logs > 0 {
                        pacing.after_logs
                    } else {
                        pacing.after_empty
                    }
                }
                Err(e) => {
                    warn!(error = ?e, next_block = self.next_block, "poll failed, retrying");
                    pacing.after_error
                }
            };
            tokio::time::sleep(pause).await;
        }
    }
}

//! Report lines for accepted half-cycles and finished wallets.

use chrono::{DateTime, Local, TimeZone, Utc};
use cycle_data::types::{CompletionReport, CycleEvent, Side};
use cycle_data::{Notifier, ReportSink};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::fees::{format_amount, format_duration, format_fixed2};
use crate::wallet::Transition;

/// Display names and clock used in report lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStyle {
    pub token_symbol: String,
    pub stable_symbol: String,
    pub native_symbol: String,
    /// Format times in UTC instead of the local zone.
    pub utc: bool,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            token_symbol: "ZKJ".to_string(),
            stable_symbol: "USDC".to_string(),
            native_symbol: "BNB".to_string(),
            utc: false,
        }
    }
}

impl ReportStyle {
    /// `HH:MM:SS` for a unix timestamp.
    pub fn clock(&self, timestamp: u64) -> String {
        let Ok(secs) = i64::try_from(timestamp) else {
            return timestamp.to_string();
        };
        let formatted = if self.utc {
            DateTime::<Utc>::from_timestamp(secs, 0).map(|t| t.format("%H:%M:%S").to_string())
        } else {
            Local
                .timestamp_opt(secs, 0)
                .single()
                .map(|t| t.format("%H:%M:%S").to_string())
        };
        formatted.unwrap_or_else(|| timestamp.to_string())
    }

    /// `alice [2/10] Swap 100 USDC for ZKJ | 12:00:05`
    pub fn event_line(&self, event: &CycleEvent) -> String {
        let amount = format_amount(event.amount);
        let action = match event.side {
            Side::Buy => format!(
                "Swap {amount} {} for {}",
                self.stable_symbol, self.token_symbol
            ),
            Side::Sell => format!(
                "Swap {} for {amount} {}",
                self.token_symbol, self.stable_symbol
            ),
        };
        let lost = event
            .loss
            .map(|loss| format!(" | {}$ lost", format_fixed2(loss)))
            .unwrap_or_default();

        format!(
            "{} [{}/{}] {action} | {}{lost}",
            event.wallet_name,
            event.half_cycle_index,
            event.cycle_limit,
            self.clock(event.timestamp)
        )
    }

    /// `alice | Wallet done, total 150 USDC, spent -10 USDC, 0.26$ in BNB, 2 m 5 s`
    pub fn completion_line(&self, report: &CompletionReport) -> String {
        let duration = report
            .duration_secs
            .map(|secs| format!(", {}", format_duration(secs)))
            .unwrap_or_default();

        format!(
            "{} | Wallet done, total {} {stable}, spent {} {stable}, {}$ in {}{duration}",
            report.wallet_name,
            format_amount(report.total_stable_spent),
            format_amount(report.total_lost),
            format_amount(report.total_fees_display),
            self.native_symbol,
            stable = self.stable_symbol,
        )
    }
}

/// Formats transitions, persists them, and forwards completions.
pub struct Emitter<N, R> {
    notifier: N,
    sink: R,
    native_price: Decimal,
    style: ReportStyle,
}

impl<N: Notifier, R: ReportSink> Emitter<N, R> {
    /// `native_price` is the display-currency price of one native unit,
    /// captured once for the whole run.
    pub fn new(notifier: N, sink: R, native_price: Decimal, style: ReportStyle) -> Self {
        Self {
            notifier,
            sink,
            native_price,
            style,
        }
    }

    pub fn style(&self) -> &ReportStyle {
        &self.style
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Emit one transition. Returns the priced completion report, if any.
    ///
    /// Sink and notifier failures are logged and never propagate.
    pub async fn emit(&self, transition: Transition) -> Option<CompletionReport> {
        let Transition { event, completion } = transition;

        let line = self.style.event_line(&event);
        info!(
            wallet = %event.wallet_address,
            side = event.side.as_str(),
            block = event.block_number,
            "{line}"
        );
        if let Err(e) = self.sink.record_event(&event, &line).await {
            warn!(error = %e, "failed to record cycle event");
        }

        let mut report = completion?;
        report.total_fees_display = report.total_fees_native.saturating_mul(self.native_price);

        let done = self.style.completion_line(&report);
        info!(wallet = %report.wallet_address, cycles = report.cycles, "{done}");
        if let Err(e) = self.sink.record_completion(&report, &done).await {
            warn!(error = %e, "failed to record completion report");
        }
        self.notifier.notify(&done).await;

        Some(report)
    }
}

//! SQLite journal of accepted half-cycles and completion reports.
//!
//! Uses WAL mode so `status` can read while a monitor is writing.
//! Decimal amounts are stored as text to keep them exact.

use eyre::Result;
use rusqlite::Connection;
use std::cell::RefCell;

use crate::types::{CompletionReport, CycleEvent};

/// Per-wallet event counts read back from the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletActivityRow {
    /// Wallet address (hex text).
    pub wallet_address: String,
    /// Last display name recorded for the wallet.
    pub wallet_name: String,
    /// Number of recorded buys.
    pub buys: u64,
    /// Number of recorded sells.
    pub sells: u64,
    /// Highest block seen for the wallet.
    pub last_block: u64,
}

/// One recorded completion report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRow {
    /// Wallet address (hex text).
    pub wallet_address: String,
    /// Wallet display name.
    pub wallet_name: String,
    /// Cycles completed.
    pub cycles: u32,
    /// Total stablecoin spent (decimal text).
    pub total_stable_spent: String,
    /// Total loss (decimal text).
    pub total_lost: String,
    /// Fees in display currency (decimal text).
    pub total_fees_display: String,
    /// Seconds between first and last event, if known.
    pub duration_secs: Option<u64>,
    /// Block of the terminal sell.
    pub block_number: u64,
}

pub struct Store {
    conn: RefCell<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: RefCell::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn.borrow_mut().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cycle_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_address TEXT NOT NULL,
                wallet_name TEXT NOT NULL,
                side TEXT NOT NULL,
                half_cycle INTEGER NOT NULL,
                cycle_limit INTEGER NOT NULL,
                amount TEXT NOT NULL,
                loss TEXT,
                fee_native TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                tx_hash TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                message TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cycle_events_wallet
                ON cycle_events (wallet_address);

            CREATE TABLE IF NOT EXISTS wallet_completions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_address TEXT NOT NULL,
                wallet_name TEXT NOT NULL,
                cycles INTEGER NOT NULL,
                total_stable_spent TEXT NOT NULL,
                total_lost TEXT NOT NULL,
                total_fees_native TEXT NOT NULL,
                total_fees_display TEXT NOT NULL,
                final_swap_amount TEXT NOT NULL,
                duration_secs INTEGER,
                block_number INTEGER NOT NULL,
                message TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Insert one accepted half-cycle.
    ///
    /// # Errors
    /// Returns error if database insert fails.
    pub fn insert_cycle_event(&self, event: &CycleEvent, message: &str) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT INTO cycle_events (
                wallet_address, wallet_name, side, half_cycle, cycle_limit, amount,
                loss, fee_native, block_number, tx_hash, timestamp, message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            rusqlite::params![
                format!("{:#x}", event.wallet_address),
                event.wallet_name,
                event.side.as_str(),
                event.half_cycle_index,
                event.cycle_limit,
                event.amount.to_string(),
                event.loss.map(|loss| loss.to_string()),
                event.fee_native.to_string(),
                event.block_number,
                format!("{:#x}", event.tx_hash),
                event.timestamp,
                message,
            ],
        )?;
        Ok(())
    }

    /// Insert one completion report.
    ///
    /// # Errors
    /// Returns error if database insert fails.
    pub fn insert_completion(&self, report: &CompletionReport, message: &str) -> Result<()> {
        self.conn.borrow_mut().execute(
            "
            INSERT INTO wallet_completions (
                wallet_address, wallet_name, cycles, total_stable_spent, total_lost,
                total_fees_native, total_fees_display, final_swap_amount, duration_secs,
                block_number, message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            rusqlite::params![
                format!("{:#x}", report.wallet_address),
                report.wallet_name,
                report.cycles,
                report.total_stable_spent.to_string(),
                report.total_lost.to_string(),
                report.total_fees_native.to_string(),
                report.total_fees_display.to_string(),
                report.final_swap_amount.to_string(),
                report.duration_secs,
                report.block_number,
                message,
            ],
        )?;
        Ok(())
    }

    /// Buy/sell counts per wallet, ordered by address.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn wallet_activity(&self) -> Result<Vec<WalletActivityRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "
            SELECT wallet_address,
                   MAX(wallet_name),
                   SUM(CASE WHEN side = 'buy' THEN 1 ELSE 0 END),
                   SUM(CASE WHEN side = 'sell' THEN 1 ELSE 0 END),
                   MAX(block_number)
            FROM cycle_events
            GROUP BY wallet_address
            ORDER BY wallet_address
            ",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(WalletActivityRow {
                    wallet_address: row.get(0)?,
                    wallet_name: row.get(1)?,
                    buys: row.get(2)?,
                    sells: row.get(3)?,
                    last_block: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All recorded completions in insertion order.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn completions(&self) -> Result<Vec<CompletionRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "
            SELECT wallet_address, wallet_name, cycles, total_stable_spent, total_lost,
                   total_fees_display, duration_secs, block_number
            FROM wallet_completions
            ORDER BY id
            ",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(CompletionRow {
                    wallet_address: row.get(0)?,
                    wallet_name: row.get(1)?,
                    cycles: row.get(2)?,
                    total_stable_spent: row.get(3)?,
                    total_lost: row.get(4)?,
                    total_fees_display: row.get(5)?,
                    duration_secs: row.get(6)?,
                    block_number: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use alloy::primitives::{Address, B256};
    use rust_decimal::Decimal;

    fn sample_event(side: Side, block_number: u64) -> CycleEvent {
        CycleEvent {
            wallet_name: "alice".to_string(),
            wallet_address: Address::repeat_byte(0x11),
            side,
            amount: Decimal::new(10050, 2),
            half_cycle_index: 1,
            cycle_limit: 2,
            timestamp: 1_700_000_000,
            loss: None,
            fee_native: Decimal::new(21, 5),
            block_number,
            tx_hash: B256::repeat_byte(0xaa),
        }
    }

    #[test]
    fn migrations_create_tables() {
        let store = Store::new(":memory:").expect("in-memory store should always open");
        let conn = store.conn.borrow();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("query should prepare");

        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .expect("query_map should succeed")
            .collect::<Result<Vec<_>, _>>()
            .expect("all rows should parse");

        assert!(tables.contains(&"cycle_events".to_string()));
        assert!(tables.contains(&"wallet_completions".to_string()));
    }

    #[test]
    fn activity_counts_buys_and_sells() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        store
            .insert_cycle_event(&sample_event(Side::Buy, 100), "buy line")
            .expect("insert should succeed");
        store
            .insert_cycle_event(&sample_event(Side::Sell, 105), "sell line")
            .expect("insert should succeed");
        store
            .insert_cycle_event(&sample_event(Side::Buy, 107), "buy line")
            .expect("insert should succeed");

        let activity = store.wallet_activity().expect("query should succeed");
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].wallet_name, "alice");
        assert_eq!(activity[0].buys, 2);
        assert_eq!(activity[0].sells, 1);
        assert_eq!(activity[0].last_block, 107);
        assert_eq!(
            activity[0].wallet_address,
            "0x1111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn completion_amounts_stay_exact() {
        let store = Store::new(":memory:").expect("in-memory store should always open");

        let report = CompletionReport {
            wallet_name: "alice".to_string(),
            wallet_address: Address::repeat_byte(0x11),
            cycles: 2,
            total_stable_spent: Decimal::new(150, 0),
            total_lost: Decimal::new(-10, 0),
            total_fees_native: Decimal::new(42, 5),
            total_fees_display: Decimal::new(2572, 4),
            final_swap_amount: Decimal::new(70, 0),
            duration_secs: Some(125),
            block_number: 200,
        };
        store
            .insert_completion(&report, "done line")
            .expect("insert should succeed");

        let rows = store.completions().expect("query should succeed");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_lost, "-10");
        assert_eq!(rows[0].total_fees_display, "0.2572");
        assert_eq!(rows[0].duration_secs, Some(125));
    }
}

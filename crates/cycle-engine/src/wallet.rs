//! Per-wallet buy/sell cycle state.
//!
//! [`WalletBook`] is the only owner of wallet state. It is mutated by the
//! monitor, one matched transfer at a time in ledger order, and hands out
//! cloned [`WalletSnapshot`]s to everything else.
//!
//! A wallet alternates between [`Phase::AwaitingBuy`] and
//! [`Phase::AwaitingSell`]. A buy is a primary-token transfer *to* the wallet
//! while it awaits a buy; a sell is a transfer *from* the wallet while it
//! awaits a sell. Anything else is ignored for that wallet.

use std::collections::HashMap;

use alloy::primitives::{Address, B256};
use cycle_data::types::{CompletionReport, CycleEvent, Side, WalletEntry};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::decoder::TransferEvent;
use crate::fees::realized_loss;

/// Which half-cycle a wallet expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AwaitingBuy,
    AwaitingSell,
}

impl Phase {
    pub fn expected_side(self) -> Side {
        match self {
            Phase::AwaitingBuy => Side::Buy,
            Phase::AwaitingSell => Side::Sell,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("cycle limit must be at least 1")]
    ZeroCycleLimit,
    #[error("wallet {0:#x} is registered more than once")]
    DuplicateWallet(Address),
}

/// Read-only copy of one wallet's state.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletSnapshot {
    pub address: Address,
    pub name: String,
    pub phase: Phase,
    pub cycle_count: u32,
    pub last_buy_amount: Option<Decimal>,
    pub total_stable_spent: Decimal,
    pub total_fees_native: Decimal,
    pub total_lost: Decimal,
    pub first_event_at: Option<u64>,
    pub last_event_at: Option<u64>,
    /// Whether the completion report has been emitted.
    pub completed: bool,
}

impl WalletSnapshot {
    /// Seconds between the first and last matched event.
    pub fn duration_secs(&self) -> Option<u64> {
        Some(self.last_event_at?.saturating_sub(self.first_event_at?))
    }
}

#[derive(Debug, Clone)]
struct Wallet {
    address: Address,
    name: String,
    phase: Phase,
    cycle_count: u32,
    last_buy_amount: Option<Decimal>,
    total_stable_spent: Decimal,
    total_fees_native: Decimal,
    total_lost: Decimal,
    first_event_at: Option<u64>,
    last_event_at: Option<u64>,
    completed: bool,
}

impl Wallet {
    fn from_entry(entry: &WalletEntry) -> Self {
        Self {
            address: entry.address,
            name: entry.name.clone(),
            phase: if entry.starts_awaiting_sell {
                Phase::AwaitingSell
            } else {
                Phase::AwaitingBuy
            },
            cycle_count: 0,
            last_buy_amount: None,
            total_stable_spent: Decimal::ZERO,
            total_fees_native: Decimal::ZERO,
            total_lost: Decimal::ZERO,
            first_event_at: None,
            last_event_at: None,
            completed: false,
        }
    }

    fn snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            address: self.address,
            name: self.name.clone(),
            phase: self.phase,
            cycle_count: self.cycle_count,
            last_buy_amount: self.last_buy_amount,
            total_stable_spent: self.total_stable_spent,
            total_fees_native: self.total_fees_native,
            total_lost: self.total_lost,
            first_event_at: self.first_event_at,
            last_event_at: self.last_event_at,
            completed: self.completed,
        }
    }
}

/// A transfer matched to a wallet and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Registry index of the wallet.
    pub index: usize,
    pub side: Side,
}

/// Facts about a matched transfer gathered from the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// Correlated stablecoin amount; zero when no companion leg was found.
    pub amount: Decimal,
    pub fee_native: Decimal,
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_hash: B256,
}

/// Outcome of applying a [`Fill`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub event: CycleEvent,
    /// Present on the terminal sell. `total_fees_display` is left at zero for
    /// the emitter to price.
    pub completion: Option<CompletionReport>,
}

/// All monitored wallets, in registry order.
#[derive(Debug, Clone)]
pub struct WalletBook {
    wallets: Vec<Wallet>,
    by_address: HashMap<Address, usize>,
    cycle_limit: u32,
}

impl WalletBook {
    /// Build the book from registry entries.
    ///
    /// # Errors
    /// Fails on a zero cycle limit or a repeated address.
    pub fn new(entries: &[WalletEntry], cycle_limit: u32) -> Result<Self, BookError> {
        if cycle_limit == 0 {
            return Err(BookError::ZeroCycleLimit);
        }

        let mut wallets = Vec::with_capacity(entries.len());
        let mut by_address = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if by_address.insert(entry.address, index).is_some() {
                return Err(BookError::DuplicateWallet(entry.address));
            }
            wallets.push(Wallet::from_entry(entry));
        }

        Ok(Self {
            wallets,
            by_address,
            cycle_limit,
        })
    }

    pub fn cycle_limit(&self) -> u32 {
        self.cycle_limit
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Find the wallet a primary-token transfer belongs to.
    ///
    /// The recipient is a buy candidate if it awaits a buy, the sender a sell
    /// candidate if it awaits a sell. When both qualify the wallet registered
    /// first wins.
    pub fn match_transfer(&self, transfer: &TransferEvent) -> Option<Match> {
        let buyer = self
            .by_address
            .get(&transfer.to)
            .copied()
            .filter(|&i| self.wallets[i].phase == Phase::AwaitingBuy)
            .map(|index| Match {
                index,
                side: Side::Buy,
            });
        let seller = self
            .by_address
            .get(&transfer.from)
            .copied()
            .filter(|&i| self.wallets[i].phase == Phase::AwaitingSell)
            .map(|index| Match {
                index,
                side: Side::Sell,
            });

        match (buyer, seller) {
            (Some(b), Some(s)) => Some(if s.index < b.index { s } else { b }),
            (b, s) => b.or(s),
        }
    }

    /// Address of the wallet at `index`.
    pub fn address(&self, index: usize) -> Option<Address> {
        self.wallets.get(index).map(|w| w.address)
    }

    /// Apply one matched half-cycle.
    ///
    /// Totals saturate at the `Decimal` bounds instead of overflowing.
    ///
    /// Returns `None` if `matched` is stale (unknown index or a side the
    /// wallet no longer expects); state is untouched in that case.
    pub fn apply(&mut self, matched: Match, fill: Fill) -> Option<Transition> {
        let cycle_limit = self.cycle_limit;
        let wallet = self.wallets.get_mut(matched.index)?;
        if wallet.phase.expected_side() != matched.side {
            return None;
        }

        wallet.first_event_at.get_or_insert(fill.timestamp);
        wallet.last_event_at = Some(fill.timestamp);
        wallet.total_fees_native = wallet.total_fees_native.saturating_add(fill.fee_native);

        let mut completion = None;
        let (half_cycle_index, loss) = match matched.side {
            Side::Buy => {
                wallet.cycle_count += 1;
                wallet.last_buy_amount = Some(fill.amount);
                wallet.total_stable_spent = wallet.total_stable_spent.saturating_add(fill.amount);
                wallet.phase = Phase::AwaitingSell;
                (wallet.cycle_count, None)
            }
            Side::Sell => {
                let loss = realized_loss(wallet.last_buy_amount, fill.amount);
                if let Some(loss) = loss {
                    wallet.total_lost = wallet.total_lost.saturating_add(loss);
                }
                wallet.phase = Phase::AwaitingBuy;

                if wallet.cycle_count == cycle_limit && !wallet.completed {
                    wallet.completed = true;
                    let snapshot = wallet.snapshot();
                    completion = Some(CompletionReport {
                        wallet_name: wallet.name.clone(),
                        wallet_address: wallet.address,
                        cycles: wallet.cycle_count,
                        total_stable_spent: wallet.total_stable_spent,
                        total_lost: wallet.total_lost,
                        total_fees_native: wallet.total_fees_native,
                        total_fees_display: Decimal::ZERO,
                        final_swap_amount: fill.amount,
                        duration_secs: snapshot.duration_secs(),
                        block_number: fill.block_number,
                    });
                }
                (wallet.cycle_count, loss)
            }
        };

        let event = CycleEvent {
            wallet_name: wallet.name.clone(),
            wallet_address: wallet.address,
            side: matched.side,
            amount: fill.amount,
            half_cycle_index,
            cycle_limit,
            timestamp: fill.timestamp,
            loss,
            fee_native: fill.fee_native,
            block_number: fill.block_number,
            tx_hash: fill.tx_hash,
        };

        Some(Transition { event, completion })
    }

    /// Snapshot of every wallet in registry order.
    pub fn snapshot(&self) -> Vec<WalletSnapshot> {
        self.wallets.iter().map(Wallet::snapshot).collect()
    }

    /// Snapshot of one wallet.
    pub fn get(&self, address: Address) -> Option<WalletSnapshot> {
        let index = *self.by_address.get(&address)?;
        self.wallets.get(index).map(Wallet::snapshot)
    }
}

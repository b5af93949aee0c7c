//! Paper-trade position ledger
//!
//! Owns the open-position arena, the append-only trade history, the daily
//! trade counter, and the reference balance. Positions transition
//! open -> closed exactly once, either through the stop/target monitor in
//! `mark_to_market` or an explicit `close`. Ids are assigned monotonically
//! and never reused in the open set.
//!
//! All methods take the cycle clock explicitly; the ledger never reads wall
//! time itself.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{ClosedTrade, Position, Side, Symbol, TradeId, TradeStatus};

/// Why `execute` refused to open a position
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeRejected {
    #[error("entry and stop prices must be positive (entry {entry}, stop {stop})")]
    NonPositivePrice { entry: f64, stop: f64 },
    #[error("entry price equals stop loss, position size would be unbounded")]
    ZeroStopDistance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("no open position with id {0}")]
    UnknownPosition(TradeId),
}

/// Result of one stop/target sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkToMarket {
    /// Positions closed by a trigger this sweep, in id order
    pub closed: Vec<TradeId>,
    /// Unrealized P&L of every position that was open when the sweep
    /// started, valued at the observed price
    pub unrealized_pnl: f64,
}

/// The trade/position state machine
#[derive(Debug, Clone)]
pub struct PositionLedger {
    open: BTreeMap<TradeId, Position>,
    history: Vec<ClosedTrade>,
    next_id: u64,
    balance: f64,
    daily_trades: u32,
    last_trade_day: Option<NaiveDate>,
}

impl PositionLedger {
    pub fn new(initial_balance: f64) -> Self {
        PositionLedger {
            open: BTreeMap::new(),
            history: Vec::new(),
            next_id: 1,
            balance: initial_balance,
            daily_trades: 0,
            last_trade_day: None,
        }
    }

    /// Open a position sized by risk: `size = risk_amount / |entry - stop|`.
    ///
    /// Rejects non-positive prices and a zero stop distance; a rejected
    /// request leaves the ledger untouched.
    pub fn execute(
        &mut self,
        symbol: Symbol,
        side: Side,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        risk_amount: f64,
        now: DateTime<Utc>,
    ) -> Result<TradeId, TradeRejected> {
        if entry_price <= 0.0 || stop_loss <= 0.0 {
            return Err(TradeRejected::NonPositivePrice {
                entry: entry_price,
                stop: stop_loss,
            });
        }

        let risk_per_unit = (entry_price - stop_loss).abs();
        if risk_per_unit == 0.0 {
            return Err(TradeRejected::ZeroStopDistance);
        }

        let size = risk_amount / risk_per_unit;
        let id = TradeId(self.next_id);
        self.next_id += 1;

        let position = Position {
            id,
            symbol,
            side,
            entry_price,
            stop_loss,
            take_profit,
            size,
            risk_amount,
            entry_time: now,
            status: TradeStatus::Open,
        };

        info!(
            %id,
            symbol = %position.symbol,
            side = %side,
            entry_price,
            stop_loss,
            take_profit,
            size,
            "trade executed"
        );

        self.open.insert(id, position);
        Ok(id)
    }

    /// Sweep every open position against the observed price.
    ///
    /// Longs close at the stop when price <= stop_loss, otherwise at the
    /// target when price >= take_profit; shorts are mirrored. The stop is
    /// checked first, so when a tick satisfies both levels the stop wins.
    /// Triggered positions close at their trigger level, not at the
    /// observed price.
    pub fn mark_to_market(&mut self, current_price: f64, now: DateTime<Utc>) -> MarkToMarket {
        let mut unrealized_pnl = 0.0;
        let mut triggered: Vec<(TradeId, f64, &'static str)> = Vec::new();

        for (id, position) in &self.open {
            unrealized_pnl += position.unrealized_pnl(current_price);

            match position.side {
                Side::Buy => {
                    if current_price <= position.stop_loss {
                        triggered.push((*id, position.stop_loss, "stop loss"));
                    } else if current_price >= position.take_profit {
                        triggered.push((*id, position.take_profit, "take profit"));
                    }
                }
                Side::Sell => {
                    if current_price >= position.stop_loss {
                        triggered.push((*id, position.stop_loss, "stop loss"));
                    } else if current_price <= position.take_profit {
                        triggered.push((*id, position.take_profit, "take profit"));
                    }
                }
            }
        }

        let mut closed = Vec::with_capacity(triggered.len());
        for (id, exit_price, trigger) in triggered {
            info!(%id, exit_price, trigger, "protective level triggered");
            if self.close(id, exit_price, now).is_ok() {
                closed.push(id);
            }
        }

        MarkToMarket {
            closed,
            unrealized_pnl,
        }
    }

    /// Close an open position at the given price and move it to history.
    /// An unknown id is a failure the caller may treat as a no-op.
    pub fn close(
        &mut self,
        id: TradeId,
        exit_price: f64,
        now: DateTime<Utc>,
    ) -> Result<ClosedTrade, LedgerError> {
        let position = self.open.remove(&id).ok_or(LedgerError::UnknownPosition(id))?;

        let pnl = (exit_price - position.entry_price) * position.size * position.side.direction();
        let notional = position.entry_price * position.size;
        let pnl_percent = if notional != 0.0 {
            pnl / notional * 100.0
        } else {
            0.0
        };

        let trade = ClosedTrade {
            id: position.id,
            symbol: position.symbol,
            side: position.side,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            risk_amount: position.risk_amount,
            entry_time: position.entry_time,
            exit_time: now,
            pnl,
            pnl_percent,
            status: TradeStatus::Closed,
        };

        info!(
            %id,
            symbol = %trade.symbol,
            side = %trade.side,
            exit_price,
            pnl = format!("{pnl:.2}"),
            "position closed"
        );

        self.history.push(trade.clone());
        Ok(trade)
    }

    /// Reset the daily trade counter when the calendar day advances
    pub fn roll_day(&mut self, today: NaiveDate) {
        if self.last_trade_day != Some(today) {
            if self.daily_trades > 0 {
                debug!(previous = self.daily_trades, "daily trade counter reset");
            }
            self.daily_trades = 0;
            self.last_trade_day = Some(today);
        }
    }

    /// Count an accepted trade against today's limit
    pub fn record_trade_today(&mut self) {
        self.daily_trades += 1;
    }

    pub fn daily_trades(&self) -> u32 {
        self.daily_trades
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn set_balance(&mut self, balance: f64) {
        self.balance = balance;
    }

    /// Risk budget for the next trade at the given per-trade fraction
    pub fn risk_amount(&self, risk_per_trade: f64) -> f64 {
        self.balance * risk_per_trade
    }

    pub fn position(&self, id: TradeId) -> Option<&Position> {
        self.open.get(&id)
    }

    /// Open positions in id order
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Full closed-trade history, oldest first
    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    /// The trailing `limit` closed trades
    pub fn recent_history(&self, limit: usize) -> &[ClosedTrade] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    pub fn total_pnl(&self) -> f64 {
        self.history.iter().map(|t| t.pnl).sum()
    }

    /// Percentage of closed trades with positive P&L; 0 when history is empty
    pub fn win_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let winners = self.history.iter().filter(|t| t.pnl > 0.0).count();
        winners as f64 / self.history.len() as f64 * 100.0
    }

    /// Gross profit over absolute gross loss; 0 when there are no losses
    pub fn profit_factor(&self) -> f64 {
        let gross_profit: f64 = self
            .history
            .iter()
            .filter(|t| t.pnl > 0.0)
            .map(|t| t.pnl)
            .sum();
        let gross_loss: f64 = self
            .history
            .iter()
            .filter(|t| t.pnl < 0.0)
            .map(|t| t.pnl)
            .sum();

        if gross_loss == 0.0 {
            0.0
        } else {
            gross_profit / gross_loss.abs()
        }
    }

    /// Reference balance plus realized P&L plus the unrealized P&L of the
    /// open set, valued by the caller's latest sweep
    pub fn equity(&self, unrealized_pnl: f64) -> f64 {
        self.balance + self.total_pnl() + unrealized_pnl
    }
}

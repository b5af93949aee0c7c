//! Refresh-cycle engine
//!
//! One `refresh` call runs the whole pipeline over an already-fetched candle
//! series: indicators -> market context -> stop/target sweep -> momentum
//! bias -> signal evaluation -> position opening -> snapshot assembly. The
//! engine owns the ledger; `&mut self` serializes cycles, so callers that
//! refresh from concurrent requests must share the engine behind a mutex.
//!
//! The snapshot is the JSON contract consumed by the browser front end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::indicators::IndicatorSet;
use crate::ledger::{MarkToMarket, PositionLedger};
use crate::regime::{MarketContext, RegimeClassifier};
use crate::signal::{Bias, SignalGenerator};
use crate::{Candle, ClosedTrade, Position, Side, Symbol, TradeId, TradeStatus};

/// Headline signal state for the chart title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalHeadline {
    #[default]
    None,
    Buy,
    Sell,
    Both,
}

/// Chart marker for an accepted entry signal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMarker {
    pub active: bool,
    pub price: f64,
    pub rsi: f64,
    pub macd: f64,
    /// Millisecond timestamp, used by the front end as a marker key
    pub id: i64,
    pub time: Option<DateTime<Utc>>,
}

/// Stop-loss / take-profit overlay for the most recent entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtectiveLevels {
    pub active: bool,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub is_buy: bool,
    /// Stop distance as a percentage of entry
    pub distance_percent: f64,
}

/// Latest indicator values for the metrics panel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSummary {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
    pub volume: f64,
    pub volume_ma: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

/// The momentum bias presented as the dashboard's prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub direction: Bias,
    pub confidence: f64,
    /// Historical win rate as a fraction, reused as the displayed accuracy
    pub accuracy: f64,
}

impl Default for PredictionSummary {
    fn default() -> Self {
        PredictionSummary {
            direction: Bias::Bearish,
            confidence: 0.0,
            accuracy: 0.0,
        }
    }
}

/// Account-level metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSummary {
    pub balance: f64,
    pub equity: f64,
    pub total_pnl: f64,
    pub unrealized_pnl: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub daily_trades: u32,
    pub max_daily_trades: u32,
}

/// Open position with live valuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionView {
    pub id: TradeId,
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub risk_amount: f64,
    pub entry_time: DateTime<Utc>,
    pub status: TradeStatus,
}

impl OpenPositionView {
    fn from_position(position: &Position, current_price: f64) -> Self {
        OpenPositionView {
            id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            current_price,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            size: position.size,
            pnl: position.unrealized_pnl(current_price),
            pnl_percent: position.unrealized_pnl_percent(current_price),
            risk_amount: position.risk_amount,
            entry_time: position.entry_time,
            status: position.status,
        }
    }
}

/// Closed trade with its holding time, for the recent-trades table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTradeView {
    #[serde(flatten)]
    pub trade: ClosedTrade,
    pub duration_minutes: f64,
}

impl From<&ClosedTrade> for ClosedTradeView {
    fn from(trade: &ClosedTrade) -> Self {
        ClosedTradeView {
            duration_minutes: trade.duration_minutes(),
            trade: trade.clone(),
        }
    }
}

/// Full dashboard payload for one refresh cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub symbol: Symbol,
    pub generated_at: DateTime<Utc>,
    pub last_price: f64,
    pub signal: SignalHeadline,
    pub indicators: IndicatorSummary,
    pub market_context: MarketContext,
    pub prediction: PredictionSummary,
    pub buy_signal: SignalMarker,
    pub sell_signal: SignalMarker,
    pub stop_loss_info: ProtectiveLevels,
    pub account: AccountSummary,
    pub open_positions: Vec<OpenPositionView>,
    pub recent_trades: Vec<ClosedTradeView>,
    /// Positions the stop/target sweep closed during this cycle
    pub closed_this_cycle: Vec<TradeId>,
}

/// Number of recent closed trades shipped in each snapshot
const RECENT_TRADES: usize = 5;

/// The per-refresh driver tying the pipeline together
pub struct DashboardEngine {
    config: Config,
    classifier: RegimeClassifier,
    generator: SignalGenerator,
    ledger: PositionLedger,
}

impl DashboardEngine {
    pub fn new(config: Config) -> Self {
        let classifier = RegimeClassifier::new(config.regime.clone());
        let generator = SignalGenerator::new(config.signal.clone());
        let ledger = PositionLedger::new(config.trading.initial_balance);

        DashboardEngine {
            config,
            classifier,
            generator,
            ledger,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut PositionLedger {
        &mut self.ledger
    }

    /// Run one refresh cycle against the latest candle series.
    ///
    /// Empty input produces a neutral snapshot instead of an error; the next
    /// cycle simply retries with fresh data. The stop/target sweep runs every
    /// cycle whether or not new signals fire.
    pub fn refresh(
        &mut self,
        candles: &[Candle],
        sentiment_score: f64,
        now: DateTime<Utc>,
    ) -> DashboardSnapshot {
        let symbol = self.config.data.symbol();
        let indicators = IndicatorSet::compute(candles, &self.config.indicators);
        let context = self.classifier.classify(candles, &indicators, sentiment_score);

        self.ledger.roll_day(now.date_naive());

        let last_price = candles.last().map(|c| c.close).unwrap_or(0.0);
        let sweep = if candles.is_empty() {
            MarkToMarket::default()
        } else {
            self.ledger.mark_to_market(last_price, now)
        };

        let prediction = self.generator.momentum_bias(&indicators, last_price);
        let row = indicators.latest().unwrap_or_default();

        let mut buy_signal = SignalMarker::default();
        let mut sell_signal = SignalMarker::default();
        let mut stop_loss_info = ProtectiveLevels::default();

        if !candles.is_empty() {
            let signals = self.generator.evaluate(
                candles.len(),
                &row,
                last_price,
                &context,
                &prediction,
                self.ledger.daily_trades(),
                self.config.trading.max_daily_trades,
                now,
            );

            for signal in signals {
                let risk_amount = self.ledger.risk_amount(self.config.trading.risk_per_trade);
                match self.ledger.execute(
                    symbol.clone(),
                    signal.side,
                    signal.entry_price,
                    signal.stop_loss,
                    signal.take_profit,
                    risk_amount,
                    now,
                ) {
                    Ok(id) => {
                        self.ledger.record_trade_today();
                        debug!(%id, side = %signal.side, "signal accepted");

                        let marker = SignalMarker {
                            active: true,
                            price: signal.entry_price,
                            rsi: signal.rsi,
                            macd: signal.macd,
                            id: now.timestamp_millis(),
                            time: Some(now),
                        };
                        match signal.side {
                            Side::Buy => buy_signal = marker,
                            Side::Sell => sell_signal = marker,
                        }

                        let distance_percent = if signal.entry_price != 0.0 {
                            ((signal.entry_price - signal.stop_loss) / signal.entry_price * 100.0)
                                .abs()
                        } else {
                            0.0
                        };
                        stop_loss_info = ProtectiveLevels {
                            active: true,
                            entry_price: signal.entry_price,
                            stop_loss: signal.stop_loss,
                            take_profit: signal.take_profit,
                            is_buy: signal.side == Side::Buy,
                            distance_percent,
                        };
                    }
                    Err(reason) => warn!(%reason, side = %signal.side, "trade rejected"),
                }
            }
        }

        let signal = match (buy_signal.active, sell_signal.active) {
            (true, true) => SignalHeadline::Both,
            (true, false) => SignalHeadline::Buy,
            (false, true) => SignalHeadline::Sell,
            (false, false) => SignalHeadline::None,
        };

        let open_positions: Vec<OpenPositionView> = self
            .ledger
            .open_positions()
            .map(|p| OpenPositionView::from_position(p, last_price))
            .collect();

        let recent_trades: Vec<ClosedTradeView> = self
            .ledger
            .recent_history(RECENT_TRADES)
            .iter()
            .map(ClosedTradeView::from)
            .collect();

        let total_pnl = self.ledger.total_pnl();
        let account = AccountSummary {
            balance: self.ledger.balance(),
            equity: self.ledger.equity(sweep.unrealized_pnl),
            total_pnl,
            unrealized_pnl: sweep.unrealized_pnl,
            win_rate: self.ledger.win_rate(),
            profit_factor: self.ledger.profit_factor(),
            daily_trades: self.ledger.daily_trades(),
            max_daily_trades: self.config.trading.max_daily_trades,
        };

        DashboardSnapshot {
            symbol,
            generated_at: now,
            last_price,
            signal,
            indicators: IndicatorSummary {
                rsi: row.rsi,
                macd: row.macd,
                macd_signal: row.macd_signal,
                sma_short: row.sma_short,
                sma_long: row.sma_long,
                bb_upper: row.bb_upper,
                bb_lower: row.bb_lower,
                adx: row.adx,
                atr: row.atr,
                volume: candles.last().map(|c| c.volume).unwrap_or(0.0),
                volume_ma: row.volume_ma,
                support: row.support,
                resistance: row.resistance,
            },
            market_context: context,
            prediction: PredictionSummary {
                direction: prediction.bias,
                confidence: prediction.confidence,
                accuracy: self.ledger.win_rate() / 100.0,
            },
            buy_signal,
            sell_signal,
            stop_loss_info,
            account,
            open_positions,
            recent_trades,
            closed_this_cycle: sweep.closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn rising_candles(count: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle {
                    datetime: start + Duration::hours(i as i64),
                    open: close - 0.3,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    /// Config with the regime gate opened so the entry rules can be
    /// observed. The monotonic fixture saturates RSI at the 100 sentinel,
    /// so the overbought filter is opened too.
    fn permissive_config() -> Config {
        let mut config = Config::default();
        config.regime.sideways_adx_threshold = 0.0;
        config.regime.sideways_range_threshold = 0.0;
        config.regime.weak_trend_adx = 0.0;
        config.regime.crisis_sentiment_threshold = -10.0;
        config.signal.rsi_overbought = 101.0;
        config
    }

    fn cycle_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_input_yields_neutral_snapshot() {
        let mut engine = DashboardEngine::new(Config::default());
        let snapshot = engine.refresh(&[], 0.0, cycle_time());

        assert_eq!(snapshot.last_price, 0.0);
        assert_eq!(snapshot.signal, SignalHeadline::None);
        assert!(!snapshot.buy_signal.active);
        assert!(!snapshot.market_context.can_trade);
        assert!(snapshot.open_positions.is_empty());
    }

    #[test]
    fn trending_market_opens_a_long() {
        let mut engine = DashboardEngine::new(permissive_config());
        let candles = rising_candles(120);
        let snapshot = engine.refresh(&candles, 0.0, cycle_time());

        assert!(snapshot.market_context.can_trade);
        assert_eq!(snapshot.signal, SignalHeadline::Buy);
        assert!(snapshot.buy_signal.active);
        assert!(snapshot.stop_loss_info.active);
        assert!(snapshot.stop_loss_info.is_buy);
        assert_eq!(snapshot.open_positions.len(), 1);
        assert_eq!(snapshot.account.daily_trades, 1);

        let position = &snapshot.open_positions[0];
        assert!(position.stop_loss < position.entry_price);
        assert!(position.take_profit > position.entry_price);
    }

    #[test]
    fn daily_limit_blocks_further_entries() {
        let mut config = permissive_config();
        config.trading.max_daily_trades = 1;
        let mut engine = DashboardEngine::new(config);
        let candles = rising_candles(120);

        let first = engine.refresh(&candles, 0.0, cycle_time());
        assert_eq!(first.open_positions.len(), 1);

        // same day, limit reached: no second entry
        let second = engine.refresh(&candles, 0.0, cycle_time() + Duration::hours(1));
        assert_eq!(second.signal, SignalHeadline::None);
        assert_eq!(second.open_positions.len(), 1);
        assert_eq!(second.account.daily_trades, 1);
    }

    #[test]
    fn counter_resets_across_days() {
        let mut config = permissive_config();
        config.trading.max_daily_trades = 1;
        let mut engine = DashboardEngine::new(config);
        let candles = rising_candles(120);

        engine.refresh(&candles, 0.0, cycle_time());
        let next_day = engine.refresh(&candles, 0.0, cycle_time() + Duration::days(1));

        // fresh daily budget: a second long opens
        assert_eq!(next_day.signal, SignalHeadline::Buy);
        assert_eq!(next_day.open_positions.len(), 2);
        assert_eq!(next_day.account.daily_trades, 1);
    }

    #[test]
    fn sweep_closes_triggered_positions_every_cycle() {
        let mut engine = DashboardEngine::new(permissive_config());
        let now = cycle_time();

        let id = engine
            .ledger_mut()
            .execute(
                Symbol::new("BTCUSDT"),
                Side::Buy,
                300.0,
                295.0,
                310.0,
                20.0,
                now,
            )
            .unwrap();

        // price collapses straight through the stop on a blocked market:
        // the sweep still runs
        let candles = rising_candles(40);
        let snapshot = engine.refresh(&candles, 0.0, now + Duration::hours(1));

        assert_eq!(snapshot.closed_this_cycle, vec![id]);
        assert!(snapshot.open_positions.is_empty());
        assert_eq!(snapshot.recent_trades.len(), 1);
        assert_eq!(snapshot.recent_trades[0].trade.exit_price, 295.0);
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut engine = DashboardEngine::new(permissive_config());
        let candles = rising_candles(120);
        let snapshot = engine.refresh(&candles, 0.0, cycle_time());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["signal"], "buy");
        assert!(json["account"]["balance"].as_f64().is_some());
        assert!(json["market_context"]["can_trade"].as_bool().unwrap());
    }
}

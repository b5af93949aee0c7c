//! Rule-based signal generation
//!
//! Combines the SMA crossover pair, MACD alignment, a deterministic momentum
//! bias, and the regime gate into at most one buy and one sell decision per
//! refresh cycle. The buy and sell rules are evaluated independently; with
//! `allow_opposing_entries` set (the default) both may act in the same cycle
//! as two separate positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SignalConfig;
use crate::indicators::{IndicatorRow, IndicatorSet};
use crate::regime::MarketContext;
use crate::Side;

/// Directional bias derived from indicator crossovers. This is the
/// dashboard's "prediction": a deterministic rule, not a learned model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
}

/// Momentum bias with a confidence scaled from relative MACD strength
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Prediction {
    pub bias: Bias,
    pub confidence: f64,
    /// Raw MACD value backing the bias
    pub macd: f64,
}

impl Default for Prediction {
    fn default() -> Self {
        Prediction {
            bias: Bias::Bearish,
            confidence: 0.0,
            macd: 0.0,
        }
    }
}

/// A proposed entry with its protective levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub rsi: f64,
    pub macd: f64,
    pub issued_at: DateTime<Utc>,
}

// indicator values that survived pre-trade validation
struct EntryInputs {
    rsi: f64,
    macd: f64,
    atr: f64,
}

/// Stateless signal generator; the daily-trade counter it consults is owned
/// by the ledger and passed in per cycle.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig) -> Self {
        SignalGenerator { config }
    }

    /// Directional bias of the latest row, ignoring the history gate.
    ///
    /// Defaults bearish. Flips bullish only on a confirmed alignment of the
    /// crossover pair, MACD, and a non-overbought RSI; the mirrored bearish
    /// alignment is stated explicitly even though it matches the default.
    pub fn bias_from_row(&self, row: &IndicatorRow, price: f64) -> Prediction {
        let (Some(sma_short), Some(sma_long), Some(macd), Some(macd_signal), Some(rsi)) =
            (row.sma_short, row.sma_long, row.macd, row.macd_signal, row.rsi)
        else {
            return Prediction::default();
        };

        let mut bias = Bias::Bearish;
        if sma_short > sma_long && macd > macd_signal && rsi < self.config.rsi_overbought {
            bias = Bias::Bullish;
        } else if sma_short < sma_long && macd < macd_signal && rsi > self.config.rsi_oversold {
            bias = Bias::Bearish;
        }

        let confidence = if price > 0.0 {
            ((macd.abs() / price) * 1000.0).clamp(0.30, 0.95)
        } else {
            0.30
        };

        Prediction {
            bias,
            confidence,
            macd,
        }
    }

    /// Bias with the history gate: stays at the default until enough fully
    /// defined feature rows exist.
    pub fn momentum_bias(&self, indicators: &IndicatorSet, price: f64) -> Prediction {
        if indicators.defined_feature_rows() < self.config.min_history {
            return Prediction::default();
        }
        match indicators.latest() {
            Some(row) => self.bias_from_row(&row, price),
            None => Prediction::default(),
        }
    }

    fn validated(&self, candle_count: usize, row: &IndicatorRow) -> Option<EntryInputs> {
        if candle_count < self.config.min_history {
            return None;
        }

        let rsi = row.rsi.filter(|v| v.is_finite())?;
        let macd = row.macd.filter(|v| v.is_finite())?;
        row.macd_signal.filter(|v| v.is_finite())?;
        let adx = row.adx.filter(|v| v.is_finite())?;
        let atr = row.atr.filter(|v| v.is_finite())?;

        if !(0.0..=100.0).contains(&rsi) {
            return None;
        }
        if !(0.0..=100.0).contains(&adx) {
            return None;
        }
        if atr <= 0.0 {
            return None;
        }

        Some(EntryInputs { rsi, macd, atr })
    }

    /// Pre-trade validation: enough history, every required indicator
    /// present and finite, RSI and ADX in range, ATR strictly positive.
    pub fn validate_entry(&self, candle_count: usize, row: &IndicatorRow) -> bool {
        self.validated(candle_count, row).is_some()
    }

    /// Evaluate both entry rules for one cycle.
    ///
    /// `daily_trades` is sampled once for both rules, so a buy accepted this
    /// cycle does not block the sell rule within the same cycle.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        candle_count: usize,
        row: &IndicatorRow,
        price: f64,
        context: &MarketContext,
        prediction: &Prediction,
        daily_trades: u32,
        max_daily_trades: u32,
        now: DateTime<Utc>,
    ) -> Vec<TradeSignal> {
        let mut signals = Vec::new();

        if !context.can_trade {
            debug!(reasons = ?context.blocked_reasons, "signals suppressed by market context");
            return signals;
        }
        if daily_trades >= max_daily_trades {
            debug!(daily_trades, max_daily_trades, "daily trade limit reached");
            return signals;
        }

        let (Some(sma_short), Some(sma_long), Some(macd), Some(macd_signal)) =
            (row.sma_short, row.sma_long, row.macd, row.macd_signal)
        else {
            return signals;
        };

        let golden_cross = sma_short > sma_long;
        let death_cross = sma_short < sma_long;
        let macd_bullish = macd > macd_signal;
        let macd_bearish = macd < macd_signal;

        if golden_cross && macd_bullish && prediction.bias == Bias::Bullish {
            if let Some(inputs) = self.validated(candle_count, row) {
                let stop_loss = price - inputs.atr * self.config.atr_multiplier;
                let take_profit =
                    price + inputs.atr * self.config.atr_multiplier * self.config.min_risk_reward;
                signals.push(TradeSignal {
                    side: Side::Buy,
                    entry_price: price,
                    stop_loss,
                    take_profit,
                    rsi: inputs.rsi,
                    macd: inputs.macd,
                    issued_at: now,
                });
            }
        }

        if death_cross && macd_bearish && prediction.bias == Bias::Bearish {
            if signals.is_empty() || self.config.allow_opposing_entries {
                if let Some(inputs) = self.validated(candle_count, row) {
                    let stop_loss = price + inputs.atr * self.config.atr_multiplier;
                    let take_profit = price
                        - inputs.atr * self.config.atr_multiplier * self.config.min_risk_reward;
                    signals.push(TradeSignal {
                        side: Side::Sell,
                        entry_price: price,
                        stop_loss,
                        take_profit,
                        rsi: inputs.rsi,
                        macd: inputs.macd,
                        issued_at: now,
                    });
                }
            }
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SignalConfig;
    use crate::regime::{MarketContext, MarketStatus};
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn generator() -> SignalGenerator {
        SignalGenerator::new(SignalConfig::default())
    }

    fn bullish_row() -> IndicatorRow {
        IndicatorRow {
            rsi: Some(55.0),
            macd: Some(1.2),
            macd_signal: Some(0.8),
            sma_short: Some(105.0),
            sma_long: Some(100.0),
            adx: Some(30.0),
            atr: Some(2.0),
            ..IndicatorRow::default()
        }
    }

    fn bearish_row() -> IndicatorRow {
        IndicatorRow {
            rsi: Some(45.0),
            macd: Some(-1.2),
            macd_signal: Some(-0.8),
            sma_short: Some(95.0),
            sma_long: Some(100.0),
            adx: Some(30.0),
            atr: Some(2.0),
            ..IndicatorRow::default()
        }
    }

    fn open_context() -> MarketContext {
        MarketContext {
            market_status: MarketStatus::Normal,
            blocked_reasons: vec![],
            can_trade: true,
            ..MarketContext::default()
        }
    }

    #[test]
    fn bias_defaults_bearish_without_data() {
        let prediction = generator().bias_from_row(&IndicatorRow::default(), 100.0);
        assert_eq!(prediction.bias, Bias::Bearish);
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn bias_flips_bullish_on_aligned_row() {
        let prediction = generator().bias_from_row(&bullish_row(), 100.0);
        assert_eq!(prediction.bias, Bias::Bullish);
    }

    #[test]
    fn overbought_rsi_keeps_default_bias() {
        let row = IndicatorRow {
            rsi: Some(85.0),
            ..bullish_row()
        };
        let prediction = generator().bias_from_row(&row, 100.0);
        assert_eq!(prediction.bias, Bias::Bearish);
    }

    #[test]
    fn confidence_is_clamped() {
        // tiny MACD relative to price: floor
        let weak = IndicatorRow {
            macd: Some(0.001),
            ..bullish_row()
        };
        let prediction = generator().bias_from_row(&weak, 100_000.0);
        assert_relative_eq!(prediction.confidence, 0.30, epsilon = 1e-9);

        // huge MACD relative to price: ceiling
        let strong = IndicatorRow {
            macd: Some(50.0),
            ..bullish_row()
        };
        let prediction = generator().bias_from_row(&strong, 100.0);
        assert_relative_eq!(prediction.confidence, 0.95, epsilon = 1e-9);
    }

    #[test]
    fn validation_rejects_bad_rows() {
        let g = generator();

        assert!(g.validate_entry(60, &bullish_row()));
        // too little history
        assert!(!g.validate_entry(49, &bullish_row()));
        // missing ATR
        let mut row = bullish_row();
        row.atr = None;
        assert!(!g.validate_entry(60, &row));
        // RSI out of range
        let mut row = bullish_row();
        row.rsi = Some(120.0);
        assert!(!g.validate_entry(60, &row));
        // non-positive ATR
        let mut row = bullish_row();
        row.atr = Some(0.0);
        assert!(!g.validate_entry(60, &row));
        // non-finite MACD
        let mut row = bullish_row();
        row.macd = Some(f64::NAN);
        assert!(!g.validate_entry(60, &row));
    }

    #[test]
    fn buy_signal_levels_use_atr_multiples() {
        let g = generator();
        let prediction = g.bias_from_row(&bullish_row(), 100.0);
        let signals = g.evaluate(
            60,
            &bullish_row(),
            100.0,
            &open_context(),
            &prediction,
            0,
            3,
            Utc::now(),
        );

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.side, Side::Buy);
        // atr 2.0, multiplier 2.0, risk:reward 1.5
        assert_relative_eq!(signal.stop_loss, 96.0, epsilon = 1e-9);
        assert_relative_eq!(signal.take_profit, 106.0, epsilon = 1e-9);
    }

    #[test]
    fn sell_signal_levels_are_mirrored() {
        let g = generator();
        let prediction = g.bias_from_row(&bearish_row(), 100.0);
        let signals = g.evaluate(
            60,
            &bearish_row(),
            100.0,
            &open_context(),
            &prediction,
            0,
            3,
            Utc::now(),
        );

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.side, Side::Sell);
        assert_relative_eq!(signal.stop_loss, 104.0, epsilon = 1e-9);
        assert_relative_eq!(signal.take_profit, 94.0, epsilon = 1e-9);
    }

    #[test]
    fn blocked_context_suppresses_signals() {
        let g = generator();
        let context = MarketContext::default();
        let prediction = g.bias_from_row(&bullish_row(), 100.0);
        let signals = g.evaluate(
            60,
            &bullish_row(),
            100.0,
            &context,
            &prediction,
            0,
            3,
            Utc::now(),
        );
        assert!(signals.is_empty());
    }

    #[test]
    fn daily_limit_suppresses_signals() {
        let g = generator();
        let prediction = g.bias_from_row(&bullish_row(), 100.0);
        let signals = g.evaluate(
            60,
            &bullish_row(),
            100.0,
            &open_context(),
            &prediction,
            3,
            3,
            Utc::now(),
        );
        assert!(signals.is_empty());
    }

    #[test]
    fn bearish_bias_blocks_buy_rule() {
        let g = generator();
        // bullish row but a bearish prediction: no entry
        let prediction = Prediction::default();
        let signals = g.evaluate(
            60,
            &bullish_row(),
            100.0,
            &open_context(),
            &prediction,
            0,
            3,
            Utc::now(),
        );
        assert!(signals.is_empty());
    }
}

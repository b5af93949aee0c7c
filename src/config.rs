//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Every threshold
//! and period used by the engine lives here with the stock defaults, so a
//! config file only needs to override what it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::Symbol;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub trading: TradingConfig,
    pub indicators: IndicatorConfig,
    pub regime: RegimeConfig,
    pub signal: SignalConfig,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }
}

/// Market-data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub symbol: String,
    pub timeframe: String,
    /// Number of candles fetched per refresh cycle
    pub candle_count: u32,
    pub data_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            symbol: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            candle_count: 200,
            data_dir: "data".to_string(),
        }
    }
}

impl DataConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.symbol.clone())
    }
}

/// Paper-trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub initial_balance: f64,
    /// Fraction of balance risked per trade (0.02 = 2%)
    pub risk_per_trade: f64,
    pub max_daily_trades: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            initial_balance: 1000.0,
            risk_per_trade: 0.02,
            max_daily_trades: 3,
        }
    }
}

/// Technical indicator periods
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_period: usize,
    pub bb_std: f64,
    /// One SMA column is computed per period
    pub sma_periods: Vec<usize>,
    /// The crossover pair read by the regime classifier and signal rules.
    /// Both periods must appear in `sma_periods`.
    pub sma_short: usize,
    pub sma_long: usize,
    pub adx_period: usize,
    pub atr_period: usize,
    pub volume_ma_period: usize,
    pub support_resistance_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_period: 20,
            bb_std: 2.0,
            sma_periods: vec![20, 50],
            sma_short: 20,
            sma_long: 50,
            adx_period: 14,
            atr_period: 14,
            volume_ma_period: 20,
            support_resistance_window: 50,
        }
    }
}

/// Market-regime thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Rows required before the trend classifier commits to a direction
    pub min_trend_bars: usize,
    /// Trailing window for sideways detection
    pub sideways_window: usize,
    pub sideways_adx_threshold: f64,
    /// Shared bound for the relative price range and the ATR/close ratio
    pub sideways_range_threshold: f64,
    pub volatility_period: usize,
    pub crisis_volatility_ratio: f64,
    pub crisis_sentiment_threshold: f64,
    /// ADX below this blocks trading as "weak trend"
    pub weak_trend_adx: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        RegimeConfig {
            min_trend_bars: 50,
            sideways_window: 20,
            sideways_adx_threshold: 20.0,
            sideways_range_threshold: 0.5,
            volatility_period: 20,
            crisis_volatility_ratio: 2.0,
            crisis_sentiment_threshold: -0.3,
            weak_trend_adx: 20.0,
        }
    }
}

/// Signal-generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub atr_multiplier: f64,
    pub min_risk_reward: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Rows of fully-defined indicator data required before any entry
    pub min_history: usize,
    /// The buy and sell rules are independent and can both fire in one
    /// cycle, opening opposing positions. Set false to keep only the first.
    pub allow_opposing_entries: bool,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            atr_multiplier: 2.0,
            min_risk_reward: 1.5,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            min_history: 50,
            allow_opposing_entries: true,
        }
    }
}

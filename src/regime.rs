//! Market regime classification
//!
//! Consumes the indicator surface plus an externally-supplied sentiment score
//! and decides whether the market is trending, ranging, or in crisis, and
//! whether trading is permitted at all. Everything here is recomputed fresh
//! each refresh cycle; nothing is mutated in place.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::RegimeConfig;
use crate::indicators::{rolling_std, IndicatorSet};
use crate::Candle;

/// Trading periods per year, used to annualize volatility
const ANNUALIZATION_PERIODS: f64 = 252.0;

/// Trend direction from the SMA crossover pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Sideways,
    Unknown,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Bullish => write!(f, "bullish"),
            TrendDirection::Bearish => write!(f, "bearish"),
            TrendDirection::Sideways => write!(f, "sideways"),
            TrendDirection::Unknown => write!(f, "unknown"),
        }
    }
}

/// Trend strength bucketed by ADX
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    VeryWeak,
    Weak,
    Moderate,
    Strong,
}

impl TrendStrength {
    fn from_adx(adx: f64) -> Self {
        if adx >= 50.0 {
            TrendStrength::Strong
        } else if adx >= 25.0 {
            TrendStrength::Moderate
        } else if adx >= 10.0 {
            TrendStrength::Weak
        } else {
            TrendStrength::VeryWeak
        }
    }
}

/// Trend classification of the latest row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    pub strength: TrendStrength,
    pub adx: f64,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
}

impl Default for TrendAnalysis {
    fn default() -> Self {
        TrendAnalysis {
            direction: TrendDirection::Unknown,
            strength: TrendStrength::VeryWeak,
            adx: 0.0,
            sma_short: None,
            sma_long: None,
        }
    }
}

/// Sideways/ranging market detection over the trailing window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidewaysAnalysis {
    pub is_sideways: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub avg_adx: Option<f64>,
    pub price_range: Option<f64>,
    pub atr_ratio: Option<f64>,
}

/// Annualized volatility of close-to-close returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    pub current: f64,
    pub average: f64,
    pub ratio: f64,
}

impl Default for VolatilityMetrics {
    fn default() -> Self {
        VolatilityMetrics {
            current: 0.0,
            average: 0.0,
            ratio: 1.0,
        }
    }
}

/// Crisis detection with additive confidence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrisisAnalysis {
    pub is_crisis: bool,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub sentiment_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Normal,
    Blocked,
}

/// Aggregate market context for one refresh cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub trend: TrendAnalysis,
    pub sideways: SidewaysAnalysis,
    pub volatility: VolatilityMetrics,
    pub crisis: CrisisAnalysis,
    pub market_status: MarketStatus,
    pub blocked_reasons: Vec<String>,
    pub can_trade: bool,
}

impl Default for MarketContext {
    fn default() -> Self {
        MarketContext {
            trend: TrendAnalysis::default(),
            sideways: SidewaysAnalysis::default(),
            volatility: VolatilityMetrics::default(),
            crisis: CrisisAnalysis::default(),
            market_status: MarketStatus::Blocked,
            blocked_reasons: vec!["insufficient data".to_string()],
            can_trade: false,
        }
    }
}

/// Confidence for a given number of satisfied sideways reasons:
/// `min(reasons / 3, 1)`
pub fn sideways_confidence(reason_count: usize) -> f64 {
    (reason_count as f64 / 3.0).min(1.0)
}

/// Stateless classifier; thresholds are fixed configuration
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        RegimeClassifier { config }
    }

    /// Trend direction and strength from the latest row. Commits to a
    /// direction only once enough rows exist for the long SMA to be
    /// trustworthy.
    pub fn analyze_trend(&self, candles: &[Candle], indicators: &IndicatorSet) -> TrendAnalysis {
        if candles.len() < self.config.min_trend_bars {
            return TrendAnalysis::default();
        }

        let row = match indicators.latest() {
            Some(row) => row,
            None => return TrendAnalysis::default(),
        };

        let direction = match (row.sma_short, row.sma_long) {
            (Some(short), Some(long)) => {
                if short > long {
                    TrendDirection::Bullish
                } else if short < long {
                    TrendDirection::Bearish
                } else {
                    TrendDirection::Sideways
                }
            }
            _ => TrendDirection::Unknown,
        };

        let adx = row.adx.unwrap_or(0.0);

        TrendAnalysis {
            direction,
            strength: TrendStrength::from_adx(adx),
            adx,
            sma_short: row.sma_short,
            sma_long: row.sma_long,
        }
    }

    /// Accumulates independent range-bound evidence over the trailing window.
    /// Two or more reasons classify the market as sideways.
    pub fn detect_sideways(
        &self,
        candles: &[Candle],
        indicators: &IndicatorSet,
    ) -> SidewaysAnalysis {
        let window = self.config.sideways_window;
        if candles.len() < window {
            return SidewaysAnalysis {
                reasons: vec!["insufficient data".to_string()],
                ..SidewaysAnalysis::default()
            };
        }

        let start = candles.len() - window;
        let recent = &candles[start..];
        let mean_close = recent.iter().map(|c| c.close).sum::<f64>() / window as f64;

        let mut reasons = Vec::new();

        // low trend strength
        let adx_values: Vec<f64> = (start..candles.len())
            .filter_map(|i| indicators.adx.get(i).copied().flatten())
            .collect();
        let avg_adx = if adx_values.is_empty() {
            None
        } else {
            Some(adx_values.iter().mean())
        };
        if let Some(avg) = avg_adx {
            if avg < self.config.sideways_adx_threshold {
                reasons.push(format!(
                    "low ADX ({avg:.1} < {})",
                    self.config.sideways_adx_threshold
                ));
            }
        }

        // narrow total price range
        let max_high = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let min_low = recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let price_range = if mean_close > 0.0 {
            Some((max_high - min_low) / mean_close)
        } else {
            None
        };
        if let Some(range) = price_range {
            if range < self.config.sideways_range_threshold {
                reasons.push(format!("narrow price range ({:.2}%)", range * 100.0));
            }
        }

        // low average true range relative to price
        let atr_values: Vec<f64> = (start..candles.len())
            .filter_map(|i| indicators.atr.get(i).copied().flatten())
            .collect();
        let atr_ratio = if atr_values.is_empty() || mean_close <= 0.0 {
            None
        } else {
            Some(atr_values.iter().mean() / mean_close)
        };
        if let Some(ratio) = atr_ratio {
            if ratio < self.config.sideways_range_threshold {
                reasons.push(format!("low volatility (ATR ratio {:.2}%)", ratio * 100.0));
            }
        }

        // moving average flatter than price: consolidation
        let sma_values: Vec<f64> = indicators
            .sma_column(indicators.sma_short_period())
            .map(|col| {
                (start..candles.len())
                    .filter_map(|i| col.get(i).copied().flatten())
                    .collect()
            })
            .unwrap_or_default();
        let closes: Vec<f64> = recent.iter().map(|c| c.close).collect();
        if sma_values.len() >= 2 {
            let sma_std = sma_values.iter().std_dev();
            let close_std = closes.iter().std_dev();
            if sma_std.is_finite() && close_std.is_finite() && sma_std < close_std * 0.5 {
                reasons.push("consolidating moving average".to_string());
            }
        }

        let is_sideways = reasons.len() >= 2;
        let confidence = sideways_confidence(reasons.len());

        SidewaysAnalysis {
            is_sideways,
            confidence,
            reasons,
            avg_adx,
            price_range,
            atr_ratio,
        }
    }

    /// Annualized close-to-close volatility vs its rolling average
    pub fn calculate_volatility(&self, candles: &[Candle]) -> VolatilityMetrics {
        let period = self.config.volatility_period;
        if candles.len() < period {
            return VolatilityMetrics::default();
        }

        let returns: Vec<f64> = candles
            .windows(2)
            .map(|pair| {
                if pair[0].close != 0.0 {
                    pair[1].close / pair[0].close - 1.0
                } else {
                    0.0
                }
            })
            .collect();

        let tail_start = returns.len().saturating_sub(period);
        let tail = &returns[tail_start..];
        let current = if tail.len() >= 2 {
            let sd = tail.iter().std_dev();
            if sd.is_finite() {
                sd * ANNUALIZATION_PERIODS.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let rolling: Vec<f64> = rolling_std(&returns, period)
            .into_iter()
            .flatten()
            .collect();
        let average = if rolling.is_empty() {
            0.0
        } else {
            rolling.iter().mean() * ANNUALIZATION_PERIODS.sqrt()
        };

        let ratio = if average > 0.0 { current / average } else { 1.0 };

        VolatilityMetrics {
            current,
            average,
            ratio,
        }
    }

    /// Weighted additive crisis score: volatility spike, negative sentiment,
    /// rapid decline, and high-volume selloff each contribute independently.
    pub fn detect_crisis(
        &self,
        candles: &[Candle],
        volatility: &VolatilityMetrics,
        sentiment_score: f64,
    ) -> CrisisAnalysis {
        if candles.is_empty() {
            return CrisisAnalysis::default();
        }

        let mut reasons = Vec::new();
        let mut confidence: f64 = 0.0;

        if volatility.ratio > self.config.crisis_volatility_ratio {
            reasons.push(format!(
                "high volatility ({:.2}%)",
                volatility.current * 100.0
            ));
            confidence += 0.3;
        }

        if sentiment_score < self.config.crisis_sentiment_threshold {
            reasons.push(format!("negative sentiment ({sentiment_score:.2})"));
            confidence += 0.3;
        }

        let returns: Vec<f64> = candles
            .windows(2)
            .map(|pair| {
                if pair[0].close != 0.0 {
                    pair[1].close / pair[0].close - 1.0
                } else {
                    0.0
                }
            })
            .collect();
        let recent_start = returns.len().saturating_sub(5);
        let min_recent_return = returns[recent_start..]
            .iter()
            .copied()
            .fold(f64::MAX, f64::min);

        if !returns.is_empty() && min_recent_return < -0.05 {
            reasons.push("rapid price decline".to_string());
            confidence += 0.4;
        }

        let volume_start = candles.len().saturating_sub(5);
        let max_recent_volume = candles[volume_start..]
            .iter()
            .map(|c| c.volume)
            .fold(f64::MIN, f64::max);
        let ma_start = candles.len().saturating_sub(20);
        let volume_window = &candles[ma_start..];
        let volume_ma =
            volume_window.iter().map(|c| c.volume).sum::<f64>() / volume_window.len() as f64;

        if !returns.is_empty() && max_recent_volume > volume_ma * 2.0 && min_recent_return < -0.03 {
            reasons.push("high volume with price decline".to_string());
            confidence += 0.3;
        }

        CrisisAnalysis {
            is_crisis: confidence > 0.5,
            confidence: confidence.min(1.0),
            reasons,
            sentiment_score,
        }
    }

    /// Full market context for one cycle. Blocked reasons gate trading:
    /// the generator refuses to act while any are present.
    pub fn classify(
        &self,
        candles: &[Candle],
        indicators: &IndicatorSet,
        sentiment_score: f64,
    ) -> MarketContext {
        let trend = self.analyze_trend(candles, indicators);
        let sideways = self.detect_sideways(candles, indicators);
        let volatility = self.calculate_volatility(candles);
        let crisis = self.detect_crisis(candles, &volatility, sentiment_score);

        let mut blocked_reasons = Vec::new();
        if sideways.is_sideways {
            blocked_reasons.extend(sideways.reasons.iter().cloned());
        }
        if crisis.is_crisis {
            blocked_reasons.extend(crisis.reasons.iter().cloned());
        }
        if trend.adx < self.config.weak_trend_adx {
            blocked_reasons.push(format!("weak trend (ADX {:.1})", trend.adx));
        }

        let can_trade = blocked_reasons.is_empty();
        if !can_trade {
            tracing::debug!(reasons = ?blocked_reasons, "trading blocked");
        }

        MarketContext {
            trend,
            sideways,
            volatility,
            crisis,
            market_status: if can_trade {
                MarketStatus::Normal
            } else {
                MarketStatus::Blocked
            },
            blocked_reasons,
            can_trade,
        }
    }
}

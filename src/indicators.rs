//! Technical indicator pipeline
//!
//! Turns a candle series into the feature surface the regime classifier and
//! signal rules read. SMA and MACD come from the `ta` crate; RSI, ADX, ATR
//! and the Bollinger stddev are computed here because this engine fixes their
//! smoothing to plain rolling means, which `ta` (Wilder smoothing) does not
//! provide.
//!
//! Every function is deterministic, preserves input length and order, and
//! marks warm-up rows as `None`. Undefined is never zero: callers must treat
//! a missing value differently from 0.0. Short input never errors, it only
//! yields more `None` rows.

use statrs::statistics::Statistics;
use ta::indicators::{MovingAverageConvergenceDivergence, SimpleMovingAverage};
use ta::Next;

use crate::config::IndicatorConfig;
use crate::Candle;

// =============================================================================
// Type Aliases
// =============================================================================

/// Band indicators (upper, middle, lower)
pub type BandOutput = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

// =============================================================================
// Rolling Window Helpers
// =============================================================================

/// Simple rolling mean, defined from index `period - 1`
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    for i in (period - 1)..values.len() {
        let sum: f64 = values[i + 1 - period..=i].iter().sum();
        result[i] = Some(sum / period as f64);
    }
    result
}

/// Rolling mean over a partially-defined series. A window containing any
/// undefined value stays undefined.
fn rolling_mean_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        if window.iter().all(|v| v.is_some()) {
            let sum: f64 = window.iter().flatten().sum();
            result[i] = Some(sum / period as f64);
        }
    }
    result
}

/// Rolling sample standard deviation (n-1 denominator), defined from
/// index `period - 1`
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period < 2 {
        return vec![None; values.len()];
    }

    let mut result = vec![None; values.len()];
    for i in (period - 1)..values.len() {
        let sd = values[i + 1 - period..=i].iter().std_dev();
        if sd.is_finite() {
            result[i] = Some(sd);
        }
    }
    result
}

/// Rolling minimum over the trailing window
pub fn rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    for i in (period - 1)..values.len() {
        let min = values[i + 1 - period..=i]
            .iter()
            .fold(f64::MAX, |a, &b| a.min(b));
        result[i] = Some(min);
    }
    result
}

/// Rolling maximum over the trailing window
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = vec![None; values.len()];
    for i in (period - 1)..values.len() {
        let max = values[i + 1 - period..=i]
            .iter()
            .fold(f64::MIN, |a, &b| a.max(b));
        result[i] = Some(max);
    }
    result
}

// =============================================================================
// Moving Averages
// =============================================================================

/// Simple Moving Average of a value series
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    let mut result = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let sma_val = indicator.next(value);
        if i + 1 >= period {
            result.push(Some(sma_val));
        } else {
            result.push(None);
        }
    }

    result
}

// =============================================================================
// Momentum Indicators
// =============================================================================

/// Relative Strength Index with rolling-mean gain/loss smoothing.
///
/// `rsi = 100 - 100 / (1 + avg_gain / avg_loss)`. A window with zero losses
/// and positive gains saturates to the 100.0 sentinel; a window with neither
/// gains nor losses (flat prices) stays undefined.
pub fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let n = values.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    // First full window of diffs ends at index `period`
    let mut result = vec![None; n];
    for i in period..n {
        let avg_gain: f64 = gains[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let avg_loss: f64 = losses[i + 1 - period..=i].iter().sum::<f64>() / period as f64;

        result[i] = if avg_loss == 0.0 {
            if avg_gain > 0.0 {
                Some(100.0)
            } else {
                None
            }
        } else {
            Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
        };
    }

    result
}

/// MACD from exponential moving averages of close
pub fn macd(
    values: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> BandOutput {
    if values.is_empty() {
        return (vec![], vec![], vec![]);
    }

    let mut indicator =
        match MovingAverageConvergenceDivergence::new(fast_period, slow_period, signal_period) {
            Ok(i) => i,
            Err(_) => {
                return (
                    vec![None; values.len()],
                    vec![None; values.len()],
                    vec![None; values.len()],
                )
            }
        };

    let warmup = slow_period;
    let mut macd_line = Vec::with_capacity(values.len());
    let mut signal_line = Vec::with_capacity(values.len());
    let mut histogram = Vec::with_capacity(values.len());

    for (i, &value) in values.iter().enumerate() {
        let macd_out = indicator.next(value);
        if i + 1 >= warmup {
            macd_line.push(Some(macd_out.macd));
            signal_line.push(Some(macd_out.signal));
            histogram.push(Some(macd_out.histogram));
        } else {
            macd_line.push(None);
            signal_line.push(None);
            histogram.push(None);
        }
    }

    (macd_line, signal_line, histogram)
}

// =============================================================================
// Volatility Indicators
// =============================================================================

/// True range. Row 0 has no previous close and falls back to high - low.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(high.len());

    for i in 0..high.len() {
        let tr_value = if i == 0 {
            high[i] - low[i]
        } else {
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(tr_value);
    }

    tr
}

/// Average True Range as a rolling mean of true range
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    rolling_mean(&true_range(high, low, close), period)
}

/// Bollinger Bands: SMA middle band, +/- k sample standard deviations
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> BandOutput {
    if values.is_empty() || period == 0 {
        return (vec![], vec![], vec![]);
    }

    let middle = sma(values, period);
    let std = rolling_std(values, period);

    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        match (middle[i], std[i]) {
            (Some(m), Some(sd)) => {
                upper.push(Some(m + num_std * sd));
                lower.push(Some(m - num_std * sd));
            }
            _ => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    (upper, middle, lower)
}

// =============================================================================
// Trend Indicators
// =============================================================================

/// Average Directional Index with rolling-mean smoothing.
///
/// Directional movement keeps each side independently: +DM is the positive
/// part of the high diff, -DM the absolute negative part of the low diff.
/// DI = 100 * rolling_mean(DM) / ATR; DX = 100 * |+DI - -DI| / (+DI + -DI);
/// ADX = rolling mean of DX. A zero DI sum or zero ATR leaves the row
/// undefined rather than dividing by zero.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    if high.is_empty() || period == 0 || high.len() != low.len() || high.len() != close.len() {
        return vec![];
    }

    let n = high.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = high[i] - high[i - 1];
        let down = low[i] - low[i - 1];
        if up > 0.0 {
            plus_dm[i] = up;
        }
        if down < 0.0 {
            minus_dm[i] = -down;
        }
    }

    let atr_values = atr(high, low, close, period);

    // The first diff lands at index 1, so the first full DM window ends at
    // `period`
    let mut dx = vec![None; n];
    for i in period..n {
        let atr_i = match atr_values[i] {
            Some(a) if a > 0.0 => a,
            _ => continue,
        };

        let avg_plus: f64 = plus_dm[i + 1 - period..=i].iter().sum::<f64>() / period as f64;
        let avg_minus: f64 = minus_dm[i + 1 - period..=i].iter().sum::<f64>() / period as f64;

        let plus_di = 100.0 * avg_plus / atr_i;
        let minus_di = 100.0 * avg_minus / atr_i;

        let di_sum = plus_di + minus_di;
        if di_sum > 0.0 {
            dx[i] = Some(100.0 * (plus_di - minus_di).abs() / di_sum);
        }
    }

    rolling_mean_opt(&dx, period)
}

// =============================================================================
// Indicator Set
// =============================================================================

/// Snapshot of every indicator value at one row
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorRow {
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub adx: Option<f64>,
    pub atr: Option<f64>,
    pub volume_ma: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
}

/// All indicator columns for a candle series, same length as the input
#[derive(Debug, Clone, Default)]
pub struct IndicatorSet {
    len: usize,
    sma_short_period: usize,
    sma_long_period: usize,
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_histogram: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_middle: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    /// One column per configured period, config order preserved
    pub smas: Vec<(usize, Vec<Option<f64>>)>,
    pub adx: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
    pub volume_ma: Vec<Option<f64>>,
    pub support: Vec<Option<f64>>,
    pub resistance: Vec<Option<f64>>,
}

impl IndicatorSet {
    /// Compute the full indicator surface for a candle series
    pub fn compute(candles: &[Candle], config: &IndicatorConfig) -> Self {
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let volume: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let (macd_line, signal_line, histogram) = macd(
            &close,
            config.macd_fast,
            config.macd_slow,
            config.macd_signal,
        );
        let (bb_upper, bb_middle, bb_lower) =
            bollinger_bands(&close, config.bb_period, config.bb_std);

        let mut periods = config.sma_periods.clone();
        // the crossover pair is always needed, whatever the column list says
        for p in [config.sma_short, config.sma_long] {
            if !periods.contains(&p) {
                periods.push(p);
            }
        }
        let smas: Vec<(usize, Vec<Option<f64>>)> =
            periods.iter().map(|&p| (p, sma(&close, p))).collect();

        IndicatorSet {
            len: candles.len(),
            sma_short_period: config.sma_short,
            sma_long_period: config.sma_long,
            rsi: rsi(&close, config.rsi_period),
            macd: macd_line,
            macd_signal: signal_line,
            macd_histogram: histogram,
            bb_upper,
            bb_middle,
            bb_lower,
            smas,
            adx: adx(&high, &low, &close, config.adx_period),
            atr: atr(&high, &low, &close, config.atr_period),
            volume_ma: rolling_mean(&volume, config.volume_ma_period),
            support: rolling_min(&low, config.support_resistance_window),
            resistance: rolling_max(&high, config.support_resistance_window),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The configured short period of the crossover pair
    pub fn sma_short_period(&self) -> usize {
        self.sma_short_period
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// SMA column for a configured period
    pub fn sma_column(&self, period: usize) -> Option<&[Option<f64>]> {
        self.smas
            .iter()
            .find(|(p, _)| *p == period)
            .map(|(_, col)| col.as_slice())
    }

    fn sma_at(&self, period: usize, index: usize) -> Option<f64> {
        self.sma_column(period)
            .and_then(|col| col.get(index).copied().flatten())
    }

    fn column_at(column: &[Option<f64>], index: usize) -> Option<f64> {
        column.get(index).copied().flatten()
    }

    /// Project one row of the indicator surface
    pub fn row(&self, index: usize) -> Option<IndicatorRow> {
        if index >= self.len {
            return None;
        }

        Some(IndicatorRow {
            rsi: Self::column_at(&self.rsi, index),
            macd: Self::column_at(&self.macd, index),
            macd_signal: Self::column_at(&self.macd_signal, index),
            macd_histogram: Self::column_at(&self.macd_histogram, index),
            bb_upper: Self::column_at(&self.bb_upper, index),
            bb_middle: Self::column_at(&self.bb_middle, index),
            bb_lower: Self::column_at(&self.bb_lower, index),
            sma_short: self.sma_at(self.sma_short_period, index),
            sma_long: self.sma_at(self.sma_long_period, index),
            adx: Self::column_at(&self.adx, index),
            atr: Self::column_at(&self.atr, index),
            volume_ma: Self::column_at(&self.volume_ma, index),
            support: Self::column_at(&self.support, index),
            resistance: Self::column_at(&self.resistance, index),
        })
    }

    /// The most recent row, if any candles were supplied
    pub fn latest(&self) -> Option<IndicatorRow> {
        if self.len == 0 {
            None
        } else {
            self.row(self.len - 1)
        }
    }

    /// Rows where the whole feature surface is defined. The momentum bias
    /// requires a minimum of these before it commits to a direction.
    pub fn defined_feature_rows(&self) -> usize {
        (0..self.len)
            .filter(|&i| {
                self.row(i).is_some_and(|r| {
                    [
                        r.rsi,
                        r.macd,
                        r.macd_signal,
                        r.sma_short,
                        r.sma_long,
                        r.adx,
                        r.atr,
                        r.volume_ma,
                        r.bb_upper,
                        r.support,
                        r.resistance,
                    ]
                    .iter()
                    .all(|v| v.is_some())
                })
            })
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================

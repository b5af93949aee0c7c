//! Market data access
//!
//! The engine never fetches anything itself; this module is the collaborator
//! boundary it is fed through. Every source honours one contract, an ordered
//! OHLCV series, so sources can be stacked into an ordered fallback chain.
//! A CSV cache backs offline snapshots and the download command.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{Candle, Symbol};

/// Base URL for the Binance public API
const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";

/// Maximum klines per request (Binance limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

// =============================================================================
// Provider Contract
// =============================================================================

/// Uniform contract for candle sources
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Source name for logs
    fn name(&self) -> &'static str;

    /// Fetch up to `limit` of the most recent candles, oldest first
    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>>;
}

/// Ordered fallback chain over candle sources.
///
/// Candidates are tried in registration order; the first non-empty success
/// wins. Failures and empty responses log at warn and fall through.
#[derive(Default)]
pub struct ProviderChain {
    providers: Vec<Box<dyn MarketDataProvider>>,
}

impl ProviderChain {
    pub fn new() -> Self {
        ProviderChain {
            providers: Vec::new(),
        }
    }

    pub fn with(mut self, provider: impl MarketDataProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl MarketDataProvider for ProviderChain {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        for provider in &self.providers {
            match provider.fetch_candles(symbol, interval, limit).await {
                Ok(candles) if !candles.is_empty() => {
                    info!(
                        provider = provider.name(),
                        count = candles.len(),
                        %symbol,
                        interval,
                        "candles fetched"
                    );
                    return Ok(candles);
                }
                Ok(_) => {
                    warn!(provider = provider.name(), %symbol, "provider returned no candles");
                }
                Err(e) => {
                    warn!(provider = provider.name(), %symbol, error = %e, "provider failed");
                }
            }
        }

        bail!(
            "all {} candle providers failed for {}",
            self.providers.len(),
            symbol
        )
    }
}

// =============================================================================
// Binance Provider
// =============================================================================

/// Binance public klines endpoint. No API key required for market data.
#[derive(Debug, Clone)]
pub struct BinanceProvider {
    client: Client,
}

impl Default for BinanceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceProvider {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        BinanceProvider { client }
    }
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!("{BINANCE_API_BASE}/klines");
        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        let params = [
            ("symbol", symbol.as_str().to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];

        debug!(%symbol, interval, limit, "fetching klines");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Binance API error {}: {}", status, body);
        }

        let raw_data: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance response")?;

        let mut candles = Vec::with_capacity(raw_data.len());
        let mut invalid_count = 0;
        for row in &raw_data {
            match kline_from_raw(row) {
                Some(candle) if candle.is_valid() => candles.push(candle),
                _ => invalid_count += 1,
            }
        }

        if invalid_count > 0 {
            warn!(invalid_count, %symbol, "skipped malformed klines");
        }

        Ok(enforce_order(candles))
    }
}

/// Parse one kline row: `[open_time, open, high, low, close, volume, ...]`
/// with prices quoted as strings
fn kline_from_raw(row: &[serde_json::Value]) -> Option<Candle> {
    let field = |i: usize| -> Option<f64> { row.get(i)?.as_str()?.parse().ok() };

    let open_time = row.first()?.as_i64()?;
    Some(Candle {
        datetime: DateTime::from_timestamp_millis(open_time)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

/// Drop candles that break the strictly-increasing timestamp invariant
fn enforce_order(candles: Vec<Candle>) -> Vec<Candle> {
    let mut ordered: Vec<Candle> = Vec::with_capacity(candles.len());
    let mut dropped = 0;

    for candle in candles {
        let in_order = ordered
            .last()
            .map_or(true, |last| candle.datetime > last.datetime);
        if in_order {
            ordered.push(candle);
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        warn!(dropped, "dropped out-of-order candles");
    }
    ordered
}

// =============================================================================
// CSV Cache
// =============================================================================

/// Cache file path for a symbol/interval pair
pub fn csv_path(data_dir: impl AsRef<Path>, symbol: &Symbol, interval: &str) -> PathBuf {
    data_dir
        .as_ref()
        .join(format!("{}_{}.csv", symbol.as_str(), interval))
}

/// Write candles to a CSV file, creating the directory if needed
pub fn save_csv(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create data directory")?;
    }

    let mut writer = csv::Writer::from_path(path).context("Failed to create CSV file")?;
    writer
        .write_record(["datetime", "open", "high", "low", "close", "volume"])
        .context("Failed to write CSV header")?;

    for candle in candles {
        writer
            .write_record([
                candle.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
                candle.open.to_string(),
                candle.high.to_string(),
                candle.low.to_string(),
                candle.close.to_string(),
                candle.volume.to_string(),
            ])
            .context("Failed to write CSV row")?;
    }

    writer.flush().context("Failed to flush CSV file")?;
    info!(path = %path.display(), count = candles.len(), "candles saved");
    Ok(())
}

/// Load candles from a CSV file, skipping invalid rows with a warning
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut candles = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                // no timezone in the cache format, assume UTC
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .context(format!("Failed to parse datetime: {dt_str}"))?;

        let field = |i: usize, name: &str| -> Result<f64> {
            record
                .get(i)
                .context(format!("Missing {name} column"))?
                .parse()
                .context(format!("Failed to parse {name}"))
        };

        let candle = Candle {
            datetime,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        };

        if candle.is_valid() {
            candles.push(candle);
        } else {
            invalid_count += 1;
            warn!(
                row = row_idx + 2,
                path = %path.display(),
                "skipping invalid candle"
            );
        }
    }

    if invalid_count > 0 {
        warn!(
            invalid_count,
            total = invalid_count + candles.len(),
            path = %path.display(),
            "skipped invalid candles"
        );
    }

    Ok(enforce_order(candles))
}

// =============================================================================
// Tests
// =============================================================================

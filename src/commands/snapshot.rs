//! Snapshot command - one refresh cycle, dashboard JSON on stdout

use anyhow::{Context, Result};
use tracing::info;

use crypto_dashboard::data::{csv_path, load_csv, BinanceProvider, MarketDataProvider, ProviderChain};
use crypto_dashboard::DashboardEngine;

use super::load_config;

pub fn run(config_path: Option<String>, offline: bool, sentiment: f64) -> Result<()> {
    let config = load_config(config_path)?;
    let symbol = config.data.symbol();
    let timeframe = config.data.timeframe.clone();

    let candles = if offline {
        let path = csv_path(&config.data.data_dir, &symbol, &timeframe);
        info!(path = %path.display(), "loading candles from cache");
        load_csv(&path).context("Failed to load cached candles; run the download command first")?
    } else {
        let rt = tokio::runtime::Runtime::new()?;
        let chain = ProviderChain::new().with(BinanceProvider::new());
        rt.block_on(chain.fetch_candles(&symbol, &timeframe, config.data.candle_count))?
    };

    info!(count = candles.len(), %symbol, timeframe, "running refresh cycle");

    let mut engine = DashboardEngine::new(config);
    let snapshot = engine.refresh(&candles, sentiment, chrono::Utc::now());

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

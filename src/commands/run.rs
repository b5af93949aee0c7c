//! Run command - refresh cycles on an interval
//!
//! Keeps one engine (and therefore one ledger) alive across cycles so open
//! positions, trade history, and the daily counter carry over. Ctrl-C stops
//! the loop between cycles.

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{error, info};

use crypto_dashboard::data::{BinanceProvider, MarketDataProvider, ProviderChain};
use crypto_dashboard::DashboardEngine;

use super::load_config;

pub fn run(config_path: Option<String>, interval: u64, sentiment: f64) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_loop(config_path, interval, sentiment))
}

async fn run_loop(config_path: Option<String>, interval: u64, sentiment: f64) -> Result<()> {
    let config = load_config(config_path)?;
    let symbol = config.data.symbol();
    let timeframe = config.data.timeframe.clone();
    let candle_count = config.data.candle_count;

    let mut engine = DashboardEngine::new(config);
    let chain = ProviderChain::new().with(BinanceProvider::new());

    info!(%symbol, timeframe, interval, "dashboard loop started");

    let mut cycle: u64 = 0;
    loop {
        cycle += 1;

        match chain.fetch_candles(&symbol, &timeframe, candle_count).await {
            Ok(candles) => {
                let snapshot = engine.refresh(&candles, sentiment, chrono::Utc::now());
                info!(
                    cycle,
                    last_price = snapshot.last_price,
                    signal = ?snapshot.signal,
                    can_trade = snapshot.market_context.can_trade,
                    open_positions = snapshot.open_positions.len(),
                    total_pnl = format!("{:.2}", snapshot.account.total_pnl),
                    win_rate = format!("{:.1}%", snapshot.account.win_rate),
                    "cycle complete"
                );
            }
            Err(e) => {
                // next cycle retries with fresh data
                error!(cycle, error = %e, "data fetch failed, skipping cycle");
            }
        }

        tokio::select! {
            _ = sleep(Duration::from_secs(interval)) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    info!("dashboard loop stopped");
    Ok(())
}

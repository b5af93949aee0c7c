//! Crypto Trading Dashboard Engine
//!
//! A single-symbol paper-trading dashboard core: it pulls historical OHLCV
//! candles, derives technical indicators, classifies the market regime,
//! evaluates rule-based entry signals, and tracks simulated positions
//! against stop-loss/take-profit levels. Each refresh cycle produces a
//! JSON-serializable [`DashboardSnapshot`] for a browser front end.
//!
//! The pipeline per cycle: candles -> [`indicators::IndicatorSet`] ->
//! [`regime::MarketContext`] -> [`signal::SignalGenerator`] ->
//! [`ledger::PositionLedger`]. The stop/target sweep runs every cycle,
//! whether or not new signals fire.
//!
//! # Example
//! ```no_run
//! use crypto_dashboard::data::{BinanceProvider, MarketDataProvider, ProviderChain};
//! use crypto_dashboard::{Config, DashboardEngine, Symbol};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let chain = ProviderChain::new().with(BinanceProvider::new());
//!     let candles = chain
//!         .fetch_candles(&Symbol::new("BTCUSDT"), "1h", 200)
//!         .await?;
//!
//!     let mut engine = DashboardEngine::new(config);
//!     let snapshot = engine.refresh(&candles, 0.0, chrono::Utc::now());
//!     println!("{}", serde_json::to_string_pretty(&snapshot)?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod data;
pub mod engine;
pub mod indicators;
pub mod ledger;
pub mod regime;
pub mod signal;
pub mod types;

pub use config::Config;
pub use engine::{DashboardEngine, DashboardSnapshot};
pub use ledger::PositionLedger;
pub use types::*;

//! Integration tests for the dashboard engine
//!
//! These tests drive whole refresh cycles through the public API and verify
//! that the indicator pipeline, regime gate, signal rules, and ledger work
//! together.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crypto_dashboard::engine::SignalHeadline;
use crypto_dashboard::{Candle, Config, DashboardEngine, Side, Symbol};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

/// Generate steadily rising candles
fn generate_trending_candles(count: usize, base_price: f64, trend_strength: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let close = base_price + i as f64 * trend_strength;
            Candle {
                datetime: start_time() + Duration::hours(i as i64),
                open: close - trend_strength * 0.3,
                high: close + base_price * 0.005,
                low: close - base_price * 0.005,
                close,
                volume: 1000.0 + i as f64 * 10.0,
            }
        })
        .collect()
}

/// Generate choppy range-bound candles
fn generate_choppy_candles(count: usize, base_price: f64, amplitude: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let close = base_price + (i as f64 * 0.9).sin() * amplitude;
            Candle {
                datetime: start_time() + Duration::hours(i as i64),
                open: close - amplitude * 0.2,
                high: close + amplitude * 0.5,
                low: close - amplitude * 0.5,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Config with the regime gate opened so entry rules can fire; the
/// monotonic fixtures saturate RSI at 100, so the overbought filter is
/// opened with it
fn permissive_config() -> Config {
    let mut config = Config::default();
    config.regime.sideways_adx_threshold = 0.0;
    config.regime.sideways_range_threshold = 0.0;
    config.regime.weak_trend_adx = 0.0;
    config.regime.crisis_sentiment_threshold = -10.0;
    config.signal.rsi_overbought = 101.0;
    config
}

// =============================================================================
// Full-Cycle Tests
// =============================================================================

#[test]
fn refresh_on_empty_series_is_neutral_not_an_error() {
    let mut engine = DashboardEngine::new(Config::default());
    let snapshot = engine.refresh(&[], 0.0, Utc::now());

    assert_eq!(snapshot.signal, SignalHeadline::None);
    assert_eq!(snapshot.last_price, 0.0);
    assert!(!snapshot.market_context.can_trade);
    assert!(snapshot.open_positions.is_empty());
    assert!(snapshot.recent_trades.is_empty());
}

#[test]
fn stock_thresholds_keep_a_ranging_market_blocked() {
    let mut engine = DashboardEngine::new(Config::default());
    let candles = generate_choppy_candles(150, 100.0, 1.5);
    let snapshot = engine.refresh(&candles, 0.0, Utc::now());

    assert!(!snapshot.market_context.can_trade);
    assert!(!snapshot.market_context.blocked_reasons.is_empty());
    assert_eq!(snapshot.signal, SignalHeadline::None);
    assert!(snapshot.open_positions.is_empty());
}

#[test]
fn trend_entry_and_stop_exit_lifecycle() {
    let mut engine = DashboardEngine::new(permissive_config());
    let candles = generate_trending_candles(120, 100.0, 1.0);
    let now = start_time() + Duration::hours(120);

    // cycle 1: the aligned trend opens a long
    let snapshot = engine.refresh(&candles, 0.0, now);
    assert_eq!(snapshot.signal, SignalHeadline::Buy);
    assert_eq!(snapshot.open_positions.len(), 1);

    let position = snapshot.open_positions[0].clone();
    assert_eq!(position.side, Side::Buy);
    assert!(position.stop_loss < position.entry_price);
    assert!(position.take_profit > position.entry_price);

    // cycle 2: price gaps below the stop; the sweep closes at the stop level
    let mut crashed = candles.clone();
    let crash_close = position.stop_loss - 10.0;
    crashed.push(Candle {
        datetime: start_time() + Duration::hours(121),
        open: position.entry_price,
        high: position.entry_price,
        low: crash_close - 1.0,
        close: crash_close,
        volume: 5000.0,
    });

    let snapshot = engine.refresh(&crashed, 0.0, now + Duration::hours(1));
    assert_eq!(snapshot.closed_this_cycle, vec![position.id]);
    assert!(snapshot.open_positions.iter().all(|p| p.id != position.id));

    let trade = snapshot
        .recent_trades
        .iter()
        .find(|t| t.trade.id == position.id)
        .expect("closed trade in recent history");
    assert_eq!(trade.trade.exit_price, position.stop_loss);
    assert!(trade.trade.pnl < 0.0);

    // the loss shows up in the account metrics
    assert!(snapshot.account.total_pnl < 0.0);
    assert_eq!(snapshot.account.win_rate, 0.0);
}

#[test]
fn take_profit_exit_realizes_a_win() {
    let mut engine = DashboardEngine::new(permissive_config());
    let now = start_time();

    let id = engine
        .ledger_mut()
        .execute(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            100.0,
            95.0,
            110.0,
            20.0,
            now,
        )
        .unwrap();

    // short series: no new signals possible, only the sweep acts
    let candles = generate_trending_candles(30, 111.0, 0.1);
    let snapshot = engine.refresh(&candles, 0.0, now + Duration::hours(1));

    assert_eq!(snapshot.closed_this_cycle, vec![id]);
    let trade = &snapshot.recent_trades[0].trade;
    assert_eq!(trade.exit_price, 110.0);
    assert!(trade.pnl > 0.0);
    assert_eq!(snapshot.account.win_rate, 100.0);
    assert_eq!(snapshot.account.profit_factor, 0.0); // no losses yet
}

#[test]
fn daily_trade_limit_is_enforced_and_resets() {
    let config = permissive_config();
    let max = config.trading.max_daily_trades;
    let mut engine = DashboardEngine::new(config);
    let candles = generate_trending_candles(120, 100.0, 1.0);
    let day_one = start_time() + Duration::days(30);

    // each cycle opens one long until the daily budget is spent
    for i in 0..max {
        let snapshot = engine.refresh(&candles, 0.0, day_one + Duration::minutes(i as i64));
        assert_eq!(
            snapshot.signal,
            SignalHeadline::Buy,
            "cycle {i} should trade"
        );
    }

    let blocked = engine.refresh(&candles, 0.0, day_one + Duration::minutes(30));
    assert_eq!(blocked.signal, SignalHeadline::None);
    assert_eq!(blocked.open_positions.len(), max as usize);
    assert_eq!(blocked.account.daily_trades, max);

    // the calendar day advances: the counter resets and trading resumes
    let next_day = engine.refresh(&candles, 0.0, day_one + Duration::days(1));
    assert_eq!(next_day.signal, SignalHeadline::Buy);
    assert_eq!(next_day.account.daily_trades, 1);
}

#[test]
fn sentiment_feeds_the_crisis_gate() {
    let mut config = permissive_config();
    // reinstate the sentiment trigger
    config.regime.crisis_sentiment_threshold = -0.3;
    let mut engine = DashboardEngine::new(config);

    // add a sharp selloff so sentiment plus decline crosses the crisis bar
    let mut candles = generate_trending_candles(110, 100.0, 1.0);
    let last_close = candles.last().unwrap().close;
    for i in 0..3 {
        let close = last_close * (1.0 - 0.06 * (i + 1) as f64);
        candles.push(Candle {
            datetime: start_time() + Duration::hours(110 + i),
            open: close * 1.05,
            high: close * 1.06,
            low: close * 0.99,
            close,
            volume: 1200.0,
        });
    }

    let snapshot = engine.refresh(&candles, -0.8, Utc::now());
    assert!(snapshot.market_context.crisis.is_crisis);
    assert!(!snapshot.market_context.can_trade);
    assert_eq!(snapshot.signal, SignalHeadline::None);
}

#[test]
fn snapshot_payload_has_the_full_contract() {
    let mut engine = DashboardEngine::new(permissive_config());
    let candles = generate_trending_candles(120, 100.0, 1.0);
    let snapshot = engine.refresh(&candles, 0.0, Utc::now());

    let json = serde_json::to_value(&snapshot).unwrap();
    for key in [
        "symbol",
        "last_price",
        "signal",
        "indicators",
        "market_context",
        "prediction",
        "buy_signal",
        "sell_signal",
        "stop_loss_info",
        "account",
        "open_positions",
        "recent_trades",
    ] {
        assert!(json.get(key).is_some(), "missing snapshot key {key}");
    }

    assert!(json["indicators"]["rsi"].as_f64().is_some());
    assert!(json["market_context"]["trend"]["direction"].is_string());
    assert!(json["account"]["max_daily_trades"].as_u64().is_some());
}

#[test]
fn engine_state_survives_many_cycles() {
    let mut engine = DashboardEngine::new(permissive_config());
    let now = start_time() + Duration::days(10);

    // alternate trending and short series over several simulated days
    for day in 0..5 {
        let candles = if day % 2 == 0 {
            generate_trending_candles(120, 100.0 + day as f64, 1.0)
        } else {
            generate_trending_candles(30, 100.0, 0.5)
        };
        let snapshot = engine.refresh(&candles, 0.0, now + Duration::days(day));

        // invariants that must hold on every cycle
        assert!(snapshot.account.win_rate >= 0.0 && snapshot.account.win_rate <= 100.0);
        assert!(snapshot.account.daily_trades <= snapshot.account.max_daily_trades);
        for position in &snapshot.open_positions {
            assert!(position.size > 0.0);
            assert!(position.entry_price > 0.0);
        }
    }

    // history and open set never share an id
    let open_ids: Vec<_> = engine.ledger().open_positions().map(|p| p.id).collect();
    for trade in engine.ledger().history() {
        assert!(!open_ids.contains(&trade.id));
    }
}

//! Download command - fetch historical candles into the CSV cache

use anyhow::Result;
use tracing::info;

use crypto_dashboard::data::{csv_path, save_csv, BinanceProvider, MarketDataProvider};
use crypto_dashboard::Symbol;

pub fn run(symbols: String, timeframes: String, count: u32, output: String) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    let symbols: Vec<&str> = symbols.split(',').map(|s| s.trim()).collect();
    let intervals: Vec<&str> = timeframes.split(',').map(|s| s.trim()).collect();

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOADING HISTORICAL CANDLES FROM BINANCE");
    println!("{}", "=".repeat(60));
    println!("  Symbols:    {symbols:?}");
    println!("  Timeframes: {intervals:?}");
    println!("  Count:      {count}");
    println!("  Output:     {output}");
    println!("{}\n", "=".repeat(60));

    let provider = BinanceProvider::new();
    let mut total_candles = 0;
    let mut success_count = 0;
    let mut total_downloads = 0;

    for symbol in &symbols {
        println!("\n{symbol}:");
        let symbol = Symbol::new(*symbol);

        for interval in &intervals {
            total_downloads += 1;
            print!("  Downloading {symbol} {interval}... ");

            match rt.block_on(provider.fetch_candles(&symbol, interval, count)) {
                Ok(candles) => {
                    let path = csv_path(&output, &symbol, interval);
                    match save_csv(&path, &candles) {
                        Ok(()) => {
                            total_candles += candles.len();
                            success_count += 1;
                            println!("ok, {} candles", candles.len());
                        }
                        Err(e) => println!("write error: {e}"),
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    println!(
        "Done: {success_count}/{total_downloads} downloads, {total_candles} candles total"
    );
    println!("{}\n", "=".repeat(60));

    info!(success_count, total_downloads, total_candles, "download finished");
    Ok(())
}

use market_stream::{
    LiquidationConfig, LiquidationHandlers, SessionConfig, StreamError, subscribe_liquidations,
};
use rust_decimal::Decimal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), StreamError> {
    // Initialise INFO Tracing log subscriber
    init_logging();

    println!("\n🔴 Starting Liquidation Data Stream...");
    println!("📡 Connecting to Binance Futures (!forceOrder@arr)...");
    println!("💥 Waiting for liquidation events (BTC + ETH only)...\n");

    let handlers = LiquidationHandlers::default().on_large_event(|event| {
        info!(
            "🐋 LARGE LIQUIDATION {} {} {} @ {} (${})",
            event.symbol, event.side, event.quantity, event.price, event.usd_value
        );
    });

    let handle = subscribe_liquidations(
        &["BTC", "ETH"],
        handlers,
        LiquidationConfig::default().with_large_event_threshold(Decimal::from(250_000)),
        SessionConfig::default(),
    )?;

    // Print a rolling summary every 30 seconds
    let mut summary = tokio::time::interval(std::time::Duration::from_secs(30));
    summary.tick().await;
    for _ in 0..10 {
        summary.tick().await;
        let stats = handle.stats();
        info!(
            "💥 {} events | longs ${} | shorts ${} | largest {:?}",
            stats.count,
            stats.total_long_usd,
            stats.total_short_usd,
            stats.largest.map(|event| event.usd_value),
        );
    }

    handle.close();
    Ok(())
}

// Initialise an INFO `Subscriber` for `Tracing` logs and install it as the global default.
fn init_logging() {
    tracing_subscriber::fmt()
        // Filter messages based on the INFO
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        // Disable colours on release builds
        .with_ansi(cfg!(debug_assertions))
        // Install this Tracing subscriber as global default
        .init()
}

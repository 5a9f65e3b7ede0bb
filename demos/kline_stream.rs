use market_stream::{Interval, KlineHandlers, SessionConfig, StreamError, subscribe_kline};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), StreamError> {
    // Initialise INFO Tracing log subscriber
    init_logging();

    println!("\n📊 Starting Kline Data Stream...");
    println!("📡 Connecting to Binance Futures (BTCUSDT 1m)...\n");

    let handlers = KlineHandlers::default()
        .on_update(|kline, is_closed| {
            info!(
                "📈 {} {} close={} volume={} closed={is_closed}",
                kline.symbol, kline.interval, kline.close, kline.volume
            );
        })
        .on_new_closed_kline(|kline| {
            info!(
                "✅ CANDLE CLOSED {} {} o={} h={} l={} c={}",
                kline.symbol, kline.interval, kline.open, kline.high, kline.low, kline.close
            );
        });

    let handle = subscribe_kline("BTCUSDT", Interval::Min1, handlers, SessionConfig::default())?;

    // Log every connection state transition while streaming
    let mut status = handle.status_watch();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow().clone();
            info!(state = ?current.state, error = ?current.error, "session status");
        }
    });

    tokio::time::sleep(std::time::Duration::from_secs(300)).await;
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

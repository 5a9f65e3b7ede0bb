//! Real-time market-data streaming for the trading dashboard.
//!
//! Maintains resilient WebSocket subscriptions to Binance USDⓈ-M futures
//! streams, classifies inbound frames into typed events, throttles
//! high-frequency updates, aggregates rolling liquidation statistics, and
//! evaluates edge-triggered user alerts.
//!
//! Each subscription owns one independent session task with automatic
//! recovery: exponential backoff on abnormal disconnects, a heartbeat that
//! force-closes stale connections, and a terminal `Error` state once retries
//! are exhausted. Consumers interact through handles; callbacks can be
//! swapped at any time without touching the connection.
//!
//! ```rust,no_run
//! use market_stream::{
//!     Interval, KlineHandlers, SessionConfig, StreamError, subscribe_kline,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StreamError> {
//!     let handle = subscribe_kline(
//!         "BTCUSDT",
//!         Interval::Min1,
//!         KlineHandlers::default().on_update(|kline, is_closed| {
//!             println!("{} close={} closed={is_closed}", kline.symbol, kline.close);
//!         }),
//!         SessionConfig::default(),
//!     )?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     handle.close();
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod de;
pub mod error;
pub mod event;
pub mod exchange;
pub mod session;
pub mod stats;
pub mod streams;

pub use alert::{
    Alert, AlertEvaluator, AlertKind, AlertNotification, PriceCondition, SentimentClass,
    SentimentSignal, SignalType,
};
pub use error::StreamError;
pub use event::{Kline, LiquidationEvent, PositionSide, StreamEvent};
pub use exchange::{Interval, StreamChannel};
pub use session::{SessionConfig, SessionState, SessionStatus};
pub use stats::{LiquidationAggregator, RollingStats};
pub use streams::{
    KlineHandlers, KlineStreamHandle, LiquidationConfig, LiquidationHandlers,
    LiquidationStreamHandle, subscribe_kline, subscribe_liquidations,
};

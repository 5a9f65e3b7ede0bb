//! Public subscription API: wires sessions, the update throttle, rolling
//! statistics, and swappable handler slots together.
//!
//! Each subscribe call validates its configuration synchronously, spawns one
//! independent session task, and returns a handle exposing lifecycle control
//! and observable connection state. Handles for different subscriptions are
//! fully independent; closing one never affects another.

use crate::{
    error::StreamError,
    event::{Kline, LiquidationEvent, StreamEvent},
    exchange::{Interval, StreamChannel, validate_symbol},
    session::{
        self, EventSink, SessionConfig, SessionHandle, SessionState, SessionStatus,
        transport::{Transport, WsTransport},
    },
    stats::{DEFAULT_RECENT_CAPACITY, LiquidationAggregator, RollingStats},
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

/// Callbacks invoked as kline updates flow through the throttle.
///
/// Swapping handlers via [`KlineStreamHandle::set_handlers`] never touches
/// the connection.
pub struct KlineHandlers {
    pub on_update: Box<dyn FnMut(&Kline, bool) + Send>,
    pub on_new_closed_kline: Box<dyn FnMut(&Kline) + Send>,
}

impl Default for KlineHandlers {
    fn default() -> Self {
        Self {
            on_update: Box::new(|_kline, _is_closed| {}),
            on_new_closed_kline: Box::new(|_kline| {}),
        }
    }
}

impl KlineHandlers {
    pub fn on_update(mut self, handler: impl FnMut(&Kline, bool) + Send + 'static) -> Self {
        self.on_update = Box::new(handler);
        self
    }

    pub fn on_new_closed_kline(mut self, handler: impl FnMut(&Kline) + Send + 'static) -> Self {
        self.on_new_closed_kline = Box::new(handler);
        self
    }
}

/// Callbacks for the liquidation subscription.
pub struct LiquidationHandlers {
    /// Fired synchronously for every accepted event at or above the
    /// configured notional threshold, bypassing the throttle.
    pub on_large_event: Box<dyn FnMut(&LiquidationEvent) + Send>,
}

impl Default for LiquidationHandlers {
    fn default() -> Self {
        Self {
            on_large_event: Box::new(|_event| {}),
        }
    }
}

impl LiquidationHandlers {
    pub fn on_large_event(
        mut self,
        handler: impl FnMut(&LiquidationEvent) + Send + 'static,
    ) -> Self {
        self.on_large_event = Box::new(handler);
        self
    }
}

/// Policy for the liquidation aggregation path.
#[derive(Clone, Debug)]
pub struct LiquidationConfig {
    /// Notional USD value at or above which `on_large_event` fires.
    pub large_event_threshold: Decimal,
    /// Bound on the recent-events FIFO.
    pub recent_capacity: usize,
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            large_event_threshold: Decimal::from(100_000),
            recent_capacity: DEFAULT_RECENT_CAPACITY,
        }
    }
}

impl LiquidationConfig {
    pub fn with_large_event_threshold(mut self, threshold: Decimal) -> Self {
        self.large_event_threshold = threshold;
        self
    }

    pub fn with_recent_capacity(mut self, capacity: usize) -> Self {
        self.recent_capacity = capacity;
        self
    }
}

/// Subscribe to one symbol + interval kline feed.
pub fn subscribe_kline(
    symbol: &str,
    interval: Interval,
    handlers: KlineHandlers,
    config: SessionConfig,
) -> Result<KlineStreamHandle, StreamError> {
    subscribe_kline_with(WsTransport, symbol, interval, handlers, config)
}

/// Subscribe to a kline feed over a custom transport.
pub fn subscribe_kline_with<T: Transport>(
    transport: T,
    symbol: &str,
    interval: Interval,
    handlers: KlineHandlers,
    config: SessionConfig,
) -> Result<KlineStreamHandle, StreamError> {
    let channel = StreamChannel::kline(symbol, interval)?;

    let handlers = Arc::new(Mutex::new(handlers));
    let last_update = Arc::new(Mutex::new(None::<DateTime<Utc>>));

    let sink: EventSink = {
        let handlers = Arc::clone(&handlers);
        let last_update = Arc::clone(&last_update);
        Arc::new(Mutex::new(Box::new(move |event: StreamEvent| {
            if let StreamEvent::Kline(kline) = event {
                *last_update.lock() = Some(Utc::now());
                let mut handlers = handlers.lock();
                (handlers.on_update)(&kline, kline.is_closed);
                if kline.is_closed {
                    (handlers.on_new_closed_kline)(&kline);
                }
            }
        })))
    };

    let session = session::spawn(channel.name(), channel.url(), transport, config, sink);

    Ok(KlineStreamHandle {
        channel,
        session,
        handlers,
        last_update,
    })
}

/// Handle to one kline streaming session.
pub struct KlineStreamHandle {
    channel: StreamChannel,
    session: SessionHandle,
    handlers: Arc<Mutex<KlineHandlers>>,
    last_update: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl KlineStreamHandle {
    /// Replace the consumer callbacks without tearing down the transport.
    pub fn set_handlers(&self, handlers: KlineHandlers) {
        *self.handlers.lock() = handlers;
    }

    /// Reset the attempt counter and force a fresh connection.
    pub fn reconnect(&self) {
        self.session.reconnect();
    }

    /// Tear the session down; cancels timers and closes the transport with
    /// the intentional code, so no reconnection follows.
    pub fn close(&self) {
        self.session.close();
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn error(&self) -> Option<String> {
        self.session.error()
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        *self.last_update.lock()
    }

    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.session.status_watch()
    }

    pub fn channel(&self) -> &StreamChannel {
        &self.channel
    }
}

/// Subscribe to the multiplexed liquidation feed, filtered to a symbol set.
pub fn subscribe_liquidations(
    symbols: &[&str],
    handlers: LiquidationHandlers,
    liquidation_config: LiquidationConfig,
    session_config: SessionConfig,
) -> Result<LiquidationStreamHandle, StreamError> {
    subscribe_liquidations_with(
        WsTransport,
        symbols,
        handlers,
        liquidation_config,
        session_config,
    )
}

/// Subscribe to the liquidation feed over a custom transport.
pub fn subscribe_liquidations_with<T: Transport>(
    transport: T,
    symbols: &[&str],
    handlers: LiquidationHandlers,
    liquidation_config: LiquidationConfig,
    session_config: SessionConfig,
) -> Result<LiquidationStreamHandle, StreamError> {
    let symbols = validate_symbol_set(symbols)?;

    let aggregator = Arc::new(Mutex::new(LiquidationAggregator::with_capacity(
        &symbols,
        liquidation_config.recent_capacity,
    )));
    let handlers = Arc::new(Mutex::new(handlers));

    let sink: EventSink = {
        let aggregator = Arc::clone(&aggregator);
        let handlers = Arc::clone(&handlers);
        let threshold = liquidation_config.large_event_threshold;
        Arc::new(Mutex::new(Box::new(move |event: StreamEvent| {
            if let StreamEvent::Liquidation(liquidation) = event {
                let accepted = aggregator.lock().apply(&liquidation);
                if accepted && liquidation.usd_value >= threshold {
                    let mut handlers = handlers.lock();
                    (handlers.on_large_event)(&liquidation);
                }
            }
        })))
    };

    let channel = StreamChannel::Liquidations;
    let session = session::spawn(channel.name(), channel.url(), transport, session_config, sink);

    Ok(LiquidationStreamHandle {
        session,
        aggregator,
        handlers,
    })
}

/// Handle to the liquidation streaming session and its rolling statistics.
pub struct LiquidationStreamHandle {
    session: SessionHandle,
    aggregator: Arc<Mutex<LiquidationAggregator>>,
    handlers: Arc<Mutex<LiquidationHandlers>>,
}

impl LiquidationStreamHandle {
    pub fn stats(&self) -> RollingStats {
        self.aggregator.lock().stats()
    }

    pub fn recent(&self) -> Vec<LiquidationEvent> {
        self.aggregator.lock().recent()
    }

    pub fn reset_stats(&self) {
        self.aggregator.lock().reset();
    }

    /// Replace the tracked symbol set. Resets statistics to avoid stale
    /// cross-symbol totals; the feed itself is multiplexed, so no
    /// resubscription happens.
    pub fn set_symbols(&self, symbols: &[&str]) -> Result<(), StreamError> {
        let symbols = validate_symbol_set(symbols)?;
        self.aggregator.lock().set_symbols(&symbols);
        Ok(())
    }

    pub fn set_handlers(&self, handlers: LiquidationHandlers) {
        *self.handlers.lock() = handlers;
    }

    pub fn reconnect(&self) {
        self.session.reconnect();
    }

    pub fn close(&self) {
        self.session.close();
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn error(&self) -> Option<String> {
        self.session.error()
    }

    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.session.status_watch()
    }
}

fn validate_symbol_set(symbols: &[&str]) -> Result<Vec<smol_str::SmolStr>, StreamError> {
    if symbols.is_empty() {
        return Err(StreamError::Configuration(
            "liquidation subscription requires at least one symbol".to_string(),
        ));
    }
    symbols.iter().map(|symbol| validate_symbol(symbol)).collect()
}

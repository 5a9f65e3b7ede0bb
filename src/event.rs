//! Typed domain events produced by the message classifier.

use crate::exchange::Interval;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Output of one classification pass over a raw inbound frame.
///
/// `Unrecognized` covers subscribe acks, text pongs, and any payload without a
/// known event tag; the session loop silently discards it.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Kline(Kline),
    Liquidation(LiquidationEvent),
    Unrecognized,
}

/// Candlestick snapshot for one symbol and interval.
///
/// A session holds at most one current (possibly still-open) `Kline`; once
/// `is_closed` is observed the value is immutable.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Kline {
    pub symbol: SmolStr,
    pub interval: Interval,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub trades: u64,
    pub is_closed: bool,
}

/// Which position type the venue force-closed.
///
/// Note the wire inversion: a taker SELL order liquidating means a Long was
/// closed, a taker BUY order means a Short was closed. See
/// [`crate::exchange::message`] for the mapping.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "Long",
            PositionSide::Short => "Short",
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A forced liquidation normalised from the exchange feed.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LiquidationEvent {
    /// Deduplicating key derived as `"{epoch_ms}-{SYMBOL}-{side}"`.
    pub id: SmolStr,
    pub symbol: SmolStr,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub usd_value: Decimal,
    pub time: DateTime<Utc>,
}

impl LiquidationEvent {
    /// Derive the deduplicating identity for a liquidation observation.
    pub fn derive_id(time: DateTime<Utc>, symbol: &str, side: PositionSide) -> SmolStr {
        SmolStr::new(format!("{}-{}-{}", time.timestamp_millis(), symbol, side))
    }
}

//! Exchange contract: endpoint derivation, subscription validation, and the
//! wire message classifier.
//!
//! The dashboard streams from the Binance USDⓈ-M futures WebSocket API. The
//! message schema is a fixed external contract; nothing here redesigns it.

pub mod message;

use crate::error::StreamError;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use smol_str::SmolStr;
use std::str::FromStr;

/// Binance USDⓈ-M futures WebSocket base URL.
///
/// See docs: <https://binance-docs.github.io/apidocs/futures/en/#websocket-market-streams>
pub const WS_BASE_URL: &str = "wss://fstream.binance.com/ws";

/// Multiplexed forced-liquidation channel covering all instruments.
///
/// See docs: <https://binance-docs.github.io/apidocs/futures/en/#liquidation-order-streams>
pub const LIQUIDATIONS_CHANNEL: &str = "!forceOrder@arr";

/// Candlestick interval supported by the kline channel.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Interval {
    Min1,
    Min3,
    Min5,
    Min15,
    Min30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour8,
    Hour12,
    Day1,
    Day3,
    Week1,
    Month1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min3 => "3m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour2 => "2h",
            Interval::Hour4 => "4h",
            Interval::Hour6 => "6h",
            Interval::Hour8 => "8h",
            Interval::Hour12 => "12h",
            Interval::Day1 => "1d",
            Interval::Day3 => "3d",
            Interval::Week1 => "1w",
            Interval::Month1 => "1M",
        }
    }
}

impl FromStr for Interval {
    type Err = StreamError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "1m" => Ok(Interval::Min1),
            "3m" => Ok(Interval::Min3),
            "5m" => Ok(Interval::Min5),
            "15m" => Ok(Interval::Min15),
            "30m" => Ok(Interval::Min30),
            "1h" => Ok(Interval::Hour1),
            "2h" => Ok(Interval::Hour2),
            "4h" => Ok(Interval::Hour4),
            "6h" => Ok(Interval::Hour6),
            "8h" => Ok(Interval::Hour8),
            "12h" => Ok(Interval::Hour12),
            "1d" => Ok(Interval::Day1),
            "3d" => Ok(Interval::Day3),
            "1w" => Ok(Interval::Week1),
            "1M" => Ok(Interval::Month1),
            other => Err(StreamError::Configuration(format!(
                "unsupported kline interval: {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Interval {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Validate and normalise a venue symbol (non-empty, ASCII alphanumeric,
/// uppercased).
pub fn validate_symbol(symbol: &str) -> Result<SmolStr, StreamError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StreamError::Configuration(format!(
            "invalid symbol: {symbol:?}"
        )));
    }
    Ok(SmolStr::new(trimmed.to_ascii_uppercase()))
}

/// One logical subscription, translated into a channel name and endpoint URL.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum StreamChannel {
    /// One symbol + interval candlestick feed.
    Kline { symbol: SmolStr, interval: Interval },
    /// The multiplexed all-instrument liquidation feed.
    Liquidations,
}

impl StreamChannel {
    /// Build a kline channel, rejecting invalid symbols synchronously.
    pub fn kline(symbol: &str, interval: Interval) -> Result<Self, StreamError> {
        Ok(StreamChannel::Kline {
            symbol: validate_symbol(symbol)?,
            interval,
        })
    }

    /// Channel name, also used as the session identifier.
    pub fn name(&self) -> SmolStr {
        match self {
            StreamChannel::Kline { symbol, interval } => SmolStr::new(format!(
                "{}@kline_{}",
                symbol.to_ascii_lowercase(),
                interval
            )),
            StreamChannel::Liquidations => SmolStr::new(LIQUIDATIONS_CHANNEL),
        }
    }

    /// Full endpoint URL for the raw stream.
    pub fn url(&self) -> String {
        format!("{WS_BASE_URL}/{}", self.name())
    }
}

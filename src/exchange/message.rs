//! Message classifier: pure mapping from a raw inbound frame to a typed
//! [`StreamEvent`].
//!
//! Frames arrive either raw (`/ws/<channel>`) or wrapped in the
//! combined-stream envelope (`{"stream": …, "data": {…}}`); the classifier
//! unwraps the envelope before dispatching on the `"e"` event tag. Payloads
//! without a recognised tag (subscribe acks, text pongs) classify as
//! [`StreamEvent::Unrecognized`] and are ignored upstream.

use crate::{
    de,
    error::StreamError,
    event::{Kline, LiquidationEvent, PositionSide, StreamEvent},
    exchange::Interval,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kline channel payload.
///
/// See docs: <https://binance-docs.github.io/apidocs/futures/en/#kline-candlestick-streams>
#[derive(Clone, Debug, Deserialize)]
pub struct KlineFrame {
    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "k")]
    pub kline: KlineData,
}

/// Candlestick data nested within a [`KlineFrame`].
#[derive(Clone, Debug, Deserialize)]
pub struct KlineData {
    #[serde(rename = "t", deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")]
    pub open_time: DateTime<Utc>,

    #[serde(rename = "T", deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")]
    pub close_time: DateTime<Utc>,

    #[serde(rename = "i")]
    pub interval: Interval,

    #[serde(rename = "o", deserialize_with = "de::de_str")]
    pub open: Decimal,

    #[serde(rename = "h", deserialize_with = "de::de_str")]
    pub high: Decimal,

    #[serde(rename = "l", deserialize_with = "de::de_str")]
    pub low: Decimal,

    #[serde(rename = "c", deserialize_with = "de::de_str")]
    pub close: Decimal,

    #[serde(rename = "v", deserialize_with = "de::de_str")]
    pub volume: Decimal,

    #[serde(rename = "q", deserialize_with = "de::de_str")]
    pub quote_volume: Decimal,

    #[serde(rename = "n")]
    pub trades: u64,

    #[serde(rename = "x")]
    pub is_closed: bool,
}

impl From<KlineFrame> for Kline {
    fn from(frame: KlineFrame) -> Self {
        Self {
            symbol: frame.symbol.into(),
            interval: frame.kline.interval,
            open_time: frame.kline.open_time,
            close_time: frame.kline.close_time,
            open: frame.kline.open,
            high: frame.kline.high,
            low: frame.kline.low,
            close: frame.kline.close,
            volume: frame.kline.volume,
            quote_volume: frame.kline.quote_volume,
            trades: frame.kline.trades,
            is_closed: frame.kline.is_closed,
        }
    }
}

/// Forced-liquidation channel payload.
///
/// See docs: <https://binance-docs.github.io/apidocs/futures/en/#liquidation-order-streams>
#[derive(Clone, Debug, Deserialize)]
pub struct ForceOrderFrame {
    #[serde(rename = "o")]
    pub order: ForceOrder,
}

/// Liquidation order nested within a [`ForceOrderFrame`].
#[derive(Clone, Debug, Deserialize)]
pub struct ForceOrder {
    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "S")]
    pub side: OrderSide,

    #[serde(rename = "q", deserialize_with = "de::de_str")]
    pub quantity: Decimal,

    #[serde(rename = "p", deserialize_with = "de::de_str")]
    pub price: Decimal,

    #[serde(rename = "ap", deserialize_with = "de::de_str")]
    pub average_price: Decimal,

    #[serde(rename = "T", deserialize_with = "de::de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
}

/// Taker order side as encoded on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl From<OrderSide> for PositionSide {
    /// Exchange contract inversion: the venue SELLS to close a Long and BUYS
    /// to close a Short. Verified against the documented liquidation
    /// semantics; do not "fix".
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Sell => PositionSide::Long,
            OrderSide::Buy => PositionSide::Short,
        }
    }
}

impl From<ForceOrderFrame> for LiquidationEvent {
    fn from(frame: ForceOrderFrame) -> Self {
        let order = frame.order;
        let side = PositionSide::from(order.side);

        // Prefer the average fill price for notional value; fall back to the
        // order price when the venue reports zero.
        let fill_price = if order.average_price > Decimal::ZERO {
            order.average_price
        } else {
            order.price
        };

        Self {
            id: LiquidationEvent::derive_id(order.time, &order.symbol, side),
            symbol: order.symbol.into(),
            side,
            quantity: order.quantity,
            price: fill_price,
            usd_value: fill_price * order.quantity,
            time: order.time,
        }
    }
}

/// Classify a raw inbound frame into a typed [`StreamEvent`].
///
/// Stateless and pure: a malformed frame yields a local
/// [`StreamError::Parse`] that the session logs and drops without touching
/// connection state.
pub fn classify(raw: &str) -> Result<StreamEvent, StreamError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|error| StreamError::Parse(error.to_string()))?;

    // Combined-stream envelope wraps the payload under "data".
    let payload = match value.get("data") {
        Some(data) if data.get("e").is_some() => data,
        _ => &value,
    };

    match payload.get("e").and_then(Value::as_str) {
        Some("kline") => serde_json::from_value::<KlineFrame>(payload.clone())
            .map(|frame| StreamEvent::Kline(Kline::from(frame)))
            .map_err(|error| StreamError::Parse(error.to_string())),
        Some("forceOrder") => serde_json::from_value::<ForceOrderFrame>(payload.clone())
            .map(|frame| StreamEvent::Liquidation(LiquidationEvent::from(frame)))
            .map_err(|error| StreamError::Parse(error.to_string())),
        _ => Ok(StreamEvent::Unrecognized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const KLINE_FRAME: &str = r#"{
        "e": "kline",
        "E": 1700000001000,
        "s": "BTCUSDT",
        "k": {
            "t": 1700000000000,
            "T": 1700000059999,
            "s": "BTCUSDT",
            "i": "1m",
            "f": 100,
            "L": 200,
            "o": "50000.00",
            "c": "50010.00",
            "h": "50020.00",
            "l": "49990.00",
            "v": "12.5",
            "n": 150,
            "x": false,
            "q": "625000.00",
            "V": "6.0",
            "Q": "300000.00",
            "B": "0"
        }
    }"#;

    const FORCE_ORDER_SELL: &str = r#"{
        "e": "forceOrder",
        "E": 1700000002000,
        "o": {
            "s": "BTCUSDT",
            "S": "SELL",
            "o": "LIMIT",
            "f": "IOC",
            "q": "0.014",
            "p": "49000.00",
            "ap": "49100.00",
            "X": "FILLED",
            "l": "0.014",
            "z": "0.014",
            "T": 1700000002000
        }
    }"#;

    const FORCE_ORDER_BUY: &str = r#"{
        "e": "forceOrder",
        "o": {
            "s": "ETHUSDT",
            "S": "BUY",
            "q": "2.0",
            "p": "3000.00",
            "ap": "0",
            "T": 1700000003000
        }
    }"#;

    #[test]
    fn test_classify_kline() {
        let event = classify(KLINE_FRAME).unwrap();
        let StreamEvent::Kline(kline) = event else {
            panic!("expected kline, got {event:?}");
        };
        assert_eq!(kline.symbol, "BTCUSDT");
        assert_eq!(kline.interval, Interval::Min1);
        assert_eq!(kline.open, dec!(50000.00));
        assert_eq!(kline.close, dec!(50010.00));
        assert_eq!(kline.high, dec!(50020.00));
        assert_eq!(kline.low, dec!(49990.00));
        assert_eq!(kline.volume, dec!(12.5));
        assert_eq!(kline.quote_volume, dec!(625000.00));
        assert_eq!(kline.trades, 150);
        assert!(!kline.is_closed);
        assert_eq!(kline.open_time.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(kline.close_time.timestamp_millis(), 1_700_000_059_999);
    }

    #[test]
    fn test_classify_liquidation_sell_closes_long() {
        let event = classify(FORCE_ORDER_SELL).unwrap();
        let StreamEvent::Liquidation(liquidation) = event else {
            panic!("expected liquidation, got {event:?}");
        };
        // Taker SELL order means a Long position was force-closed
        assert_eq!(liquidation.side, PositionSide::Long);
        assert_eq!(liquidation.symbol, "BTCUSDT");
        assert_eq!(liquidation.quantity, dec!(0.014));
        assert_eq!(liquidation.price, dec!(49100.00));
        assert_eq!(liquidation.usd_value, dec!(49100.00) * dec!(0.014));
        assert_eq!(liquidation.id, "1700000002000-BTCUSDT-Long");
    }

    #[test]
    fn test_classify_liquidation_buy_closes_short() {
        let event = classify(FORCE_ORDER_BUY).unwrap();
        let StreamEvent::Liquidation(liquidation) = event else {
            panic!("expected liquidation, got {event:?}");
        };
        // Taker BUY order means a Short position was force-closed
        assert_eq!(liquidation.side, PositionSide::Short);
        // Zero average price falls back to the order price
        assert_eq!(liquidation.price, dec!(3000.00));
        assert_eq!(liquidation.usd_value, dec!(6000.00));
    }

    #[test]
    fn test_classify_combined_stream_envelope() {
        let wrapped = format!(r#"{{"stream":"btcusdt@kline_1m","data":{KLINE_FRAME}}}"#);
        let event = classify(&wrapped).unwrap();
        assert!(matches!(event, StreamEvent::Kline(_)));
    }

    #[test]
    fn test_classify_subscribe_ack_is_unrecognized() {
        let event = classify(r#"{"result":null,"id":1}"#).unwrap();
        assert_eq!(event, StreamEvent::Unrecognized);
    }

    #[test]
    fn test_classify_non_numeric_price_is_parse_error() {
        let malformed = KLINE_FRAME.replace("\"50000.00\"", "\"not-a-price\"");
        assert!(matches!(
            classify(&malformed),
            Err(StreamError::Parse(_))
        ));
    }

    #[test]
    fn test_classify_invalid_json_is_parse_error() {
        assert!(matches!(
            classify("{not json"),
            Err(StreamError::Parse(_))
        ));
    }
}

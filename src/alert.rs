//! Edge-triggered alert evaluation.
//!
//! The evaluator detects transitions, not steady states: a price crossing its
//! target fires once, and staying beyond the target on every subsequent tick
//! fires nothing. Three signal kinds (price, derived trade signal, sentiment)
//! share one evaluation pass per external tick, diffing the current snapshot
//! against the previous one. The very first tick seeds the snapshot and emits
//! nothing.

use crate::error::StreamError;
use chrono::{DateTime, TimeDelta, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;
use tracing::debug;

/// Default per-alert refractory period after a trigger.
pub const DEFAULT_COOLDOWN: TimeDelta = TimeDelta::minutes(5);

/// Price comparator for price alerts.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum PriceCondition {
    Above,
    Below,
}

impl PriceCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCondition::Above => "above",
            PriceCondition::Below => "below",
        }
    }
}

/// Derived trade-recommendation type supplied by the aggregation layer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum SignalType {
    Buy,
    Sell,
    Neutral,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "buy",
            SignalType::Sell => "sell",
            SignalType::Neutral => "neutral",
        }
    }
}

/// Coarse market-sentiment classification.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
pub enum SentimentClass {
    Bullish,
    Bearish,
    Neutral,
}

impl SentimentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentClass::Bullish => "bullish",
            SentimentClass::Bearish => "bearish",
            SentimentClass::Neutral => "neutral",
        }
    }
}

/// Sentiment snapshot polled by an external collaborator; the evaluator only
/// reads it.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize, Serialize, Constructor)]
pub struct SentimentSignal {
    pub direction: SentimentClass,
    pub score: f64,
}

/// Condition payload for one alert kind.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub enum AlertKind {
    Price {
        target: Decimal,
        condition: PriceCondition,
    },
    Signal {
        timeframe: SmolStr,
        target: SignalType,
    },
    Sentiment {
        target: SentimentClass,
    },
}

/// A user-defined alert. `last_triggered_at` enforces the per-alert cooldown.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct Alert {
    pub id: SmolStr,
    pub symbol: SmolStr,
    pub kind: AlertKind,
    pub enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(id: impl Into<SmolStr>, symbol: impl Into<SmolStr>, kind: AlertKind) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            kind,
            enabled: true,
            last_triggered_at: None,
        }
    }
}

/// Notification emitted when an alert fires. Sound and UI handling are the
/// caller's responsibility.
#[derive(Clone, PartialEq, Debug)]
pub struct AlertNotification {
    pub alert: Alert,
    pub current_price: Decimal,
    pub message: String,
}

#[derive(Clone, Debug)]
struct TickSnapshot {
    price: Decimal,
    recommendations: HashMap<SmolStr, SignalType>,
    sentiment: SentimentClass,
}

/// Stateful evaluator holding the previous-tick snapshot.
///
/// Mutated only by its single owning consumption path; wrap in its own lock
/// if shared across tasks.
#[derive(Clone, Debug)]
pub struct AlertEvaluator {
    cooldown: TimeDelta,
    previous: Option<TickSnapshot>,
}

impl Default for AlertEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            previous: None,
        }
    }

    /// Override the refractory period (policy, not protocol). Rejects
    /// durations outside the representable range.
    pub fn with_cooldown(cooldown: std::time::Duration) -> Result<Self, StreamError> {
        let cooldown = TimeDelta::from_std(cooldown).map_err(|error| {
            StreamError::Configuration(format!("invalid alert cooldown: {error}"))
        })?;
        Ok(Self {
            cooldown,
            previous: None,
        })
    }

    /// Run one evaluation pass for the given symbol's tick.
    pub fn evaluate(
        &mut self,
        alerts: &mut [Alert],
        current_price: Decimal,
        symbol: &str,
        recommendations: &HashMap<SmolStr, SignalType>,
        sentiment: &SentimentSignal,
    ) -> Vec<AlertNotification> {
        self.evaluate_at(
            Utc::now(),
            alerts,
            current_price,
            symbol,
            recommendations,
            sentiment,
        )
    }

    /// Evaluation pass with an explicit clock.
    pub fn evaluate_at(
        &mut self,
        now: DateTime<Utc>,
        alerts: &mut [Alert],
        current_price: Decimal,
        symbol: &str,
        recommendations: &HashMap<SmolStr, SignalType>,
        sentiment: &SentimentSignal,
    ) -> Vec<AlertNotification> {
        let current = TickSnapshot {
            price: current_price,
            recommendations: recommendations.clone(),
            sentiment: sentiment.direction,
        };

        // First tick: nothing to diff against, seed and stay silent
        let Some(previous) = self.previous.replace(current.clone()) else {
            return Vec::new();
        };

        let mut notifications = Vec::new();

        for alert in alerts.iter_mut() {
            if !alert.enabled || alert.symbol != symbol {
                continue;
            }

            if let Some(last) = alert.last_triggered_at {
                if now - last < self.cooldown {
                    continue;
                }
            }

            let message = match &alert.kind {
                AlertKind::Price { target, condition } => {
                    let crossed = match condition {
                        PriceCondition::Above => {
                            previous.price < *target && current.price >= *target
                        }
                        PriceCondition::Below => {
                            previous.price > *target && current.price <= *target
                        }
                    };
                    crossed.then(|| {
                        format!(
                            "{} crossed {} {} (now {})",
                            alert.symbol,
                            condition.as_str(),
                            target,
                            current.price
                        )
                    })
                }
                AlertKind::Signal { timeframe, target } => {
                    let was = previous.recommendations.get(timeframe);
                    let is = current.recommendations.get(timeframe);
                    (is == Some(target) && was != Some(target)).then(|| {
                        format!(
                            "{} {} signal turned {}",
                            alert.symbol,
                            timeframe,
                            target.as_str()
                        )
                    })
                }
                AlertKind::Sentiment { target } => (current.sentiment == *target
                    && previous.sentiment != *target)
                    .then(|| format!("{} sentiment turned {}", alert.symbol, target.as_str())),
            };

            if let Some(message) = message {
                debug!(alert = %alert.id, %message, "alert triggered");
                alert.last_triggered_at = Some(now);
                notifications.push(AlertNotification {
                    alert: alert.clone(),
                    current_price: current.price,
                    message,
                });
            }
        }

        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn no_signals() -> HashMap<SmolStr, SignalType> {
        HashMap::new()
    }

    fn neutral_sentiment() -> SentimentSignal {
        SentimentSignal {
            direction: SentimentClass::Neutral,
            score: 0.0,
        }
    }

    fn price_alert(target: Decimal, condition: PriceCondition) -> Alert {
        Alert::new(
            "alert-1",
            "BTCUSDT",
            AlertKind::Price { target, condition },
        )
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    fn tick(
        evaluator: &mut AlertEvaluator,
        alerts: &mut [Alert],
        now: DateTime<Utc>,
        price: Decimal,
    ) -> Vec<AlertNotification> {
        evaluator.evaluate_at(
            now,
            alerts,
            price,
            "BTCUSDT",
            &no_signals(),
            &neutral_sentiment(),
        )
    }

    #[test]
    fn test_first_tick_seeds_without_firing() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![price_alert(dec!(50000), PriceCondition::Above)];

        // Price already above target on the very first tick: no prior state,
        // no transition, no notification
        let fired = tick(&mut evaluator, &mut alerts, at(0), dec!(50010));
        assert!(fired.is_empty());
    }

    #[test]
    fn test_upward_cross_fires_once_then_stays_silent() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![price_alert(dec!(50000), PriceCondition::Above)];

        assert!(tick(&mut evaluator, &mut alerts, at(0), dec!(49990)).is_empty());

        let fired = tick(&mut evaluator, &mut alerts, at(1), dec!(50010));
        assert_eq!(fired.len(), 1);
        assert!(fired[0].message.contains("50010"));
        assert!(fired[0].message.contains("50000"));
        assert_eq!(fired[0].current_price, dec!(50010));

        // Remaining above target on 10 subsequent ticks fires nothing
        for index in 0..10 {
            let price = dec!(50020) + Decimal::from(index);
            assert!(tick(&mut evaluator, &mut alerts, at(2 + index), price).is_empty());
        }
    }

    #[test]
    fn test_requalifying_cross_respects_cooldown() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![price_alert(dec!(50000), PriceCondition::Above)];

        tick(&mut evaluator, &mut alerts, at(0), dec!(49990));
        assert_eq!(tick(&mut evaluator, &mut alerts, at(1), dec!(50010)).len(), 1);

        // Cross back down and up again inside the cooldown window: suppressed
        tick(&mut evaluator, &mut alerts, at(60), dec!(49000));
        assert!(tick(&mut evaluator, &mut alerts, at(61), dec!(50010)).is_empty());

        // Same re-qualifying transition after cooldown expiry: fires again
        tick(&mut evaluator, &mut alerts, at(400), dec!(49000));
        let fired = tick(&mut evaluator, &mut alerts, at(401), dec!(50010));
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_below_condition_crosses_downward() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![price_alert(dec!(50000), PriceCondition::Below)];

        tick(&mut evaluator, &mut alerts, at(0), dec!(50010));
        let fired = tick(&mut evaluator, &mut alerts, at(1), dec!(50000));
        assert_eq!(fired.len(), 1);
        assert!(fired[0].message.contains("below"));

        assert!(tick(&mut evaluator, &mut alerts, at(2), dec!(49000)).is_empty());
    }

    #[test]
    fn test_disabled_alerts_are_skipped() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![price_alert(dec!(50000), PriceCondition::Above)];
        alerts[0].enabled = false;

        tick(&mut evaluator, &mut alerts, at(0), dec!(49990));
        assert!(tick(&mut evaluator, &mut alerts, at(1), dec!(50010)).is_empty());
    }

    #[test]
    fn test_other_symbol_alerts_are_skipped() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![Alert::new(
            "alert-eth",
            "ETHUSDT",
            AlertKind::Price {
                target: dec!(50000),
                condition: PriceCondition::Above,
            },
        )];

        tick(&mut evaluator, &mut alerts, at(0), dec!(49990));
        assert!(tick(&mut evaluator, &mut alerts, at(1), dec!(50010)).is_empty());
    }

    #[test]
    fn test_signal_transition_fires_on_becoming_target() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![Alert::new(
            "signal-1",
            "BTCUSDT",
            AlertKind::Signal {
                timeframe: "1h".into(),
                target: SignalType::Buy,
            },
        )];

        let mut hold: HashMap<SmolStr, SignalType> = HashMap::new();
        hold.insert("1h".into(), SignalType::Neutral);
        let mut buy: HashMap<SmolStr, SignalType> = HashMap::new();
        buy.insert("1h".into(), SignalType::Buy);

        let sentiment = neutral_sentiment();
        evaluator.evaluate_at(at(0), &mut alerts, dec!(100), "BTCUSDT", &hold, &sentiment);

        let fired =
            evaluator.evaluate_at(at(1), &mut alerts, dec!(100), "BTCUSDT", &buy, &sentiment);
        assert_eq!(fired.len(), 1);
        assert!(fired[0].message.contains("buy"));

        // Still buy on the next tick: no transition, no fire
        let fired =
            evaluator.evaluate_at(at(2), &mut alerts, dec!(100), "BTCUSDT", &buy, &sentiment);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_sentiment_transition_fires_on_becoming_target() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![Alert::new(
            "sent-1",
            "BTCUSDT",
            AlertKind::Sentiment {
                target: SentimentClass::Bullish,
            },
        )];

        let neutral = neutral_sentiment();
        let bullish = SentimentSignal {
            direction: SentimentClass::Bullish,
            score: 0.8,
        };

        let signals = no_signals();
        evaluator.evaluate_at(at(0), &mut alerts, dec!(100), "BTCUSDT", &signals, &neutral);

        let fired =
            evaluator.evaluate_at(at(1), &mut alerts, dec!(100), "BTCUSDT", &signals, &bullish);
        assert_eq!(fired.len(), 1);
        assert!(fired[0].message.contains("bullish"));

        let fired =
            evaluator.evaluate_at(at(2), &mut alerts, dec!(100), "BTCUSDT", &signals, &bullish);
        assert!(fired.is_empty());
    }

    #[test]
    fn test_with_cooldown_validates_range() {
        let mut evaluator =
            AlertEvaluator::with_cooldown(std::time::Duration::from_secs(60)).unwrap();
        let mut alerts = vec![price_alert(dec!(50000), PriceCondition::Above)];

        tick(&mut evaluator, &mut alerts, at(0), dec!(49990));
        assert_eq!(tick(&mut evaluator, &mut alerts, at(1), dec!(50010)).len(), 1);

        // Re-qualifying transition after the shortened cooldown fires again
        tick(&mut evaluator, &mut alerts, at(70), dec!(49000));
        assert_eq!(tick(&mut evaluator, &mut alerts, at(71), dec!(50010)).len(), 1);

        // Out-of-range duration is rejected, not silently replaced
        assert!(matches!(
            AlertEvaluator::with_cooldown(std::time::Duration::MAX),
            Err(StreamError::Configuration(_))
        ));
    }

    #[test]
    fn test_cooldown_is_tracked_per_alert() {
        let mut evaluator = AlertEvaluator::new();
        let mut alerts = vec![
            price_alert(dec!(50000), PriceCondition::Above),
            Alert::new(
                "alert-2",
                "BTCUSDT",
                AlertKind::Price {
                    target: dec!(50005),
                    condition: PriceCondition::Above,
                },
            ),
        ];

        tick(&mut evaluator, &mut alerts, at(0), dec!(49990));

        // First alert fires at 50001; the second's boundary is not yet crossed
        let fired = tick(&mut evaluator, &mut alerts, at(1), dec!(50001));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].alert.id, "alert-1");

        // Second alert fires on its own crossing, unaffected by the first's
        // cooldown
        let fired = tick(&mut evaluator, &mut alerts, at(2), dec!(50006));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].alert.id, "alert-2");
    }
}

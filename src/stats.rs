//! Rolling statistics over a filtered liquidation stream.
//!
//! One aggregator instance per subscription; no process-wide state. Events
//! are filtered by symbol prefix against the configured set, appended to a
//! bounded FIFO, and folded into running per-side totals.

use crate::event::{LiquidationEvent, PositionSide};
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::VecDeque;

/// Default bound on the `recent` FIFO.
pub const DEFAULT_RECENT_CAPACITY: usize = 100;

/// Point-in-time snapshot handed to consumers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RollingStats {
    pub total_long_usd: Decimal,
    pub total_short_usd: Decimal,
    pub count: u64,
    pub largest: Option<LiquidationEvent>,
    pub recent: Vec<LiquidationEvent>,
}

/// Bounded-memory aggregator over classified liquidation events.
#[derive(Clone, Debug)]
pub struct LiquidationAggregator {
    symbols: Vec<SmolStr>,
    capacity: usize,
    total_long_usd: Decimal,
    total_short_usd: Decimal,
    count: u64,
    largest: Option<LiquidationEvent>,
    recent: VecDeque<LiquidationEvent>,
}

impl LiquidationAggregator {
    /// Build an aggregator tracking the given symbol prefixes (normalised to
    /// uppercase, matched case-insensitively).
    pub fn new(symbols: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self::with_capacity(symbols, DEFAULT_RECENT_CAPACITY)
    }

    pub fn with_capacity(
        symbols: impl IntoIterator<Item = impl AsRef<str>>,
        capacity: usize,
    ) -> Self {
        Self {
            symbols: normalise_symbols(symbols),
            capacity,
            total_long_usd: Decimal::ZERO,
            total_short_usd: Decimal::ZERO,
            count: 0,
            largest: None,
            recent: VecDeque::with_capacity(capacity),
        }
    }

    /// Fold one event into the statistics.
    ///
    /// Returns `false` when the event's symbol does not match the tracked
    /// set and was ignored.
    pub fn apply(&mut self, event: &LiquidationEvent) -> bool {
        if !self.tracks(&event.symbol) {
            return false;
        }

        if self.recent.len() >= self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(event.clone());

        self.count += 1;
        match event.side {
            PositionSide::Long => self.total_long_usd += event.usd_value,
            PositionSide::Short => self.total_short_usd += event.usd_value,
        }

        // Strictly greater: an equal usd_value keeps the earlier event
        let replace = self
            .largest
            .as_ref()
            .map_or(true, |current| event.usd_value > current.usd_value);
        if replace {
            self.largest = Some(event.clone());
        }

        true
    }

    /// Zero all totals and clear the FIFO. Used when the consumer changes its
    /// tracked symbol set, to avoid stale cross-symbol totals.
    pub fn reset(&mut self) {
        self.total_long_usd = Decimal::ZERO;
        self.total_short_usd = Decimal::ZERO;
        self.count = 0;
        self.largest = None;
        self.recent.clear();
    }

    /// Replace the tracked symbol set. Resets all statistics.
    pub fn set_symbols(&mut self, symbols: impl IntoIterator<Item = impl AsRef<str>>) {
        self.symbols = normalise_symbols(symbols);
        self.reset();
    }

    pub fn stats(&self) -> RollingStats {
        RollingStats {
            total_long_usd: self.total_long_usd,
            total_short_usd: self.total_short_usd,
            count: self.count,
            largest: self.largest.clone(),
            recent: self.recent.iter().cloned().collect(),
        }
    }

    pub fn recent(&self) -> Vec<LiquidationEvent> {
        self.recent.iter().cloned().collect()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn tracks(&self, symbol: &str) -> bool {
        let symbol = symbol.to_ascii_uppercase();
        self.symbols
            .iter()
            .any(|prefix| symbol.starts_with(prefix.as_str()))
    }
}

fn normalise_symbols(symbols: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<SmolStr> {
    symbols
        .into_iter()
        .map(|symbol| SmolStr::new(symbol.as_ref().trim().to_ascii_uppercase()))
        .filter(|symbol| !symbol.is_empty())
        .collect()
}

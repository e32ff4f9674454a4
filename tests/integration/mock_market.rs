//! Mock market-data source for integration testing.
//!
//! Provides a deterministic `MarketDataSource` whose prices are scripted
//! per symbol and whose failures can be switched on and off from test code.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use trend_scanner::data::MarketDataSource;
use trend_scanner::types::ScanError;

/// A scripted market. Cloning shares the underlying state, so a test can
/// keep one clone for control after boxing another into the scanner.
#[derive(Clone, Default)]
pub struct MockMarket {
    /// Queued prices per symbol; the last one repeats once the queue drains.
    prices: Arc<Mutex<HashMap<String, VecDeque<f64>>>>,
    closes: Arc<Mutex<HashMap<String, Vec<f64>>>>,
    /// Symbols whose fetches currently fail.
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    /// When set, the next price fetch parks on it.
    gate: Arc<Mutex<Option<FetchGate>>>,
}

/// Holds one price fetch open until released.
#[derive(Clone, Default)]
pub struct FetchGate {
    /// Notified once the gated fetch is in flight.
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl MockMarket {
    /// Flat closes at 100 for every symbol, so MA30 = 100.
    pub const FLAT_CLOSE: f64 = 100.0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Queue prices for `symbol`, one per fetch.
    pub fn script(&self, symbol: &str, prices: &[f64]) {
        self.prices
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .extend(prices.iter().copied());
    }

    pub fn set_closes(&self, symbol: &str, closes: Vec<f64>) {
        self.closes.lock().unwrap().insert(symbol.to_string(), closes);
    }

    /// Make every fetch for `symbol` fail until [`clear_error`](Self::clear_error).
    pub fn set_error(&self, symbol: &str) {
        self.failing.lock().unwrap().insert(symbol.to_string());
    }

    pub fn clear_error(&self, symbol: &str) {
        self.failing.lock().unwrap().remove(symbol);
    }

    /// Park the next price fetch until the returned gate is released.
    pub fn gate_next_fetch(&self) -> FetchGate {
        let gate = FetchGate::default();
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Symbols whose price was requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn fetch_fair_price(&self, symbol: &str) -> Result<f64, ScanError> {
        self.calls.lock().unwrap().push(symbol.to_string());

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.failing.lock().unwrap().contains(symbol) {
            return Err(ScanError::Http {
                status: 503,
                body: "service unavailable".into(),
            });
        }

        let mut prices = self.prices.lock().unwrap();
        let queue = prices.entry(symbol.to_string()).or_default();
        let price = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(price.unwrap_or(Self::FLAT_CLOSE))
    }

    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        min_count: usize,
    ) -> Result<Vec<f64>, ScanError> {
        let closes = self
            .closes
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| vec![Self::FLAT_CLOSE; min_count]);

        if closes.len() < min_count {
            return Err(ScanError::InsufficientHistory {
                symbol: symbol.to_string(),
                have: closes.len(),
                need: min_count,
            });
        }
        Ok(closes)
    }
}

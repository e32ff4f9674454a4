//! Round-robin scan scheduler.
//!
//! A single cursor walks the configured symbol list, visiting exactly one
//! symbol per tick: broadcast scan progress, fetch price and daily closes,
//! evaluate the trend signal, and, when a turn passes the deduplicator,
//! broadcast an alert. Per-symbol failures become `error` events and never
//! stop the loop.
//!
//! The [`Scanner`] exclusively owns trend state, dedup records, cursor, and
//! scan history. Everything else talks to it through a cloneable
//! [`ScannerHandle`]: configuration and run state are published on `watch`
//! channels and the scanner adopts them only at tick boundaries, so a tick
//! never sees a half-applied configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::broadcaster::{Broadcaster, Subscription};
use super::dedup::AlertDeduplicator;
use super::history::ScanHistory;
use crate::data::MarketDataSource;
use crate::strategy::{evaluate_signal, MIN_HISTORY};
use crate::types::{
    normalize_symbols, AlertEvent, ConfigError, ConfigUpdate, RunSnapshot, ScanConfig, ScanError,
    ScanEvent, Trend, TurnType,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fixed delay between two ticks.
pub const DEFAULT_TICK_DELAY: Duration = Duration::from_millis(450);

/// Wait before re-checking while stopped or with an empty symbol list.
pub const DEFAULT_IDLE_RETRY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy)]
pub struct ScannerOptions {
    pub tick_delay: Duration,
    pub idle_retry: Duration,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            tick_delay: DEFAULT_TICK_DELAY,
            idle_retry: DEFAULT_IDLE_RETRY,
        }
    }
}

/// A published configuration. `epoch` changes only when the symbol list is
/// replaced, which is what forces a trend-state reset.
#[derive(Debug)]
struct ConfigVersion {
    config: ScanConfig,
    epoch: u64,
}

// ---------------------------------------------------------------------------
// Control handle
// ---------------------------------------------------------------------------

/// Cloneable control surface: configuration, start/stop, and subscriptions.
#[derive(Clone)]
pub struct ScannerHandle {
    config_tx: Arc<watch::Sender<Arc<ConfigVersion>>>,
    running_tx: Arc<watch::Sender<bool>>,
    broadcaster: Broadcaster,
}

impl ScannerHandle {
    /// Create a stopped handle. `initial` must already be validated.
    pub fn new(initial: ScanConfig, subscriber_queue: usize) -> Self {
        let config = ScanConfig {
            symbols: normalize_symbols(&initial.symbols),
            settings: initial.settings,
        };
        let (config_tx, _) = watch::channel(Arc::new(ConfigVersion { config, epoch: 0 }));
        let (running_tx, _) = watch::channel(false);

        Self {
            config_tx: Arc::new(config_tx),
            running_tx: Arc::new(running_tx),
            broadcaster: Broadcaster::new(subscriber_queue),
        }
    }

    /// Validate and publish a configuration update.
    ///
    /// Supplying `symbols` replaces the list; the scanner then resets its
    /// cursor and trend state before its next tick. Invalid settings are
    /// rejected and nothing is published.
    pub fn apply_config(&self, update: ConfigUpdate) -> Result<RunSnapshot, ConfigError> {
        let mut outcome = Ok(());

        self.config_tx.send_if_modified(|current| {
            let settings = match &update.settings {
                Some(patch) => match current.config.settings.merged(patch) {
                    Ok(s) => s,
                    Err(e) => {
                        outcome = Err(e);
                        return false;
                    }
                },
                None => current.config.settings.clone(),
            };

            let (symbols, epoch) = match &update.symbols {
                Some(raw) => (normalize_symbols(raw), current.epoch + 1),
                None => (current.config.symbols.clone(), current.epoch),
            };

            *current = Arc::new(ConfigVersion {
                config: ScanConfig { symbols, settings },
                epoch,
            });
            true
        });

        if let Err(e) = outcome {
            warn!(error = %e, "Configuration update rejected");
            return Err(e);
        }

        let snapshot = self.snapshot();
        info!(
            symbols = snapshot.symbols_count,
            list_replaced = update.symbols.is_some(),
            "Configuration updated"
        );
        Ok(snapshot)
    }

    /// Current run state and configuration.
    pub fn snapshot(&self) -> RunSnapshot {
        let version = self.config_tx.borrow();
        RunSnapshot {
            running: *self.running_tx.borrow(),
            symbols_count: version.config.symbols.len(),
            settings: version.config.settings.clone(),
        }
    }

    /// The configured symbol list, in scan order.
    pub fn symbols(&self) -> Vec<String> {
        self.config_tx.borrow().config.symbols.clone()
    }

    /// Start scanning. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let was_running = self.running_tx.send_replace(true);
        if !was_running {
            info!("Scanner started");
        }
        !was_running
    }

    /// Stop scanning at the next tick boundary. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let was_running = self.running_tx.send_replace(false);
        if was_running {
            info!("Scanner stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        *self.running_tx.borrow()
    }

    /// Register a live viewer. Its first event is a `hello` snapshot.
    pub fn subscribe(&self) -> Subscription {
        self.broadcaster.subscribe(ScanEvent::Hello(self.snapshot()))
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Stopped or no symbols; the cursor did not move.
    Idle,
    /// Symbol evaluated; `alert` is set when an alert was broadcast.
    Scanned {
        symbol: String,
        alert: Option<TurnType>,
    },
    /// Fetch or evaluation failed; an `error` event was broadcast.
    Failed { symbol: String, reason: String },
}

/// The scan loop and the state it owns.
pub struct Scanner {
    market: Box<dyn MarketDataSource>,
    options: ScannerOptions,
    broadcaster: Broadcaster,
    config_rx: watch::Receiver<Arc<ConfigVersion>>,
    running_rx: watch::Receiver<bool>,

    config: Arc<ConfigVersion>,
    trends: HashMap<String, Trend>,
    dedup: AlertDeduplicator,
    history: ScanHistory,
    cursor: usize,
}

impl Scanner {
    pub fn new(
        handle: &ScannerHandle,
        market: Box<dyn MarketDataSource>,
        options: ScannerOptions,
    ) -> Self {
        let mut config_rx = handle.config_tx.subscribe();
        let config = Arc::clone(&config_rx.borrow_and_update());
        let history = ScanHistory::new(config.config.settings.scan_history_max);

        Self {
            market,
            options,
            broadcaster: handle.broadcaster.clone(),
            config_rx,
            running_rx: handle.running_tx.subscribe(),
            config,
            trends: HashMap::new(),
            dedup: AlertDeduplicator::default(),
            history,
            cursor: 0,
        }
    }

    /// Replace the deduplicator (e.g. with a different cooldown).
    pub fn with_deduplicator(mut self, dedup: AlertDeduplicator) -> Self {
        self.dedup = dedup;
        self
    }

    // -- Accessors -------------------------------------------------------

    /// Index of the symbol the next tick will visit.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Last known trend for `symbol`, if it has been classified.
    pub fn trend(&self, symbol: &str) -> Option<Trend> {
        self.trends.get(symbol).copied()
    }

    /// Number of symbols with trend state.
    pub fn tracked_symbols(&self) -> usize {
        self.trends.len()
    }

    /// Number of symbols with a live dedup record.
    pub fn tracked_alerts(&self) -> usize {
        self.dedup.len()
    }

    pub fn history(&self) -> &[String] {
        self.history.entries()
    }

    // -- Loop ------------------------------------------------------------

    /// Run forever: one tick, then the fixed delay. Parks while stopped.
    ///
    /// Returns only once every [`ScannerHandle`] has been dropped.
    pub async fn run(mut self) {
        info!(
            tick_delay_ms = self.options.tick_delay.as_millis() as u64,
            "Scanner loop running"
        );

        loop {
            match self.tick().await {
                TickOutcome::Idle => {
                    if !self.wait_idle().await {
                        info!("Scanner handles dropped, loop exiting");
                        return;
                    }
                }
                _ => tokio::time::sleep(self.options.tick_delay).await,
            }
        }
    }

    /// Wait for a start signal or the idle retry period.
    /// Returns `false` when the control side is gone.
    async fn wait_idle(&mut self) -> bool {
        tokio::select! {
            changed = self.running_rx.changed() => changed.is_ok(),
            _ = tokio::time::sleep(self.options.idle_retry) => true,
        }
    }

    /// Perform exactly one tick.
    pub async fn tick(&mut self) -> TickOutcome {
        self.adopt_latest_config();

        let len = self.config.config.symbols.len();
        if !*self.running_rx.borrow() || len == 0 {
            return TickOutcome::Idle;
        }

        let position = self.cursor % len;
        let symbol = self.config.config.symbols[position].clone();
        self.cursor = (position + 1) % len;

        self.history.push(symbol.clone());
        self.broadcaster.broadcast(ScanEvent::Scan {
            sym: symbol.clone(),
            scanning_batch: self.visible_window(position),
            scan_history: self.history.entries().to_vec(),
        });
        debug!(symbol = %symbol, position, "Scanning");

        match self.evaluate(&symbol).await {
            Ok(alert) => TickOutcome::Scanned { symbol, alert },
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Scan failed");
                let reason = e.to_string();
                self.broadcaster.broadcast(ScanEvent::Error {
                    sym: symbol.clone(),
                    message: reason.clone(),
                });
                TickOutcome::Failed { symbol, reason }
            }
        }
    }

    /// Switch to the newest published configuration, if any.
    fn adopt_latest_config(&mut self) {
        if !self.config_rx.has_changed().unwrap_or(false) {
            return;
        }

        let next = Arc::clone(&self.config_rx.borrow_and_update());
        if next.epoch != self.config.epoch {
            debug!(
                cleared = self.trends.len(),
                symbols = next.config.symbols.len(),
                "Symbol list replaced, resetting trend state"
            );
            self.trends.clear();
            self.cursor = 0;
            let pruned = self.dedup.prune_expired();
            debug!(pruned, "Expired alert records dropped");
        }
        self.history
            .set_capacity(next.config.settings.scan_history_max);
        self.config = next;
    }

    /// Fixed-size slice of the symbol list starting at `position`, wrapping.
    fn visible_window(&self, position: usize) -> Vec<String> {
        let symbols = &self.config.config.symbols;
        let n = self.config.config.settings.scan_show_batch.min(symbols.len());
        (0..n)
            .map(|i| symbols[(position + i) % symbols.len()].clone())
            .collect()
    }

    /// Fetch, classify, and maybe alert. Trend state is only written after
    /// every fallible step has succeeded.
    async fn evaluate(&mut self, symbol: &str) -> Result<Option<TurnType>, ScanError> {
        let config = Arc::clone(&self.config);
        let settings = &config.config.settings;

        let price = self.market.fetch_fair_price(symbol).await?;
        let closes = self.market.fetch_daily_closes(symbol, MIN_HISTORY).await?;

        let previous = self.trends.get(symbol).copied();
        let signal = evaluate_signal(symbol, price, &closes, previous, settings)?;
        self.trends.insert(symbol.to_string(), signal.trend);

        let Some(turn) = signal.turn else {
            return Ok(None);
        };

        if !signal.passes_rsi_filter(settings) {
            debug!(symbol, turn = %turn, rsi14 = ?signal.rsi14, "Alert filtered by RSI");
            return Ok(None);
        }

        if self.dedup.should_suppress(symbol, turn) {
            debug!(symbol, turn = %turn, "Alert suppressed by cooldown");
            return Ok(None);
        }

        info!(
            symbol,
            turn = %turn,
            dir = signal.direction(),
            price,
            ma30 = signal.ma30,
            dev_pct = signal.dev_pct,
            "Trend turn alert"
        );

        self.broadcaster.broadcast(ScanEvent::Alert(AlertEvent {
            turn,
            sym: symbol.to_string(),
            dir: signal.direction().to_string(),
            price,
            ma30: signal.ma30,
            rsi14: signal.rsi14,
            dev_pct: signal.dev_pct,
            ttl_ms: turn.display_ttl().as_millis() as u64,
        }));

        Ok(Some(turn))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

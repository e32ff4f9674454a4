//! Shared types for the trend scanner.
//!
//! These types form the data model used across all modules: trend labels,
//! scan settings, the events pushed to viewers, and the error taxonomy.
//! Strategy, engine, and dashboard modules depend on this file only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Trend labels
// ---------------------------------------------------------------------------

/// Trend label of a symbol relative to its MA30 band.
///
/// "Never classified" is modelled as `Option<Trend>::None` at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Neutral,
    Up,
    Down,
}

impl Trend {
    /// Whether `self` and `other` are the strictly opposite UP/DOWN pair.
    pub fn is_opposite(&self, other: Trend) -> bool {
        matches!(
            (self, other),
            (Trend::Up, Trend::Down) | (Trend::Down, Trend::Up)
        )
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Neutral => write!(f, "NEUTRAL"),
            Trend::Up => write!(f, "UP"),
            Trend::Down => write!(f, "DOWN"),
        }
    }
}

/// Kind of trend turn worth alerting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TurnType {
    /// Price approaching the reversal boundary.
    Near,
    /// Completed UP↔DOWN reversal.
    Confirm,
}

impl TurnType {
    /// How long a viewer keeps this alert on screen.
    pub fn display_ttl(&self) -> Duration {
        match self {
            TurnType::Near => Duration::from_secs(3 * 60),
            TurnType::Confirm => Duration::from_secs(5 * 60),
        }
    }
}

impl fmt::Display for TurnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnType::Near => write!(f, "NEAR"),
            TurnType::Confirm => write!(f, "CONFIRM"),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Tunable scan settings.
///
/// Deserialised from `config.toml` using snake_case keys (missing keys take
/// their defaults) and serialised to viewers in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all(serialize = "camelCase"))]
pub struct ScanSettings {
    /// Half-width of the neutral band around MA30, in percent.
    pub trend_band_pct: f64,
    /// Distance to the reversal boundary that counts as NEAR, in percent.
    pub near_pct: f64,
    /// Size of the "currently scanning" window sent with each scan event.
    pub scan_show_batch: usize,
    /// Scan history is cleared once it grows past this many entries.
    pub scan_history_max: usize,
    pub max_active_near: usize,
    pub max_active_confirm: usize,
    /// Drop alerts whose RSI disagrees with the trend direction.
    pub rsi_filter: bool,
    pub rsi_threshold: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            trend_band_pct: 0.3,
            near_pct: 0.15,
            scan_show_batch: 100,
            scan_history_max: 1000,
            max_active_near: 200,
            max_active_confirm: 200,
            rsi_filter: false,
            rsi_threshold: 50.0,
        }
    }
}

impl ScanSettings {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.trend_band_pct.is_finite()
            || self.trend_band_pct <= 0.0
            || self.trend_band_pct >= 100.0
        {
            return Err(ConfigError::invalid(
                "trendBandPct",
                "must be a number in (0, 100)",
            ));
        }
        if !self.near_pct.is_finite() || self.near_pct < 0.0 {
            return Err(ConfigError::invalid("nearPct", "must be a non-negative number"));
        }
        if !self.rsi_threshold.is_finite() || !(0.0..=100.0).contains(&self.rsi_threshold) {
            return Err(ConfigError::invalid("rsiThreshold", "must be in [0, 100]"));
        }

        let counts = [
            ("scanShowBatch", self.scan_show_batch),
            ("scanHistoryMax", self.scan_history_max),
            ("maxActiveNear", self.max_active_near),
            ("maxActiveConfirm", self.max_active_confirm),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be at least 1"));
            }
        }

        Ok(())
    }

    /// Merge a partial update over these settings and validate the result.
    pub fn merged(&self, patch: &SettingsPatch) -> Result<ScanSettings, ConfigError> {
        let merged = ScanSettings {
            trend_band_pct: patch.trend_band_pct.unwrap_or(self.trend_band_pct),
            near_pct: patch.near_pct.unwrap_or(self.near_pct),
            scan_show_batch: patch.scan_show_batch.unwrap_or(self.scan_show_batch),
            scan_history_max: patch.scan_history_max.unwrap_or(self.scan_history_max),
            max_active_near: patch.max_active_near.unwrap_or(self.max_active_near),
            max_active_confirm: patch.max_active_confirm.unwrap_or(self.max_active_confirm),
            rsi_filter: patch.rsi_filter.unwrap_or(self.rsi_filter),
            rsi_threshold: patch.rsi_threshold.unwrap_or(self.rsi_threshold),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// Partial settings update as sent by the control API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub trend_band_pct: Option<f64>,
    pub near_pct: Option<f64>,
    pub scan_show_batch: Option<usize>,
    pub scan_history_max: Option<usize>,
    pub max_active_near: Option<usize>,
    pub max_active_confirm: Option<usize>,
    pub rsi_filter: Option<bool>,
    pub rsi_threshold: Option<f64>,
}

/// Body of a configuration replacement request.
///
/// Supplying `symbols` replaces the scan list and resets all trend state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub settings: Option<SettingsPatch>,
}

/// The complete scan configuration: ordered symbol list plus settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanConfig {
    pub symbols: Vec<String>,
    pub settings: ScanSettings,
}

/// Upper-case, trim, drop empties and duplicates, keeping first-seen order.
pub fn normalize_symbols<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Viewer events
// ---------------------------------------------------------------------------

/// Run state and configuration as reported to viewers and the control API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub running: bool,
    pub symbols_count: usize,
    pub settings: ScanSettings,
}

/// A trend-turn alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub turn: TurnType,
    pub sym: String,
    pub dir: String,
    pub price: f64,
    pub ma30: f64,
    /// `None` when there was not enough history for RSI14.
    pub rsi14: Option<f64>,
    pub dev_pct: f64,
    pub ttl_ms: u64,
}

/// Event pushed to live viewers. Serialised as one JSON object tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ScanEvent {
    Hello(RunSnapshot),
    #[serde(rename_all = "camelCase")]
    Scan {
        sym: String,
        scanning_batch: Vec<String>,
        scan_history: Vec<String>,
    },
    Alert(AlertEvent),
    Error { sym: String, message: String },
}

impl ScanEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::Hello(_) => "hello",
            ScanEvent::Scan { .. } => "scan",
            ScanEvent::Alert(_) => "alert",
            ScanEvent::Error { .. } => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Per-symbol fetch or compute failure. Never fatal to the scanner.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("HTTP {status} {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("fairPrice invalid for {symbol}")]
    InvalidPrice { symbol: String },

    #[error("not enough candles for {symbol}: have {have}, need {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },
}

/// Rejected configuration. Raised before anything reaches the scanner.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: &str) -> Self {
        ConfigError::InvalidSetting {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

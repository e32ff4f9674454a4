//! Signal evaluation.
//!
//! Combines the indicator calculator, trend classifier, and turn detector
//! into one pure function over explicit state: price, daily closes, and the
//! symbol's previous trend go in, a `Signal` comes out. The caller owns the
//! trend state and decides what to do with the result.

pub mod indicators;
pub mod trend;

use tracing::debug;

use crate::types::{ScanError, ScanSettings, Trend, TurnType};
use indicators::{moving_average, rsi, MA_PERIOD, RSI_PERIOD};
use trend::{classify_trend, detect_turn, direction_label, Band};

/// Minimum number of daily closes required before a symbol can be evaluated:
/// MA30 plus one extra close so RSI14 is always available.
pub const MIN_HISTORY: usize = MA_PERIOD + 1;

/// Result of evaluating one symbol on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub previous: Option<Trend>,
    pub trend: Trend,
    pub turn: Option<TurnType>,
    pub price: f64,
    pub ma30: f64,
    pub rsi14: Option<f64>,
    /// Signed deviation of price from MA30, in percent.
    pub dev_pct: f64,
    pub band: Band,
}

impl Signal {
    /// Direction label for alerts.
    pub fn direction(&self) -> &'static str {
        direction_label(self.previous, self.trend)
    }

    /// Whether RSI agrees with the trend direction.
    ///
    /// Always true when the filter is off or RSI is unavailable.
    pub fn passes_rsi_filter(&self, settings: &ScanSettings) -> bool {
        if !settings.rsi_filter {
            return true;
        }
        match (self.trend, self.rsi14) {
            (Trend::Up, Some(r)) => r >= settings.rsi_threshold,
            (Trend::Down, Some(r)) => r <= settings.rsi_threshold,
            _ => true,
        }
    }
}

/// Evaluate a symbol's trend and turn from its latest price and closes.
///
/// Fails with `InsufficientHistory` when fewer than [`MIN_HISTORY`] closes
/// are supplied; the caller must then leave the previous trend untouched.
pub fn evaluate_signal(
    symbol: &str,
    price: f64,
    closes: &[f64],
    previous: Option<Trend>,
    settings: &ScanSettings,
) -> Result<Signal, ScanError> {
    if closes.len() < MIN_HISTORY {
        return Err(ScanError::InsufficientHistory {
            symbol: symbol.to_string(),
            have: closes.len(),
            need: MIN_HISTORY,
        });
    }

    let ma30 = moving_average(closes, MA_PERIOD);
    let rsi14 = rsi(closes, RSI_PERIOD);
    let band = Band::around(ma30, settings.trend_band_pct);
    let trend = classify_trend(price, &band, previous);
    let turn = detect_turn(price, &band, previous, trend, settings.near_pct);
    let dev_pct = (price - ma30) / ma30 * 100.0;

    debug!(
        symbol,
        price,
        ma30,
        rsi14 = ?rsi14,
        previous = ?previous,
        trend = %trend,
        turn = ?turn,
        "Signal evaluated"
    );

    Ok(Signal {
        previous,
        trend,
        turn,
        price,
        ma30,
        rsi14,
        dev_pct,
        band,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

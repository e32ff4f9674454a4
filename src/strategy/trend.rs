//! Trend classification and turn detection around the MA30 band.
//!
//! The trend is a three-state machine {NEUTRAL, UP, DOWN}. Inside the band
//! the previous label holds (hysteresis); crossing an edge moves to UP or
//! DOWN. A turn is reported when the label flips UP↔DOWN (CONFIRM) or when
//! price sits close to the edge it would have to cross to flip (NEAR).

use crate::types::{Trend, TurnType};

/// Neutral zone around the moving average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    /// Band of `±band_pct` percent around `ma`.
    pub fn around(ma: f64, band_pct: f64) -> Self {
        Self {
            lower: ma * (1.0 - band_pct / 100.0),
            upper: ma * (1.0 + band_pct / 100.0),
        }
    }

    /// Boundary-inclusive membership test.
    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// Classify the current trend given the previous label (`None` = never classified).
pub fn classify_trend(price: f64, band: &Band, previous: Option<Trend>) -> Trend {
    let held = previous.unwrap_or(Trend::Neutral);
    if band.contains(price) {
        held
    } else if price > band.upper {
        Trend::Up
    } else if price < band.lower {
        Trend::Down
    } else {
        held
    }
}

/// Percentage distance from `price` to `boundary`, scaled by `price`.
///
/// Scaling by price rather than by the boundary is what NEAR thresholds
/// are calibrated against.
pub fn distance_pct(price: f64, boundary: f64) -> f64 {
    (price - boundary).abs() / price * 100.0
}

/// Detect a turn between the previous and current trend.
///
/// CONFIRM takes priority over NEAR. `None` means nothing to report.
pub fn detect_turn(
    price: f64,
    band: &Band,
    previous: Option<Trend>,
    current: Trend,
    near_pct: f64,
) -> Option<TurnType> {
    if let Some(prev) = previous {
        if prev.is_opposite(current) {
            return Some(TurnType::Confirm);
        }
    }

    let distance = match previous {
        Some(Trend::Up) => distance_pct(price, band.lower),
        Some(Trend::Down) => distance_pct(price, band.upper),
        Some(Trend::Neutral) | None => {
            distance_pct(price, band.lower).min(distance_pct(price, band.upper))
        }
    };

    (distance <= near_pct).then_some(TurnType::Near)
}

/// Human-readable direction for an alert.
pub fn direction_label(previous: Option<Trend>, current: Trend) -> &'static str {
    match (previous, current) {
        (Some(Trend::Up), Trend::Down) => "UP→DOWN",
        (Some(Trend::Down), Trend::Up) => "DOWN→UP",
        (_, Trend::Up) => "UP",
        (_, Trend::Down) => "DOWN",
        (_, Trend::Neutral) => "NEUTRAL",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

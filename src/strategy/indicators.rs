//! Price indicators over daily closes.
//!
//! Pure functions over an ordered slice of closing prices (oldest first).

/// Moving-average period used for the trend band.
pub const MA_PERIOD: usize = 30;

/// RSI period.
pub const RSI_PERIOD: usize = 14;

/// Simple moving average of the last `period` closes.
///
/// # Panics
///
/// Panics if `period` is zero or `closes` holds fewer than `period` values.
/// Callers check history length first.
pub fn moving_average(closes: &[f64], period: usize) -> f64 {
    assert!(period > 0, "moving average period must be > 0");
    let window = &closes[closes.len() - period..];
    window.iter().sum::<f64>() / period as f64
}

/// Relative strength index over the last `period + 1` closes.
///
/// Uses plain averages of gains and losses over the window (no Wilder
/// smoothing). A window with no losses is maximal strength (`100`).
/// Returns `None` when fewer than `period + 1` closes are given.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - (period + 1)..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(g, l), diff| {
            if diff >= 0.0 {
                (g + diff, l)
            } else {
                (g, l - diff)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

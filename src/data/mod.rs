//! Market-data providers.
//!
//! Defines the `MarketDataSource` trait consumed by the scanner and the
//! MEXC futures implementation used in production.

pub mod mexc;

use async_trait::async_trait;

use crate::types::ScanError;

/// Abstraction over an upstream price source.
///
/// Both calls are per symbol. Failures are reported as [`ScanError`] and
/// are never fatal to the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current fair price. Fails unless the upstream returns a finite number.
    async fn fetch_fair_price(&self, symbol: &str) -> Result<f64, ScanError>;

    /// Recent daily closes, oldest first. Fails with
    /// [`ScanError::InsufficientHistory`] if fewer than `min_count` are available.
    async fn fetch_daily_closes(&self, symbol: &str, min_count: usize)
        -> Result<Vec<f64>, ScanError>;
}

//! Provider boundary for daily price history.
//!
//! This module defines **only** the close type, request type, error type and
//! the provider trait. Fetching, caching and source failover live outside the
//! core; the risk gate only ever sees a `&dyn PriceHistoryProvider`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Daily close
// ---------------------------------------------------------------------------

/// One daily close as supplied by the upstream history source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: f64,
}

impl DailyClose {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Inclusive date window for one symbol's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why a history lookup produced no data.
///
/// Every variant is a DataUnavailable condition from the gate's point of view:
/// it degrades the affected pair to "no correlation", never to a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// The upstream source has no history for this symbol.
    UnknownSymbol(String),
    /// A response payload could not be decoded.
    Decode(String),
    /// Fewer usable closes than the caller needs.
    InsufficientHistory { symbol: String, have: usize, need: usize },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::UnknownSymbol(sym) => write!(f, "no history for symbol '{sym}'"),
            ProviderError::Decode(msg) => write!(f, "decode error: {msg}"),
            ProviderError::InsufficientHistory { symbol, have, need } => {
                write!(f, "insufficient history for '{symbol}': have {have}, need {need}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Upstream daily price-history contract.
///
/// Object-safe and `Send + Sync` so the gate can hold an
/// `Arc<dyn PriceHistoryProvider>` next to the audit handle. The call is
/// synchronous: correlation lookups run inside the strictly sequential gate
/// phase.
pub trait PriceHistoryProvider: Send + Sync {
    /// Human-readable source name (e.g. `"nse-eod"`), used in warnings.
    fn name(&self) -> &'static str;

    /// Daily closes for `req.symbol` within `[req.start, req.end]`.
    ///
    /// Order is not guaranteed; duplicate dates may occur. Callers normalize
    /// through [`crate::ReturnSeries::from_closes`].
    fn daily_closes(&self, req: &HistoryRequest) -> Result<Vec<DailyClose>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProvider {
        closes: Vec<DailyClose>,
    }

    impl PriceHistoryProvider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn daily_closes(&self, req: &HistoryRequest) -> Result<Vec<DailyClose>, ProviderError> {
            if req.symbol == "MISSING" {
                return Err(ProviderError::UnknownSymbol(req.symbol.clone()));
            }
            Ok(self
                .closes
                .iter()
                .copied()
                .filter(|c| c.date >= req.start && c.date <= req.end)
                .collect())
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[test]
    fn mock_provider_respects_window() {
        let provider: Box<dyn PriceHistoryProvider> = Box::new(MockProvider {
            closes: vec![
                DailyClose::new(d(1), 10.0),
                DailyClose::new(d(2), 11.0),
                DailyClose::new(d(3), 12.0),
            ],
        });

        let req = HistoryRequest {
            symbol: "INFY".to_string(),
            start: d(2),
            end: d(3),
        };
        let out = provider.daily_closes(&req).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].date, d(2));
    }

    #[test]
    fn unknown_symbol_is_an_error_not_empty() {
        let provider = MockProvider { closes: vec![] };
        let req = HistoryRequest {
            symbol: "MISSING".to_string(),
            start: d(1),
            end: d(3),
        };
        let err = provider.daily_closes(&req).unwrap_err();
        assert_eq!(err.to_string(), "no history for symbol 'MISSING'");
    }

    #[test]
    fn insufficient_history_display() {
        let err = ProviderError::InsufficientHistory {
            symbol: "TCS".to_string(),
            have: 12,
            need: 21,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history for 'TCS': have 12, need 21"
        );
    }
}

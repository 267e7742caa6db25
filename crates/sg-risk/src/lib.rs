//! sg-risk
//!
//! Sequential risk gate for scored trade candidates.
//!
//! Goals:
//! - Candidate validation (stop distance, risk/reward, stop width)
//! - Regime-aware daily loss kill switch and weekly loss kill switch
//! - Consecutive-loss circuit breaker
//! - Sector/direction concentration, correlation, sector exposure and
//!   capital concentration gates
//! - Regime- and drawdown-scaled position sizing
//!
//! Every decision is written to the audit log before it is returned.

pub mod correlation;
mod engine;
mod types;

pub use correlation::{CorrelationCache, CorrelationConfig, CorrelationLookup};
pub use engine::RiskGate;
pub use types::*;

//! sg-portfolio: constraints
//!
//! Pre-trade checks that look only at portfolio state plus the proposed
//! position. Pure functions; the risk gate decides the order they run in and
//! turns a violation into a reason code.
//!
//!   - Sector/direction concentration (count of same-side positions per sector)
//!   - Sector exposure (open value + proposed value vs a share of capital)
//!   - Capital concentration (top-N share of total risk)

use crate::PortfolioState;
use sg_schemas::Direction;

// ─── ConstraintViolation ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum ConstraintViolation {
    /// Too many open positions already share this sector and direction.
    SectorDirectionConcentration {
        sector: String,
        direction: Direction,
        open: usize,
        limit: usize,
    },
    /// Open sector value plus the proposed value exceeds the sector cap.
    SectorExposureExceeded {
        sector: String,
        exposure: f64,
        limit: f64,
    },
    /// The top-N risk amounts would hold too large a share of total risk.
    CapitalConcentrationExceeded {
        top_n: usize,
        share_pct: f64,
        limit_pct: f64,
    },
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SectorDirectionConcentration {
                sector,
                direction,
                open,
                limit,
            } => {
                write!(f, "{open} open {sector} {direction} positions (max {limit})")
            }
            Self::SectorExposureExceeded {
                sector,
                exposure,
                limit,
            } => {
                write!(
                    f,
                    "sector '{sector}' exposure {exposure:.2} exceeds limit {limit:.2}"
                )
            }
            Self::CapitalConcentrationExceeded {
                top_n,
                share_pct,
                limit_pct,
            } => {
                write!(
                    f,
                    "top {top_n} positions = {share_pct:.1}% of total risk (max {limit_pct:.1}%)"
                )
            }
        }
    }
}

// ─── Sector / direction ───────────────────────────────────────────────────────

pub fn check_sector_direction(
    state: &PortfolioState,
    sector: &str,
    direction: Direction,
    max_same: usize,
) -> Result<(), ConstraintViolation> {
    let open = state.positions_in(sector, direction);
    if open >= max_same {
        return Err(ConstraintViolation::SectorDirectionConcentration {
            sector: sector.to_string(),
            direction,
            open,
            limit: max_same,
        });
    }
    Ok(())
}

// ─── Sector exposure ──────────────────────────────────────────────────────────

/// `max_pct` is a percentage of `state.capital` (30.0 means 30%).
pub fn check_sector_exposure(
    state: &PortfolioState,
    sector: &str,
    proposed_value: f64,
    max_pct: f64,
) -> Result<(), ConstraintViolation> {
    let exposure = state.sector_value(sector) + proposed_value;
    let limit = state.capital * max_pct / 100.0;
    if exposure > limit {
        return Err(ConstraintViolation::SectorExposureExceeded {
            sector: sector.to_string(),
            exposure,
            limit,
        });
    }
    Ok(())
}

// ─── Capital concentration ────────────────────────────────────────────────────

/// Share (in percent) of `risks` held by its `top_n` largest entries.
/// `None` when the total is not positive.
pub fn top_n_share_pct(risks: &[f64], top_n: usize) -> Option<f64> {
    let total: f64 = risks.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let mut sorted = risks.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let top: f64 = sorted.iter().take(top_n).sum();
    Some(top / total * 100.0)
}

/// Hypothetical risk set = every open position's risk amount plus
/// `proposed_risk`. The check is skipped while that set has fewer than
/// `min_positions` entries: with `top_n` or fewer entries the share is 100%
/// by construction.
pub fn check_capital_concentration(
    state: &PortfolioState,
    proposed_risk: f64,
    top_n: usize,
    max_pct: f64,
    min_positions: usize,
) -> Result<(), ConstraintViolation> {
    let mut risks: Vec<f64> = state.open_positions.iter().map(|p| p.risk_amount).collect();
    risks.push(proposed_risk);

    if risks.len() < min_positions.max(top_n + 1) {
        return Ok(());
    }

    match top_n_share_pct(&risks, top_n) {
        Some(share_pct) if share_pct > max_pct => {
            Err(ConstraintViolation::CapitalConcentrationExceeded {
                top_n,
                share_pct,
                limit_pct: max_pct,
            })
        }
        _ => Ok(()),
    }
}

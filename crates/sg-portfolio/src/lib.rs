//! sg-portfolio
//!
//! Portfolio state owned by the risk gate:
//! - R-multiple P&L counters (daily / weekly) and the consecutive-loss streak
//! - open positions with sector, direction, value and risk amount
//! - capital base, peak and current equity (drawdown is always derived)
//! - sticky daily / weekly halt flags
//! - checkpoint / rollback so a cancelled scan can undo its provisional adds
//!
//! Pure state, no IO. Persistence across restarts is the embedder's job; the
//! state is `Serialize`/`Deserialize` for that purpose.

pub mod constraints;
mod types;

pub use constraints::{
    check_capital_concentration, check_sector_direction, check_sector_exposure, top_n_share_pct,
    ConstraintViolation,
};
pub use types::{Checkpoint, OpenPosition, PortfolioConfig, PortfolioState};

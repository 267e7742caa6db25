use crate::correlation::{CorrelationCache, CorrelationConfig, CorrelationLookup};
use crate::{
    drawdown_multiplier, GateStatus, PositionSize, ReasonCode, RegimeTransitionAction, RiskConfig,
    RiskDecision,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use sg_audit::{event_types, AuditLog};
use sg_md::PriceHistoryProvider;
use sg_portfolio::{
    check_capital_concentration, check_sector_direction, check_sector_exposure, Checkpoint,
    OpenPosition, PortfolioState,
};
use sg_schemas::{Candidate, Direction, RegimeKind, RegimeSnapshot};
use std::sync::Arc;

type Blocked = (ReasonCode, String);

/// Stateful, strictly sequential risk gate.
///
/// Owns the portfolio state and the correlation cache; `evaluate` takes
/// `&mut self`, so two scans can never interleave against the same state.
pub struct RiskGate {
    cfg: RiskConfig,
    state: PortfolioState,
    correlation: CorrelationCache,
    provider: Arc<dyn PriceHistoryProvider>,
    audit: Arc<AuditLog>,
}

impl std::fmt::Debug for RiskGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskGate")
            .field("cfg", &self.cfg)
            .field("state", &self.state)
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl RiskGate {
    pub fn new(
        cfg: RiskConfig,
        state: PortfolioState,
        correlation: CorrelationConfig,
        provider: Arc<dyn PriceHistoryProvider>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            cfg,
            state,
            correlation: CorrelationCache::new(correlation),
            provider,
            audit,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.cfg
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    // -----------------------------------------------------------------------
    // Sizing
    // -----------------------------------------------------------------------

    /// Daily loss limit (R) for the current regime.
    pub fn daily_loss_limit_r(&self) -> f64 {
        self.cfg.daily_limits.get(self.state.current_regime)
    }

    pub fn regime_multiplier(&self) -> f64 {
        self.cfg.regime_multipliers.get(self.state.current_regime)
    }

    pub fn drawdown_multiplier(&self) -> f64 {
        drawdown_multiplier(self.state.drawdown_pct())
    }

    /// capital × base% × regime × drawdown, then whole shares over the stop
    /// distance. Callers validate the stop distance first.
    pub fn position_size(&self, c: &Candidate) -> PositionSize {
        let regime_multiplier = self.regime_multiplier();
        let drawdown_multiplier = self.drawdown_multiplier();
        let risk_amount = self.state.capital * self.cfg.base_per_trade_risk_pct / 100.0
            * regime_multiplier
            * drawdown_multiplier;

        let distance = c.stop_distance();
        let shares = if distance > 0.0 && risk_amount > 0.0 {
            // Saturating float->int cast; distance > 0 keeps this finite.
            (risk_amount / distance).floor() as u64
        } else {
            0
        };

        PositionSize {
            risk_amount,
            regime_multiplier,
            drawdown_multiplier,
            shares,
            position_value: shares as f64 * c.entry_price,
        }
    }

    // -----------------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------------

    /// Evaluate one candidate. `as_of` anchors the correlation window.
    ///
    /// ALLOW adds the candidate to the open positions; BLOCK leaves state
    /// untouched apart from the sticky daily / weekly halt flags. The decision
    /// is audited before it is returned.
    pub fn evaluate(&mut self, c: &Candidate, as_of: NaiveDate) -> RiskDecision {
        let decision = match self.check(c, as_of) {
            Ok(size) => {
                self.state.add_position(OpenPosition {
                    symbol: c.symbol.clone(),
                    sector: c.sector.clone(),
                    direction: c.direction,
                    position_value: size.position_value,
                    risk_amount: size.risk_amount,
                });
                self.state.record_daily_risk(self.risk_pct(&size));
                tracing::info!(
                    symbol = c.symbol.as_str(),
                    shares = size.shares,
                    position_value = size.position_value,
                    "candidate approved"
                );
                RiskDecision::Allow { size }
            }
            Err((reason, detail)) => {
                tracing::warn!(
                    symbol = c.symbol.as_str(),
                    reason = reason.as_str(),
                    detail = detail.as_str(),
                    "candidate blocked"
                );
                RiskDecision::Block { reason, detail }
            }
        };

        self.audit_decision(c, &decision);
        decision
    }

    fn check(&mut self, c: &Candidate, as_of: NaiveDate) -> Result<PositionSize, Blocked> {
        self.validate(c)?;
        let size = self.position_size(c);

        // 1) Daily loss kill switch (regime aware, sticky).
        let daily_limit = self.daily_loss_limit_r();
        if self.state.daily_halted || self.state.daily_pnl_r < -daily_limit {
            self.state.daily_halted = true;
            return Err((
                ReasonCode::DailyLossLimit,
                format!(
                    "daily loss {:.2}R below -{daily_limit}R [{}]",
                    self.state.daily_pnl_r, self.state.current_regime
                ),
            ));
        }

        // 2) Weekly loss kill switch (sticky).
        if self.state.weekly_halted || self.state.weekly_pnl_r < -self.cfg.weekly_loss_limit_r {
            self.state.weekly_halted = true;
            return Err((
                ReasonCode::WeeklyLossLimit,
                format!(
                    "weekly loss {:.2}R below -{}R",
                    self.state.weekly_pnl_r, self.cfg.weekly_loss_limit_r
                ),
            ));
        }

        // 3) Circuit breaker.
        if self.circuit_breaker_active() {
            return Err((
                ReasonCode::CircuitBreaker,
                format!(
                    "{} consecutive losses (limit {})",
                    self.state.consecutive_losses, self.cfg.consecutive_loss_limit
                ),
            ));
        }

        // 4) Sector + direction concentration.
        check_sector_direction(
            &self.state,
            &c.sector,
            c.direction,
            self.cfg.max_same_sector_direction,
        )
        .map_err(|v| (ReasonCode::SectorDirectionConcentration, v.to_string()))?;

        // 5) Correlation with open symbols (fails open without data).
        let open = self.state.open_symbols();
        match self
            .correlation
            .lookup(self.provider.as_ref(), &c.symbol, &open, as_of)
        {
            CorrelationLookup::Computed {
                max_abs, symbol, ..
            } if max_abs > self.cfg.correlation_threshold => {
                return Err((
                    ReasonCode::Correlation,
                    format!(
                        "correlation {max_abs:.2} with {symbol} above {}",
                        self.cfg.correlation_threshold
                    ),
                ));
            }
            CorrelationLookup::NoData if !open.is_empty() => {
                tracing::info!(
                    symbol = c.symbol.as_str(),
                    "no correlation data; correlation gate passed open"
                );
            }
            _ => {}
        }

        // 6) Sector exposure, using the computed value (suggested value when
        //    sizing rounds to zero shares).
        let estimated_value = if size.shares > 0 {
            size.position_value
        } else {
            c.suggested_position_value
        };
        check_sector_exposure(
            &self.state,
            &c.sector,
            estimated_value,
            self.cfg.max_sector_exposure_pct,
        )
        .map_err(|v| (ReasonCode::SectorExposure, v.to_string()))?;

        // 7) Capital concentration of the hypothetical risk set.
        let cc = &self.cfg.capital_concentration;
        check_capital_concentration(
            &self.state,
            size.risk_amount,
            cc.top_n,
            cc.max_pct,
            cc.min_positions,
        )
        .map_err(|v| (ReasonCode::CapitalConcentration, v.to_string()))?;

        // 8) Max open positions.
        let open_count = self.state.open_positions.len();
        if open_count >= self.cfg.max_open_positions {
            return Err((
                ReasonCode::MaxOpenPositions,
                format!(
                    "{open_count} open positions (max {})",
                    self.cfg.max_open_positions
                ),
            ));
        }

        // 9) Daily risk budget.
        let used = self.state.daily_risk_used_pct;
        let trade_pct = self.risk_pct(&size);
        if used + trade_pct > self.cfg.max_daily_risk_pct {
            return Err((
                ReasonCode::DailyRiskCap,
                format!(
                    "daily risk {used:.2}% + {trade_pct:.2}% above {}%",
                    self.cfg.max_daily_risk_pct
                ),
            ));
        }

        if size.shares == 0 {
            return Err((
                ReasonCode::ZeroPositionSize,
                format!(
                    "risk amount {:.2} buys no shares at stop distance {:.4}",
                    size.risk_amount,
                    c.stop_distance()
                ),
            ));
        }

        Ok(size)
    }

    fn validate(&self, c: &Candidate) -> Result<(), Blocked> {
        let numbers = [
            c.score,
            c.confidence,
            c.risk_reward_ratio,
            c.entry_price,
            c.stop_loss,
            c.suggested_position_value,
        ];
        if numbers.iter().any(|v| !v.is_finite()) {
            return Err((
                ReasonCode::InvalidCandidate,
                "non-finite numeric field".to_string(),
            ));
        }
        if c.entry_price <= 0.0 {
            return Err((
                ReasonCode::InvalidCandidate,
                format!("entry price {} must be > 0", c.entry_price),
            ));
        }
        if c.stop_distance() == 0.0 {
            return Err((
                ReasonCode::ZeroStopDistance,
                format!("stop equals entry ({})", c.entry_price),
            ));
        }
        let wrong_side = match c.direction {
            Direction::Buy => c.stop_loss > c.entry_price,
            Direction::Sell => c.stop_loss < c.entry_price,
        };
        if wrong_side {
            return Err((
                ReasonCode::InvalidCandidate,
                format!(
                    "{} stop {} on wrong side of entry {}",
                    c.direction, c.stop_loss, c.entry_price
                ),
            ));
        }
        if c.risk_reward_ratio < self.cfg.min_risk_reward {
            return Err((
                ReasonCode::RiskRewardTooLow,
                format!(
                    "risk/reward {:.2} below {}",
                    c.risk_reward_ratio, self.cfg.min_risk_reward
                ),
            ));
        }
        let sl_pct = c.stop_distance_pct();
        if sl_pct > self.cfg.max_stop_loss_pct {
            return Err((
                ReasonCode::StopTooWide,
                format!("stop {sl_pct:.2}% wider than {}%", self.cfg.max_stop_loss_pct),
            ));
        }
        Ok(())
    }

    /// Risk amount as a percent of the static capital base.
    fn risk_pct(&self, size: &PositionSize) -> f64 {
        if self.state.capital > 0.0 {
            size.risk_amount / self.state.capital * 100.0
        } else {
            0.0
        }
    }

    fn circuit_breaker_active(&self) -> bool {
        self.state.consecutive_losses >= self.cfg.consecutive_loss_limit
    }

    fn audit_decision(&self, c: &Candidate, decision: &RiskDecision) {
        let candidate = serde_json::to_value(c).unwrap_or(Value::Null);
        match decision {
            RiskDecision::Allow { size } => {
                self.audit.log_signal_decision(
                    &c.symbol,
                    "APPROVED",
                    "ALL_RULES_PASSED",
                    json!({
                        "candidate": candidate,
                        "size": size,
                        "regime": self.state.current_regime,
                    }),
                );
            }
            RiskDecision::Block { reason, detail } => {
                self.audit.log_signal_decision(
                    &c.symbol,
                    "REJECTED",
                    reason.as_str(),
                    json!({
                        "candidate": candidate,
                        "detail": detail,
                        "regime": self.state.current_regime,
                    }),
                );
                if reason.is_intervention() {
                    self.audit.log_risk_intervention(
                        reason.as_str(),
                        json!({
                            "symbol": c.symbol,
                            "detail": detail,
                            "status": self.status_value(),
                        }),
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operator surface
    // -----------------------------------------------------------------------

    pub fn status(&self) -> GateStatus {
        let st = &self.state;
        GateStatus {
            daily_pnl_r: st.daily_pnl_r,
            weekly_pnl_r: st.weekly_pnl_r,
            consecutive_losses: st.consecutive_losses,
            daily_loss_limit_r: self.daily_loss_limit_r(),
            weekly_loss_limit_r: self.cfg.weekly_loss_limit_r,
            consecutive_loss_limit: self.cfg.consecutive_loss_limit,
            correlation_threshold: self.cfg.correlation_threshold,
            is_kill_switch_active: st.daily_halted
                || st.weekly_halted
                || st.daily_pnl_r < -self.daily_loss_limit_r()
                || st.weekly_pnl_r < -self.cfg.weekly_loss_limit_r,
            is_circuit_breaker_active: self.circuit_breaker_active(),
            daily_halted: st.daily_halted,
            weekly_halted: st.weekly_halted,
            open_trade_count: st.open_positions.len(),
            daily_risk_used_pct: st.daily_risk_used_pct,
            max_daily_risk_pct: self.cfg.max_daily_risk_pct,
            current_regime: st.current_regime,
            prev_regime: st.prev_regime,
            regime_multiplier: self.regime_multiplier(),
            drawdown_pct: st.drawdown_pct(),
            drawdown_multiplier: self.drawdown_multiplier(),
            current_capital: st.current_capital,
            peak_capital: st.peak_capital,
            sector_concentration: st.sector_concentration(),
            correlation_cache_entries: self.correlation.len(),
        }
    }

    fn status_value(&self) -> Value {
        serde_json::to_value(self.status()).unwrap_or(Value::Null)
    }

    /// Manual circuit-breaker reset after review.
    pub fn reset_circuit_breaker(&mut self, actor: &str) {
        let previous = self.state.consecutive_losses;
        self.state.consecutive_losses = 0;
        tracing::info!(actor, previous, "circuit breaker reset");
        self.audit.log_event(
            event_types::CIRCUIT_BREAKER_RESET,
            json!({
                "actor": actor,
                "previous_consecutive_losses": previous,
            }),
        );
    }

    /// Start-of-day reset: daily P&L, the daily halt and the risk budget.
    pub fn reset_daily(&mut self) {
        let previous = json!({
            "daily_pnl_r": self.state.daily_pnl_r,
            "daily_halted": self.state.daily_halted,
            "daily_risk_used_pct": self.state.daily_risk_used_pct,
        });
        self.state.reset_daily();
        self.audit.log_event(
            event_types::COUNTER_RESET,
            json!({"scope": "DAILY", "previous": previous}),
        );
    }

    /// Start-of-week reset: weekly P&L, the weekly halt and the loss streak.
    pub fn reset_weekly(&mut self) {
        let previous = json!({
            "weekly_pnl_r": self.state.weekly_pnl_r,
            "weekly_halted": self.state.weekly_halted,
            "consecutive_losses": self.state.consecutive_losses,
        });
        self.state.reset_weekly();
        self.audit.log_event(
            event_types::COUNTER_RESET,
            json!({"scope": "WEEKLY", "previous": previous}),
        );
    }

    pub fn record_trade_result(&mut self, pnl_r: f64) {
        self.state.record_trade_result(pnl_r);
    }

    pub fn update_equity(&mut self, pnl_amount: f64) {
        self.state.update_equity(pnl_amount);
    }

    /// Audit a fill for a previously approved candidate.
    pub fn confirm_entry(&self, symbol: &str, entry_price: f64, quantity: u64, signal_id: &str) {
        self.audit.log_trade_entry(
            symbol,
            entry_price,
            quantity,
            entry_price * quantity as f64,
            signal_id,
        );
    }

    /// Close an open position: removes it, records the R result and the
    /// equity change, and audits the exit.
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: f64,
        pnl_r: f64,
        pnl_amount: f64,
        exit_reason: &str,
    ) -> Vec<OpenPosition> {
        let removed = self.state.remove_position(symbol);
        if removed.is_empty() {
            tracing::warn!(symbol, "close_position: no open position");
        }
        self.state.record_trade_result(pnl_r);
        self.state.update_equity(pnl_amount);
        self.audit
            .log_trade_exit(symbol, exit_price, pnl_amount, exit_reason);
        removed
    }

    /// Lock a new regime. Returns the action required for open positions,
    /// if the transition calls for one.
    pub fn apply_regime(&mut self, snapshot: &RegimeSnapshot) -> Option<RegimeTransitionAction> {
        self.set_regime(snapshot.kind(), &snapshot.regime_label)
    }

    fn set_regime(&mut self, next: RegimeKind, label: &str) -> Option<RegimeTransitionAction> {
        let prev = self.state.current_regime;
        self.state.prev_regime = prev;
        self.state.current_regime = next;

        let action = RegimeTransitionAction::for_transition(prev, next);
        if prev != next {
            if let Some(a) = action {
                tracing::warn!(from = %prev, to = %next, action = a.as_str(), "regime transition");
            }
            self.audit.log_event(
                event_types::REGIME_TRANSITION,
                json!({
                    "from": prev,
                    "to": next,
                    "label": label,
                    "action": action.map(|a| a.as_str()),
                }),
            );
        }
        action
    }

    pub fn clear_correlation_cache(&mut self) {
        self.correlation.clear();
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.state.checkpoint()
    }

    /// Undo provisional adds made after `cp`.
    pub fn rollback(&mut self, cp: Checkpoint) -> Vec<OpenPosition> {
        self.state.rollback(cp)
    }
}

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::constraints::{ConstraintCheck, Severity};
use super::domain::{ParcelId, Strategy};
use super::feasibility::ScenarioOutcome;
use super::scoring::{Recommendation, ScoredSite, StrategyAlternative};

#[derive(Debug, Clone, Serialize)]
pub struct SiteSummaryRow {
    pub rank: usize,
    pub parcel_id: ParcelId,
    pub address: String,
    pub strategy: Strategy,
    pub strategy_label: &'static str,
    pub recommendation: Recommendation,
    pub recommendation_label: &'static str,
    pub constraint_status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub rank_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annualized_roe_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_per_unit: Option<Decimal>,
    pub flags: Vec<String>,
    /// One line per other strategy compared for this parcel.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckDetailView {
    pub key: String,
    pub name: String,
    pub outcome: &'static str,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioView {
    pub holding_months: u32,
    pub profit: Decimal,
    pub margin_pct: f64,
    pub return_on_equity_pct: f64,
    pub annualized_roe_pct: f64,
    pub finance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finance_to_profit: Option<Decimal>,
    pub holding_risk: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteDetailView {
    pub summary: SiteSummaryRow,
    pub checks: Vec<CheckDetailView>,
    pub scenarios: Vec<ScenarioView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<StrategyAlternative>,
}

impl SiteSummaryRow {
    pub fn from_site(rank: usize, site: &ScoredSite) -> Self {
        let best = site.best().map(|outcome| &outcome.result);
        Self {
            rank,
            parcel_id: site.parcel.id.clone(),
            address: site.parcel.address.clone(),
            strategy: site.strategy,
            strategy_label: site.strategy.label(),
            recommendation: site.recommendation,
            recommendation_label: site.recommendation.label(),
            constraint_status: site.verdict.status.label(),
            reason: site.verdict.reason.clone(),
            rank_score: site.rank_score,
            holding_months: best.map(|result| result.holding_months),
            margin_pct: best.map(|result| percent(result.margin)),
            profit: best.map(|result| result.profit.round_dp(0)),
            annualized_roe_pct: best.map(|result| result.annualized_roe * 100.0),
            value_per_unit: site
                .valuation
                .as_ref()
                .map(|valuation| valuation.value_per_unit.round_dp(0)),
            flags: site.flags.iter().map(|flag| flag.summary()).collect(),
            alternatives: site.alternatives.iter().map(alternative_line).collect(),
        }
    }
}

impl From<&ConstraintCheck> for CheckDetailView {
    fn from(check: &ConstraintCheck) -> Self {
        Self {
            key: check.key.clone(),
            name: check.name.clone(),
            outcome: check.outcome.label(),
            severity: check.severity,
            measured: check.measured.as_ref().map(|value| value.display()),
            threshold: check.threshold.as_ref().map(|value| value.display()),
            note: check.note.clone(),
        }
    }
}

impl From<&ScenarioOutcome> for ScenarioView {
    fn from(outcome: &ScenarioOutcome) -> Self {
        let result = &outcome.result;
        Self {
            holding_months: result.holding_months,
            profit: result.profit.round_dp(0),
            margin_pct: percent(result.margin),
            return_on_equity_pct: percent(result.return_on_equity),
            annualized_roe_pct: result.annualized_roe * 100.0,
            finance: result.costs.finance.round_dp(0),
            finance_to_profit: outcome.finance_to_profit.map(|ratio| ratio.round_dp(4)),
            holding_risk: outcome.holding_risk,
        }
    }
}

impl SiteDetailView {
    pub fn from_site(rank: usize, site: &ScoredSite) -> Self {
        Self {
            summary: SiteSummaryRow::from_site(rank, site),
            checks: site.verdict.checks.iter().map(CheckDetailView::from).collect(),
            scenarios: site.scenarios.iter().map(ScenarioView::from).collect(),
            alternatives: site.alternatives.clone(),
        }
    }
}

/// Numbers rows from 1 in the order given.
pub fn summary_rows(sites: &[ScoredSite]) -> Vec<SiteSummaryRow> {
    sites
        .iter()
        .enumerate()
        .map(|(index, site)| SiteSummaryRow::from_site(index + 1, site))
        .collect()
}

fn alternative_line(alternative: &StrategyAlternative) -> String {
    match (&alternative.reason, alternative.margin) {
        (Some(reason), _) => format!(
            "{} {}: rejected on {reason}",
            alternative.strategy.label(),
            alternative.recommendation.label()
        ),
        (None, Some(margin)) => format!(
            "{} {}: margin {:.1}%",
            alternative.strategy.label(),
            alternative.recommendation.label(),
            percent(margin)
        ),
        (None, None) => format!(
            "{} {}",
            alternative.strategy.label(),
            alternative.recommendation.label()
        ),
    }
}

fn percent(value: Decimal) -> f64 {
    (value * Decimal::ONE_HUNDRED)
        .round_dp(2)
        .to_f64()
        .unwrap_or_default()
}

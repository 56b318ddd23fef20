use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::config::ScoringConfig;
use super::constraints::ConstraintVerdict;
use super::domain::{Parcel, Strategy};
use super::feasibility::{FeasibilityResult, ScenarioOutcome};
use super::flags::ScreeningFlag;
use super::lot_yield::LotYield;
use super::market::AdjustedValuation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Go,
    Marginal,
    NoGo,
}

impl Recommendation {
    pub const fn ordered() -> [Self; 3] {
        [Self::Go, Self::Marginal, Self::NoGo]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Go => "GO",
            Self::Marginal => "MARGINAL",
            Self::NoGo => "NO_GO",
        }
    }

    const fn priority(self) -> u8 {
        match self {
            Self::Go => 0,
            Self::Marginal => 1,
            Self::NoGo => 2,
        }
    }
}

/// Everything gathered about a parcel before it is scored.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteAssessment {
    pub parcel: Parcel,
    pub strategy: Strategy,
    pub verdict: ConstraintVerdict,
    pub lot_yield: Option<LotYield>,
    pub valuation: Option<AdjustedValuation>,
    pub scenarios: Vec<ScenarioOutcome>,
    pub flags: Vec<ScreeningFlag>,
}

/// Final screening record for one parcel and strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSite {
    pub parcel: Parcel,
    pub strategy: Strategy,
    pub recommendation: Recommendation,
    pub rank_score: f64,
    pub verdict: ConstraintVerdict,
    pub lot_yield: Option<LotYield>,
    pub valuation: Option<AdjustedValuation>,
    pub scenarios: Vec<ScenarioOutcome>,
    /// Index into `scenarios` of the highest ranked holding period.
    pub best_scenario: Option<usize>,
    pub flags: Vec<ScreeningFlag>,
    /// Other strategies screened for the same parcel when the strategy was not fixed.
    #[serde(default)]
    pub alternatives: Vec<StrategyAlternative>,
}

impl ScoredSite {
    pub fn best(&self) -> Option<&ScenarioOutcome> {
        self.best_scenario
            .and_then(|index| self.scenarios.get(index))
    }

    /// Why the site landed where it did, in one line.
    pub fn rationale(&self) -> String {
        if let Some(reason) = &self.verdict.reason {
            return format!("rejected: {reason}");
        }
        match self.best() {
            Some(best) => format!(
                "margin {:.1}% profit {} annualised ROE {:.1}% over {} months",
                best.result.margin.to_f64().unwrap_or_default() * 100.0,
                best.result.profit.round_dp(0),
                best.result.annualized_roe * 100.0,
                best.result.holding_months
            ),
            None => "no feasibility result".to_string(),
        }
    }
}

/// How a parcel fared under a strategy that was screened but not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAlternative {
    pub strategy: Strategy,
    pub recommendation: Recommendation,
    pub rank_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Decimal>,
}

impl From<&ScoredSite> for StrategyAlternative {
    fn from(site: &ScoredSite) -> Self {
        let best = site.best();
        Self {
            strategy: site.strategy,
            recommendation: site.recommendation,
            rank_score: site.rank_score,
            reason: site.verdict.reason.clone(),
            profit: best.map(|outcome| outcome.result.profit),
            margin: best.map(|outcome| outcome.result.margin),
        }
    }
}

/// Turns a verdict plus scenario results into a recommendation and rank score.
#[derive(Debug, Clone)]
pub struct ScoreAggregator {
    config: ScoringConfig,
}

impl ScoreAggregator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn score(&self, assessment: SiteAssessment) -> ScoredSite {
        let SiteAssessment {
            parcel,
            strategy,
            verdict,
            lot_yield,
            valuation,
            scenarios,
            flags,
        } = assessment;

        if verdict.is_rejected() {
            return ScoredSite {
                parcel,
                strategy,
                recommendation: Recommendation::NoGo,
                rank_score: 0.0,
                verdict,
                lot_yield,
                valuation,
                scenarios,
                best_scenario: None,
                flags,
                alternatives: Vec::new(),
            };
        }

        let best_scenario = self.best_scenario(&scenarios);

        let (recommendation, rank_score) = match best_scenario {
            Some((index, score)) => (
                self.recommend(&verdict, &scenarios[index].result),
                score,
            ),
            None => (Recommendation::NoGo, 0.0),
        };

        ScoredSite {
            parcel,
            strategy,
            recommendation,
            rank_score,
            verdict,
            lot_yield,
            valuation,
            scenarios,
            best_scenario: best_scenario.map(|(index, _)| index),
            flags,
            alternatives: Vec::new(),
        }
    }

    /// Index and rank score of the highest scoring scenario. Ties keep the earlier period.
    pub fn best_scenario(&self, scenarios: &[ScenarioOutcome]) -> Option<(usize, f64)> {
        scenarios
            .iter()
            .enumerate()
            .map(|(index, outcome)| (index, self.rank_score(&outcome.result)))
            .fold(None, |best: Option<(usize, f64)>, (index, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((index, score)),
            })
    }

    /// Weighted blend of margin, scaled profit and annualised ROE.
    pub fn rank_score(&self, result: &FeasibilityResult) -> f64 {
        let margin = result.margin.to_f64().unwrap_or_default();
        let scaled_profit = result
            .profit
            .checked_div(self.config.profit_scale)
            .and_then(|value| value.to_f64())
            .unwrap_or_default();

        self.config.margin_weight * margin
            + self.config.profit_weight * scaled_profit
            + self.config.roe_weight * result.annualized_roe
    }

    /// GO needs every floor met on a clean verdict. MARGINAL covers the margin band
    /// between the two margin floors, any flagged physical risk, and a GO held back
    /// by unknown checks. Everything else is NO_GO.
    fn recommend(&self, verdict: &ConstraintVerdict, best: &FeasibilityResult) -> Recommendation {
        let clears_go = best.margin >= self.config.go_min_margin
            && best.profit >= self.config.go_min_profit
            && best.annualized_roe >= self.config.go_min_annualized_roe;
        let in_marginal_band = best.margin >= self.config.marginal_min_margin
            && best.margin < self.config.go_min_margin;
        let physical_risk = verdict.physical_risk();

        if clears_go && !physical_risk && !verdict.has_unknowns() {
            Recommendation::Go
        } else if clears_go || in_marginal_band || physical_risk {
            Recommendation::Marginal
        } else {
            Recommendation::NoGo
        }
    }
}

/// Orders sites by recommendation then rank score, keeping at most `top_n`.
pub fn rank_sites(mut sites: Vec<ScoredSite>, top_n: usize) -> Vec<ScoredSite> {
    sites.sort_by(|a, b| {
        a.recommendation
            .priority()
            .cmp(&b.recommendation.priority())
            .then_with(|| {
                b.rank_score
                    .partial_cmp(&a.rank_score)
                    .unwrap_or(Ordering::Equal)
            })
    });
    sites.truncate(top_n);
    sites
}

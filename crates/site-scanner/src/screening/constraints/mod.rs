mod rules;

pub use rules::{rule_keys, ConstraintRegistry, ConstraintRule, RuleContext, RuleFinding};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::ConstraintConfig;
use super::domain::{Parcel, Strategy};
use super::layers::LayerResults;
use super::lot_yield::LotYield;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintCategory {
    Hazard,
    Planning,
    Physical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    HardBlock,
    Advisory,
}

/// Quick-kill rules are cheap and run for every parcel; deep-dive rules only run for survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    QuickKill,
    DeepDive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Unknown,
}

impl CheckOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Measured or threshold value attached to a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Measurement {
    Metres(f64),
    SquareMetres(f64),
    Percent(f64),
    Ratio(f64),
    Lots(u32),
    Flag(bool),
    Codes(Vec<String>),
}

impl Measurement {
    pub fn display(&self) -> String {
        match self {
            Self::Metres(value) => format!("{value:.0} m"),
            Self::SquareMetres(value) => format!("{value:.0} sqm"),
            Self::Percent(value) => format!("{value:.1}%"),
            Self::Ratio(value) => format!("{value:.2}"),
            Self::Lots(value) => format!("{value} lot(s)"),
            Self::Flag(value) => value.to_string(),
            Self::Codes(codes) if codes.is_empty() => "none".to_string(),
            Self::Codes(codes) => codes.join(", "),
        }
    }
}

/// Result of a single rule against one parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintCheck {
    pub key: String,
    pub name: String,
    pub category: ConstraintCategory,
    pub tier: Tier,
    pub severity: Severity,
    pub outcome: CheckOutcome,
    pub measured: Option<Measurement>,
    pub threshold: Option<Measurement>,
    pub note: String,
}

impl ConstraintCheck {
    pub fn is_hard_block_failure(&self) -> bool {
        self.severity == Severity::HardBlock && self.outcome == CheckOutcome::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Pass,
    Flag,
    Reject,
}

impl VerdictStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Flag => "FLAG",
            Self::Reject => "REJECT",
        }
    }
}

/// Aggregated checks for one parcel and strategy. Checks appear in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintVerdict {
    pub status: VerdictStatus,
    /// Name of the first hard-block failure, present only for rejections.
    pub reason: Option<String>,
    pub checks: Vec<ConstraintCheck>,
    pub deep_dive_evaluated: bool,
}

impl ConstraintVerdict {
    pub fn is_rejected(&self) -> bool {
        self.status == VerdictStatus::Reject
    }

    pub fn check(&self, key: &str) -> Option<&ConstraintCheck> {
        self.checks.iter().find(|check| check.key == key)
    }

    pub fn unknown_checks(&self) -> impl Iterator<Item = &ConstraintCheck> + '_ {
        self.checks
            .iter()
            .filter(|check| check.outcome == CheckOutcome::Unknown)
    }

    pub fn has_unknowns(&self) -> bool {
        self.unknown_checks().next().is_some()
    }

    /// Physical findings such as slope, frontage or shape that did not pass cleanly.
    pub fn physical_risk(&self) -> bool {
        self.checks.iter().any(|check| {
            check.category == ConstraintCategory::Physical && check.outcome == CheckOutcome::Fail
        })
    }
}

/// Runs the rule registry against a parcel. Holds no per-parcel state.
#[derive(Debug, Clone)]
pub struct ConstraintEvaluator {
    config: ConstraintConfig,
    registry: ConstraintRegistry,
}

impl ConstraintEvaluator {
    pub fn new(config: ConstraintConfig) -> Self {
        Self::with_registry(config, ConstraintRegistry::standard())
    }

    pub fn with_registry(config: ConstraintConfig, registry: ConstraintRegistry) -> Self {
        Self { config, registry }
    }

    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    /// Evaluates every quick-kill rule, then the deep-dive rules unless a quick-kill hard
    /// block already failed. `lot_yield` is `None` when no schedule covers the parcel's zone.
    pub fn evaluate(
        &self,
        parcel: &Parcel,
        layers: &LayerResults,
        strategy: Strategy,
        lot_yield: Option<&LotYield>,
    ) -> ConstraintVerdict {
        let context = RuleContext {
            parcel,
            layers,
            strategy,
            lot_yield,
            config: &self.config,
        };

        let mut checks: Vec<ConstraintCheck> = self
            .registry
            .tier(Tier::QuickKill)
            .map(|rule| self.run(rule, &context))
            .collect();

        let quick_kill_blocked = checks.iter().any(ConstraintCheck::is_hard_block_failure);
        if !quick_kill_blocked {
            checks.extend(
                self.registry
                    .tier(Tier::DeepDive)
                    .map(|rule| self.run(rule, &context)),
            );
        }

        let reason = checks
            .iter()
            .find(|check| check.is_hard_block_failure())
            .map(|check| check.name.clone());

        let status = if reason.is_some() {
            VerdictStatus::Reject
        } else if checks
            .iter()
            .any(|check| check.outcome != CheckOutcome::Pass)
        {
            VerdictStatus::Flag
        } else {
            VerdictStatus::Pass
        };

        debug!(
            parcel = %parcel.id,
            strategy = strategy.label(),
            status = status.label(),
            checks = checks.len(),
            "constraint evaluation complete"
        );

        ConstraintVerdict {
            status,
            reason,
            checks,
            deep_dive_evaluated: !quick_kill_blocked,
        }
    }

    fn run(&self, rule: &ConstraintRule, context: &RuleContext<'_>) -> ConstraintCheck {
        let finding = (rule.evaluate)(context);
        ConstraintCheck {
            key: rule.key.to_string(),
            name: rule.name.to_string(),
            category: rule.category,
            tier: rule.tier,
            severity: self.config.severity_for(rule.key, rule.default_severity),
            outcome: finding.outcome,
            measured: finding.measured,
            threshold: finding.threshold,
            note: finding.note,
        }
    }
}

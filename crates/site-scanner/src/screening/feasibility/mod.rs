mod sensitivity;
mod stamp_duty;

pub use sensitivity::{HoldingPeriodSweep, ScenarioOutcome};
pub use stamp_duty::{DutyBasis, StampDutyBracket, StampDutySchedule};

use std::collections::BTreeMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::FeasibilityConfig;
use super::domain::{DwellingType, QualityTier};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeasibilityError {
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: Decimal },
    #[error("{0} must be greater than zero")]
    Missing(&'static str),
    #[error("{field} must be a fraction between 0 and 1 (got {value})")]
    FractionOutOfRange { field: &'static str, value: Decimal },
    #[error("no construction benchmark configured for {0:?} quality")]
    MissingBenchmark(QualityTier),
    #[error("project requires no equity; return on equity is undefined")]
    NoEquity,
}

/// Everything the feasibility model needs for one development scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityInputs {
    pub land_price: Decimal,
    pub unit_count: u32,
    pub end_value_per_unit: Decimal,
    pub buildable_area_per_unit_sqm: Decimal,
    pub quality: QualityTier,
    /// Overrides the benchmark rate for the quality tier, in dollars per square metre.
    #[serde(default)]
    pub construction_rate: Option<Decimal>,
    #[serde(default)]
    pub construction_uplift: Decimal,
    #[serde(default)]
    pub legal_costs: Decimal,
    #[serde(default)]
    pub demolition: Decimal,
    pub holding_months: u32,
    pub finance_rate: Decimal,
    pub drawdown_fraction: Decimal,
    pub agent_commission_rate: Decimal,
    #[serde(default)]
    pub marketing_rate: Decimal,
    pub professional_fee_rate: Decimal,
    pub contingency_rate: Decimal,
    pub statutory_rate: Decimal,
    pub deposit_fraction: Decimal,
    pub builder_deposit_fraction: Decimal,
    #[serde(default)]
    pub serviced_interest_fraction: Decimal,
    #[serde(default)]
    pub stamp_duty: StampDutySchedule,
}

impl FeasibilityInputs {
    /// Builds inputs for a screened site from configured cost assumptions.
    pub fn from_brief(config: &FeasibilityConfig, brief: &ProjectBrief) -> Self {
        let uplift = if brief.bushfire_prone {
            config.bushfire_construction_uplift
        } else {
            Decimal::ZERO
        };

        Self {
            land_price: brief.land_price,
            unit_count: brief.unit_count,
            end_value_per_unit: brief.end_value_per_unit,
            buildable_area_per_unit_sqm: config.buildable_area_for(brief.dwelling_type),
            quality: brief.quality.unwrap_or(config.default_quality),
            construction_rate: None,
            construction_uplift: uplift,
            legal_costs: config.legal_allowance,
            demolition: brief.demolition.unwrap_or(config.demolition_allowance),
            holding_months: brief.holding_months,
            finance_rate: config.finance_rate,
            drawdown_fraction: config.drawdown_fraction,
            agent_commission_rate: config.agent_commission_rate,
            marketing_rate: config.marketing_allowance_rate,
            professional_fee_rate: config.professional_fee_rate,
            contingency_rate: config.contingency_rate,
            statutory_rate: config.statutory_rate,
            deposit_fraction: config.deposit_fraction,
            builder_deposit_fraction: config.builder_deposit_fraction,
            serviced_interest_fraction: config.serviced_interest_fraction,
            stamp_duty: config.stamp_duty.clone(),
        }
    }

    pub fn with_holding_months(&self, holding_months: u32) -> Self {
        Self {
            holding_months,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<(), FeasibilityError> {
        let amounts = [
            ("land_price", self.land_price),
            ("end_value_per_unit", self.end_value_per_unit),
            ("buildable_area_per_unit_sqm", self.buildable_area_per_unit_sqm),
            ("construction_uplift", self.construction_uplift),
            ("legal_costs", self.legal_costs),
            ("demolition", self.demolition),
            ("finance_rate", self.finance_rate),
            ("agent_commission_rate", self.agent_commission_rate),
            ("marketing_rate", self.marketing_rate),
            ("professional_fee_rate", self.professional_fee_rate),
            ("contingency_rate", self.contingency_rate),
            ("statutory_rate", self.statutory_rate),
        ];
        for (field, value) in amounts {
            if value < Decimal::ZERO {
                return Err(FeasibilityError::Negative { field, value });
            }
        }
        if let Some(rate) = self.construction_rate {
            if rate < Decimal::ZERO {
                return Err(FeasibilityError::Negative {
                    field: "construction_rate",
                    value: rate,
                });
            }
        }

        let fractions = [
            ("drawdown_fraction", self.drawdown_fraction),
            ("deposit_fraction", self.deposit_fraction),
            ("builder_deposit_fraction", self.builder_deposit_fraction),
            ("serviced_interest_fraction", self.serviced_interest_fraction),
        ];
        for (field, value) in fractions {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(FeasibilityError::FractionOutOfRange { field, value });
            }
        }

        if self.land_price.is_zero() {
            return Err(FeasibilityError::Missing("land_price"));
        }
        if self.unit_count == 0 {
            return Err(FeasibilityError::Missing("unit_count"));
        }
        if self.buildable_area_per_unit_sqm.is_zero() {
            return Err(FeasibilityError::Missing("buildable_area_per_unit_sqm"));
        }
        if self.holding_months == 0 {
            return Err(FeasibilityError::Missing("holding_months"));
        }
        Ok(())
    }
}

/// Site-level facts used to derive feasibility inputs during screening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub land_price: Decimal,
    pub unit_count: u32,
    pub end_value_per_unit: Decimal,
    pub dwelling_type: DwellingType,
    pub quality: Option<QualityTier>,
    pub demolition: Option<Decimal>,
    pub bushfire_prone: bool,
    pub holding_months: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub land: Decimal,
    pub stamp_duty: Decimal,
    pub legal_costs: Decimal,
    pub demolition: Decimal,
    pub construction: Decimal,
    pub professional_fees: Decimal,
    pub contingency: Decimal,
    pub statutory_fees: Decimal,
    pub finance: Decimal,
    pub selling: Decimal,
}

impl CostBreakdown {
    pub fn total(&self) -> Decimal {
        self.land
            + self.stamp_duty
            + self.legal_costs
            + self.demolition
            + self.construction
            + self.professional_fees
            + self.contingency
            + self.statutory_fees
            + self.finance
            + self.selling
    }
}

/// Outcome of one feasibility run. Money is exact; annualised ROE is a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityResult {
    pub holding_months: u32,
    pub unit_count: u32,
    pub gross_development_value: Decimal,
    pub total_development_cost: Decimal,
    pub profit: Decimal,
    /// Profit over total development cost.
    pub margin: Decimal,
    pub cash_required: Decimal,
    pub return_on_equity: Decimal,
    pub annualized_roe: f64,
    pub costs: CostBreakdown,
}

/// Deterministic development feasibility model.
#[derive(Debug, Clone)]
pub struct FeasibilityModel {
    benchmarks: BTreeMap<QualityTier, Decimal>,
}

impl FeasibilityModel {
    pub fn new(benchmarks: BTreeMap<QualityTier, Decimal>) -> Self {
        Self { benchmarks }
    }

    pub fn from_config(config: &FeasibilityConfig) -> Self {
        Self::new(config.cost_benchmarks.clone())
    }

    pub fn construction_rate(&self, inputs: &FeasibilityInputs) -> Result<Decimal, FeasibilityError> {
        match inputs.construction_rate {
            Some(rate) => Ok(rate),
            None => self
                .benchmarks
                .get(&inputs.quality)
                .copied()
                .ok_or(FeasibilityError::MissingBenchmark(inputs.quality)),
        }
    }

    pub fn compute(&self, inputs: &FeasibilityInputs) -> Result<FeasibilityResult, FeasibilityError> {
        inputs.validate()?;

        let units = Decimal::from(inputs.unit_count);
        let months = Decimal::from(inputs.holding_months);

        let stamp_duty = inputs.stamp_duty.duty(inputs.land_price);
        let construction = (self.construction_rate(inputs)?
            * inputs.buildable_area_per_unit_sqm
            * units
            * (Decimal::ONE + inputs.construction_uplift))
            .round_dp(2);
        let professional_fees = (construction * inputs.professional_fee_rate).round_dp(2);
        let contingency = (construction * inputs.contingency_rate).round_dp(2);
        let statutory_fees = (construction * inputs.statutory_rate).round_dp(2);

        // Interest accrues on the average drawn balance of land and construction.
        let finance = ((inputs.land_price + construction)
            * inputs.drawdown_fraction
            * inputs.finance_rate
            * months
            / dec!(12))
        .round_dp(2);

        let gross_development_value = (inputs.end_value_per_unit * units).round_dp(2);
        let selling = (gross_development_value
            * (inputs.agent_commission_rate + inputs.marketing_rate))
            .round_dp(2);

        let costs = CostBreakdown {
            land: inputs.land_price,
            stamp_duty,
            legal_costs: inputs.legal_costs,
            demolition: inputs.demolition,
            construction,
            professional_fees,
            contingency,
            statutory_fees,
            finance,
            selling,
        };
        let total_development_cost = costs.total();
        let profit = gross_development_value - total_development_cost;
        let margin = profit
            .checked_div(total_development_cost)
            .ok_or(FeasibilityError::Missing("total_development_cost"))?;

        let cash_required = (stamp_duty
            + inputs.land_price * inputs.deposit_fraction
            + construction * inputs.builder_deposit_fraction
            + inputs.legal_costs
            + inputs.demolition
            + professional_fees
            + finance * inputs.serviced_interest_fraction)
            .round_dp(2);
        if cash_required <= Decimal::ZERO {
            return Err(FeasibilityError::NoEquity);
        }
        let return_on_equity = profit
            .checked_div(cash_required)
            .ok_or(FeasibilityError::NoEquity)?;

        Ok(FeasibilityResult {
            holding_months: inputs.holding_months,
            unit_count: inputs.unit_count,
            gross_development_value,
            total_development_cost,
            profit,
            margin,
            cash_required,
            return_on_equity,
            annualized_roe: annualize(return_on_equity, inputs.holding_months),
            costs,
        })
    }
}

/// Compounds ROE down to a yearly rate. A total loss or worse annualises to -100%.
pub fn annualize(return_on_equity: Decimal, holding_months: u32) -> f64 {
    let Some(roe) = return_on_equity.to_f64() else {
        return 0.0;
    };
    if roe <= -1.0 {
        return -1.0;
    }
    let years = f64::from(holding_months) / 12.0;
    (1.0 + roe).powf(1.0 / years) - 1.0
}

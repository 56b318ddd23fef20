use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FeasibilityError, FeasibilityInputs, FeasibilityModel, FeasibilityResult};

/// One point of the holding-period sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub result: FeasibilityResult,
    /// Finance cost over profit; absent when the scenario makes no profit.
    pub finance_to_profit: Option<Decimal>,
    pub holding_risk: bool,
}

/// Re-runs the model across holding periods with every other input fixed.
#[derive(Debug, Clone)]
pub struct HoldingPeriodSweep {
    model: FeasibilityModel,
    finance_to_profit_limit: Decimal,
}

impl HoldingPeriodSweep {
    pub fn new(model: FeasibilityModel, finance_to_profit_limit: Decimal) -> Self {
        Self {
            model,
            finance_to_profit_limit,
        }
    }

    pub fn model(&self) -> &FeasibilityModel {
        &self.model
    }

    /// Returns one outcome per holding period, in the order given.
    pub fn sweep(
        &self,
        inputs: &FeasibilityInputs,
        holding_months: &[u32],
    ) -> Result<Vec<ScenarioOutcome>, FeasibilityError> {
        holding_months
            .iter()
            .map(|months| {
                let result = self.model.compute(&inputs.with_holding_months(*months))?;
                Ok(self.assess(result))
            })
            .collect()
    }

    fn assess(&self, result: FeasibilityResult) -> ScenarioOutcome {
        let finance = result.costs.finance;
        let (finance_to_profit, holding_risk) = if result.profit > Decimal::ZERO {
            (
                finance.checked_div(result.profit),
                finance > result.profit * self.finance_to_profit_limit,
            )
        } else {
            (None, finance > Decimal::ZERO)
        };

        if holding_risk {
            debug!(
                holding_months = result.holding_months,
                finance = %finance,
                profit = %result.profit,
                "finance cost erodes profit beyond limit"
            );
        }

        ScenarioOutcome {
            result,
            finance_to_profit,
            holding_risk,
        }
    }
}

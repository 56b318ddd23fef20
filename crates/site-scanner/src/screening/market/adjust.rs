use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::super::config::MarketConfig;
use super::super::domain::{DwellingType, Era, QualityTier, RenovationStatus};
use super::{Comparable, DateRange, MarketError, TargetProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValuationBasis {
    Direct,
    /// Too few sales of the target product; houses were adjusted down instead.
    HouseFallback { target: DwellingType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationConfidence {
    High,
    Medium,
    Low,
}

impl ValuationConfidence {
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedComparable {
    pub comparable_id: String,
    pub sale_price: Decimal,
    pub adjusted_price: Decimal,
    pub land_factor: f64,
    pub type_factor: f64,
    pub improvement_delta: Decimal,
    /// The residual floor replaced the computed price.
    pub floored: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: Decimal,
    pub median: Decimal,
    pub high: Decimal,
}

/// Estimated end value per dwelling with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedValuation {
    pub value_per_unit: Decimal,
    pub basis: ValuationBasis,
    pub confidence: ValuationConfidence,
    pub sample_count: usize,
    pub range: PriceRange,
    pub comparables: Vec<AdjustedComparable>,
}

/// Adjusts recorded sales toward a target product and takes the median.
#[derive(Debug, Clone)]
pub struct ComparableAdjuster {
    config: MarketConfig,
    benchmarks: BTreeMap<QualityTier, Decimal>,
}

impl ComparableAdjuster {
    pub fn new(config: MarketConfig, benchmarks: BTreeMap<QualityTier, Decimal>) -> Self {
        Self { config, benchmarks }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn adjust(
        &self,
        comparables: &[Comparable],
        target: &TargetProfile,
        as_of: NaiveDate,
    ) -> Result<AdjustedValuation, MarketError> {
        let window = DateRange::trailing_months(as_of, self.config.lookback_months);
        let recent: Vec<&Comparable> = comparables
            .iter()
            .filter(|comparable| window.contains(comparable.sale_date))
            .collect();

        let (basis, sample) = self.select_sample(&recent, target.dwelling_type);
        if sample.is_empty() {
            return Err(MarketError::InsufficientComparables {
                dwelling_type: target.dwelling_type,
                found: recent.len(),
            });
        }

        let target_improvement = self.improvement_value(
            target.quality,
            target.building_area_sqm,
            target.era,
            target.renovation,
        )?;

        let mut adjusted = sample
            .iter()
            .map(|comparable| self.adjust_one(comparable, target, target_improvement))
            .collect::<Result<Vec<_>, _>>()?;
        adjusted.sort_by(|a, b| a.adjusted_price.cmp(&b.adjusted_price));

        let prices: Vec<Decimal> = adjusted.iter().map(|item| item.adjusted_price).collect();
        let median = median(&prices);
        let range = PriceRange {
            low: prices.first().copied().unwrap_or(median),
            median,
            high: prices.last().copied().unwrap_or(median),
        };
        let confidence = self.confidence(basis, adjusted.len());

        debug!(
            target = target.dwelling_type.label(),
            sample = adjusted.len(),
            median = %median,
            confidence = confidence.label(),
            "comparables adjusted"
        );

        Ok(AdjustedValuation {
            value_per_unit: median,
            basis,
            confidence,
            sample_count: adjusted.len(),
            range,
            comparables: adjusted,
        })
    }

    fn select_sample<'a>(
        &self,
        recent: &[&'a Comparable],
        target: DwellingType,
    ) -> (ValuationBasis, Vec<&'a Comparable>) {
        let direct = of_type(recent, target);
        if direct.len() >= self.config.min_sample || target == DwellingType::House {
            return (ValuationBasis::Direct, direct);
        }

        let houses = of_type(recent, DwellingType::House);
        if houses.len() >= self.config.min_sample || direct.is_empty() {
            (ValuationBasis::HouseFallback { target }, houses)
        } else {
            (ValuationBasis::Direct, direct)
        }
    }

    fn adjust_one(
        &self,
        comparable: &Comparable,
        target: &TargetProfile,
        target_improvement: f64,
    ) -> Result<AdjustedComparable, MarketError> {
        let land_factor = match comparable.land_size_sqm {
            Some(land) if land > 0.0 && target.land_size_sqm > 0.0 => (target.land_size_sqm
                / land)
                .powf(self.config.land_size_elasticity)
                .clamp(self.config.land_factor_floor, self.config.land_factor_ceiling),
            _ => 1.0,
        };

        let comparable_index = self.config.type_index(comparable.dwelling_type);
        let type_factor = if comparable_index > 0.0 {
            self.config.type_index(target.dwelling_type) / comparable_index
        } else {
            1.0
        };

        let comparable_improvement = self.improvement_value(
            comparable.quality,
            comparable
                .building_area_sqm
                .unwrap_or(target.building_area_sqm),
            comparable.era,
            comparable.renovation,
        )?;
        let improvement_delta = to_money(target_improvement - comparable_improvement);

        let computed = comparable.sale_price * to_factor(land_factor * type_factor)
            + improvement_delta;
        let floor = comparable.sale_price * to_factor(self.config.residual_floor_fraction);
        let floored = computed < floor;

        Ok(AdjustedComparable {
            comparable_id: comparable.id.clone(),
            sale_price: comparable.sale_price,
            adjusted_price: computed.max(floor).round_dp(2),
            land_factor,
            type_factor,
            improvement_delta,
            floored,
        })
    }

    /// Depreciated replacement cost of the improvements.
    fn improvement_value(
        &self,
        quality: QualityTier,
        building_area_sqm: f64,
        era: Era,
        renovation: RenovationStatus,
    ) -> Result<f64, MarketError> {
        let rate = self
            .benchmarks
            .get(&quality)
            .and_then(|rate| rate.to_f64())
            .ok_or(MarketError::MissingBenchmark(quality))?;
        Ok(rate
            * building_area_sqm.max(0.0)
            * era.depreciation_factor()
            * renovation.improvement_premium())
    }

    fn confidence(&self, basis: ValuationBasis, sample: usize) -> ValuationConfidence {
        match basis {
            ValuationBasis::HouseFallback { .. } => ValuationConfidence::Low,
            ValuationBasis::Direct if sample >= self.config.min_sample.max(1) * 3 => {
                ValuationConfidence::High
            }
            ValuationBasis::Direct if sample >= self.config.min_sample => {
                ValuationConfidence::Medium
            }
            ValuationBasis::Direct => ValuationConfidence::Low,
        }
    }
}

fn of_type<'a>(comparables: &[&'a Comparable], dwelling_type: DwellingType) -> Vec<&'a Comparable> {
    comparables
        .iter()
        .copied()
        .filter(|comparable| comparable.dwelling_type == dwelling_type)
        .collect()
}

/// Median of a sorted slice; the mean of the middle pair for even counts.
fn median(sorted: &[Decimal]) -> Decimal {
    match sorted.len() {
        0 => Decimal::ZERO,
        len if len % 2 == 1 => sorted[len / 2],
        len => ((sorted[len / 2 - 1] + sorted[len / 2]) / dec!(2)).round_dp(2),
    }
}

fn to_factor(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ONE).round_dp(6)
}

fn to_money(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(2)
}

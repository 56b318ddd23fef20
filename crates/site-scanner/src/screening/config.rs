use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::constraints::{rule_keys, Severity};
use super::domain::{DwellingType, QualityTier, Strategy};
use super::feasibility::StampDutySchedule;

/// Every tunable used by the screening pipeline. Passed explicitly into each component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    pub constraints: ConstraintConfig,
    pub lot_yield: LotYieldConfig,
    pub market: MarketConfig,
    pub feasibility: FeasibilityConfig,
    pub scenarios: ScenarioConfig,
    pub scoring: ScoringConfig,
    pub lookups: LookupConfig,
}

/// Thresholds and severities for the quick-kill and deep-dive rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintConfig {
    pub transmission_min_distance_m: f64,
    pub substation_min_distance_m: f64,
    pub contamination_min_distance_m: f64,
    /// Overlay base codes that block development outright.
    pub blocking_overlays: Vec<String>,
    /// Zone base codes accepted for each strategy.
    pub allowed_zones: BTreeMap<Strategy, Vec<String>>,
    pub max_average_slope_pct: f64,
    /// Minimum frontage and site area per strategy. Strategies left out have no minimum.
    pub site_requirements: BTreeMap<Strategy, SiteRequirement>,
    /// Isoperimetric quotient below which a parcel is considered irregular.
    pub min_compactness: f64,
    /// Per-rule severity overrides keyed by rule key.
    pub severities: BTreeMap<String, Severity>,
}

impl ConstraintConfig {
    pub fn severity_for(&self, rule_key: &str, default: Severity) -> Severity {
        self.severities.get(rule_key).copied().unwrap_or(default)
    }

    pub fn requirement_for(&self, strategy: Strategy) -> SiteRequirement {
        self.site_requirements
            .get(&strategy)
            .copied()
            .unwrap_or(SiteRequirement::new(0.0, 0.0))
    }
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        let residential = ["GRZ", "NRZ", "RGZ", "MUZ"];
        let mut allowed_zones = BTreeMap::new();
        allowed_zones.insert(
            Strategy::SingleDwelling,
            ["LDRZ", "GRZ", "NRZ", "RGZ", "MUZ", "TZ"]
                .iter()
                .map(|code| code.to_string())
                .collect(),
        );
        allowed_zones.insert(
            Strategy::DualOccupancy,
            residential.iter().map(|code| code.to_string()).collect(),
        );
        allowed_zones.insert(Strategy::Subdivision, vec!["LDRZ".to_string()]);

        let site_requirements = BTreeMap::from([
            (Strategy::SingleDwelling, SiteRequirement::new(10.0, 400.0)),
            (Strategy::DualOccupancy, SiteRequirement::new(15.0, 500.0)),
            (Strategy::Subdivision, SiteRequirement::new(20.0, 1_200.0)),
        ]);

        let mut severities = BTreeMap::new();
        severities.insert(rule_keys::BUSHFIRE_PRONE_AREA.to_string(), Severity::Advisory);

        Self {
            transmission_min_distance_m: 300.0,
            substation_min_distance_m: 200.0,
            contamination_min_distance_m: 500.0,
            blocking_overlays: ["PAO", "EAO", "HO", "VHR", "BMO"]
                .iter()
                .map(|code| code.to_string())
                .collect(),
            allowed_zones,
            max_average_slope_pct: 15.0,
            site_requirements,
            min_compactness: 0.5,
            severities,
        }
    }
}

/// Smallest frontage and site area a strategy is worth costing on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteRequirement {
    pub min_frontage_m: f64,
    pub min_site_area_sqm: f64,
}

impl SiteRequirement {
    pub const fn new(min_frontage_m: f64, min_site_area_sqm: f64) -> Self {
        Self {
            min_frontage_m,
            min_site_area_sqm,
        }
    }
}

/// Minimum lot sizes for a zone, split by reticulated sewer availability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneLotSchedule {
    pub sewered_min_lot_sqm: f64,
    pub unsewered_min_lot_sqm: f64,
}

impl ZoneLotSchedule {
    pub const fn flat(min_lot_sqm: f64) -> Self {
        Self {
            sewered_min_lot_sqm: min_lot_sqm,
            unsewered_min_lot_sqm: min_lot_sqm,
        }
    }

    pub fn depends_on_sewer(&self) -> bool {
        (self.sewered_min_lot_sqm - self.unsewered_min_lot_sqm).abs() > f64::EPSILON
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotYieldConfig {
    /// Schedules keyed by zone base code.
    pub zone_schedules: BTreeMap<String, ZoneLotSchedule>,
    /// Overlay schedules that impose a larger minimum lot, keyed by overlay base code.
    pub overlay_min_lot_sqm: BTreeMap<String, f64>,
    /// Share of gross area lost to driveways and shared land in attached developments.
    pub common_property_fraction: f64,
    /// Sewer readings below this confidence are treated as unknown.
    pub sewer_confidence_floor: f64,
    /// GIS area above this multiple of the listing area points to a consolidated title.
    pub area_mismatch_ratio: f64,
}

impl Default for LotYieldConfig {
    fn default() -> Self {
        let mut zone_schedules = BTreeMap::new();
        zone_schedules.insert(
            "LDRZ".to_string(),
            ZoneLotSchedule {
                sewered_min_lot_sqm: 2000.0,
                unsewered_min_lot_sqm: 4000.0,
            },
        );
        zone_schedules.insert("GRZ".to_string(), ZoneLotSchedule::flat(300.0));
        zone_schedules.insert("RGZ".to_string(), ZoneLotSchedule::flat(300.0));
        zone_schedules.insert("MUZ".to_string(), ZoneLotSchedule::flat(300.0));
        zone_schedules.insert("NRZ".to_string(), ZoneLotSchedule::flat(500.0));
        zone_schedules.insert("TZ".to_string(), ZoneLotSchedule::flat(500.0));

        let mut overlay_min_lot_sqm = BTreeMap::new();
        overlay_min_lot_sqm.insert("SLO".to_string(), 4000.0);
        overlay_min_lot_sqm.insert("VPO".to_string(), 4000.0);

        Self {
            zone_schedules,
            overlay_min_lot_sqm,
            common_property_fraction: 0.15,
            sewer_confidence_floor: 0.8,
            area_mismatch_ratio: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub min_sample: usize,
    pub lookback_months: u32,
    /// Exponent of the land-size ratio; below 1 gives diminishing returns.
    pub land_size_elasticity: f64,
    pub land_factor_floor: f64,
    pub land_factor_ceiling: f64,
    /// Relative value of each dwelling type against a detached house.
    pub type_value_index: BTreeMap<DwellingType, f64>,
    /// Adjusted price never falls below this share of the recorded sale price.
    pub residual_floor_fraction: f64,
}

impl MarketConfig {
    pub fn type_index(&self, dwelling_type: DwellingType) -> f64 {
        self.type_value_index
            .get(&dwelling_type)
            .copied()
            .unwrap_or(1.0)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        let mut type_value_index = BTreeMap::new();
        type_value_index.insert(DwellingType::House, 1.0);
        type_value_index.insert(DwellingType::Townhouse, 0.75);
        type_value_index.insert(DwellingType::Unit, 0.55);

        Self {
            min_sample: 3,
            lookback_months: 12,
            land_size_elasticity: 0.35,
            land_factor_floor: 0.7,
            land_factor_ceiling: 1.3,
            type_value_index,
            residual_floor_fraction: 0.30,
        }
    }
}

/// Cost assumptions used to build feasibility inputs for a screened parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeasibilityConfig {
    /// Construction benchmark in dollars per square metre for each quality tier.
    pub cost_benchmarks: BTreeMap<QualityTier, Decimal>,
    pub default_quality: QualityTier,
    /// Buildable floor area per dwelling for each product.
    pub buildable_area_sqm: BTreeMap<DwellingType, Decimal>,
    pub stamp_duty: StampDutySchedule,
    pub finance_rate: Decimal,
    pub drawdown_fraction: Decimal,
    pub agent_commission_rate: Decimal,
    pub marketing_allowance_rate: Decimal,
    pub professional_fee_rate: Decimal,
    pub contingency_rate: Decimal,
    pub statutory_rate: Decimal,
    pub legal_allowance: Decimal,
    pub demolition_allowance: Decimal,
    /// Construction uplift applied when the parcel sits in a bushfire prone area.
    pub bushfire_construction_uplift: Decimal,
    pub deposit_fraction: Decimal,
    pub builder_deposit_fraction: Decimal,
    /// Share of interest paid from equity during the project rather than capitalised.
    pub serviced_interest_fraction: Decimal,
}

impl FeasibilityConfig {
    pub fn benchmark_for(&self, tier: QualityTier) -> Option<Decimal> {
        self.cost_benchmarks.get(&tier).copied()
    }

    pub fn buildable_area_for(&self, dwelling_type: DwellingType) -> Decimal {
        self.buildable_area_sqm
            .get(&dwelling_type)
            .copied()
            .unwrap_or(dec!(180))
    }
}

impl Default for FeasibilityConfig {
    fn default() -> Self {
        let mut cost_benchmarks = BTreeMap::new();
        cost_benchmarks.insert(QualityTier::Basic, dec!(2000));
        cost_benchmarks.insert(QualityTier::Standard, dec!(2500));
        cost_benchmarks.insert(QualityTier::Premium, dec!(3800));
        cost_benchmarks.insert(QualityTier::Luxury, dec!(5500));

        let mut buildable_area_sqm = BTreeMap::new();
        buildable_area_sqm.insert(DwellingType::House, dec!(240));
        buildable_area_sqm.insert(DwellingType::Townhouse, dec!(200));
        buildable_area_sqm.insert(DwellingType::Unit, dec!(90));

        Self {
            cost_benchmarks,
            default_quality: QualityTier::Standard,
            buildable_area_sqm,
            stamp_duty: StampDutySchedule::victoria(),
            finance_rate: dec!(0.065),
            drawdown_fraction: dec!(0.6),
            agent_commission_rate: dec!(0.015),
            marketing_allowance_rate: dec!(0.005),
            professional_fee_rate: dec!(0.10),
            contingency_rate: dec!(0.075),
            statutory_rate: dec!(0.02),
            legal_allowance: dec!(5000),
            demolition_allowance: dec!(35000),
            bushfire_construction_uplift: dec!(0.08),
            deposit_fraction: dec!(0.20),
            builder_deposit_fraction: dec!(0.05),
            serviced_interest_fraction: dec!(0.10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub holding_months: Vec<u32>,
    /// Finance cost above this share of profit flags holding-period risk.
    pub finance_to_profit_limit: Decimal,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            holding_months: vec![12, 18, 24, 36, 48],
            finance_to_profit_limit: dec!(0.30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub go_min_margin: Decimal,
    pub marginal_min_margin: Decimal,
    pub go_min_profit: Decimal,
    pub go_min_annualized_roe: f64,
    pub margin_weight: f64,
    pub profit_weight: f64,
    pub roe_weight: f64,
    /// Profit is divided by this amount before weighting.
    pub profit_scale: Decimal,
    pub top_n: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            go_min_margin: dec!(0.20),
            marginal_min_margin: dec!(0.10),
            go_min_profit: dec!(150000),
            go_min_annualized_roe: 0.15,
            margin_weight: 0.4,
            profit_weight: 0.3,
            roe_weight: 0.3,
            profit_scale: dec!(1000000),
            top_n: 25,
        }
    }
}

/// Timeouts, retries and concurrency for external lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
    pub max_concurrent_parcels: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 3,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
            max_concurrent_parcels: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let raw = r#"{
            "constraints": { "max_average_slope_pct": 12.0 },
            "scenarios": { "holding_months": [18, 84] }
        }"#;

        let config: ScreeningConfig = serde_json::from_str(raw).expect("config parses");

        assert_eq!(config.constraints.max_average_slope_pct, 12.0);
        assert_eq!(config.constraints.transmission_min_distance_m, 300.0);
        assert_eq!(config.scenarios.holding_months, vec![18, 84]);
        assert_eq!(config.scenarios.finance_to_profit_limit, dec!(0.30));
        assert_eq!(
            config.feasibility.benchmark_for(QualityTier::Standard),
            Some(dec!(2500))
        );
    }

    #[test]
    fn site_requirements_grow_with_the_strategy() {
        let config = ConstraintConfig::default();

        let single = config.requirement_for(Strategy::SingleDwelling);
        let dual = config.requirement_for(Strategy::DualOccupancy);
        let lots = config.requirement_for(Strategy::Subdivision);

        assert_eq!((single.min_frontage_m, single.min_site_area_sqm), (10.0, 400.0));
        assert_eq!((dual.min_frontage_m, dual.min_site_area_sqm), (15.0, 500.0));
        assert_eq!((lots.min_frontage_m, lots.min_site_area_sqm), (20.0, 1_200.0));
    }

    #[test]
    fn strategy_without_requirement_has_no_minimum() {
        let mut config = ConstraintConfig::default();
        config.site_requirements.remove(&Strategy::DualOccupancy);

        let requirement = config.requirement_for(Strategy::DualOccupancy);
        assert_eq!(requirement.min_frontage_m, 0.0);
        assert_eq!(requirement.min_site_area_sqm, 0.0);
    }

    #[test]
    fn bushfire_rule_defaults_to_advisory() {
        let config = ConstraintConfig::default();
        assert_eq!(
            config.severity_for(rule_keys::BUSHFIRE_PRONE_AREA, Severity::HardBlock),
            Severity::Advisory
        );
    }
}

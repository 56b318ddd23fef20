use std::collections::BTreeSet;
use std::fmt;

use super::super::config::ConstraintConfig;
use super::super::domain::{base_code, Parcel, Strategy};
use super::super::geometry::shape_metrics;
use super::super::layers::{
    Layer, LayerLookup, LayerResults, AVERAGE_SLOPE_ATTRIBUTE, OVERLAY_CODES_ATTRIBUTE,
    ZONE_CODE_ATTRIBUTE,
};
use super::super::lot_yield::LotYield;
use super::{CheckOutcome, ConstraintCategory, Measurement, Severity, Tier};

/// Stable keys used in severity overrides and reports.
pub mod rule_keys {
    pub const TRANSMISSION_LINE: &str = "transmission_line";
    pub const SUBSTATION: &str = "substation";
    pub const CONTAMINATION: &str = "contamination";
    pub const BLOCKING_OVERLAY: &str = "blocking_overlay";
    pub const BUSHFIRE_PRONE_AREA: &str = "bushfire_prone_area";
    pub const ZONING: &str = "zoning";
    pub const LOT_SIZE: &str = "lot_size";
    pub const SLOPE: &str = "slope";
    pub const FRONTAGE: &str = "frontage";
    pub const IRREGULAR_SHAPE: &str = "irregular_shape";
}

/// Everything a rule may read. Rules are pure functions of this context.
pub struct RuleContext<'a> {
    pub parcel: &'a Parcel,
    pub layers: &'a LayerResults,
    pub strategy: Strategy,
    pub lot_yield: Option<&'a LotYield>,
    pub config: &'a ConstraintConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleFinding {
    pub outcome: CheckOutcome,
    pub measured: Option<Measurement>,
    pub threshold: Option<Measurement>,
    pub note: String,
}

impl RuleFinding {
    fn new(outcome: CheckOutcome, note: impl Into<String>) -> Self {
        Self {
            outcome,
            measured: None,
            threshold: None,
            note: note.into(),
        }
    }

    fn unknown(note: impl Into<String>) -> Self {
        Self::new(CheckOutcome::Unknown, note)
    }

    fn measured(mut self, measured: Measurement) -> Self {
        self.measured = Some(measured);
        self
    }

    fn threshold(mut self, threshold: Measurement) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

pub type RuleFn = fn(&RuleContext<'_>) -> RuleFinding;

/// Registry entry. Adding a jurisdiction or threshold means adding an entry, not a branch.
#[derive(Clone, Copy)]
pub struct ConstraintRule {
    pub key: &'static str,
    pub name: &'static str,
    pub category: ConstraintCategory,
    pub tier: Tier,
    pub default_severity: Severity,
    pub evaluate: RuleFn,
}

impl fmt::Debug for ConstraintRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstraintRule")
            .field("key", &self.key)
            .field("category", &self.category)
            .field("tier", &self.tier)
            .field("default_severity", &self.default_severity)
            .finish()
    }
}

/// Ordered rule list. Order fixes both evaluation order and which failure names a rejection.
#[derive(Debug, Clone)]
pub struct ConstraintRegistry {
    rules: Vec<ConstraintRule>,
}

impl ConstraintRegistry {
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn standard() -> Self {
        Self::empty()
            .with_rule(ConstraintRule {
                key: rule_keys::TRANSMISSION_LINE,
                name: "transmission line",
                category: ConstraintCategory::Hazard,
                tier: Tier::QuickKill,
                default_severity: Severity::HardBlock,
                evaluate: transmission_line,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::SUBSTATION,
                name: "substation",
                category: ConstraintCategory::Hazard,
                tier: Tier::QuickKill,
                default_severity: Severity::HardBlock,
                evaluate: substation,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::CONTAMINATION,
                name: "contamination",
                category: ConstraintCategory::Hazard,
                tier: Tier::QuickKill,
                default_severity: Severity::HardBlock,
                evaluate: contamination,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::BLOCKING_OVERLAY,
                name: "overlay",
                category: ConstraintCategory::Planning,
                tier: Tier::QuickKill,
                default_severity: Severity::HardBlock,
                evaluate: blocking_overlay,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::BUSHFIRE_PRONE_AREA,
                name: "bushfire prone area",
                category: ConstraintCategory::Hazard,
                tier: Tier::QuickKill,
                default_severity: Severity::Advisory,
                evaluate: bushfire_prone_area,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::ZONING,
                name: "zoning",
                category: ConstraintCategory::Planning,
                tier: Tier::DeepDive,
                default_severity: Severity::HardBlock,
                evaluate: zoning,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::LOT_SIZE,
                name: "lot size",
                category: ConstraintCategory::Planning,
                tier: Tier::DeepDive,
                default_severity: Severity::HardBlock,
                evaluate: lot_size,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::SLOPE,
                name: "slope",
                category: ConstraintCategory::Physical,
                tier: Tier::DeepDive,
                default_severity: Severity::HardBlock,
                evaluate: slope,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::FRONTAGE,
                name: "frontage",
                category: ConstraintCategory::Physical,
                tier: Tier::DeepDive,
                default_severity: Severity::HardBlock,
                evaluate: frontage,
            })
            .with_rule(ConstraintRule {
                key: rule_keys::IRREGULAR_SHAPE,
                name: "irregular shape",
                category: ConstraintCategory::Physical,
                tier: Tier::DeepDive,
                default_severity: Severity::Advisory,
                evaluate: irregular_shape,
            })
    }

    pub fn with_rule(mut self, rule: ConstraintRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[ConstraintRule] {
        &self.rules
    }

    pub fn tier(&self, tier: Tier) -> impl Iterator<Item = &ConstraintRule> + '_ {
        self.rules.iter().filter(move |rule| rule.tier == tier)
    }
}

impl Default for ConstraintRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn transmission_line(context: &RuleContext<'_>) -> RuleFinding {
    minimum_distance(
        context.layers,
        Layer::TransmissionLines,
        context.config.transmission_min_distance_m,
        "transmission line",
    )
}

fn substation(context: &RuleContext<'_>) -> RuleFinding {
    minimum_distance(
        context.layers,
        Layer::Substations,
        context.config.substation_min_distance_m,
        "substation",
    )
}

fn contamination(context: &RuleContext<'_>) -> RuleFinding {
    minimum_distance(
        context.layers,
        Layer::ContaminationSites,
        context.config.contamination_min_distance_m,
        "priority contamination site",
    )
}

fn minimum_distance(
    layers: &LayerResults,
    layer: Layer,
    min_distance_m: f64,
    feature: &str,
) -> RuleFinding {
    let threshold = Measurement::Metres(min_distance_m);
    let Some(observation) = layers.observation(layer) else {
        return RuleFinding::unknown(layers.unavailable_reason(layer)).threshold(threshold);
    };

    let distance = if observation.intersects {
        Some(0.0)
    } else {
        observation.nearest_distance_m
    };

    match distance {
        Some(distance) if distance < min_distance_m => RuleFinding::new(
            CheckOutcome::Fail,
            format!("{feature} {distance:.0} m away, needs {min_distance_m:.0} m"),
        )
        .measured(Measurement::Metres(distance))
        .threshold(threshold),
        Some(distance) => RuleFinding::new(
            CheckOutcome::Pass,
            format!("nearest {feature} {distance:.0} m away"),
        )
        .measured(Measurement::Metres(distance))
        .threshold(threshold),
        None => RuleFinding::new(
            CheckOutcome::Pass,
            format!("no {feature} within search radius"),
        )
        .threshold(threshold),
    }
}

fn blocking_overlay(context: &RuleContext<'_>) -> RuleFinding {
    let blocklist: BTreeSet<String> = context
        .config
        .blocking_overlays
        .iter()
        .map(|code| base_code(code))
        .collect();
    let threshold = Measurement::Codes(blocklist.iter().cloned().collect());

    let mut codes: BTreeSet<String> = context.parcel.overlays.clone();
    let lookup = context.layers.get(Layer::PlanningOverlays);
    if let Some(LayerLookup::Available(observation)) = lookup {
        codes.extend(observation.list_attribute(OVERLAY_CODES_ATTRIBUTE));
    }

    let blocking: Vec<String> = codes
        .iter()
        .filter(|code| blocklist.contains(&base_code(code)))
        .cloned()
        .collect();

    if !blocking.is_empty() {
        return RuleFinding::new(
            CheckOutcome::Fail,
            format!("blocking overlay present: {}", blocking.join(", ")),
        )
        .measured(Measurement::Codes(blocking))
        .threshold(threshold);
    }

    // Declared overlays are clear; a failed lookup still leaves the answer open.
    if let Some(LayerLookup::Unavailable { reason }) = lookup {
        return RuleFinding::unknown(format!("overlay layer unavailable: {reason}"))
            .measured(Measurement::Codes(codes.into_iter().collect()))
            .threshold(threshold);
    }

    RuleFinding::new(CheckOutcome::Pass, "no blocking overlay")
        .measured(Measurement::Codes(codes.into_iter().collect()))
        .threshold(threshold)
}

fn bushfire_prone_area(context: &RuleContext<'_>) -> RuleFinding {
    let layer = Layer::BushfireProneArea;
    match context.layers.observation(layer) {
        Some(observation) if observation.intersects => RuleFinding::new(
            CheckOutcome::Fail,
            "inside bushfire prone area; BAL construction uplift applies",
        )
        .measured(Measurement::Flag(true)),
        Some(_) => RuleFinding::new(CheckOutcome::Pass, "outside bushfire prone area")
            .measured(Measurement::Flag(false)),
        None => RuleFinding::unknown(context.layers.unavailable_reason(layer)),
    }
}

fn zoning(context: &RuleContext<'_>) -> RuleFinding {
    let allowed: Vec<String> = context
        .config
        .allowed_zones
        .get(&context.strategy)
        .map(|zones| zones.iter().map(|zone| base_code(zone)).collect())
        .unwrap_or_default();
    let threshold = Measurement::Codes(allowed.clone());

    let declared = Some(context.parcel.zone_code.trim())
        .filter(|code| !code.is_empty())
        .map(str::to_string);
    let layer_zone = context
        .layers
        .observation(Layer::Zones)
        .and_then(|observation| observation.attribute(ZONE_CODE_ATTRIBUTE))
        .map(str::to_string);

    let zone = match (declared, layer_zone) {
        (Some(declared), Some(layer_zone)) if base_code(&declared) != base_code(&layer_zone) => {
            return RuleFinding::unknown(format!(
                "parcel zone {declared} disagrees with zone layer {layer_zone}"
            ))
            .measured(Measurement::Codes(vec![declared, layer_zone]))
            .threshold(threshold);
        }
        (Some(zone), _) | (None, Some(zone)) => zone,
        (None, None) => {
            return RuleFinding::unknown("zone code not supplied and zone layer unavailable")
                .threshold(threshold)
        }
    };

    let measured = Measurement::Codes(vec![zone.clone()]);
    if allowed.contains(&base_code(&zone)) {
        RuleFinding::new(
            CheckOutcome::Pass,
            format!("{zone} permits {}", context.strategy.label()),
        )
        .measured(measured)
        .threshold(threshold)
    } else {
        RuleFinding::new(
            CheckOutcome::Fail,
            format!("{zone} does not permit {}", context.strategy.label()),
        )
        .measured(measured)
        .threshold(threshold)
    }
}

fn lot_size(context: &RuleContext<'_>) -> RuleFinding {
    let minimum_area = context
        .config
        .requirement_for(context.strategy)
        .min_site_area_sqm;
    let site_area = context
        .lot_yield
        .map(|lot_yield| lot_yield.gross_area_sqm)
        .unwrap_or(context.parcel.area_sqm);

    if site_area < minimum_area {
        return RuleFinding::new(
            CheckOutcome::Fail,
            format!(
                "{site_area:.0} sqm site, {} needs {minimum_area:.0} sqm",
                context.strategy.label()
            ),
        )
        .measured(Measurement::SquareMetres(site_area))
        .threshold(Measurement::SquareMetres(minimum_area));
    }

    if !context.strategy.subdivides() {
        return RuleFinding::new(
            CheckOutcome::Pass,
            format!(
                "{site_area:.0} sqm site meets the {minimum_area:.0} sqm {} minimum",
                context.strategy.label()
            ),
        )
        .measured(Measurement::SquareMetres(site_area))
        .threshold(Measurement::SquareMetres(minimum_area));
    }

    let required = context.strategy.minimum_lots();
    let Some(lot_yield) = context.lot_yield else {
        return RuleFinding::unknown(format!(
            "no lot-size schedule for zone {}",
            context.parcel.zone_code
        ))
        .threshold(Measurement::Lots(required));
    };

    let measured = Measurement::Lots(lot_yield.max_yield);
    let threshold = Measurement::Lots(required);

    if lot_yield.max_yield >= required {
        return RuleFinding::new(
            CheckOutcome::Pass,
            format!(
                "{:.0} sqm usable supports {} lot(s) at {:.0} sqm minimum",
                lot_yield.usable_area_sqm, lot_yield.max_yield, lot_yield.min_lot_sqm
            ),
        )
        .measured(measured)
        .threshold(threshold);
    }

    match lot_yield.sewered_max_yield {
        Some(sewered) if lot_yield.sewer_assumed_unsewered && sewered >= required => {
            RuleFinding::unknown(format!(
                "supports {sewered} lot(s) only if sewered; sewer connection unconfirmed"
            ))
            .measured(measured)
            .threshold(threshold)
        }
        _ => RuleFinding::new(
            CheckOutcome::Fail,
            format!(
                "{:.0} sqm usable supports {} lot(s) at {:.0} sqm minimum, needs {required}",
                lot_yield.usable_area_sqm, lot_yield.max_yield, lot_yield.min_lot_sqm
            ),
        )
        .measured(measured)
        .threshold(threshold),
    }
}

fn slope(context: &RuleContext<'_>) -> RuleFinding {
    let ceiling = context.config.max_average_slope_pct;
    let threshold = Measurement::Percent(ceiling);
    let Some(observation) = context.layers.observation(Layer::Terrain) else {
        return RuleFinding::unknown(context.layers.unavailable_reason(Layer::Terrain))
            .threshold(threshold);
    };

    match observation.numeric_attribute(AVERAGE_SLOPE_ATTRIBUTE) {
        Some(value) if value < ceiling => {
            RuleFinding::new(CheckOutcome::Pass, format!("average slope {value:.1}%"))
                .measured(Measurement::Percent(value))
                .threshold(threshold)
        }
        Some(value) => RuleFinding::new(
            CheckOutcome::Fail,
            format!("average slope {value:.1}% at or above {ceiling:.1}%"),
        )
        .measured(Measurement::Percent(value))
        .threshold(threshold),
        None => RuleFinding::unknown("terrain layer returned no slope").threshold(threshold),
    }
}

fn frontage(context: &RuleContext<'_>) -> RuleFinding {
    let required = context.config.requirement_for(context.strategy).min_frontage_m;
    let threshold = Measurement::Metres(required);

    let frontage = context.parcel.frontage_m;
    if !frontage.is_finite() || frontage <= 0.0 {
        return RuleFinding::unknown("street frontage not measured").threshold(threshold);
    }

    let outcome = if frontage >= required {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Fail
    };
    RuleFinding::new(
        outcome,
        format!(
            "{frontage:.1} m frontage, {} needs {required:.1} m",
            context.strategy.label()
        ),
    )
    .measured(Measurement::Metres(frontage))
    .threshold(threshold)
}

fn irregular_shape(context: &RuleContext<'_>) -> RuleFinding {
    let floor = context.config.min_compactness;
    let threshold = Measurement::Ratio(floor);
    let Some(metrics) = shape_metrics(&context.parcel.geometry) else {
        return RuleFinding::unknown("parcel boundary not supplied").threshold(threshold);
    };

    let outcome = if metrics.compactness >= floor {
        CheckOutcome::Pass
    } else {
        CheckOutcome::Fail
    };
    RuleFinding::new(
        outcome,
        format!("compactness {:.2}", metrics.compactness),
    )
    .measured(Measurement::Ratio(metrics.compactness))
    .threshold(threshold)
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::DwellingType;
use super::layers::Layer;

/// Structured warning attached to a screened site. Flags never change a verdict on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum ScreeningFlag {
    UnknownConstraint {
        rule: String,
        note: String,
    },
    LayerUnavailable {
        layer: Layer,
        reason: String,
    },
    SewerAssumedUnsewered,
    AreaMismatch {
        gis_area_sqm: f64,
        listing_area_sqm: f64,
    },
    CommonProperty {
        parent_area_sqm: f64,
        lots_total_sqm: f64,
        common_property_sqm: f64,
    },
    BushfireUplift {
        uplift: Decimal,
    },
    ComparableFallback {
        target: DwellingType,
        sample_count: usize,
    },
    ValuationUnavailable {
        reason: String,
    },
    HoldingPeriodRisk {
        holding_months: u32,
        finance: Decimal,
        profit: Decimal,
    },
}

impl ScreeningFlag {
    pub fn summary(&self) -> String {
        match self {
            Self::UnknownConstraint { rule, note } => format!("{rule} unresolved: {note}"),
            Self::LayerUnavailable { layer, reason } => {
                format!("{} lookup failed: {reason}", layer.label())
            }
            Self::SewerAssumedUnsewered => {
                "sewer connection unconfirmed; unsewered lot minimum applied".to_string()
            }
            Self::AreaMismatch {
                gis_area_sqm,
                listing_area_sqm,
            } => format!(
                "GIS area {gis_area_sqm:.0} sqm far exceeds listing {listing_area_sqm:.0} sqm; listing area used"
            ),
            Self::CommonProperty {
                parent_area_sqm,
                lots_total_sqm,
                common_property_sqm,
            } => format!(
                "recorded lots cover {lots_total_sqm:.0} of {parent_area_sqm:.0} sqm; {common_property_sqm:.0} sqm common property excluded"
            ),
            Self::BushfireUplift { uplift } => {
                format!("bushfire prone area; construction uplift {uplift} applied")
            }
            Self::ComparableFallback {
                target,
                sample_count,
            } => format!(
                "too few {} sales; valued from {sample_count} adjusted house sale(s)",
                target.label().to_lowercase()
            ),
            Self::ValuationUnavailable { reason } => format!("no valuation: {reason}"),
            Self::HoldingPeriodRisk {
                holding_months,
                finance,
                profit,
            } => format!(
                "{holding_months}-month hold: finance {} erodes profit {}",
                finance.round_dp(0),
                profit.round_dp(0)
            ),
        }
    }
}

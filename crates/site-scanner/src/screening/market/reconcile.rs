use serde::{Deserialize, Serialize};

use super::Comparable;

/// Split of a parent title between recorded lots and common property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonPropertyReconciliation {
    pub parent_area_sqm: f64,
    pub lots_total_sqm: f64,
    pub common_property_sqm: f64,
    /// Recorded lots add up to more than the parent; areas are suspect.
    pub oversubscribed: bool,
}

impl CommonPropertyReconciliation {
    pub fn has_common_property(&self) -> bool {
        self.common_property_sqm > 0.0
    }

    pub fn common_property_fraction(&self) -> f64 {
        if self.parent_area_sqm <= 0.0 {
            return 0.0;
        }
        self.common_property_sqm / self.parent_area_sqm
    }

    pub fn needs_review(&self) -> bool {
        self.has_common_property() || self.oversubscribed
    }
}

/// Any shortfall between the parent area and its recorded lots is common property and is
/// never attributed to an individual lot.
pub fn reconcile_common_property(
    parent_area_sqm: f64,
    lot_areas_sqm: &[f64],
) -> CommonPropertyReconciliation {
    let lots_total_sqm: f64 = lot_areas_sqm.iter().filter(|area| **area > 0.0).sum();
    let shortfall = parent_area_sqm - lots_total_sqm;

    CommonPropertyReconciliation {
        parent_area_sqm,
        lots_total_sqm,
        common_property_sqm: shortfall.max(0.0),
        oversubscribed: shortfall < 0.0,
    }
}

/// Sales of the units on one subdivided parent title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiUnitSale {
    pub parent_id: String,
    pub parent_area_sqm: f64,
    pub units: Vec<Comparable>,
}

impl MultiUnitSale {
    pub fn reconciliation(&self) -> CommonPropertyReconciliation {
        let lot_areas: Vec<f64> = self
            .units
            .iter()
            .filter_map(|unit| unit.land_size_sqm)
            .collect();
        reconcile_common_property(self.parent_area_sqm, &lot_areas)
    }

    /// Unit sales with land set to each unit's own lot. Units without a recorded lot get
    /// no land size rather than a share of the parent.
    pub fn into_unit_comparables(self) -> (Vec<Comparable>, CommonPropertyReconciliation) {
        let reconciliation = self.reconciliation();
        let units = self
            .units
            .into_iter()
            .map(|mut unit| {
                unit.land_size_sqm = unit.land_size_sqm.filter(|area| *area > 0.0);
                unit
            })
            .collect();
        (units, reconciliation)
    }
}

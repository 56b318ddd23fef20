mod adjust;
mod csv_store;
mod reconcile;

pub use adjust::{
    AdjustedComparable, AdjustedValuation, ComparableAdjuster, PriceRange, ValuationBasis,
    ValuationConfidence,
};
pub use csv_store::{ComparableImportError, CsvComparableStore, ParentReconciliation};
pub use reconcile::{reconcile_common_property, CommonPropertyReconciliation, MultiUnitSale};

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{DwellingType, Era, QualityTier, RenovationStatus};

/// Recorded sale used as market evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparable {
    pub id: String,
    pub address: String,
    pub suburb: String,
    pub sale_price: Decimal,
    pub sale_date: NaiveDate,
    pub dwelling_type: DwellingType,
    /// Land attributable to the sale; for strata units this is the unit's own lot.
    pub land_size_sqm: Option<f64>,
    pub building_area_sqm: Option<f64>,
    pub quality: QualityTier,
    pub era: Era,
    pub renovation: RenovationStatus,
}

/// Product the comparables are adjusted toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetProfile {
    pub dwelling_type: DwellingType,
    pub quality: QualityTier,
    pub land_size_sqm: f64,
    pub building_area_sqm: f64,
    pub era: Era,
    pub renovation: RenovationStatus,
}

impl TargetProfile {
    /// A new build of the given product.
    pub fn new_build(
        dwelling_type: DwellingType,
        quality: QualityTier,
        land_size_sqm: f64,
        building_area_sqm: f64,
    ) -> Self {
        Self {
            dwelling_type,
            quality,
            land_size_sqm,
            building_area_sqm,
            era: Era::NewBuild,
            renovation: RenovationStatus::Unknown,
        }
    }
}

/// Inclusive date window for comparable searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Window of `months` ending on `as_of`.
    pub fn trailing_months(as_of: NaiveDate, months: u32) -> Self {
        let from = as_of
            .checked_sub_months(Months::new(months))
            .unwrap_or(NaiveDate::MIN);
        Self { from, to: as_of }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    #[error("found {found} recent comparable(s) for {dwelling_type:?}; at least one is required")]
    InsufficientComparables {
        dwelling_type: DwellingType,
        found: usize,
    },
    #[error("no construction benchmark configured for {0:?} quality")]
    MissingBenchmark(QualityTier),
    #[error("comparable store unavailable: {0}")]
    StoreUnavailable(String),
}

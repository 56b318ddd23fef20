//! Parcel screening: constraint evaluation, lot yield, comparable valuation, feasibility
//! and scoring.
//!
//! External data arrives through the provider traits in [`providers`]; everything else is
//! deterministic given the same inputs and configuration.

pub mod config;
pub mod constraints;
pub mod domain;
pub mod feasibility;
pub mod flags;
pub mod geometry;
pub mod layers;
pub mod lookup;
pub mod lot_yield;
pub mod market;
pub mod pipeline;
pub mod providers;
pub mod scoring;
pub mod views;

#[cfg(test)]
mod tests;

pub use config::ScreeningConfig;
pub use constraints::{
    CheckOutcome, ConstraintCheck, ConstraintEvaluator, ConstraintRegistry, ConstraintVerdict,
    Severity, VerdictStatus,
};
pub use domain::{
    DwellingType, Era, GeoPoint, Parcel, ParcelId, QualityTier, RenovationStatus, Strategy,
    TriState,
};
pub use feasibility::{
    FeasibilityError, FeasibilityInputs, FeasibilityModel, FeasibilityResult, HoldingPeriodSweep,
    ScenarioOutcome,
};
pub use flags::ScreeningFlag;
pub use layers::{Layer, LayerLookup, LayerObservation, LayerResults};
pub use lot_yield::{LotYield, LotYieldResolver};
pub use market::{AdjustedValuation, Comparable, ComparableAdjuster, CsvComparableStore};
pub use pipeline::{BatchReport, ScreeningError, ScreeningRequest, SiteScreeningService};
pub use providers::{
    ComparableStore, LookupError, SewerConnectivityProvider, SewerReading,
    SpatialAttributeProvider,
};
pub use scoring::{rank_sites, Recommendation, ScoreAggregator, ScoredSite, StrategyAlternative};

//! Screening engine for residential development sites.
//!
//! A parcel flows through constraint evaluation, lot-yield resolution, comparable
//! valuation, the feasibility model and a holding-period sweep before being scored.

pub mod config;
pub mod error;
pub mod screening;
pub mod telemetry;

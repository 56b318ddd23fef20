use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::config::LotYieldConfig;
use super::domain::{base_code, TriState};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LotYieldError {
    #[error("no lot-size schedule for zone {0}")]
    UnknownZone(String),
    #[error("parcel area {0} is not a positive number")]
    InvalidArea(f64),
}

/// Inputs needed to resolve the minimum lot and yield for one parcel and strategy.
#[derive(Debug, Clone, Copy)]
pub struct LotYieldRequest<'a> {
    pub zone_code: &'a str,
    pub overlays: &'a BTreeSet<String>,
    pub sewer: TriState,
    pub area_sqm: f64,
    /// Attached products give up part of the site to common property.
    pub attached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MinimumSource {
    ZoneSchedule { zone: String },
    Overlay { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimumLot {
    pub zone: String,
    pub min_lot_sqm: f64,
    pub source: MinimumSource,
    /// Sewer status was unknown and the unsewered minimum was applied.
    pub sewer_assumed_unsewered: bool,
    /// Minimum that would apply if the parcel turned out to be sewered.
    pub sewered_min_lot_sqm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotYield {
    pub zone: String,
    pub min_lot_sqm: f64,
    pub source: MinimumSource,
    pub sewer: TriState,
    pub sewer_assumed_unsewered: bool,
    pub gross_area_sqm: f64,
    pub common_property_sqm: f64,
    pub usable_area_sqm: f64,
    pub max_yield: u32,
    /// Yield under the sewered minimum, present only when sewer status was assumed.
    pub sewered_max_yield: Option<u32>,
}

impl LotYield {
    /// Land attributable to each lot once the site is split into `lots`.
    pub fn land_per_lot_sqm(&self, lots: u32) -> f64 {
        if lots == 0 {
            return self.usable_area_sqm;
        }
        self.usable_area_sqm / f64::from(lots)
    }
}

/// Resolves minimum lot sizes from zone and overlay schedules.
#[derive(Debug, Clone)]
pub struct LotYieldResolver {
    config: LotYieldConfig,
}

impl LotYieldResolver {
    pub fn new(config: LotYieldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LotYieldConfig {
        &self.config
    }

    /// Governing minimum lot size. The larger of the zone and overlay minimums wins, and an
    /// unknown sewer status falls back to the unsewered minimum.
    pub fn minimum_lot(
        &self,
        zone_code: &str,
        overlays: &BTreeSet<String>,
        sewer: TriState,
    ) -> Result<MinimumLot, LotYieldError> {
        let zone = base_code(zone_code);
        let schedule = self
            .config
            .zone_schedules
            .get(&zone)
            .copied()
            .ok_or_else(|| LotYieldError::UnknownZone(zone_code.to_string()))?;

        let (zone_min, assumed) = match sewer {
            TriState::Yes => (schedule.sewered_min_lot_sqm, false),
            TriState::No => (schedule.unsewered_min_lot_sqm, false),
            TriState::Unknown => (schedule.unsewered_min_lot_sqm, schedule.depends_on_sewer()),
        };

        let overlay = overlays
            .iter()
            .filter_map(|code| {
                self.config
                    .overlay_min_lot_sqm
                    .get(&base_code(code))
                    .map(|min| (code.clone(), *min))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let overlay_min = overlay.as_ref().map(|(_, min)| *min).unwrap_or(0.0);

        let (min_lot_sqm, source) = match overlay {
            Some((code, min)) if min > zone_min => (min, MinimumSource::Overlay { code }),
            _ => (
                zone_min,
                MinimumSource::ZoneSchedule { zone: zone.clone() },
            ),
        };

        Ok(MinimumLot {
            zone,
            min_lot_sqm,
            source,
            sewer_assumed_unsewered: assumed,
            sewered_min_lot_sqm: assumed
                .then(|| schedule.sewered_min_lot_sqm.max(overlay_min)),
        })
    }

    pub fn resolve(&self, request: &LotYieldRequest<'_>) -> Result<LotYield, LotYieldError> {
        if !request.area_sqm.is_finite() || request.area_sqm <= 0.0 {
            return Err(LotYieldError::InvalidArea(request.area_sqm));
        }

        let minimum = self.minimum_lot(request.zone_code, request.overlays, request.sewer)?;

        let common_property_sqm = if request.attached {
            request.area_sqm * self.config.common_property_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let usable_area_sqm = request.area_sqm - common_property_sqm;

        Ok(LotYield {
            max_yield: lots_within(usable_area_sqm, minimum.min_lot_sqm),
            sewered_max_yield: minimum
                .sewered_min_lot_sqm
                .map(|min| lots_within(usable_area_sqm, min)),
            zone: minimum.zone,
            min_lot_sqm: minimum.min_lot_sqm,
            source: minimum.source,
            sewer: request.sewer,
            sewer_assumed_unsewered: minimum.sewer_assumed_unsewered,
            gross_area_sqm: request.area_sqm,
            common_property_sqm,
            usable_area_sqm,
        })
    }
}

fn lots_within(area_sqm: f64, min_lot_sqm: f64) -> u32 {
    if min_lot_sqm <= 0.0 {
        return 1;
    }
    // Tolerance keeps 600 / 300 from landing on 1.999...
    ((area_sqm / min_lot_sqm) + 1e-9).floor().max(0.0) as u32
}

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for a cadastral parcel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParcelId(pub String);

impl fmt::Display for ParcelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Land parcel supplied by the caller. Never mutated by the screening pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: ParcelId,
    pub address: String,
    #[serde(default)]
    pub suburb: String,
    /// Boundary ring; the closing point may be omitted.
    #[serde(default)]
    pub geometry: Vec<GeoPoint>,
    pub area_sqm: f64,
    pub frontage_m: f64,
    pub zone_code: String,
    #[serde(default)]
    pub overlays: BTreeSet<String>,
    /// Land size quoted by the listing, used to catch consolidated titles.
    #[serde(default)]
    pub listing_area_sqm: Option<f64>,
    /// Lot areas already recorded on title for a subdivided parcel.
    #[serde(default)]
    pub recorded_lot_areas_sqm: Vec<f64>,
}

impl Parcel {
    /// Mean of the boundary vertices, used as the query point for point-based layers.
    pub fn centroid(&self) -> Option<GeoPoint> {
        let ring = open_ring(&self.geometry);
        if ring.is_empty() {
            return None;
        }
        let count = ring.len() as f64;
        let (lat, lon) = ring
            .iter()
            .fold((0.0, 0.0), |(lat, lon), point| (lat + point.lat, lon + point.lon));
        Some(GeoPoint {
            lat: lat / count,
            lon: lon / count,
        })
    }
}

/// Drops the duplicated closing vertex if present.
pub(crate) fn open_ring(points: &[GeoPoint]) -> &[GeoPoint] {
    match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() > 1 && first == last => {
            &points[..points.len() - 1]
        }
        _ => points,
    }
}

/// Three-valued answer for lookups that may be stale or ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    Unknown,
}

impl TriState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Unknown => "unknown",
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Yes,
            Some(false) => Self::No,
            None => Self::Unknown,
        }
    }
}

/// Development strategy being tested against a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SingleDwelling,
    DualOccupancy,
    Subdivision,
}

impl Strategy {
    pub const fn ordered() -> [Self; 3] {
        [Self::SingleDwelling, Self::DualOccupancy, Self::Subdivision]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SingleDwelling => "Single dwelling",
            Self::DualOccupancy => "Dual occupancy",
            Self::Subdivision => "Multi-lot subdivision",
        }
    }

    /// Lots (or dwellings) the strategy needs to be viable at all.
    pub const fn minimum_lots(self) -> u32 {
        match self {
            Self::SingleDwelling => 1,
            Self::DualOccupancy | Self::Subdivision => 2,
        }
    }

    /// Lots actually delivered given the resolved maximum yield.
    pub fn planned_lots(self, max_yield: u32) -> u32 {
        match self {
            Self::SingleDwelling => 1,
            Self::DualOccupancy => 2,
            Self::Subdivision => max_yield.max(2),
        }
    }

    /// Product sold at the end of the project.
    pub const fn end_product(self) -> DwellingType {
        match self {
            Self::SingleDwelling | Self::Subdivision => DwellingType::House,
            Self::DualOccupancy => DwellingType::Townhouse,
        }
    }

    /// Whether the strategy creates new titles and so depends on the minimum lot size.
    pub const fn subdivides(self) -> bool {
        matches!(self, Self::Subdivision)
    }

    /// Whether the product shares common property (driveways, easements).
    pub const fn attached(self) -> bool {
        matches!(self, Self::DualOccupancy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DwellingType {
    House,
    Townhouse,
    Unit,
}

impl DwellingType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::House => "House",
            Self::Townhouse => "Townhouse",
            Self::Unit => "Unit",
        }
    }
}

/// Finish quality, each tier anchored to a construction benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Basic,
    Standard,
    Premium,
    Luxury,
}

impl QualityTier {
    pub const fn ordered() -> [Self; 4] {
        [Self::Basic, Self::Standard, Self::Premium, Self::Luxury]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Standard => "Standard",
            Self::Premium => "Premium",
            Self::Luxury => "Luxury",
        }
    }
}

/// Build era bracket of the improvements on a sold property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Era {
    Pre1920,
    Interwar,
    PostWar,
    Late20thCentury,
    Modern,
    Post2010,
    NewBuild,
    Unknown,
}

impl Era {
    /// Share of replacement cost still carried by improvements of this age.
    pub const fn depreciation_factor(self) -> f64 {
        match self {
            Self::NewBuild => 1.0,
            Self::Post2010 => 0.95,
            Self::Modern => 0.75,
            Self::Late20thCentury => 0.55,
            Self::PostWar => 0.40,
            Self::Interwar => 0.30,
            Self::Pre1920 => 0.25,
            Self::Unknown => 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenovationStatus {
    Renovated,
    Unrenovated,
    Unknown,
}

impl RenovationStatus {
    pub const fn improvement_premium(self) -> f64 {
        match self {
            Self::Renovated => 1.20,
            Self::Unrenovated | Self::Unknown => 1.0,
        }
    }
}

/// Strips schedule digits so `GRZ1` and `HO123` compare on their base code.
pub fn base_code(code: &str) -> String {
    code.trim()
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()
        .trim_end_matches(|c: char| c == '-' || c.is_whitespace())
        .to_ascii_uppercase()
}

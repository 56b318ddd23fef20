use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named hazard and planning layers queried through the spatial provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    TransmissionLines,
    Substations,
    ContaminationSites,
    PlanningOverlays,
    BushfireProneArea,
    Zones,
    SewerNetwork,
    Terrain,
}

impl Layer {
    pub const fn ordered() -> [Self; 8] {
        [
            Self::TransmissionLines,
            Self::Substations,
            Self::ContaminationSites,
            Self::PlanningOverlays,
            Self::BushfireProneArea,
            Self::Zones,
            Self::SewerNetwork,
            Self::Terrain,
        ]
    }

    /// Layers read by the constraint rules. Sewer is resolved through its own provider.
    pub const fn screening_layers() -> [Self; 7] {
        [
            Self::TransmissionLines,
            Self::Substations,
            Self::ContaminationSites,
            Self::PlanningOverlays,
            Self::BushfireProneArea,
            Self::Zones,
            Self::Terrain,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::TransmissionLines => "transmission_lines",
            Self::Substations => "substations",
            Self::ContaminationSites => "epa_priority_sites",
            Self::PlanningOverlays => "planning_overlays",
            Self::BushfireProneArea => "bushfire_prone_area",
            Self::Zones => "planning_zones",
            Self::SewerNetwork => "sewer_network",
            Self::Terrain => "terrain",
        }
    }
}

/// Attribute key carrying comma separated overlay codes on the overlay layer.
pub const OVERLAY_CODES_ATTRIBUTE: &str = "codes";
/// Attribute key carrying the zone code on the zone layer.
pub const ZONE_CODE_ATTRIBUTE: &str = "zone_code";
/// Attribute key carrying the mean slope, in percent, on the terrain layer.
pub const AVERAGE_SLOPE_ATTRIBUTE: &str = "average_slope_pct";
/// Attribute key carrying a confirmed connection (`true`/`false`) on the sewer layer.
pub const SEWER_CONNECTED_ATTRIBUTE: &str = "connected";

/// Answer returned by the spatial provider for one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerObservation {
    #[serde(default)]
    pub nearest_distance_m: Option<f64>,
    #[serde(default)]
    pub intersects: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl LayerObservation {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn numeric_attribute(&self, key: &str) -> Option<f64> {
        self.attribute(key)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
    }

    pub fn list_attribute(&self, key: &str) -> Vec<String> {
        self.attribute(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Outcome of a layer lookup after retries. `Unavailable` is never read as a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LayerLookup {
    Available(LayerObservation),
    Unavailable { reason: String },
}

impl LayerLookup {
    pub fn observation(&self) -> Option<&LayerObservation> {
        match self {
            Self::Available(observation) => Some(observation),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Layer lookups gathered for one parcel. Missing layers read as unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerResults {
    lookups: BTreeMap<Layer, LayerLookup>,
}

impl LayerResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: Layer, lookup: LayerLookup) {
        self.lookups.insert(layer, lookup);
    }

    pub fn with_observation(mut self, layer: Layer, observation: LayerObservation) -> Self {
        self.insert(layer, LayerLookup::Available(observation));
        self
    }

    pub fn get(&self, layer: Layer) -> Option<&LayerLookup> {
        self.lookups.get(&layer)
    }

    pub fn observation(&self, layer: Layer) -> Option<&LayerObservation> {
        self.lookups.get(&layer).and_then(LayerLookup::observation)
    }

    /// Reason a layer could not be read, or a default note when it was never queried.
    pub fn unavailable_reason(&self, layer: Layer) -> String {
        match self.lookups.get(&layer) {
            Some(LayerLookup::Unavailable { reason }) => reason.clone(),
            Some(LayerLookup::Available(_)) => String::new(),
            None => format!("{} layer was not queried", layer.label()),
        }
    }

    pub fn unavailable_layers(&self) -> Vec<Layer> {
        self.lookups
            .iter()
            .filter(|(_, lookup)| matches!(lookup, LayerLookup::Unavailable { .. }))
            .map(|(layer, _)| *layer)
            .collect()
    }
}

impl FromIterator<(Layer, LayerLookup)> for LayerResults {
    fn from_iter<T: IntoIterator<Item = (Layer, LayerLookup)>>(iter: T) -> Self {
        Self {
            lookups: iter.into_iter().collect(),
        }
    }
}

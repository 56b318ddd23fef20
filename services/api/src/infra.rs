use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use site_scanner::screening::providers::NetworkProximitySewerProvider;
use site_scanner::screening::{
    Comparable, DwellingType, Layer, LayerObservation, LookupError, Parcel, ParcelId,
    QualityTier, ScreeningConfig, ScreeningRequest, SewerConnectivityProvider, SewerReading,
    SpatialAttributeProvider,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Distance within which a sewer main counts as reachable when no reading is supplied.
pub(crate) const SEWER_SEARCH_RADIUS_M: f64 = 60.0;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) screening: Arc<ScreeningConfig>,
}

/// One parcel plus the layer observations and sewer reading gathered for it upstream.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SiteInput {
    pub(crate) request: ScreeningRequest,
    #[serde(default)]
    pub(crate) layers: BTreeMap<Layer, LayerObservation>,
    #[serde(default)]
    pub(crate) sewer: Option<SewerReading>,
}

/// Batch payload shared by the HTTP endpoint and the `screen` command.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ScreeningBatch {
    #[serde(default)]
    pub(crate) sites: Vec<SiteInput>,
    #[serde(default)]
    pub(crate) comparables: Vec<Comparable>,
    #[serde(default)]
    pub(crate) top_n: Option<usize>,
}

impl ScreeningBatch {
    pub(crate) fn into_parts(self) -> BatchParts {
        let mut layers = HashMap::new();
        let mut readings = HashMap::new();
        let mut requests = Vec::with_capacity(self.sites.len());

        for site in self.sites {
            let id = site.request.parcel.id.clone();
            // Repeated parcel ids share one snapshot; later observations win per layer.
            layers
                .entry(id.clone())
                .or_insert_with(BTreeMap::new)
                .extend(site.layers);
            if let Some(reading) = site.sewer {
                readings.insert(id, reading);
            }
            requests.push(site.request);
        }

        let spatial = Arc::new(SnapshotSpatialProvider { layers });
        let sewer = Arc::new(SnapshotSewerProvider {
            readings,
            network: NetworkProximitySewerProvider::new(
                Arc::clone(&spatial),
                SEWER_SEARCH_RADIUS_M,
            ),
        });

        BatchParts {
            spatial,
            sewer,
            requests,
            comparables: self.comparables,
            top_n: self.top_n,
        }
    }
}

pub(crate) struct BatchParts {
    pub(crate) spatial: Arc<SnapshotSpatialProvider>,
    pub(crate) sewer: Arc<SnapshotSewerProvider>,
    pub(crate) requests: Vec<ScreeningRequest>,
    pub(crate) comparables: Vec<Comparable>,
    pub(crate) top_n: Option<usize>,
}

/// Answers layer queries from observations captured before the batch ran. A layer with no
/// observation is reported unavailable so the rule reads it as unknown.
#[derive(Debug, Default)]
pub(crate) struct SnapshotSpatialProvider {
    layers: HashMap<ParcelId, BTreeMap<Layer, LayerObservation>>,
}

#[async_trait]
impl SpatialAttributeProvider for SnapshotSpatialProvider {
    async fn query(&self, parcel: &Parcel, layer: Layer) -> Result<LayerObservation, LookupError> {
        self.layers
            .get(&parcel.id)
            .and_then(|layers| layers.get(&layer))
            .cloned()
            .ok_or_else(|| {
                LookupError::Unavailable(format!(
                    "no {} observation supplied for {}",
                    layer.label(),
                    parcel.id
                ))
            })
    }
}

/// Uses a supplied reading when present, otherwise infers from the sewer network layer.
pub(crate) struct SnapshotSewerProvider {
    readings: HashMap<ParcelId, SewerReading>,
    network: NetworkProximitySewerProvider<SnapshotSpatialProvider>,
}

#[async_trait]
impl SewerConnectivityProvider for SnapshotSewerProvider {
    async fn is_connected(&self, parcel: &Parcel) -> Result<SewerReading, LookupError> {
        match self.readings.get(&parcel.id) {
            Some(reading) => Ok(*reading),
            None => self.network.is_connected(parcel).await,
        }
    }
}

pub(crate) fn parse_dwelling_type(raw: &str) -> Result<DwellingType, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "house" => Ok(DwellingType::House),
        "townhouse" => Ok(DwellingType::Townhouse),
        "unit" => Ok(DwellingType::Unit),
        other => Err(format!(
            "unknown dwelling type '{other}' (expected house, townhouse or unit)"
        )),
    }
}

pub(crate) fn parse_quality(raw: &str) -> Result<QualityTier, String> {
    QualityTier::ordered()
        .into_iter()
        .find(|tier| tier.label().eq_ignore_ascii_case(raw.trim()))
        .ok_or_else(|| format!("unknown quality tier '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use site_scanner::screening::{Strategy, TriState};

    fn batch() -> ScreeningBatch {
        serde_json::from_value(serde_json::json!({
            "sites": [{
                "request": {
                    "parcel": {
                        "id": "lot-7",
                        "address": "7 Tindals Rd",
                        "suburb": "Donvale",
                        "area_sqm": 900.0,
                        "frontage_m": 28.0,
                        "zone_code": "GRZ1"
                    },
                    "strategy": "dual_occupancy",
                    "land_price": "700000",
                    "as_of": "2026-06-30"
                },
                "layers": {
                    "sewer_network": { "nearest_distance_m": 20.0 },
                    "terrain": { "attributes": { "average_slope_pct": "4" } }
                }
            }]
        }))
        .expect("batch deserialises")
    }

    #[tokio::test]
    async fn snapshot_reports_missing_layers_unavailable() {
        let parts = batch().into_parts();
        let parcel = &parts.requests[0].parcel;

        let terrain = parts
            .spatial
            .query(parcel, Layer::Terrain)
            .await
            .expect("terrain supplied");
        assert_eq!(terrain.numeric_attribute("average_slope_pct"), Some(4.0));

        match parts.spatial.query(parcel, Layer::Substations).await {
            Err(LookupError::Unavailable(reason)) => assert!(reason.contains("substations")),
            other => panic!("expected unavailable layer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sewer_falls_back_to_network_layer() {
        let parts = batch().into_parts();
        let parcel = &parts.requests[0].parcel;

        let reading = parts
            .sewer
            .is_connected(parcel)
            .await
            .expect("reading inferred");

        assert_eq!(reading.connected, TriState::Yes);
    }

    #[tokio::test]
    async fn repeated_parcel_keeps_earlier_observations() {
        let mut batch = batch();
        let mut second = batch.sites[0].clone();
        second.request.strategy = Some(Strategy::SingleDwelling);
        second.layers = BTreeMap::from([(
            Layer::Substations,
            LayerObservation {
                nearest_distance_m: Some(900.0),
                ..LayerObservation::default()
            },
        )]);
        batch.sites.push(second);

        let parts = batch.into_parts();
        assert_eq!(parts.requests.len(), 2);
        let parcel = &parts.requests[1].parcel;

        let terrain = parts
            .spatial
            .query(parcel, Layer::Terrain)
            .await
            .expect("terrain kept from the first entry");
        assert_eq!(terrain.numeric_attribute("average_slope_pct"), Some(4.0));
        let substations = parts
            .spatial
            .query(parcel, Layer::Substations)
            .await
            .expect("substations added by the second entry");
        assert_eq!(substations.nearest_distance_m, Some(900.0));
    }

    #[test]
    fn strategy_is_optional_in_the_batch() {
        let batch: ScreeningBatch = serde_json::from_value(serde_json::json!({
            "sites": [{
                "request": {
                    "parcel": {
                        "id": "lot-9",
                        "address": "9 Tindals Rd",
                        "area_sqm": 650.0,
                        "frontage_m": 15.0,
                        "zone_code": "GRZ1"
                    },
                    "land_price": "650000",
                    "as_of": "2026-06-30"
                }
            }]
        }))
        .expect("batch deserialises");

        assert_eq!(batch.sites[0].request.strategy, None);
    }

    #[test]
    fn parses_cli_enums_case_insensitively() {
        assert_eq!(parse_dwelling_type("Townhouse"), Ok(DwellingType::Townhouse));
        assert_eq!(parse_quality("premium"), Ok(QualityTier::Premium));
        assert!(parse_quality("gold").is_err());
    }
}

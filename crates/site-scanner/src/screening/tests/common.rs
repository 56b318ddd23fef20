use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::screening::config::ScreeningConfig;
use crate::screening::constraints::ConstraintEvaluator;
use crate::screening::domain::{
    DwellingType, Era, GeoPoint, Parcel, ParcelId, QualityTier, RenovationStatus, Strategy,
    TriState,
};
use crate::screening::layers::{
    Layer, LayerLookup, LayerObservation, LayerResults, AVERAGE_SLOPE_ATTRIBUTE,
    OVERLAY_CODES_ATTRIBUTE, ZONE_CODE_ATTRIBUTE,
};
use crate::screening::lot_yield::{LotYield, LotYieldRequest, LotYieldResolver};
use crate::screening::market::{Comparable, DateRange};
use crate::screening::pipeline::{ScreeningRequest, SiteScreeningService};
use crate::screening::providers::{
    ComparableStore, LookupError, SewerConnectivityProvider, SewerReading,
    SpatialAttributeProvider,
};

pub(super) type TestService = SiteScreeningService<StaticSpatial, StaticComparables, FixedSewer>;

const METRES_PER_DEGREE: f64 = 111_195.08;

pub(super) fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, 30).expect("valid date")
}

/// Square boundary of roughly `area_sqm` in outer-east Melbourne.
pub(super) fn square_ring(area_sqm: f64) -> Vec<GeoPoint> {
    let lat: f64 = -37.79;
    let lon: f64 = 145.17;
    let side = area_sqm.sqrt();
    let dlat = side / METRES_PER_DEGREE;
    let dlon = side / (METRES_PER_DEGREE * lat.to_radians().cos());
    vec![
        GeoPoint { lat, lon },
        GeoPoint {
            lat,
            lon: lon + dlon,
        },
        GeoPoint {
            lat: lat + dlat,
            lon: lon + dlon,
        },
        GeoPoint {
            lat: lat + dlat,
            lon,
        },
    ]
}

pub(super) fn parcel(id: &str, zone_code: &str, area_sqm: f64, frontage_m: f64) -> Parcel {
    Parcel {
        id: ParcelId(id.to_string()),
        address: format!("{id} Tindals Road"),
        suburb: "Donvale".to_string(),
        geometry: square_ring(area_sqm),
        area_sqm,
        frontage_m,
        zone_code: zone_code.to_string(),
        overlays: BTreeSet::new(),
        listing_area_sqm: None,
        recorded_lot_areas_sqm: Vec::new(),
    }
}

pub(super) fn with_overlays(mut parcel: Parcel, codes: &[&str]) -> Parcel {
    parcel.overlays = codes.iter().map(|code| code.to_string()).collect();
    parcel
}

pub(super) fn distance(metres: f64) -> LayerObservation {
    LayerObservation {
        nearest_distance_m: Some(metres),
        ..LayerObservation::default()
    }
}

pub(super) fn attribute(key: &str, value: &str) -> LayerObservation {
    let mut observation = LayerObservation::default();
    observation
        .attributes
        .insert(key.to_string(), value.to_string());
    observation
}

pub(super) fn intersecting() -> LayerObservation {
    LayerObservation {
        intersects: true,
        ..LayerObservation::default()
    }
}

pub(super) fn slope(percent: f64) -> LayerObservation {
    attribute(AVERAGE_SLOPE_ATTRIBUTE, &percent.to_string())
}

/// Every screening layer answered with nothing in range.
pub(super) fn clear_observations(zone_code: &str) -> BTreeMap<Layer, LayerObservation> {
    BTreeMap::from([
        (Layer::TransmissionLines, distance(1_800.0)),
        (Layer::Substations, distance(1_250.0)),
        (Layer::ContaminationSites, distance(2_400.0)),
        (Layer::PlanningOverlays, attribute(OVERLAY_CODES_ATTRIBUTE, "")),
        (Layer::BushfireProneArea, LayerObservation::default()),
        (Layer::Zones, attribute(ZONE_CODE_ATTRIBUTE, zone_code)),
        (Layer::Terrain, slope(4.0)),
    ])
}

pub(super) fn clear_layers(zone_code: &str) -> LayerResults {
    clear_observations(zone_code)
        .into_iter()
        .map(|(layer, observation)| (layer, LayerLookup::Available(observation)))
        .collect()
}

pub(super) fn evaluator() -> ConstraintEvaluator {
    ConstraintEvaluator::new(ScreeningConfig::default().constraints)
}

pub(super) fn lot_yield_for(
    parcel: &Parcel,
    strategy: Strategy,
    sewer: TriState,
) -> Option<LotYield> {
    LotYieldResolver::new(ScreeningConfig::default().lot_yield)
        .resolve(&LotYieldRequest {
            zone_code: &parcel.zone_code,
            overlays: &parcel.overlays,
            sewer,
            area_sqm: parcel.area_sqm,
            attached: strategy.attached(),
        })
        .ok()
}

pub(super) fn sale(
    id: &str,
    dwelling_type: DwellingType,
    price: Decimal,
    sale_date: NaiveDate,
    land_size_sqm: f64,
    building_area_sqm: f64,
) -> Comparable {
    Comparable {
        id: id.to_string(),
        address: format!("{id} Springvale Road"),
        suburb: "Donvale".to_string(),
        sale_price: price,
        sale_date,
        dwelling_type,
        land_size_sqm: Some(land_size_sqm),
        building_area_sqm: Some(building_area_sqm),
        quality: QualityTier::Standard,
        era: Era::NewBuild,
        renovation: RenovationStatus::Unknown,
    }
}

/// Three recent new townhouses on about 380 sqm each.
pub(super) fn townhouse_sales() -> Vec<Comparable> {
    let sold = |month: u32, day: u32| NaiveDate::from_ymd_opt(2026, month, day).expect("valid date");
    vec![
        sale(
            "th-1",
            DwellingType::Townhouse,
            Decimal::new(1_350_000, 0),
            sold(2, 14),
            380.0,
            200.0,
        ),
        sale(
            "th-2",
            DwellingType::Townhouse,
            Decimal::new(1_400_000, 0),
            sold(3, 21),
            380.0,
            200.0,
        ),
        sale(
            "th-3",
            DwellingType::Townhouse,
            Decimal::new(1_450_000, 0),
            sold(5, 2),
            380.0,
            200.0,
        ),
    ]
}

pub(super) fn request(parcel: Parcel, strategy: Strategy, land_price: i64) -> ScreeningRequest {
    ScreeningRequest {
        parcel,
        strategy: Some(strategy),
        land_price: Decimal::new(land_price, 0),
        quality: None,
        demolition: None,
        as_of: as_of(),
    }
}

/// Fast lookups so retry tests do not wait on the default backoff.
pub(super) fn test_config() -> ScreeningConfig {
    let mut config = ScreeningConfig::default();
    config.lookups.max_retries = 1;
    config.lookups.initial_backoff_ms = 1;
    config.lookups.max_backoff_ms = 5;
    config.lookups.timeout_ms = 1_000;
    config
}

pub(super) fn service(
    spatial: Arc<StaticSpatial>,
    comparables: Vec<Comparable>,
    sewer: FixedSewer,
) -> TestService {
    shared_service(spatial, comparables, Arc::new(sewer))
}

/// Like [`service`] but keeps a handle on the sewer provider for call counts.
pub(super) fn shared_service(
    spatial: Arc<StaticSpatial>,
    comparables: Vec<Comparable>,
    sewer: Arc<FixedSewer>,
) -> TestService {
    SiteScreeningService::new(
        spatial,
        Arc::new(StaticComparables::new(comparables)),
        sewer,
        test_config(),
    )
}

/// Spatial provider answering from a fixed table and counting queries per layer.
pub(super) struct StaticSpatial {
    responses: BTreeMap<Layer, Result<LayerObservation, LookupError>>,
    calls: Mutex<BTreeMap<Layer, usize>>,
}

impl StaticSpatial {
    pub(super) fn clear(zone_code: &str) -> Self {
        Self {
            responses: clear_observations(zone_code)
                .into_iter()
                .map(|(layer, observation)| (layer, Ok(observation)))
                .collect(),
            calls: Mutex::new(BTreeMap::new()),
        }
    }

    pub(super) fn with(mut self, layer: Layer, observation: LayerObservation) -> Self {
        self.responses.insert(layer, Ok(observation));
        self
    }

    pub(super) fn failing(mut self, layer: Layer, error: LookupError) -> Self {
        self.responses.insert(layer, Err(error));
        self
    }

    pub(super) fn calls(&self, layer: Layer) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&layer)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SpatialAttributeProvider for StaticSpatial {
    async fn query(&self, _parcel: &Parcel, layer: Layer) -> Result<LayerObservation, LookupError> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(layer)
            .or_insert(0) += 1;
        self.responses
            .get(&layer)
            .cloned()
            .unwrap_or_else(|| Ok(LayerObservation::default()))
    }
}

pub(super) struct StaticComparables {
    sales: Vec<Comparable>,
}

impl StaticComparables {
    pub(super) fn new(sales: Vec<Comparable>) -> Self {
        Self { sales }
    }
}

#[async_trait]
impl ComparableStore for StaticComparables {
    async fn find(
        &self,
        suburb: &str,
        dwelling_type: DwellingType,
        range: DateRange,
    ) -> Result<Vec<Comparable>, LookupError> {
        Ok(self
            .sales
            .iter()
            .filter(|sale| sale.suburb.eq_ignore_ascii_case(suburb))
            .filter(|sale| sale.dwelling_type == dwelling_type)
            .filter(|sale| range.contains(sale.sale_date))
            .cloned()
            .collect())
    }
}

/// Sewer provider returning one fixed answer and counting queries.
pub(super) struct FixedSewer {
    reading: Result<SewerReading, LookupError>,
    calls: AtomicUsize,
}

impl FixedSewer {
    pub(super) fn new(reading: Result<SewerReading, LookupError>) -> Self {
        Self {
            reading,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn connected() -> Self {
        Self::new(Ok(SewerReading {
            connected: TriState::Yes,
            confidence: 1.0,
        }))
    }

    /// A "no main nearby" reading that sits below the confidence floor.
    pub(super) fn weak_absence() -> Self {
        Self::new(Ok(SewerReading {
            connected: TriState::No,
            confidence: 0.7,
        }))
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SewerConnectivityProvider for FixedSewer {
    async fn is_connected(&self, _parcel: &Parcel) -> Result<SewerReading, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reading.clone()
    }
}

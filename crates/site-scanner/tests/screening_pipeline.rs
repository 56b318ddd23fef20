use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use site_scanner::screening::layers::{
    AVERAGE_SLOPE_ATTRIBUTE, OVERLAY_CODES_ATTRIBUTE, ZONE_CODE_ATTRIBUTE,
};
use site_scanner::screening::providers::NetworkProximitySewerProvider;
use site_scanner::screening::views::{summary_rows, SiteDetailView};
use site_scanner::screening::{
    ComparableStore, CsvComparableStore, GeoPoint, Layer, LayerObservation, LookupError, Parcel,
    ParcelId, Recommendation, ScreeningConfig, ScreeningRequest, SiteScreeningService,
    SpatialAttributeProvider, Strategy,
};

const SALES_CSV: &str = "\
id,address,suburb,sale_price,sale_date,dwelling_type,land_size_sqm,building_area_sqm,quality,era,renovation,parent_id,parent_area_sqm
t1,1/5 Oak St,Donvale,\"$1,380,000\",2026-02-01,Townhouse,380,200,Standard,New build,,P-5,820
t2,2/5 Oak St,Donvale,\"$1,420,000\",2026-02-15,townhouse,380,200,standard,new,,P-5,820
t3,9 Elm Ct,Donvale,1450000,2026-04-20,Villa,390,200,,new build,,,
h1,12 Ash Rd,Donvale,1700000,2026-03-03,House,650,220,standard,late 20th century,renovated,,
";

/// Answers layers from a per-parcel table; anything not listed is clear.
struct TableSpatial {
    layers: BTreeMap<(String, Layer), LayerObservation>,
}

impl TableSpatial {
    fn new() -> Self {
        Self {
            layers: BTreeMap::new(),
        }
    }

    fn set(mut self, parcel: &str, layer: Layer, observation: LayerObservation) -> Self {
        self.layers.insert((parcel.to_string(), layer), observation);
        self
    }
}

fn observation(key: &str, value: &str) -> LayerObservation {
    let mut observation = LayerObservation::default();
    observation
        .attributes
        .insert(key.to_string(), value.to_string());
    observation
}

#[async_trait]
impl SpatialAttributeProvider for TableSpatial {
    async fn query(&self, parcel: &Parcel, layer: Layer) -> Result<LayerObservation, LookupError> {
        if let Some(observation) = self.layers.get(&(parcel.id.0.clone(), layer)) {
            return Ok(observation.clone());
        }
        Ok(match layer {
            Layer::Zones => observation(ZONE_CODE_ATTRIBUTE, &parcel.zone_code),
            Layer::Terrain => observation(AVERAGE_SLOPE_ATTRIBUTE, "3.5"),
            Layer::PlanningOverlays => observation(OVERLAY_CODES_ATTRIBUTE, ""),
            Layer::SewerNetwork => LayerObservation {
                nearest_distance_m: Some(35.0),
                ..LayerObservation::default()
            },
            _ => LayerObservation {
                nearest_distance_m: Some(2_000.0),
                ..LayerObservation::default()
            },
        })
    }
}

fn square(lat: f64, lon: f64, side_m: f64) -> Vec<GeoPoint> {
    let dlat = side_m / 111_195.08;
    let dlon = side_m / (111_195.08 * lat.to_radians().cos());
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
        GeoPoint { lat, lon },
    ]
}

fn parcel(id: &str, address: &str) -> Parcel {
    Parcel {
        id: ParcelId(id.to_string()),
        address: address.to_string(),
        suburb: "Donvale".to_string(),
        geometry: square(-37.79, 145.17, 30.0),
        area_sqm: 900.0,
        frontage_m: 30.0,
        zone_code: "GRZ2".to_string(),
        overlays: Default::default(),
        listing_area_sqm: None,
        recorded_lot_areas_sqm: Vec::new(),
    }
}

fn request(parcel: Parcel) -> ScreeningRequest {
    ScreeningRequest {
        parcel,
        strategy: Some(Strategy::DualOccupancy),
        land_price: dec!(720000),
        quality: None,
        demolition: Some(dec!(25000)),
        as_of: NaiveDate::from_ymd_opt(2026, 6, 30).expect("valid date"),
    }
}

#[test]
fn csv_import_reconciles_parent_titles() {
    let store = CsvComparableStore::from_reader(SALES_CSV.as_bytes()).expect("csv parses");

    assert_eq!(store.comparables().len(), 4);
    let reconciliations = store.reconciliations();
    assert_eq!(reconciliations.len(), 1);
    assert_eq!(reconciliations[0].parent_id, "P-5");
    assert!((reconciliations[0].reconciliation.common_property_sqm - 60.0).abs() < 1e-9);

    let units: Vec<_> = store
        .comparables()
        .iter()
        .filter(|sale| sale.id.starts_with('t'))
        .collect();
    assert!(units
        .iter()
        .all(|unit| unit.land_size_sqm.is_some_and(|land| land < 400.0)));
}

#[tokio::test]
async fn screens_a_batch_against_csv_comparables() {
    let store = CsvComparableStore::from_reader(SALES_CSV.as_bytes()).expect("csv parses");
    let spatial: Arc<dyn SpatialAttributeProvider> = Arc::new(TableSpatial::new().set(
        "near-powerline",
        Layer::TransmissionLines,
        LayerObservation {
            nearest_distance_m: Some(85.0),
            ..LayerObservation::default()
        },
    ));
    let sewer = Arc::new(NetworkProximitySewerProvider::new(Arc::clone(&spatial), 60.0));
    let comparables: Arc<dyn ComparableStore> = Arc::new(store);

    let mut config = ScreeningConfig::default();
    config.lookups.max_concurrent_parcels = 2;
    let service = SiteScreeningService::new(spatial, comparables, sewer, config);

    let report = service
        .screen_batch(vec![
            request(parcel("good", "14 Tindals Rd")),
            request(parcel("near-powerline", "3 Pylon Ct")),
        ])
        .await;

    assert_eq!(report.failures().count(), 0);
    let ranked = report.ranked(service.config().scoring.top_n);
    assert_eq!(ranked.len(), 2);

    let good = &ranked[0];
    assert_eq!(good.parcel.id.0, "good");
    assert_eq!(good.recommendation, Recommendation::Go);
    assert_eq!(good.scenarios.len(), 5);

    let rejected = &ranked[1];
    assert_eq!(rejected.recommendation, Recommendation::NoGo);
    assert_eq!(rejected.verdict.reason.as_deref(), Some("transmission line"));

    let rows = summary_rows(&ranked);
    assert_eq!(rows[0].rank, 1);
    assert_eq!(rows[0].recommendation_label, "GO");
    assert_eq!(rows[1].constraint_status, "REJECT");

    let detail = SiteDetailView::from_site(1, good);
    let json = serde_json::to_value(&detail).expect("detail serialises");
    assert_eq!(json["summary"]["recommendation"], "GO");
    assert_eq!(json["checks"].as_array().map(Vec::len), Some(10));
    assert_eq!(json["scenarios"].as_array().map(Vec::len), Some(5));
}

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::common::*;
use crate::screening::constraints::{rule_keys, CheckOutcome, VerdictStatus};
use crate::screening::domain::{DwellingType, Parcel, Strategy};
use crate::screening::flags::ScreeningFlag;
use crate::screening::layers::Layer;
use crate::screening::market::{Comparable, ValuationBasis, ValuationConfidence};
use crate::screening::pipeline::ScreeningError;
use crate::screening::providers::LookupError;
use crate::screening::scoring::Recommendation;
use crate::screening::views::SiteSummaryRow;

fn viable_parcel(id: &str) -> Parcel {
    parcel(id, "GRZ1", 900.0, 28.0)
}

fn house_sales() -> Vec<Comparable> {
    let sold = |month: u32| NaiveDate::from_ymd_opt(2026, month, 10).expect("valid date");
    vec![
        sale("h-1", DwellingType::House, dec!(1650000), sold(1), 1_900.0, 240.0),
        sale("h-2", DwellingType::House, dec!(1720000), sold(3), 2_050.0, 240.0),
        sale("h-3", DwellingType::House, dec!(1800000), sold(4), 2_000.0, 240.0),
    ]
}

#[tokio::test]
async fn viable_dual_occupancy_is_go_with_a_full_holding_sweep() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());

    let site = service
        .screen(&request(viable_parcel("viable"), Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    assert_eq!(site.verdict.status, VerdictStatus::Pass);
    assert_eq!(site.recommendation, Recommendation::Go);
    assert_eq!(site.scenarios.len(), 5);
    assert_eq!(site.best().map(|best| best.result.holding_months), Some(12));

    let valuation = site.valuation.as_ref().expect("valuation present");
    assert_eq!(valuation.basis, ValuationBasis::Direct);
    assert_eq!(valuation.sample_count, 3);
    assert!(valuation.value_per_unit > dec!(1400000));
    assert!(valuation.value_per_unit < dec!(1410000));

    let lot_yield = site.lot_yield.as_ref().expect("lot yield resolved");
    assert_eq!(lot_yield.max_yield, 2);
    assert!((lot_yield.common_property_sqm - 135.0).abs() < 1e-9);

    let risky: Vec<u32> = site
        .flags
        .iter()
        .filter_map(|flag| match flag {
            ScreeningFlag::HoldingPeriodRisk { holding_months, .. } => Some(*holding_months),
            _ => None,
        })
        .collect();
    assert_eq!(risky, vec![36, 48]);
}

#[tokio::test]
async fn rejected_parcel_skips_valuation_and_feasibility() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());
    let parcel = with_overlays(viable_parcel("heritage"), &["HO7"]);

    let site = service
        .screen(&request(parcel, Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    assert_eq!(site.recommendation, Recommendation::NoGo);
    assert_eq!(site.verdict.reason.as_deref(), Some("overlay"));
    assert!(site.valuation.is_none());
    assert!(site.scenarios.is_empty());
}

#[tokio::test]
async fn layers_are_fetched_once_per_parcel_across_strategies() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let sewer = Arc::new(FixedSewer::connected());
    let service = shared_service(Arc::clone(&spatial), townhouse_sales(), Arc::clone(&sewer));

    for strategy in [Strategy::SingleDwelling, Strategy::DualOccupancy] {
        service
            .screen(&request(viable_parcel("shared"), strategy, 700_000))
            .await
            .expect("site screens");
    }

    for layer in Layer::screening_layers() {
        assert_eq!(spatial.calls(layer), 1, "{} queried more than once", layer.label());
    }
    assert_eq!(spatial.calls(Layer::SewerNetwork), 0);
    assert_eq!(sewer.calls(), 1);
    assert_eq!(service.cache().len(), 7);
}

#[tokio::test]
async fn open_strategy_keeps_the_best_ranked_one() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let sewer = Arc::new(FixedSewer::connected());
    let service = shared_service(Arc::clone(&spatial), townhouse_sales(), Arc::clone(&sewer));
    let mut open = request(viable_parcel("open"), Strategy::DualOccupancy, 700_000);
    open.strategy = None;

    let site = service.screen(&open).await.expect("site screens");

    assert_eq!(site.strategy, Strategy::DualOccupancy);
    assert_eq!(site.recommendation, Recommendation::Go);

    let compared: Vec<(Strategy, Recommendation, Option<&str>)> = site
        .alternatives
        .iter()
        .map(|alternative| {
            (
                alternative.strategy,
                alternative.recommendation,
                alternative.reason.as_deref(),
            )
        })
        .collect();
    assert_eq!(
        compared,
        vec![
            (Strategy::SingleDwelling, Recommendation::NoGo, None),
            (Strategy::Subdivision, Recommendation::NoGo, Some("zoning")),
        ]
    );
    let row = SiteSummaryRow::from_site(1, &site);
    assert!(row
        .alternatives
        .contains(&"Multi-lot subdivision NO_GO: rejected on zoning".to_string()));

    for layer in Layer::screening_layers() {
        assert_eq!(spatial.calls(layer), 1, "{} queried more than once", layer.label());
    }
    assert_eq!(sewer.calls(), 1);
}

#[tokio::test]
async fn open_strategy_batch_entry_records_the_chosen_strategy() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());
    let mut open = request(viable_parcel("open-batch"), Strategy::DualOccupancy, 700_000);
    open.strategy = None;

    let report = service.screen_batch(vec![open]).await;

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].strategy, Some(Strategy::DualOccupancy));
    assert_eq!(report.ranked(25).len(), 1);
}

#[tokio::test]
async fn open_strategy_with_invalid_input_fails_once() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(Arc::clone(&spatial), townhouse_sales(), FixedSewer::connected());
    let mut open = request(viable_parcel("open-free"), Strategy::DualOccupancy, 0);
    open.strategy = None;

    match service.screen(&open).await {
        Err(ScreeningError::InvalidInput { reason, .. }) => assert!(reason.contains("land price")),
        other => panic!("expected invalid input, got {other:?}"),
    }
    assert_eq!(spatial.calls(Layer::Terrain), 0);
}

#[tokio::test]
async fn failing_layer_is_retried_then_reported_unknown() {
    let spatial = Arc::new(
        StaticSpatial::clear("GRZ1").failing(
            Layer::Terrain,
            LookupError::Unavailable("elevation service 503".to_string()),
        ),
    );
    let service = service(Arc::clone(&spatial), townhouse_sales(), FixedSewer::connected());

    let site = service
        .screen(&request(viable_parcel("no-terrain"), Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    assert_eq!(spatial.calls(Layer::Terrain), 2);
    let check = site.verdict.check(rule_keys::SLOPE).expect("slope check present");
    assert_eq!(check.outcome, CheckOutcome::Unknown);
    assert!(check.note.contains("elevation service 503"));
    assert!(site.flags.iter().any(|flag| matches!(
        flag,
        ScreeningFlag::LayerUnavailable {
            layer: Layer::Terrain,
            ..
        }
    )));
    assert!(site
        .flags
        .iter()
        .any(|flag| matches!(flag, ScreeningFlag::UnknownConstraint { rule, .. } if rule == "slope")));
    assert_eq!(site.recommendation, Recommendation::Marginal);
}

#[tokio::test]
async fn batch_keeps_order_and_isolates_invalid_parcels() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());
    let requests = vec![
        request(parcel("empty", "GRZ1", 0.0, 28.0), Strategy::DualOccupancy, 700_000),
        request(viable_parcel("viable"), Strategy::DualOccupancy, 700_000),
        request(
            with_overlays(viable_parcel("heritage"), &["HO7"]),
            Strategy::DualOccupancy,
            700_000,
        ),
    ];

    let report = service.screen_batch(requests).await;

    let ids: Vec<&str> = report
        .entries
        .iter()
        .map(|entry| entry.parcel.0.as_str())
        .collect();
    assert_eq!(ids, vec!["empty", "viable", "heritage"]);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    match failures[0] {
        (parcel, ScreeningError::InvalidInput { reason, .. }) => {
            assert_eq!(parcel.0, "empty");
            assert!(reason.contains("area"));
        }
        other => panic!("expected invalid input, got {other:?}"),
    }

    let ranked = report.ranked(25);
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].parcel.id.0, "viable");
    assert_eq!(ranked[1].recommendation, Recommendation::NoGo);
}

#[tokio::test]
async fn non_positive_land_price_is_invalid_input() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());

    let result = service
        .screen(&request(viable_parcel("free"), Strategy::DualOccupancy, 0))
        .await;

    match result {
        Err(ScreeningError::InvalidInput { reason, .. }) => {
            assert!(reason.contains("land price"))
        }
        other => panic!("expected invalid input, got {other:?}"),
    }
}

#[tokio::test]
async fn consolidated_title_uses_listing_area() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());
    let mut parcel = parcel("consolidated", "GRZ1", 3_000.0, 28.0);
    parcel.listing_area_sqm = Some(900.0);

    let site = service
        .screen(&request(parcel, Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    assert!(site.flags.iter().any(|flag| matches!(
        flag,
        ScreeningFlag::AreaMismatch { listing_area_sqm, .. } if (*listing_area_sqm - 900.0).abs() < 1e-9
    )));
    let lot_yield = site.lot_yield.as_ref().expect("lot yield resolved");
    assert!((lot_yield.gross_area_sqm - 900.0).abs() < 1e-9);
}

#[tokio::test]
async fn recorded_lots_exclude_common_property() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());
    let mut parcel = viable_parcel("strata");
    parcel.recorded_lot_areas_sqm = vec![380.0, 400.0];

    let site = service
        .screen(&request(parcel, Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    let lot_yield = site.lot_yield.as_ref().expect("lot yield resolved");
    assert!((lot_yield.gross_area_sqm - 780.0).abs() < 1e-9);
    assert_eq!(lot_yield.common_property_sqm, 0.0);
    assert_eq!(lot_yield.max_yield, 2);
    assert!(site.flags.iter().any(|flag| matches!(
        flag,
        ScreeningFlag::CommonProperty { common_property_sqm, .. } if (*common_property_sqm - 120.0).abs() < 1e-9
    )));
}

#[tokio::test]
async fn weak_sewer_reading_on_ldrz_leaves_lot_size_open() {
    let spatial = Arc::new(StaticSpatial::clear("LDRZ"));
    let service = service(spatial, house_sales(), FixedSewer::weak_absence());

    let site = service
        .screen(&request(
            parcel("acreage", "LDRZ", 4_000.0, 40.0),
            Strategy::Subdivision,
            1_500_000,
        ))
        .await
        .expect("site screens");

    assert!(site
        .flags
        .iter()
        .any(|flag| matches!(flag, ScreeningFlag::SewerAssumedUnsewered)));
    assert_eq!(
        site.verdict.check(rule_keys::LOT_SIZE).map(|check| check.outcome),
        Some(CheckOutcome::Unknown)
    );
    assert_eq!(site.verdict.status, VerdictStatus::Flag);
    assert_ne!(site.recommendation, Recommendation::Go);
}

#[tokio::test]
async fn sewer_provider_failure_is_treated_as_unknown() {
    let spatial = Arc::new(StaticSpatial::clear("LDRZ"));
    let service = service(
        spatial,
        house_sales(),
        FixedSewer::new(Err(LookupError::RateLimited("slow down".to_string()))),
    );

    let site = service
        .screen(&request(
            parcel("acreage", "LDRZ", 4_000.0, 40.0),
            Strategy::Subdivision,
            1_500_000,
        ))
        .await
        .expect("site screens");

    let lot_yield = site.lot_yield.as_ref().expect("lot yield resolved");
    assert!(lot_yield.sewer_assumed_unsewered);
    assert_eq!(lot_yield.sewered_max_yield, Some(2));
}

#[tokio::test]
async fn thin_townhouse_market_falls_back_to_houses() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, house_sales(), FixedSewer::connected());

    let site = service
        .screen(&request(viable_parcel("fallback"), Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    let valuation = site.valuation.as_ref().expect("valuation present");
    assert_eq!(
        valuation.basis,
        ValuationBasis::HouseFallback {
            target: DwellingType::Townhouse
        }
    );
    assert_eq!(valuation.confidence, ValuationConfidence::Low);
    assert!(site.flags.iter().any(|flag| matches!(
        flag,
        ScreeningFlag::ComparableFallback {
            target: DwellingType::Townhouse,
            sample_count: 3
        }
    )));
}

#[tokio::test]
async fn no_comparables_flags_valuation_and_scores_no_go() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1"));
    let service = service(spatial, Vec::new(), FixedSewer::connected());

    let site = service
        .screen(&request(viable_parcel("unpriced"), Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    assert_eq!(site.recommendation, Recommendation::NoGo);
    assert!(site.valuation.is_none());
    assert!(site
        .flags
        .iter()
        .any(|flag| matches!(flag, ScreeningFlag::ValuationUnavailable { .. })));
}

#[tokio::test]
async fn bushfire_prone_site_carries_construction_uplift() {
    let spatial = Arc::new(StaticSpatial::clear("GRZ1").with(Layer::BushfireProneArea, intersecting()));
    let service = service(spatial, townhouse_sales(), FixedSewer::connected());

    let site = service
        .screen(&request(viable_parcel("bal"), Strategy::DualOccupancy, 700_000))
        .await
        .expect("site screens");

    assert_eq!(site.verdict.status, VerdictStatus::Flag);
    assert!(site
        .flags
        .iter()
        .any(|flag| matches!(flag, ScreeningFlag::BushfireUplift { .. })));
    let best = site.best().expect("scenario present");
    assert_eq!(best.result.costs.construction, dec!(1080000));
    assert!(best.result.profit > Decimal::ZERO);
}

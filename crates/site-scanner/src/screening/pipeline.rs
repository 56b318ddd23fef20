use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use super::config::ScreeningConfig;
use super::constraints::{rule_keys, CheckOutcome, ConstraintEvaluator};
use super::domain::{DwellingType, Parcel, ParcelId, QualityTier, Strategy, TriState};
use super::feasibility::{
    FeasibilityError, FeasibilityInputs, FeasibilityModel, HoldingPeriodSweep, ProjectBrief,
};
use super::flags::ScreeningFlag;
use super::layers::{Layer, LayerLookup, LayerResults, ZONE_CODE_ATTRIBUTE};
use super::lookup::{LayerCache, OnceCache, RetryPolicy};
use super::lot_yield::{LotYieldRequest, LotYieldResolver};
use super::market::{
    reconcile_common_property, AdjustedValuation, Comparable, ComparableAdjuster, DateRange,
    MarketError, TargetProfile, ValuationBasis,
};
use super::providers::{ComparableStore, SewerConnectivityProvider, SpatialAttributeProvider};
use super::scoring::{
    rank_sites, ScoreAggregator, ScoredSite, SiteAssessment, StrategyAlternative,
};

/// One parcel to screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRequest {
    pub parcel: Parcel,
    /// Strategy to test. When absent every strategy is screened and the best one kept.
    #[serde(default)]
    pub strategy: Option<Strategy>,
    pub land_price: Decimal,
    #[serde(default)]
    pub quality: Option<QualityTier>,
    #[serde(default)]
    pub demolition: Option<Decimal>,
    pub as_of: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
pub enum ScreeningError {
    #[error("parcel {parcel}: {reason}")]
    InvalidInput { parcel: ParcelId, reason: String },
    #[error("parcel {parcel}: feasibility inputs rejected: {source}")]
    Feasibility {
        parcel: ParcelId,
        #[source]
        source: FeasibilityError,
    },
}

/// Per-parcel outcome inside a batch. A failed parcel never aborts its siblings.
#[derive(Debug)]
pub struct BatchEntry {
    pub parcel: ParcelId,
    /// Requested strategy, or the one selected when every strategy was compared.
    pub strategy: Option<Strategy>,
    pub outcome: Result<ScoredSite, ScreeningError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn scored(&self) -> impl Iterator<Item = &ScoredSite> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ParcelId, &ScreeningError)> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.outcome.as_ref().err().map(|error| (&entry.parcel, error)))
    }

    /// Successful sites ordered for review, truncated to `top_n`.
    pub fn ranked(&self, top_n: usize) -> Vec<ScoredSite> {
        rank_sites(self.scored().cloned().collect(), top_n)
    }
}

/// Orchestrates constraint evaluation, valuation, feasibility and scoring for parcels.
pub struct SiteScreeningService<S: ?Sized, C: ?Sized, W: ?Sized> {
    spatial: Arc<S>,
    comparables: Arc<C>,
    sewer: Arc<W>,
    config: ScreeningConfig,
    evaluator: ConstraintEvaluator,
    resolver: LotYieldResolver,
    adjuster: ComparableAdjuster,
    sweep: HoldingPeriodSweep,
    aggregator: ScoreAggregator,
    retry: RetryPolicy,
    cache: LayerCache,
    sewer_cache: OnceCache<ParcelId, TriState>,
}

impl<S, C, W> SiteScreeningService<S, C, W>
where
    S: SpatialAttributeProvider + ?Sized,
    C: ComparableStore + ?Sized,
    W: SewerConnectivityProvider + ?Sized,
{
    pub fn new(spatial: Arc<S>, comparables: Arc<C>, sewer: Arc<W>, config: ScreeningConfig) -> Self {
        let evaluator = ConstraintEvaluator::new(config.constraints.clone());
        Self::with_evaluator(spatial, comparables, sewer, config, evaluator)
    }

    /// Uses a caller-supplied evaluator, e.g. one built from a custom rule registry.
    pub fn with_evaluator(
        spatial: Arc<S>,
        comparables: Arc<C>,
        sewer: Arc<W>,
        config: ScreeningConfig,
        evaluator: ConstraintEvaluator,
    ) -> Self {
        let model = FeasibilityModel::from_config(&config.feasibility);
        Self {
            resolver: LotYieldResolver::new(config.lot_yield.clone()),
            adjuster: ComparableAdjuster::new(
                config.market.clone(),
                config.feasibility.cost_benchmarks.clone(),
            ),
            sweep: HoldingPeriodSweep::new(model, config.scenarios.finance_to_profit_limit),
            aggregator: ScoreAggregator::new(config.scoring.clone()),
            retry: RetryPolicy::from_config(&config.lookups),
            cache: LayerCache::new(),
            sewer_cache: OnceCache::new(),
            evaluator,
            spatial,
            comparables,
            sewer,
            config,
        }
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    /// Screens every request with bounded concurrency. Results keep request order.
    pub async fn screen_batch(&self, requests: Vec<ScreeningRequest>) -> BatchReport {
        let limit = self.config.lookups.max_concurrent_parcels.max(1);
        let total = requests.len();

        let entries: Vec<BatchEntry> = stream::iter(requests)
            .map(|request| async move {
                let outcome = self.screen(&request).await;
                if let Err(error) = &outcome {
                    warn!(parcel = %request.parcel.id, %error, "parcel screening failed");
                }
                BatchEntry {
                    parcel: request.parcel.id,
                    strategy: outcome
                        .as_ref()
                        .ok()
                        .map(|site| site.strategy)
                        .or(request.strategy),
                    outcome,
                }
            })
            .buffered(limit)
            .collect()
            .await;

        let failed = entries.iter().filter(|entry| entry.outcome.is_err()).count();
        info!(total, failed, "screening batch complete");
        BatchReport { entries }
    }

    /// Screens under the requested strategy, or under all of them when none is given.
    pub async fn screen(&self, request: &ScreeningRequest) -> Result<ScoredSite, ScreeningError> {
        match request.strategy {
            Some(strategy) => self.screen_strategy(request, strategy).await,
            None => self.screen_best_strategy(request).await,
        }
    }

    pub async fn screen_strategy(
        &self,
        request: &ScreeningRequest,
        strategy: Strategy,
    ) -> Result<ScoredSite, ScreeningError> {
        let span = info_span!(
            "screen_parcel",
            parcel = %request.parcel.id,
            strategy = strategy.label()
        );
        self.screen_inner(request, strategy).instrument(span).await
    }

    /// Screens the parcel under every strategy and keeps the one that ranks first. The
    /// others are recorded as alternatives on the returned site. Layer and sewer lookups
    /// are shared between strategies through the caches.
    pub async fn screen_best_strategy(
        &self,
        request: &ScreeningRequest,
    ) -> Result<ScoredSite, ScreeningError> {
        validate(request)?;
        let outcomes = join_all(
            Strategy::ordered()
                .into_iter()
                .map(|strategy| self.screen_strategy(request, strategy)),
        )
        .await;

        let mut screened = Vec::new();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(site) => screened.push(site),
                Err(error) => {
                    warn!(parcel = %request.parcel.id, %error, "strategy screening failed");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        let alternatives: Vec<StrategyAlternative> =
            screened.iter().map(StrategyAlternative::from).collect();
        let Some(mut best) = rank_sites(screened, 1).into_iter().next() else {
            return Err(first_error.unwrap_or_else(|| ScreeningError::InvalidInput {
                parcel: request.parcel.id.clone(),
                reason: "no strategy could be screened".to_string(),
            }));
        };
        let chosen = best.strategy;
        best.alternatives = alternatives
            .into_iter()
            .filter(|alternative| alternative.strategy != chosen)
            .collect();

        info!(
            parcel = %best.parcel.id,
            strategy = best.strategy.label(),
            recommendation = best.recommendation.label(),
            "best strategy selected"
        );
        Ok(best)
    }

    async fn screen_inner(
        &self,
        request: &ScreeningRequest,
        strategy: Strategy,
    ) -> Result<ScoredSite, ScreeningError> {
        validate(request)?;
        let parcel = &request.parcel;
        let mut flags = Vec::new();

        let site_area = self.site_area(parcel, &mut flags);

        let (layers, sewer) = tokio::join!(self.fetch_layers(parcel), self.sewer_status(parcel));
        for layer in layers.unavailable_layers() {
            flags.push(ScreeningFlag::LayerUnavailable {
                layer,
                reason: layers.unavailable_reason(layer),
            });
        }

        let zone_code = effective_zone(parcel, &layers);
        let lot_yield = match self.resolver.resolve(&LotYieldRequest {
            zone_code: &zone_code,
            overlays: &parcel.overlays,
            sewer,
            area_sqm: site_area.area_sqm,
            attached: strategy.attached() && !site_area.common_property_excluded,
        }) {
            Ok(lot_yield) => Some(lot_yield),
            Err(error) => {
                debug!(%error, "lot yield unresolved");
                None
            }
        };
        if lot_yield
            .as_ref()
            .is_some_and(|lot_yield| lot_yield.sewer_assumed_unsewered)
        {
            flags.push(ScreeningFlag::SewerAssumedUnsewered);
        }

        let verdict = self
            .evaluator
            .evaluate(parcel, &layers, strategy, lot_yield.as_ref());
        flags.extend(verdict.unknown_checks().map(|check| ScreeningFlag::UnknownConstraint {
            rule: check.name.clone(),
            note: check.note.clone(),
        }));
        let bushfire_prone = verdict
            .check(rule_keys::BUSHFIRE_PRONE_AREA)
            .is_some_and(|check| check.outcome == CheckOutcome::Fail);

        let mut assessment = SiteAssessment {
            parcel: parcel.clone(),
            strategy,
            verdict,
            lot_yield,
            valuation: None,
            scenarios: Vec::new(),
            flags,
        };

        if assessment.verdict.is_rejected() {
            info!(
                reason = assessment.verdict.reason.as_deref().unwrap_or_default(),
                "parcel rejected by constraints"
            );
            return Ok(self.aggregator.score(assessment));
        }

        let max_yield = assessment
            .lot_yield
            .as_ref()
            .map(|lot_yield| lot_yield.max_yield)
            .unwrap_or_else(|| strategy.minimum_lots());
        let unit_count = strategy.planned_lots(max_yield);
        let product = strategy.end_product();
        let quality = request
            .quality
            .unwrap_or(self.config.feasibility.default_quality);
        let land_per_unit = match &assessment.lot_yield {
            Some(lot_yield) => lot_yield.land_per_lot_sqm(unit_count),
            None => site_area.area_sqm / f64::from(unit_count),
        };
        let building_area = self
            .config
            .feasibility
            .buildable_area_for(product)
            .to_f64()
            .unwrap_or_default();
        let target = TargetProfile::new_build(product, quality, land_per_unit, building_area);

        let valuation = match self.value(parcel, &target, request.as_of).await {
            Ok(valuation) => valuation,
            Err(error) => {
                warn!(%error, "valuation unavailable");
                assessment.flags.push(ScreeningFlag::ValuationUnavailable {
                    reason: error.to_string(),
                });
                return Ok(self.aggregator.score(assessment));
            }
        };
        if let ValuationBasis::HouseFallback { target } = valuation.basis {
            assessment.flags.push(ScreeningFlag::ComparableFallback {
                target,
                sample_count: valuation.sample_count,
            });
        }
        if bushfire_prone {
            assessment.flags.push(ScreeningFlag::BushfireUplift {
                uplift: self.config.feasibility.bushfire_construction_uplift,
            });
        }

        let brief = ProjectBrief {
            land_price: request.land_price,
            unit_count,
            end_value_per_unit: valuation.value_per_unit,
            dwelling_type: product,
            quality: Some(quality),
            demolition: request.demolition,
            bushfire_prone,
            holding_months: self
                .config
                .scenarios
                .holding_months
                .first()
                .copied()
                .unwrap_or(12),
        };
        let inputs = FeasibilityInputs::from_brief(&self.config.feasibility, &brief);
        let scenarios = self
            .sweep
            .sweep(&inputs, &self.config.scenarios.holding_months)
            .map_err(|source| ScreeningError::Feasibility {
                parcel: parcel.id.clone(),
                source,
            })?;

        assessment
            .flags
            .extend(scenarios.iter().filter(|outcome| outcome.holding_risk).map(|outcome| {
                ScreeningFlag::HoldingPeriodRisk {
                    holding_months: outcome.result.holding_months,
                    finance: outcome.result.costs.finance,
                    profit: outcome.result.profit,
                }
            }));
        assessment.valuation = Some(valuation);
        assessment.scenarios = scenarios;

        let scored = self.aggregator.score(assessment);
        info!(
            recommendation = scored.recommendation.label(),
            rank_score = scored.rank_score,
            flags = scored.flags.len(),
            "parcel scored"
        );
        Ok(scored)
    }

    /// Area used for yield. Consolidated titles fall back to the listing area and recorded
    /// common property is excluded.
    fn site_area(&self, parcel: &Parcel, flags: &mut Vec<ScreeningFlag>) -> SiteArea {
        let mut area_sqm = parcel.area_sqm;

        if let Some(listing) = parcel.listing_area_sqm.filter(|area| *area > 0.0) {
            if area_sqm > listing * self.config.lot_yield.area_mismatch_ratio {
                flags.push(ScreeningFlag::AreaMismatch {
                    gis_area_sqm: area_sqm,
                    listing_area_sqm: listing,
                });
                area_sqm = listing;
            }
        }

        let mut common_property_excluded = false;
        if !parcel.recorded_lot_areas_sqm.is_empty() {
            let reconciliation = reconcile_common_property(area_sqm, &parcel.recorded_lot_areas_sqm);
            if reconciliation.needs_review() {
                flags.push(ScreeningFlag::CommonProperty {
                    parent_area_sqm: reconciliation.parent_area_sqm,
                    lots_total_sqm: reconciliation.lots_total_sqm,
                    common_property_sqm: reconciliation.common_property_sqm,
                });
            }
            if reconciliation.has_common_property() {
                area_sqm = reconciliation.lots_total_sqm;
                common_property_excluded = true;
            }
        }

        SiteArea {
            area_sqm,
            common_property_excluded,
        }
    }

    async fn fetch_layers(&self, parcel: &Parcel) -> LayerResults {
        let lookups = Layer::screening_layers().into_iter().map(|layer| async move {
            let lookup = self
                .cache
                .get_or_fetch(&parcel.id, layer, || async {
                    match self
                        .retry
                        .run(layer.label(), || self.spatial.query(parcel, layer))
                        .await
                    {
                        Ok(observation) => LayerLookup::Available(observation),
                        Err(error) => LayerLookup::Unavailable {
                            reason: error.to_string(),
                        },
                    }
                })
                .await;
            (layer, lookup)
        });

        join_all(lookups).await.into_iter().collect()
    }

    async fn sewer_status(&self, parcel: &Parcel) -> TriState {
        self.sewer_cache
            .get_or_fetch(parcel.id.clone(), || async {
                match self
                    .retry
                    .run("sewer_connectivity", || self.sewer.is_connected(parcel))
                    .await
                {
                    Ok(reading) => reading.status(self.config.lot_yield.sewer_confidence_floor),
                    Err(error) => {
                        debug!(%error, "sewer status unknown");
                        TriState::Unknown
                    }
                }
            })
            .await
    }

    /// Fetches comparables for the target product, widening to houses when the direct
    /// sample is thin, then adjusts them.
    async fn value(
        &self,
        parcel: &Parcel,
        target: &TargetProfile,
        as_of: NaiveDate,
    ) -> Result<AdjustedValuation, MarketError> {
        let range = DateRange::trailing_months(as_of, self.config.market.lookback_months);

        let mut sales = self.find_sales(parcel, target.dwelling_type, range).await?;
        if target.dwelling_type != DwellingType::House
            && sales.len() < self.config.market.min_sample
        {
            match self.find_sales(parcel, DwellingType::House, range).await {
                Ok(houses) => sales.extend(houses),
                Err(error) if sales.is_empty() => return Err(error),
                Err(error) => debug!(%error, "house fallback lookup failed"),
            }
        }

        self.adjuster.adjust(&sales, target, as_of)
    }

    async fn find_sales(
        &self,
        parcel: &Parcel,
        dwelling_type: DwellingType,
        range: DateRange,
    ) -> Result<Vec<Comparable>, MarketError> {
        self.retry
            .run("comparable_search", || {
                self.comparables.find(&parcel.suburb, dwelling_type, range)
            })
            .await
            .map_err(|error| MarketError::StoreUnavailable(error.to_string()))
    }
}

struct SiteArea {
    area_sqm: f64,
    common_property_excluded: bool,
}

fn effective_zone(parcel: &Parcel, layers: &LayerResults) -> String {
    let declared = parcel.zone_code.trim();
    if !declared.is_empty() {
        return declared.to_string();
    }
    layers
        .observation(Layer::Zones)
        .and_then(|observation| observation.attribute(ZONE_CODE_ATTRIBUTE))
        .unwrap_or_default()
        .to_string()
}

fn validate(request: &ScreeningRequest) -> Result<(), ScreeningError> {
    let parcel = &request.parcel;
    let invalid = |reason: &str| ScreeningError::InvalidInput {
        parcel: parcel.id.clone(),
        reason: reason.to_string(),
    };

    if parcel.id.0.trim().is_empty() {
        return Err(invalid("parcel id is empty"));
    }
    if !parcel.area_sqm.is_finite() || parcel.area_sqm <= 0.0 {
        return Err(invalid("area must be a positive number"));
    }
    if !parcel.frontage_m.is_finite() || parcel.frontage_m < 0.0 {
        return Err(invalid("frontage must not be negative"));
    }
    if parcel
        .listing_area_sqm
        .is_some_and(|area| !area.is_finite() || area < 0.0)
    {
        return Err(invalid("listing area must not be negative"));
    }
    if parcel
        .recorded_lot_areas_sqm
        .iter()
        .any(|area| !area.is_finite() || *area < 0.0)
    {
        return Err(invalid("recorded lot areas must not be negative"));
    }
    if request.land_price <= Decimal::ZERO {
        return Err(invalid("land price must be greater than zero"));
    }
    if request
        .demolition
        .is_some_and(|demolition| demolition < Decimal::ZERO)
    {
        return Err(invalid("demolition cost must not be negative"));
    }
    Ok(())
}

//! Planning entry points, including the comparison across carriers.
//!
//! Each carrier is planned independently with its own rate tiers. The runs
//! share nothing but the read-only snapshot, so they execute on a bounded
//! worker pool; results are merged in carrier order, which keeps the final
//! ranking deterministic.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::catalog::CatalogSnapshot;
use crate::error::PlanError;
use crate::model::Carrier;
use crate::planner::{
    CandidateSet, PlanOutcome, PlanRequest, PlannerConfig, generate_candidates, rank_candidates,
    resolve_containers, select_plan,
};

/// Shipment planner with its own worker pool for carrier runs.
pub struct Planner {
    config: PlannerConfig,
    pool: ThreadPool,
}

impl Planner {
    /// Creates a planner running at most `workers` carrier plans at a time.
    pub fn new(config: PlannerConfig, workers: usize) -> Result<Self, PlanError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|idx| format!("carrier-worker-{idx}"))
            .build()
            .map_err(|err| PlanError::WorkerPool(err.to_string()))?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans within one rate scope.
    ///
    /// With `request.carrier` set, only that carrier's tiers price the
    /// candidates and they are tagged with it; otherwise every tier of the
    /// zone is eligible.
    pub fn plan(
        &self,
        snapshot: &CatalogSnapshot,
        request: &PlanRequest,
    ) -> Result<PlanOutcome, PlanError> {
        let carrier = match request.carrier {
            Some(id) => Some(snapshot.carrier(id).ok_or(PlanError::UnknownCarrier(id))?),
            None => None,
        };
        info!(
            zone = %request.zone,
            units = request.demand.total(),
            carrier = ?request.carrier,
            "planning shipment"
        );

        let mut set = generate_candidates(snapshot, request, request.carrier, &self.config)?;
        if let Some(carrier) = carrier {
            set.tag_carrier(carrier);
        }
        Ok(select_plan(set, &self.config))
    }

    /// Plans every eligible carrier separately and ranks all of their
    /// candidates together.
    ///
    /// Eligible carriers are active and have at least one rate tier in the
    /// zone, narrowed to `request.carrier_ids` when given. Each carrier
    /// contributes its best candidate and its alternatives to the global
    /// ranking. A request scoped to one carrier (`request.carrier`) belongs to
    /// [`Planner::plan`] and is rejected here.
    pub fn plan_across_carriers(
        &self,
        snapshot: &CatalogSnapshot,
        request: &PlanRequest,
    ) -> Result<PlanOutcome, PlanError> {
        if request.carrier.is_some() {
            return Err(PlanError::ConflictingCarrierScope);
        }
        resolve_containers(&snapshot.containers, request.container_codes.as_deref())?;
        let carriers = carriers_in_scope(snapshot, request)?;
        if carriers.is_empty() {
            info!(zone = %request.zone, "no carrier serves the zone");
            return Ok(PlanOutcome::NoCarriersAvailable {
                zone_id: request.zone,
            });
        }
        info!(
            zone = %request.zone,
            units = request.demand.total(),
            carriers = carriers.len(),
            "planning shipment across carriers"
        );

        let per_carrier: Vec<CandidateSet> = self.pool.install(|| {
            carriers
                .par_iter()
                .map(|carrier| {
                    let mut set =
                        generate_candidates(snapshot, request, Some(carrier.id), &self.config)?;
                    set.tag_carrier(carrier);
                    debug!(
                        carrier = %carrier.code,
                        candidates = set.candidates.len(),
                        "carrier run finished"
                    );
                    Ok(set)
                })
                .collect::<Result<Vec<_>, PlanError>>()
        })?;

        let keep = 1 + self.config.max_alternatives;
        let mut merged = CandidateSet::default();
        for set in per_carrier {
            let CandidateSet {
                mut candidates,
                rejections,
                catalog_issues,
            } = set;
            rank_candidates(&mut candidates);
            candidates.truncate(keep);
            merged.candidates.extend(candidates);
            merged.rejections.extend(rejections);
            merged.push_issues(&catalog_issues);
        }

        Ok(select_plan(merged, &self.config))
    }
}

/// Active carriers with tiers in the zone, in catalog order.
fn carriers_in_scope<'a>(
    snapshot: &'a CatalogSnapshot,
    request: &PlanRequest,
) -> Result<Vec<&'a Carrier>, PlanError> {
    let serving = snapshot.carriers.iter().filter(|carrier| {
        carrier.active && snapshot.rates.carrier_serves_zone(carrier.id, request.zone)
    });

    match request.carrier_ids.as_deref() {
        Some(ids) if !ids.is_empty() => {
            if let Some(unknown) = ids.iter().find(|id| snapshot.carrier(**id).is_none()) {
                return Err(PlanError::UnknownCarrier(*unknown));
            }
            Ok(serving.filter(|carrier| ids.contains(&carrier.id)).collect())
        }
        _ => Ok(serving.collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogRepository, InMemoryCatalog};
    use crate::model::{BoxCatalog, BoxSpec, CarrierId, ContainerSpec, RateTier, ZoneId};
    use crate::pricing::RateTable;
    use crate::types::{ItemCounts, ItemType};

    fn carrier(id: u32, code: &str, name: &str, active: bool) -> Carrier {
        Carrier {
            id: CarrierId(id),
            code: code.to_string(),
            name: name.to_string(),
            active,
        }
    }

    fn tier(zone: u32, carrier: u32, price: f64) -> RateTier {
        RateTier {
            zone_id: ZoneId(zone),
            container_code: "full".into(),
            carrier_id: Some(CarrierId(carrier)),
            min_count: 1,
            max_count: 10,
            price_per_container: price,
        }
    }

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot {
            boxes: BoxCatalog::default()
                .with(ItemType::Tower, BoxSpec::new(60, 30, 25, 10.0).unwrap()),
            containers: vec![
                ContainerSpec::new("full", "Full pallet", (120, 100), 220, 1200.0).unwrap(),
            ],
            carriers: vec![
                carrier(1, "steady", "Steady Freight", true),
                carrier(2, "quick", "Quick Cargo", true),
                carrier(3, "dormant", "Dormant Lines", false),
                carrier(4, "north", "North Haul", true),
            ],
            rates: RateTable::new(vec![
                tier(1, 1, 60.0),
                tier(1, 2, 50.0),
                tier(1, 3, 10.0),
                tier(2, 4, 40.0),
            ])
            .unwrap(),
        }
    }

    fn planner() -> Planner {
        Planner::new(PlannerConfig::default(), 2).unwrap()
    }

    fn carrier_code(outcome: &PlanOutcome) -> String {
        let plan = outcome.plan().expect("expected a plan");
        plan.best.carrier.as_ref().unwrap().code.clone()
    }

    #[test]
    fn cheapest_active_carrier_wins_across_carriers() {
        let request = PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0));
        let outcome = planner().plan_across_carriers(&snapshot(), &request).unwrap();

        let plan = outcome.plan().unwrap();
        assert_eq!(carrier_code(&outcome), "quick");
        assert!((plan.best.total_price - 50.0).abs() < 1e-9);
        let others: Vec<&str> = plan
            .alternatives
            .iter()
            .map(|c| c.carrier.as_ref().unwrap().code.as_str())
            .collect();
        // the inactive carrier and the carrier of another zone never show up
        assert_eq!(others, vec!["steady"]);
    }

    #[test]
    fn explicit_carrier_set_narrows_the_comparison() {
        let request = PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0))
            .with_carrier_ids(vec![CarrierId(1)]);
        let outcome = planner().plan_across_carriers(&snapshot(), &request).unwrap();
        assert_eq!(carrier_code(&outcome), "steady");
        assert!(outcome.plan().unwrap().alternatives.is_empty());
    }

    #[test]
    fn unknown_carrier_id_fails_fast() {
        let request = PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0))
            .with_carrier_ids(vec![CarrierId(1), CarrierId(42)]);
        let err = planner()
            .plan_across_carriers(&snapshot(), &request)
            .unwrap_err();
        assert!(matches!(err, PlanError::UnknownCarrier(CarrierId(42))));

        let request =
            PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0)).with_carrier(CarrierId(42));
        assert!(matches!(
            planner().plan(&snapshot(), &request),
            Err(PlanError::UnknownCarrier(CarrierId(42)))
        ));
    }

    #[test]
    fn single_carrier_request_is_not_compared_across_carriers() {
        let request =
            PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0)).with_carrier(CarrierId(1));
        let err = planner()
            .plan_across_carriers(&snapshot(), &request)
            .unwrap_err();
        assert!(matches!(err, PlanError::ConflictingCarrierScope));
    }

    #[test]
    fn zone_without_active_carriers_reports_no_carriers() {
        let request = PlanRequest::new(ZoneId(9), ItemCounts::new(5, 0, 0));
        let outcome = planner().plan_across_carriers(&snapshot(), &request).unwrap();
        assert_eq!(outcome, PlanOutcome::NoCarriersAvailable { zone_id: ZoneId(9) });

        // only the inactive carrier is requested
        let request = PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0))
            .with_carrier_ids(vec![CarrierId(3)]);
        let outcome = planner().plan_across_carriers(&snapshot(), &request).unwrap();
        assert!(matches!(outcome, PlanOutcome::NoCarriersAvailable { .. }));
    }

    #[test]
    fn empty_demand_across_carriers_has_no_candidates() {
        let request = PlanRequest::new(ZoneId(1), ItemCounts::zero());
        let outcome = planner().plan_across_carriers(&snapshot(), &request).unwrap();
        match outcome {
            PlanOutcome::NoCandidates { rejections, .. } => {
                assert_eq!(rejections.len(), 2);
                assert!(rejections.iter().all(|r| r.carrier_id.is_some()));
            }
            other => panic!("expected no candidates, got {other:?}"),
        }
    }

    #[test]
    fn single_carrier_plan_is_tagged() {
        let request =
            PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0)).with_carrier(CarrierId(1));
        let outcome = planner().plan(&snapshot(), &request).unwrap();
        assert_eq!(carrier_code(&outcome), "steady");
        assert!((outcome.plan().unwrap().best.total_price - 60.0).abs() < 1e-9);

        let untagged = planner()
            .plan(&snapshot(), &PlanRequest::new(ZoneId(1), ItemCounts::new(5, 0, 0)))
            .unwrap();
        assert!(untagged.plan().unwrap().best.carrier.is_none());
    }

    #[test]
    fn results_do_not_depend_on_pool_size() {
        let request = PlanRequest::new(ZoneId(1), ItemCounts::new(30, 0, 0));
        let snapshot = snapshot();
        let single = Planner::new(PlannerConfig::default(), 1)
            .unwrap()
            .plan_across_carriers(&snapshot, &request)
            .unwrap();
        let wide = Planner::new(PlannerConfig::default(), 8)
            .unwrap()
            .plan_across_carriers(&snapshot, &request)
            .unwrap();
        assert_eq!(single, wide);
    }

    #[test]
    fn demo_dataset_compares_italian_carriers() {
        crate::logging::init_test();
        let catalog = InMemoryCatalog::load(None).unwrap();
        let snapshot = catalog.snapshot(ZoneId(101)).unwrap();
        let request = PlanRequest::new(ZoneId(101), ItemCounts::new(10, 5, 20));

        let outcome = planner().plan_across_carriers(&snapshot, &request).unwrap();

        let plan = outcome.plan().unwrap();
        assert_eq!(carrier_code(&outcome), "budget_freight");
        assert!(plan.best.total_price > 0.0);
        assert!(plan.alternatives.len() <= PlannerConfig::DEFAULT_MAX_ALTERNATIVES);
        assert!(
            plan.alternatives
                .windows(2)
                .all(|pair| pair[0].total_price <= pair[1].total_price)
        );
        // pallet types without Italian rates are rejected per carrier
        assert!(plan.rejections.iter().any(|r| r.container_code.as_str() == "half"));
    }
}

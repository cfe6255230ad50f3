//! Candidate search, plan selection and recommendations for one rate scope.
//!
//! A candidate is a fully priced way to ship the whole demand: either pallets
//! of a single type, or a mix of two types where the first type is packed up
//! to a small count and the second type takes the rest.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::catalog::CatalogSnapshot;
use crate::error::PlanError;
use crate::geometry::CatalogIssue;
use crate::model::{Carrier, CarrierId, ContainerCode, ContainerSpec, ZoneId};
use crate::optimizer::{
    ContainerPacker, ContainerUtilization, LoadedContainer, PackError, PackingConfig, PackingRun,
    PlanWarning,
};
use crate::pricing::Quote;
use crate::types::ItemCounts;

/// Tunables of the candidate search and selection.
#[derive(Copy, Clone, Debug)]
pub struct PlannerConfig {
    /// Number of cheapest mono-type pallet types considered for mixing
    pub mix_max_types: usize,
    /// Largest pallet count tried per type inside a mix
    pub mix_max_per_type: usize,
    /// Number of alternatives listed after the best candidate
    pub max_alternatives: usize,
    /// Largest relative surcharge (0.03 = 3%) a recommended alternative may cost
    pub recommend_max_delta: f64,
    pub packing: PackingConfig,
}

impl PlannerConfig {
    pub const DEFAULT_MIX_MAX_TYPES: usize = 3;
    pub const DEFAULT_MIX_MAX_PER_TYPE: usize = 3;
    pub const DEFAULT_MAX_ALTERNATIVES: usize = 5;
    pub const DEFAULT_RECOMMEND_MAX_DELTA: f64 = 0.03;

    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder::default()
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mix_max_types: Self::DEFAULT_MIX_MAX_TYPES,
            mix_max_per_type: Self::DEFAULT_MIX_MAX_PER_TYPE,
            max_alternatives: Self::DEFAULT_MAX_ALTERNATIVES,
            recommend_max_delta: Self::DEFAULT_RECOMMEND_MAX_DELTA,
            packing: PackingConfig::default(),
        }
    }
}

/// Builder for PlannerConfig.
#[derive(Clone, Debug, Default)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn mix_max_types(mut self, value: usize) -> Self {
        self.config.mix_max_types = value;
        self
    }

    pub fn mix_max_per_type(mut self, value: usize) -> Self {
        self.config.mix_max_per_type = value;
        self
    }

    pub fn max_alternatives(mut self, value: usize) -> Self {
        self.config.max_alternatives = value;
        self
    }

    pub fn recommend_max_delta(mut self, value: f64) -> Self {
        self.config.recommend_max_delta = value;
        self
    }

    pub fn packing(mut self, packing: PackingConfig) -> Self {
        self.config.packing = packing;
        self
    }

    pub fn build(self) -> PlannerConfig {
        self.config
    }
}

/// What to quote.
///
/// `carrier` scopes a single-carrier plan and only applies to
/// `Planner::plan`; `carrier_ids` restricts the set of carriers compared by a
/// cross-carrier plan. `None` means "no restriction" in both cases.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanRequest {
    pub zone: ZoneId,
    pub demand: ItemCounts,
    pub container_codes: Option<Vec<ContainerCode>>,
    pub allow_mixed_heights: bool,
    pub carrier: Option<CarrierId>,
    pub carrier_ids: Option<Vec<CarrierId>>,
}

impl PlanRequest {
    pub fn new(zone: ZoneId, demand: ItemCounts) -> Self {
        Self {
            zone,
            demand,
            container_codes: None,
            allow_mixed_heights: true,
            carrier: None,
            carrier_ids: None,
        }
    }

    pub fn with_container_codes(mut self, codes: Vec<ContainerCode>) -> Self {
        self.container_codes = Some(codes);
        self
    }

    pub fn with_allow_mixed_heights(mut self, allow: bool) -> Self {
        self.allow_mixed_heights = allow;
        self
    }

    pub fn with_carrier(mut self, carrier: CarrierId) -> Self {
        self.carrier = Some(carrier);
        self
    }

    pub fn with_carrier_ids(mut self, carriers: Vec<CarrierId>) -> Self {
        self.carrier_ids = Some(carriers);
        self
    }
}

/// Identity of the carrier a candidate was priced with.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct CarrierTag {
    pub id: CarrierId,
    pub code: String,
    pub name: String,
}

impl From<&Carrier> for CarrierTag {
    fn from(carrier: &Carrier) -> Self {
        Self {
            id: carrier.id,
            code: carrier.code.clone(),
            name: carrier.name.clone(),
        }
    }
}

/// One pallet type's share of a mixed candidate.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct MixPart {
    pub container_code: ContainerCode,
    pub container_count: usize,
    pub price_per_container: f64,
    pub cost: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct CandidateMetrics {
    pub mixed: bool,
    pub utilizations: Vec<ContainerUtilization>,
    /// Per-type counts and costs, mixed candidates only
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mix: Vec<MixPart>,
}

/// A fully priced plan covering the whole demand.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Candidate {
    /// Pallet type code, `"A+B"` for mixes
    pub container_code: String,
    /// Display name, `"2×Full pallet + 1×Light pallet"` for mixes
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<CarrierTag>,
    pub container_count: usize,
    /// `None` for mixes, which have no single per-pallet price
    pub price_per_container: Option<f64>,
    pub total_price: f64,
    /// Some pallet count lay beyond every published rate bracket
    pub overflow_bracket: bool,
    pub containers: Vec<LoadedContainer>,
    pub metrics: CandidateMetrics,
    pub warnings: Vec<PlanWarning>,
}

impl Candidate {
    fn mono(spec: &ContainerSpec, run: PackingRun, quote: Quote) -> Self {
        let utilizations = run.utilizations();
        Self {
            container_code: spec.code.to_string(),
            label: spec.name.clone(),
            carrier: None,
            container_count: run.container_count(),
            price_per_container: Some(quote.price_per_container),
            total_price: quote.total,
            overflow_bracket: quote.overflow_bracket,
            containers: run.containers,
            metrics: CandidateMetrics {
                mixed: false,
                utilizations,
                mix: Vec::new(),
            },
            warnings: run.warnings,
        }
    }

    fn mixed(
        (spec_a, run_a, quote_a): (&ContainerSpec, PackingRun, Quote),
        (spec_b, run_b, quote_b): (&ContainerSpec, PackingRun, Quote),
    ) -> Self {
        let count_a = run_a.container_count();
        let count_b = run_b.container_count();

        let mut containers = run_a.containers;
        containers.extend(run_b.containers);
        let utilizations = containers
            .iter()
            .enumerate()
            .map(|(idx, container)| container.utilization(idx + 1))
            .collect();

        let mut warnings = run_a.warnings;
        warnings.extend(run_b.warnings);

        Self {
            container_code: format!("{}+{}", spec_a.code, spec_b.code),
            label: format!(
                "{}×{} + {}×{}",
                count_a, spec_a.name, count_b, spec_b.name
            ),
            carrier: None,
            container_count: count_a + count_b,
            price_per_container: None,
            total_price: quote_a.total + quote_b.total,
            overflow_bracket: quote_a.overflow_bracket || quote_b.overflow_bracket,
            containers,
            metrics: CandidateMetrics {
                mixed: true,
                utilizations,
                mix: vec![
                    MixPart {
                        container_code: spec_a.code.clone(),
                        container_count: count_a,
                        price_per_container: quote_a.price_per_container,
                        cost: quote_a.total,
                    },
                    MixPart {
                        container_code: spec_b.code.clone(),
                        container_count: count_b,
                        price_per_container: quote_b.price_per_container,
                        cost: quote_b.total,
                    },
                ],
            },
            warnings,
        }
    }

    pub fn has_underutilized_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(PlanWarning::is_underutilized_last_container)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Infeasible,
    WorkBudgetExceeded,
    NoRate,
}

/// A pallet type that produced no mono-type candidate, and why.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Rejection {
    pub container_code: ContainerCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_id: Option<CarrierId>,
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    fn from_pack_error(err: &PackError) -> Self {
        let (container_code, reason) = match err {
            PackError::Infeasible { container_code, .. } => {
                (container_code.clone(), RejectionReason::Infeasible)
            }
            PackError::WorkBudgetExceeded { container_code, .. } => {
                (container_code.clone(), RejectionReason::WorkBudgetExceeded)
            }
        };
        Self {
            container_code,
            carrier_id: None,
            reason,
            message: err.to_string(),
        }
    }
}

/// Everything the search produced for one rate scope.
#[derive(Clone, Debug, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub rejections: Vec<Rejection>,
    pub catalog_issues: Vec<CatalogIssue>,
}

impl CandidateSet {
    /// Marks every candidate and rejection as priced by `carrier`.
    pub fn tag_carrier(&mut self, carrier: &Carrier) {
        let tag = CarrierTag::from(carrier);
        for candidate in &mut self.candidates {
            candidate.carrier = Some(tag.clone());
        }
        for rejection in &mut self.rejections {
            rejection.carrier_id = Some(carrier.id);
        }
    }

    pub(crate) fn push_issues(&mut self, issues: &[CatalogIssue]) {
        for issue in issues {
            if !self.catalog_issues.contains(issue) {
                self.catalog_issues.push(issue.clone());
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationReason {
    FewerContainers,
    AvoidsUnderutilizedLastContainer,
}

impl RecommendationReason {
    fn describe(&self) -> &'static str {
        match self {
            RecommendationReason::FewerContainers => "fewer containers",
            RecommendationReason::AvoidsUnderutilizedLastContainer => {
                "avoids a nearly empty last container"
            }
        }
    }
}

/// An alternative worth its small surcharge.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Recommendation {
    /// Position in `Plan::alternatives`
    pub alternative_index: usize,
    pub container_code: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<CarrierTag>,
    pub container_count: usize,
    /// Surcharge over the best candidate in percent, 2 decimals
    pub delta_pct: f64,
    pub best_total: f64,
    pub alt_total: f64,
    pub reasons: Vec<RecommendationReason>,
    pub message: String,
}

/// Best candidate, ranked alternatives and recommendations.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Plan {
    pub best: Candidate,
    pub alternatives: Vec<Candidate>,
    pub recommendations: Vec<Recommendation>,
    pub rejections: Vec<Rejection>,
    pub catalog_issues: Vec<CatalogIssue>,
}

/// Result of a planning call. Only `Planned` carries a plan; the other
/// variants are regular answers, not failures.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlanOutcome {
    Planned(Plan),
    NoCandidates {
        rejections: Vec<Rejection>,
        catalog_issues: Vec<CatalogIssue>,
    },
    NoCarriersAvailable {
        zone_id: ZoneId,
    },
}

impl PlanOutcome {
    pub fn plan(&self) -> Option<&Plan> {
        match self {
            PlanOutcome::Planned(plan) => Some(plan),
            _ => None,
        }
    }
}

/// Resolves the allow-list against the catalog, keeping catalog order.
///
/// Every listed code must exist; an empty list is treated like no list.
pub fn resolve_containers<'a>(
    containers: &'a [ContainerSpec],
    allowed: Option<&[ContainerCode]>,
) -> Result<Vec<&'a ContainerSpec>, PlanError> {
    let Some(allowed) = allowed.filter(|codes| !codes.is_empty()) else {
        return Ok(containers.iter().collect());
    };

    if let Some(unknown) = allowed
        .iter()
        .find(|code| !containers.iter().any(|spec| &spec.code == *code))
    {
        return Err(PlanError::UnknownContainerType(unknown.clone()));
    }

    Ok(containers
        .iter()
        .filter(|spec| allowed.contains(&spec.code))
        .collect())
}

fn count_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Mono-type result kept for the mixed search.
struct MonoOption<'a> {
    packer: ContainerPacker<'a>,
    total_price: f64,
}

/// Builds every mono-type and mixed candidate for one rate scope.
///
/// # Parameters
/// * `snapshot` - Catalog and rates of the destination zone
/// * `request` - Demand, allow-list and layer mode
/// * `carrier` - Price with this carrier's tiers only; `None` uses every tier of the zone
/// * `config` - Search bounds and packing settings
///
/// # Returns
/// Candidates in generation order (mono-types in catalog order, then mixes),
/// with rejected pallet types and unusable item types recorded alongside.
/// Fails only if the allow-list names an unknown pallet type.
pub fn generate_candidates(
    snapshot: &CatalogSnapshot,
    request: &PlanRequest,
    carrier: Option<CarrierId>,
    config: &PlannerConfig,
) -> Result<CandidateSet, PlanError> {
    let specs = resolve_containers(&snapshot.containers, request.container_codes.as_deref())?;
    let mut set = CandidateSet::default();
    let mut mono_options: Vec<MonoOption<'_>> = Vec::new();

    for spec in specs {
        let packer = ContainerPacker::new(
            spec,
            &snapshot.boxes,
            request.allow_mixed_heights,
            config.packing,
        );
        if !packer.catalog_issues().is_empty() {
            warn!(
                container = %spec.code,
                issues = packer.catalog_issues().len(),
                "item types excluded for this pallet type"
            );
            set.push_issues(packer.catalog_issues());
        }

        let run = match packer.pack(request.demand, None) {
            Ok(run) => run,
            Err(err) => {
                debug!(container = %spec.code, reason = err.code(), "pallet type rejected");
                set.rejections.push(Rejection::from_pack_error(&err));
                continue;
            }
        };
        if run.container_count() == 0 {
            set.rejections.push(Rejection {
                container_code: spec.code.clone(),
                carrier_id: None,
                reason: RejectionReason::Infeasible,
                message: "nothing to pack".to_string(),
            });
            continue;
        }

        let count = count_u32(run.container_count());
        let Some(quote) = snapshot.rates.quote(request.zone, &spec.code, count, carrier) else {
            debug!(container = %spec.code, count, "no rate for pallet type");
            set.rejections.push(Rejection {
                container_code: spec.code.clone(),
                carrier_id: None,
                reason: RejectionReason::NoRate,
                message: format!(
                    "no rate for '{}' in zone {}",
                    spec.code, request.zone
                ),
            });
            continue;
        };

        let candidate = Candidate::mono(spec, run, quote);
        debug!(
            container = %candidate.container_code,
            count = candidate.container_count,
            total = candidate.total_price,
            "mono-type candidate"
        );
        for warning in &candidate.warnings {
            debug!(container = %candidate.container_code, "{}", warning.message());
        }
        mono_options.push(MonoOption {
            packer,
            total_price: candidate.total_price,
        });
        set.candidates.push(candidate);
    }

    let mix_types = pick_mix_types(mono_options, config.mix_max_types);
    for (i, a) in mix_types.iter().enumerate() {
        for b in &mix_types[i + 1..] {
            mix_pair(a, b, snapshot, request, carrier, config, &mut set);
        }
    }

    Ok(set)
}

/// The `limit` cheapest mono-type options, back in catalog order.
fn pick_mix_types(options: Vec<MonoOption<'_>>, limit: usize) -> Vec<ContainerPacker<'_>> {
    let mut ranked: Vec<usize> = (0..options.len()).collect();
    ranked.sort_by(|&x, &y| price_order(options[x].total_price, options[y].total_price));
    ranked.truncate(limit);
    ranked.sort_unstable();

    let mut picked = Vec::with_capacity(ranked.len());
    for (idx, option) in options.into_iter().enumerate() {
        if ranked.contains(&idx) {
            picked.push(option.packer);
        }
    }
    picked
}

/// Tries `a` packed up to a small count, with `b` taking the leftover.
fn mix_pair(
    a: &ContainerPacker<'_>,
    b: &ContainerPacker<'_>,
    snapshot: &CatalogSnapshot,
    request: &PlanRequest,
    carrier: Option<CarrierId>,
    config: &PlannerConfig,
    set: &mut CandidateSet,
) {
    for a_count in 1..=config.mix_max_per_type {
        let Ok(run_a) = a.pack(request.demand, Some(a_count)) else {
            continue;
        };
        // A alone covers the demand: that is its mono-type plan
        if run_a.is_complete() {
            continue;
        }

        for b_count in 1..=config.mix_max_per_type {
            let Ok(run_b) = b.pack(run_a.remaining, Some(b_count)) else {
                continue;
            };
            if !run_b.is_complete() {
                continue;
            }

            let quote_a = snapshot.rates.quote(
                request.zone,
                &a.spec().code,
                count_u32(run_a.container_count()),
                carrier,
            );
            let quote_b = snapshot.rates.quote(
                request.zone,
                &b.spec().code,
                count_u32(run_b.container_count()),
                carrier,
            );
            if let (Some(quote_a), Some(quote_b)) = (quote_a, quote_b) {
                let candidate = Candidate::mixed(
                    (a.spec(), run_a.clone(), quote_a),
                    (b.spec(), run_b, quote_b),
                );
                debug!(
                    container = %candidate.container_code,
                    count = candidate.container_count,
                    total = candidate.total_price,
                    "mixed candidate"
                );
                set.candidates.push(candidate);
            }
            // a larger B count would rebuild the same pallets
            break;
        }
    }
}

/// Ascending by price, NaN last.
fn price_order(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Stable sort of candidates by total price.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| price_order(a.total_price, b.total_price));
}

/// Ranks the candidates and picks best, alternatives and recommendations.
pub fn select_plan(set: CandidateSet, config: &PlannerConfig) -> PlanOutcome {
    let CandidateSet {
        mut candidates,
        rejections,
        catalog_issues,
    } = set;

    rank_candidates(&mut candidates);
    let mut ranked = candidates.into_iter();
    let Some(best) = ranked.next() else {
        return PlanOutcome::NoCandidates {
            rejections,
            catalog_issues,
        };
    };
    let alternatives: Vec<Candidate> = ranked.take(config.max_alternatives).collect();
    let recommendations = recommendations(&best, &alternatives, config.recommend_max_delta);

    PlanOutcome::Planned(Plan {
        best,
        alternatives,
        recommendations,
        rejections,
        catalog_issues,
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Alternatives at most `max_delta` more expensive than `best` that use
/// fewer pallets, or avoid the nearly empty last pallet `best` has.
///
/// # Example
/// An alternative 1.25% above best that needs one pallet less yields
/// `"Alternative +1.25% · fewer containers → 1×Full pallet"`.
pub fn recommendations(
    best: &Candidate,
    alternatives: &[Candidate],
    max_delta: f64,
) -> Vec<Recommendation> {
    let best_total = best.total_price;
    if best_total.is_nan() || best_total <= 0.0 {
        return Vec::new();
    }
    let best_underutilized = best.has_underutilized_warning();

    alternatives
        .iter()
        .enumerate()
        .filter_map(|(idx, alt)| {
            let alt_total = alt.total_price;
            if alt_total.is_nan() || alt_total <= 0.0 {
                return None;
            }
            let delta = (alt_total - best_total) / best_total;
            if delta < -1e-5 || delta > max_delta {
                return None;
            }

            let mut reasons = Vec::new();
            if alt.container_count > 0 && alt.container_count < best.container_count {
                reasons.push(RecommendationReason::FewerContainers);
            }
            if best_underutilized && !alt.has_underutilized_warning() {
                reasons.push(RecommendationReason::AvoidsUnderutilizedLastContainer);
            }
            if reasons.is_empty() {
                return None;
            }

            let delta_pct = round2(delta * 100.0);
            let mut parts = vec![format!("Alternative +{}%", delta_pct)];
            parts.extend(reasons.iter().map(|r| r.describe().to_string()));
            let message = format!("{} → {}", parts.join(" · "), alt.label);

            Some(Recommendation {
                alternative_index: idx,
                container_code: alt.container_code.clone(),
                label: alt.label.clone(),
                carrier: alt.carrier.clone(),
                container_count: alt.container_count,
                delta_pct,
                best_total: round2(best_total),
                alt_total: round2(alt_total),
                reasons,
                message,
            })
        })
        .collect()
}

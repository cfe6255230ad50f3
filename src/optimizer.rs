//! Layer-by-layer packing simulation for one pallet type.
//!
//! Boxes are stacked in flat layers. Each layer gets a base type that defines
//! its footprint grid; free slots are topped up with smaller types. Layers are
//! stacked until the pallet runs out of height or weight, then a new pallet of
//! the same type is opened until the demand is exhausted or the caller's limit
//! is reached.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, trace};
use utoipa::ToSchema;

use crate::geometry::{CatalogIssue, LayerProfiles, TypeProfile};
use crate::model::{BoxCatalog, ContainerCode, ContainerSpec};
use crate::types::{EPSILON_GENERAL, ItemCounts, ItemType, PackingPriority};

/// Configuration for the packing simulation.
#[derive(Copy, Clone, Debug)]
pub struct PackingConfig {
    /// Order in which item types are tried as layer base
    pub priority: PackingPriority,
    /// Maximum number of containers a single run may build before it is aborted
    pub max_containers_per_run: usize,
    /// Last container at or below this utilization (0.0 to 1.0) gets a warning
    pub underutilized_ratio: f64,
    /// Last container with at most this many units gets a warning
    pub underutilized_units: u32,
}

impl PackingConfig {
    pub const DEFAULT_MAX_CONTAINERS_PER_RUN: usize = 10_000;
    pub const DEFAULT_UNDERUTILIZED_RATIO: f64 = 0.25;
    pub const DEFAULT_UNDERUTILIZED_UNITS: u32 = 8;

    /// Creates a builder for a custom configuration.
    pub fn builder() -> PackingConfigBuilder {
        PackingConfigBuilder::default()
    }
}

impl Default for PackingConfig {
    fn default() -> Self {
        Self {
            priority: PackingPriority::STANDARD,
            max_containers_per_run: Self::DEFAULT_MAX_CONTAINERS_PER_RUN,
            underutilized_ratio: Self::DEFAULT_UNDERUTILIZED_RATIO,
            underutilized_units: Self::DEFAULT_UNDERUTILIZED_UNITS,
        }
    }
}

/// Builder for PackingConfig.
#[derive(Clone, Debug, Default)]
pub struct PackingConfigBuilder {
    config: PackingConfig,
}

impl PackingConfigBuilder {
    /// Sets the base type priority.
    pub fn priority(mut self, priority: PackingPriority) -> Self {
        self.config.priority = priority;
        self
    }

    /// Sets the per-run container budget.
    pub fn max_containers_per_run(mut self, max: usize) -> Self {
        self.config.max_containers_per_run = max;
        self
    }

    /// Sets the utilization threshold for the last-container warning.
    pub fn underutilized_ratio(mut self, ratio: f64) -> Self {
        self.config.underutilized_ratio = ratio;
        self
    }

    /// Sets the unit-count threshold for the last-container warning.
    pub fn underutilized_units(mut self, units: u32) -> Self {
        self.config.underutilized_units = units;
        self
    }

    /// Creates the final configuration.
    pub fn build(self) -> PackingConfig {
        self.config
    }
}

/// One flat tier of boxes on a pallet.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Layer {
    pub base_type: ItemType,
    pub counts: ItemCounts,
    pub height_cm: u32,
    pub weight_kg: f64,
    pub slots_total: u32,
    pub slots_empty: u32,
    pub needs_separator: bool,
}

impl Layer {
    pub fn units(&self) -> u64 {
        self.counts.total()
    }
}

/// Height and weight still available on the pallet being filled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerBudget {
    pub height_cm: u32,
    pub weight_kg: f64,
}

/// How many units of `unit_kg` fit into `budget_kg`.
fn units_by_weight(budget_kg: f64, unit_kg: f64) -> u32 {
    if unit_kg <= 0.0 || budget_kg <= 0.0 {
        return 0;
    }
    // `as` saturates, so an enormous budget simply means "not weight bound"
    ((budget_kg + EPSILON_GENERAL) / unit_kg).floor() as u32
}

/// Builds one flat layer on top of the current stack.
///
/// The base type fills as many slots of its grid as stock and weight allow;
/// remaining slots are topped up following `ItemType::fill_order`. Without
/// `allow_mixed_heights` a fill type must have exactly the base height, so a
/// layer never needs a separator in that mode.
///
/// # Parameters
/// * `base` - Item type defining the footprint grid
/// * `remaining` - Demand not yet placed
/// * `profiles` - Per-type slots, height and weight for this pallet type
/// * `budget` - Height and weight left on the pallet
/// * `allow_mixed_heights` - Whether types of different height may share a layer
///
/// # Returns
/// `Some(Layer)` if at least one unit was placed, otherwise `None`
pub fn build_layer(
    base: ItemType,
    remaining: &ItemCounts,
    profiles: &LayerProfiles,
    budget: LayerBudget,
    allow_mixed_heights: bool,
) -> Option<Layer> {
    let base_profile = profiles.get(base)?;
    if base_profile.height_cm > budget.height_cm
        || base_profile.weight_kg > budget.weight_kg + EPSILON_GENERAL
    {
        return None;
    }

    let slots_total = base_profile.slots_per_layer;
    let mut slots = slots_total;
    let mut counts = ItemCounts::zero();
    let mut weight = 0.0;
    let mut height = 0;

    let base_units = slots
        .min(remaining.get(base))
        .min(units_by_weight(budget.weight_kg, base_profile.weight_kg));
    if base_units == 0 {
        return None;
    }
    place(&mut counts, &mut slots, &mut weight, &mut height, base, base_profile, base_units);

    for &fill in base.fill_order() {
        if slots == 0 {
            break;
        }
        let Some(profile) = profiles.get(fill) else {
            continue;
        };
        let stock = remaining.get(fill);
        if stock == 0 {
            continue;
        }
        if !allow_mixed_heights && profile.height_cm != base_profile.height_cm {
            continue;
        }
        if profile.height_cm > budget.height_cm {
            continue;
        }

        let add = slots
            .min(stock)
            .min(units_by_weight(budget.weight_kg - weight, profile.weight_kg));
        if add == 0 {
            continue;
        }
        place(&mut counts, &mut slots, &mut weight, &mut height, fill, profile, add);
    }

    let needs_separator = allow_mixed_heights && has_mixed_heights(&counts, profiles);

    Some(Layer {
        base_type: base,
        counts,
        height_cm: height,
        weight_kg: weight,
        slots_total,
        slots_empty: slots,
        needs_separator,
    })
}

fn place(
    counts: &mut ItemCounts,
    slots: &mut u32,
    weight: &mut f64,
    height: &mut u32,
    item: ItemType,
    profile: &TypeProfile,
    units: u32,
) {
    *counts.get_mut(item) += units;
    *slots -= units;
    *weight += f64::from(units) * profile.weight_kg;
    *height = (*height).max(profile.height_cm);
}

fn has_mixed_heights(counts: &ItemCounts, profiles: &LayerProfiles) -> bool {
    let mut heights = counts
        .present_types()
        .filter_map(|item| profiles.get(item).map(|p| p.height_cm));
    match heights.next() {
        Some(first) => heights.any(|h| h != first),
        None => false,
    }
}

/// A pallet after packing, with its layers and leftover capacity.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct LoadedContainer {
    pub container_code: ContainerCode,
    pub load: ItemCounts,
    pub layers: Vec<Layer>,
    pub separators_used: u32,
    pub height_left_cm: u32,
    pub weight_left_kg: f64,
    pub max_height_cm: u32,
    pub max_weight_kg: f64,
}

impl LoadedContainer {
    fn open(spec: &ContainerSpec) -> Self {
        Self {
            container_code: spec.code.clone(),
            load: ItemCounts::zero(),
            layers: Vec::new(),
            separators_used: 0,
            height_left_cm: spec.max_height_cm,
            weight_left_kg: spec.max_weight_kg,
            max_height_cm: spec.max_height_cm,
            max_weight_kg: spec.max_weight_kg,
        }
    }

    fn budget(&self) -> LayerBudget {
        LayerBudget {
            height_cm: self.height_left_cm,
            weight_kg: self.weight_left_kg,
        }
    }

    fn push_layer(&mut self, layer: Layer) {
        self.load = self.load + layer.counts;
        self.height_left_cm -= layer.height_cm;
        self.weight_left_kg -= layer.weight_kg;
        if layer.needs_separator {
            self.separators_used += 1;
        }
        self.layers.push(layer);
    }

    fn is_exhausted(&self) -> bool {
        self.height_left_cm == 0 || self.weight_left_kg <= EPSILON_GENERAL
    }

    /// Number of units on the pallet.
    pub fn units(&self) -> u64 {
        self.load.total()
    }

    pub fn used_height_cm(&self) -> u32 {
        self.max_height_cm - self.height_left_cm
    }

    pub fn used_weight_kg(&self) -> f64 {
        (self.max_weight_kg - self.weight_left_kg).max(0.0)
    }

    /// Utilization by height and by weight; the larger one counts, since a
    /// pallet at its weight limit is full however much height is left.
    pub fn utilization(&self, container_number: usize) -> ContainerUtilization {
        let by_height = if self.max_height_cm > 0 {
            f64::from(self.used_height_cm()) / f64::from(self.max_height_cm)
        } else {
            0.0
        };
        let by_weight = if self.max_weight_kg > 0.0 {
            self.used_weight_kg() / self.max_weight_kg
        } else {
            0.0
        };

        ContainerUtilization {
            container_number,
            utilization: by_height.max(by_weight),
            utilization_height: by_height,
            utilization_weight: by_weight,
            used_height_cm: self.used_height_cm(),
            used_weight_kg: self.used_weight_kg(),
        }
    }
}

/// Utilization figures of one pallet (ratios 0.0 to 1.0).
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct ContainerUtilization {
    /// 1-based position within its packing run
    pub container_number: usize,
    pub utilization: f64,
    pub utilization_height: f64,
    pub utilization_weight: f64,
    pub used_height_cm: u32,
    pub used_weight_kg: f64,
}

/// Warning attached to a candidate plan.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanWarning {
    /// The last pallet of a run is nearly empty.
    UnderutilizedLastContainer {
        container_code: ContainerCode,
        container_number: usize,
        utilization: f64,
        units: u64,
    },
}

impl PlanWarning {
    pub fn is_underutilized_last_container(&self) -> bool {
        matches!(self, PlanWarning::UnderutilizedLastContainer { .. })
    }

    pub fn message(&self) -> String {
        match self {
            PlanWarning::UnderutilizedLastContainer {
                container_code,
                utilization,
                units,
                ..
            } => format!(
                "The last '{}' pallet is nearly empty ({:.0}% used, {} units); consider consolidating with another shipment",
                container_code,
                utilization * 100.0,
                units
            ),
        }
    }
}

/// Why a packing run produced nothing usable.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PackError {
    #[error("no unit of the remaining demand fits onto an empty '{container_code}' pallet")]
    Infeasible {
        container_code: ContainerCode,
        remaining: ItemCounts,
    },
    #[error("packing '{container_code}' exceeded the budget of {budget} containers")]
    WorkBudgetExceeded {
        container_code: ContainerCode,
        budget: usize,
        remaining: ItemCounts,
    },
}

impl PackError {
    pub fn code(&self) -> &'static str {
        match self {
            PackError::Infeasible { .. } => "infeasible",
            PackError::WorkBudgetExceeded { .. } => "work_budget_exceeded",
        }
    }
}

/// Result of packing one pallet type.
#[derive(Clone, Debug)]
pub struct PackingRun {
    pub container_code: ContainerCode,
    pub containers: Vec<LoadedContainer>,
    pub packed: ItemCounts,
    pub remaining: ItemCounts,
    pub limit: Option<usize>,
    pub warnings: Vec<PlanWarning>,
}

impl PackingRun {
    /// Number of pallets built.
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Whether the whole demand was placed.
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Utilization of every pallet in build order.
    pub fn utilizations(&self) -> Vec<ContainerUtilization> {
        self.containers
            .iter()
            .enumerate()
            .map(|(idx, container)| container.utilization(idx + 1))
            .collect()
    }

    pub fn has_underutilized_warning(&self) -> bool {
        self.warnings
            .iter()
            .any(PlanWarning::is_underutilized_last_container)
    }
}

/// Fills pallets of one type.
///
/// Profiles are computed once per pallet type and reused for every run, which
/// matters for the mixed search that packs the same type with several limits.
#[derive(Clone, Debug)]
pub struct ContainerPacker<'a> {
    spec: &'a ContainerSpec,
    profiles: LayerProfiles,
    issues: Vec<CatalogIssue>,
    allow_mixed_heights: bool,
    config: PackingConfig,
}

impl<'a> ContainerPacker<'a> {
    pub fn new(
        spec: &'a ContainerSpec,
        boxes: &BoxCatalog,
        allow_mixed_heights: bool,
        config: PackingConfig,
    ) -> Self {
        let (profiles, issues) = LayerProfiles::for_container(spec, boxes);
        Self {
            spec,
            profiles,
            issues,
            allow_mixed_heights,
            config,
        }
    }

    pub fn spec(&self) -> &ContainerSpec {
        self.spec
    }

    /// Item types that cannot be used on this pallet type.
    pub fn catalog_issues(&self) -> &[CatalogIssue] {
        &self.issues
    }

    /// Packs `demand` onto pallets of this type.
    ///
    /// # Parameters
    /// * `demand` - Units to place
    /// * `limit` - Build at most this many pallets; `None` packs until the demand is exhausted
    ///
    /// # Returns
    /// The packing run, possibly with remaining units when a limit was given.
    /// `PackError::Infeasible` if a fresh pallet cannot take a single unit of
    /// what is left, `PackError::WorkBudgetExceeded` if the configured
    /// container budget runs out first.
    pub fn pack(&self, demand: ItemCounts, limit: Option<usize>) -> Result<PackingRun, PackError> {
        let mut remaining = demand;
        let mut containers: Vec<LoadedContainer> = Vec::new();

        // Each committed pallet holds at least one unit, so this loop runs at
        // most `demand.total()` times; the budget caps it further.
        while !remaining.is_empty() {
            if limit.is_some_and(|max| containers.len() >= max) {
                break;
            }
            if containers.len() >= self.config.max_containers_per_run {
                error!(
                    container = %self.spec.code,
                    budget = self.config.max_containers_per_run,
                    remaining = remaining.total(),
                    "packing run exceeded its container budget"
                );
                return Err(PackError::WorkBudgetExceeded {
                    container_code: self.spec.code.clone(),
                    budget: self.config.max_containers_per_run,
                    remaining,
                });
            }

            let container = self.fill_container(&mut remaining);
            if container.units() == 0 {
                debug!(
                    container = %self.spec.code,
                    remaining = ?remaining,
                    "pallet type cannot take any remaining unit"
                );
                return Err(PackError::Infeasible {
                    container_code: self.spec.code.clone(),
                    remaining,
                });
            }

            trace!(
                container = %self.spec.code,
                number = containers.len() + 1,
                units = container.units(),
                layers = container.layers.len(),
                "pallet closed"
            );
            containers.push(container);
        }

        let packed = containers
            .iter()
            .fold(ItemCounts::zero(), |acc, c| acc + c.load);
        debug_assert_eq!(packed + remaining, demand);

        let warnings = self.underutilized_warning(&containers).into_iter().collect();

        Ok(PackingRun {
            container_code: self.spec.code.clone(),
            containers,
            packed,
            remaining,
            limit,
            warnings,
        })
    }

    /// Stacks layers onto one fresh pallet, taking units out of `remaining`.
    fn fill_container(&self, remaining: &mut ItemCounts) -> LoadedContainer {
        let mut container = LoadedContainer::open(self.spec);

        loop {
            let budget = container.budget();
            let Some(base) = self.pick_base_type(remaining, budget) else {
                break;
            };
            let Some(layer) =
                build_layer(base, remaining, &self.profiles, budget, self.allow_mixed_heights)
            else {
                break;
            };
            if layer.height_cm > budget.height_cm {
                break;
            }

            *remaining = *remaining - layer.counts;
            container.push_layer(layer);

            if container.is_exhausted() || remaining.is_empty() {
                break;
            }
        }

        container
    }

    /// First type in priority order with stock that still fits by height and weight.
    fn pick_base_type(&self, remaining: &ItemCounts, budget: LayerBudget) -> Option<ItemType> {
        self.config.priority.iter().find(|&item| {
            remaining.get(item) > 0
                && self.profiles.get(item).is_some_and(|profile| {
                    profile.height_cm <= budget.height_cm
                        && profile.weight_kg <= budget.weight_kg + EPSILON_GENERAL
                })
        })
    }

    fn underutilized_warning(&self, containers: &[LoadedContainer]) -> Option<PlanWarning> {
        let last = containers.last()?;
        let number = containers.len();
        let utilization = last.utilization(number).utilization;
        let units = last.units();

        if utilization <= self.config.underutilized_ratio + EPSILON_GENERAL
            || units <= u64::from(self.config.underutilized_units)
        {
            Some(PlanWarning::UnderutilizedLastContainer {
                container_code: self.spec.code.clone(),
                container_number: number,
                utilization,
                units,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoxSpec;

    fn tower() -> BoxSpec {
        BoxSpec::new(60, 30, 25, 10.0).unwrap()
    }

    fn laptop() -> BoxSpec {
        BoxSpec::new(40, 40, 12, 4.0).unwrap()
    }

    fn mini_pc() -> BoxSpec {
        BoxSpec::new(35, 25, 15, 3.0).unwrap()
    }

    fn demo_boxes() -> BoxCatalog {
        BoxCatalog::default()
            .with(ItemType::Tower, tower())
            .with(ItemType::Laptop, laptop())
            .with(ItemType::MiniPc, mini_pc())
    }

    fn pallet(max_height_cm: u32, max_weight_kg: f64) -> ContainerSpec {
        ContainerSpec::new("full", "Full pallet", (120, 100), max_height_cm, max_weight_kg)
            .unwrap()
    }

    fn assert_layer_invariants(run: &PackingRun, boxes: &BoxCatalog, allow_mixed_heights: bool) {
        for container in &run.containers {
            let mut sum = ItemCounts::zero();
            for layer in &container.layers {
                assert!(layer.units() <= u64::from(layer.slots_total));
                assert_eq!(
                    u64::from(layer.slots_empty),
                    u64::from(layer.slots_total) - layer.units()
                );

                let heights: Vec<u32> = layer
                    .counts
                    .present_types()
                    .map(|item| boxes.get(item).unwrap().height_cm)
                    .collect();
                let distinct = heights.iter().any(|h| *h != heights[0]);
                if !allow_mixed_heights {
                    assert!(!distinct, "mixed heights in layer {:?}", layer);
                }
                assert_eq!(layer.needs_separator, allow_mixed_heights && distinct);
                sum = sum + layer.counts;
            }
            assert_eq!(sum, container.load);
        }
    }

    #[test]
    fn single_layer_of_towers_leaves_one_slot_empty() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let run = packer.pack(ItemCounts::new(5, 0, 0), None).unwrap();

        assert_eq!(run.container_count(), 1);
        let container = &run.containers[0];
        assert_eq!(container.layers.len(), 1);
        let layer = &container.layers[0];
        assert_eq!(layer.slots_total, 6);
        assert_eq!(layer.counts.tower, 5);
        assert_eq!(layer.slots_empty, 1);
        assert!(!layer.needs_separator);
        assert_eq!(layer.height_cm, 25);
        assert!((layer.weight_kg - 50.0).abs() < EPSILON_GENERAL);
        assert!(run.is_complete());
    }

    #[test]
    fn weight_limit_splits_towers_over_several_pallets() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 150.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let run = packer.pack(ItemCounts::new(20, 0, 0), None).unwrap();

        assert!(run.container_count() >= 2);
        let packed: u32 = run.containers.iter().map(|c| c.load.tower).sum();
        assert_eq!(packed, 20);
        assert_eq!(run.packed, ItemCounts::new(20, 0, 0));
        for container in &run.containers {
            assert!(container.used_weight_kg() <= 150.0 + EPSILON_GENERAL);
        }
        // 6 + 6 + 3 towers reach exactly 150 kg
        assert_eq!(run.containers[0].load.tower, 15);
        assert_eq!(run.containers[1].load.tower, 5);
    }

    #[test]
    fn different_heights_never_share_a_layer_without_separators() {
        let boxes = demo_boxes();
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, false, PackingConfig::default());

        let run = packer.pack(ItemCounts::new(1, 1, 0), None).unwrap();

        let layers = &run.containers[0].layers;
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].base_type, ItemType::Tower);
        assert_eq!(layers[0].counts, ItemCounts::new(1, 0, 0));
        assert_eq!(layers[1].base_type, ItemType::Laptop);
        assert_eq!(layers[1].counts, ItemCounts::new(0, 1, 0));
        assert_layer_invariants(&run, &boxes, false);
    }

    #[test]
    fn mixed_heights_fill_tower_gaps_and_need_separator() {
        let boxes = demo_boxes();
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let run = packer.pack(ItemCounts::new(4, 1, 3), None).unwrap();

        let first = &run.containers[0].layers[0];
        assert_eq!(first.base_type, ItemType::Tower);
        // 4 towers leave 2 slots, taken by minis before laptops
        assert_eq!(first.counts, ItemCounts::new(4, 0, 2));
        assert_eq!(first.slots_empty, 0);
        assert!(first.needs_separator);
        assert_eq!(first.height_cm, 25);
        let separator_layers = run.containers[0]
            .layers
            .iter()
            .filter(|l| l.needs_separator)
            .count() as u32;
        assert_eq!(run.containers[0].separators_used, separator_layers);
        assert_layer_invariants(&run, &boxes, true);
        assert!(run.is_complete());
    }

    #[test]
    fn equal_heights_fill_without_separator_when_mixing_is_off() {
        let boxes = BoxCatalog::default()
            .with(ItemType::Laptop, laptop())
            .with(ItemType::MiniPc, BoxSpec::new(35, 25, 12, 3.0).unwrap());
        let spec = ContainerSpec::new("quarter", "Quarter pallet", (120, 80), 110, 300.0).unwrap();
        let packer = ContainerPacker::new(&spec, &boxes, false, PackingConfig::default());

        let run = packer.pack(ItemCounts::new(0, 4, 5), None).unwrap();

        let first = &run.containers[0].layers[0];
        assert_eq!(first.base_type, ItemType::Laptop);
        assert_eq!(first.slots_total, 6);
        assert_eq!(first.counts, ItemCounts::new(0, 4, 2));
        assert!(!first.needs_separator);
        assert_layer_invariants(&run, &boxes, false);
    }

    #[test]
    fn limit_leaves_remaining_demand_and_keeps_totals() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 150.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());
        let demand = ItemCounts::new(40, 0, 0);

        let run = packer.pack(demand, Some(1)).unwrap();

        assert_eq!(run.container_count(), 1);
        assert_eq!(run.packed, ItemCounts::new(15, 0, 0));
        assert_eq!(run.remaining, ItemCounts::new(25, 0, 0));
        assert_eq!(run.packed + run.remaining, demand);
        assert!(!run.is_complete());
        assert_eq!(run.limit, Some(1));
    }

    #[test]
    fn container_too_weak_for_any_box_is_infeasible() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 5.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let err = packer.pack(ItemCounts::new(3, 0, 0), None).unwrap_err();
        assert!(matches!(err, PackError::Infeasible { ref remaining, .. } if remaining.tower == 3));
        assert_eq!(err.code(), "infeasible");
    }

    #[test]
    fn invalid_type_in_demand_makes_run_infeasible_after_valid_units() {
        let boxes = BoxCatalog::default()
            .with(ItemType::Tower, tower())
            .with(
                ItemType::Laptop,
                BoxSpec {
                    length_cm: 40,
                    width_cm: 40,
                    height_cm: 12,
                    weight_kg: 0.0,
                },
            );
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());
        assert_eq!(packer.catalog_issues().len(), 1);
        assert_eq!(packer.catalog_issues()[0].item_type, ItemType::Laptop);

        // towers still pack when no laptop is requested
        assert!(packer.pack(ItemCounts::new(3, 0, 0), None).is_ok());
        // with laptops, the second pallet cannot take any of them
        let err = packer.pack(ItemCounts::new(3, 2, 0), None).unwrap_err();
        assert!(matches!(err, PackError::Infeasible { remaining, .. } if remaining == ItemCounts::new(0, 2, 0)));
    }

    #[test]
    fn work_budget_stops_runaway_runs() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(25, 1200.0);
        let config = PackingConfig::builder().max_containers_per_run(3).build();
        let packer = ContainerPacker::new(&spec, &boxes, true, config);

        // 6 towers per pallet, 30 towers need 5 pallets
        let err = packer.pack(ItemCounts::new(30, 0, 0), None).unwrap_err();
        match err {
            PackError::WorkBudgetExceeded {
                budget, remaining, ..
            } => {
                assert_eq!(budget, 3);
                assert_eq!(remaining.tower, 12);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_demand_builds_no_pallet() {
        let boxes = demo_boxes();
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let run = packer.pack(ItemCounts::zero(), None).unwrap();
        assert_eq!(run.container_count(), 0);
        assert!(run.warnings.is_empty());
    }

    #[test]
    fn nearly_empty_last_pallet_is_flagged() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let light = packer.pack(ItemCounts::new(5, 0, 0), None).unwrap();
        assert!(light.has_underutilized_warning());

        // 8 layers of 6 towers = 48 towers fill the full height
        let full = packer.pack(ItemCounts::new(48, 0, 0), None).unwrap();
        assert_eq!(full.container_count(), 1);
        assert!(!full.has_underutilized_warning());
        let utilization = full.utilizations()[0].utilization;
        assert!((utilization - 200.0 / 220.0).abs() < 1e-9);
    }

    #[test]
    fn low_utilization_is_flagged_even_with_many_units() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 1200.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        // two layers: 12 towers, 50 of 220 cm
        let run = packer.pack(ItemCounts::new(12, 0, 0), None).unwrap();
        assert_eq!(run.containers[0].units(), 12);
        match run.warnings.as_slice() {
            [PlanWarning::UnderutilizedLastContainer { units, utilization, .. }] => {
                assert_eq!(*units, 12);
                assert!((utilization - 50.0 / 220.0).abs() < 1e-9);
            }
            other => panic!("expected one warning, got {other:?}"),
        }

        let strict = PackingConfig::builder().underutilized_ratio(0.2).build();
        let packer = ContainerPacker::new(&spec, &boxes, true, strict);
        let run = packer.pack(ItemCounts::new(12, 0, 0), None).unwrap();
        assert!(!run.has_underutilized_warning());
    }

    #[test]
    fn huge_demand_hits_the_work_budget() {
        let boxes = demo_boxes();
        let spec = pallet(220, 1200.0);
        let config = PackingConfig::builder().max_containers_per_run(2).build();
        let packer = ContainerPacker::new(&spec, &boxes, true, config);
        let demand = ItemCounts::new(u32::MAX, 1, 0);

        let err = packer.pack(demand, None).unwrap_err();
        match err {
            PackError::WorkBudgetExceeded { budget, remaining, .. } => {
                assert_eq!(budget, 2);
                assert!(!remaining.is_empty());
                assert!(remaining.total() < demand.total());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn utilization_takes_larger_of_height_and_weight() {
        let boxes = BoxCatalog::default().with(ItemType::Tower, tower());
        let spec = pallet(220, 100.0);
        let packer = ContainerPacker::new(&spec, &boxes, true, PackingConfig::default());

        let run = packer.pack(ItemCounts::new(10, 0, 0), None).unwrap();
        let first = run.containers[0].utilization(1);
        assert!((first.utilization_weight - 1.0).abs() < 1e-9);
        assert!(first.utilization_height < 0.5);
        assert!((first.utilization - 1.0).abs() < 1e-9);
    }

    #[test]
    fn packed_plus_remaining_matches_demand_for_mixed_orders() {
        let boxes = demo_boxes();
        let spec = ContainerSpec::new("half", "Half pallet", (120, 100), 160, 600.0).unwrap();
        let demand = ItemCounts::new(37, 21, 45);

        for allow_mixed_heights in [true, false] {
            let packer =
                ContainerPacker::new(&spec, &boxes, allow_mixed_heights, PackingConfig::default());
            for limit in [None, Some(1), Some(2)] {
                let run = packer.pack(demand, limit).unwrap();
                assert_eq!(run.packed + run.remaining, demand);
                assert_layer_invariants(&run, &boxes, allow_mixed_heights);
                for container in &run.containers {
                    assert!(container.used_height_cm() <= 160);
                    assert!(container.used_weight_kg() <= 600.0 + EPSILON_GENERAL);
                }
            }
        }
    }
}

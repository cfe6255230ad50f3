//! Footprint helpers for flat-layer stacking.
//!
//! A layer is a grid of identical footprints laid onto the pallet base. This
//! module computes how many footprints fit, and derives the per-type profile
//! the layer builder works with for one container type.

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{BoxCatalog, BoxSpec, ContainerSpec};
use crate::types::ItemType;

/// Number of boxes that fit side by side on the pallet base.
///
/// Tries the box unrotated and rotated by 90° and keeps the better grid.
///
/// # Parameters
/// * `base` - Pallet base (length, width) in cm
/// * `footprint` - Box footprint (length, width) in cm
///
/// # Example
/// ```
/// use pallet_planner::geometry::slots_per_layer;
///
/// // 2×3 unrotated beats 4×1 rotated
/// assert_eq!(slots_per_layer((120, 100), (60, 30)), 6);
/// ```
pub fn slots_per_layer(base: (u32, u32), footprint: (u32, u32)) -> u32 {
    let (base_l, base_w) = base;
    let (box_l, box_w) = footprint;
    if box_l == 0 || box_w == 0 {
        return 0;
    }
    let unrotated = (base_l / box_l) * (base_w / box_w);
    let rotated = (base_l / box_w) * (base_w / box_l);
    unrotated.max(rotated)
}

/// What the layer builder needs to know about one item type on one pallet type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TypeProfile {
    pub slots_per_layer: u32,
    pub height_cm: u32,
    pub weight_kg: f64,
}

/// Why an item type cannot be used on a container type.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct CatalogIssue {
    pub item_type: ItemType,
    pub message: String,
}

/// Per-type profiles for one container type. Invalid types have no profile.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerProfiles {
    profiles: [Option<TypeProfile>; ItemType::COUNT],
}

impl LayerProfiles {
    /// Builds the profiles of all catalogued types for `container`.
    ///
    /// A type is excluded, and reported, if its box spec is invalid or not a
    /// single box fits onto the pallet base. Types without a box spec are
    /// silently absent.
    pub fn for_container(
        container: &ContainerSpec,
        boxes: &BoxCatalog,
    ) -> (Self, Vec<CatalogIssue>) {
        let mut profiles = Self::default();
        let mut issues = Vec::new();

        for item in ItemType::ALL {
            let Some(spec) = boxes.get(item) else {
                continue;
            };
            match profile_for(container, spec) {
                Ok(profile) => profiles.profiles[item.index()] = Some(profile),
                Err(message) => issues.push(CatalogIssue {
                    item_type: item,
                    message,
                }),
            }
        }

        (profiles, issues)
    }

    #[inline]
    pub fn get(&self, item: ItemType) -> Option<&TypeProfile> {
        self.profiles[item.index()].as_ref()
    }

    /// Whether at least one item type can be placed at all.
    pub fn any_usable(&self) -> bool {
        self.profiles.iter().any(Option::is_some)
    }
}

fn profile_for(container: &ContainerSpec, spec: &BoxSpec) -> Result<TypeProfile, String> {
    spec.validate().map_err(|err| err.to_string())?;

    let slots = slots_per_layer(
        (container.base_length_cm, container.base_width_cm),
        (spec.length_cm, spec.width_cm),
    );
    if slots == 0 {
        return Err(format!(
            "{}x{} cm box does not fit onto the {}x{} cm base of '{}'",
            spec.length_cm,
            spec.width_cm,
            container.base_length_cm,
            container.base_width_cm,
            container.code
        ));
    }

    Ok(TypeProfile {
        slots_per_layer: slots,
        height_cm: spec.height_cm,
        weight_kg: spec.weight_kg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_pallet() -> ContainerSpec {
        ContainerSpec::new("full", "Full pallet", (120, 100), 220, 1200.0).unwrap()
    }

    #[test]
    fn test_slots_prefers_better_orientation() {
        assert_eq!(slots_per_layer((120, 100), (60, 30)), 6);
        // 40x40 laptops: 3x2 either way
        assert_eq!(slots_per_layer((120, 80), (40, 40)), 6);
        // 35x25 minis: 3x4 unrotated vs 4x2 rotated on 120x100
        assert_eq!(slots_per_layer((120, 100), (35, 25)), 12);
    }

    #[test]
    fn test_slots_zero_when_box_exceeds_base() {
        assert_eq!(slots_per_layer((120, 80), (130, 90)), 0);
        assert_eq!(slots_per_layer((120, 80), (0, 30)), 0);
    }

    #[test]
    fn test_profiles_exclude_invalid_types() {
        let boxes = BoxCatalog {
            tower: Some(BoxSpec {
                length_cm: 60,
                width_cm: 30,
                height_cm: 25,
                weight_kg: 10.0,
            }),
            laptop: Some(BoxSpec {
                length_cm: 40,
                width_cm: 40,
                height_cm: 0,
                weight_kg: 4.0,
            }),
            mini_pc: Some(BoxSpec {
                length_cm: 200,
                width_cm: 150,
                height_cm: 15,
                weight_kg: 3.0,
            }),
        };

        let (profiles, issues) = LayerProfiles::for_container(&full_pallet(), &boxes);

        assert_eq!(
            profiles.get(ItemType::Tower),
            Some(&TypeProfile {
                slots_per_layer: 6,
                height_cm: 25,
                weight_kg: 10.0
            })
        );
        assert!(profiles.get(ItemType::Laptop).is_none());
        assert!(profiles.get(ItemType::MiniPc).is_none());
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].item_type, ItemType::Laptop);
        assert_eq!(issues[1].item_type, ItemType::MiniPc);
        assert!(profiles.any_usable());
    }

    #[test]
    fn test_missing_box_spec_is_not_an_issue() {
        let (profiles, issues) =
            LayerProfiles::for_container(&full_pallet(), &BoxCatalog::default());
        assert!(issues.is_empty());
        assert!(!profiles.any_usable());
    }
}

//! Catalog records consumed by the planner.
//!
//! This module defines the read-only master data a planning call works on:
//! - `BoxSpec` / `BoxCatalog`: physical size and weight of each item type
//! - `ContainerSpec`: a pallet type with footprint and capacity limits
//! - `Carrier` and `RateTier`: who ships, and at what price per bracket
//!
//! Identifiers are typed newtypes so the core never has to guess whether a
//! value is an id or a code.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{ItemType, validation};

/// Validation error for catalog data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),
    #[error("Invalid weight: {0}")]
    InvalidWeight(String),
    #[error("Invalid rate: {0}")]
    InvalidRate(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Destination pricing region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Carrier identifier as stored in the rate table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CarrierId(pub u32);

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Code of a container type, e.g. `full` or `half`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ContainerCode(pub String);

impl ContainerCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerCode {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Outer box of one item type.
///
/// # Fields
/// * `length_cm`, `width_cm` - Footprint of the box
/// * `height_cm` - Stacking height of the box
/// * `weight_kg` - Weight of one box including contents
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxSpec {
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
    pub weight_kg: f64,
}

impl BoxSpec {
    /// Creates a new box spec with validation.
    ///
    /// # Examples
    /// ```
    /// use pallet_planner::model::BoxSpec;
    ///
    /// assert!(BoxSpec::new(60, 30, 25, 10.0).is_ok());
    /// assert!(BoxSpec::new(60, 0, 25, 10.0).is_err());
    /// ```
    pub fn new(
        length_cm: u32,
        width_cm: u32,
        height_cm: u32,
        weight_kg: f64,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            length_cm,
            width_cm,
            height_cm,
            weight_kg,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Checks that every dimension and the weight are positive.
    ///
    /// Catalog data arrives from an external store, so records may be
    /// constructed without going through `new`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_length_cm(self.length_cm, "Box length")
            .and_then(|_| validation::validate_length_cm(self.width_cm, "Box width"))
            .and_then(|_| validation::validate_length_cm(self.height_cm, "Box height"))
            .map_err(ValidationError::InvalidDimension)?;
        validation::validate_weight(self.weight_kg, "Box weight")
            .map_err(ValidationError::InvalidWeight)?;
        Ok(())
    }
}

/// Box spec per item type. A missing entry excludes that type from packing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxCatalog {
    #[serde(default)]
    pub tower: Option<BoxSpec>,
    #[serde(default)]
    pub laptop: Option<BoxSpec>,
    #[serde(default)]
    pub mini_pc: Option<BoxSpec>,
}

impl BoxCatalog {
    pub fn get(&self, item: ItemType) -> Option<&BoxSpec> {
        match item {
            ItemType::Tower => self.tower.as_ref(),
            ItemType::Laptop => self.laptop.as_ref(),
            ItemType::MiniPc => self.mini_pc.as_ref(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, item: ItemType, spec: BoxSpec) -> Self {
        match item {
            ItemType::Tower => self.tower = Some(spec),
            ItemType::Laptop => self.laptop = Some(spec),
            ItemType::MiniPc => self.mini_pc = Some(spec),
        }
        self
    }
}

/// Template for a pallet type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContainerSpec {
    pub code: ContainerCode,
    pub name: String,
    pub base_length_cm: u32,
    pub base_width_cm: u32,
    pub max_height_cm: u32,
    pub max_weight_kg: f64,
}

impl ContainerSpec {
    /// Creates a new container spec after validating the limits.
    pub fn new(
        code: impl Into<ContainerCode>,
        name: impl Into<String>,
        base: (u32, u32),
        max_height_cm: u32,
        max_weight_kg: f64,
    ) -> Result<Self, ValidationError> {
        let spec = Self {
            code: code.into(),
            name: name.into(),
            base_length_cm: base.0,
            base_width_cm: base.1,
            max_height_cm,
            max_weight_kg,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate_length_cm(self.base_length_cm, "Container length")
            .and_then(|_| validation::validate_length_cm(self.base_width_cm, "Container width"))
            .and_then(|_| validation::validate_length_cm(self.max_height_cm, "Container height"))
            .map_err(ValidationError::InvalidDimension)?;
        validation::validate_weight(self.max_weight_kg, "Container max weight")
            .map_err(ValidationError::InvalidWeight)?;
        Ok(())
    }
}

impl From<String> for ContainerCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pricing and service provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Carrier {
    pub id: CarrierId,
    pub code: String,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// One price bracket: `price_per_container` applies when the number of
/// containers of `container_code` falls within `[min_count, max_count]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RateTier {
    pub zone_id: ZoneId,
    pub container_code: ContainerCode,
    #[serde(default)]
    pub carrier_id: Option<CarrierId>,
    pub min_count: u32,
    pub max_count: u32,
    pub price_per_container: f64,
}

impl RateTier {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min_count > self.max_count {
            return Err(ValidationError::InvalidRate(format!(
                "bracket [{}, {}] for '{}' in zone {} is inverted",
                self.min_count, self.max_count, self.container_code, self.zone_id
            )));
        }
        validation::validate_price(self.price_per_container).map_err(ValidationError::InvalidRate)
    }

    /// Whether `count` falls inside the inclusive bracket.
    #[inline]
    pub fn contains(&self, count: u32) -> bool {
        self.min_count <= count && count <= self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_spec_rejects_zero_dimension_and_weight() {
        assert!(matches!(
            BoxSpec::new(0, 30, 25, 10.0),
            Err(ValidationError::InvalidDimension(_))
        ));
        assert!(matches!(
            BoxSpec::new(60, 30, 25, 0.0),
            Err(ValidationError::InvalidWeight(_))
        ));
    }

    #[test]
    fn container_spec_validates_limits() {
        assert!(ContainerSpec::new("full", "Full pallet", (120, 100), 220, 1200.0).is_ok());
        assert!(ContainerSpec::new("broken", "Broken", (120, 0), 220, 1200.0).is_err());
        assert!(ContainerSpec::new("broken", "Broken", (120, 100), 220, -1.0).is_err());
    }

    #[test]
    fn box_catalog_lookup_by_type() {
        let tower = BoxSpec::new(60, 30, 25, 10.0).unwrap();
        let catalog = BoxCatalog::default().with(ItemType::Tower, tower);
        assert_eq!(catalog.get(ItemType::Tower), Some(&tower));
        assert_eq!(catalog.get(ItemType::Laptop), None);
    }

    #[test]
    fn rate_tier_bracket_is_inclusive() {
        let tier = RateTier {
            zone_id: ZoneId(1),
            container_code: "full".into(),
            carrier_id: None,
            min_count: 2,
            max_count: 3,
            price_per_container: 60.0,
        };
        assert!(!tier.contains(1));
        assert!(tier.contains(2));
        assert!(tier.contains(3));
        assert!(!tier.contains(4));
        assert!(tier.validate().is_ok());

        let inverted = RateTier {
            min_count: 4,
            ..tier
        };
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvalidRate(_))
        ));
    }

    #[test]
    fn carrier_defaults_to_active_when_flag_missing() {
        let carrier: Carrier =
            serde_json::from_str(r#"{"id": 3, "code": "euro_fast", "name": "EuroFast"}"#).unwrap();
        assert!(carrier.active);
        assert_eq!(carrier.id, CarrierId(3));
    }
}

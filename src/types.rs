//! Common types for item demand and packing order.
//!
//! The item types handled by the planner form a small closed set, so demand
//! and per-type values are fixed-field records instead of string-keyed maps.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point weight comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Physical item type that can be stacked onto a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Tower,
    Laptop,
    MiniPc,
}

impl ItemType {
    /// Number of known item types.
    pub const COUNT: usize = 3;

    /// All item types in declaration order.
    pub const ALL: [ItemType; Self::COUNT] = [ItemType::Tower, ItemType::Laptop, ItemType::MiniPc];

    /// Stable external code, matching the serialized form.
    pub const fn code(self) -> &'static str {
        match self {
            ItemType::Tower => "tower",
            ItemType::Laptop => "laptop",
            ItemType::MiniPc => "mini_pc",
        }
    }

    /// Dense index for array-backed per-type tables.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            ItemType::Tower => 0,
            ItemType::Laptop => 1,
            ItemType::MiniPc => 2,
        }
    }

    /// Types that may top up the free slots of a layer whose base is `self`.
    ///
    /// Towers leave gaps that minis fill best, laptops can be completed with
    /// minis, and a mini layer is already as dense as it gets.
    pub const fn fill_order(self) -> &'static [ItemType] {
        match self {
            ItemType::Tower => &[ItemType::MiniPc, ItemType::Laptop],
            ItemType::Laptop => &[ItemType::MiniPc],
            ItemType::MiniPc => &[],
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemType::ALL
            .into_iter()
            .find(|item| item.code() == s.trim())
            .ok_or_else(|| format!("unknown item type '{}'", s))
    }
}

/// Count per item type. Used for demand, packed totals and remaining totals.
///
/// # Examples
/// ```
/// use pallet_planner::types::{ItemCounts, ItemType};
///
/// let demand = ItemCounts::new(5, 2, 0);
/// assert_eq!(demand.get(ItemType::Tower), 5);
/// assert_eq!(demand.total(), 7);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ItemCounts {
    #[serde(default)]
    pub tower: u32,
    #[serde(default)]
    pub laptop: u32,
    #[serde(default)]
    pub mini_pc: u32,
}

impl ItemCounts {
    #[inline]
    pub const fn new(tower: u32, laptop: u32, mini_pc: u32) -> Self {
        Self {
            tower,
            laptop,
            mini_pc,
        }
    }

    #[inline]
    pub const fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Count for a single type.
    #[inline]
    pub const fn get(&self, item: ItemType) -> u32 {
        match item {
            ItemType::Tower => self.tower,
            ItemType::Laptop => self.laptop,
            ItemType::MiniPc => self.mini_pc,
        }
    }

    /// Mutable access to the count of a single type.
    #[inline]
    pub fn get_mut(&mut self, item: ItemType) -> &mut u32 {
        match item {
            ItemType::Tower => &mut self.tower,
            ItemType::Laptop => &mut self.laptop,
            ItemType::MiniPc => &mut self.mini_pc,
        }
    }

    /// Sum over all types, widened so that any valid demand fits.
    #[inline]
    pub const fn total(&self) -> u64 {
        self.tower as u64 + self.laptop as u64 + self.mini_pc as u64
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.tower == 0 && self.laptop == 0 && self.mini_pc == 0
    }

    /// Iterates `(type, count)` pairs in declaration order, zeros included.
    pub fn iter(&self) -> impl Iterator<Item = (ItemType, u32)> + '_ {
        ItemType::ALL.into_iter().map(move |item| (item, self.get(item)))
    }

    /// Types with a non-zero count.
    pub fn present_types(&self) -> impl Iterator<Item = ItemType> + '_ {
        self.iter()
            .filter(|(_, count)| *count > 0)
            .map(|(item, _)| item)
    }

    /// Component-wise subtraction, `None` if any component would underflow.
    pub fn checked_sub(&self, rhs: &Self) -> Option<Self> {
        Some(Self {
            tower: self.tower.checked_sub(rhs.tower)?,
            laptop: self.laptop.checked_sub(rhs.laptop)?,
            mini_pc: self.mini_pc.checked_sub(rhs.mini_pc)?,
        })
    }
}

impl Add for ItemCounts {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(
            self.tower + rhs.tower,
            self.laptop + rhs.laptop,
            self.mini_pc + rhs.mini_pc,
        )
    }
}

impl Sub for ItemCounts {
    type Output = Self;

    /// Saturating component-wise subtraction.
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(
            self.tower.saturating_sub(rhs.tower),
            self.laptop.saturating_sub(rhs.laptop),
            self.mini_pc.saturating_sub(rhs.mini_pc),
        )
    }
}

/// Order in which item types are tried as the base of a new layer.
///
/// Heaviest and most stable types go first so they end up at the bottom of
/// the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackingPriority {
    order: [ItemType; ItemType::COUNT],
}

impl PackingPriority {
    /// Towers at the bottom, then laptops, minis last to fill gaps.
    pub const STANDARD: PackingPriority = PackingPriority {
        order: [ItemType::Tower, ItemType::Laptop, ItemType::MiniPc],
    };

    /// Creates a custom priority. Every item type must appear exactly once.
    pub fn new(order: [ItemType; ItemType::COUNT]) -> Result<Self, String> {
        let mut seen = [false; ItemType::COUNT];
        for item in order {
            if seen[item.index()] {
                return Err(format!("item type '{}' listed twice in packing priority", item));
            }
            seen[item.index()] = true;
        }
        Ok(Self { order })
    }

    /// Iterates item types from highest to lowest priority.
    pub fn iter(&self) -> impl Iterator<Item = ItemType> + '_ {
        self.order.iter().copied()
    }
}

impl Default for PackingPriority {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Validation helpers shared by the catalog records.
pub mod validation {

    /// Validates a length in centimetres.
    ///
    /// # Parameters
    /// * `value` - The value to validate
    /// * `name` - Name of the dimension for error messages
    pub fn validate_length_cm(value: u32, name: &str) -> Result<(), String> {
        if value == 0 {
            return Err(format!("{} must be positive, got: 0", name));
        }
        Ok(())
    }

    /// Validates a weight in kilograms.
    ///
    /// # Returns
    /// `Ok(())` for valid values, otherwise error text
    pub fn validate_weight(value: f64, name: &str) -> Result<(), String> {
        if value.is_nan() {
            return Err(format!("{} must not be NaN", name));
        }
        if value.is_infinite() {
            return Err(format!("{} must not be infinite", name));
        }
        if value <= 0.0 {
            return Err(format!("{} must be positive, got: {}", name, value));
        }
        Ok(())
    }

    /// Validates a price per container. Zero is allowed, negative is not.
    pub fn validate_price(value: f64) -> Result<(), String> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("Price must be a non-negative number, got: {}", value));
        }
        Ok(())
    }
}

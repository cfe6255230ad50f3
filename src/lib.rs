//! Pallet shipment quoting: packs item demand onto pallets, prices the
//! loads with carrier rate tiers and recommends the cheapest plan.

pub mod api;
pub mod carriers;
pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod model;
pub mod optimizer;
pub mod planner;
pub mod pricing;
pub mod types;

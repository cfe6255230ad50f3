//! Tiered rate lookup.
//!
//! Rates are brackets of container counts per zone, pallet type and carrier.
//! A plan using `n` pallets of one type pays the bracket price containing `n`
//! for each of them.

use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::model::{CarrierId, ContainerCode, RateTier, ValidationError, ZoneId};

/// Read-only snapshot of rate tiers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateTable {
    tiers: Vec<RateTier>,
}

/// Price resolved for one pallet type and count.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Quote {
    pub container_code: ContainerCode,
    pub container_count: u32,
    pub price_per_container: f64,
    pub total: f64,
    pub min_count: u32,
    pub max_count: u32,
    /// `true` if no bracket contained the count and the top bracket was used
    pub overflow_bracket: bool,
}

impl RateTable {
    /// Builds a table after validating every tier.
    pub fn new(tiers: Vec<RateTier>) -> Result<Self, ValidationError> {
        for tier in &tiers {
            tier.validate()?;
        }
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[RateTier] {
        &self.tiers
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Tiers of a zone, optionally restricted to one carrier.
    pub fn tiers_for<'a>(
        &'a self,
        zone: ZoneId,
        carrier: Option<CarrierId>,
    ) -> impl Iterator<Item = &'a RateTier> + 'a {
        self.tiers.iter().filter(move |tier| {
            tier.zone_id == zone && carrier.is_none_or(|id| tier.carrier_id == Some(id))
        })
    }

    /// Whether `carrier` has at least one tier in `zone`.
    pub fn carrier_serves_zone(&self, carrier: CarrierId, zone: ZoneId) -> bool {
        self.tiers_for(zone, Some(carrier)).next().is_some()
    }

    /// Resolves the total price of `count` pallets of `container`.
    ///
    /// Picks the tier whose bracket contains `count`, preferring the smallest
    /// `min_count`. If the count lies outside every bracket, the tier with the
    /// largest `max_count` is used for all pallets. That fallback can misprice
    /// orders beyond the published brackets, so it is logged and flagged on
    /// the quote.
    ///
    /// # Parameters
    /// * `zone` - Destination zone
    /// * `container` - Pallet type code
    /// * `count` - Number of pallets of this type in the plan
    /// * `carrier` - Restrict to this carrier's tiers; `None` considers all tiers of the zone
    ///
    /// # Returns
    /// `None` when the zone has no tier at all for this pallet type (or `count` is zero)
    pub fn quote(
        &self,
        zone: ZoneId,
        container: &ContainerCode,
        count: u32,
        carrier: Option<CarrierId>,
    ) -> Option<Quote> {
        if count == 0 {
            return None;
        }

        let mut matching: Option<&RateTier> = None;
        let mut top: Option<&RateTier> = None;

        for tier in self
            .tiers_for(zone, carrier)
            .filter(|tier| &tier.container_code == container)
        {
            if tier.contains(count) && matching.is_none_or(|m| tier.min_count < m.min_count) {
                matching = Some(tier);
            }
            if top.is_none_or(|t| tier.max_count > t.max_count) {
                top = Some(tier);
            }
        }

        let (tier, overflow_bracket) = match (matching, top) {
            (Some(tier), _) => (tier, false),
            (None, Some(tier)) => {
                warn!(
                    zone = %zone,
                    container = %container,
                    count,
                    carrier = ?carrier,
                    bracket_max = tier.max_count,
                    "no rate bracket contains the pallet count, using the top bracket"
                );
                (tier, true)
            }
            (None, None) => return None,
        };

        Some(Quote {
            container_code: container.clone(),
            container_count: count,
            price_per_container: tier.price_per_container,
            total: tier.price_per_container * f64::from(count),
            min_count: tier.min_count,
            max_count: tier.max_count,
            overflow_bracket,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(
        zone: u32,
        code: &str,
        carrier: Option<u32>,
        bracket: (u32, u32),
        price: f64,
    ) -> RateTier {
        RateTier {
            zone_id: ZoneId(zone),
            container_code: code.into(),
            carrier_id: carrier.map(CarrierId),
            min_count: bracket.0,
            max_count: bracket.1,
            price_per_container: price,
        }
    }

    fn light_table() -> RateTable {
        RateTable::new(vec![
            tier(1, "light", Some(1), (1, 1), 65.76),
            tier(1, "light", Some(1), (2, 2), 63.19),
            tier(1, "light", Some(1), (3, 5), 60.05),
            tier(1, "light", Some(2), (1, 10), 70.00),
            tier(2, "light", Some(1), (1, 1), 99.00),
        ])
        .unwrap()
    }

    #[test]
    fn quote_uses_bracket_containing_count() {
        let table = light_table();
        let quote = table
            .quote(ZoneId(1), &"light".into(), 2, Some(CarrierId(1)))
            .unwrap();
        assert!((quote.price_per_container - 63.19).abs() < 1e-9);
        assert!((quote.total - 126.38).abs() < 1e-9);
        assert!(!quote.overflow_bracket);

        let quote = table
            .quote(ZoneId(1), &"light".into(), 4, Some(CarrierId(1)))
            .unwrap();
        assert_eq!((quote.min_count, quote.max_count), (3, 5));
        assert!((quote.total - 4.0 * 60.05).abs() < 1e-9);
    }

    #[test]
    fn overlapping_brackets_prefer_smallest_min() {
        let table = RateTable::new(vec![
            tier(1, "full", None, (2, 10), 50.0),
            tier(1, "full", None, (1, 5), 55.0),
        ])
        .unwrap();
        let quote = table.quote(ZoneId(1), &"full".into(), 3, None).unwrap();
        assert!((quote.price_per_container - 55.0).abs() < 1e-9);
    }

    #[test]
    fn count_beyond_brackets_falls_back_to_top_bracket() {
        let table = light_table();
        let quote = table
            .quote(ZoneId(1), &"light".into(), 7, Some(CarrierId(1)))
            .unwrap();
        assert!(quote.overflow_bracket);
        assert_eq!(quote.max_count, 5);
        assert!((quote.total - 7.0 * 60.05).abs() < 1e-9);
    }

    #[test]
    fn missing_tiers_yield_no_quote() {
        let table = light_table();
        assert!(table.quote(ZoneId(3), &"light".into(), 1, None).is_none());
        assert!(table.quote(ZoneId(1), &"full".into(), 1, None).is_none());
        assert!(table
            .quote(ZoneId(2), &"light".into(), 1, Some(CarrierId(2)))
            .is_none());
        assert!(table.quote(ZoneId(1), &"light".into(), 0, None).is_none());
    }

    #[test]
    fn carrier_scope_filters_tiers() {
        let table = light_table();
        let quote = table
            .quote(ZoneId(1), &"light".into(), 1, Some(CarrierId(2)))
            .unwrap();
        assert!((quote.price_per_container - 70.0).abs() < 1e-9);
        assert!(table.carrier_serves_zone(CarrierId(2), ZoneId(1)));
        assert!(!table.carrier_serves_zone(CarrierId(2), ZoneId(2)));
    }

    #[test]
    fn invalid_tiers_are_rejected() {
        let result = RateTable::new(vec![tier(1, "full", None, (3, 1), 10.0)]);
        assert!(matches!(result, Err(ValidationError::InvalidRate(_))));
        let result = RateTable::new(vec![tier(1, "full", None, (1, 1), -10.0)]);
        assert!(result.is_err());
    }
}

//! Master data and the read-only snapshots handed to the planner.
//!
//! Master data is a JSON document with box types, pallet types, carriers,
//! zones, provinces and rate tiers. A demo dataset is embedded into the
//! binary; a file path can replace it at startup.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::CatalogError;
use crate::model::{
    BoxCatalog, BoxSpec, Carrier, CarrierId, ContainerSpec, RateTier, ValidationError, ZoneId,
};
use crate::pricing::RateTable;
use crate::types::ItemType;

/// Embedded master data files.
#[derive(RustEmbed)]
#[folder = "data/"]
struct EmbeddedData;

/// File name of the embedded demo dataset.
pub const EMBEDDED_MASTER_DATA: &str = "master_data.json";

/// Box type as stored in master data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BoxTypeRecord {
    pub item_type: ItemType,
    pub name: String,
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
    pub weight_kg: f64,
}

impl BoxTypeRecord {
    pub fn spec(&self) -> BoxSpec {
        BoxSpec {
            length_cm: self.length_cm,
            width_cm: self.width_cm,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Zone {
    pub id: ZoneId,
    pub country_code: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Province {
    pub id: u32,
    pub name: String,
    pub zone_id: ZoneId,
}

/// Where a shipment goes, as given by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Destination {
    #[serde(rename = "province_id")]
    Province(u32),
    #[serde(rename = "zone_id")]
    Zone(ZoneId),
}

/// The complete master data document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterData {
    #[serde(default)]
    pub box_types: Vec<BoxTypeRecord>,
    #[serde(default)]
    pub pallet_types: Vec<ContainerSpec>,
    #[serde(default)]
    pub carriers: Vec<Carrier>,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub provinces: Vec<Province>,
    #[serde(default)]
    pub rates: Vec<RateTier>,
}

impl MasterData {
    /// Parses and validates a JSON document.
    pub fn from_json(raw: &[u8]) -> Result<Self, CatalogError> {
        let data: MasterData = serde_json::from_slice(raw)?;
        data.validate()?;
        Ok(data)
    }

    /// Reads master data from a file.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// The demo dataset compiled into the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        let file = EmbeddedData::get(EMBEDDED_MASTER_DATA)
            .ok_or_else(|| CatalogError::MissingEmbedded(EMBEDDED_MASTER_DATA.to_string()))?;
        Self::from_json(&file.data)
    }

    /// Checks cross references and the limits of pallet types and rates.
    ///
    /// Box types are not checked here: an unusable box type only excludes
    /// its item type from packing and is reported on each plan.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut item_types = HashSet::new();
        for record in &self.box_types {
            if !item_types.insert(record.item_type) {
                return Err(invalid(format!(
                    "box type '{}' defined twice",
                    record.item_type
                )));
            }
        }

        let mut codes = HashSet::new();
        for spec in &self.pallet_types {
            spec.validate()?;
            if !codes.insert(&spec.code) {
                return Err(invalid(format!("pallet type '{}' defined twice", spec.code)));
            }
        }

        let zones: HashSet<ZoneId> = self.zones.iter().map(|zone| zone.id).collect();
        if zones.len() != self.zones.len() {
            return Err(invalid("zone ids must be unique".to_string()));
        }
        let carriers: HashSet<CarrierId> = self.carriers.iter().map(|c| c.id).collect();
        if carriers.len() != self.carriers.len() {
            return Err(invalid("carrier ids must be unique".to_string()));
        }

        for province in &self.provinces {
            if !zones.contains(&province.zone_id) {
                return Err(CatalogError::UnknownZone(province.zone_id));
            }
        }

        for tier in &self.rates {
            tier.validate()?;
            if !zones.contains(&tier.zone_id) {
                return Err(CatalogError::UnknownZone(tier.zone_id));
            }
            if !codes.contains(&tier.container_code) {
                return Err(invalid(format!(
                    "rate references unknown pallet type '{}'",
                    tier.container_code
                )));
            }
            if let Some(carrier) = tier.carrier_id {
                if !carriers.contains(&carrier) {
                    return Err(invalid(format!("rate references unknown carrier {}", carrier)));
                }
            }
        }

        Ok(())
    }

    fn box_catalog(&self) -> BoxCatalog {
        self.box_types
            .iter()
            .fold(BoxCatalog::default(), |catalog, record| {
                catalog.with(record.item_type, record.spec())
            })
    }
}

fn invalid(message: String) -> CatalogError {
    CatalogError::Invalid(ValidationError::InvalidConfiguration(message))
}

/// Everything one planning call reads, fixed for its duration.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogSnapshot {
    pub boxes: BoxCatalog,
    pub containers: Vec<ContainerSpec>,
    /// All known carriers, active or not
    pub carriers: Vec<Carrier>,
    pub rates: RateTable,
}

impl CatalogSnapshot {
    pub fn carrier(&self, id: CarrierId) -> Option<&Carrier> {
        self.carriers.iter().find(|carrier| carrier.id == id)
    }
}

/// Source of catalog snapshots keyed by destination zone.
pub trait CatalogRepository {
    fn snapshot(&self, zone: ZoneId) -> Result<CatalogSnapshot, CatalogError>;
}

/// Maps a destination to its pricing zone.
pub trait GeographyResolver {
    fn resolve_zone(&self, destination: Destination) -> Result<ZoneId, CatalogError>;
}

/// Master data held in memory, shared read-only between requests.
#[derive(Clone, Debug)]
pub struct InMemoryCatalog {
    data: MasterData,
    boxes: BoxCatalog,
}

impl InMemoryCatalog {
    pub fn new(data: MasterData) -> Result<Self, CatalogError> {
        data.validate()?;
        let boxes = data.box_catalog();
        info!(
            pallet_types = data.pallet_types.len(),
            carriers = data.carriers.len(),
            zones = data.zones.len(),
            rates = data.rates.len(),
            "master data loaded"
        );
        Ok(Self { data, boxes })
    }

    /// Loads from `path`, or the embedded demo dataset if none is given.
    pub fn load(path: Option<&Path>) -> Result<Self, CatalogError> {
        let data = match path {
            Some(path) => {
                debug!(path = %path.display(), "reading master data file");
                MasterData::from_path(path)?
            }
            None => MasterData::embedded()?,
        };
        Self::new(data)
    }

    pub fn data(&self) -> &MasterData {
        &self.data
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.data.zones.iter().find(|zone| zone.id == id)
    }

    pub fn province(&self, id: u32) -> Option<&Province> {
        self.data.provinces.iter().find(|province| province.id == id)
    }

    /// Zones, optionally of one country (case-insensitive ISO code).
    pub fn zones(&self, country_code: Option<&str>) -> Vec<&Zone> {
        self.data
            .zones
            .iter()
            .filter(|zone| {
                country_code.is_none_or(|code| zone.country_code.eq_ignore_ascii_case(code))
            })
            .collect()
    }

    /// Provinces sorted by name, optionally of one zone.
    pub fn provinces(&self, zone: Option<ZoneId>) -> Vec<&Province> {
        let mut provinces: Vec<&Province> = self
            .data
            .provinces
            .iter()
            .filter(|province| zone.is_none_or(|zone| province.zone_id == zone))
            .collect();
        provinces.sort_by(|a, b| a.name.cmp(&b.name));
        provinces
    }

    /// Human-readable name of a destination, e.g. the province name.
    pub fn destination_label(&self, destination: Destination) -> Option<String> {
        match destination {
            Destination::Province(id) => self.province(id).map(|p| p.name.clone()),
            Destination::Zone(id) => self
                .zone(id)
                .map(|zone| format!("{} ({})", zone.name, zone.country_code)),
        }
    }

    fn require_zone(&self, id: ZoneId) -> Result<&Zone, CatalogError> {
        self.zone(id).ok_or(CatalogError::UnknownZone(id))
    }

    /// Active carriers, sorted by name.
    ///
    /// With a zone, only carriers that have at least one rate tier there.
    pub fn carriers_for_zone(&self, zone: Option<ZoneId>) -> Result<Vec<Carrier>, CatalogError> {
        if let Some(zone) = zone {
            self.require_zone(zone)?;
        }

        let mut carriers: Vec<Carrier> = self
            .data
            .carriers
            .iter()
            .filter(|carrier| carrier.active)
            .filter(|carrier| {
                zone.is_none_or(|zone| {
                    self.data
                        .rates
                        .iter()
                        .any(|tier| tier.zone_id == zone && tier.carrier_id == Some(carrier.id))
                })
            })
            .cloned()
            .collect();
        carriers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(carriers)
    }
}

impl CatalogRepository for InMemoryCatalog {
    fn snapshot(&self, zone: ZoneId) -> Result<CatalogSnapshot, CatalogError> {
        self.require_zone(zone)?;
        let tiers = self
            .data
            .rates
            .iter()
            .filter(|tier| tier.zone_id == zone)
            .cloned()
            .collect();

        Ok(CatalogSnapshot {
            boxes: self.boxes,
            containers: self.data.pallet_types.clone(),
            carriers: self.data.carriers.clone(),
            rates: RateTable::new(tiers)?,
        })
    }
}

impl GeographyResolver for InMemoryCatalog {
    fn resolve_zone(&self, destination: Destination) -> Result<ZoneId, CatalogError> {
        match destination {
            Destination::Zone(zone) => self.require_zone(zone).map(|zone| zone.id),
            Destination::Province(id) => self
                .data
                .provinces
                .iter()
                .find(|province| province.id == id)
                .map(|province| province.zone_id)
                .ok_or(CatalogError::UnknownProvince(id)),
        }
    }
}

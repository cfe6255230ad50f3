//! Caller-facing errors.
//!
//! Conditions that only shrink the candidate set (infeasible pallet types,
//! missing rates) are not errors; they are recorded on the plan. The types
//! here cover contract violations by the caller and broken master data.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{CarrierId, ContainerCode, ValidationError, ZoneId};

/// Planning request that cannot be served as asked.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown container type '{0}'")]
    UnknownContainerType(ContainerCode),
    #[error("unknown carrier id {0}")]
    UnknownCarrier(CarrierId),
    #[error("a single carrier cannot be combined with a carrier comparison")]
    ConflictingCarrierScope,
    #[error("could not start the carrier worker pool: {0}")]
    WorkerPool(String),
}

/// Master data that cannot be loaded or queried.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown zone {0}")]
    UnknownZone(ZoneId),
    #[error("unknown province {0}")]
    UnknownProvince(u32),
    #[error("could not read master data from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed master data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("embedded master data '{0}' is missing")]
    MissingEmbedded(String),
    #[error("invalid master data: {0}")]
    Invalid(#[from] ValidationError),
}

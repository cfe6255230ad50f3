use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::optimizer::PackingConfig;
use crate::planner::PlannerConfig;
use crate::types::{ItemType, PackingPriority};

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub planner: PlannerSettings,
    pub master_data: MasterDataConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&|name| env_string(name))
    }

    fn from_source(source: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_source(source),
            planner: PlannerSettings::from_source(source),
            master_data: MasterDataConfig::from_source(source),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "PALLET_PLANNER_API_HOST";
    const PORT_VAR: &'static str = "PALLET_PLANNER_API_PORT";

    fn from_source(source: &dyn Fn(&str) -> Option<String>) -> Self {
        let default_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        let host_value = source(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (default_ip, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = load_parsed(
            source,
            Self::PORT_VAR,
            Self::DEFAULT_PORT,
            |value| value != 0,
            "must not be 0",
        );

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Where master data comes from.
#[derive(Clone, Debug, Default)]
pub struct MasterDataConfig {
    path: Option<PathBuf>,
}

impl MasterDataConfig {
    const PATH_VAR: &'static str = "PALLET_PLANNER_MASTER_DATA";

    fn from_source(source: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            path: source(Self::PATH_VAR).map(PathBuf::from),
        }
    }

    /// Master data file; `None` selects the embedded demo dataset.
    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }
}

/// Planner tunables and worker pool size.
#[derive(Clone, Debug)]
pub struct PlannerSettings {
    planner: PlannerConfig,
    carrier_workers: usize,
    allow_mixed_heights: bool,
}

impl PlannerSettings {
    pub const DEFAULT_CARRIER_WORKERS: usize = 4;
    pub const DEFAULT_ALLOW_MIXED_HEIGHTS: bool = true;

    const MIX_MAX_TYPES_VAR: &'static str = "PALLET_PLANNER_MIX_MAX_TYPES";
    const MIX_MAX_PER_TYPE_VAR: &'static str = "PALLET_PLANNER_MIX_MAX_PER_TYPE";
    const MAX_ALTERNATIVES_VAR: &'static str = "PALLET_PLANNER_MAX_ALTERNATIVES";
    const RECOMMEND_MAX_DELTA_VAR: &'static str = "PALLET_PLANNER_RECOMMEND_MAX_DELTA";
    const UNDERUTILIZED_RATIO_VAR: &'static str = "PALLET_PLANNER_UNDERUTILIZED_RATIO";
    const UNDERUTILIZED_UNITS_VAR: &'static str = "PALLET_PLANNER_UNDERUTILIZED_UNITS";
    const MAX_CONTAINERS_VAR: &'static str = "PALLET_PLANNER_MAX_CONTAINERS_PER_RUN";
    const CARRIER_WORKERS_VAR: &'static str = "PALLET_PLANNER_CARRIER_WORKERS";
    const ALLOW_MIXED_HEIGHTS_VAR: &'static str = "PALLET_PLANNER_ALLOW_MIXED_HEIGHTS";
    const PACKING_PRIORITY_VAR: &'static str = "PALLET_PLANNER_PACKING_PRIORITY";

    fn from_source(source: &dyn Fn(&str) -> Option<String>) -> Self {
        let mix_max_types = load_parsed(
            source,
            Self::MIX_MAX_TYPES_VAR,
            PlannerConfig::DEFAULT_MIX_MAX_TYPES,
            |value| value <= 10,
            "must be at most 10",
        );
        let mix_max_per_type = load_parsed(
            source,
            Self::MIX_MAX_PER_TYPE_VAR,
            PlannerConfig::DEFAULT_MIX_MAX_PER_TYPE,
            |value| value <= 10,
            "must be at most 10",
        );
        let max_alternatives = load_parsed(
            source,
            Self::MAX_ALTERNATIVES_VAR,
            PlannerConfig::DEFAULT_MAX_ALTERNATIVES,
            |_| true,
            "",
        );
        let recommend_max_delta = load_f64_with_warning(
            source,
            Self::RECOMMEND_MAX_DELTA_VAR,
            PlannerConfig::DEFAULT_RECOMMEND_MAX_DELTA,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted recommendation threshold changes which alternatives are suggested",
        );
        let underutilized_ratio = load_f64_with_warning(
            source,
            Self::UNDERUTILIZED_RATIO_VAR,
            PackingConfig::DEFAULT_UNDERUTILIZED_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted under-utilization threshold changes last-pallet warnings",
        );
        let underutilized_units = load_parsed(
            source,
            Self::UNDERUTILIZED_UNITS_VAR,
            PackingConfig::DEFAULT_UNDERUTILIZED_UNITS,
            |_| true,
            "",
        );
        let max_containers_per_run = load_parsed(
            source,
            Self::MAX_CONTAINERS_VAR,
            PackingConfig::DEFAULT_MAX_CONTAINERS_PER_RUN,
            |value| value > 0,
            "must be greater than 0",
        );
        let carrier_workers = load_parsed(
            source,
            Self::CARRIER_WORKERS_VAR,
            Self::DEFAULT_CARRIER_WORKERS,
            |value| (1..=64).contains(&value),
            "must be between 1 and 64",
        );

        let allow_mixed_heights = source(Self::ALLOW_MIXED_HEIGHTS_VAR)
            .and_then(|raw| parse_bool(&raw, Self::ALLOW_MIXED_HEIGHTS_VAR))
            .unwrap_or(Self::DEFAULT_ALLOW_MIXED_HEIGHTS);

        let priority = source(Self::PACKING_PRIORITY_VAR)
            .and_then(|raw| parse_priority(&raw, Self::PACKING_PRIORITY_VAR))
            .unwrap_or_default();

        let packing = PackingConfig::builder()
            .priority(priority)
            .max_containers_per_run(max_containers_per_run)
            .underutilized_ratio(underutilized_ratio)
            .underutilized_units(underutilized_units)
            .build();

        let planner = PlannerConfig::builder()
            .mix_max_types(mix_max_types)
            .mix_max_per_type(mix_max_per_type)
            .max_alternatives(max_alternatives)
            .recommend_max_delta(recommend_max_delta)
            .packing(packing)
            .build();

        Self {
            planner,
            carrier_workers,
            allow_mixed_heights,
        }
    }

    /// Returns the configured PlannerConfig.
    pub fn planner_config(&self) -> PlannerConfig {
        self.planner
    }

    /// Number of carriers planned in parallel.
    pub fn carrier_workers(&self) -> usize {
        self.carrier_workers
    }

    /// Layer mode used when a request does not choose one.
    pub fn allow_mixed_heights(&self) -> bool {
        self.allow_mixed_heights
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("Access to {} failed: {}. Using default value.", name, err);
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

/// Parses a comma-separated priority such as `tower,laptop,mini_pc`.
fn parse_priority(raw: &str, var_name: &str) -> Option<PackingPriority> {
    let parsed = raw
        .split(',')
        .map(str::parse::<ItemType>)
        .collect::<Result<Vec<_>, _>>()
        .and_then(|items| {
            <[ItemType; ItemType::COUNT]>::try_from(items).map_err(|items| {
                format!(
                    "expected {} item types, got {}",
                    ItemType::COUNT,
                    items.len()
                )
            })
        })
        .and_then(PackingPriority::new);

    match parsed {
        Ok(priority) => Some(priority),
        Err(err) => {
            warn!(
                "Could not parse {} ('{}'): {}. Using the standard order.",
                var_name, raw, err
            );
            None
        }
    }
}

fn load_parsed<T>(
    source: &dyn Fn(&str) -> Option<String>,
    var_name: &str,
    default: T,
    validator: impl Fn(T) -> bool,
    invalid_hint: &str,
) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match source(var_name) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) if validator(value) => value,
            Ok(_) => {
                warn!(
                    "{} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

fn load_f64_with_warning(
    source: &dyn Fn(&str) -> Option<String>,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    warning: &str,
) -> f64 {
    match source(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) => {
                if !validator(value) {
                    warn!(
                        "{} contains invalid value '{}': {}. Using {}.",
                        var_name, raw, invalid_hint, default
                    );
                    default
                } else {
                    let tolerance = (default.abs().max(1.0)) * 1e-9;
                    if (value - default).abs() > tolerance {
                        warn!("{} ({} = {}).", warning, var_name, value);
                    }
                    value
                }
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}

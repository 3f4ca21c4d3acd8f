use std::path::PathBuf;

use log::LevelFilter;
use sim_helper::simulation_time::SimulationTime;

use crate::apps::adversary::TrackerConfig;
use crate::core::configuration::{ConfigOptions, MobilityKind};
use crate::utility::units::{self, Unit};

/// The largest scenario that fits the 10.0.0.0/24 address plan.
pub const MAX_NODES: u32 = 254;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// An option had no value after merging the file, the CLI and the defaults.
    Missing(&'static str),
    Invalid {
        option: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(option) => write!(f, "Option '{option}' has no value"),
            Self::Invalid { option, reason } => write!(f, "Invalid value for '{option}': {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn invalid(option: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        option,
        reason: reason.into(),
    }
}

fn required<T: Clone>(option: &'static str, value: &Option<T>) -> Result<T, ConfigError> {
    value.clone().ok_or(ConfigError::Missing(option))
}

fn time(
    option: &'static str,
    value: &Option<units::Time<units::TimePrefix>>,
) -> Result<SimulationTime, ConfigError> {
    required(option, value)?
        .to_simtime()
        .map_err(|e| invalid(option, e))
}

fn distance(option: &'static str, value: &Option<f64>) -> Result<f64, ConfigError> {
    let value = required(option, value)?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(option, format!("{value} is not a distance")));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub nodes: u32,
    pub sinks: u32,
    pub adversaries: u32,
    pub mobility: MobilityKind,
    pub node_speed: f64,
    pub node_pause: SimulationTime,
    pub grid_delta: f64,
    pub send_start: SimulationTime,
    /// Bytes.
    pub packet_size: usize,
    /// Bits per second.
    pub data_rate: u64,
    pub data_port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub range: f64,
    pub transmission_delay: SimulationTime,
    pub dpd_window: SimulationTime,
}

/// The simulation configuration after checking that the options describe a scenario that can
/// be built.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub stop_time: SimulationTime,
    pub seed: u64,
    pub log_level: LevelFilter,
    pub data_directory: PathBuf,
    pub progress: bool,
    pub scenario: ScenarioConfig,
    pub network: NetworkConfig,
    pub tracker: TrackerConfig,
}

impl SimConfig {
    pub fn new(config: &ConfigOptions) -> Result<Self, ConfigError> {
        let general = &config.general;
        let stop_time = time("stop_time", &general.stop_time)?;
        if stop_time.is_zero() {
            return Err(invalid("stop_time", "must be positive"));
        }

        let scenario = ScenarioConfig::new(config)?;

        let network = &config.network;
        let network = NetworkConfig {
            range: distance("range", &network.range)?,
            transmission_delay: time("transmission_delay", &network.transmission_delay)?,
            dpd_window: time("dpd_window", &network.dpd_window)?,
        };

        let adversary = &config.adversary;
        let pursuit_speed = required("pursuit_speed", &adversary.pursuit_speed)?;
        if !pursuit_speed.is_finite() || pursuit_speed <= 0.0 {
            return Err(invalid("pursuit_speed", "must be a positive speed"));
        }
        let tracker = TrackerConfig {
            data_port: scenario.data_port,
            pursuit_speed,
            capture_radius: distance("capture_radius", &adversary.capture_radius)?,
            dpd_window: time("adversary.dpd_window", &adversary.dpd_window)?,
        };

        Ok(Self {
            stop_time,
            seed: required("seed", &general.seed)?,
            log_level: log::Level::from(required("log_level", &general.log_level)?)
                .to_level_filter(),
            data_directory: PathBuf::from(required("data_directory", &general.data_directory)?),
            progress: required("progress", &general.progress)?,
            scenario,
            network,
            tracker,
        })
    }
}

impl ScenarioConfig {
    fn new(config: &ConfigOptions) -> Result<Self, ConfigError> {
        let options = &config.scenario;

        let nodes = required("nodes", &options.nodes)?;
        if nodes == 0 || nodes > MAX_NODES {
            return Err(invalid("nodes", format!("must be between 1 and {MAX_NODES}")));
        }
        let sinks = required("sinks", &options.sinks)?;
        if u64::from(sinks) * 2 > u64::from(nodes) {
            return Err(invalid(
                "sinks",
                format!("{sinks} sinks and their sources need more than {nodes} nodes"),
            ));
        }
        let adversaries = required("adversaries", &options.adversaries)?;
        if nodes + adversaries > MAX_NODES {
            return Err(invalid("adversaries", "too many nodes in total"));
        }

        let node_speed = required("node_speed", &options.node_speed)?;
        if !node_speed.is_finite() || node_speed < 0.0 {
            return Err(invalid("node_speed", "must not be negative"));
        }
        let grid_delta = distance("grid_delta", &options.grid_delta)?;
        if grid_delta == 0.0 {
            return Err(invalid("grid_delta", "must be positive"));
        }

        let packet_size = required("packet_size", &options.packet_size)?
            .convert(units::SiPrefix::Base)
            .map_err(|e| invalid("packet_size", e))?
            .value();
        let packet_size =
            usize::try_from(packet_size).map_err(|_| invalid("packet_size", "too large"))?;
        if packet_size == 0 {
            return Err(invalid("packet_size", "must be positive"));
        }
        let data_rate = required("data_rate", &options.data_rate)?
            .convert(units::SiPrefix::Base)
            .map_err(|e| invalid("data_rate", e))?
            .value();
        if data_rate == 0 {
            return Err(invalid("data_rate", "must be positive"));
        }

        Ok(Self {
            nodes,
            sinks,
            adversaries,
            mobility: required("mobility", &options.mobility)?,
            node_speed,
            node_pause: time("node_pause", &options.node_pause)?,
            grid_delta,
            send_start: time("send_start", &options.send_start)?,
            packet_size,
            data_rate,
            data_port: required("data_port", &options.data_port)?,
        })
    }
}

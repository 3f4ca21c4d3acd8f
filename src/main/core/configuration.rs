//! The simulator's configuration and cli parsing code using [serde] and [clap]. Every option can
//! be given in the configuration file, and every option is also exposed as a CLI flag that
//! overrides the file.
//!
//! [schemars] is used to get the option description (its doc comment) and default value so that
//! it can be shown in the CLI help text.
//!
//! This code only parses and checks the format of values. Whether a value makes sense for a
//! scenario is decided when the options are resolved into a
//! [`SimConfig`](crate::core::sim_config::SimConfig).

use std::str::FromStr;

use clap::Parser;
use merge::Merge;
use once_cell::sync::Lazy;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::utility::units;

const START_HELP_TEXT: &str = "\
    Simulate flooding in a mobile ad hoc network while adversaries try to \
    locate the sources of the traffic.";

const END_HELP_TEXT: &str = "\
    If units are not specified, all values are assumed to be given in their base \
    unit (seconds, bytes, bits, etc). Units can optionally be specified (for \
    example: '10 min', '64 B', '64 bit', etc) and are case-sensitive.";

#[derive(Debug, Clone, Parser)]
#[clap(name = "slp-sim", about = START_HELP_TEXT, after_help = END_HELP_TEXT)]
#[clap(version)]
#[clap(next_display_order = None)]
#[clap(hide_possible_values = true)]
pub struct CliOptions {
    /// Path to the configuration file. Use '-' to read from stdin. Without one, the defaults are
    /// used
    pub config: Option<String>,

    /// Exit after printing the final configuration
    #[clap(long)]
    pub show_config: bool,

    #[clap(flatten)]
    pub general: GeneralOptions,

    #[clap(flatten)]
    pub scenario: ScenarioOptions,

    #[clap(flatten)]
    pub network: NetworkOptions,

    #[clap(flatten)]
    pub adversary: AdversaryOptions,
}

/// Options contained in a configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileOptions {
    #[serde(default)]
    pub general: GeneralOptions,

    #[serde(default)]
    pub scenario: ScenarioOptions,

    #[serde(default)]
    pub network: NetworkOptions,

    #[serde(default)]
    pub adversary: AdversaryOptions,
}

/// Configuration options after processing command-line and configuration file options. Every
/// field of every group is `Some`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigOptions {
    pub general: GeneralOptions,
    pub scenario: ScenarioOptions,
    pub network: NetworkOptions,
    pub adversary: AdversaryOptions,
}

impl ConfigOptions {
    pub fn new(config_file: ConfigFileOptions, options: CliOptions) -> Self {
        // keys missing from the file were already filled with defaults by serde, so override
        // config options with command line options
        Self {
            general: options.general.with_defaults(config_file.general),
            scenario: options.scenario.with_defaults(config_file.scenario),
            network: options.network.with_defaults(config_file.network),
            adversary: options.adversary.with_defaults(config_file.adversary),
        }
    }
}

/// Help messages used by Clap for command line arguments, combining the doc string with
/// the Serde default.
static GENERAL_HELP: Lazy<std::collections::HashMap<String, String>> =
    Lazy::new(|| generate_help_strs(schema_for!(GeneralOptions)));

// these must all be Option types since they aren't required by the CLI
#[derive(Debug, Clone, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[clap(next_help_heading = "General (Override configuration file options)")]
#[clap(next_display_order = None)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralOptions {
    /// The simulated time at which the experiment ends
    #[clap(long, value_name = "seconds")]
    #[clap(help = GENERAL_HELP.get("stop_time").unwrap().as_str())]
    pub stop_time: Option<units::Time<units::TimePrefix>>,

    /// Initialize randomness using seed N
    #[clap(long, value_name = "N")]
    #[clap(help = GENERAL_HELP.get("seed").unwrap().as_str())]
    pub seed: Option<u64>,

    /// Log level of output written on stdout. If the simulator was built in release mode, then
    /// log messages at level 'trace' will always be dropped
    #[clap(long, short = 'l', value_name = "level")]
    #[clap(help = GENERAL_HELP.get("log_level").unwrap().as_str())]
    pub log_level: Option<LogLevel>,

    /// Path to store simulation output
    #[clap(long, short = 'd', value_name = "path")]
    #[clap(help = GENERAL_HELP.get("data_directory").unwrap().as_str())]
    pub data_directory: Option<String>,

    /// Show the simulation progress on stderr
    #[clap(long, value_name = "bool")]
    #[clap(help = GENERAL_HELP.get("progress").unwrap().as_str())]
    pub progress: Option<bool>,
}

impl GeneralOptions {
    /// Replace unset (`None`) values of `base` with values from `default`.
    pub fn with_defaults(mut self, default: Self) -> Self {
        self.merge(default);
        self
    }
}

impl Default for GeneralOptions {
    fn default() -> Self {
        Self {
            stop_time: Some(units::Time::new(200, units::TimePrefix::Sec)),
            seed: Some(10),
            log_level: Some(LogLevel::Info),
            data_directory: Some("slp.data".into()),
            progress: Some(false),
        }
    }
}

static SCENARIO_HELP: Lazy<std::collections::HashMap<String, String>> =
    Lazy::new(|| generate_help_strs(schema_for!(ScenarioOptions)));

#[derive(Debug, Clone, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[clap(next_help_heading = "Scenario (Override scenario options)")]
#[clap(next_display_order = None)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioOptions {
    /// Number of ad hoc nodes that run the flooding protocol
    #[clap(long, value_name = "N")]
    #[clap(help = SCENARIO_HELP.get("nodes").unwrap().as_str())]
    pub nodes: Option<u32>,

    /// Number of sink/source pairs. Node i is a sink and node i + sinks its source
    #[clap(long, value_name = "N")]
    #[clap(help = SCENARIO_HELP.get("sinks").unwrap().as_str())]
    pub sinks: Option<u32>,

    /// Number of adversary nodes
    #[clap(long, value_name = "N")]
    #[clap(help = SCENARIO_HELP.get("adversaries").unwrap().as_str())]
    pub adversaries: Option<u32>,

    /// How the ad hoc nodes move
    #[clap(long, value_name = "model")]
    #[clap(help = SCENARIO_HELP.get("mobility").unwrap().as_str())]
    pub mobility: Option<MobilityKind>,

    /// Maximum speed of random waypoint nodes, in meters per second
    #[clap(long, value_name = "m/s")]
    #[clap(help = SCENARIO_HELP.get("node_speed").unwrap().as_str())]
    pub node_speed: Option<f64>,

    /// Pause of random waypoint nodes at each waypoint
    #[clap(long, value_name = "seconds")]
    #[clap(help = SCENARIO_HELP.get("node_pause").unwrap().as_str())]
    pub node_pause: Option<units::Time<units::TimePrefix>>,

    /// Distance between neighbouring grid positions, in meters
    #[clap(long, value_name = "meters")]
    #[clap(help = SCENARIO_HELP.get("grid_delta").unwrap().as_str())]
    pub grid_delta: Option<f64>,

    /// Sources start sending at a random time within one second after this
    #[clap(long, value_name = "seconds")]
    #[clap(help = SCENARIO_HELP.get("send_start").unwrap().as_str())]
    pub send_start: Option<units::Time<units::TimePrefix>>,

    /// Payload size of each data packet
    #[clap(long, value_name = "bytes")]
    #[clap(help = SCENARIO_HELP.get("packet_size").unwrap().as_str())]
    pub packet_size: Option<units::Bytes<units::SiPrefix>>,

    /// Sending rate of each source
    #[clap(long, value_name = "bits")]
    #[clap(help = SCENARIO_HELP.get("data_rate").unwrap().as_str())]
    pub data_rate: Option<units::BitsPerSec<units::SiPrefix>>,

    /// UDP port that sinks listen on
    #[clap(long, value_name = "port")]
    #[clap(help = SCENARIO_HELP.get("data_port").unwrap().as_str())]
    pub data_port: Option<u16>,
}

impl ScenarioOptions {
    /// Replace unset (`None`) values of `base` with values from `default`.
    pub fn with_defaults(mut self, default: Self) -> Self {
        self.merge(default);
        self
    }
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            nodes: Some(100),
            sinks: Some(1),
            adversaries: Some(3),
            mobility: Some(MobilityKind::ConstantPosition),
            node_speed: Some(0.5),
            node_pause: Some(units::Time::new(0, units::TimePrefix::Sec)),
            grid_delta: Some(8.0),
            send_start: Some(units::Time::new(10, units::TimePrefix::Sec)),
            packet_size: Some(units::Bytes::new(64, units::SiPrefix::Base)),
            data_rate: Some(units::BitsPerSec::new(64, units::SiPrefix::Base)),
            data_port: Some(9),
        }
    }
}

static NETWORK_HELP: Lazy<std::collections::HashMap<String, String>> =
    Lazy::new(|| generate_help_strs(schema_for!(NetworkOptions)));

#[derive(Debug, Clone, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[clap(next_help_heading = "Network (Override network options)")]
#[clap(next_display_order = None)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkOptions {
    /// Transmission range of every device, in meters
    #[clap(long, value_name = "meters")]
    #[clap(help = NETWORK_HELP.get("range").unwrap().as_str())]
    pub range: Option<f64>,

    /// Time to put one frame on the air, added to the propagation delay
    #[clap(long, value_name = "seconds")]
    #[clap(help = NETWORK_HELP.get("transmission_delay").unwrap().as_str())]
    pub transmission_delay: Option<units::Time<units::TimePrefix>>,

    /// How long the flooding protocol remembers a packet it has seen
    #[clap(long, value_name = "seconds")]
    #[clap(help = NETWORK_HELP.get("dpd_window").unwrap().as_str())]
    pub dpd_window: Option<units::Time<units::TimePrefix>>,
}

impl NetworkOptions {
    /// Replace unset (`None`) values of `base` with values from `default`.
    pub fn with_defaults(mut self, default: Self) -> Self {
        self.merge(default);
        self
    }
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            range: Some(30.0),
            transmission_delay: Some(units::Time::new(1, units::TimePrefix::Milli)),
            dpd_window: Some(units::Time::new(10, units::TimePrefix::Min)),
        }
    }
}

static ADVERSARY_HELP: Lazy<std::collections::HashMap<String, String>> =
    Lazy::new(|| generate_help_strs(schema_for!(AdversaryOptions)));

#[derive(Debug, Clone, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[clap(next_help_heading = "Adversary (Override adversary options)")]
#[clap(next_display_order = None)]
#[serde(default, deny_unknown_fields)]
pub struct AdversaryOptions {
    /// Speed at which adversaries chase the last transmitter they heard, in meters per second
    #[clap(long, value_name = "m/s")]
    #[clap(help = ADVERSARY_HELP.get("pursuit_speed").unwrap().as_str())]
    pub pursuit_speed: Option<f64>,

    /// An adversary within this distance of a source has captured it, in meters
    #[clap(long, value_name = "meters")]
    #[clap(help = ADVERSARY_HELP.get("capture_radius").unwrap().as_str())]
    pub capture_radius: Option<f64>,

    /// How long an adversary remembers a packet it has overheard
    #[clap(long = "adversary-dpd-window", id = "adversary_dpd_window")]
    #[clap(value_name = "seconds")]
    #[clap(help = ADVERSARY_HELP.get("dpd_window").unwrap().as_str())]
    pub dpd_window: Option<units::Time<units::TimePrefix>>,
}

impl AdversaryOptions {
    /// Replace unset (`None`) values of `base` with values from `default`.
    pub fn with_defaults(mut self, default: Self) -> Self {
        self.merge(default);
        self
    }
}

impl Default for AdversaryOptions {
    fn default() -> Self {
        Self {
            pursuit_speed: Some(1.0),
            capture_radius: Some(5.0),
            dpd_window: Some(units::Time::new(60, units::TimePrefix::Sec)),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum MobilityKind {
    ConstantPosition,
    RandomWaypoint,
}

impl FromStr for MobilityKind {
    type Err = serde_yaml::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
    }
}

/// Generate help strings for objects in a JSON schema, including the Serde defaults if available.
fn generate_help_strs(
    schema: schemars::schema::RootSchema,
) -> std::collections::HashMap<String, String> {
    let mut defaults = std::collections::HashMap::<String, String>::new();
    let Some(object) = schema.schema.object.as_ref() else {
        return defaults;
    };
    for (name, obj) in &object.properties {
        if let Some(meta) = obj.clone().into_object().metadata {
            let description = meta.description.unwrap_or_default();
            let space = if !description.is_empty() { " " } else { "" };
            match meta.default {
                Some(default) => defaults.insert(
                    name.clone(),
                    format!("{}{}[default: {}]", description, space, default),
                ),
                None => defaults.insert(name.clone(), description.to_string()),
            };
        }
    }
    defaults
}

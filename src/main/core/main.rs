use std::ffi::OsString;
use std::io::IsTerminal;

use anyhow::{self, Context};
use clap::Parser;

use crate::core::configuration::{CliOptions, ConfigFileOptions, ConfigOptions};
use crate::core::controller::Controller;
use crate::core::logger::sim_logger;
use crate::core::sim_config::SimConfig;
use crate::core::sim_stats::RunOutcome;

/// Main entry point for the simulator.
pub fn run_sim(args: Vec<OsString>) -> anyhow::Result<RunOutcome> {
    // parse the options from the command line
    let options = match CliOptions::try_parse_from(args) {
        Ok(x) => x,
        Err(e) => {
            if e.use_stderr() {
                eprint!("{e}");
                std::process::exit(1);
            } else {
                print!("{e}");
                std::process::exit(0);
            }
        }
    };

    let config_file = load_config_file(options.config.as_deref())?;

    // generate the final configuration from the config file and cli options
    let config = ConfigOptions::new(config_file, options.clone());

    if options.show_config {
        eprintln!("{config:#?}");
        std::process::exit(0);
    }

    let config = SimConfig::new(&config).context("Invalid configuration")?;

    // disable log buffering during startup so that we see every message immediately in the terminal
    sim_logger::init(config.log_level, !std::io::stdout().is_terminal())
        .context("Could not initialize the logger")?;
    sim_logger::set_buffering_enabled(false);

    // check if some log levels have been compiled out
    if config.log_level > log::STATIC_MAX_LEVEL {
        log::warn!(
            "Log level set to {}, but messages higher than {} have been compiled out",
            config.log_level,
            log::STATIC_MAX_LEVEL,
        );
    }

    std::fs::create_dir_all(&config.data_directory).with_context(|| {
        format!(
            "Could not create the data directory {:?}",
            config.data_directory
        )
    })?;
    let stats_path = config.data_directory.join("sim-stats.json");

    let mut controller = Controller::new(config).context("Could not build the scenario")?;

    // the startup messages are out, so buffer everything the run logs
    sim_logger::set_buffering_enabled(true);
    let outcome = controller.run();
    sim_logger::set_buffering_enabled(false);

    controller
        .stats()
        .write(&stats_path)
        .context("Could not write the simulation statistics")?;
    log::info!("Wrote statistics to {stats_path:?}");

    log::logger().flush();
    Ok(outcome)
}

/// Read the configuration file, or stdin if the path is '-'. With no path, every option takes
/// its default.
fn load_config_file(path: Option<&str>) -> anyhow::Result<ConfigFileOptions> {
    let Some(path) = path else {
        return Ok(ConfigFileOptions::default());
    };

    if path == "-" {
        return serde_yaml::from_reader(std::io::stdin().lock())
            .context("Could not parse configuration from stdin");
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Could not open config file {path:?}"))?;
    serde_yaml::from_reader(file)
        .with_context(|| format!("Could not parse configuration file {path:?}"))
}

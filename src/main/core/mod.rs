pub mod configuration;
pub mod controller;
pub mod logger;
pub mod main;
pub mod manager;
pub mod sim_config;
pub mod sim_stats;
pub mod work;
pub mod worker;
pub mod world;

#[cfg(test)]
pub(crate) mod testing;

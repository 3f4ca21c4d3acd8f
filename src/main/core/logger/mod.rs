pub mod sim_logger;

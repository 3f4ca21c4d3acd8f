//! The workloads of a source location privacy scenario.

pub mod adversary;
pub mod onoff;
pub mod sink;

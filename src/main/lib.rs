// modules with macros must be included before other modules
#[macro_use]
pub mod utility;

pub mod apps;
pub mod core;
pub mod host;
pub mod mobility;
pub mod network;
pub mod routing;

pub mod application;
pub mod network;
pub mod node;

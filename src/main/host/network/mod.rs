pub mod device;
pub mod interface;
pub mod ipv4;
pub mod udp;

//! Builders for unit tests that need a [`World`] without running a whole scenario.

use std::net::Ipv4Addr;

use sim_helper::simulation_time::SimulationTime;
use sim_helper::NodeId;

use crate::core::world::World;
use crate::mobility::{MobilityModel, MobilityRef, MobilityRegistry};
use crate::network::channel::Channel;
use crate::network::directory::DirectoryBuilder;
use crate::network::MacAddress;

pub(crate) struct TestNode {
    pub ip: Option<Ipv4Addr>,
    pub mobility: MobilityModel,
}

/// A world where node `i` has one device (index 0) with MAC address `from_index(i)`.
pub(crate) fn world(nodes: Vec<TestNode>, range: f64) -> (World, Vec<MobilityRef>) {
    let mut channel = Channel::new(range, SimulationTime::MILLISECOND);
    let mut directory = DirectoryBuilder::new();
    let mut mobility = MobilityRegistry::new();
    let mut models = Vec::new();

    for (i, node) in nodes.into_iter().enumerate() {
        let id = NodeId::from(i as u32);
        let mac = MacAddress::from_index(i as u64);
        directory.register(id, mac, node.ip).unwrap();
        models.push(mobility.register(id, node.mobility));
        channel.attach(id, 0, mac);
    }

    (
        World::new(channel, directory.into_directory(), mobility),
        models,
    )
}

use std::sync::Arc;

use crate::mobility::MobilityRegistry;
use crate::network::channel::Channel;
use crate::network::directory::NodeDirectory;

/// Simulation-wide state that is fixed once the topology is built and read by every node.
#[derive(Debug)]
pub struct World {
    pub channel: Channel,
    pub directory: Arc<NodeDirectory>,
    pub mobility: MobilityRegistry,
}

impl World {
    pub fn new(channel: Channel, directory: NodeDirectory, mobility: MobilityRegistry) -> Self {
        Self {
            channel,
            directory: Arc::new(directory),
            mobility,
        }
    }
}

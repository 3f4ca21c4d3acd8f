//! A shared wireless medium. Every transmission is a broadcast that reaches each attached device
//! whose node is within range of the transmitter at the moment the frame is sent. There are no
//! collisions and no loss other than being out of range.

use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;
use sim_helper::NodeId;

use super::MacAddress;
use crate::mobility::MobilityRegistry;

/// Meters per second.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Attachment {
    node: NodeId,
    device: u32,
    mac: MacAddress,
}

/// A device that will hear a transmission, and how long the frame takes to get there.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reception {
    pub node: NodeId,
    pub device: u32,
    pub delay: SimulationTime,
}

#[derive(Debug)]
pub struct Channel {
    range: f64,
    transmission_delay: SimulationTime,
    attachments: Vec<Attachment>,
}

impl Channel {
    pub fn new(range: f64, transmission_delay: SimulationTime) -> Self {
        assert!(range >= 0.0, "Channel range must not be negative");
        Self {
            range,
            transmission_delay,
            attachments: Vec::new(),
        }
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn attach(&mut self, node: NodeId, device: u32, mac: MacAddress) {
        log::debug!("Attaching device {device} ({mac}) of node {node} to the channel");
        self.attachments.push(Attachment { node, device, mac });
    }

    /// The devices that hear a frame sent by `from` at time `now`. The sender never hears itself.
    pub fn receivers(
        &self,
        from: NodeId,
        now: EmulatedTime,
        mobility: &MobilityRegistry,
    ) -> Vec<Reception> {
        let Some(origin) = mobility.position(from, now) else {
            log::warn!("Node {from} transmitted without a position");
            return Vec::new();
        };

        let mut receivers = Vec::new();
        for attachment in self.attachments.iter().filter(|a| a.node != from) {
            let Some(position) = mobility.position(attachment.node, now) else {
                continue;
            };
            let distance = origin.distance(&position);
            if distance > self.range {
                continue;
            }

            let propagation = SimulationTime::try_from_secs_f64(distance / SPEED_OF_LIGHT)
                .unwrap_or(SimulationTime::MAX);
            receivers.push(Reception {
                node: attachment.node,
                device: attachment.device,
                delay: propagation.saturating_add(self.transmission_delay),
            });
        }
        receivers
    }
}

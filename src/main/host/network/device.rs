//! The link-layer side of a node: one wireless device per node, with optional promiscuous
//! observers that see every frame the device hears.

use std::collections::BTreeMap;

use crate::core::work::scheduler::EventContext;
use crate::network::packet::PacketRc;
use crate::network::{Frame, MacAddress, PacketType};

/// What a promiscuous observer is told about each frame.
#[derive(Copy, Clone, Debug)]
pub struct ObservedFrame<'a> {
    pub packet: &'a PacketRc,
    pub ether_type: u16,
    pub src: MacAddress,
    pub dst: MacAddress,
    pub packet_type: PacketType,
}

type Observer = Box<dyn FnMut(&ObservedFrame<'_>, &mut EventContext) + Send>;

/// Identifies a registered observer so that it can be removed again.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverHandle(u64);

pub struct NetDevice {
    index: u32,
    mac: MacAddress,
    observers: BTreeMap<u64, Observer>,
    next_observer_id: u64,
}

impl NetDevice {
    pub fn new(index: u32, mac: MacAddress) -> Self {
        Self {
            index,
            mac,
            observers: BTreeMap::new(),
            next_observer_id: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// Whether anyone is observing frames not addressed to this device.
    pub fn is_promiscuous(&self) -> bool {
        !self.observers.is_empty()
    }

    /// Register `f` to be called for every frame this device hears, whatever its destination.
    /// Observers are called in registration order.
    pub fn add_promiscuous_observer(
        &mut self,
        f: impl FnMut(&ObservedFrame<'_>, &mut EventContext) + Send + 'static,
    ) -> ObserverHandle {
        let id = self.next_observer_id;
        self.next_observer_id += 1;
        self.observers.insert(id, Box::new(f));
        ObserverHandle(id)
    }

    pub fn remove_promiscuous_observer(&mut self, handle: ObserverHandle) -> bool {
        self.observers.remove(&handle.0).is_some()
    }

    /// Show `frame` to the observers, and classify it relative to this device.
    pub fn observe(&mut self, frame: &Frame, ctx: &mut EventContext) -> PacketType {
        let packet_type = PacketType::classify(frame.dst, self.mac);
        if self.observers.is_empty() {
            return packet_type;
        }

        let observed = ObservedFrame {
            packet: &frame.packet,
            ether_type: frame.ether_type,
            src: frame.src,
            dst: frame.dst,
            packet_type,
        };
        for observer in self.observers.values_mut() {
            observer(&observed, ctx);
        }
        packet_type
    }
}

impl std::fmt::Debug for NetDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetDevice")
            .field("index", &self.index)
            .field("mac", &self.mac)
            .field("observers", &self.observers.len())
            .finish()
    }
}

//! A simulated node: its link-layer devices, optional IPv4 stack, mobility model, and the
//! applications running on it.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use super::application::{AppId, AppReport, Application};
use super::network::device::NetDevice;
use super::network::ipv4::Ipv4;
use super::network::udp::{SocketId, SocketOwner};
use crate::core::work::scheduler::EventContext;
use crate::mobility::{MobilityRef, Vector};
use crate::network::packet::{PacketRc, PacketStatus};
use crate::network::{Frame, MacAddress, PacketType, ETHERTYPE_IPV4};

/// Immutable information about the node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub default_ip: Option<Ipv4Addr>,
}

/// Everything about a node except its applications, so that applications can be handed a
/// mutable reference to it.
#[derive(Debug)]
pub struct NodeCore {
    // shared with the logger
    info: Arc<NodeInfo>,
    devices: Vec<NetDevice>,
    ipv4: Option<Ipv4>,
    mobility: MobilityRef,
    random: Xoshiro256PlusPlus,
}

impl NodeCore {
    pub fn id(&self) -> NodeId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &Arc<NodeInfo> {
        &self.info
    }

    pub fn default_ip(&self) -> Option<Ipv4Addr> {
        self.info.default_ip
    }

    pub fn add_device(&mut self, mac: MacAddress) -> u32 {
        let index = self.devices.len() as u32;
        self.devices.push(NetDevice::new(index, mac));
        index
    }

    pub fn device(&self, index: u32) -> Option<&NetDevice> {
        self.devices.get(index as usize)
    }

    pub fn device_mut(&mut self, index: u32) -> Option<&mut NetDevice> {
        self.devices.get_mut(index as usize)
    }

    pub fn devices(&self) -> &[NetDevice] {
        &self.devices
    }

    pub fn ipv4(&self) -> Option<&Ipv4> {
        self.ipv4.as_ref()
    }

    pub fn ipv4_mut(&mut self) -> Option<&mut Ipv4> {
        self.ipv4.as_mut()
    }

    /// Bind a UDP socket on the wildcard address and a random free ephemeral port.
    pub fn bind_udp_ephemeral(&mut self, owner: SocketOwner) -> Option<(SocketId, u16)> {
        let ipv4 = self.ipv4.as_mut()?;
        let port = ipv4
            .stack()
            .sockets()
            .get_random_free_port(Ipv4Addr::UNSPECIFIED, &mut self.random)?;
        let socket = ipv4
            .bind_udp(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port), owner)
            .ok()?;
        Some((socket, port))
    }

    pub fn mobility(&self) -> &MobilityRef {
        &self.mobility
    }

    pub fn position(&self, now: EmulatedTime) -> Vector {
        self.mobility.borrow_mut().position(now)
    }

    pub fn random(&mut self) -> &mut impl rand::Rng {
        &mut self.random
    }
}

#[derive(Debug)]
pub struct Node {
    core: NodeCore,
    apps: Vec<Box<dyn Application>>,
}

impl Node {
    pub fn new(info: NodeInfo, mobility: MobilityRef, ipv4: Option<Ipv4>, seed: u64) -> Self {
        Self {
            core: NodeCore {
                info: Arc::new(info),
                devices: Vec::new(),
                ipv4,
                mobility,
                random: Xoshiro256PlusPlus::seed_from_u64(seed),
            },
            apps: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.core.id()
    }

    pub fn core(&self) -> &NodeCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    pub fn add_application(&mut self, app: Box<dyn Application>) -> AppId {
        let id = AppId::from(self.apps.len());
        log::debug!("Node {} runs {} as {id}", self.id(), app.name());
        self.apps.push(app);
        id
    }

    pub fn start_application(&mut self, app: AppId, ctx: &mut EventContext) {
        if let Some(a) = self.apps.get_mut(usize::from(app)) {
            a.start(app, &mut self.core, ctx);
        }
    }

    pub fn stop_application(&mut self, app: AppId, ctx: &mut EventContext) {
        if let Some(a) = self.apps.get_mut(usize::from(app)) {
            a.stop(&mut self.core, ctx);
        }
    }

    pub fn on_app_timer(&mut self, app: AppId, token: u64, ctx: &mut EventContext) {
        if let Some(a) = self.apps.get_mut(usize::from(app)) {
            a.on_timer(token, &mut self.core, ctx);
        }
    }

    pub fn app_reports(&self) -> Vec<AppReport> {
        self.apps.iter().map(|a| a.report()).collect()
    }

    /// A frame arrived at device `device`. Promiscuous observers see it first; the IPv4 stack then
    /// handles it if it was addressed to this device or broadcast.
    pub fn receive_frame(&mut self, device: u32, frame: Frame, ctx: &mut EventContext) {
        let Some(dev) = self.core.devices.get_mut(device as usize) else {
            log::warn!("Node {} has no device {device}", self.id());
            return;
        };
        ctx.count("frames-received");
        frame.packet.add_status(PacketStatus::RcvInterfaceObserved);

        let packet_type = dev.observe(&frame, ctx);
        if packet_type == PacketType::OtherHost || frame.ether_type != ETHERTYPE_IPV4 {
            return;
        }

        let Some(ipv4) = self.core.ipv4.as_mut() else {
            return;
        };
        let Some(iface) = ipv4.stack().interface_for_device(device) else {
            return;
        };
        if !ipv4.stack().interface(iface).map(|i| i.is_up()).unwrap_or(false) {
            return;
        }

        for (app, packet) in ipv4.receive(iface, frame.packet, ctx) {
            self.deliver(app, &packet, ctx);
        }
    }

    fn deliver(&mut self, app: AppId, packet: &PacketRc, ctx: &mut EventContext) {
        match self.apps.get_mut(usize::from(app)) {
            Some(a) => a.receive(packet, &mut self.core, ctx),
            None => log::warn!("Node {} has no application {app}", self.id()),
        }
    }

    /// Periodic housekeeping of the routing state.
    pub fn purge_expired(&mut self, now: EmulatedTime) {
        if let Some(ipv4) = self.core.ipv4.as_mut() {
            ipv4.purge_expired(now);
        }
    }
}

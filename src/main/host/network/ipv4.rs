//! A node's IPv4 layer: the interface table, the UDP sockets, and the routing protocol that
//! decides where packets go. Originating, forwarding and delivering packets all happen here; the
//! routing protocol only makes decisions.

use std::cell::RefCell;
use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::Bytes;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use super::interface::{InterfaceAddress, NetworkInterface};
use super::udp::{AddrInUse, SocketId, SocketOwner, UdpSocketTable};
use crate::core::work::scheduler::{EventContext, Scheduler};
use crate::host::application::AppId;
use crate::network::packet::{IanaProtocol, Ipv4Header, PacketRc, PacketStatus};
use crate::network::{Frame, MacAddress, ETHERTYPE_IPV4};
use crate::routing::{Ipv4Route, Ipv4RoutingProtocol, RouteInputCallbacks, RoutingError};

pub const DEFAULT_TTL: u8 = 64;

/// The parts of the IPv4 layer that routing protocols may inspect and, on interface
/// notifications, use to open or close their sockets.
#[derive(Debug)]
pub struct Ipv4Stack {
    interfaces: Vec<NetworkInterface>,
    sockets: UdpSocketTable,
}

impl Ipv4Stack {
    fn new() -> Self {
        Self {
            interfaces: vec![NetworkInterface::new_loopback()],
            sockets: UdpSocketTable::new(),
        }
    }

    pub fn interfaces(&self) -> &[NetworkInterface] {
        &self.interfaces
    }

    pub fn interface(&self, index: u32) -> Option<&NetworkInterface> {
        self.interfaces.get(index as usize)
    }

    fn interface_mut(&mut self, index: u32) -> Option<&mut NetworkInterface> {
        self.interfaces.get_mut(index as usize)
    }

    pub fn interface_for_device(&self, device: u32) -> Option<u32> {
        self.interfaces
            .iter()
            .find(|i| i.device().map(|(d, _)| d) == Some(device))
            .map(|i| i.index())
    }

    pub fn interface_for_address(&self, addr: Ipv4Addr) -> Option<u32> {
        self.interfaces
            .iter()
            .find(|i| i.has_local(addr))
            .map(|i| i.index())
    }

    /// Whether any interface holds `addr`.
    pub fn is_local_address(&self, addr: Ipv4Addr) -> bool {
        self.interface_for_address(addr).is_some()
    }

    /// Whether a packet to `addr` arriving on `input_interface` is meant for this node: one of
    /// the input interface's addresses or its subnet broadcast, the limited broadcast, or any
    /// other local address.
    pub fn is_destination_address(&self, addr: Ipv4Addr, input_interface: u32) -> bool {
        if addr.is_broadcast() {
            return true;
        }
        if let Some(iface) = self.interface(input_interface) {
            if iface
                .addresses()
                .iter()
                .any(|a| a.local() == addr || a.broadcast() == addr)
            {
                return true;
            }
        }
        self.is_local_address(addr)
    }

    pub fn is_forwarding(&self, interface: u32) -> bool {
        self.interface(interface)
            .map(|i| i.is_forwarding())
            .unwrap_or(false)
    }

    pub fn sockets(&self) -> &UdpSocketTable {
        &self.sockets
    }

    pub fn sockets_mut(&mut self) -> &mut UdpSocketTable {
        &mut self.sockets
    }
}

#[cfg(test)]
impl Ipv4Stack {
    pub(crate) fn new_for_test() -> Self {
        Self::new()
    }

    /// Add an interface that is already up, without notifying any routing protocol.
    pub(crate) fn add_interface_for_test(
        &mut self,
        mac: MacAddress,
        address: Option<InterfaceAddress>,
    ) -> u32 {
        let index = self.interfaces.len() as u32;
        let mut iface = NetworkInterface::new(index, "test", index, mac);
        if let Some(address) = address {
            iface.add_address(address);
        }
        iface.set_up(true);
        self.interfaces.push(iface);
        index
    }

    pub(crate) fn set_forwarding_for_test(&mut self, interface: u32, forwarding: bool) {
        if let Some(iface) = self.interface_mut(interface) {
            iface.set_forwarding(forwarding);
        }
    }
}

/// What the routing protocol decided for an inbound packet.
enum InputAction {
    Forward(Ipv4Route, PacketRc),
    Deliver(PacketRc),
    Error(PacketRc, RoutingError),
}

#[derive(Debug)]
pub struct Ipv4 {
    node: NodeId,
    stack: Ipv4Stack,
    routing: Box<dyn Ipv4RoutingProtocol>,
    next_uid: u64,
}

impl Ipv4 {
    pub fn new(node: NodeId, mut routing: Box<dyn Ipv4RoutingProtocol>) -> Self {
        let mut stack = Ipv4Stack::new();
        routing.set_ipv4(node, &mut stack);

        let mut ipv4 = Self {
            node,
            stack,
            routing,
            next_uid: 0,
        };
        ipv4.set_up(0);
        ipv4
    }

    pub fn stack(&self) -> &Ipv4Stack {
        &self.stack
    }

    pub fn routing(&self) -> &dyn Ipv4RoutingProtocol {
        self.routing.as_ref()
    }

    /// Add an interface on top of link-layer device `device`. Returns the interface index.
    pub fn add_interface(&mut self, device: u32, mac: MacAddress) -> u32 {
        let index = self.stack.interfaces.len() as u32;
        let name = format!("wlan{device}");
        self.stack
            .interfaces
            .push(NetworkInterface::new(index, &name, device, mac));
        log::debug!("Node {} added interface {index} ({name}, {mac})", self.node);
        index
    }

    pub fn add_address(&mut self, interface: u32, address: InterfaceAddress) -> bool {
        let Some(iface) = self.stack.interface_mut(interface) else {
            return false;
        };
        if !iface.add_address(address) {
            return false;
        }
        self.routing
            .notify_add_address(&mut self.stack, interface, address);
        true
    }

    pub fn remove_address(&mut self, interface: u32, addr: Ipv4Addr) -> bool {
        let Some(iface) = self.stack.interface_mut(interface) else {
            return false;
        };
        let Some(address) = iface.remove_address(addr) else {
            return false;
        };
        self.routing
            .notify_remove_address(&mut self.stack, interface, address);
        true
    }

    pub fn set_up(&mut self, interface: u32) {
        let Some(iface) = self.stack.interface_mut(interface) else {
            return;
        };
        if iface.is_up() {
            return;
        }
        iface.set_up(true);
        self.routing.notify_interface_up(&mut self.stack, interface);
    }

    pub fn set_down(&mut self, interface: u32) {
        let Some(iface) = self.stack.interface_mut(interface) else {
            return;
        };
        if !iface.is_up() {
            return;
        }
        iface.set_up(false);
        self.routing.notify_interface_down(&mut self.stack, interface);
    }

    pub fn set_forwarding(&mut self, interface: u32, forwarding: bool) {
        if let Some(iface) = self.stack.interface_mut(interface) {
            iface.set_forwarding(forwarding);
        }
    }

    pub fn bind_udp(
        &mut self,
        local: SocketAddrV4,
        owner: SocketOwner,
    ) -> Result<SocketId, AddrInUse> {
        self.stack.sockets.bind(local, owner)
    }

    pub fn close_udp(&mut self, socket: SocketId) -> bool {
        self.stack.sockets.close(socket)
    }

    pub fn purge_expired(&mut self, now: EmulatedTime) {
        self.routing.purge_expired(now);
    }

    pub fn print_routing_table(
        &self,
        now: EmulatedTime,
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        self.routing.print_routing_table(now, writer)
    }

    /// Originate a UDP datagram. Returns the packet's uid.
    pub fn send(
        &mut self,
        src_port: u16,
        dst: SocketAddrV4,
        payload: Bytes,
        ctx: &mut EventContext,
    ) -> Result<u64, RoutingError> {
        let uid = self.next_uid;
        self.next_uid += 1;

        let mut header = Ipv4Header {
            src: Ipv4Addr::UNSPECIFIED,
            dst: *dst.ip(),
            ttl: DEFAULT_TTL,
            protocol: IanaProtocol::Udp.number(),
            uid,
        };

        // learn which source address the route will use before building the packet
        let source = self
            .routing
            .route_output(&self.stack, None, &header, None)?
            .source;
        header.src = source;

        let packet = PacketRc::new_ipv4_udp(
            SocketAddrV4::new(source, src_port),
            dst,
            DEFAULT_TTL,
            uid,
            payload,
        );
        packet.add_status(PacketStatus::SndCreated);

        let route = self
            .routing
            .route_output(&self.stack, Some(&packet), &header, None)?;
        self.transmit(route, packet, ctx);
        Ok(uid)
    }

    /// Handle a packet that arrived on `input_interface`. Returns the datagrams that should be
    /// handed to applications.
    pub fn receive(
        &mut self,
        input_interface: u32,
        packet: PacketRc,
        ctx: &mut EventContext,
    ) -> Vec<(AppId, PacketRc)> {
        let header = packet.ipv4_header();
        packet.add_status(PacketStatus::RcvInterfaceReceived);

        let actions = RefCell::new(Vec::new());
        let accepted = {
            let mut forward = |route, p: &PacketRc, _: &Ipv4Header| {
                actions
                    .borrow_mut()
                    .push(InputAction::Forward(route, p.clone()))
            };
            let mut deliver = |p: &PacketRc, _: &Ipv4Header, _: u32| {
                actions.borrow_mut().push(InputAction::Deliver(p.clone()))
            };
            let mut error = |p: &PacketRc, _: &Ipv4Header, e| {
                actions.borrow_mut().push(InputAction::Error(p.clone(), e))
            };

            self.routing.route_input(
                &self.stack,
                ctx.now(),
                &packet,
                &header,
                input_interface,
                RouteInputCallbacks {
                    unicast_forward: &mut forward,
                    multicast_forward: None,
                    local_deliver: Some(&mut deliver),
                    error: &mut error,
                },
            )
        };

        let actions = actions.into_inner();
        if !accepted {
            log::trace!("Packet {} was not handled by the routing protocol", header.uid);
            packet.add_status(PacketStatus::RouteDropped);
            ctx.count("ip-unrouted");
        } else if actions.is_empty() {
            packet.add_status(PacketStatus::RouteDuplicate);
            ctx.count("ip-consumed");
        }

        let mut deliveries = Vec::new();
        for action in actions {
            match action {
                InputAction::Forward(route, packet) => self.forward(route, packet, ctx),
                InputAction::Deliver(packet) => {
                    packet.add_status(PacketStatus::RouteLocalDelivery);
                    ctx.count("ip-delivered");
                    if let Some(app) = self.deliver(packet.clone(), ctx) {
                        deliveries.push((app, packet));
                    }
                }
                InputAction::Error(packet, e) => {
                    log::trace!("Dropping packet {}: {e}", packet.uid());
                    packet.add_status(PacketStatus::RouteDropped);
                    ctx.count("ip-route-error");
                }
            }
        }
        deliveries
    }

    /// Send on a forwarded copy with the TTL decremented, unless the TTL runs out.
    fn forward(&mut self, route: Ipv4Route, packet: PacketRc, ctx: &mut EventContext) {
        if packet.ttl() <= 1 {
            log::trace!("TTL expired for packet {}", packet.uid());
            packet.add_status(PacketStatus::IpTtlExpired);
            ctx.count("ip-ttl-expired");
            return;
        }

        let packet = packet.new_copy_with_ttl(packet.ttl() - 1);
        packet.add_status(PacketStatus::RouteForwarded);
        ctx.count("ip-forwarded");
        self.transmit(route, packet, ctx);
    }

    /// Hand a locally delivered datagram to the owner of the matching socket. Returns the
    /// application to pass it to, if it is not for the routing protocol.
    fn deliver(&mut self, packet: PacketRc, ctx: &mut EventContext) -> Option<AppId> {
        let Some(socket) = self.stack.sockets.lookup(packet.dst_address()).copied() else {
            log::trace!("No socket bound to {}", packet.dst_address());
            packet.add_status(PacketStatus::RcvSocketDropped);
            ctx.count("udp-no-socket");
            return None;
        };

        packet.add_status(PacketStatus::RcvSocketDelivered);
        match socket.owner {
            SocketOwner::Routing => {
                self.routing.recv_control(ctx.now(), socket.id, &packet);
                None
            }
            SocketOwner::Application(app) => Some(app),
        }
    }

    fn transmit(&self, route: Ipv4Route, packet: PacketRc, ctx: &mut EventContext) {
        let Some(iface) = self.stack.interface(route.output_interface) else {
            log::warn!(
                "Route for packet {} uses missing interface {}",
                packet.uid(),
                route.output_interface
            );
            return;
        };
        let Some((device, mac)) = iface.device() else {
            log::debug!("Not sending packet {} routed to loopback", packet.uid());
            return;
        };

        let is_broadcast = route.gateway.is_broadcast()
            || iface.addresses().iter().any(|a| a.broadcast() == route.gateway);
        let dst = if is_broadcast {
            MacAddress::BROADCAST
        } else {
            match ctx.directory().mac_for_addr(route.gateway) {
                Some(dst) => dst,
                None => {
                    log::warn!("No link-layer address for gateway {}", route.gateway);
                    ctx.count("ip-unresolved-gateway");
                    return;
                }
            }
        };

        packet.add_status(PacketStatus::SndInterfaceSent);
        ctx.transmit(
            device,
            Frame {
                src: mac,
                dst,
                ether_type: ETHERTYPE_IPV4,
                packet,
            },
        );
    }
}

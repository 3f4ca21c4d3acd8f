//! Flood routing: every packet that is not a duplicate and not addressed to this node is
//! rebroadcast on the node's single wireless interface. There is no routing table. Duplicate
//! suppression and the IP layer's TTL are what keep floods finite.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;
use sim_helper::NodeId;

use super::dpd::DuplicatePacketDetection;
use super::{Ipv4Route, Ipv4RoutingProtocol, RouteInputCallbacks, RoutingError};
use crate::host::network::interface::InterfaceAddress;
use crate::host::network::ipv4::Ipv4Stack;
use crate::host::network::udp::{SocketId, SocketOwner};
use crate::network::packet::{Ipv4Header, PacketRc};

/// UDP port for flooding control traffic.
pub const FLOODING_PORT: u16 = 654;

pub const DEFAULT_DPD_WINDOW: SimulationTime =
    SimulationTime::from_duration(std::time::Duration::from_secs(10 * 60));

/// The sockets and address the protocol uses on one active interface.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub interface: u32,
    pub local: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub unicast_socket: SocketId,
    pub broadcast_socket: SocketId,
}

#[derive(Debug)]
pub struct FloodingRoutingProtocol {
    node: Option<NodeId>,
    bindings: BTreeMap<u32, InterfaceBinding>,
    dpd: DuplicatePacketDetection,
}

impl FloodingRoutingProtocol {
    pub fn new(dpd_window: SimulationTime) -> Self {
        Self {
            node: None,
            bindings: BTreeMap::new(),
            dpd: DuplicatePacketDetection::new(dpd_window),
        }
    }

    pub fn bindings(&self) -> impl Iterator<Item = &InterfaceBinding> {
        self.bindings.values()
    }

    pub fn dpd(&self) -> &DuplicatePacketDetection {
        &self.dpd
    }

    fn node_name(&self) -> String {
        self.node
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".into())
    }

    fn is_my_own_address(&self, addr: Ipv4Addr) -> bool {
        self.bindings.values().any(|b| b.local == addr)
    }

    /// The binding to send on: the one for `hint` if it has one, otherwise the first active
    /// interface. Only single-interface nodes are supported, so these normally agree.
    fn output_binding(&self, hint: Option<u32>) -> Option<&InterfaceBinding> {
        hint.and_then(|i| self.bindings.get(&i))
            .or_else(|| self.bindings.values().next())
    }

    fn broadcast_route(&self, header: &Ipv4Header, binding: &InterfaceBinding) -> Ipv4Route {
        let source = if header.src.is_unspecified() {
            binding.local
        } else {
            header.src
        };
        Ipv4Route {
            destination: header.dst,
            source,
            gateway: Ipv4Addr::BROADCAST,
            output_interface: binding.interface,
        }
    }

    fn loopback_route(&self, header: &Ipv4Header, binding: &InterfaceBinding) -> Ipv4Route {
        Ipv4Route {
            destination: header.dst,
            source: binding.local,
            gateway: Ipv4Addr::LOCALHOST,
            output_interface: 0,
        }
    }

    /// Open the protocol's sockets on `interface` using its first address.
    fn bind_interface(&mut self, stack: &mut Ipv4Stack, interface: u32) {
        let Some(iface) = stack.interface(interface) else {
            return;
        };
        if iface.is_loopback() || !iface.is_up() {
            return;
        }
        if iface.addresses().len() > 1 {
            log::warn!(
                "Flooding does not support more than one address per interface; node {} \
                 interface {interface} uses only {}",
                self.node_name(),
                iface.addresses()[0]
            );
        }
        let Some(address) = iface.addresses().first().copied() else {
            return;
        };
        if self.bindings.contains_key(&interface) {
            return;
        }

        let sockets = stack.sockets_mut();
        let unicast = sockets.bind(
            SocketAddrV4::new(address.local(), FLOODING_PORT),
            SocketOwner::Routing,
        );
        let broadcast = sockets.bind(
            SocketAddrV4::new(address.broadcast(), FLOODING_PORT),
            SocketOwner::Routing,
        );
        let (unicast_socket, broadcast_socket) = match (unicast, broadcast) {
            (Ok(u), Ok(b)) => (u, b),
            (u, b) => {
                log::warn!(
                    "Unable to open flooding sockets on node {} interface {interface}",
                    self.node_name()
                );
                for socket in [u, b].into_iter().flatten() {
                    sockets.close(socket);
                }
                return;
            }
        };

        log::debug!(
            "Node {} floods on interface {interface} ({address})",
            self.node_name()
        );
        self.bindings.insert(
            interface,
            InterfaceBinding {
                interface,
                local: address.local(),
                broadcast: address.broadcast(),
                unicast_socket,
                broadcast_socket,
            },
        );
    }

    fn unbind_interface(&mut self, stack: &mut Ipv4Stack, interface: u32) {
        if let Some(binding) = self.bindings.remove(&interface) {
            log::debug!(
                "Node {} stops flooding on interface {interface}",
                self.node_name()
            );
            stack.sockets_mut().close(binding.unicast_socket);
            stack.sockets_mut().close(binding.broadcast_socket);
        }
    }
}

impl Default for FloodingRoutingProtocol {
    fn default() -> Self {
        Self::new(DEFAULT_DPD_WINDOW)
    }
}

impl Ipv4RoutingProtocol for FloodingRoutingProtocol {
    fn set_ipv4(&mut self, node: NodeId, stack: &mut Ipv4Stack) {
        assert!(self.node.is_none(), "Flooding is already installed on a node");
        assert!(
            stack.interfaces().len() == 1 && stack.interfaces()[0].is_loopback(),
            "Flooding must be installed before any interface is added"
        );
        self.node = Some(node);
    }

    fn route_output(
        &mut self,
        _stack: &Ipv4Stack,
        packet: Option<&PacketRc>,
        header: &Ipv4Header,
        output_interface: Option<u32>,
    ) -> Result<Ipv4Route, RoutingError> {
        let Some(binding) = self.output_binding(output_interface) else {
            log::debug!("Node {} has no flooding interfaces", self.node_name());
            return Err(RoutingError::NoRouteToHost);
        };

        if packet.is_none() {
            return Ok(self.loopback_route(header, binding));
        }
        Ok(self.broadcast_route(header, binding))
    }

    fn route_input(
        &mut self,
        stack: &Ipv4Stack,
        now: EmulatedTime,
        packet: &PacketRc,
        header: &Ipv4Header,
        input_interface: u32,
        callbacks: RouteInputCallbacks<'_>,
    ) -> bool {
        let input_is_loopback = stack
            .interface(input_interface)
            .map(|i| i.is_loopback())
            .unwrap_or(false);
        assert!(
            !input_is_loopback,
            "Flooding received packet {} from the loopback interface",
            header.uid
        );

        if self.bindings.is_empty() {
            log::trace!("Node {} has no flooding interfaces", self.node_name());
            return false;
        }

        if self.is_my_own_address(header.src) {
            log::trace!("Node {} heard its own packet {}", self.node_name(), header.uid);
            return true;
        }

        if header.dst.is_multicast() {
            return false;
        }

        if self.dpd.is_duplicate(now, header.src, header.uid) {
            log::trace!(
                "Node {} dropped duplicate packet {} from {}",
                self.node_name(),
                header.uid,
                header.src
            );
            return true;
        }

        if stack.is_destination_address(header.dst, input_interface) {
            match callbacks.local_deliver {
                Some(deliver) => {
                    log::trace!(
                        "Node {} delivers packet {} locally",
                        self.node_name(),
                        header.uid
                    );
                    deliver(packet, header, input_interface);
                }
                None => {
                    log::error!(
                        "Node {} cannot deliver packet {} from {} locally",
                        self.node_name(),
                        header.uid,
                        header.src
                    );
                    (callbacks.error)(packet, header, RoutingError::NoLocalDelivery);
                }
            }
            return true;
        }

        if !stack.is_forwarding(input_interface) {
            log::trace!("Forwarding disabled on interface {input_interface}");
            (callbacks.error)(packet, header, RoutingError::ForwardingDisabled);
            return true;
        }

        let Some(binding) = self.output_binding(None) else {
            (callbacks.error)(packet, header, RoutingError::NoRouteToHost);
            return true;
        };
        let route = self.broadcast_route(header, binding);
        log::trace!(
            "Node {} forwards packet {} from {}",
            self.node_name(),
            header.uid,
            header.src
        );
        (callbacks.unicast_forward)(route, packet, header);
        true
    }

    fn notify_interface_up(&mut self, stack: &mut Ipv4Stack, interface: u32) {
        self.bind_interface(stack, interface);
    }

    fn notify_interface_down(&mut self, stack: &mut Ipv4Stack, interface: u32) {
        self.unbind_interface(stack, interface);
    }

    fn notify_add_address(
        &mut self,
        stack: &mut Ipv4Stack,
        interface: u32,
        address: InterfaceAddress,
    ) {
        if self.bindings.contains_key(&interface) {
            log::warn!(
                "Flooding does not support more than one address per interface; node {} \
                 ignores {address}",
                self.node_name()
            );
            return;
        }
        self.bind_interface(stack, interface);
    }

    fn notify_remove_address(
        &mut self,
        stack: &mut Ipv4Stack,
        interface: u32,
        address: InterfaceAddress,
    ) {
        let bound_here = self
            .bindings
            .get(&interface)
            .map(|b| b.local == address.local())
            .unwrap_or(false);
        if bound_here {
            self.unbind_interface(stack, interface);
            // fall back to a remaining address, if any
            self.bind_interface(stack, interface);
        }
    }

    fn recv_control(&mut self, _now: EmulatedTime, socket: SocketId, packet: &PacketRc) {
        log::trace!(
            "Node {} ignoring control datagram on {socket} from {}",
            self.node_name(),
            packet.src_address()
        );
    }

    fn purge_expired(&mut self, now: EmulatedTime) {
        self.dpd.purge(now);
    }

    fn print_routing_table(
        &self,
        now: EmulatedTime,
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()> {
        let secs = now.to_abs_simtime().as_secs_f64();
        writeln!(writer, "Node: {}; Time: {secs:.3}s", self.node_name())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::host::network::ipv4::Ipv4;
    use crate::network::MacAddress;

    const LOCAL: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const OTHER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);
    const SOURCE: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    #[derive(Debug, Default)]
    struct Outcome {
        forwarded: Vec<Ipv4Route>,
        delivered: Vec<u32>,
        errors: Vec<RoutingError>,
    }

    fn at(secs: u64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::from_secs(secs)
    }

    fn packet(src: Ipv4Addr, dst: Ipv4Addr, uid: u64) -> PacketRc {
        PacketRc::new_ipv4_udp(
            SocketAddrV4::new(src, 49152),
            SocketAddrV4::new(dst, 9),
            64,
            uid,
            Bytes::from_static(&[0; 64]),
        )
    }

    /// A node with flooding installed and one interface at `LOCAL/24`.
    fn setup() -> (FloodingRoutingProtocol, Ipv4Stack, u32) {
        let mut proto = FloodingRoutingProtocol::default();
        let mut stack = Ipv4Stack::new_for_test();
        proto.set_ipv4(NodeId::from(1u32), &mut stack);
        let iface = stack.add_interface_for_test(
            MacAddress::from_index(1),
            Some(InterfaceAddress::new(LOCAL, 24)),
        );
        proto.notify_interface_up(&mut stack, iface);
        (proto, stack, iface)
    }

    fn route_input(
        proto: &mut FloodingRoutingProtocol,
        stack: &Ipv4Stack,
        now: EmulatedTime,
        packet: &PacketRc,
        iif: u32,
        with_local_deliver: bool,
    ) -> (bool, Outcome) {
        let mut outcome = Outcome::default();
        let handled = {
            let Outcome {
                forwarded,
                delivered,
                errors,
            } = &mut outcome;
            let mut forward =
                |route: Ipv4Route, _: &PacketRc, _: &Ipv4Header| forwarded.push(route);
            let mut deliver = |_: &PacketRc, _: &Ipv4Header, iif: u32| delivered.push(iif);
            let mut error = |_: &PacketRc, _: &Ipv4Header, e: RoutingError| errors.push(e);
            let local_deliver: Option<&mut dyn FnMut(&PacketRc, &Ipv4Header, u32)> =
                if with_local_deliver {
                    Some(&mut deliver)
                } else {
                    None
                };

            proto.route_input(
                stack,
                now,
                packet,
                &packet.ipv4_header(),
                iif,
                RouteInputCallbacks {
                    unicast_forward: &mut forward,
                    multicast_forward: None,
                    local_deliver,
                    error: &mut error,
                },
            )
        };
        (handled, outcome)
    }

    #[test]
    fn test_no_interfaces_not_handled() {
        let mut proto = FloodingRoutingProtocol::default();
        let mut stack = Ipv4Stack::new_for_test();
        proto.set_ipv4(NodeId::from(1u32), &mut stack);
        // no address, so nothing gets bound
        let iface = stack.add_interface_for_test(MacAddress::from_index(1), None);
        proto.notify_interface_up(&mut stack, iface);
        assert_eq!(proto.bindings().count(), 0);

        let p = packet(SOURCE, LOCAL, 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(!handled);
        assert!(outcome.delivered.is_empty() && outcome.forwarded.is_empty());
    }

    #[test]
    fn test_own_packet_consumed() {
        let (mut proto, stack, iface) = setup();
        let p = packet(LOCAL, OTHER, 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(handled);
        assert!(outcome.forwarded.is_empty());
        assert!(outcome.delivered.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_multicast_rejected() {
        let (mut proto, stack, iface) = setup();
        let p = packet(SOURCE, Ipv4Addr::new(224, 0, 0, 9), 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(!handled);
        assert!(outcome.forwarded.is_empty());
    }

    #[test]
    fn test_local_delivery_then_duplicate() {
        let (mut proto, stack, iface) = setup();
        let p = packet(SOURCE, LOCAL, 5);

        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(handled);
        assert_eq!(outcome.delivered, vec![iface]);
        assert!(outcome.forwarded.is_empty());

        // a forwarded copy of the same datagram arrives from another neighbor
        let copy = p.new_copy_with_ttl(62);
        let (handled, outcome) = route_input(&mut proto, &stack, at(1), &copy, iface, true);
        assert!(handled);
        assert!(outcome.delivered.is_empty());
        assert!(outcome.forwarded.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_local_delivery_ignores_forwarding_flag() {
        let (mut proto, mut stack, iface) = setup();
        stack.set_forwarding_for_test(iface, false);

        for uid in 0..10 {
            let p = packet(SOURCE, LOCAL, uid);
            let (handled, outcome) = route_input(&mut proto, &stack, at(uid), &p, iface, true);
            assert!(handled);
            assert_eq!(outcome.delivered, vec![iface]);
            assert!(outcome.forwarded.is_empty());
        }
    }

    #[test]
    fn test_subnet_broadcast_delivered() {
        let (mut proto, stack, iface) = setup();
        let p = packet(SOURCE, Ipv4Addr::new(10, 0, 0, 255), 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(handled);
        assert_eq!(outcome.delivered, vec![iface]);
    }

    #[test]
    fn test_missing_local_delivery_is_error() {
        let (mut proto, stack, iface) = setup();
        let p = packet(SOURCE, LOCAL, 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, false);
        assert!(handled);
        assert_eq!(outcome.errors, vec![RoutingError::NoLocalDelivery]);
    }

    #[test]
    fn test_forwarding_disabled_is_error() {
        let (mut proto, mut stack, iface) = setup();
        stack.set_forwarding_for_test(iface, false);
        let p = packet(SOURCE, OTHER, 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(handled);
        assert_eq!(outcome.errors, vec![RoutingError::ForwardingDisabled]);
        assert!(outcome.forwarded.is_empty());
    }

    #[test]
    fn test_forward_on_broadcast_route() {
        let (mut proto, stack, iface) = setup();
        let p = packet(SOURCE, OTHER, 0);
        let (handled, outcome) = route_input(&mut proto, &stack, at(0), &p, iface, true);
        assert!(handled);
        assert_eq!(
            outcome.forwarded,
            vec![Ipv4Route {
                destination: OTHER,
                source: SOURCE,
                gateway: Ipv4Addr::BROADCAST,
                output_interface: iface,
            }]
        );

        // forwarded only once
        let (handled, outcome) = route_input(&mut proto, &stack, at(1), &p, iface, true);
        assert!(handled);
        assert!(outcome.forwarded.is_empty());

        // unless the duplicate window has passed
        let later = at(1) + DEFAULT_DPD_WINDOW;
        let (_, outcome) = route_input(&mut proto, &stack, later, &p, iface, true);
        assert_eq!(outcome.forwarded.len(), 1);
    }

    #[test]
    #[should_panic]
    fn test_loopback_input_panics() {
        let (mut proto, stack, _) = setup();
        let p = packet(SOURCE, LOCAL, 0);
        route_input(&mut proto, &stack, at(0), &p, 0, true);
    }

    #[test]
    fn test_route_output() {
        let (mut proto, stack, iface) = setup();
        let header = Ipv4Header {
            src: Ipv4Addr::UNSPECIFIED,
            dst: OTHER,
            ttl: 64,
            protocol: 17,
            uid: 0,
        };

        let lo = proto.route_output(&stack, None, &header, None).unwrap();
        assert_eq!(lo.output_interface, 0);
        assert_eq!(lo.gateway, Ipv4Addr::LOCALHOST);
        assert_eq!(lo.source, LOCAL);

        let p = packet(LOCAL, OTHER, 0);
        let route = proto
            .route_output(&stack, Some(&p), &header, Some(iface))
            .unwrap();
        assert_eq!(route.output_interface, iface);
        assert_eq!(route.gateway, Ipv4Addr::BROADCAST);
        assert_eq!(route.source, LOCAL);
        assert_eq!(route.destination, OTHER);

        let mut empty = FloodingRoutingProtocol::default();
        let mut bare = Ipv4Stack::new_for_test();
        empty.set_ipv4(NodeId::from(2u32), &mut bare);
        assert_eq!(
            empty.route_output(&bare, Some(&p), &header, None),
            Err(RoutingError::NoRouteToHost)
        );
    }

    #[test]
    fn test_interface_lifecycle() {
        let mut ipv4 = Ipv4::new(
            NodeId::from(3u32),
            Box::new(FloodingRoutingProtocol::default()),
        );
        let iface = ipv4.add_interface(0, MacAddress::from_index(3));

        // addresses on a down interface are not bound yet
        assert!(ipv4.add_address(iface, InterfaceAddress::new(LOCAL, 24)));
        assert_eq!(ipv4.stack().sockets().len(), 0);

        ipv4.set_up(iface);
        assert_eq!(ipv4.stack().sockets().len(), 2);
        let unicast = SocketAddrV4::new(LOCAL, FLOODING_PORT);
        let broadcast = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 255), FLOODING_PORT);
        assert!(ipv4.stack().sockets().lookup(unicast).is_some());
        assert!(ipv4.stack().sockets().lookup(broadcast).is_some());

        // a second address is ignored
        assert!(ipv4.add_address(iface, InterfaceAddress::new(OTHER, 24)));
        assert_eq!(ipv4.stack().sockets().len(), 2);

        // removing the bound address falls back to the remaining one
        assert!(ipv4.remove_address(iface, LOCAL));
        assert!(ipv4.stack().sockets().lookup(unicast).is_none());
        assert!(ipv4
            .stack()
            .sockets()
            .lookup(SocketAddrV4::new(OTHER, FLOODING_PORT))
            .is_some());

        ipv4.set_down(iface);
        assert!(ipv4.stack().sockets().is_empty());
    }

    #[test]
    fn test_purge_and_print() {
        let (mut proto, stack, iface) = setup();
        for uid in 0..3 {
            let p = packet(SOURCE, OTHER, uid);
            route_input(&mut proto, &stack, at(0), &p, iface, true);
        }
        assert_eq!(proto.dpd().len(), 3);
        proto.purge_expired(at(0) + DEFAULT_DPD_WINDOW);
        assert!(proto.dpd().is_empty());

        let mut out = Vec::new();
        proto.print_routing_table(at(2), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Node: 1; Time: 2.000s\n");
    }
}

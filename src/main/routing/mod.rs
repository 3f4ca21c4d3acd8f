//! The contract between a node's IPv4 stack and the routing protocol that decides where its
//! packets go.

use std::net::Ipv4Addr;

use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use crate::host::network::interface::InterfaceAddress;
use crate::host::network::ipv4::Ipv4Stack;
use crate::host::network::udp::SocketId;
use crate::network::packet::{Ipv4Header, PacketRc};

pub mod dpd;
pub mod flooding;

/// Where to send a packet next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Ipv4Route {
    pub destination: Ipv4Addr,
    pub source: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub output_interface: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RoutingError {
    NoRouteToHost,
    ForwardingDisabled,
    NoLocalDelivery,
}

impl std::fmt::Display for RoutingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingError::NoRouteToHost => write!(f, "no route to host"),
            RoutingError::ForwardingDisabled => {
                write!(f, "forwarding is disabled on the input interface")
            }
            RoutingError::NoLocalDelivery => write!(f, "no local delivery available"),
        }
    }
}

impl std::error::Error for RoutingError {}

/// How a routing protocol reports what should happen to an inbound packet. The protocol invokes
/// at most one of these per packet, and may invoke none (for example for a duplicate).
pub struct RouteInputCallbacks<'a> {
    pub unicast_forward: &'a mut dyn FnMut(Ipv4Route, &PacketRc, &Ipv4Header),
    pub multicast_forward: Option<&'a mut dyn FnMut(&PacketRc, &Ipv4Header)>,
    /// Receives the input interface.
    pub local_deliver: Option<&'a mut dyn FnMut(&PacketRc, &Ipv4Header, u32)>,
    pub error: &'a mut dyn FnMut(&PacketRc, &Ipv4Header, RoutingError),
}

/// A per-node IPv4 routing protocol. The stack owns the protocol and passes in its interface and
/// socket state on every call.
pub trait Ipv4RoutingProtocol: std::fmt::Debug + Send {
    /// Called once, when the protocol is installed on a stack whose only interface is loopback.
    fn set_ipv4(&mut self, node: NodeId, stack: &mut Ipv4Stack);

    /// Choose a route for a locally originated packet. `packet` is `None` when the caller only
    /// wants to learn the source address that will be used.
    fn route_output(
        &mut self,
        stack: &Ipv4Stack,
        packet: Option<&PacketRc>,
        header: &Ipv4Header,
        output_interface: Option<u32>,
    ) -> Result<Ipv4Route, RoutingError>;

    /// Decide what to do with a packet that arrived on `input_interface`. Returns whether the
    /// protocol took responsibility for the packet.
    fn route_input(
        &mut self,
        stack: &Ipv4Stack,
        now: EmulatedTime,
        packet: &PacketRc,
        header: &Ipv4Header,
        input_interface: u32,
        callbacks: RouteInputCallbacks<'_>,
    ) -> bool;

    fn notify_interface_up(&mut self, stack: &mut Ipv4Stack, interface: u32);
    fn notify_interface_down(&mut self, stack: &mut Ipv4Stack, interface: u32);
    fn notify_add_address(
        &mut self,
        stack: &mut Ipv4Stack,
        interface: u32,
        address: InterfaceAddress,
    );
    fn notify_remove_address(
        &mut self,
        stack: &mut Ipv4Stack,
        interface: u32,
        address: InterfaceAddress,
    );

    /// A datagram arrived on one of the protocol's own sockets.
    fn recv_control(&mut self, now: EmulatedTime, socket: SocketId, packet: &PacketRc);

    /// Periodic housekeeping.
    fn purge_expired(&mut self, _now: EmulatedTime) {}

    fn print_routing_table(
        &self,
        now: EmulatedTime,
        writer: &mut dyn std::io::Write,
    ) -> std::io::Result<()>;
}

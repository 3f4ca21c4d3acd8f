//! Receives datagrams on a port and counts them. Also samples its receive throughput once a
//! second while running.

use std::net::{Ipv4Addr, SocketAddrV4};

use sim_helper::simulation_time::SimulationTime;

use crate::core::work::scheduler::{EventContext, Scheduler};
use crate::host::application::{AppId, AppReport, Application};
use crate::host::network::udp::{SocketId, SocketOwner};
use crate::host::node::NodeCore;
use crate::network::packet::PacketRc;
use crate::utility::counter::Counter;

const SAMPLE_INTERVAL: SimulationTime = SimulationTime::SECOND;

#[derive(Debug)]
pub struct PacketSink {
    port: u16,
    socket: Option<SocketId>,
    generation: u64,
    id: Option<AppId>,
    bytes_this_interval: u64,
    throughput_kbps: Vec<f64>,
    counters: Counter,
}

impl PacketSink {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            socket: None,
            generation: 0,
            id: None,
            bytes_this_interval: 0,
            throughput_kbps: Vec::new(),
            counters: Counter::new(),
        }
    }

    pub fn packets_received(&self) -> u64 {
        self.counters.get_value("packets-received")
    }

    pub fn throughput_kbps(&self) -> &[f64] {
        &self.throughput_kbps
    }
}

impl Application for PacketSink {
    fn name(&self) -> &str {
        "sink"
    }

    fn start(&mut self, id: AppId, node: &mut NodeCore, ctx: &mut EventContext) {
        if self.socket.is_some() {
            return;
        }
        self.id = Some(id);

        let Some(ipv4) = node.ipv4_mut() else {
            log::warn!("Node {} has no IPv4 stack for a sink", node.name());
            return;
        };
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port);
        match ipv4.bind_udp(local, SocketOwner::Application(id)) {
            Ok(socket) => self.socket = Some(socket),
            Err(e) => {
                log::warn!("Node {} could not bind {local}: {e}", node.name());
                return;
            }
        }

        self.generation += 1;
        self.bytes_this_interval = 0;
        ctx.schedule_after(SAMPLE_INTERVAL, id.timer_task(self.generation));
    }

    fn stop(&mut self, node: &mut NodeCore, _ctx: &mut EventContext) {
        if let Some(socket) = self.socket.take() {
            if let Some(ipv4) = node.ipv4_mut() {
                ipv4.close_udp(socket);
            }
        }
    }

    fn on_timer(&mut self, token: u64, _node: &mut NodeCore, ctx: &mut EventContext) {
        if token != self.generation || self.socket.is_none() {
            return;
        }
        let kbits = (self.bytes_this_interval * 8) as f64 / 1000.0;
        let kbps = kbits / SAMPLE_INTERVAL.as_secs_f64();
        log::debug!("Sink on port {} received {kbps:.3} kbps", self.port);
        self.throughput_kbps.push(kbps);
        self.bytes_this_interval = 0;

        if let Some(id) = self.id {
            ctx.schedule_after(SAMPLE_INTERVAL, id.timer_task(self.generation));
        }
    }

    fn receive(&mut self, packet: &PacketRc, _node: &mut NodeCore, ctx: &mut EventContext) {
        log::trace!(
            "Received packet {} from {} at {}",
            packet.uid(),
            packet.src_address(),
            ctx.now().to_abs_simtime()
        );
        self.counters.add_one("packets-received");
        self.counters.add_value("bytes-received", packet.payload_len() as u64);
        self.bytes_this_interval += packet.payload_len() as u64;
    }

    fn report(&self) -> AppReport {
        AppReport {
            name: self.name().to_string(),
            counters: self.counters.clone(),
            throughput_kbps: self.throughput_kbps.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use sim_helper::emulated_time::EmulatedTime;
    use sim_helper::NodeId;

    use super::*;
    use crate::core::testing::{self, TestNode};
    use crate::core::work::scheduler::SchedulerState;
    use crate::host::network::ipv4::Ipv4;
    use crate::host::node::{Node, NodeInfo};
    use crate::mobility::constant_position::ConstantPositionMobilityModel;
    use crate::mobility::{MobilityModel, Vector};
    use crate::routing::flooding::FloodingRoutingProtocol;

    #[test]
    fn test_samples_throughput_every_second() {
        let id = NodeId::new(0);
        let (world, models) = testing::world(
            vec![TestNode {
                ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
                mobility: MobilityModel::ConstantPosition(ConstantPositionMobilityModel::new(
                    Vector::ZERO,
                )),
            }],
            10.0,
        );
        let ipv4 = Ipv4::new(
            id,
            Box::new(FloodingRoutingProtocol::new(SimulationTime::MINUTE)),
        );
        let info = NodeInfo {
            id,
            name: "sink".into(),
            default_ip: None,
        };
        let mut node = Node::new(info, Arc::clone(&models[0]), Some(ipv4), 1);
        let mut state = SchedulerState::new(1);
        let mut ctx = EventContext::new(EmulatedTime::SIMULATION_START, id, &world, &mut state);

        let mut sink = PacketSink::new(9);
        sink.start(AppId::from(0), node.core_mut(), &mut ctx);
        assert!(node.core().ipv4().unwrap().stack().sockets().is_addr_in_use(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9)
        ));

        let packet = PacketRc::new_ipv4_udp(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 49153),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9),
            64,
            1,
            Bytes::from(vec![0; 125]),
        );
        sink.receive(&packet, node.core_mut(), &mut ctx);
        sink.receive(&packet, node.core_mut(), &mut ctx);
        sink.on_timer(1, node.core_mut(), &mut ctx);
        sink.on_timer(1, node.core_mut(), &mut ctx);
        // stale timers from an older generation are ignored
        sink.on_timer(0, node.core_mut(), &mut ctx);

        assert_eq!(sink.packets_received(), 2);
        assert_eq!(sink.throughput_kbps(), &[2.0, 0.0]);
        assert_eq!(sink.report().counters.get_value("bytes-received"), 250);

        sink.stop(node.core_mut(), &mut ctx);
        assert!(node.core().ipv4().unwrap().stack().sockets().is_empty());
    }
}

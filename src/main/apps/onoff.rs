//! A constant bit rate sender. While running it sends a fixed-size datagram to one remote
//! address at the interval that yields the configured data rate.

use std::net::SocketAddrV4;

use bytes::Bytes;
use rand::Rng;
use sim_helper::simulation_time::SimulationTime;

use crate::core::work::scheduler::{EventContext, Scheduler};
use crate::host::application::{AppId, AppReport, Application};
use crate::host::network::udp::{SocketId, SocketOwner};
use crate::host::node::NodeCore;
use crate::utility::counter::Counter;

#[derive(Clone, Debug, PartialEq)]
pub struct OnOffConfig {
    pub remote: SocketAddrV4,
    /// Payload bytes per datagram.
    pub packet_size: usize,
    /// Bits per second.
    pub data_rate: u64,
    /// The first datagram goes out after a uniformly random delay below this, so that sources
    /// started together don't transmit in lockstep.
    pub start_jitter: SimulationTime,
}

impl OnOffConfig {
    /// Time between two datagrams.
    pub fn interval(&self) -> SimulationTime {
        let bits = self.packet_size as u128 * 8;
        let nanos = bits * 1_000_000_000 / u128::from(self.data_rate);
        SimulationTime::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX - 1))
    }
}

#[derive(Debug)]
pub struct OnOffApplication {
    config: OnOffConfig,
    payload: Bytes,
    socket: Option<(SocketId, u16)>,
    // timers carry the generation they were scheduled in; a restart invalidates older ones
    generation: u64,
    id: Option<AppId>,
    counters: Counter,
}

impl OnOffApplication {
    pub fn new(config: OnOffConfig) -> Self {
        assert!(config.data_rate > 0, "Data rate must be positive");
        assert!(config.packet_size > 0, "Packet size must be positive");
        Self {
            payload: Bytes::from(vec![0; config.packet_size]),
            config,
            socket: None,
            generation: 0,
            id: None,
            counters: Counter::new(),
        }
    }

    fn send(&mut self, node: &mut NodeCore, ctx: &mut EventContext) {
        let (Some((_, port)), Some(ipv4)) = (self.socket, node.ipv4_mut()) else {
            return;
        };
        match ipv4.send(port, self.config.remote, self.payload.clone(), ctx) {
            Ok(uid) => {
                log::trace!("Sent packet {uid} to {}", self.config.remote);
                self.counters.add_one("packets-sent");
                self.counters.add_value("bytes-sent", self.payload.len() as u64);
            }
            Err(e) => {
                log::debug!("Could not send to {}: {e}", self.config.remote);
                self.counters.add_one("send-errors");
            }
        }
    }
}

impl Application for OnOffApplication {
    fn name(&self) -> &str {
        "onoff"
    }

    fn start(&mut self, id: AppId, node: &mut NodeCore, ctx: &mut EventContext) {
        if self.socket.is_some() {
            return;
        }
        self.id = Some(id);
        self.socket = node.bind_udp_ephemeral(SocketOwner::Application(id));
        let Some((socket, port)) = self.socket else {
            log::warn!("Node {} could not bind a socket for sending", node.name());
            return;
        };
        log::debug!(
            "Node {} sending to {} from port {port} ({socket}) every {}",
            node.name(),
            self.config.remote,
            self.config.interval()
        );

        self.generation += 1;
        let jitter = match self.config.start_jitter.as_nanos() {
            0 => SimulationTime::ZERO,
            n => SimulationTime::from_nanos(
                node.random().gen_range(0..u64::try_from(n).unwrap_or(u64::MAX)),
            ),
        };
        ctx.schedule_after(jitter, id.timer_task(self.generation));
    }

    fn stop(&mut self, node: &mut NodeCore, _ctx: &mut EventContext) {
        if let Some((socket, _)) = self.socket.take() {
            if let Some(ipv4) = node.ipv4_mut() {
                ipv4.close_udp(socket);
            }
        }
    }

    fn on_timer(&mut self, token: u64, node: &mut NodeCore, ctx: &mut EventContext) {
        if token != self.generation || self.socket.is_none() {
            return;
        }
        self.send(node, ctx);
        if let Some(id) = self.id {
            ctx.schedule_after(self.config.interval(), id.timer_task(self.generation));
        }
    }

    fn report(&self) -> AppReport {
        AppReport {
            name: self.name().to_string(),
            counters: self.counters.clone(),
            throughput_kbps: Vec::new(),
        }
    }
}

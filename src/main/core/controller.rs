//! Builds a source location privacy scenario from a [`SimConfig`] and runs it.
//!
//! The ad hoc nodes sit on a square grid and flood every data packet. Node `i` is a sink and
//! node `i + sinks` the source that sends to it. The adversaries start on a grid with the same
//! layout, listen to every transmission, and chase each packet back toward its source.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;
use sim_helper::util::time::TimeParts;
use sim_helper::NodeId;

use crate::apps::adversary::AdversaryTracker;
use crate::apps::onoff::{OnOffApplication, OnOffConfig};
use crate::apps::sink::PacketSink;
use crate::core::configuration::MobilityKind;
use crate::core::manager::Manager;
use crate::core::sim_config::SimConfig;
use crate::core::sim_stats::{RunOutcome, SimStats};
use crate::core::work::scheduler::{periodic, Scheduler};
use crate::core::work::task::TaskRef;
use crate::core::world::World;
use crate::host::application::AppId;
use crate::host::network::interface::InterfaceAddress;
use crate::host::network::ipv4::Ipv4;
use crate::host::node::{Node, NodeInfo};
use crate::mobility::constant_position::ConstantPositionMobilityModel;
use crate::mobility::position_allocator::GridPositionAllocator;
use crate::mobility::pursuit::PursuitMobilityModel;
use crate::mobility::random_waypoint::{RandomWaypointMobilityModel, Rectangle};
use crate::mobility::{MobilityModel, MobilityRegistry, PursuitHandle};
use crate::network::channel::Channel;
use crate::network::directory::DirectoryBuilder;
use crate::network::MacAddress;
use crate::routing::flooding::FloodingRoutingProtocol;

/// All ad hoc nodes share one subnet.
const SUBNET_PREFIX_LEN: u8 = 24;

/// Interval of the duplicate detection housekeeping on every node.
const PURGE_INTERVAL: SimulationTime = SimulationTime::MINUTE;

/// Sources start sending at a uniformly random time this long after the configured start.
const SEND_START_JITTER: SimulationTime = SimulationTime::SECOND;

/// The address of ad hoc node `index`, counting up from 10.0.0.1.
pub fn node_address(index: u32) -> Ipv4Addr {
    let [a, b, c, _] = Ipv4Addr::new(10, 0, 0, 0).octets();
    let host = u8::try_from(index + 1).unwrap_or(u8::MAX);
    Ipv4Addr::new(a, b, c, host)
}

/// Which node plays which part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles {
    pub sinks: Vec<NodeId>,
    pub sources: Vec<NodeId>,
    pub adversaries: Vec<NodeId>,
}

pub struct Controller {
    config: SimConfig,
    manager: Manager,
    roles: Roles,
}

impl Controller {
    pub fn new(config: SimConfig) -> anyhow::Result<Self> {
        let scenario = &config.scenario;
        let start = EmulatedTime::SIMULATION_START;

        // Xoshiro256PlusPlus is not ideal when a seed with many zeros is used, but
        // 'seed_from_u64()' uses SplitMix64 to derive the actual seed, so we are okay here
        let mut random = Xoshiro256PlusPlus::seed_from_u64(config.seed);

        let mut channel = Channel::new(config.network.range, config.network.transmission_delay);
        let mut directory = DirectoryBuilder::new();
        let mut mobility = MobilityRegistry::new();
        let mut nodes = Vec::new();

        let mut grid = GridPositionAllocator::square(scenario.grid_delta, scenario.nodes);
        let bounds = grid_bounds(scenario.grid_delta, scenario.nodes);

        for index in 0..scenario.nodes {
            let id = NodeId::new(index);
            let mac = MacAddress::from_index(index.into());
            let addr = node_address(index);
            let position = grid.next_position();

            let model = match scenario.mobility {
                MobilityKind::ConstantPosition => MobilityModel::ConstantPosition(
                    ConstantPositionMobilityModel::new(position),
                ),
                MobilityKind::RandomWaypoint => {
                    MobilityModel::RandomWaypoint(RandomWaypointMobilityModel::new(
                        start,
                        position,
                        bounds,
                        scenario.node_speed,
                        scenario.node_pause,
                        random.gen(),
                    ))
                }
            };

            directory
                .register(id, mac, Some(addr))
                .with_context(|| format!("Failed to register node {id}"))?;
            let model = mobility.register(id, model);
            channel.attach(id, 0, mac);

            let routing = FloodingRoutingProtocol::new(config.network.dpd_window);
            let info = NodeInfo {
                id,
                name: format!("node{index}"),
                default_ip: Some(addr),
            };
            let mut node = Node::new(
                info,
                model,
                Some(Ipv4::new(id, Box::new(routing))),
                random.gen(),
            );
            let device = node.core_mut().add_device(mac);
            if let Some(ipv4) = node.core_mut().ipv4_mut() {
                let iface = ipv4.add_interface(device, mac);
                ipv4.add_address(iface, InterfaceAddress::new(addr, SUBNET_PREFIX_LEN));
                ipv4.set_forwarding(iface, true);
                ipv4.set_up(iface);
            }
            nodes.push(node);
        }

        let mut roles = Roles::default();
        for i in 0..scenario.sinks {
            roles.sinks.push(NodeId::new(i));
            roles.sources.push(NodeId::new(i + scenario.sinks));
        }

        // a fresh allocator, so the adversaries start on top of the first ad hoc nodes
        let mut grid = GridPositionAllocator::square(scenario.grid_delta, scenario.nodes);
        let mut trackers = Vec::new();
        for index in 0..scenario.adversaries {
            let id = NodeId::new(scenario.nodes + index);
            let mac = MacAddress::from_index(u32::from(id).into());
            let model = MobilityModel::Pursuit(PursuitMobilityModel::new(
                start,
                grid.next_position(),
            ));

            directory
                .register(id, mac, None)
                .with_context(|| format!("Failed to register adversary {id}"))?;
            let model = mobility.register(id, model);
            channel.attach(id, 0, mac);

            let Some(pursuit) = PursuitHandle::new(Arc::clone(&model)) else {
                unreachable!("Adversary {id} was given a pursuit model");
            };
            let mut tracker = AdversaryTracker::new(id, pursuit, config.tracker.clone());
            for &source in &roles.sources {
                tracker.add_tracked_source(source);
            }

            let info = NodeInfo {
                id,
                name: format!("adversary{index}"),
                default_ip: None,
            };
            let mut node = Node::new(info, model, None, random.gen());
            node.core_mut().add_device(mac);
            trackers.push((id, node.add_application(Box::new(tracker))));
            nodes.push(node);
            roles.adversaries.push(id);
        }

        // (node, app, start time) of every application
        let mut starts = Vec::new();
        for (&sink, &source) in roles.sinks.iter().zip(&roles.sources) {
            let sink_addr = node_address(u32::from(sink));
            log::info!(
                "Node {source} ({}) will send packets to node {sink} ({sink_addr})",
                node_address(u32::from(source)),
            );

            let app = PacketSink::new(scenario.data_port);
            let app = nodes[usize::from(sink)].add_application(Box::new(app));
            starts.push((sink, app, start));

            let app = OnOffApplication::new(OnOffConfig {
                remote: SocketAddrV4::new(sink_addr, scenario.data_port),
                packet_size: scenario.packet_size,
                data_rate: scenario.data_rate,
                start_jitter: SEND_START_JITTER,
            });
            let app = nodes[usize::from(source)].add_application(Box::new(app));
            starts.push((source, app, start + scenario.send_start));
        }
        starts.extend(trackers.into_iter().map(|(id, app)| (id, app, start)));

        let world = World::new(channel, directory.into_directory(), mobility);
        let end_time = start + config.stop_time;
        let mut manager = Manager::new(world, nodes, end_time);

        for (node, app, time) in starts {
            schedule_start_stop(&mut manager, node, app, time);
        }

        for index in 0..scenario.nodes {
            let purge = periodic(PURGE_INTERVAL, |node, ctx| node.purge_expired(ctx.now()));
            manager.schedule(NodeId::new(index), start + PURGE_INTERVAL, purge);
        }

        Ok(Self {
            config,
            manager,
            roles,
        })
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn run(&mut self) -> RunOutcome {
        let mut progress = self
            .config
            .progress
            .then(|| ProgressState::new(self.manager.end_time()));

        log::info!("Running simulation");
        let outcome = self.manager.run(|now| {
            if let Some(progress) = progress.as_mut() {
                progress.update(now);
            }
        });

        match outcome.captured {
            Some(capture) => log::info!(
                "Finished simulation: adversary {} captured source {} at {}",
                capture.adversary,
                capture.source,
                capture.time.duration_since(&EmulatedTime::SIMULATION_START)
            ),
            None => log::info!("Finished simulation: no source was captured"),
        }
        outcome
    }

    pub fn stats(&self) -> SimStats {
        self.manager.stats()
    }
}

/// The rectangle covered by the grid that holds `count` nodes.
fn grid_bounds(delta: f64, count: u32) -> Rectangle {
    let width = (count as f64).sqrt().ceil().max(1.0) as u32;
    let rows = count.div_ceil(width).max(1);
    Rectangle::new(
        0.0,
        f64::from(width - 1) * delta,
        0.0,
        f64::from(rows - 1) * delta,
    )
}

/// Start `app` at `start` and stop it at the end of the run.
fn schedule_start_stop(manager: &mut Manager, node: NodeId, app: AppId, start: EmulatedTime) {
    let end = manager.end_time();
    manager.schedule(
        node,
        start,
        TaskRef::new(move |node, ctx| node.start_application(app, ctx)),
    );
    manager.schedule(
        node,
        end,
        TaskRef::new(move |node, ctx| node.stop_application(app, ctx)),
    );
}

/// Progress printed to stderr every 5% of simulated time.
#[derive(Debug)]
struct ProgressState {
    start: Instant,
    end: EmulatedTime,
    next_percent: u32,
}

impl ProgressState {
    fn new(end: EmulatedTime) -> Self {
        Self {
            start: Instant::now(),
            end,
            next_percent: 5,
        }
    }

    fn update(&mut self, now: EmulatedTime) {
        let sim_current = now.duration_since(&EmulatedTime::SIMULATION_START);
        let sim_end = self.end.duration_since(&EmulatedTime::SIMULATION_START);
        let percent = (sim_current.as_secs_f64() / sim_end.as_secs_f64() * 100.0) as u32;
        if percent < self.next_percent {
            return;
        }
        self.next_percent = (percent / 5 + 1) * 5;

        let sim_current = TimeParts::from_nanos(sim_current.as_nanos());
        let sim_end = TimeParts::from_nanos(sim_end.as_nanos());
        let realtime = TimeParts::from_nanos(self.start.elapsed().as_nanos());
        eprintln!(
            "{percent}% simulated: {}/{}, realtime: {}",
            sim_current.fmt_hr_min_sec_milli(),
            sim_end.fmt_hr_min_sec(),
            realtime.fmt_hr_min_sec(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::configuration::{ConfigFileOptions, ConfigOptions};

    fn config(yaml: &str) -> SimConfig {
        let file: ConfigFileOptions = serde_yaml::from_str(yaml).unwrap();
        let options = ConfigOptions {
            general: file.general,
            scenario: file.scenario,
            network: file.network,
            adversary: file.adversary,
        };
        SimConfig::new(&options).unwrap()
    }

    /// A 3x3 grid with 8 m spacing and 10 m range: only horizontal and vertical neighbours hear
    /// each other. One packet per second from node 1 to node 0.
    const SMALL: &str = r#"
        general:
          stop_time: 30 s
        scenario:
          nodes: 9
          sinks: 1
          adversaries: 0
          send_start: 1 s
          packet_size: 64 B
          data_rate: 512 bit
        network:
          range: 10.0
        "#;

    fn app_counter(controller: &Controller, node: NodeId, name: &str) -> u64 {
        let node = controller.manager().node(node).unwrap();
        node.app_reports()[0].counters.get_value(name)
    }

    #[test]
    fn test_addresses() {
        assert_eq!(node_address(0), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(node_address(99), Ipv4Addr::new(10, 0, 0, 100));
    }

    #[test]
    fn test_bounds_cover_grid() {
        let bounds = grid_bounds(8.0, 10);
        assert_eq!((bounds.max_x, bounds.max_y), (24.0, 16.0));
        let bounds = grid_bounds(8.0, 1);
        assert_eq!((bounds.max_x, bounds.max_y), (0.0, 0.0));
    }

    #[test]
    fn test_roles_follow_node_order() {
        let controller = Controller::new(config(
            "scenario: {nodes: 16, sinks: 2, adversaries: 2}",
        ))
        .unwrap();
        assert_eq!(
            controller.roles(),
            &Roles {
                sinks: vec![NodeId::new(0), NodeId::new(1)],
                sources: vec![NodeId::new(2), NodeId::new(3)],
                adversaries: vec![NodeId::new(16), NodeId::new(17)],
            }
        );
        assert_eq!(controller.manager().nodes().len(), 18);
        assert_eq!(controller.manager().world().directory.len(), 18);
    }

    #[test_log::test]
    fn test_flood_delivers_each_packet_once() {
        let mut controller = Controller::new(config(SMALL)).unwrap();
        let outcome = controller.run();
        assert_eq!(outcome.captured, None);
        assert_eq!(
            outcome.end_time,
            EmulatedTime::SIMULATION_START + SimulationTime::from_secs(30)
        );

        let sent = app_counter(&controller, NodeId::new(1), "packets-sent");
        let received = app_counter(&controller, NodeId::new(0), "packets-received");
        assert!(sent >= 28, "only {sent} packets sent");
        // the last packet may still be in flight at the stop time
        assert!(received <= sent && received + 1 >= sent, "{received} of {sent}");

        // neither the source nor the sink forward, and no one forwards a packet twice
        let stats = controller.stats();
        let forwarded = stats.events.get_value("ip-forwarded");
        assert!(forwarded > 0);
        assert!(forwarded <= sent * 7, "{forwarded} forwards of {sent} packets");
        assert!(stats.events.get_value("ip-consumed") > 0);
    }

    #[test_log::test]
    fn test_adversary_captures_source() {
        let mut controller = Controller::new(config(&format!(
            "{SMALL}\n        adversary: {{capture_radius: 5.0, pursuit_speed: 1.0}}\n"
        )
        .replace("adversaries: 0", "adversaries: 1")))
        .unwrap();
        let outcome = controller.run();

        // the adversary starts next to the sink at (0, 0) and the source is at (8, 0)
        let capture = outcome.captured.expect("no capture");
        assert_eq!(capture.adversary, NodeId::new(9));
        assert_eq!(capture.source, NodeId::new(1));
        assert_eq!(outcome.end_time, capture.time);
        assert!(capture.time < EmulatedTime::SIMULATION_START + SimulationTime::from_secs(10));
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run = || {
            let mut controller = Controller::new(config(&format!(
                "{SMALL}\n        adversary: {{pursuit_speed: 0.1}}\n"
            )
            .replace("adversaries: 0", "adversaries: 1")
            .replace("stop_time: 30 s", "stop_time: 15 s")))
            .unwrap();
            controller.run();
            serde_json::to_string(&controller.stats()).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_random_waypoint_scenario_runs() {
        let mut controller = Controller::new(config(&SMALL.replace(
            "adversaries: 0",
            "adversaries: 0\n          mobility: random-waypoint\n          node_speed: 2.0",
        )))
        .unwrap();
        let outcome = controller.run();
        assert_eq!(outcome.captured, None);
        assert!(app_counter(&controller, NodeId::new(1), "packets-sent") > 0);
    }
}

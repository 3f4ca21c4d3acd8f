//! An adversary that tries to locate the sources of a flood. It listens promiscuously, and every
//! time it overhears a new data packet it heads for the neighbor that transmitted it, at a fixed
//! pursuit speed. Following each hop back eventually leads to the source.

use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use serde::Serialize;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;
use sim_helper::NodeId;

use crate::core::work::scheduler::{EventContext, Scheduler};
use crate::host::application::{AppId, AppReport, Application};
use crate::host::network::device::{ObservedFrame, ObserverHandle};
use crate::host::node::NodeCore;
use crate::mobility::{PursuitHandle, Vector};
use crate::network::ETHERTYPE_IPV4;
use crate::routing::dpd::DuplicatePacketDetection;
use crate::utility::counter::Counter;

pub const DEFAULT_PURSUIT_SPEED: f64 = 1.0;
pub const DEFAULT_CAPTURE_RADIUS: f64 = 5.0;
pub const DEFAULT_DPD_WINDOW: SimulationTime = SimulationTime::MINUTE;

/// How often the adversary checks for a capture between observations.
const CAPTURE_CHECK_INTERVAL: SimulationTime = SimulationTime::SECOND;
const CAPTURE_CHECK_TIMER: u64 = 0;

/// An adversary got within the capture radius of a source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Capture {
    pub adversary: NodeId,
    pub source: NodeId,
    pub time: EmulatedTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Only packets to this UDP port are tracked.
    pub data_port: u16,
    /// Meters per second.
    pub pursuit_speed: f64,
    /// Meters.
    pub capture_radius: f64,
    pub dpd_window: SimulationTime,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_port: 9,
            pursuit_speed: DEFAULT_PURSUIT_SPEED,
            capture_radius: DEFAULT_CAPTURE_RADIUS,
            dpd_window: DEFAULT_DPD_WINDOW,
        }
    }
}

/// The first of `sources` that lies within `radius` of `own`.
pub fn check_capture(
    own: Vector,
    radius: f64,
    sources: impl IntoIterator<Item = (NodeId, Vector)>,
) -> Option<NodeId> {
    sources
        .into_iter()
        .find(|(_, position)| own.distance(position) <= radius)
        .map(|(node, _)| node)
}

#[derive(Debug)]
struct TrackerState {
    node: NodeId,
    config: TrackerConfig,
    dpd: DuplicatePacketDetection,
    tracked: Vec<NodeId>,
    pursuit: PursuitHandle,
    counters: Counter,
}

impl TrackerState {
    fn observe(&mut self, frame: &ObservedFrame<'_>, ctx: &mut EventContext) {
        let packet = frame.packet;
        if frame.ether_type != ETHERTYPE_IPV4 {
            return;
        }
        if packet.udp_dst_port() != Some(self.config.data_port) {
            return;
        }

        let now = ctx.now();
        let header = packet.ipv4_header();
        if self.dpd.is_duplicate(now, header.src, header.uid) {
            self.counters.add_one("duplicates");
            return;
        }
        self.counters.add_one("observed");

        let Some(sender) = ctx.directory().node_for_mac(frame.src) else {
            panic!(
                "Adversary {} overheard unknown link-layer address {}",
                self.node, frame.src
            );
        };
        let Some(target) = ctx.mobility().position(sender, now) else {
            panic!("Node {sender} has no mobility model");
        };

        let own = self.pursuit.position(now);
        let time_to_reach = own.distance(&target) / self.config.pursuit_speed;
        let arrival = SimulationTime::try_from_secs_f64(time_to_reach)
            .map(|d| now.saturating_add(d))
            .unwrap_or(EmulatedTime::MAX);

        log::debug!(
            "Adversary {} heard packet {} from node {sender}, heading to {target} in {:.3}s",
            self.node,
            header.uid,
            time_to_reach
        );
        self.pursuit.set_target(now, arrival, target);
        self.counters.add_one("retargets");

        self.check_capture(ctx);
    }

    fn check_capture(&mut self, ctx: &mut EventContext) {
        let now = ctx.now();
        let own = self.pursuit.position(now);
        let sources = self
            .tracked
            .iter()
            .filter_map(|&n| ctx.mobility().position(n, now).map(|p| (n, p)));

        if let Some(source) = check_capture(own, self.config.capture_radius, sources) {
            self.counters.add_one("captures");
            ctx.signal_capture(Capture {
                adversary: self.node,
                source,
                time: now,
            });
        }
    }
}

/// Tracks the flood back to its sources. The node it runs on must use a pursuit mobility
/// model, whose [`PursuitHandle`] is passed in.
#[derive(Debug)]
pub struct AdversaryTracker {
    state: Arc<AtomicRefCell<TrackerState>>,
    id: Option<AppId>,
    observers: Vec<(u32, ObserverHandle)>,
    running: bool,
}

impl AdversaryTracker {
    pub fn new(node: NodeId, pursuit: PursuitHandle, config: TrackerConfig) -> Self {
        assert!(
            config.pursuit_speed > 0.0,
            "Pursuit speed must be positive, not {}",
            config.pursuit_speed
        );
        let state = TrackerState {
            node,
            dpd: DuplicatePacketDetection::new(config.dpd_window),
            config,
            tracked: Vec::new(),
            pursuit,
            counters: Counter::new(),
        };
        Self {
            state: Arc::new(AtomicRefCell::new(state)),
            id: None,
            observers: Vec::new(),
            running: false,
        }
    }

    pub fn add_tracked_source(&mut self, node: NodeId) {
        let mut state = self.state.borrow_mut();
        if !state.tracked.contains(&node) {
            state.tracked.push(node);
        }
    }

    pub fn tracked_sources(&self) -> Vec<NodeId> {
        self.state.borrow().tracked.clone()
    }
}

impl Application for AdversaryTracker {
    fn name(&self) -> &str {
        "adversary"
    }

    fn start(&mut self, id: AppId, node: &mut NodeCore, ctx: &mut EventContext) {
        self.id = Some(id);
        self.running = true;

        let devices: Vec<u32> = node.devices().iter().map(|d| d.index()).collect();
        for device in devices {
            let state = Arc::clone(&self.state);
            let Some(dev) = node.device_mut(device) else {
                continue;
            };
            let handle = dev.add_promiscuous_observer(move |frame, ctx| {
                state.borrow_mut().observe(frame, ctx)
            });
            self.observers.push((device, handle));
        }

        ctx.schedule_after(
            CAPTURE_CHECK_INTERVAL,
            id.timer_task(CAPTURE_CHECK_TIMER),
        );
    }

    fn stop(&mut self, node: &mut NodeCore, _ctx: &mut EventContext) {
        self.running = false;
        for (device, handle) in self.observers.drain(..) {
            if let Some(dev) = node.device_mut(device) {
                dev.remove_promiscuous_observer(handle);
            }
        }
    }

    fn on_timer(&mut self, token: u64, _node: &mut NodeCore, ctx: &mut EventContext) {
        if token != CAPTURE_CHECK_TIMER || !self.running {
            return;
        }
        self.state.borrow_mut().check_capture(ctx);

        if let Some(id) = self.id {
            ctx.schedule_after(CAPTURE_CHECK_INTERVAL, id.timer_task(CAPTURE_CHECK_TIMER));
        }
    }

    fn report(&self) -> AppReport {
        AppReport {
            name: self.name().to_string(),
            counters: self.state.borrow().counters.clone(),
            throughput_kbps: Vec::new(),
        }
    }
}

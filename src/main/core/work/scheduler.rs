//! The interface event handlers use to reach the rest of the simulation: the current time,
//! scheduling follow-up work, the shared wireless channel, and asking the run to stop.

use std::sync::Arc;

use sim_helper::emulated_time::EmulatedTime;
use sim_helper::simulation_time::SimulationTime;
use sim_helper::NodeId;

use super::event::Event;
use super::event_queue::EventQueue;
use super::task::TaskRef;
use crate::apps::adversary::Capture;
use crate::core::world::World;
use crate::host::node::Node;
use crate::mobility::MobilityRegistry;
use crate::network::directory::NodeDirectory;
use crate::network::Frame;
use crate::utility::counter::Counter;

/// Time-based work registration. Components that need periodic or delayed work register it here
/// instead of reaching for a global scheduler.
pub trait Scheduler {
    fn now(&self) -> EmulatedTime;

    /// Run `task` on the current node after `delay`.
    fn schedule_after(&mut self, delay: SimulationTime, task: TaskRef);
}

/// Everything about the run's progress that outlives a single event.
#[derive(Debug)]
pub struct SchedulerState {
    queue: EventQueue,
    next_event_ids: Vec<u64>,
    counters: Counter,
    capture: Option<Capture>,
    stop_requested: bool,
}

impl SchedulerState {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            queue: EventQueue::new(),
            next_event_ids: vec![0; num_nodes],
            counters: Counter::new(),
            capture: None,
            stop_requested: false,
        }
    }

    /// Queue `task` to run on `dst` at `time`, on behalf of `src`.
    pub fn push(&mut self, src: NodeId, dst: NodeId, time: EmulatedTime, task: TaskRef) {
        let id = &mut self.next_event_ids[usize::from(src)];
        let event = Event::new(task, time, src, *id, dst);
        *id += 1;
        self.queue.push(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    pub fn next_event_time(&self) -> Option<EmulatedTime> {
        self.queue.next_event_time()
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    pub fn capture(&self) -> Option<&Capture> {
        self.capture.as_ref()
    }

    /// Whether the event loop should stop before the next event.
    pub fn is_stopping(&self) -> bool {
        self.stop_requested || self.capture.is_some()
    }
}

/// Handed to every task while it runs on a node.
pub struct EventContext<'a> {
    now: EmulatedTime,
    node: NodeId,
    world: &'a World,
    state: &'a mut SchedulerState,
}

impl<'a> EventContext<'a> {
    pub fn new(
        now: EmulatedTime,
        node: NodeId,
        world: &'a World,
        state: &'a mut SchedulerState,
    ) -> Self {
        Self {
            now,
            node,
            world,
            state,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn directory(&self) -> &NodeDirectory {
        &self.world.directory
    }

    pub fn mobility(&self) -> &MobilityRegistry {
        &self.world.mobility
    }

    /// Run `task` on `node` after `delay`.
    pub fn schedule_on(&mut self, node: NodeId, delay: SimulationTime, task: TaskRef) {
        let time = self.now.saturating_add(delay);
        self.state.push(self.node, node, time, task);
    }

    /// Broadcast `frame` on the wireless channel. Each device in range receives it in its own
    /// event.
    pub fn transmit(&mut self, device: u32, frame: Frame) {
        let receivers = self
            .world
            .channel
            .receivers(self.node, self.now, &self.world.mobility);
        log::trace!(
            "Device {device} sent a frame to {} that {} devices will hear",
            frame.dst,
            receivers.len()
        );
        self.count("frames-sent");

        for reception in receivers {
            let frame = frame.clone();
            let task = TaskRef::new(move |node, ctx| {
                node.receive_frame(reception.device, frame.clone(), ctx)
            });
            self.schedule_on(reception.node, reception.delay, task);
        }
    }

    /// Increment the run-wide counter `name`.
    pub fn count(&mut self, name: &str) {
        self.state.counters.add_one(name);
    }

    /// Ask the run to stop because an adversary caught a source. Only the first capture is kept.
    pub fn signal_capture(&mut self, capture: Capture) {
        if self.state.capture.is_none() {
            log::info!(
                "Adversary {} captured source {}",
                capture.adversary,
                capture.source
            );
            self.state.capture = Some(capture);
        }
    }

    /// Ask the run to stop after this event.
    pub fn stop(&mut self) {
        log::debug!("Node {} asked the run to stop", self.node);
        self.state.stop_requested = true;
    }

    /// Whether the run will stop after this event.
    pub fn is_stopping(&self) -> bool {
        self.state.is_stopping()
    }
}

impl Scheduler for EventContext<'_> {
    fn now(&self) -> EmulatedTime {
        self.now
    }

    fn schedule_after(&mut self, delay: SimulationTime, task: TaskRef) {
        self.schedule_on(self.node, delay, task)
    }
}

type PeriodicFn = Arc<dyn Fn(&mut Node, &mut EventContext) + Send + Sync>;

/// A task that runs `f` and then schedules itself again `interval` later, forever.
pub fn periodic(
    interval: SimulationTime,
    f: impl Fn(&mut Node, &mut EventContext) + Send + Sync + 'static,
) -> TaskRef {
    assert!(interval.is_positive(), "Periodic task needs a positive interval");
    periodic_inner(interval, Arc::new(f))
}

fn periodic_inner(interval: SimulationTime, f: PeriodicFn) -> TaskRef {
    TaskRef::new(move |node, ctx| {
        f(node, ctx);
        ctx.schedule_after(interval, periodic_inner(interval, Arc::clone(&f)));
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::testing::{self, TestNode};
    use crate::host::node::NodeInfo;
    use crate::mobility::constant_position::ConstantPositionMobilityModel;
    use crate::mobility::{MobilityModel, Vector};
    use crate::network::packet::PacketRc;
    use crate::network::{MacAddress, ETHERTYPE_IPV4};

    fn at_millis(ms: u64) -> EmulatedTime {
        EmulatedTime::SIMULATION_START + SimulationTime::from_millis(ms)
    }

    fn still(x: f64) -> TestNode {
        TestNode {
            ip: None,
            mobility: MobilityModel::ConstantPosition(ConstantPositionMobilityModel::new(
                Vector::new(x, 0.0, 0.0),
            )),
        }
    }

    fn node(id: u32, world: &World) -> Node {
        let id = NodeId::new(id);
        let info = NodeInfo {
            id,
            name: format!("node{id}"),
            default_ip: None,
        };
        let mobility = Arc::clone(world.mobility.get(id).unwrap());
        let mut node = Node::new(info, mobility, None, 0);
        node.core_mut().add_device(MacAddress::from_index(u32::from(id).into()));
        node
    }

    #[test]
    fn test_periodic_reschedules_itself() {
        let (world, _) = testing::world(vec![still(0.0)], 10.0);
        let mut n0 = node(0, &world);
        let mut state = SchedulerState::new(1);
        let id = NodeId::new(0);
        let tick = periodic(SimulationTime::SECOND, |_, ctx| ctx.count("tick"));
        state.push(id, id, at_millis(1000), tick);

        while state.next_event_time().unwrap() <= at_millis(5000) {
            let event = state.pop().unwrap();
            let mut ctx = EventContext::new(event.time(), event.node_id(), &world, &mut state);
            event.into_task().execute(&mut n0, &mut ctx);
        }
        assert_eq!(state.counters().get_value("tick"), 5);
        assert_eq!(state.next_event_time(), Some(at_millis(6000)));
    }

    #[test]
    fn test_transmit_reaches_nodes_in_range() {
        let (world, _) = testing::world(vec![still(0.0), still(5.0), still(50.0)], 10.0);
        let mut state = SchedulerState::new(3);

        let mut ctx = EventContext::new(at_millis(0), NodeId::new(0), &world, &mut state);
        ctx.transmit(
            0,
            Frame {
                src: MacAddress::from_index(0),
                dst: MacAddress::BROADCAST,
                ether_type: ETHERTYPE_IPV4,
                packet: PacketRc::new_ipv4_udp_mock(),
            },
        );

        let event = state.pop().unwrap();
        assert_eq!(event.node_id(), NodeId::new(1));
        assert!(event.time() > at_millis(1));
        assert!(state.pop().is_none());
        assert_eq!(state.counters().get_value("frames-sent"), 1);
    }

    #[test]
    fn test_first_capture_wins() {
        let (world, _) = testing::world(vec![still(0.0)], 10.0);
        let mut state = SchedulerState::new(1);
        let mut ctx = EventContext::new(at_millis(0), NodeId::new(0), &world, &mut state);
        assert!(!ctx.is_stopping());

        let capture = |source| Capture {
            adversary: NodeId::new(0),
            source: NodeId::new(source),
            time: at_millis(0),
        };
        ctx.signal_capture(capture(4));
        ctx.signal_capture(capture(5));
        assert!(ctx.is_stopping());
        assert_eq!(state.capture(), Some(&capture(4)));
    }
}

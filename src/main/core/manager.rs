//! Owns every node and runs the event loop over them.

use std::sync::Arc;

use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use crate::core::sim_stats::{NodeStats, RunOutcome, SimStats};
use crate::core::work::scheduler::{EventContext, SchedulerState};
use crate::core::work::task::TaskRef;
use crate::core::worker::Worker;
use crate::core::world::World;
use crate::host::node::Node;

pub struct Manager {
    world: World,
    nodes: Vec<Node>,
    state: SchedulerState,
    // the simulator ends after running the events at this time
    end_time: EmulatedTime,
    outcome: Option<RunOutcome>,
}

impl Manager {
    /// `nodes[i]` must have id `i`.
    pub fn new(world: World, nodes: Vec<Node>, end_time: EmulatedTime) -> Self {
        for (i, node) in nodes.iter().enumerate() {
            assert_eq!(usize::from(node.id()), i, "Nodes must be given in id order");
        }
        Self {
            world,
            state: SchedulerState::new(nodes.len()),
            nodes,
            end_time,
            outcome: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(usize::from(id))
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn end_time(&self) -> EmulatedTime {
        self.end_time
    }

    /// Run `task` on `node` at `time`, before the loop starts.
    pub fn schedule(&mut self, node: NodeId, time: EmulatedTime, task: TaskRef) {
        self.state.push(node, node, time, task);
    }

    /// Run events in order until none are left before the end time or a node asks to stop.
    /// `on_progress` is called with the time of every event that ran.
    pub fn run(&mut self, mut on_progress: impl FnMut(EmulatedTime)) -> RunOutcome {
        let mut last_event_time = EmulatedTime::SIMULATION_START;

        while let Some(time) = self.state.next_event_time() {
            if time > self.end_time {
                break;
            }
            let Some(event) = self.state.pop() else {
                break;
            };
            last_event_time = time;

            let node_id = event.node_id();
            let node = &mut self.nodes[usize::from(node_id)];

            Worker::set_current_time(time);
            Worker::set_active_node(Arc::clone(node.core().info()));

            let mut ctx = EventContext::new(time, node_id, &self.world, &mut self.state);
            event.into_task().execute(node, &mut ctx);

            Worker::clear_active_node();
            on_progress(time);

            if self.state.is_stopping() {
                break;
            }
        }
        Worker::clear_current_time();

        let captured = self.state.capture().copied();
        let end_time = if self.state.is_stopping() {
            last_event_time
        } else {
            self.end_time
        };
        let outcome = RunOutcome { end_time, captured };
        self.outcome = Some(outcome);
        outcome
    }

    /// Statistics of the run so far.
    pub fn stats(&self) -> SimStats {
        SimStats {
            outcome: self.outcome.unwrap_or(RunOutcome {
                end_time: EmulatedTime::SIMULATION_START,
                captured: None,
            }),
            events: self.state.counters().clone(),
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeStats {
                    id: n.id(),
                    name: n.core().name().to_string(),
                    apps: n.app_reports(),
                })
                .collect(),
        }
    }
}

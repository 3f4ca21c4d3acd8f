//! Node movement. Each node owns exactly one mobility model, shared through the
//! [`MobilityRegistry`] so that the channel and the adversaries can look up where other nodes
//! are. Models are lazy: they only move when asked for their state at a given time, and callers
//! always pass the current simulation time in explicitly.

use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use crate::utility::callback_queue::{CallbackQueue, EventSource, Handle};

pub mod constant_position;
pub mod position_allocator;
pub mod pursuit;
pub mod random_waypoint;
mod vector;

pub use vector::Vector;

use self::constant_position::ConstantPositionMobilityModel;
use self::pursuit::PursuitMobilityModel;
use self::random_waypoint::RandomWaypointMobilityModel;

/// Emitted whenever a model's velocity changes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CourseChange {
    /// When the change took effect. Lazy models may report a change some time after it happened.
    pub time: EmulatedTime,
    pub position: Vector,
    pub velocity: Vector,
}

/// Course change listeners shared by all model kinds.
#[derive(Debug, Default)]
pub(crate) struct CourseChangeSource {
    source: EventSource<CourseChange>,
}

impl CourseChangeSource {
    pub fn add_listener(
        &mut self,
        f: impl Fn(CourseChange, &mut CallbackQueue) + Send + Sync + 'static,
    ) -> Handle<CourseChange> {
        self.source.add_listener(f)
    }

    pub fn notify(&self, time: EmulatedTime, position: Vector, velocity: Vector) {
        let change = CourseChange {
            time,
            position,
            velocity,
        };
        CallbackQueue::queue_and_run(|q| self.source.notify_listeners(change, q));
    }
}

#[derive(Debug)]
pub enum MobilityModel {
    ConstantPosition(ConstantPositionMobilityModel),
    RandomWaypoint(RandomWaypointMobilityModel),
    Pursuit(PursuitMobilityModel),
}

impl MobilityModel {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConstantPosition(_) => "constant-position",
            Self::RandomWaypoint(_) => "random-waypoint",
            Self::Pursuit(_) => "pursuit",
        }
    }

    /// Bring the model's state up to `now`.
    pub fn advance(&mut self, now: EmulatedTime) {
        match self {
            Self::ConstantPosition(_) => {}
            Self::RandomWaypoint(m) => m.advance(now),
            Self::Pursuit(m) => m.advance(now),
        }
    }

    pub fn position(&mut self, now: EmulatedTime) -> Vector {
        match self {
            Self::ConstantPosition(m) => m.position(),
            Self::RandomWaypoint(m) => m.position(now),
            Self::Pursuit(m) => m.position(now),
        }
    }

    pub fn velocity(&mut self, now: EmulatedTime) -> Vector {
        match self {
            Self::ConstantPosition(_) => Vector::ZERO,
            Self::RandomWaypoint(m) => m.velocity(now),
            Self::Pursuit(m) => m.velocity(now),
        }
    }

    pub fn set_position(&mut self, now: EmulatedTime, position: Vector) {
        match self {
            Self::ConstantPosition(m) => m.set_position(now, position),
            Self::RandomWaypoint(m) => m.set_position(now, position),
            Self::Pursuit(m) => m.set_position(now, position),
        }
    }

    /// Listeners receive the new state in the message and must not borrow the model itself, since
    /// they run while the model is still being updated.
    pub fn add_course_change_listener(
        &mut self,
        f: impl Fn(CourseChange, &mut CallbackQueue) + Send + Sync + 'static,
    ) -> Handle<CourseChange> {
        match self {
            Self::ConstantPosition(m) => m.course_changes_mut().add_listener(f),
            Self::RandomWaypoint(m) => m.course_changes_mut().add_listener(f),
            Self::Pursuit(m) => m.course_changes_mut().add_listener(f),
        }
    }

    pub fn as_pursuit_mut(&mut self) -> Option<&mut PursuitMobilityModel> {
        match self {
            Self::Pursuit(m) => Some(m),
            _ => None,
        }
    }
}

pub type MobilityRef = Arc<AtomicRefCell<MobilityModel>>;

/// The mobility model of every node, indexed by node id.
#[derive(Debug, Default)]
pub struct MobilityRegistry {
    models: Vec<MobilityRef>,
}

impl MobilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the model of the next node. Nodes must be registered in id order.
    pub fn register(&mut self, node: NodeId, model: MobilityModel) -> MobilityRef {
        assert_eq!(
            usize::from(node),
            self.models.len(),
            "Mobility models must be registered in node id order"
        );
        let model = Arc::new(AtomicRefCell::new(model));
        self.models.push(Arc::clone(&model));
        model
    }

    pub fn get(&self, node: NodeId) -> Option<&MobilityRef> {
        self.models.get(usize::from(node))
    }

    pub fn position(&self, node: NodeId, now: EmulatedTime) -> Option<Vector> {
        self.get(node).map(|m| m.borrow_mut().position(now))
    }

    pub fn distance(&self, a: NodeId, b: NodeId, now: EmulatedTime) -> Option<f64> {
        Some(self.position(a, now)?.distance(&self.position(b, now)?))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// The ability to steer one pursuit model. Only an adversary is handed one.
#[derive(Debug, Clone)]
pub struct PursuitHandle {
    model: MobilityRef,
}

impl PursuitHandle {
    /// Returns `None` if `model` is not a pursuit model.
    pub fn new(model: MobilityRef) -> Option<Self> {
        if model.borrow_mut().as_pursuit_mut().is_none() {
            return None;
        }
        Some(Self { model })
    }

    fn with<U>(&self, f: impl FnOnce(&mut PursuitMobilityModel) -> U) -> U {
        let mut model = self.model.borrow_mut();
        match model.as_pursuit_mut() {
            Some(pursuit) => f(pursuit),
            None => unreachable!("Pursuit handle over a {} model", model.kind()),
        }
    }

    pub fn set_target(&self, now: EmulatedTime, arrival: EmulatedTime, target: Vector) {
        self.with(|m| m.set_target(now, arrival, target))
    }

    pub fn position(&self, now: EmulatedTime) -> Vector {
        self.with(|m| m.position(now))
    }

    pub fn is_pursuing(&self, now: EmulatedTime) -> bool {
        self.with(|m| {
            m.advance(now);
            m.state() == pursuit::PursuitState::Pursuing
        })
    }
}

#[cfg(test)]
mod tests {
    use sim_helper::simulation_time::SimulationTime;

    use super::*;

    #[test]
    fn test_registry_positions() {
        let mut registry = MobilityRegistry::new();
        registry.register(
            NodeId::from(0u32),
            MobilityModel::ConstantPosition(ConstantPositionMobilityModel::new(Vector::ZERO)),
        );
        registry.register(
            NodeId::from(1u32),
            MobilityModel::ConstantPosition(ConstantPositionMobilityModel::new(Vector::new(
                6.0, 8.0, 0.0,
            ))),
        );

        let now = EmulatedTime::SIMULATION_START;
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.distance(NodeId::from(0u32), NodeId::from(1u32), now),
            Some(10.0)
        );
        assert_eq!(registry.position(NodeId::from(2u32), now), None);
    }

    #[test]
    #[should_panic]
    fn test_registry_out_of_order() {
        let mut registry = MobilityRegistry::new();
        registry.register(
            NodeId::from(1u32),
            MobilityModel::ConstantPosition(ConstantPositionMobilityModel::new(Vector::ZERO)),
        );
    }

    #[test]
    fn test_pursuit_handle_only_for_pursuit() {
        let start = EmulatedTime::SIMULATION_START;
        let constant: MobilityRef = Arc::new(AtomicRefCell::new(MobilityModel::ConstantPosition(
            ConstantPositionMobilityModel::new(Vector::ZERO),
        )));
        assert!(PursuitHandle::new(constant).is_none());

        let pursuit: MobilityRef = Arc::new(AtomicRefCell::new(MobilityModel::Pursuit(
            PursuitMobilityModel::new(start, Vector::ZERO),
        )));
        let handle = PursuitHandle::new(pursuit).unwrap();
        handle.set_target(
            start,
            start + SimulationTime::from_secs(10),
            Vector::new(10.0, 0.0, 0.0),
        );
        assert!(handle.is_pursuing(start + SimulationTime::from_secs(5)));
        assert_eq!(
            handle.position(start + SimulationTime::from_secs(5)),
            Vector::new(5.0, 0.0, 0.0)
        );
        assert!(!handle.is_pursuing(start + SimulationTime::from_secs(10)));
    }
}

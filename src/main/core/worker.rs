//! Thread-local context of the event loop: the node whose event is running and the simulation
//! time of that event. Simulation code is always handed the time explicitly; this exists for the
//! logger and other diagnostics that have no other way to find out.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use sim_helper::emulated_time::EmulatedTime;

use crate::host::node::NodeInfo;

std::thread_local! {
    static WORKER: Worker = const {
        Worker {
            current_time: Cell::new(None),
            active_node: RefCell::new(None),
        }
    };
}

pub struct Worker {
    current_time: Cell<Option<EmulatedTime>>,
    active_node: RefCell<Option<Arc<NodeInfo>>>,
}

impl Worker {
    pub fn set_current_time(t: EmulatedTime) {
        let _ = WORKER.try_with(|w| w.current_time.set(Some(t)));
    }

    pub fn clear_current_time() {
        let _ = WORKER.try_with(|w| w.current_time.set(None));
    }

    /// `None` outside of an event, or if the thread-local was already destroyed.
    pub fn current_time() -> Option<EmulatedTime> {
        WORKER.try_with(|w| w.current_time.get()).ok().flatten()
    }

    pub fn set_active_node(info: Arc<NodeInfo>) {
        let _ = WORKER.try_with(|w| *w.active_node.borrow_mut() = Some(info));
    }

    pub fn clear_active_node() {
        let _ = WORKER.try_with(|w| w.active_node.borrow_mut().take());
    }

    pub fn active_node() -> Option<Arc<NodeInfo>> {
        WORKER
            .try_with(|w| w.active_node.try_borrow().ok()?.clone())
            .ok()
            .flatten()
    }

    /// Run `f` on the info of the node whose event is running, if any.
    pub fn with_active_node<F, R>(f: F) -> Option<R>
    where
        F: FnOnce(&NodeInfo) -> R,
    {
        WORKER
            .try_with(|w| {
                // the logger can be called while the node is borrowed, so only the info is kept
                let node = w.active_node.try_borrow().ok()?;
                node.as_deref().map(f)
            })
            .ok()
            .flatten()
    }
}

use std::sync::Arc;

use crate::core::work::scheduler::EventContext;
use crate::host::node::Node;

/// A shareable callback run against the destination node of an event.
#[derive(Clone)]
pub struct TaskRef {
    inner: Arc<dyn Fn(&mut Node, &mut EventContext) + Send + Sync>,
}

impl TaskRef {
    pub fn new(f: impl Fn(&mut Node, &mut EventContext) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn execute(&self, node: &mut Node, ctx: &mut EventContext) {
        (self.inner)(node, ctx)
    }
}

impl PartialEq for TaskRef {
    /// Two `TaskRef`s are equal if they point to the same task object.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TaskRef {}

impl std::fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRef")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

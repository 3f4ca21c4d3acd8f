use serde::Serialize;

use crate::core::work::scheduler::EventContext;
use crate::core::work::task::TaskRef;
use crate::host::node::NodeCore;
use crate::network::packet::PacketRc;
use crate::utility::counter::Counter;

/// Identifies an application on its node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppId(usize);

impl AppId {
    /// A task that calls [`Application::on_timer`] with `token` on this application.
    pub fn timer_task(self, token: u64) -> TaskRef {
        TaskRef::new(move |node, ctx| node.on_app_timer(self, token, ctx))
    }
}

impl From<usize> for AppId {
    fn from(i: usize) -> Self {
        AppId(i)
    }
}

impl From<AppId> for usize {
    fn from(i: AppId) -> Self {
        i.0
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "app{}", self.0)
    }
}

/// What an application reports at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct AppReport {
    pub name: String,
    pub counters: Counter,
    /// Periodic throughput samples, for applications that take them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub throughput_kbps: Vec<f64>,
}

/// A workload running on a node. All callbacks get the node's network stack and mobility, and
/// the event context to schedule more work with.
pub trait Application: std::fmt::Debug + Send {
    fn name(&self) -> &str;

    /// `id` is this application's id on its node, needed to schedule its own timers.
    fn start(&mut self, id: AppId, node: &mut NodeCore, ctx: &mut EventContext);

    fn stop(&mut self, node: &mut NodeCore, ctx: &mut EventContext);

    /// A timer scheduled with [`AppId::timer_task`] fired.
    fn on_timer(&mut self, _token: u64, _node: &mut NodeCore, _ctx: &mut EventContext) {}

    /// A datagram arrived on one of this application's sockets.
    fn receive(&mut self, _packet: &PacketRc, _node: &mut NodeCore, _ctx: &mut EventContext) {}

    fn report(&self) -> AppReport {
        AppReport {
            name: self.name().to_string(),
            counters: Counter::new(),
            throughput_kbps: Vec::new(),
        }
    }
}

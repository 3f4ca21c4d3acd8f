use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use super::task::TaskRef;

#[derive(Debug)]
pub struct Event {
    task: TaskRef,
    time: EmulatedTime,
    src_node_id: NodeId,
    dst_node_id: NodeId,
    src_node_event_id: u64,
}

impl Event {
    /// `src_node_event_id` must be unique among the events created by `src_node_id`, and increase
    /// with every event it creates.
    pub fn new(
        task: TaskRef,
        time: EmulatedTime,
        src_node_id: NodeId,
        src_node_event_id: u64,
        dst_node_id: NodeId,
    ) -> Self {
        Self {
            task,
            time,
            src_node_id,
            dst_node_id,
            src_node_event_id,
        }
    }

    pub fn time(&self) -> EmulatedTime {
        self.time
    }

    pub fn node_id(&self) -> NodeId {
        self.dst_node_id
    }

    pub fn src_node_id(&self) -> NodeId {
        self.src_node_id
    }

    pub fn into_task(self) -> TaskRef {
        self.task
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.task == other.task
            && self.time == other.time
            && self.src_node_id == other.src_node_id
            && self.dst_node_id == other.dst_node_id
            && self.src_node_event_id == other.src_node_event_id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        // sort by event time first, then use other fields we're able to compare
        let cmp = self
            .time
            .cmp(&other.time)
            .then_with(|| self.dst_node_id.cmp(&other.dst_node_id))
            .then_with(|| self.src_node_id.cmp(&other.src_node_id))
            .then_with(|| self.src_node_event_id.cmp(&other.src_node_event_id));

        // two distinct events from the same source never share an id
        if cmp == std::cmp::Ordering::Equal && self.task != other.task {
            return None;
        }

        Some(cmp)
    }
}

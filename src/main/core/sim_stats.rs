use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use sim_helper::emulated_time::EmulatedTime;
use sim_helper::NodeId;

use crate::apps::adversary::Capture;
use crate::host::application::AppReport;
use crate::utility::counter::Counter;

/// How a run ended.
#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// Time of the last event that ran, or the stop time if the run was not cut short.
    pub end_time: EmulatedTime,
    pub captured: Option<Capture>,
}

#[derive(Serialize, Clone, Debug)]
pub struct NodeStats {
    pub id: NodeId,
    pub name: String,
    pub apps: Vec<AppReport>,
}

#[derive(Serialize, Clone, Debug)]
pub struct SimStats {
    pub outcome: RunOutcome,
    /// Run-wide counters, such as frames sent and packets forwarded.
    pub events: Counter,
    pub nodes: Vec<NodeStats>,
}

impl SimStats {
    /// Writes the stats as pretty JSON to `path`.
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file {}", path.display()))?;

        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write stats json to file {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sim_helper::simulation_time::SimulationTime;

    use super::*;

    #[test]
    fn test_write_json() {
        let mut events = Counter::new();
        events.add_value("frames-sent", 3);
        let time = EmulatedTime::SIMULATION_START + SimulationTime::SECOND;
        let stats = SimStats {
            outcome: RunOutcome {
                end_time: time,
                captured: Some(Capture {
                    adversary: NodeId::new(4),
                    source: NodeId::new(1),
                    time,
                }),
            },
            events,
            nodes: vec![NodeStats {
                id: NodeId::new(0),
                name: "node0".into(),
                apps: Vec::new(),
            }],
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sim-stats.json");
        stats.write(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(json["events"]["frames-sent"], 3);
        assert_eq!(json["outcome"]["captured"]["source"], 1);
        assert_eq!(json["nodes"][0]["name"], "node0");
    }
}

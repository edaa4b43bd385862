//! Job step topology lookup.
//!
//! The connection manager needs four facts about the job it runs in: the
//! local node id, the number of nodes, the hostname of any peer (for
//! connecting and for diagnostics) and the job/step identifiers (to
//! terminate the step). [`JobTopology`] is that contract;
//! [`StaticTopology`] is the configuration-backed implementation.

use crate::config::JobConfig;
use std::fmt;

/// Node identity inside a job step. Equal to the peer's registry slot index.
pub type NodeId = u32;

/// Job and step identifiers of the running step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobStepId {
    /// Job identifier.
    pub job_id: u32,
    /// Step identifier within the job.
    pub step_id: u32,
}

impl fmt::Display for JobStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.job_id, self.step_id)
    }
}

/// Topology/identity service consumed by the connection manager.
pub trait JobTopology: Send + Sync {
    /// Id of the local node.
    fn node_id(&self) -> NodeId;

    /// Number of nodes in the step.
    fn node_count(&self) -> u32;

    /// Hostname of `node_id`, or `None` if the id is not part of the job.
    fn job_host(&self, node_id: NodeId) -> Option<String>;

    /// Job and step identifiers.
    fn step(&self) -> JobStepId;
}

/// Topology fixed at startup from the `[job]` configuration table.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    step: JobStepId,
    node_id: NodeId,
    hosts: Vec<String>,
}

impl StaticTopology {
    /// Build a topology directly.
    pub fn new(step: JobStepId, node_id: NodeId, hosts: Vec<String>) -> Self {
        Self {
            step,
            node_id,
            hosts,
        }
    }

    /// Build a topology from a validated `[job]` table.
    pub fn from_config(config: &JobConfig) -> Self {
        Self::new(
            JobStepId {
                job_id: config.job_id,
                step_id: config.step_id,
            },
            config.node_id,
            config.hosts.clone(),
        )
    }

    /// Node id of `hostname`, if it belongs to the step.
    pub fn host_id(&self, hostname: &str) -> Option<NodeId> {
        self.hosts
            .iter()
            .position(|h| h == hostname)
            .map(|idx| idx as NodeId)
    }
}

impl JobTopology for StaticTopology {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn node_count(&self) -> u32 {
        self.hosts.len() as u32
    }

    fn job_host(&self, node_id: NodeId) -> Option<String> {
        self.hosts.get(node_id as usize).cloned()
    }

    fn step(&self) -> JobStepId {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topo() -> StaticTopology {
        StaticTopology::new(
            JobStepId {
                job_id: 42,
                step_id: 3,
            },
            1,
            vec!["a".into(), "b".into(), "c".into()],
        )
    }

    #[test]
    fn lookup_by_id_and_name() {
        let t = topo();
        assert_eq!(t.node_count(), 3);
        assert_eq!(t.node_id(), 1);
        assert_eq!(t.job_host(2).as_deref(), Some("c"));
        assert_eq!(t.job_host(3), None);
        assert_eq!(t.host_id("b"), Some(1));
        assert_eq!(t.host_id("z"), None);
    }

    #[test]
    fn step_display() {
        assert_eq!(topo().step().to_string(), "42.3");
    }

    #[test]
    fn from_config_copies_layout() {
        let cfg = JobConfig {
            job_id: 9,
            step_id: 1,
            node_id: 0,
            hosts: vec!["x".into(), "y".into()],
        };
        let t = StaticTopology::from_config(&cfg);
        assert_eq!(t.step(), JobStepId { job_id: 9, step_id: 1 });
        assert_eq!(t.job_host(1).as_deref(), Some("y"));
    }
}

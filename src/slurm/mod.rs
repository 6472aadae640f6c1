pub mod command;
mod jobs;
mod misc;
mod nodes;
mod stats;

use std::collections::BTreeMap;
use std::time::Duration;

pub use jobs::RawJob;
pub use nodes::RawNode;
pub use stats::Statistics;

use color_eyre::Result;

/// Read-only queries against the cluster resource manager
pub trait Scheduler: Send + Sync {
    /// Nodes keyed by name
    fn nodes(&self) -> Result<BTreeMap<String, RawNode>>;
    /// Queued and running jobs keyed by job ID
    fn jobs(&self) -> Result<BTreeMap<u32, RawJob>>;
    fn statistics(&self) -> Result<Statistics>;
}

/// Queries Slurm via its command-line tools
#[derive(Clone, Debug)]
pub struct Slurm {
    pub scontrol: String,
    pub squeue: String,
    pub sdiag: String,
    /// Upper bound on the runtime of each command
    pub timeout: Duration,
}

impl Scheduler for Slurm {
    fn nodes(&self) -> Result<BTreeMap<String, RawNode>> {
        RawNode::collect(&self.scontrol, self.timeout)
    }

    fn jobs(&self) -> Result<BTreeMap<u32, RawJob>> {
        RawJob::collect(&self.squeue, self.timeout)
    }

    fn statistics(&self) -> Result<Statistics> {
        Statistics::collect(&self.sdiag, self.timeout)
    }
}

/// Wraps a [`Scheduler`], replacing failures by empty results.
///
/// An empty result therefore means "no data available right now" rather than
/// "the cluster has no nodes"; failures are logged but never returned.
pub struct SchedulerClient<S> {
    scheduler: S,
}

impl<S: Scheduler> SchedulerClient<S> {
    pub fn new(scheduler: S) -> Self {
        Self { scheduler }
    }

    pub fn nodes(&self) -> BTreeMap<String, RawNode> {
        or_empty("nodes", self.scheduler.nodes())
    }

    pub fn jobs(&self) -> BTreeMap<u32, RawJob> {
        or_empty("jobs", self.scheduler.jobs())
    }

    pub fn statistics(&self) -> Statistics {
        or_empty("statistics", self.scheduler.statistics())
    }
}

fn or_empty<T: Default>(what: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            tracing::error!("failed to fetch {} from scheduler: {:#}", what, error);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::eyre::eyre;

    use super::*;

    struct Unreachable;

    impl Scheduler for Unreachable {
        fn nodes(&self) -> Result<BTreeMap<String, RawNode>> {
            Err(eyre!("slurm_load_node error: Unable to contact slurm controller"))
        }

        fn jobs(&self) -> Result<BTreeMap<u32, RawJob>> {
            Err(eyre!("timed out"))
        }

        fn statistics(&self) -> Result<Statistics> {
            Err(eyre!("connection refused"))
        }
    }

    #[test]
    fn test_failures_become_empty() {
        let client = SchedulerClient::new(Unreachable);

        assert!(client.nodes().is_empty());
        assert!(client.jobs().is_empty());
        assert!(client.statistics().values.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_slurm_missing_executables() {
        let client = SchedulerClient::new(Slurm {
            scontrol: "/nonexistent/scontrol".into(),
            squeue: "/nonexistent/squeue".into(),
            sdiag: "/nonexistent/sdiag".into(),
            timeout: Duration::from_secs(1),
        });

        assert!(client.nodes().is_empty());
        assert!(client.jobs().is_empty());
    }
}

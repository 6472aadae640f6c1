use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::Config;
use crate::identity::{Getent, IdentityResolver, IdentitySource, User, UserDirectory};
use crate::jobs::{self, JobFilter, JobRecord};
use crate::partitions::{DisplayMode, NodeAggregator, PartitionSummary};
use crate::slurm::{Scheduler, SchedulerClient, Slurm, Statistics};

/// Cached view of the cluster.
///
/// Node summaries, the job queue and scheduler statistics are each cached for
/// the live TTL; the user directory is cached for the (much longer) identity TTL.
pub struct ClusterState<S, I> {
    scheduler: SchedulerClient<S>,
    aggregator: NodeAggregator,
    resolver: IdentityResolver<I>,
    overrides: BTreeMap<String, String>,

    partitions: TtlCache<Vec<PartitionSummary>>,
    jobs: TtlCache<Vec<JobRecord>>,
    statistics: TtlCache<Statistics>,
    users: TtlCache<Vec<User>>,
}

impl ClusterState<Slurm, Getent> {
    /// Queries Slurm and `getent` as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.slurm(), config.getent(), config)
    }
}

impl<S: Scheduler, I: IdentitySource> ClusterState<S, I> {
    pub fn new(scheduler: S, identities: I, config: &Config) -> Self {
        Self::with_clock(scheduler, identities, config, Arc::new(SystemClock))
    }

    pub fn with_clock(scheduler: S, identities: I, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let live_ttl = config.live_ttl();

        Self {
            scheduler: SchedulerClient::new(scheduler),
            aggregator: NodeAggregator::new(
                config.excluded_nodes.iter().cloned(),
                config.partition_order.iter().cloned(),
            ),
            resolver: IdentityResolver::new(identities, config.groups.clone()),
            overrides: config.identity_overrides.clone(),
            partitions: TtlCache::with_clock(live_ttl, clock.clone()),
            jobs: TtlCache::with_clock(live_ttl, clock.clone()),
            statistics: TtlCache::with_clock(live_ttl, clock.clone()),
            users: TtlCache::with_clock(config.identity_ttl(), clock),
        }
    }

    /// Resources per partition, in display order. Empty if the scheduler
    /// could not be queried
    pub fn partition_summaries(&self, mode: DisplayMode) -> Arc<Vec<PartitionSummary>> {
        let summaries = self.partitions.get_with(|| {
            let nodes = self.scheduler.nodes();
            if nodes.is_empty() {
                tracing::warn!("no nodes found");
            }

            self.aggregator.aggregate(nodes.values(), DisplayMode::Availability)
        });

        match mode {
            DisplayMode::Availability => summaries,
            DisplayMode::Utilization => Arc::new(
                summaries
                    .iter()
                    .map(|summary| summary.with_mode(mode))
                    .collect(),
            ),
        }
    }

    /// Queued and running jobs ordered by ID, optionally restricted to a single user
    pub fn job_queue(&self, filter: Option<&JobFilter>) -> Vec<JobRecord> {
        let records = self.jobs.get_with(|| jobs::project(&self.scheduler.jobs(), None));

        match filter {
            Some(filter) => jobs::apply_filter(&records, filter),
            None => records.as_ref().clone(),
        }
    }

    /// Jobs of the chat user identified by `chat_id` or `display_name`, or
    /// `None` if no cluster user matches
    pub fn jobs_for(
        &self,
        chat_id: Option<&str>,
        display_name: Option<&str>,
    ) -> Option<Vec<JobRecord>> {
        let directory = self.directory();
        let Some(user) = directory.resolve(chat_id, display_name) else {
            tracing::debug!(?chat_id, ?display_name, "no cluster user found");
            return None;
        };

        Some(self.job_queue(Some(&JobFilter::from(user))))
    }

    pub fn statistics(&self) -> Arc<Statistics> {
        self.statistics.get_with(|| self.scheduler.statistics())
    }

    /// Users resolved from the configured groups
    pub fn resolve_identities(&self) -> Arc<Vec<User>> {
        self.users.get_with(|| self.resolver.resolve())
    }

    pub fn directory(&self) -> UserDirectory {
        UserDirectory::new(self.resolve_identities(), self.overrides.clone())
    }
}

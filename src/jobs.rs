use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::identity::User;
use crate::slurm::RawJob;
use crate::utilities::local_time;

/// Job names longer than this are truncated for display
const MAX_NAME_LENGTH: usize = 10;

/// Represents the time taken by a Slurm job
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct JobDuration {
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
}

impl JobDuration {
    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            days: seconds / 86_400,
            hours: seconds % 86_400 / 3_600,
            minutes: seconds % 3_600 / 60,
            seconds: seconds % 60,
        }
    }
}

/// Formats the job duration to match squeue output, e.g. `0:45`, `1:02:05` or `1-01:00:00`
impl fmt::Display for JobDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            write!(f, "{}-{:02}:{:02}", self.days, self.hours, self.minutes)?
        } else if self.hours > 0 {
            write!(f, "{}:{:02}", self.hours, self.minutes)?
        } else {
            write!(f, "{}", self.minutes)?
        }

        write!(f, ":{:02}", self.seconds)
    }
}

/// A job, projected to the fields shown to users
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct JobRecord {
    pub job_id: u32,
    /// Name, truncated to 10 characters plus ellipsis
    pub name: String,
    pub partition: String,
    pub nodes: String,
    pub node_count: u64,
    pub state: String,
    /// Seconds the job has been running
    pub run_time: u64,
    /// `run_time` formatted like squeue's `TIME` column
    pub elapsed: String,
    pub user_id: String,
    /// The UID, or the resolved user name if the queue was filtered by user
    pub username: String,
    pub submit_time: Option<DateTime<Local>>,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub eligible_time: Option<DateTime<Local>>,
}

impl JobRecord {
    fn project(id: u32, job: &RawJob) -> JobRecord {
        let run_time = u64::try_from(job.run_time).unwrap_or(0);
        let user_id = job.user_id.to_string();

        JobRecord {
            job_id: id,
            name: truncate_name(&job.name),
            partition: job.partition.clone(),
            nodes: job.nodes.clone(),
            node_count: u64::try_from(job.node_count).unwrap_or(0),
            state: job.job_state.clone(),
            run_time,
            elapsed: JobDuration::from_seconds(run_time).to_string(),
            username: user_id.clone(),
            user_id,
            submit_time: local_time(job.submit_time),
            start_time: local_time(job.start_time),
            end_time: local_time(job.end_time),
            eligible_time: local_time(job.eligible_time),
        }
    }
}

/// Selects the jobs of a single user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobFilter {
    /// UID of the owner, as a string
    pub uid: String,
    /// Name shown in place of the UID
    pub name: String,
}

impl From<&User> for JobFilter {
    fn from(user: &User) -> Self {
        JobFilter {
            uid: user.unix_uid.clone(),
            name: user.username.clone(),
        }
    }
}

/// Truncates names longer than 10 characters to 10 characters plus `...`
pub fn truncate_name(name: &str) -> String {
    if name.chars().count() > MAX_NAME_LENGTH {
        let prefix: String = name.chars().take(MAX_NAME_LENGTH).collect();
        format!("{}...", prefix)
    } else {
        name.to_string()
    }
}

/// Projects jobs keyed by ID to display records, ordered by ID and optionally
/// restricted to the owner selected by `filter`
pub fn project(jobs: &BTreeMap<u32, RawJob>, filter: Option<&JobFilter>) -> Vec<JobRecord> {
    let records: Vec<JobRecord> = jobs
        .iter()
        .map(|(&id, job)| JobRecord::project(id, job))
        .collect();

    match filter {
        Some(filter) => apply_filter(&records, filter),
        None => records,
    }
}

/// Keeps only the jobs owned by `filter.uid`, showing `filter.name` as their user
pub fn apply_filter(records: &[JobRecord], filter: &JobFilter) -> Vec<JobRecord> {
    records
        .iter()
        .filter(|record| record.user_id == filter.uid)
        .map(|record| JobRecord {
            username: filter.name.clone(),
            ..record.clone()
        })
        .collect()
}

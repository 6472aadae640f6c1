use std::collections::BTreeMap;
use std::time::Duration;

use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Deserialize;

use super::command;
use super::misc::{number, state};

/// A job as reported by `squeue --json`
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RawJob {
    /// Also used as the key of the collection returned by [`RawJob::parse`]
    #[serde(default)]
    pub job_id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub partition: String,
    /// Compressed host list, e.g. `c[001-004]`; empty for pending jobs
    #[serde(default)]
    pub nodes: String,
    #[serde(default, deserialize_with = "number")]
    pub node_count: i64,
    #[serde(default, deserialize_with = "state")]
    pub job_state: String,
    #[serde(default)]
    pub user_id: u32,

    /// Seconds since the epoch; zero if not (yet) known
    #[serde(default, deserialize_with = "number")]
    pub submit_time: i64,
    #[serde(default, deserialize_with = "number")]
    pub start_time: i64,
    #[serde(default, deserialize_with = "number")]
    pub end_time: i64,
    #[serde(default, deserialize_with = "number")]
    pub eligible_time: i64,

    /// Seconds the job has been running; not part of the `squeue` output
    #[serde(skip)]
    pub run_time: i64,
}

#[derive(Deserialize)]
struct JobsResponse {
    #[serde(default)]
    jobs: Vec<serde_json::Value>,
}

const RUNNING_STATES: [&str; 4] = ["RUNNING", "COMPLETING", "SUSPENDED", "STOPPED"];

impl RawJob {
    /// Calls `squeue --json`, returning jobs keyed by job ID
    pub fn collect(exe: &str, timeout: Duration) -> Result<BTreeMap<u32, RawJob>> {
        let output = command::run(exe, &["--json"], timeout)?;

        Self::parse(&output, chrono::Utc::now().timestamp())
    }

    /// Parses `squeue --json` output, deriving run times relative to `now`
    pub fn parse(json: &[u8], now: i64) -> Result<BTreeMap<u32, RawJob>> {
        let response: JobsResponse =
            serde_json::from_slice(json).wrap_err("error while parsing squeue output")?;

        let mut jobs = BTreeMap::new();
        for value in response.jobs {
            match RawJob::deserialize(value) {
                Ok(mut job) => {
                    job.run_time = job.run_time_at(now);
                    jobs.insert(job.job_id, job);
                }
                Err(error) => tracing::warn!("skipping malformed job: {}", error),
            }
        }

        Ok(jobs)
    }

    fn is_started(&self) -> bool {
        self.job_state
            .split('+')
            .any(|state| RUNNING_STATES.contains(&state))
    }

    /// Seconds between start and `now` (or the end time, if already reached);
    /// clock skew may make this negative, which is clamped to zero
    fn run_time_at(&self, now: i64) -> i64 {
        if !self.is_started() || self.start_time <= 0 {
            return 0;
        }

        let end = if self.end_time > 0 {
            now.min(self.end_time)
        } else {
            now
        };

        (end - self.start_time).max(0)
    }
}

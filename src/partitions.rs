//! Aggregation of per-node scheduler records into per-partition summaries.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::slurm::RawNode;
use crate::utilities::{format_time, local_time};

/// How derived metrics are rendered for display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    /// `<available> of <total>`
    #[default]
    Availability,
    /// `<used/total>%`
    Utilization,
}

/// Display strings for a partition; empty where the total is zero and a
/// ratio would be meaningless
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PartitionDisplay {
    pub cpus: String,
    pub memory: String,
    pub gres: String,
}

/// Resources of all nodes belonging to a single partition
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PartitionSummary {
    pub name: String,
    /// Member nodes, in the order the scheduler reported them
    pub nodes: Vec<String>,
    /// State of each member node; parallel to `nodes`
    pub states: Vec<String>,

    pub cpus_available: u64,
    pub cpus_allocated: u64,
    pub cpus: u64,

    pub gres_available: u64,
    pub gres_allocated: u64,
    pub gres: u64,

    /// Free memory in GiB; rounded down per node
    pub free_mem: u64,
    /// Total memory in GiB; rounded down per node
    pub real_memory: u64,

    /// Most recent time at which any member node was busy
    pub last_busy: Option<String>,

    pub display: PartitionDisplay,
}

impl PartitionSummary {
    pub fn render(&self, mode: DisplayMode) -> PartitionDisplay {
        match mode {
            DisplayMode::Availability => PartitionDisplay {
                cpus: format!("{} of {}", self.cpus_available, self.cpus),
                memory: format!("{} GB of {} GB", self.free_mem, self.real_memory),
                gres: if self.gres > 0 {
                    format!("{} of {}", self.gres_available, self.gres)
                } else {
                    String::new()
                },
            },
            DisplayMode::Utilization => PartitionDisplay {
                cpus: percentage(self.cpus_allocated, self.cpus),
                memory: percentage(
                    self.real_memory.saturating_sub(self.free_mem),
                    self.real_memory,
                ),
                gres: percentage(self.gres_allocated, self.gres),
            },
        }
    }

    /// Returns a copy with display strings rendered in `mode`
    pub fn with_mode(&self, mode: DisplayMode) -> PartitionSummary {
        PartitionSummary {
            display: self.render(mode),
            ..self.clone()
        }
    }
}

fn percentage(used: u64, total: u64) -> String {
    if total == 0 {
        return String::new();
    }

    format!("{}%", (used as f64 * 100.0 / total as f64).round())
}

/// Node record with normalized, display-relevant fields
#[derive(Clone, Debug, PartialEq)]
struct NodeRow {
    name: String,
    state: String,
    cpus: u64,
    alloc_cpus: u64,
    gres: u64,
    gres_used: u64,
    free_mem: u64,
    real_memory: u64,
    last_busy: Option<DateTime<Local>>,
}

impl NodeRow {
    fn normalize(node: &RawNode) -> NodeRow {
        let cpus = non_negative(node.cpus);
        let gres = gres_count(&node.name, "gres", &node.gres);
        let real_memory = gibibytes(node.real_memory);

        NodeRow {
            name: node.name.clone(),
            state: node.state.clone(),
            cpus,
            // Allocations are capped at the totals so that available + allocated == total
            alloc_cpus: non_negative(node.alloc_cpus).min(cpus),
            gres,
            gres_used: gres_count(&node.name, "gres_used", &node.gres_used).min(gres),
            free_mem: gibibytes(node.free_mem.unwrap_or(0)).min(real_memory),
            real_memory,
            last_busy: local_time(node.last_busy),
        }
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// MiB to whole GiB, rounding down
fn gibibytes(mebibytes: i64) -> u64 {
    non_negative(mebibytes) / 1024
}

/// Returns the count of the first GRES entry, treating missing and malformed entries as zero
fn gres_count(node: &str, field: &str, gres: &[String]) -> u64 {
    let Some(entry) = gres.first() else {
        return 0;
    };

    parse_gres(entry).unwrap_or_else(|| {
        tracing::debug!(node, field, value = %entry, "unparseable GRES; counting as zero");
        0
    })
}

/// Parses the count of a GRES entry such as `gpu:4`, `gpu:a100:4(IDX:0-3)` or a bare `4`
pub fn parse_gres(entry: &str) -> Option<u64> {
    let entry = entry.trim();
    // Strip index lists, which contain colons of their own
    let (entry, _) = entry.split_once('(').unwrap_or((entry, ""));
    if entry.is_empty() {
        return Some(0);
    }

    entry.rsplit(':').next()?.parse().ok()
}

/// Groups nodes by partition, in a fixed display order
#[derive(Clone, Debug, Default)]
pub struct NodeAggregator {
    /// Nodes never included in summaries
    excluded: BTreeSet<String>,
    /// Display order of known partitions; other partitions follow alphabetically
    order: Vec<String>,
}

impl NodeAggregator {
    pub fn new<E, O>(excluded: E, order: O) -> Self
    where
        E: IntoIterator<Item = String>,
        O: IntoIterator<Item = String>,
    {
        Self {
            excluded: excluded.into_iter().collect(),
            order: order.into_iter().collect(),
        }
    }

    pub fn aggregate<'a, I>(&self, nodes: I, mode: DisplayMode) -> Vec<PartitionSummary>
    where
        I: IntoIterator<Item = &'a RawNode>,
    {
        let mut partitions: HashMap<&str, PartitionSummary> = HashMap::new();
        let mut last_busy: HashMap<&str, DateTime<Local>> = HashMap::new();

        for node in nodes {
            if self.excluded.contains(&node.name) {
                continue;
            }

            let row = NodeRow::normalize(node);
            for partition in &node.partitions {
                let summary =
                    partitions
                        .entry(partition.as_str())
                        .or_insert_with(|| PartitionSummary {
                            name: partition.clone(),
                            ..Default::default()
                        });

                summary.nodes.push(row.name.clone());
                summary.states.push(row.state.clone());
                summary.cpus += row.cpus;
                summary.cpus_allocated += row.alloc_cpus;
                summary.cpus_available += row.cpus - row.alloc_cpus;
                summary.gres += row.gres;
                summary.gres_allocated += row.gres_used;
                summary.gres_available += row.gres - row.gres_used;
                summary.free_mem += row.free_mem;
                summary.real_memory += row.real_memory;

                if let Some(busy) = row.last_busy {
                    let latest = last_busy.entry(partition.as_str()).or_insert(busy);
                    *latest = (*latest).max(busy);
                }
            }
        }

        let mut summaries: Vec<PartitionSummary> = partitions
            .into_iter()
            .map(|(name, mut summary)| {
                summary.last_busy = last_busy.get(name).map(format_time);
                summary.display = summary.render(mode);
                summary
            })
            .collect();

        summaries.sort_by(|a, b| {
            (self.rank(&a.name), &a.name).cmp(&(self.rank(&b.name), &b.name))
        });

        summaries
    }

    fn rank(&self, partition: &str) -> usize {
        self.order
            .iter()
            .position(|name| name == partition)
            .unwrap_or(self.order.len())
    }
}

/// Command-line arguments
pub mod args;
/// Time-limited caching of upstream queries
pub mod cache;
/// Runtime configuration
pub mod config;
/// Mapping of chat users to cluster users
pub mod identity;
/// Projection of the job queue
pub mod jobs;
/// Log output
pub mod logging;
/// Per-partition summaries of node resources
pub mod partitions;
/// Querying of Slurm state
pub mod slurm;
/// Cached view of the cluster
pub mod state;
/// Byte splitting and timestamp helpers
pub mod utilities;

pub use state::ClusterState;

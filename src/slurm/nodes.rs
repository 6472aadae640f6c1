use std::collections::BTreeMap;
use std::time::Duration;

use color_eyre::eyre::Context;
use color_eyre::Result;
use serde::Deserialize;

use super::command;
use super::misc::{number, optional_number, state, string_list};

/// A node as reported by `scontrol show nodes`. Fields not needed for
/// reporting are not decoded
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RawNode {
    pub name: String,
    /// Partitions this node belongs to
    #[serde(default, deserialize_with = "string_list")]
    pub partitions: Vec<String>,
    #[serde(default, deserialize_with = "state")]
    pub state: String,

    #[serde(default, deserialize_with = "number")]
    pub cpus: i64,
    #[serde(default, deserialize_with = "number")]
    pub alloc_cpus: i64,

    /// Total memory in MiB
    #[serde(default, deserialize_with = "number")]
    pub real_memory: i64,
    /// Free memory in MiB; not reported by nodes that are down
    #[serde(default, deserialize_with = "optional_number")]
    pub free_mem: Option<i64>,

    /// Configured GRES, e.g. `["gpu:a100:4"]`
    #[serde(default, deserialize_with = "string_list")]
    pub gres: Vec<String>,
    /// Allocated GRES, e.g. `["gpu:a100:2(IDX:0-1)"]`
    #[serde(default, deserialize_with = "string_list")]
    pub gres_used: Vec<String>,

    /// Seconds since the epoch
    #[serde(default, deserialize_with = "number")]
    pub last_busy: i64,
    /// Seconds since the epoch
    #[serde(default, deserialize_with = "number")]
    pub slurmd_start_time: i64,
}

#[derive(Deserialize)]
struct NodesResponse {
    /// Decoded one at a time, so that a malformed node does not discard the rest
    #[serde(default)]
    nodes: Vec<serde_json::Value>,
}

impl RawNode {
    /// Calls `scontrol show nodes --json`, returning nodes keyed by name
    pub fn collect(exe: &str, timeout: Duration) -> Result<BTreeMap<String, RawNode>> {
        let output = command::run(exe, &["show", "nodes", "--json"], timeout)?;

        Self::parse(&output)
    }

    pub fn parse(json: &[u8]) -> Result<BTreeMap<String, RawNode>> {
        let response: NodesResponse =
            serde_json::from_slice(json).wrap_err("error while parsing scontrol output")?;

        let mut nodes = BTreeMap::new();
        for value in response.nodes {
            match RawNode::deserialize(value) {
                Ok(node) => {
                    nodes.insert(node.name.clone(), node);
                }
                Err(error) => tracing::warn!("skipping malformed node: {}", error),
            }
        }

        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_current_format() {
        let nodes = RawNode::parse(
            br#"{
                "nodes": [{
                    "name": "gpu01",
                    "architecture": "x86_64",
                    "partitions": ["gpu", "5days"],
                    "state": ["MIXED"],
                    "cpus": 64,
                    "alloc_cpus": 16,
                    "real_memory": 515072,
                    "free_mem": {"set": true, "infinite": false, "number": 412000},
                    "gres": "gpu:a100:4",
                    "gres_used": "gpu:a100:2(IDX:0-1)",
                    "last_busy": {"set": true, "infinite": false, "number": 1718000000},
                    "slurmd_start_time": 1717000000
                }],
                "errors": []
            }"#,
        )
        .unwrap();

        let node = &nodes["gpu01"];
        assert_eq!(node.partitions, ["gpu", "5days"]);
        assert_eq!(node.state, "MIXED");
        assert_eq!(node.cpus, 64);
        assert_eq!(node.alloc_cpus, 16);
        assert_eq!(node.free_mem, Some(412000));
        assert_eq!(node.gres, ["gpu:a100:4"]);
        assert_eq!(node.gres_used, ["gpu:a100:2(IDX:0-1)"]);
        assert_eq!(node.last_busy, 1718000000);
        assert_eq!(node.slurmd_start_time, 1717000000);
    }

    #[test]
    fn test_parse_sparse_node() {
        let nodes = RawNode::parse(
            br#"{"nodes": [{"name": "c001", "state": "down", "free_mem": null, "gres": ""}]}"#,
        )
        .unwrap();

        let node = &nodes["c001"];
        assert!(node.partitions.is_empty());
        assert!(node.gres.is_empty());
        assert_eq!(node.free_mem, None);
        assert_eq!(node.real_memory, 0);
    }

    #[test]
    fn test_malformed_node_does_not_discard_others() {
        let nodes = RawNode::parse(
            br#"{"nodes": [
                {"name": "c001", "partitions": ["4hours"], "cpus": 64, "free_mem": 1024},
                {"name": "g001", "partitions": ["gpu"], "gres": 4, "gres_used": 1},
                {"name": "c002", "cpus": 32, "free_mem": "N/A"},
                {"cpus": 16}
            ]}"#,
        )
        .unwrap();

        assert_eq!(nodes.keys().collect::<Vec<_>>(), ["c001", "c002", "g001"]);
        assert_eq!(nodes["c001"].cpus, 64);
        assert_eq!(nodes["c001"].free_mem, Some(1024));
        assert_eq!(nodes["g001"].gres, ["4"]);
        assert_eq!(nodes["g001"].gres_used, ["1"]);
        assert_eq!(nodes["c002"].cpus, 32);
        assert_eq!(nodes["c002"].free_mem, None);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(RawNode::parse(b"scontrol: error: Invalid user").is_err());
    }
}

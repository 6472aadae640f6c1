use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use color_eyre::eyre::{bail, Context};
use color_eyre::Result;
use serde::Deserialize;

use crate::args::Args;
use crate::identity::Getent;
use crate::slurm::Slurm;

/// Runtime configuration; every field may be omitted from configuration files
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Location of the `scontrol` executable
    pub scontrol: String,
    /// Location of the `squeue` executable
    pub squeue: String,
    /// Location of the `sdiag` executable
    pub sdiag: String,
    /// Location of the `getent` executable
    pub getent: String,
    /// Upper bound on the runtime of each external command
    pub command_timeout_secs: u64,

    /// Lifetime of cached node, job and statistics data
    pub live_ttl_secs: u64,
    /// Lifetime of the cached user directory
    pub identity_ttl_secs: u64,

    /// Groups whose members may be resolved to cluster users; required
    pub groups: Vec<String>,
    /// Nodes never included in partition summaries
    pub excluded_nodes: Vec<String>,
    /// Display order of partitions; unlisted partitions follow alphabetically
    pub partition_order: Vec<String>,
    /// Chat user IDs mapped directly to cluster usernames
    pub identity_overrides: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scontrol: "scontrol".to_string(),
            squeue: "squeue".to_string(),
            sdiag: "sdiag".to_string(),
            getent: "getent".to_string(),
            command_timeout_secs: 10,
            live_ttl_secs: 2,
            identity_ttl_secs: 24 * 60 * 60,
            groups: Vec::new(),
            excluded_nodes: Vec::new(),
            partition_order: ["30mins", "4hours", "12hours", "5days", "gpu"]
                .map(String::from)
                .to_vec(),
            identity_overrides: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reads a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Config> {
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read configuration file {:?}", path))?;

        serde_json::from_str(&text)
            .wrap_err_with(|| format!("invalid configuration file {:?}", path))
    }

    /// Loads the configuration file named by `args`, if any, applies the
    /// command-line overrides and validates the result
    pub fn load(args: &Args) -> Result<Config> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };

        config.apply(args)?;
        config.validate()?;

        Ok(config)
    }

    fn apply(&mut self, args: &Args) -> Result<()> {
        let paths = [
            (&mut self.scontrol, &args.scontrol),
            (&mut self.squeue, &args.squeue),
            (&mut self.sdiag, &args.sdiag),
            (&mut self.getent, &args.getent),
        ];

        for (target, value) in paths {
            if let Some(value) = value {
                target.clone_from(value);
            }
        }

        if let Some(timeout) = args.timeout {
            self.command_timeout_secs = timeout;
        }

        if !args.group.is_empty() {
            self.groups.clone_from(&args.group);
        }

        self.excluded_nodes.extend(args.exclude_node.iter().cloned());

        for value in &args.identity_override {
            match value.split_once('=') {
                Some((chat_id, username)) if !chat_id.is_empty() && !username.is_empty() => {
                    self.identity_overrides
                        .insert(chat_id.to_string(), username.to_string());
                }
                _ => bail!("invalid identity override {:?}; expected CHAT_ID=USERNAME", value),
            }
        }

        Ok(())
    }

    /// Rejects configurations that cannot be used at runtime
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            bail!("no user groups configured; at least one group is required");
        } else if let Some(group) = self.groups.iter().find(|g| g.trim().is_empty()) {
            bail!("invalid group name {:?}", group);
        } else if self.command_timeout_secs == 0 {
            bail!("command timeout must be at least one second");
        }

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn live_ttl(&self) -> Duration {
        Duration::from_secs(self.live_ttl_secs)
    }

    pub fn identity_ttl(&self) -> Duration {
        Duration::from_secs(self.identity_ttl_secs)
    }

    pub fn slurm(&self) -> Slurm {
        Slurm {
            scontrol: self.scontrol.clone(),
            squeue: self.squeue.clone(),
            sdiag: self.sdiag.clone(),
            timeout: self.command_timeout(),
        }
    }

    pub fn getent(&self) -> Getent {
        Getent {
            exe: self.getent.clone(),
            timeout: self.command_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use argh::FromArgs;

    use super::*;

    fn args(values: &[&str]) -> Args {
        Args::from_args(&["slurmstate"], values).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.live_ttl(), Duration::from_secs(2));
        assert_eq!(config.identity_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.partition_order[0], "30mins");
    }

    #[test]
    fn test_groups_are_required() {
        assert!(Config::default().validate().is_err());
        assert!(Config::load(&args(&["partitions"])).is_err());

        let config = Config {
            groups: vec![" ".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_line_overrides() {
        let config = Config::load(&args(&[
            "-g",
            "xusers",
            "-g",
            "zusers",
            "--exclude-node",
            "z010",
            "--squeue",
            "/opt/slurm/bin/squeue",
            "--timeout",
            "3",
            "--identity-override",
            "U07BESQTQM6=jdoe",
            "users",
        ]))
        .unwrap();

        assert_eq!(config.groups, ["xusers", "zusers"]);
        assert_eq!(config.excluded_nodes, ["z010"]);
        assert_eq!(config.squeue, "/opt/slurm/bin/squeue");
        assert_eq!(config.scontrol, "scontrol");
        assert_eq!(config.slurm().timeout, Duration::from_secs(3));
        assert_eq!(config.identity_overrides["U07BESQTQM6"], "jdoe");
    }

    #[test]
    fn test_invalid_override() {
        let result = Config::load(&args(&["-g", "xusers", "--identity-override", "jdoe", "users"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("slurmstate-{}.json", std::process::id()));
        fs::write(
            &path,
            r#"{"groups": ["xusers"], "live_ttl_secs": 5, "excluded_nodes": ["z010", "z011"]}"#,
        )
        .unwrap();

        let config = Config::load(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--exclude-node",
            "z012",
            "stats",
        ]))
        .unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.groups, ["xusers"]);
        assert_eq!(config.live_ttl(), Duration::from_secs(5));
        assert_eq!(config.excluded_nodes, ["z010", "z011", "z012"]);
        assert_eq!(config.getent, "getent");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"gruops": ["xusers"]}"#);
        assert!(result.is_err());
    }
}

use std::path::PathBuf;

use argh::FromArgs;

/// Reports the state of a Slurm cluster as JSON
#[derive(FromArgs, Debug)]
pub struct Args {
    /// JSON configuration file; command-line options take precedence
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// group whose members are resolved to cluster users; may be repeated
    #[argh(option, short = 'g')]
    pub group: Vec<String>,

    /// node excluded from partition summaries; may be repeated
    #[argh(option)]
    pub exclude_node: Vec<String>,

    /// chat user mapped directly to a cluster user, as CHAT_ID=USERNAME; may be repeated
    #[argh(option)]
    pub identity_override: Vec<String>,

    /// location of `scontrol` executable
    #[argh(option)]
    pub scontrol: Option<String>,

    /// location of `squeue` executable
    #[argh(option)]
    pub squeue: Option<String>,

    /// location of `sdiag` executable
    #[argh(option)]
    pub sdiag: Option<String>,

    /// location of `getent` executable
    #[argh(option)]
    pub getent: Option<String>,

    /// timeout in seconds for each external command
    #[argh(option)]
    pub timeout: Option<u64>,

    /// log level used unless RUST_LOG is set
    #[argh(option, default = "\"warn\".to_string()")]
    pub log_level: String,

    /// print version information
    #[argh(switch, short = 'v')]
    pub version: bool,

    #[argh(subcommand)]
    pub command: Option<Command>,
}

#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand)]
pub enum Command {
    Partitions(PartitionsArgs),
    Jobs(JobsArgs),
    Stats(StatsArgs),
    Users(UsersArgs),
    Check(CheckArgs),
}

/// Show resources per partition (default)
#[derive(FromArgs, Debug, Default, PartialEq)]
#[argh(subcommand, name = "partitions")]
pub struct PartitionsArgs {
    /// show utilization percentages rather than available resources
    #[argh(switch, short = 'u')]
    pub utilization: bool,
}

/// Show the job queue
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "jobs")]
pub struct JobsArgs {
    /// only show jobs of the user with this exact display name
    #[argh(option)]
    pub user: Option<String>,

    /// only show jobs of the user mapped to this chat ID
    #[argh(option)]
    pub chat_id: Option<String>,
}

/// Show scheduler statistics
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "stats")]
pub struct StatsArgs {}

/// Show cluster users resolved from the configured groups
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "users")]
pub struct UsersArgs {}

/// Check that the scheduler and the user database can be queried
#[derive(FromArgs, Debug, PartialEq)]
#[argh(subcommand, name = "check")]
pub struct CheckArgs {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(values: &[&str]) -> Args {
        Args::from_args(&["slurmstate"], values).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);

        assert_eq!(args.log_level, "warn");
        assert!(args.group.is_empty());
        assert_eq!(args.command, None);
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(
            parse(&["partitions", "-u"]).command,
            Some(Command::Partitions(PartitionsArgs { utilization: true }))
        );
        assert_eq!(
            parse(&["jobs", "--user", "Jane Doe"]).command,
            Some(Command::Jobs(JobsArgs {
                user: Some("Jane Doe".into()),
                chat_id: None,
            }))
        );
    }
}

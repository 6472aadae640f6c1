use color_eyre::eyre::{bail, Context};
use color_eyre::Result;
use serde::Serialize;

use slurmstate::args::{Args, Command, PartitionsArgs};
use slurmstate::config::Config;
use slurmstate::logging;
use slurmstate::partitions::DisplayMode;
use slurmstate::ClusterState;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args: Args = argh::from_env();
    if args.version {
        println!("slurmstate v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    logging::init(&args.log_level)?;
    let config = Config::load(&args)?;
    let state = ClusterState::from_config(&config);

    match args
        .command
        .unwrap_or(Command::Partitions(PartitionsArgs::default()))
    {
        Command::Partitions(cmd) => {
            let mode = if cmd.utilization {
                DisplayMode::Utilization
            } else {
                DisplayMode::Availability
            };

            print_json(&*state.partition_summaries(mode))
        }
        Command::Jobs(cmd) => {
            if cmd.user.is_none() && cmd.chat_id.is_none() {
                return print_json(&state.job_queue(None));
            }

            match state.jobs_for(cmd.chat_id.as_deref(), cmd.user.as_deref()) {
                Some(jobs) => print_json(&jobs),
                None => bail!(
                    "no cluster user matches chat ID {:?} or display name {:?}",
                    cmd.chat_id,
                    cmd.user
                ),
            }
        }
        Command::Stats(_) => print_json(&*state.statistics()),
        Command::Users(_) => print_json(&*state.resolve_identities()),
        Command::Check(_) => check(&state),
    }
}

fn check<S, I>(state: &ClusterState<S, I>) -> Result<()>
where
    S: slurmstate::slurm::Scheduler,
    I: slurmstate::identity::IdentitySource,
{
    let partitions = state.partition_summaries(DisplayMode::Availability).len();
    let jobs = state.job_queue(None).len();
    let statistics = state.statistics().values.len();
    let users = state.resolve_identities().len();

    print_json(&serde_json::json!({
        "partitions": partitions,
        "jobs": jobs,
        "statistics": statistics,
        "users": users,
    }))?;

    if partitions == 0 {
        bail!("failed to query nodes from Slurm; see log for details");
    } else if users == 0 {
        bail!("no users found in the configured groups; see log for details");
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).wrap_err("failed to serialize output")?;
    println!("{}", text);

    Ok(())
}

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::eyre::{bail, eyre, Context};
use color_eyre::Result;

/// Interval at which a running child is polled for completion
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `exe` with `args` and returns its stdout.
///
/// The child is killed if it has not exited within `timeout`; this and a
/// non-zero exit status are both reported as errors.
pub fn run(exe: &str, args: &[&str], timeout: Duration) -> Result<Vec<u8>> {
    let mut child = Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .wrap_err_with(|| format!("failed to execute {:?}", exe))?;

    // Pipes are drained on separate threads, since a child blocked on a full
    // pipe would otherwise never exit
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child
            .try_wait()
            .wrap_err_with(|| format!("failed to wait for {:?}", exe))?
        {
            break status;
        }

        if Instant::now() >= deadline {
            // The child may have exited between the two calls
            let _ = child.kill();
            let _ = child.wait();
            bail!("{:?} did not finish within {:?}", exe, timeout);
        }

        thread::sleep(POLL_INTERVAL);
    };

    let stdout = join(stdout).wrap_err_with(|| format!("reading stdout of {:?}", exe))?;
    let stderr = join(stderr).unwrap_or_default();

    if !status.success() {
        bail!(
            "{:?} {} failed with {}: {}",
            exe,
            args.join(" "),
            status,
            String::from_utf8_lossy(&stderr).trim()
        );
    }

    Ok(stdout)
}

fn drain<R>(pipe: Option<R>) -> Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            pipe.read_to_end(&mut buffer)?;
            Ok(buffer)
        })
    })
}

fn join(handle: Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| eyre!("reader thread panicked"))?
            .wrap_err("reading pipe"),
        None => Ok(Vec::new()),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_run_returns_stdout() {
        let output = run("sh", &["-c", "printf 'a|b\\n'"], TIMEOUT).unwrap();
        assert_eq!(output, b"a|b\n");
    }

    #[test]
    fn test_run_reports_failure() {
        let error = run("sh", &["-c", "echo oops >&2; exit 3"], TIMEOUT).unwrap_err();
        assert!(format!("{:?}", error).contains("oops"));
    }

    #[test]
    fn test_run_missing_executable() {
        assert!(run("/nonexistent/slurmstate-test", &[], TIMEOUT).is_err());
    }

    #[test]
    fn test_run_times_out() {
        let started = Instant::now();
        let error = run("sleep", &["5"], Duration::from_millis(100)).unwrap_err();

        assert!(error.to_string().contains("did not finish"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

use color_eyre::eyre::Context;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

/// Installs a subscriber logging to stderr, unless one has already been set.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init(default_level: &str) -> Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .wrap_err_with(|| format!("invalid log level {:?}", default_level))?,
    };

    // Fails only if another subscriber was installed concurrently
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug").unwrap();
        init("info").unwrap();
        assert!(tracing::dispatcher::has_been_set());
    }
}

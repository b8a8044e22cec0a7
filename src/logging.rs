use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_directive` (for example
/// `"nuget_remediator=info"`) is used.
///
/// # Errors
///
/// Returns [`ConfigError::Logging`] if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> Result<(), ConfigError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        // The first call may lose a race with another test's subscriber.
        let _ = init_tracing("info");
        assert!(matches!(init_tracing("debug"), Err(ConfigError::Logging(_))));
    }
}

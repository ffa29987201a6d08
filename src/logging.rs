use crate::error::{IndexError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global tracing subscriber filtered by `level`
/// (an `EnvFilter` directive such as `"info"` or `"sable::tree=trace"`).
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| IndexError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .try_init()
        .map_err(|_| IndexError::InvalidArgument("logging already initialized".into()))
}

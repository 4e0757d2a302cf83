use anyhow::Result;
use std::ffi::OsString;

use crate::cli::{commands, settings::Settings, telemetry};

/// Start the CLI from the process arguments.
///
/// # Errors
/// Returns an error if telemetry cannot be installed or the settings are invalid.
pub fn start() -> Result<Settings> {
    start_from(std::env::args_os())
}

/// Parse `args`, install telemetry and return the typed settings.
///
/// # Errors
/// Returns an error if parsing fails, telemetry cannot be installed or the
/// settings are invalid.
pub fn start_from<I, T>(args: I) -> Result<Settings>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = commands::new().try_get_matches_from(args)?;

    let verbosity_level = telemetry::verbosity_level(
        matches.get_one::<u8>("verbosity").copied().unwrap_or(0),
    );

    let settings = Settings::from_matches(&matches)?;

    telemetry::init(Some(verbosity_level), settings.log_json)?;

    tracing::info!(
        dsn = %settings.store.redacted_dsn(),
        max_connections = settings.store.max_connections,
        issuer = %settings.token.issuer,
        "settings loaded"
    );

    Ok(settings)
}

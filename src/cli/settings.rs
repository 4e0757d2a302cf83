use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

use crate::{
    monitor::{MonitorSettings, DEFAULT_INTERVAL},
    store::{StoreSettings, DEFAULT_MAX_CONNECTIONS, DEFAULT_OPERATION_TIMEOUT},
    token::{TokenSettings, DEFAULT_AUDIENCE, DEFAULT_ISSUER, DEFAULT_LIFETIME},
};

/// Typed runtime configuration assembled from flags and `ACCOUNTD_*` variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub store: StoreSettings,
    pub token: TokenSettings,
    pub monitor: MonitorSettings,
    pub log_json: bool,
}

impl Settings {
    /// # Errors
    /// Returns an error if a required argument is missing or the DSN is not a
    /// `postgres://` URL.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let dsn = matches
            .get_one::<String>("dsn")
            .cloned()
            .context("missing required argument: --dsn")?;
        let parsed = Url::parse(&dsn).context("invalid ACCOUNTD_DSN")?;
        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(anyhow!(
                "unsupported DSN scheme '{}', expected postgres",
                parsed.scheme()
            ));
        }

        let secret = matches
            .get_one::<String>("jwt-secret")
            .cloned()
            .filter(|secret| !secret.is_empty())
            .context("missing required argument: --jwt-secret")?;

        let max_connections = matches
            .get_one::<u32>("max-connections")
            .copied()
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let operation_timeout = matches
            .get_one::<u64>("store-timeout")
            .copied()
            .map_or(DEFAULT_OPERATION_TIMEOUT, Duration::from_millis);
        let store = StoreSettings::new(SecretString::from(dsn))
            .with_max_connections(max_connections)
            .with_operation_timeout(operation_timeout);

        let lifetime = matches
            .get_one::<u64>("jwt-ttl")
            .copied()
            .map_or(DEFAULT_LIFETIME, Duration::from_secs);
        let mut token = TokenSettings::new(SecretString::from(secret)).with_lifetime(lifetime);
        if let Some(issuer) = matches.get_one::<String>("jwt-issuer") {
            token = token.with_issuer(issuer.as_str());
        }
        if let Some(audience) = matches.get_one::<String>("jwt-audience") {
            token = token.with_audience(audience.as_str());
        }

        let monitor = MonitorSettings {
            interval: matches
                .get_one::<u64>("monitor-interval")
                .copied()
                .map_or(DEFAULT_INTERVAL, Duration::from_secs),
        };

        Ok(Self {
            store,
            token,
            monitor,
            log_json: matches.get_flag("log-json"),
        })
    }
}

//! Static health payload: package name, version and an `ok` status.

use serde::{Deserialize, Serialize};

use crate::envelope::ApiResponse;

const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub name: String,
    pub version: String,
    pub status: String,
}

impl Health {
    /// Health of the running build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: STATUS_OK.to_string(),
        }
    }
}

/// `200 OK` envelope carrying [`Health::current`].
#[must_use]
pub fn health() -> ApiResponse<Health> {
    ApiResponse::ok(Health::current())
}

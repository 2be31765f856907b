//! Connection settings for the remote client.
//!
//! Both types derive `Deserialize` so a host application can keep them in its
//! own configuration file. The library itself never reads configuration.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Query engine login, sent verbatim with every request.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Agresso client (company) id.
    pub client: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client: client.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client", &self.client)
            .finish()
    }
}

/// Where the query engine lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    /// Full service URL, e.g. `https://host/agresso/service.svc`.
    pub service_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl EndpointConfig {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

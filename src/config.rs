use std::fmt;
use std::time::Duration;

use crate::cli::Cli;
use crate::link::{BASE_DELAY, ESCALATED_DELAY, STALL_TIMEOUT};

/// Long-lived device credentials, loaded once at startup and immutable for
/// the process lifetime.
#[derive(Clone)]
pub struct Credentials {
    /// WebSocket address of the control server
    pub server_address: String,
    /// Key identifying this device to the server
    pub api_key: String,
    /// Password for the token exchange
    pub password: String,
    /// HTTP endpoint minting access tokens
    pub auth_endpoint: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server_address", &self.server_address)
            .field("api_key", &self.api_key)
            .field("password", &"<redacted>")
            .field("auth_endpoint", &self.auth_endpoint)
            .finish()
    }
}

/// Configuration for the uplink. Timing fields default to the production
/// values; tests construct this directly with compressed intervals.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub credentials: Credentials,
    /// Cap on a single token request
    pub auth_timeout: Duration,
    /// Reconnect delay while the failure streak is short
    pub reconnect_base: Duration,
    /// Reconnect delay once the streak escalates
    pub reconnect_escalated: Duration,
    /// Window without a keepalive probe before the link is presumed dead
    pub stall_timeout: Duration,
}

impl From<Cli> for LinkConfig {
    fn from(cli: Cli) -> Self {
        Self {
            credentials: Credentials {
                server_address: cli.server_address,
                api_key: cli.api_key,
                password: cli.password,
                auth_endpoint: cli.auth_endpoint,
            },
            auth_timeout: cli.auth_timeout,
            reconnect_base: BASE_DELAY,
            reconnect_escalated: ESCALATED_DELAY,
            stall_timeout: STALL_TIMEOUT,
        }
    }
}

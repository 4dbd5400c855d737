use std::time::Duration;

/// Live API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret shared with the identity service that issues bearer tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim. Not checked when unset.
    pub jwt_issuer: Option<String>,
    /// Expected `aud` claim. Not checked when unset.
    pub jwt_audience: Option<String>,
    /// Base URL of the project service used for membership checks.
    /// Falls back to in-memory membership when unset.
    pub membership_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// How often the gateway pings each connection.
    pub keepalive_interval: Duration,
    /// Connections silent for longer than this are closed.
    pub client_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            jwt_issuer: optional_var("JWT_ISSUER"),
            jwt_audience: optional_var("JWT_AUDIENCE"),
            membership_url: optional_var("MEMBERSHIP_URL"),
            port: parsed_var("PORT").unwrap_or(4003),
            outbound_buffer: parsed_var("OUTBOUND_BUFFER").unwrap_or(256),
            keepalive_interval: Duration::from_secs(
                parsed_var("KEEPALIVE_INTERVAL_SECS").unwrap_or(15),
            ),
            client_timeout: Duration::from_secs(parsed_var("CLIENT_TIMEOUT_SECS").unwrap_or(30)),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

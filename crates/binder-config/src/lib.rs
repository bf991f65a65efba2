//! Shared configuration for the binder daemon.
//!
//! Configuration is layered by [`ortho_config`]: built-in defaults, then
//! configuration files, then `BINDER_*` environment variables, then command
//! line flags. The resulting [`Config`] carries the listening endpoint, the
//! telemetry settings, and the session store limits consumed by `binderd`.

mod defaults;
mod logging;
mod socket;

use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_LOG_FILTER, DEFAULT_MAX_SESSIONS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_TCP_PORT, default_call_timeout_secs, default_log_filter,
    default_log_filter_string, default_log_format, default_max_sessions, default_poll_interval_ms,
    default_session_timeout_secs, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "BINDER")]
pub struct Config {
    /// Endpoint the daemon listens on.
    #[ortho_config(default = default_socket_endpoint())]
    #[serde(default = "default_socket_endpoint")]
    pub listen: SocketEndpoint,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Seconds a session survives without renewal.
    #[ortho_config(default = default_session_timeout_secs())]
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Maximum number of concurrent sessions.
    #[ortho_config(default = default_max_sessions())]
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Upper bound on a single reactor wait, in milliseconds.
    #[ortho_config(default = default_poll_interval_ms())]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Seconds a verb callback may run; `0` disables the limit.
    #[ortho_config(default = default_call_timeout_secs())]
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Shared secret a client must present to create a session.
    #[serde(default)]
    pub initial_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_socket_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            session_timeout_secs: default_session_timeout_secs(),
            max_sessions: default_max_sessions(),
            poll_interval_ms: default_poll_interval_ms(),
            call_timeout_secs: default_call_timeout_secs(),
            initial_token: None,
        }
    }
}

impl Config {
    /// Loads the configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns the aggregated [`OrthoError`] when any layer fails to parse.
    pub fn load_from_process() -> Result<Self, Arc<OrthoError>> {
        <Self as OrthoConfig>::load()
    }

    /// Endpoint the daemon listens on.
    #[must_use]
    pub const fn listen(&self) -> &SocketEndpoint {
        &self.listen
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for structured logs.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Idle period after which a session expires.
    #[must_use]
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Maximum number of concurrent sessions.
    #[must_use]
    pub const fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Upper bound on a single reactor wait.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest a verb callback may run, when limited.
    #[must_use]
    pub const fn call_timeout(&self) -> Option<Duration> {
        if self.call_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.call_timeout_secs))
        }
    }

    /// Secret required by session creation, when configured.
    #[must_use]
    pub fn initial_token(&self) -> Option<&str> {
        self.initial_token.as_deref().filter(|token| !token.is_empty())
    }
}

//! Built-in defaults shared by the daemon and its tests.

#[cfg(unix)]
use std::env;

#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 1234;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Seconds a session survives without being renewed.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 3600;

/// Number of sessions the registry holds at once.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Upper bound on a single reactor wait, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Seconds a verb callback may run before its reply is replaced by `aborted`.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 15;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default session timeout in seconds.
#[must_use]
pub const fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

/// Default session capacity.
#[must_use]
pub const fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

/// Default reactor wake-up interval in milliseconds.
#[must_use]
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default per-call time limit in seconds.
#[must_use]
pub const fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

/// Computes the default listening endpoint for the daemon.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let (mut base, apply_namespace) = match runtime_base_directory() {
        Some(dir) => (dir, false),
        None => (fallback_base_directory(), true),
    };

    base.push("binder");
    if apply_namespace {
        base.push(user_namespace());
    }

    SocketEndpoint::unix(base.join("binderd.sock"))
}

#[cfg(unix)]
fn runtime_base_directory() -> Option<Utf8PathBuf> {
    runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(unix)]
fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}

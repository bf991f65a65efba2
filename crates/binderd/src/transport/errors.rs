//! Failures raised while opening the binder's listening socket.

use std::io;

use binder_reactor::ReactorError;
use thiserror::Error;

/// Why the configured endpoint could not be served.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The TCP host did not resolve to any address.
    #[error("cannot resolve {host}:{port}")]
    Unresolved {
        host: String,
        port: u16,
        #[source]
        source: Option<io::Error>,
    },
    /// The OS refused to bind the endpoint.
    #[error("cannot bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// The bound socket could not be made non-blocking.
    #[error("cannot make the listener non-blocking: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    /// Another binder is accepting on the socket path.
    #[error("{path} is served by a running binder")]
    SocketInUse { path: String },
    /// The socket path is taken by something other than a socket.
    #[error("{path} exists and is not a socket")]
    NotASocket { path: String },
    /// A leftover socket file could not be inspected or removed.
    #[error("cannot replace leftover socket {path}: {source}")]
    StaleSocket {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The reactor refused to watch the listening socket.
    #[error("cannot watch the listening socket: {source}")]
    Register {
        #[source]
        source: ReactorError,
    },
}

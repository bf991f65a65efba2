//! Non-blocking listener for the binder's socket endpoint.

use std::fs;
use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use tracing::warn;

use binder_config::SocketEndpoint;

use super::{ConnectionStream, LISTENER_TARGET, ListenerError};

/// Listener bound to a socket endpoint in non-blocking mode.
///
/// Dropping a Unix listener removes its socket file.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds `endpoint`, replacing a stale Unix socket file if present.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when resolution or binding fails, when a
    /// live server already owns the Unix socket, or when the socket cannot be
    /// switched to non-blocking mode.
    pub fn bind(endpoint: &SocketEndpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            SocketEndpoint::Unix { path } => ListenerKind::Unix(bind_unix(path.as_std_path())?),
        };
        let bound = Self {
            endpoint: endpoint.clone(),
            listener,
        };
        let nonblocking = match &bound.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        };
        nonblocking.map_err(|source| ListenerError::NonBlocking { source })?;
        Ok(bound)
    }

    /// Endpoint the listener was bound to.
    #[must_use]
    pub const fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }

    /// Bound TCP address, for endpoints using an ephemeral port.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            ListenerKind::Unix(_) => None,
        }
    }

    /// Accepts one pending connection as a non-blocking stream.
    ///
    /// Returns `Ok(None)` when no connection is pending.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised by `accept` or by switching the accepted
    /// stream to non-blocking mode.
    pub fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        let accepted = match &self.listener {
            ListenerKind::Tcp(tcp) => tcp.accept().map(|(stream, _)| ConnectionStream::Tcp(stream)),
            ListenerKind::Unix(unix) => unix
                .accept()
                .map(|(stream, _)| ConnectionStream::Unix(stream)),
        };
        match accepted {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                Ok(Some(stream))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }
}

impl AsRawFd for SocketListener {
    fn as_raw_fd(&self) -> RawFd {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.as_raw_fd(),
            ListenerKind::Unix(listener) => listener.as_raw_fd(),
        }
    }
}

impl Drop for SocketListener {
    fn drop(&mut self) {
        cleanup_unix_socket(&self.endpoint);
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let unresolved = |source| ListenerError::Unresolved {
        host: host.to_owned(),
        port,
        source,
    };
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|error| unresolved(Some(error)))?
        .next()
        .ok_or_else(|| unresolved(None))?;
    TcpListener::bind(addr).map_err(|source| ListenerError::Bind {
        endpoint: addr.to_string(),
        source,
    })
}

fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    let display = || path.display().to_string();
    let stale = |source| ListenerError::StaleSocket {
        path: display(),
        source,
    };
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(stale)?;
        if !metadata.file_type().is_socket() {
            return Err(ListenerError::NotASocket { path: display() });
        }
        match UnixStream::connect(path) {
            Ok(_live) => return Err(ListenerError::SocketInUse { path: display() }),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                ) =>
            {
                fs::remove_file(path).map_err(stale)?;
            }
            Err(source) => return Err(stale(source)),
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::Bind {
        endpoint: display(),
        source,
    })
}

fn cleanup_unix_socket(endpoint: &SocketEndpoint) {
    let Some(path) = endpoint.unix_path() else {
        return;
    };
    if let Err(error) = fs::remove_file(path.as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %error,
            path = %path,
            "failed to remove unix socket file"
        );
    }
}

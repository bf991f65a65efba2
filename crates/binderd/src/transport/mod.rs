//! Socket transport for binder clients.
//!
//! The listening socket and every accepted connection are registered with the
//! daemon's [`Reactor`]; all reads, dispatches, and writes happen on the
//! thread driving [`Reactor::wait`].

mod connection;
mod errors;
mod listener;

use std::os::fd::AsRawFd;
use std::sync::{Arc, Mutex};

use binder_reactor::{Reactor, Watcher};
use tracing::{info, warn};

use crate::dispatch::Dispatcher;

pub(crate) use self::connection::Connection;
pub use self::connection::ConnectionStream;
pub use self::errors::ListenerError;
pub use self::listener::SocketListener;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport::connection");

/// Registers `listener` with `reactor`, accepting connections that dispatch
/// through `dispatcher`.
///
/// The listener is owned by its accept callback and released, removing any
/// Unix socket file, when the returned watcher is closed or the reactor is
/// dropped.
///
/// # Errors
///
/// Returns [`ListenerError::Register`] when the reactor cannot watch the
/// listening socket.
pub fn serve(
    reactor: &Reactor,
    listener: SocketListener,
    dispatcher: Arc<Mutex<Dispatcher>>,
) -> Result<Watcher, ListenerError> {
    let register = |source| ListenerError::Register { source };
    let watcher = reactor.open(listener.as_raw_fd()).map_err(register)?;
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint(),
        "socket listener active"
    );

    let accepting = reactor.on_readable(watcher, move |reactor, _| {
        accept_pending(reactor, &listener, &dispatcher);
    });
    if let Err(source) = accepting {
        reactor.close(watcher).ok();
        return Err(register(source));
    }
    Ok(watcher)
}

/// Accepts until the listener would block.
fn accept_pending(reactor: &Reactor, listener: &SocketListener, dispatcher: &Arc<Mutex<Dispatcher>>) {
    loop {
        match listener.accept() {
            Ok(Some(stream)) => {
                let connection = Connection::new(stream, Arc::clone(dispatcher));
                if let Err(error) = connection.register(reactor) {
                    warn!(target: LISTENER_TARGET, %error, "failed to register connection");
                }
            }
            Ok(None) => break,
            Err(error) => {
                warn!(target: LISTENER_TARGET, %error, "socket accept error");
                break;
            }
        }
    }
}

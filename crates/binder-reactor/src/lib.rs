//! Readiness multiplexer for the binder daemon.
//!
//! The crate exposes one explicit [`Reactor`] per consumer instead of a
//! process-wide poll state. Several independent [`Watcher`]s may subscribe to
//! the same file descriptor; the reactor keeps a single OS registration per
//! descriptor and delivers each readiness bit to the first watcher in open
//! order that has a callback for it.
//!
//! ```no_run
//! use std::os::fd::AsRawFd;
//! use std::os::unix::net::UnixStream;
//! use std::time::Duration;
//!
//! use binder_reactor::Reactor;
//!
//! let (left, _right) = UnixStream::pair()?;
//! let reactor = Reactor::new();
//! let watcher = reactor.open(left.as_raw_fd())?;
//! reactor.on_readable(watcher, |_, _| {})?;
//! reactor.wait(Some(Duration::from_millis(10)))?;
//! reactor.close(watcher)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod interest;
mod poller;
mod reactor;

pub use error::ReactorError;
pub use interest::{Interest, Readiness};
pub use poller::{EpollPoller, PollEvent, Poller};
pub use reactor::{Callback, Reactor, WaitOutcome, Watcher};

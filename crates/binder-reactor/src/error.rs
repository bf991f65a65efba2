//! Errors raised by the reactor.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use thiserror::Error;

use crate::reactor::Watcher;

/// Errors arising from watcher registration or waiting.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// The OS poller instance could not be created.
    #[error("failed to create the OS poller: {source}")]
    Create {
        /// Underlying OS error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The OS rejected a registration or an interest change.
    #[error("failed to register descriptor {fd} with the OS poller: {source}")]
    Register {
        /// Descriptor being registered.
        fd: RawFd,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The watcher handle was already closed or never existed.
    #[error("{watcher} is not open")]
    InvalidWatcher {
        /// Offending handle.
        watcher: Watcher,
    },

    /// `wait` was called before any descriptor was opened.
    #[error("the reactor has never opened a descriptor")]
    Uninitialised,

    /// Waiting for readiness failed for a reason other than an interrupt.
    #[error("waiting for readiness failed: {source}")]
    Wait {
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl ReactorError {
    pub(crate) fn create(source: io::Error) -> Self {
        Self::Create {
            source: Arc::new(source),
        }
    }

    pub(crate) const fn register(fd: RawFd, source: io::Error) -> Self {
        Self::Register { fd, source }
    }

    pub(crate) const fn invalid_watcher(watcher: Watcher) -> Self {
        Self::InvalidWatcher { watcher }
    }
}

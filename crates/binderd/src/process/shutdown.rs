use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use thiserror::Error;
use tracing::debug;

use super::PROCESS_TARGET;

/// Abstraction over shutdown notification mechanisms.
///
/// The serving loop polls [`ShutdownSignal::requested`] between reactor
/// turns, so implementations must not block.
pub trait ShutdownSignal: Send + Sync {
    /// Reports whether shutdown has been requested.
    fn requested(&self) -> bool;
}

impl ShutdownSignal for AtomicBool {
    fn requested(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl<T> ShutdownSignal for Arc<T>
where
    T: ShutdownSignal + ?Sized,
{
    fn requested(&self) -> bool {
        (**self).requested()
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown flag raised by SIGTERM, SIGINT, SIGQUIT, or SIGHUP.
#[derive(Debug, Clone)]
pub struct SystemShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl SystemShutdownSignal {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when a handler cannot be registered.
    pub fn install() -> Result<Self, ShutdownError> {
        let flag = Arc::new(AtomicBool::new(false));
        for signal in [SIGTERM, SIGINT, SIGQUIT, SIGHUP] {
            signal_hook::flag::register(signal, Arc::clone(&flag))
                .map_err(|source| ShutdownError::Install { source })?;
        }
        debug!(target: PROCESS_TARGET, "shutdown signal handlers installed");
        Ok(Self { flag })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn requested(&self) -> bool {
        self.flag.requested()
    }
}

//! Error surface for launching and running the binder process.

use thiserror::Error;

use binder_reactor::ReactorError;

use crate::bootstrap::BootstrapError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or running the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Installing the shutdown handlers failed.
    #[error("failed to install shutdown handling: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The reactor stopped with an error while serving.
    #[error("reactor failed while serving: {source}")]
    Reactor {
        /// Underlying reactor error.
        #[source]
        source: ReactorError,
    },
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ReactorError> for LaunchError {
    fn from(source: ReactorError) -> Self {
        Self::Reactor { source }
    }
}

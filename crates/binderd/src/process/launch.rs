//! Launch sequencing: bootstrap, listen, serve until shutdown.

use std::sync::Arc;

use tracing::info;

use binder_plugins::PluginEntry;

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::token_api::BUILTIN_PLUGINS;

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Runs the binder using the production collaborators and built-in plugins.
///
/// # Errors
///
/// Returns a [`LaunchError`] when signal handlers cannot be installed, when
/// bootstrap fails, or when the reactor fails while serving.
pub fn run_daemon() -> Result<(), LaunchError> {
    let shutdown = SystemShutdownSignal::install()?;
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &shutdown,
        BUILTIN_PLUGINS,
    )
}

/// Runs the binder with explicit collaborators until `shutdown` fires.
///
/// # Errors
///
/// See [`run_daemon`].
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
    plugins: &[PluginEntry],
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter, plugins)?;
    let server = daemon.listen()?;
    let served = server.run_until(shutdown);
    info!(target: PROCESS_TARGET, "serving stopped");
    server.shutdown();
    served.map_err(LaunchError::from)
}

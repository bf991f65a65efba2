//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use binder_config::{Config, SocketEndpoint};
use binder_plugins::PluginError;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after a plugin passes validation.
    fn plugin_registered(&self, prefix: &str, verbs: usize);

    /// Invoked when a plugin descriptor is rejected.
    fn plugin_rejected(&self, error: &PluginError);

    /// Invoked once the listener accepts connections.
    fn listener_ready(&self, endpoint: &SocketEndpoint);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn plugin_registered(&self, prefix: &str, verbs: usize) {
        (**self).plugin_registered(prefix, verbs);
    }

    fn plugin_rejected(&self, error: &PluginError) {
        (**self).plugin_rejected(error);
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        (**self).listener_ready(endpoint);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting binder bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = %config.listen(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            max_sessions = config.max_sessions(),
            session_timeout = ?config.session_timeout(),
            "binder bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "binder bootstrap failed"
        );
    }

    fn plugin_registered(&self, prefix: &str, verbs: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugin_registered",
            prefix,
            verbs,
            "plugin registered"
        );
    }

    fn plugin_rejected(&self, error: &PluginError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "plugin_rejected",
            error = %error,
            "plugin rejected"
        );
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_ready",
            endpoint = %endpoint,
            "accepting connections"
        );
    }
}

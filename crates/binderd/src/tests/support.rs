//! Test doubles shared by the bootstrap and server suites.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use binder_config::{Config, SocketEndpoint};
use binder_plugins::PluginError;

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;

/// Loader that provisions a Unix socket path under a temporary directory.
pub struct TestConfigLoader {
    socket_dir: TempDir,
    session_timeout_secs: u64,
    max_sessions: usize,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            socket_dir: TempDir::new().expect("failed to create temporary directory for socket"),
            session_timeout_secs: 60,
            max_sessions: 4,
        }
    }

    /// Shortens the idle timeout, in seconds.
    #[must_use]
    pub const fn with_session_timeout(mut self, secs: u64) -> Self {
        self.session_timeout_secs = secs;
        self
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_dir.path().join("nested").join("binderd.sock")
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let path = self.socket_path();
        Ok(Config {
            listen: SocketEndpoint::unix(
                path.to_str()
                    .expect("temporary socket path was not valid UTF-8"),
            ),
            session_timeout_secs: self.session_timeout_secs,
            max_sessions: self.max_sessions,
            poll_interval_ms: 20,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unusable endpoint.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("binderd"),
            OsString::from("--listen"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}

/// Health events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    PluginRegistered { prefix: String, verbs: usize },
    PluginRejected(String),
    ListenerReady(String),
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn plugin_registered(&self, prefix: &str, verbs: usize) {
        self.record(HealthEvent::PluginRegistered {
            prefix: prefix.to_owned(),
            verbs,
        });
    }

    fn plugin_rejected(&self, error: &PluginError) {
        self.record(HealthEvent::PluginRejected(error.to_string()));
    }

    fn listener_ready(&self, endpoint: &SocketEndpoint) {
        self.record(HealthEvent::ListenerReady(endpoint.to_string()));
    }
}

mockall::mock! {
    pub Reporter {}

    impl HealthReporter for Reporter {
        fn bootstrap_starting(&self);
        fn bootstrap_succeeded(&self, config: &Config);
        fn bootstrap_failed(&self, error: &BootstrapError);
        fn plugin_registered(&self, prefix: &str, verbs: usize);
        fn plugin_rejected(&self, error: &PluginError);
        fn listener_ready(&self, endpoint: &SocketEndpoint);
    }
}

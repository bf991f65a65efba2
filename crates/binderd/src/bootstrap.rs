//! Daemon bootstrap and the reactor-driven serving loop.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::{debug, info};

use binder_config::{Config, SocketPreparationError};
use binder_plugins::{PluginEntry, PluginError, PluginRegistry};
use binder_reactor::{Reactor, ReactorError, WaitOutcome, Watcher};

use crate::dispatch::Dispatcher;
use crate::health::HealthReporter;
use crate::process::ShutdownSignal;
use crate::session::SessionRegistry;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{self, ListenerError, SocketListener};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's aggregated [`OrthoError`].
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads the process arguments, environment, and config files.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_process()
    }
}

/// Loader returning a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare binder socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// A plugin descriptor was rejected.
    #[error("failed to register plugin: {source}")]
    Plugin {
        /// Validation error for the descriptor.
        #[source]
        source: PluginError,
    },
    /// The listening socket could not be bound or watched.
    #[error("failed to start listener: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// Result of a successful bootstrap: configuration, telemetry, and a
/// dispatcher holding every registered plugin.
pub struct Daemon {
    config: Config,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Dispatcher built during bootstrap.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Binds the configured endpoint and registers it with a fresh reactor.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Listener`] when the endpoint cannot be bound
    /// or watched. The failure is also sent to the health reporter.
    pub fn listen(self) -> Result<Server, BootstrapError> {
        let Self {
            config,
            reporter,
            dispatcher,
            ..
        } = self;
        let fail = |source| {
            let error = BootstrapError::Listener { source };
            reporter.bootstrap_failed(&error);
            error
        };

        let listener = SocketListener::bind(config.listen()).map_err(fail)?;
        let local_addr = listener.local_addr();
        let reactor = Reactor::new();
        let dispatcher = Arc::new(Mutex::new(dispatcher));
        let listener_watcher =
            transport::serve(&reactor, listener, Arc::clone(&dispatcher)).map_err(fail)?;
        reporter.listener_ready(config.listen());

        Ok(Server {
            reactor,
            dispatcher,
            listener: listener_watcher,
            local_addr,
            poll_interval: config.poll_interval(),
        })
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns the first [`BootstrapError`] encountered; every failure is also
/// sent to `reporter`.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    plugins: &[PluginEntry],
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    config
        .listen()
        .prepare_filesystem()
        .map_err(|source| fail(BootstrapError::Socket { source }))?;

    let mut dispatcher =
        Dispatcher::new(PluginRegistry::new(), SessionRegistry::from_config(&config))
            .with_call_limit(config.call_timeout());
    for entry in plugins {
        match dispatcher.register(*entry) {
            Ok(id) => {
                if let Some(plugin) = dispatcher.plugins().plugin(id) {
                    reporter.plugin_registered(plugin.prefix(), plugin.verbs().len());
                }
            }
            Err(source) => {
                reporter.plugin_rejected(&source);
                return Err(fail(BootstrapError::Plugin { source }));
            }
        }
    }

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        telemetry,
        reporter,
        dispatcher,
    })
}

/// A listening binder: the reactor, its dispatcher, and the listener watcher.
pub struct Server {
    reactor: Reactor,
    dispatcher: Arc<Mutex<Dispatcher>>,
    listener: Watcher,
    local_addr: Option<SocketAddr>,
    poll_interval: Duration,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listener", &self.listener)
            .field("local_addr", &self.local_addr)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Bound TCP address, when listening on TCP.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Reactor driving the server.
    #[must_use]
    pub const fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Number of sessions currently held, including expired ones not yet
    /// purged.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sessions()
            .len()
    }

    /// Waits for one readiness event, purging expired sessions when the wait
    /// times out.
    ///
    /// # Errors
    ///
    /// Returns the [`ReactorError`] raised by the wait.
    pub fn turn(&self) -> Result<WaitOutcome, ReactorError> {
        let outcome = self.reactor.wait(Some(self.poll_interval))?;
        if outcome == WaitOutcome::TimedOut {
            let purged = self
                .dispatcher
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .purge_expired();
            if purged > 0 {
                debug!(target: SERVER_TARGET, purged, "idle purge");
            }
        }
        Ok(outcome)
    }

    /// Serves until `shutdown` reports a request.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReactorError`] raised by [`Server::turn`].
    pub fn run_until(&self, shutdown: &dyn ShutdownSignal) -> Result<(), ReactorError> {
        info!(target: SERVER_TARGET, "serving");
        while !shutdown.requested() {
            self.turn()?;
        }
        Ok(())
    }

    /// Stops accepting connections and releases the listener.
    pub fn shutdown(self) {
        if let Err(error) = self.reactor.close(self.listener) {
            debug!(target: SERVER_TARGET, %error, "listener already closed");
        }
        info!(target: SERVER_TARGET, "server stopped");
    }
}

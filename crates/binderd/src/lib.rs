//! The binder daemon.
//!
//! `binderd` exposes plugin verbs to clients over a line-delimited JSON
//! socket protocol. Every socket is watched by a single
//! [`binder_reactor::Reactor`]; each complete call line is routed through the
//! [`Dispatcher`], which resolves `api/verb`, enforces the verb's session
//! [`Requirement`](binder_plugins::Requirement), and invokes the plugin
//! callback with a request bound to the caller's session.
//!
//! Sessions are identified by opaque tokens and carry a level of assurance
//! plus one private context per plugin. They expire after the configured
//! idle timeout; expired sessions release their contexts when they are next
//! looked up or when the registry purges.
//!
//! Bootstrap follows a fixed sequence with a health report at each stage:
//! load configuration, initialise telemetry, prepare the socket filesystem,
//! then register plugins. [`Daemon::listen`] binds the endpoint and returns a
//! [`Server`] whose [`Server::run_until`] drives the reactor.

mod bootstrap;
pub mod clock;
pub mod dispatch;
mod health;
mod process;
pub mod session;
pub mod telemetry;
pub mod token_api;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, Server, StaticConfigLoader, SystemConfigLoader,
    bootstrap_with,
};
pub use dispatch::{Call, Dispatcher, Reply};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use session::{Session, SessionError, SessionRegistry};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;

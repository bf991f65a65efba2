//! Routes calls to plugin verbs under session authorization.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use binder_plugins::{PluginEntry, PluginError, PluginId, PluginRegistry};
use tracing::{debug, error, warn};

use super::DISPATCH_TARGET;
use super::authorize::authorize;
use super::call::Call;
use super::invocation::Invocation;
use super::reply::{Reply, status};
use crate::session::SessionRegistry;

/// Owns the verb table and the session registry.
///
/// Calls are handled one at a time, so callbacks for one session never
/// interleave.
#[derive(Debug)]
pub struct Dispatcher {
    plugins: PluginRegistry,
    sessions: SessionRegistry,
    call_limit: Option<Duration>,
}

impl Dispatcher {
    /// Creates a dispatcher over an existing verb table and session store.
    #[must_use]
    pub const fn new(plugins: PluginRegistry, sessions: SessionRegistry) -> Self {
        Self {
            plugins,
            sessions,
            call_limit: None,
        }
    }

    /// Replies `aborted` to callbacks that run longer than `limit`, measured
    /// on the session registry's clock. `None` disables the limit.
    #[must_use]
    pub const fn with_call_limit(mut self, limit: Option<Duration>) -> Self {
        self.call_limit = limit;
        self
    }

    /// Configured per-call time limit.
    #[must_use]
    pub const fn call_limit(&self) -> Option<Duration> {
        self.call_limit
    }

    /// Registers a plugin entry point.
    ///
    /// # Errors
    ///
    /// Returns the [`PluginError`] raised by descriptor validation.
    pub fn register(&mut self, entry: PluginEntry) -> Result<PluginId, PluginError> {
        self.plugins.register(entry)
    }

    /// Registered plugins.
    #[must_use]
    pub const fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Session store.
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Mutable session store.
    pub const fn sessions_mut(&mut self) -> &mut SessionRegistry {
        &mut self.sessions
    }

    /// Decodes and dispatches one call line.
    pub fn handle_line(&mut self, line: &[u8]) -> Reply {
        match Call::parse(line) {
            Ok(call) => self.dispatch(&call),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "rejected call line");
                Reply::failure(error.status(), Some(error.to_string()))
            }
        }
    }

    /// Authorizes and runs one call, then applies the verb's RENEW and CLOSE
    /// effects whatever the callback's outcome. A callback asking to close
    /// its session is treated like a CLOSE verb.
    ///
    /// CREATE verbs present the initial token in their `token` argument.
    pub fn dispatch(&mut self, call: &Call) -> Reply {
        let (plugin, verb) = match self.plugins.resolve(call.api(), call.verb()) {
            Ok(found) => found,
            Err(error) => {
                debug!(target: DISPATCH_TARGET, %error, "unresolved call");
                return Reply::failure(error.status(), Some(error.to_string()));
            }
        };
        let requirement = verb.requirement();

        let secret = call.argument("token").map(|argument| argument.value);
        let authorization = match authorize(&mut self.sessions, requirement, call.session(), secret)
        {
            Ok(authorization) => authorization,
            Err(error) => {
                debug!(
                    target: DISPATCH_TARGET,
                    api = call.api(),
                    verb = call.verb(),
                    %requirement,
                    %error,
                    "call refused"
                );
                return Reply::failure(error.status(), Some(error.to_string()));
            }
        };

        let started = self.sessions.now();
        let session = authorization
            .token()
            .and_then(|token| self.sessions.lookup(token));
        let mut invocation = Invocation::new(call, plugin.id(), session);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| verb.invoke(&mut invocation)));
        let close_requested = invocation.close_requested();
        let recorded = invocation.into_reply();
        let elapsed = self.sessions.now().saturating_duration_since(started);
        let mut reply = match (outcome, recorded) {
            (Ok(()), _) if self.call_limit.is_some_and(|limit| elapsed > limit) => {
                warn!(
                    target: DISPATCH_TARGET,
                    api = call.api(),
                    verb = call.verb(),
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "callback exceeded its time limit"
                );
                Reply::failure(
                    status::ABORTED,
                    Some(format!("verb '{}' exceeded its time limit", verb.name())),
                )
            }
            (Ok(()), Some(reply)) => reply,
            (Ok(()), None) => {
                warn!(
                    target: DISPATCH_TARGET,
                    api = call.api(),
                    verb = call.verb(),
                    "callback returned without replying"
                );
                Reply::failure(status::NO_REPLY, None)
            }
            (Err(_), _) => {
                error!(
                    target: DISPATCH_TARGET,
                    api = call.api(),
                    verb = call.verb(),
                    "callback panicked"
                );
                Reply::failure(status::ABORTED, Some(format!("verb '{}' aborted", verb.name())))
            }
        };

        if let Some(token) = authorization.token() {
            if requirement.renews() {
                self.sessions.renew(token);
            }
            if requirement.closes() || close_requested {
                self.sessions.close(token);
            } else if authorization.created() {
                reply = reply.with_session(token);
            }
        }

        debug!(
            target: DISPATCH_TARGET,
            api = call.api(),
            verb = call.verb(),
            status = %reply.status,
            "call dispatched"
        );
        reply
    }

    /// Removes expired sessions, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        self.sessions.purge_expired()
    }
}

//! Session registry: tokens, levels of assurance, expiry, and contexts.
//!
//! Sessions are created by CREATE verbs and destroyed by CLOSE verbs or by
//! expiry. Expiry is lazy: an expired session is removed the next time it is
//! looked up, or by [`SessionRegistry::purge_expired`] which the daemon loop
//! runs on idle wake-ups. Removing a session drops its contexts, which
//! releases each of them exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use binder_config::Config;
use binder_plugins::{Context, MAX_LEVEL_OF_ASSURANCE, PluginId, RequestError};

use crate::clock::{Clock, SystemClock};

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Errors raised when a session cannot be created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A live session already uses the token.
    #[error("a session already exists for this token")]
    Exists,

    /// The registry holds its maximum number of sessions.
    #[error("the session limit of {max} has been reached")]
    Full {
        /// Configured capacity.
        max: usize,
    },
}

impl SessionError {
    /// Client-facing failure status.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Exists => "session-exists",
            Self::Full { .. } => "session-limit",
        }
    }
}

/// Server-side state of one client across calls.
#[derive(Debug)]
pub struct Session {
    token: String,
    level: u8,
    created: Instant,
    renewed: Instant,
    contexts: HashMap<PluginId, Context>,
}

impl Session {
    fn new(token: String, now: Instant) -> Self {
        Self {
            token,
            level: 0,
            created: now,
            renewed: now,
            contexts: HashMap::new(),
        }
    }

    /// Token identifying the session.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Current level of assurance.
    #[must_use]
    pub const fn level_of_assurance(&self) -> u8 {
        self.level
    }

    /// Instant the session was created.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created
    }

    /// Instant the session was last renewed.
    #[must_use]
    pub const fn renewed_at(&self) -> Instant {
        self.renewed
    }

    /// Sets the level of assurance.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::LevelOutOfRange`] for levels above 3 and
    /// leaves the level unchanged.
    pub const fn set_level_of_assurance(&mut self, level: u8) -> Result<(), RequestError> {
        if level > MAX_LEVEL_OF_ASSURANCE {
            return Err(RequestError::level_out_of_range(level));
        }
        self.level = level;
        Ok(())
    }

    /// Context installed by `plugin`.
    #[must_use]
    pub fn context(&self, plugin: PluginId) -> Option<&Context> {
        self.contexts.get(&plugin)
    }

    /// Mutable context installed by `plugin`.
    pub fn context_mut(&mut self, plugin: PluginId) -> Option<&mut Context> {
        self.contexts.get_mut(&plugin)
    }

    /// Installs `context` for `plugin`, releasing the previous one first.
    pub fn set_context(&mut self, plugin: PluginId, context: Context) {
        drop(self.contexts.remove(&plugin));
        self.contexts.insert(plugin, context);
    }

    /// Releases the context of `plugin`. Returns whether one existed.
    pub fn clear_context(&mut self, plugin: PluginId) -> bool {
        self.contexts.remove(&plugin).is_some()
    }

    /// Number of plugins holding a context.
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.renewed) > timeout
    }
}

/// Mapping from token to session.
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
    timeout: Duration,
    max_sessions: usize,
    initial_token: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("timeout", &self.timeout)
            .field("max_sessions", &self.max_sessions)
            .field("initial_token", &self.initial_token.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates a registry using the system clock.
    #[must_use]
    pub fn new(timeout: Duration, max_sessions: usize) -> Self {
        Self::with_clock(timeout, max_sessions, Arc::new(SystemClock))
    }

    /// Creates a registry sized from the daemon configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.session_timeout(), config.max_sessions())
            .with_initial_token(config.initial_token().map(str::to_owned))
    }

    /// Creates a registry driven by `clock`.
    #[must_use]
    pub fn with_clock(timeout: Duration, max_sessions: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
            max_sessions,
            initial_token: None,
            clock,
        }
    }

    /// Requires session creation to present `token`; `None` lifts the
    /// requirement.
    #[must_use]
    pub fn with_initial_token(mut self, token: Option<String>) -> Self {
        self.initial_token = token;
        self
    }

    /// Whether `presented` satisfies the initial token requirement.
    #[must_use]
    pub fn admits_initial_token(&self, presented: Option<&str>) -> bool {
        self.initial_token
            .as_deref()
            .is_none_or(|expected| presented == Some(expected))
    }

    /// Current instant on the registry's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Idle period after which a session expires.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of stored sessions, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` when no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Looks up a live session, removing it first if it has expired.
    pub fn lookup(&mut self, token: &str) -> Option<&mut Session> {
        let now = self.clock.now();
        let expired = self
            .sessions
            .get(token)
            .is_some_and(|session| session.is_expired(now, self.timeout));
        if expired {
            self.remove(token, "expired");
            return None;
        }
        self.sessions.get_mut(token)
    }

    /// Whether a live session exists for `token`.
    pub fn contains(&mut self, token: &str) -> bool {
        self.lookup(token).is_some()
    }

    /// Creates a session at level 0.
    ///
    /// Uses `token` when supplied, otherwise generates a random one. When the
    /// registry is more than half full, expired sessions are purged first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Exists`] when a live session already uses
    /// `token` and [`SessionError::Full`] when the registry is at capacity.
    pub fn create(&mut self, token: Option<&str>) -> Result<&mut Session, SessionError> {
        if let Some(token) = token {
            if self.contains(token) {
                return Err(SessionError::Exists);
            }
        }
        if self.sessions.len() > self.max_sessions / 2 {
            self.purge_expired();
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::Full {
                max: self.max_sessions,
            });
        }

        let token = token.map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
        let now = self.clock.now();
        debug!(target: SESSION_TARGET, sessions = self.sessions.len() + 1, "session created");
        Ok(self
            .sessions
            .entry(token.clone())
            .or_insert_with(|| Session::new(token, now)))
    }

    /// Refreshes the expiry of a live session. Returns whether it existed.
    pub fn renew(&mut self, token: &str) -> bool {
        let now = self.clock.now();
        self.lookup(token).is_some_and(|session| {
            session.renewed = now;
            true
        })
    }

    /// Destroys a session and releases its contexts. Returns whether it
    /// existed.
    pub fn close(&mut self, token: &str) -> bool {
        self.remove(token, "closed")
    }

    /// Removes every expired session, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let timeout = self.timeout;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(now, timeout));
        let purged = before - self.sessions.len();
        if purged > 0 {
            info!(target: SESSION_TARGET, purged, "expired sessions purged");
        }
        purged
    }

    fn remove(&mut self, token: &str, reason: &'static str) -> bool {
        let Some(session) = self.sessions.remove(token) else {
            return false;
        };
        debug!(
            target: SESSION_TARGET,
            reason,
            contexts = session.context_count(),
            "session ended"
        );
        drop(session);
        true
    }
}

//! Built-in `token` API for managing sessions from clients.
//!
//! | verb | requirement | effect |
//! |------|-------------|--------|
//! | `ping` | NONE | answers `pong` |
//! | `create` | CREATE | opens a session and installs a call counter |
//! | `refresh` | RENEW | extends the session |
//! | `check` | CHECK | reports the level of assurance and counter |
//! | `assurance` | CHECK | sets the level of assurance from the `level` argument |
//! | `reset` | CLOSE | ends the session |
//! | `login` | RENEW, LOA == 0 | raises the level of assurance to 1 |
//! | `logout` | CLOSE, LOA >= 1 | ends an authenticated session |
//!
//! When the daemon is configured with an initial token, `create` must carry
//! it as its `token` argument.

use binder_plugins::{
    Context, PluginDescriptor, PluginEntry, Request, Requirement, VerbDescriptor,
};
use serde_json::json;
use tracing::debug;

const TOKEN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::token_api");

/// API prefix of the built-in plugin.
pub const PREFIX: &str = "token";

/// Plugins compiled into the daemon.
pub const BUILTIN_PLUGINS: &[PluginEntry] = &[descriptor];

/// Per-session state of the `token` API.
#[derive(Debug, Default)]
struct TokenState {
    checks: u64,
}

/// Entry point of the built-in `token` plugin.
#[must_use]
pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(PREFIX, "Session management for binder clients")
        .with_verb(VerbDescriptor::new(
            "ping",
            Requirement::NONE,
            ping,
            "Answers pong; reports whether a session is attached",
        ))
        .with_verb(VerbDescriptor::new(
            "create",
            Requirement::CREATE,
            create,
            "Opens a session",
        ))
        .with_verb(VerbDescriptor::new(
            "refresh",
            Requirement::RENEW,
            |request: &mut dyn Request| request.success(None, Some("session renewed".into())),
            "Extends the session expiry",
        ))
        .with_verb(VerbDescriptor::new(
            "check",
            Requirement::CHECK,
            check,
            "Reports the session's level of assurance",
        ))
        .with_verb(VerbDescriptor::new(
            "assurance",
            Requirement::CHECK,
            assurance,
            "Sets the level of assurance from the 'level' argument",
        ))
        .with_verb(VerbDescriptor::new(
            "reset",
            Requirement::CLOSE,
            |request: &mut dyn Request| request.success(None, Some("session closed".into())),
            "Ends the session",
        ))
        .with_verb(VerbDescriptor::new(
            "login",
            Requirement::RENEW | Requirement::loa_exactly(0),
            login,
            "Raises an anonymous session to level 1",
        ))
        .with_verb(VerbDescriptor::new(
            "logout",
            Requirement::CLOSE | Requirement::loa_at_least(1),
            |request: &mut dyn Request| request.success(None, Some("logged out".into())),
            "Ends an authenticated session",
        ))
}

fn ping(request: &mut dyn Request) {
    let attached = request.session_token().is_some();
    request.success(Some(json!({ "session": attached })), Some("pong".into()));
}

fn create(request: &mut dyn Request) {
    let state = Context::owned_with(TokenState::default(), |state: TokenState| {
        debug!(target: TOKEN_TARGET, checks = state.checks, "token state released");
    });
    match request.set_context(state) {
        Ok(()) => request.success(None, Some("session created".into())),
        Err(error) => request.fail("failed", Some(error.to_string())),
    }
}

fn check(request: &mut dyn Request) {
    let checks = request
        .context_mut()
        .and_then(Context::downcast_mut::<TokenState>)
        .map(|state| {
            state.checks += 1;
            state.checks
        });
    let level = request.level_of_assurance();
    request.success(Some(json!({ "loa": level, "checks": checks })), None);
}

fn assurance(request: &mut dyn Request) {
    let Some(level) = request
        .argument("level")
        .and_then(|argument| argument.value.parse::<u8>().ok())
    else {
        request.fail("invalid-level", Some("expected a numeric 'level' argument".into()));
        return;
    };
    match request.set_level_of_assurance(level) {
        Ok(()) => request.success(Some(json!({ "loa": level })), None),
        Err(error) => request.fail("invalid-level", Some(error.to_string())),
    }
}

fn login(request: &mut dyn Request) {
    match request.set_level_of_assurance(1) {
        Ok(()) => request.success(Some(json!({ "loa": 1 })), Some("logged in".into())),
        Err(error) => request.fail("failed", Some(error.to_string())),
    }
}

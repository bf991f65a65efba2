//! Dispatch scenarios covering authorization, lifecycle effects, and callback
//! failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use binder_plugins::{
    Context, PluginDescriptor, PluginRegistry, Request, Requirement, VerbDescriptor,
};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::clock::ManualClock;
use crate::session::SessionRegistry;
use crate::token_api;

const TIMEOUT: Duration = Duration::from_secs(30);
const CALL_LIMIT: Duration = Duration::from_secs(1);

struct Harness {
    clock: Arc<ManualClock>,
    dispatcher: Dispatcher,
    releases: Arc<AtomicUsize>,
}

impl Harness {
    fn call(&mut self, api: &str, verb: &str, session: Option<&str>) -> Reply {
        let call = Call::new(api, verb);
        let call = match session {
            Some(token) => call.with_session(token),
            None => call,
        };
        self.dispatcher.dispatch(&call)
    }

    fn open(&mut self) -> String {
        let reply = self.call("token", "create", None);
        assert!(reply.is_success(), "{reply:?}");
        reply.session.expect("created session token")
    }
}

/// Plugin whose verbs exercise contexts, panics, and missing replies.
fn double(releases: Arc<AtomicUsize>, clock: Arc<ManualClock>) -> PluginDescriptor {
    PluginDescriptor::new("double", "dispatch test double")
        .with_verb(VerbDescriptor::new(
            "store",
            Requirement::CHECK,
            move |request: &mut dyn Request| {
                let releases = Arc::clone(&releases);
                let stored = request.set_context(Context::owned_with("double", move |_| {
                    releases.fetch_add(1, Ordering::SeqCst);
                }));
                match stored {
                    Ok(()) => request.success(None, None),
                    Err(error) => request.fail("failed", Some(error.to_string())),
                }
            },
            "installs a counted context",
        ))
        .with_verb(VerbDescriptor::new(
            "peek",
            Requirement::NONE,
            |request: &mut dyn Request| {
                let value = request
                    .context()
                    .and_then(|context| context.downcast_ref::<&str>())
                    .copied();
                let response = json!({ "context": value });
                request.success(Some(response), None);
            },
            "reads the context without lifecycle effects",
        ))
        .with_verb(VerbDescriptor::new(
            "elevate",
            Requirement::CHECK,
            |request: &mut dyn Request| {
                let level = request
                    .argument("level")
                    .and_then(|argument| argument.value.parse().ok())
                    .unwrap_or(u8::MAX);
                match request.set_level_of_assurance(level) {
                    Ok(()) => request.success(None, None),
                    Err(error) => request.fail("invalid-level", Some(error.to_string())),
                }
            },
            "sets the level of assurance",
        ))
        .with_verb(VerbDescriptor::new(
            "secret",
            Requirement::CHECK | Requirement::loa_at_least(1),
            |request: &mut dyn Request| request.success(Some(json!("hidden")), None),
            "needs an authenticated session",
        ))
        .with_verb(VerbDescriptor::new(
            "explode",
            Requirement::NONE,
            |_request: &mut dyn Request| panic!("double exploded"),
            "panics",
        ))
        .with_verb(VerbDescriptor::new(
            "explode_closing",
            Requirement::CLOSE,
            |_request: &mut dyn Request| panic!("double exploded while closing"),
            "panics with a CLOSE requirement",
        ))
        .with_verb(VerbDescriptor::new(
            "silent",
            Requirement::NONE,
            |_request: &mut dyn Request| {},
            "never replies",
        ))
        .with_verb(VerbDescriptor::new(
            "twice",
            Requirement::NONE,
            |request: &mut dyn Request| {
                request.fail("first", None);
                request.success(None, Some("second".into()));
            },
            "replies twice",
        ))
        .with_verb(VerbDescriptor::new(
            "hangup",
            Requirement::NONE,
            |request: &mut dyn Request| match request.close_session() {
                Ok(()) => request.success(None, Some("bye".into())),
                Err(error) => request.fail("no-session", Some(error.to_string())),
            },
            "ends the caller's session",
        ))
        .with_verb(VerbDescriptor::new(
            "slow",
            Requirement::NONE,
            move |request: &mut dyn Request| {
                let millis = request
                    .argument("millis")
                    .and_then(|argument| argument.value.parse().ok())
                    .unwrap_or(0);
                clock.advance(Duration::from_millis(millis));
                request.success(None, None);
            },
            "takes as long as asked",
        ))
}

fn harness_with_capacity(max_sessions: usize) -> Harness {
    harness_with(max_sessions, None)
}

fn harness_with(max_sessions: usize, initial_token: Option<&str>) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let releases = Arc::new(AtomicUsize::new(0));
    let mut plugins = PluginRegistry::new();
    plugins
        .register(token_api::descriptor)
        .expect("register token api");
    plugins
        .register_descriptor(double(Arc::clone(&releases), Arc::clone(&clock)))
        .expect("register double");
    let sessions = SessionRegistry::with_clock(TIMEOUT, max_sessions, clock.clone())
        .with_initial_token(initial_token.map(str::to_owned));
    Harness {
        clock,
        dispatcher: Dispatcher::new(plugins, sessions).with_call_limit(Some(CALL_LIMIT)),
        releases,
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with_capacity(10)
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[rstest]
#[case::unknown_api("nope", "ping", "unknown-api")]
#[case::unknown_verb("token", "shout", "unknown-verb")]
fn unresolved_calls_fail(
    mut harness: Harness,
    #[case] api: &str,
    #[case] verb: &str,
    #[case] expected: &str,
) {
    assert_eq!(harness.call(api, verb, None).status, expected);
}

#[rstest]
fn names_are_matched_ignoring_case(mut harness: Harness) {
    let reply = harness.call("TOKEN", "Ping", None);
    assert!(reply.is_success());
    assert_eq!(reply.info.as_deref(), Some("pong"));
}

#[rstest]
#[case::not_json(b"{oops".as_slice())]
#[case::missing_api(br#"{"verb":"ping"}"#.as_slice())]
fn malformed_lines_are_bad_requests(mut harness: Harness, #[case] line: &[u8]) {
    let reply = harness.dispatcher.handle_line(line);
    assert_eq!(reply.status, status::BAD_REQUEST);
    assert!(reply.info.is_some());
}

#[rstest]
fn handle_line_dispatches_decoded_calls(mut harness: Harness) {
    let reply = harness
        .dispatcher
        .handle_line(b"{\"api\":\"token\",\"verb\":\"ping\"}\n");
    assert_eq!(reply.response, Some(json!({ "session": false })));
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

#[rstest]
fn create_returns_a_token_and_starts_at_level_zero(mut harness: Harness) {
    let token = harness.open();
    let reply = harness.call("token", "check", Some(&token));
    assert_eq!(reply.response, Some(json!({ "loa": 0, "checks": 1 })));
    assert_eq!(reply.session, None);
}

#[rstest]
fn create_with_a_client_token_uses_it(mut harness: Harness) {
    let reply = harness.call("token", "create", Some("mine"));
    assert_eq!(reply.session.as_deref(), Some("mine"));
    assert!(harness.call("token", "check", Some("mine")).is_success());
}

#[rstest]
fn create_on_a_live_session_is_rejected(mut harness: Harness) {
    let token = harness.open();
    let reply = harness.call("token", "create", Some(&token));
    assert_eq!(reply.status, "session-exists");
    assert_eq!(harness.dispatcher.sessions().len(), 1);
}

#[test]
fn create_beyond_capacity_is_rejected() {
    let mut harness = harness_with_capacity(1);
    harness.open();
    assert_eq!(harness.call("token", "create", None).status, "session-limit");
}

#[test]
fn create_requires_the_initial_token_when_configured() {
    let mut harness = harness_with(4, Some("s3cret"));

    let refused = harness.call("token", "create", None);
    assert_eq!(refused.status, "unauthorized");
    assert_eq!(refused.session, None);
    let wrong = harness
        .dispatcher
        .dispatch(&Call::new("token", "create").with_argument("token", "guess"));
    assert_eq!(wrong.status, "unauthorized");
    assert!(harness.dispatcher.sessions().is_empty());

    let reply = harness
        .dispatcher
        .dispatch(&Call::new("token", "create").with_argument("token", "s3cret"));
    assert!(reply.is_success(), "{reply:?}");
    let token = reply.session.expect("created session token");
    assert!(harness.call("token", "check", Some(&token)).is_success());
}

#[rstest]
#[case::check("check")]
#[case::refresh("refresh")]
#[case::reset("reset")]
#[case::logout("logout")]
fn session_verbs_without_a_session_are_unauthorized(mut harness: Harness, #[case] verb: &str) {
    assert_eq!(harness.call("token", verb, None).status, "unauthorized");
    assert_eq!(
        harness.call("token", verb, Some("ghost")).status,
        "unauthorized"
    );
}

#[rstest]
fn login_raises_assurance_for_protected_verbs(mut harness: Harness) {
    let token = harness.open();
    assert_eq!(
        harness.call("double", "secret", Some(&token)).status,
        "insufficient-assurance"
    );

    assert!(harness.call("token", "login", Some(&token)).is_success());
    let reply = harness.call("double", "secret", Some(&token));
    assert!(reply.is_success());
    assert_eq!(reply.response, Some(json!("hidden")));

    assert_eq!(
        harness.call("token", "login", Some(&token)).status,
        "insufficient-assurance"
    );
}

#[rstest]
fn close_releases_contexts_exactly_once(mut harness: Harness) {
    let token = harness.open();
    assert!(harness.call("double", "store", Some(&token)).is_success());
    assert_eq!(harness.releases.load(Ordering::SeqCst), 0);

    assert!(harness.call("token", "reset", Some(&token)).is_success());
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.call("token", "check", Some(&token)).status,
        "unauthorized"
    );
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
}

#[rstest]
fn callbacks_can_end_their_session(mut harness: Harness) {
    let token = harness.open();
    harness.call("double", "store", Some(&token));

    let reply = harness.call("double", "hangup", Some(&token));
    assert!(reply.is_success(), "{reply:?}");
    assert_eq!(reply.session, None);
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
    assert_eq!(
        harness.call("token", "check", Some(&token)).status,
        "unauthorized"
    );
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
}

#[rstest]
fn ending_a_missing_session_fails(mut harness: Harness) {
    let reply = harness.call("double", "hangup", None);
    assert_eq!(reply.status, "no-session");
    assert!(reply.info.is_some());
}

#[rstest]
fn replacing_a_context_releases_the_old_one(mut harness: Harness) {
    let token = harness.open();
    harness.call("double", "store", Some(&token));
    harness.call("double", "store", Some(&token));
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
}

#[rstest]
fn out_of_range_level_fails_and_keeps_the_old_one(mut harness: Harness) {
    let token = harness.open();
    let reply = harness.dispatcher.dispatch(
        &Call::new("double", "elevate")
            .with_session(token.clone())
            .with_argument("level", "2"),
    );
    assert!(reply.is_success());

    let reply = harness.dispatcher.dispatch(
        &Call::new("double", "elevate")
            .with_session(token.clone())
            .with_argument("level", "4"),
    );
    assert_eq!(reply.status, "invalid-level");
    let check = harness.call("token", "check", Some(&token));
    assert_eq!(check.response, Some(json!({ "loa": 2, "checks": 1 })));
}

#[rstest]
fn none_verbs_see_the_contexts_of_a_live_session(mut harness: Harness) {
    let token = harness.open();
    harness.call("double", "store", Some(&token));

    let reply = harness.call("double", "peek", Some(&token));
    assert_eq!(reply.response, Some(json!({ "context": "double" })));
    let reply = harness.call("double", "peek", None);
    assert_eq!(reply.response, Some(json!({ "context": null })));
}

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

#[rstest]
fn expired_sessions_are_unauthorized_and_released(mut harness: Harness) {
    let token = harness.open();
    harness.call("double", "store", Some(&token));
    harness.clock.advance(TIMEOUT + Duration::from_secs(1));

    assert_eq!(
        harness.call("token", "check", Some(&token)).status,
        "unauthorized"
    );
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
}

#[rstest]
fn refresh_extends_the_session(mut harness: Harness) {
    let token = harness.open();
    harness.clock.advance(Duration::from_secs(20));
    assert!(harness.call("token", "refresh", Some(&token)).is_success());
    harness.clock.advance(Duration::from_secs(20));
    assert!(harness.call("token", "check", Some(&token)).is_success());
}

#[rstest]
fn purge_removes_idle_sessions(mut harness: Harness) {
    harness.open();
    harness.open();
    harness.clock.advance(TIMEOUT * 2);
    assert_eq!(harness.dispatcher.purge_expired(), 2);
    assert!(harness.dispatcher.sessions().is_empty());
}

// ---------------------------------------------------------------------------
// Callback failures
// ---------------------------------------------------------------------------

#[rstest]
fn panicking_callback_reports_aborted(mut harness: Harness) {
    let reply = harness.call("double", "explode", None);
    assert_eq!(reply.status, status::ABORTED);
    assert!(harness.call("token", "ping", None).is_success());
}

#[rstest]
fn close_applies_even_when_the_callback_panics(mut harness: Harness) {
    let token = harness.open();
    harness.call("double", "store", Some(&token));

    let reply = harness.call("double", "explode_closing", Some(&token));
    assert_eq!(reply.status, status::ABORTED);
    assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
    assert!(harness.dispatcher.sessions().is_empty());
}

#[rstest]
fn silent_callback_reports_no_reply(mut harness: Harness) {
    assert_eq!(harness.call("double", "silent", None).status, status::NO_REPLY);
}

#[rstest]
fn only_the_first_reply_counts(mut harness: Harness) {
    let reply = harness.call("double", "twice", None);
    assert_eq!(reply.status, "first");
    assert_eq!(reply.info, None);
}

#[rstest]
#[case::within_the_limit(1_000, status::SUCCESS)]
#[case::over_the_limit(1_001, status::ABORTED)]
fn callbacks_are_held_to_the_call_limit(
    mut harness: Harness,
    #[case] millis: u64,
    #[case] expected: &str,
) {
    let reply = harness
        .dispatcher
        .dispatch(&Call::new("double", "slow").with_argument("millis", millis.to_string()));
    assert_eq!(reply.status, expected);
    assert!(harness.call("token", "ping", None).is_success());
}

#[test]
fn call_limit_can_be_disabled() {
    let Harness { dispatcher, .. } = harness_with_capacity(10);
    let mut dispatcher = dispatcher.with_call_limit(None);
    let reply =
        dispatcher.dispatch(&Call::new("double", "slow").with_argument("millis", "60000"));
    assert!(reply.is_success());
}

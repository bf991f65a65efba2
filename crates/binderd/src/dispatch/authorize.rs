//! Requirement evaluation performed before a verb callback runs.

use binder_plugins::Requirement;
use thiserror::Error;

use super::reply::status;
use crate::session::{SessionError, SessionRegistry};

/// Reasons a call is refused before its callback runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The verb needs a session and none is live for the token.
    #[error("verb requires a live session")]
    Unauthorized,

    /// Session creation did not present the configured initial token.
    #[error("session creation requires the initial token")]
    InitialToken,

    /// The session's level of assurance fails the verb's comparison.
    #[error("level of assurance {level} does not satisfy {requirement}")]
    InsufficientAssurance { level: u8, requirement: Requirement },

    /// Session creation failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl AuthorizationError {
    /// Failure status reported to the client.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Unauthorized | Self::InitialToken => status::UNAUTHORIZED,
            Self::InsufficientAssurance { .. } => status::INSUFFICIENT_ASSURANCE,
            Self::Session(error) => error.status(),
        }
    }
}

/// Session attached to an authorized call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Authorization {
    token: Option<String>,
    created: bool,
}

impl Authorization {
    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) const fn created(&self) -> bool {
        self.created
    }
}

/// Evaluates `requirement` for a call carrying `token`.
///
/// CREATE verbs must present the registry's initial token, when one is
/// configured, as `secret`. They are checked against level 0 before the
/// session exists, so a refused CREATE leaves no session behind. Verbs
/// without session requirements still see a live session when the client
/// names one.
pub(crate) fn authorize(
    sessions: &mut SessionRegistry,
    requirement: Requirement,
    token: Option<&str>,
    secret: Option<&str>,
) -> Result<Authorization, AuthorizationError> {
    if requirement.creates() {
        if !sessions.admits_initial_token(secret) {
            return Err(AuthorizationError::InitialToken);
        }
        if !requirement.admits(0) {
            return Err(AuthorizationError::InsufficientAssurance {
                level: 0,
                requirement,
            });
        }
        let session = sessions.create(token)?;
        return Ok(Authorization {
            token: Some(session.token().to_owned()),
            created: true,
        });
    }

    if !requirement.needs_session() {
        let live = token.filter(|token| sessions.contains(token));
        return Ok(Authorization {
            token: live.map(str::to_owned),
            created: false,
        });
    }

    let token = token.ok_or(AuthorizationError::Unauthorized)?;
    let session = sessions
        .lookup(token)
        .ok_or(AuthorizationError::Unauthorized)?;
    let level = session.level_of_assurance();
    if !requirement.admits(level) {
        return Err(AuthorizationError::InsufficientAssurance { level, requirement });
    }
    Ok(Authorization {
        token: Some(token.to_owned()),
        created: false,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn sessions() -> SessionRegistry {
        let mut sessions = SessionRegistry::new(Duration::from_secs(60), 4);
        sessions.create(Some("live")).expect("create");
        sessions
    }

    #[rstest]
    #[case::check(Requirement::CHECK)]
    #[case::renew(Requirement::RENEW)]
    #[case::close(Requirement::CLOSE)]
    #[case::loa_only(Requirement::loa_at_most(3))]
    fn session_verbs_need_a_live_token(mut sessions: SessionRegistry, #[case] requirement: Requirement) {
        assert_eq!(
            authorize(&mut sessions, requirement, None, None),
            Err(AuthorizationError::Unauthorized)
        );
        assert_eq!(
            authorize(&mut sessions, requirement, Some("ghost"), None),
            Err(AuthorizationError::Unauthorized)
        );
        let granted = authorize(&mut sessions, requirement, Some("live"), None).expect("granted");
        assert_eq!(granted.token(), Some("live"));
        assert!(!granted.created());
    }

    #[rstest]
    fn loa_comparison_uses_the_current_level(mut sessions: SessionRegistry) {
        let requirement = Requirement::CHECK | Requirement::loa_at_least(1);
        let err = authorize(&mut sessions, requirement, Some("live"), None).expect_err("level 0");
        assert_eq!(err.status(), "insufficient-assurance");

        sessions
            .lookup("live")
            .expect("live")
            .set_level_of_assurance(1)
            .expect("raise");
        assert!(authorize(&mut sessions, requirement, Some("live"), None).is_ok());
    }

    #[rstest]
    fn create_reports_the_new_token(mut sessions: SessionRegistry) {
        let granted = authorize(&mut sessions, Requirement::CREATE, Some("fresh"), None).expect("create");
        assert_eq!(granted.token(), Some("fresh"));
        assert!(granted.created());
        assert!(sessions.contains("fresh"));
    }

    #[rstest]
    fn create_over_a_live_session_is_refused(mut sessions: SessionRegistry) {
        let err = authorize(&mut sessions, Requirement::CREATE, Some("live"), None).expect_err("exists");
        assert_eq!(err, AuthorizationError::Session(SessionError::Exists));
        assert_eq!(err.status(), "session-exists");
    }

    #[rstest]
    fn refused_create_leaves_no_session(mut sessions: SessionRegistry) {
        let requirement = Requirement::CREATE | Requirement::loa_at_least(1);
        let err = authorize(&mut sessions, requirement, Some("fresh"), None).expect_err("level 0");
        assert!(matches!(err, AuthorizationError::InsufficientAssurance { level: 0, .. }));
        assert!(!sessions.contains("fresh"));
    }

    #[rstest]
    fn none_verbs_pass_through_live_tokens_only(mut sessions: SessionRegistry) {
        let live = authorize(&mut sessions, Requirement::NONE, Some("live"), None).expect("none");
        assert_eq!(live.token(), Some("live"));
        let stale = authorize(&mut sessions, Requirement::NONE, Some("ghost"), None).expect("none");
        assert_eq!(stale.token(), None);
    }

    #[rstest]
    fn create_requires_the_configured_initial_token() {
        let mut sessions = SessionRegistry::new(Duration::from_secs(60), 4)
            .with_initial_token(Some("s3cret".to_owned()));

        for presented in [None, Some("guess")] {
            let err = authorize(&mut sessions, Requirement::CREATE, Some("fresh"), presented)
                .expect_err("secret missing or wrong");
            assert_eq!(err, AuthorizationError::InitialToken);
            assert_eq!(err.status(), "unauthorized");
        }
        assert!(!sessions.contains("fresh"));

        let granted = authorize(&mut sessions, Requirement::CREATE, Some("fresh"), Some("s3cret"))
            .expect("secret presented");
        assert!(granted.created());
    }

    #[rstest]
    fn initial_token_only_gates_creation(sessions: SessionRegistry) {
        let mut sessions = sessions.with_initial_token(Some("s3cret".to_owned()));
        assert!(authorize(&mut sessions, Requirement::CHECK, Some("live"), None).is_ok());
    }
}

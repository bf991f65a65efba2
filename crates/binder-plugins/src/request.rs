//! The interface a verb callback uses to read its call and answer it.

use serde_json::Value;
use thiserror::Error;

use crate::context::Context;
use crate::requirement::MAX_LEVEL_OF_ASSURANCE;

/// One named argument of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument<'a> {
    /// Argument name.
    pub name: &'a str,
    /// Argument value. For uploaded files this is the stored file path.
    pub value: &'a str,
    /// Whether the argument refers to an uploaded file.
    pub is_file: bool,
}

impl Argument<'_> {
    /// Length of the value in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the value is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Errors returned by session-bound request operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The call is not attached to a live session.
    #[error("the call has no session")]
    NoSession,

    /// The requested level of assurance is outside `0..=3`.
    #[error("level of assurance {level} exceeds the maximum of {max}")]
    LevelOutOfRange {
        /// Requested level.
        level: u8,
        /// Highest accepted level.
        max: u8,
    },
}

impl RequestError {
    /// Builds [`RequestError::LevelOutOfRange`] for `level`.
    #[must_use]
    pub const fn level_out_of_range(level: u8) -> Self {
        Self::LevelOutOfRange {
            level,
            max: MAX_LEVEL_OF_ASSURANCE,
        }
    }
}

/// A call being handled by a verb callback.
///
/// Exactly one of [`Request::success`] or [`Request::fail`] should be called;
/// only the first reply is delivered.
pub trait Request {
    /// Looks up the argument called `name`.
    fn argument(&self, name: &str) -> Option<Argument<'_>>;

    /// All arguments of the call, in no particular order.
    fn arguments(&self) -> Vec<Argument<'_>>;

    /// Token of the session attached to the call, if any.
    fn session_token(&self) -> Option<&str>;

    /// Replies with success, an optional payload, and an optional message.
    fn success(&mut self, response: Option<Value>, info: Option<String>);

    /// Replies with a failure status keyword and an optional message.
    fn fail(&mut self, status: &str, info: Option<String>);

    /// This plugin's context for the attached session.
    fn context(&self) -> Option<&Context>;

    /// Mutable access to this plugin's context for the attached session.
    fn context_mut(&mut self) -> Option<&mut Context>;

    /// Installs `context`, releasing any previous one first.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoSession`] when no session is attached.
    fn set_context(&mut self, context: Context) -> Result<(), RequestError>;

    /// Releases this plugin's context, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoSession`] when no session is attached.
    fn clear_context(&mut self) -> Result<(), RequestError>;

    /// Level of assurance of the attached session.
    fn level_of_assurance(&self) -> Option<u8>;

    /// Sets the level of assurance of the attached session.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::LevelOutOfRange`] for levels above 3, leaving
    /// the session unchanged, and [`RequestError::NoSession`] when no session
    /// is attached.
    fn set_level_of_assurance(&mut self, level: u8) -> Result<(), RequestError>;

    /// Ends the attached session once the callback returns, as a CLOSE
    /// requirement would. The session and its contexts stay usable until
    /// then.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoSession`] when no session is attached.
    fn close_session(&mut self) -> Result<(), RequestError>;
}

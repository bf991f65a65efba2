//! Call decoding for the dispatch loop.
//!
//! A call is one JSON object per line:
//!
//! ```json
//! {"api":"token","verb":"check","session":"…","args":{"level":2},"files":{"upload":"/tmp/f"}}
//! ```
//!
//! `session`, `args` and `files` are optional. Argument values that are not
//! JSON strings are exposed to plugins as their JSON text.

use std::collections::BTreeMap;

use binder_plugins::Argument;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::errors::DispatchError;

/// Longest accepted call line in bytes, excluding the newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct WireCall {
    api: String,
    verb: String,
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CallArgument {
    name: String,
    value: String,
    is_file: bool,
}

impl CallArgument {
    fn as_argument(&self) -> Argument<'_> {
        Argument {
            name: &self.name,
            value: &self.value,
            is_file: self.is_file,
        }
    }
}

/// A decoded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    api: String,
    verb: String,
    session: Option<String>,
    arguments: Vec<CallArgument>,
}

impl Call {
    /// Builds a call without arguments.
    pub fn new(api: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            verb: verb.into(),
            session: None,
            arguments: Vec::new(),
        }
    }

    /// Attaches a session token.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session = Some(token.into());
        self
    }

    /// Adds a plain argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push(CallArgument {
            name: name.into(),
            value: value.into(),
            is_file: false,
        });
        self
    }

    /// Parses a JSONL line into a call.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RequestTooLarge`] for oversized lines,
    /// [`DispatchError::MalformedJsonl`] for empty or invalid JSON, and
    /// [`DispatchError::InvalidStructure`] when `api` or `verb` is blank.
    pub fn parse(line: &[u8]) -> Result<Self, DispatchError> {
        let trimmed = line.trim_ascii_end();
        if trimmed.len() > MAX_LINE_BYTES {
            return Err(DispatchError::request_too_large(
                trimmed.len(),
                MAX_LINE_BYTES,
            ));
        }
        if trimmed.is_empty() {
            return Err(DispatchError::malformed("empty call line"));
        }

        let wire: WireCall =
            serde_json::from_slice(trimmed).map_err(DispatchError::from_json_error)?;
        let call = Self::from(wire);
        call.validate()?;
        Ok(call)
    }

    fn validate(&self) -> Result<(), DispatchError> {
        if self.api.is_empty() {
            return Err(DispatchError::invalid_structure("api field is empty"));
        }
        if self.verb.is_empty() {
            return Err(DispatchError::invalid_structure("verb field is empty"));
        }
        Ok(())
    }

    /// API name, trimmed.
    #[must_use]
    pub fn api(&self) -> &str {
        &self.api
    }

    /// Verb name, trimmed.
    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// Session token supplied by the client, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Looks up an argument by name; plain arguments shadow files.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<Argument<'_>> {
        self.arguments
            .iter()
            .find(|argument| argument.name == name)
            .map(CallArgument::as_argument)
    }

    /// All arguments, plain arguments first.
    #[must_use]
    pub fn arguments(&self) -> Vec<Argument<'_>> {
        self.arguments
            .iter()
            .map(CallArgument::as_argument)
            .collect()
    }
}

impl From<WireCall> for Call {
    fn from(wire: WireCall) -> Self {
        let plain = wire.args.into_iter().map(|(name, value)| CallArgument {
            name,
            value: match value {
                Value::String(text) => text,
                other => other.to_string(),
            },
            is_file: false,
        });
        let files = wire.files.into_iter().map(|(name, path)| CallArgument {
            name,
            value: path,
            is_file: true,
        });
        Self {
            api: wire.api.trim().to_owned(),
            verb: wire.verb.trim().to_owned(),
            session: wire
                .session
                .map(|token| token.trim().to_owned())
                .filter(|token| !token.is_empty()),
            arguments: plain.chain(files).collect(),
        }
    }
}

//! Reply envelope written back to clients.
//!
//! Each reply is one JSON object terminated by a newline. Members that carry
//! no value are omitted from the encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::DispatchError;

/// Status keywords produced by the binder itself.
pub mod status {
    /// The verb completed.
    pub const SUCCESS: &str = "success";
    /// The call line could not be decoded.
    pub const BAD_REQUEST: &str = "bad-request";
    /// The verb needs a session that is absent or expired.
    pub const UNAUTHORIZED: &str = "unauthorized";
    /// The session's level of assurance fails the verb's comparison.
    pub const INSUFFICIENT_ASSURANCE: &str = "insufficient-assurance";
    /// The callback panicked.
    pub const ABORTED: &str = "aborted";
    /// The callback returned without replying.
    pub const NO_REPLY: &str = "no-reply";
    /// The binder failed to encode its own reply.
    pub const INTERNAL_ERROR: &str = "internal-error";
}

/// Outcome of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// `success` or a failure keyword.
    pub status: String,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Token of a session created by the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Reply {
    /// Successful reply.
    #[must_use]
    pub fn success(response: Option<Value>, info: Option<String>) -> Self {
        Self {
            status: status::SUCCESS.to_owned(),
            info,
            response,
            session: None,
        }
    }

    /// Failure reply carrying `status`.
    pub fn failure(status: impl Into<String>, info: Option<String>) -> Self {
        Self {
            status: status.into(),
            info,
            response: None,
            session: None,
        }
    }

    /// Attaches the token of a newly created session.
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>) -> Self {
        self.session = Some(token.into());
        self
    }

    /// Whether the status is `success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }

    /// Encodes the reply as one JSONL line including the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SerializeReply`] if encoding fails.
    pub fn to_line(&self) -> Result<Vec<u8>, DispatchError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn absent_members_are_omitted() {
        let line = Reply::failure(status::UNAUTHORIZED, None)
            .to_line()
            .expect("encode");
        assert_eq!(line, b"{\"status\":\"unauthorized\"}\n");
    }

    #[test]
    fn success_carries_payload_info_and_session() {
        let reply = Reply::success(Some(json!({"loa": 1})), Some("ok".into())).with_session("t1");
        let text = String::from_utf8(reply.to_line().expect("encode")).expect("utf8");
        assert!(text.ends_with('\n'));

        let decoded: Reply = serde_json::from_str(text.trim_end()).expect("decode");
        assert!(decoded.is_success());
        assert_eq!(decoded, reply);
    }
}

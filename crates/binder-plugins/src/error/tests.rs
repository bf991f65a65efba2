//! Unit tests for plugin error types.

use rstest::rstest;

use super::*;

#[test]
fn abi_mismatch_names_both_tags() {
    let error = PluginError::AbiMismatch {
        prefix: "legacy".into(),
        found: 1,
        expected: 123_456_789,
    };
    let message = error.to_string();
    assert!(message.contains("legacy"), "expected prefix in message: {message}");
    assert!(message.contains("123456789"), "expected tag in message: {message}");
}

#[rstest]
#[case::unknown_api(PluginError::UnknownApi { api: "nope".into() }, "unknown-api")]
#[case::unknown_verb(
    PluginError::UnknownVerb { api: "token".into(), verb: "nope".into() },
    "unknown-verb"
)]
#[case::registration(PluginError::NoVerbs { prefix: "empty".into() }, "internal-error")]
fn lookup_errors_map_to_client_statuses(#[case] error: PluginError, #[case] status: &str) {
    assert_eq!(error.status(), status);
}

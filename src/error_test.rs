use super::*;

#[test]
fn message_field_wins() {
    let body = r#"{"message":"Email already taken","statusCode":409}"#;
    assert_eq!(server_message(409, body), "Email already taken");
}

#[test]
fn error_field_is_second_choice() {
    let body = r#"{"error":"bad credentials"}"#;
    assert_eq!(server_message(401, body), "bad credentials");
}

#[test]
fn regex_rescues_unparseable_json() {
    // Trailing garbage defeats the strict parse but not the scan.
    let body = r#"{"message": "Code expired", "details": {unquoted}}"#;
    assert_eq!(server_message(400, body), "Code expired");
}

#[test]
fn raw_body_used_when_no_message_key() {
    assert_eq!(server_message(500, "upstream exploded"), "upstream exploded");
}

#[test]
fn empty_body_falls_back_to_status_default() {
    assert_eq!(server_message(409, ""), default_status_message(409));
    assert_eq!(
        server_message(401, "   "),
        "Authentication failed. Please check your credentials."
    );
}

#[test]
fn json_without_message_falls_back_to_status_default() {
    assert_eq!(
        server_message(409, "{}"),
        "This email is already registered. Please use a different email or try logging in."
    );
    assert_eq!(server_message(500, r#"{"message":"  "}"#), "Server error. Please try again later.");
}

#[test]
fn nested_error_object_is_rescued_by_the_scan() {
    // `error` as an object defeats the typed parse; the scan still finds
    // the inner message.
    let body = r#"{"error":{"message":"Account locked"}}"#;
    assert_eq!(server_message(403, body), "Account locked");
}

#[test]
fn status_defaults_cover_the_known_codes() {
    for status in [400u16, 401, 403, 404, 409, 500] {
        assert_ne!(default_status_message(status), "An error occurred. Please try again.");
    }
    assert_eq!(default_status_message(418), "An error occurred. Please try again.");
}

#[test]
fn display_carries_the_user_message() {
    let err = AuthError::ServerRejected { status: 409, message: "taken".into() };
    assert_eq!(err.to_string(), "taken");
    assert_eq!(err.code(), "E_SERVER_REJECTED");
    assert_eq!(AuthError::Timeout.code(), "E_TIMEOUT");
}

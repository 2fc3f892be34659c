use std::sync::Arc;

use super::*;
use crate::store::MemoryStore;
use crate::transport::testing::{MockSender, Step};
use crate::transport::{SendFailure, Transport};

fn client_with(script: Vec<Step>) -> (AuthClient, Arc<MockSender>, SessionStore) {
    let sender = MockSender::new(script);
    let store = SessionStore::new(Arc::new(MemoryStore::new()));
    let config = AuthConfig::new("https://auth.example.com/api/v1").unwrap();
    let transport = Transport::with_sender(sender.clone(), config.max_attempts, config.backoff_base);
    let client = AuthClient::with_transport(config, store.clone(), transport);
    (client, sender, store)
}

fn register_data() -> RegisterData {
    RegisterData {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "User@Example.com".into(),
        phone: "21655123456".into(),
        birth_date: "1990-01-01".into(),
        role: "user".into(),
        password: "hunter2".into(),
    }
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn login_saves_token_and_refreshes_profile() {
    let (client, sender, store) = client_with(vec![
        Step::ok(200, r#"{"token":"tok","user":{"_id":"7","email":"u@x.com"}}"#),
        Step::ok(200, r#"{"user":{"_id":"7","firstName":"Ada","email":"u@x.com"}}"#),
    ]);
    let outcome = client.login("u@x.com", "pw").await.unwrap();
    assert_eq!(outcome.token.as_deref(), Some("tok"));
    assert_eq!(outcome.profile.as_ref().and_then(|p| p.first_name.as_deref()), Some("Ada"));
    assert_eq!(store.token().await.unwrap().as_deref(), Some("tok"));

    let requests = sender.requests();
    assert_eq!(requests[0].1, "https://auth.example.com/api/v1/auth/login");
    assert_eq!(requests[1].0, "GET");
    assert_eq!(requests[1].1, "https://auth.example.com/api/v1/users/7");
}

#[tokio::test]
async fn login_profile_refresh_failure_keeps_login_profile() {
    let (client, _, _) = client_with(vec![
        Step::ok(200, r#"{"token":"tok","data":{"_id":"7","firstName":"Raw"}}"#),
        Step::Fail(SendFailure::Connect("host unreachable".into())),
    ]);
    let outcome = client.login("u@x.com", "pw").await.unwrap();
    assert_eq!(outcome.profile.as_ref().and_then(|p| p.first_name.as_deref()), Some("Raw"));
}

#[tokio::test]
async fn login_without_token_is_still_success() {
    let (client, sender, store) = client_with(vec![Step::ok(200, r#"{"message":"welcome"}"#)]);
    let outcome = client.login("u@x.com", "pw").await.unwrap();
    assert_eq!(outcome.token, None);
    assert_eq!(store.token().await.unwrap(), None);
    // No id in the response, so no follow-up fetch either.
    assert_eq!(sender.calls(), 1);
}

#[tokio::test]
async fn login_rejection_carries_server_message() {
    let (client, _, _) = client_with(vec![Step::ok(401, r#"{"message":"bad credentials"}"#)]);
    let err = client.login("u@x.com", "pw").await.unwrap_err();
    assert_eq!(err, AuthError::ServerRejected { status: 401, message: "bad credentials".into() });
}

#[tokio::test]
async fn login_rejection_without_body_uses_status_default() {
    let (client, _, _) = client_with(vec![Step::ok(500, "")]);
    let err = client.login("u@x.com", "pw").await.unwrap_err();
    assert_eq!(
        err,
        AuthError::ServerRejected { status: 500, message: "Server error. Please try again later.".into() }
    );
}

#[tokio::test]
async fn login_malformed_2xx_body_is_malformed_response() {
    let (client, _, _) = client_with(vec![Step::ok(200, "<html>oops</html>")]);
    let err = client.login("u@x.com", "pw").await.unwrap_err();
    assert!(matches!(err, AuthError::MalformedResponse(_)));
}

#[tokio::test(start_paused = true)]
async fn login_delayed_past_deadline_is_timeout() {
    let (client, _, _) = client_with(vec![Step::RespondAfter(
        Duration::from_secs(91),
        200,
        r#"{"token":"tok"}"#.into(),
    )]);
    let err = client.login("u@x.com", "pw").await.unwrap_err();
    assert_eq!(err, AuthError::Timeout);
}

#[tokio::test(start_paused = true)]
async fn login_delayed_inside_deadline_succeeds() {
    let (client, _, _) = client_with(vec![Step::RespondAfter(
        Duration::from_secs(89),
        200,
        r#"{"token":"tok"}"#.into(),
    )]);
    assert!(client.login("u@x.com", "pw").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn login_io_exhaustion_surfaces_unknown() {
    let (client, sender, _) = client_with(vec![
        Step::Fail(SendFailure::Io("reset".into())),
        Step::Fail(SendFailure::Io("reset".into())),
        Step::Fail(SendFailure::Io("reset at last".into())),
    ]);
    let err = client.login("u@x.com", "pw").await.unwrap_err();
    assert_eq!(err, AuthError::Unknown("Network error: reset at last".into()));
    assert_eq!(sender.calls(), 3);
}

// =========================================================================
// Registration
// =========================================================================

#[tokio::test]
async fn register_with_token_is_immediately_authenticated() {
    let (client, _, store) = client_with(vec![Step::ok(201, r#"{"accessToken":"fresh"}"#)]);
    let outcome = client.register(&register_data()).await.unwrap();
    assert!(matches!(outcome, RegistrationOutcome::Authenticated(_)));
    assert_eq!(store.token().await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn register_2xx_with_unparseable_body_is_success() {
    let (client, _, _) = client_with(vec![Step::ok(201, "<html>created</html>")]);
    let outcome = client.register(&register_data()).await.unwrap();
    let RegistrationOutcome::VerificationRequired { email, message, .. } = outcome else {
        panic!("expected verification-required outcome");
    };
    assert_eq!(email, "user@example.com");
    assert_eq!(message, "Account created successfully. Please check your email for the verification link.");
}

#[tokio::test]
async fn register_2xx_with_empty_body_is_success() {
    let (client, _, _) = client_with(vec![Step::ok(204, "")]);
    let outcome = client.register(&register_data()).await.unwrap();
    assert!(matches!(outcome, RegistrationOutcome::VerificationRequired { .. }));
}

#[tokio::test]
async fn register_prefers_server_echoed_email() {
    let (client, _, _) = client_with(vec![Step::ok(
        201,
        r#"{"email":"echoed@x.com","user":{"email":"nested@x.com"}}"#,
    )]);
    let outcome = client.register(&register_data()).await.unwrap();
    let RegistrationOutcome::VerificationRequired { email, .. } = outcome else {
        panic!("expected verification-required outcome");
    };
    assert_eq!(email, "echoed@x.com");
}

#[tokio::test]
async fn register_falls_back_to_nested_email_then_submitted() {
    let (client, _, _) = client_with(vec![Step::ok(201, r#"{"user":{"email":"nested@x.com"}}"#)]);
    let RegistrationOutcome::VerificationRequired { email, .. } =
        client.register(&register_data()).await.unwrap()
    else {
        panic!("expected verification-required outcome");
    };
    assert_eq!(email, "nested@x.com");

    let (client, _, _) = client_with(vec![Step::ok(201, r#"{"message":"created"}"#)]);
    let RegistrationOutcome::VerificationRequired { email, .. } =
        client.register(&register_data()).await.unwrap()
    else {
        panic!("expected verification-required outcome");
    };
    assert_eq!(email, "user@example.com");
}

#[tokio::test]
async fn register_blank_field_fails_locally() {
    let (client, sender, _) = client_with(vec![]);
    let mut data = register_data();
    data.phone = "  ".into();
    let err = client.register(&data).await.unwrap_err();
    assert_eq!(err, AuthError::InvalidInput("All fields are required.".into()));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn register_implausible_email_fails_locally() {
    let (client, sender, _) = client_with(vec![]);
    let mut data = register_data();
    data.email = "not-an-address".into();
    let err = client.register(&data).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidInput(_)));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn register_conflict_maps_to_server_rejected() {
    let (client, _, _) = client_with(vec![Step::ok(409, "{}")]);
    let err = client.register(&register_data()).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::ServerRejected {
            status: 409,
            message: "This email is already registered. Please use a different email or try logging in.".into(),
        }
    );
}

// =========================================================================
// Resend verification
// =========================================================================

#[tokio::test]
async fn resend_validates_email_before_any_network() {
    let (client, sender, _) = client_with(vec![]);
    for bad in ["", "   ", "user", "@x.com", "a@b@c"] {
        let err = client.resend_verification(bad).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidInput(_)), "{bad:?} should fail locally");
    }
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn resend_success_passes_message_through() {
    let (client, sender, _) = client_with(vec![Step::ok(200, r#"{"message":"sent again"}"#)]);
    let outcome = client.resend_verification("  User@X.com ").await.unwrap();
    assert_eq!(outcome.message.as_deref(), Some("sent again"));
    assert_eq!(sender.requests()[0].1, "https://auth.example.com/api/v1/auth/resend-verification");
}

// =========================================================================
// Verify email
// =========================================================================

#[tokio::test]
async fn verify_email_uses_hint_and_saves_token() {
    let (client, _, store) = client_with(vec![Step::ok(200, r#"{"token":"verified-tok"}"#)]);
    let outcome = client.verify_email("123456", Some("u@x.com")).await.unwrap();
    assert_eq!(outcome.token.as_deref(), Some("verified-tok"));
    assert_eq!(store.token().await.unwrap().as_deref(), Some("verified-tok"));
}

#[tokio::test]
async fn verify_email_falls_back_to_persisted_pending_email() {
    let (client, sender, store) = client_with(vec![Step::ok(200, "{}")]);
    store.save_pending_verification_email("pend@x.com").await.unwrap();
    client.verify_email("123456", None).await.unwrap();
    assert_eq!(sender.calls(), 1);
}

#[tokio::test]
async fn verify_email_without_any_email_fails_locally() {
    let (client, sender, _) = client_with(vec![]);
    let err = client.verify_email("123456", None).await.unwrap_err();
    assert_eq!(err, AuthError::InvalidInput("Email address not found. Please register again.".into()));
    assert_eq!(sender.calls(), 0);
}

// =========================================================================
// Forgot-password flow
// =========================================================================

#[tokio::test]
async fn verify_reset_code_persists_the_context() {
    let (client, _, store) = client_with(vec![Step::ok(200, r#"{"message":"code ok"}"#)]);
    let (_, context) = client.verify_reset_code("9981", Some("a@b.com")).await.unwrap();
    assert_eq!(context, ForgotPasswordContext { email: "a@b.com".into(), code: "9981".into() });
    assert_eq!(store.forgot_password_context().await.unwrap(), Some(context));
}

#[tokio::test]
async fn verify_reset_code_without_email_fails_locally() {
    let (client, sender, _) = client_with(vec![]);
    let err = client.verify_reset_code("9981", None).await.unwrap_err();
    assert_eq!(
        err,
        AuthError::InvalidInput("Email address not found. Please restart the forgot password flow.".into())
    );
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn reset_password_without_context_fails_locally() {
    let (client, sender, _) = client_with(vec![]);
    let err = client.reset_password(None, "newpw", "newpw").await.unwrap_err();
    assert_eq!(err, AuthError::InvalidInput("Reset context missing. Please request a new code.".into()));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn reset_password_mismatched_confirmation_fails_locally() {
    let (client, sender, _) = client_with(vec![]);
    let err = client.reset_password(None, "newpw", "other").await.unwrap_err();
    assert_eq!(err, AuthError::InvalidInput("Passwords do not match.".into()));
    assert_eq!(sender.calls(), 0);
}

#[tokio::test]
async fn reset_password_uses_persisted_context_and_clears_it() {
    let (client, sender, store) = client_with(vec![Step::ok(200, r#"{"message":"changed"}"#)]);
    let context = ForgotPasswordContext { email: "a@b.com".into(), code: "9981".into() };
    store.save_forgot_password_context(&context).await.unwrap();
    store.save_pending_verification_email("a@b.com").await.unwrap();

    let outcome = client.reset_password(None, "newpw", "newpw").await.unwrap();
    assert_eq!(outcome.message.as_deref(), Some("changed"));
    assert_eq!(store.forgot_password_context().await.unwrap(), None);
    assert_eq!(store.pending_verification_email().await.unwrap(), None);
    assert_eq!(sender.requests()[0].1, "https://auth.example.com/api/v1/auth/reset-password");
}

// =========================================================================
// validate_email
// =========================================================================

#[test]
fn validate_email_normalizes_case_and_whitespace() {
    assert_eq!(validate_email("  USER@Example.com "), Some("user@example.com".to_owned()));
}

#[test]
fn validate_email_rejects_implausible_shapes() {
    assert_eq!(validate_email(""), None);
    assert_eq!(validate_email("user"), None);
    assert_eq!(validate_email("@example.com"), None);
    assert_eq!(validate_email("user@"), None);
    assert_eq!(validate_email("a@b@c"), None);
}

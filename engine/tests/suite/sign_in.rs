use std::sync::Arc;

use serde_json::json;
use warden_engine::{Auth, AuthConfig, Credential, ErrorCode, ErrorKind, OperationKind, User};
use warden_rpc::{Endpoint, Transport, TransportResponse};

use crate::common::{
    START_MS, StubTransport, backend_error, fake_id_token, harness, sign_up_ok,
    verify_password_ok,
};

#[test]
fn password_sign_in_builds_user() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));

    let user = h
        .auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap();

    assert_eq!(user.uid, "uid-1");
    assert_eq!(user.email.as_deref(), Some("a@b.com"));
    assert_eq!(user.display_name, None);
    assert!(!user.is_anonymous);
    assert!(user.has_email_password_credential);
    assert_eq!(user.token_timestamp_ms, START_MS);
    assert_eq!(user.access_token_expires_at_ms, START_MS + 3_600_000);
    assert_eq!(h.auth.current_user(), Some(user));

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].endpoint, Endpoint::VerifyPassword);
    assert!(calls[0].url.ends_with("/verifyPassword?key=test-api-key"));
    assert_eq!(calls[0].body["email"], "a@b.com");
    assert_eq!(calls[0].body["password"], "pw");
    assert_eq!(calls[0].body["returnSecureToken"], true);
}

#[test]
fn backend_rejection_maps_to_code() {
    let h = harness();
    h.transport.respond(
        Endpoint::VerifyPassword,
        backend_error(400, "INVALID_PASSWORD"),
    );

    let err = h
        .auth
        .sign_in_with_email_and_password("a@b.com", "wrong")
        .wait()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendRejected);
    assert_eq!(err.code(), ErrorCode::WrongPassword);
    assert!(h.auth.current_user().is_none());
}

#[test]
fn transport_failure_is_network_error() {
    let h = harness();
    let err = h
        .auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
    assert_eq!(err.code(), ErrorCode::NetworkRequestFailed);
    assert_eq!(h.transport.call_count(), 1);
}

#[test]
fn malformed_success_body_is_internal() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, TransportResponse::new(200, "not json"));
    let err = h
        .auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InternalInconsistency);
}

#[test]
fn anonymous_fast_path_skips_network() {
    let h = harness();
    h.transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-1"));

    let first = h.auth.sign_in_anonymously().wait().unwrap();
    assert!(first.is_anonymous);
    assert!(first.provider_data.is_empty());
    assert_eq!(h.transport.call_count(), 1);

    let again = h.auth.sign_in_anonymously();
    assert_eq!(again.value(), Some(first));
    assert_eq!(h.transport.call_count(), 1);
}

#[test]
fn anonymous_sign_in_replaces_non_anonymous_user() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    h.transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-2"));

    h.auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap();
    let user = h.auth.sign_in_anonymously().wait().unwrap();

    assert_eq!(user.uid, "anon-2");
    assert_eq!(h.transport.calls_to(Endpoint::SignUpNewUser), 1);
    assert_eq!(h.transport.call_count(), 2);
}

#[test]
fn create_user_marks_new_account() {
    let h = harness();
    h.transport.respond(
        Endpoint::SignUpNewUser,
        TransportResponse::ok_json(&json!({
            "localId": "new-1",
            "email": "new@b.com",
            "idToken": "id",
            "refreshToken": "r",
            "expiresIn": "1800"
        })),
    );

    let user = h
        .auth
        .create_user_with_email_and_password("new@b.com", "secret")
        .wait()
        .unwrap();
    assert!(!user.is_anonymous);
    assert!(user.has_email_password_credential);
    assert_eq!(user.metadata.creation_timestamp_ms, START_MS);
    assert_eq!(user.access_token_expires_at_ms, START_MS + 1_800_000);

    let body = &h.transport.calls()[0].body;
    assert_eq!(body["email"], "new@b.com");
    assert_eq!(body["password"], "secret");
}

#[test]
fn custom_token_uid_comes_from_id_token() {
    let h = harness();
    h.transport.respond(
        Endpoint::VerifyCustomToken,
        TransportResponse::ok_json(&json!({
            "idToken": fake_id_token("custom-uid", "custom"),
            "refreshToken": "r",
            "expiresIn": "3600"
        })),
    );

    let user = h.auth.sign_in_with_custom_token("minted").wait().unwrap();
    assert_eq!(user.uid, "custom-uid");
    assert!(user.provider_data.is_empty());
    assert_eq!(h.transport.calls()[0].body["token"], "minted");
}

#[test]
fn federated_credential_uses_verify_assertion() {
    let h = harness();
    h.transport.respond(
        Endpoint::VerifyAssertion,
        TransportResponse::ok_json(&json!({
            "localId": "g-1",
            "providerId": "google.com",
            "email": "g@b.com",
            "screenName": "gee",
            "idToken": "id",
            "refreshToken": "r",
            "isNewUser": true,
            "rawUserInfo": "{\"locale\":\"en\"}"
        })),
    );

    let result = h
        .auth
        .sign_in_and_retrieve_data_with_credential(&Credential::google(Some("gid"), None))
        .wait()
        .unwrap();
    assert_eq!(result.user.uid, "g-1");
    assert_eq!(result.user.provider_data[0].provider_id, "google.com");
    assert_eq!(result.info.provider_id, "google.com");
    assert_eq!(result.info.user_name.as_deref(), Some("gee"));
    assert!(result.info.is_new_user);
    assert_eq!(result.info.profile["locale"], "en");

    let body = &h.transport.calls()[0].body;
    assert_eq!(body["postBody"], "id_token=gid&providerId=google.com");
    assert_eq!(body["requestUri"], "http://localhost");
}

#[test]
fn password_credential_uses_verify_password() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    let user = h
        .auth
        .sign_in_with_credential(&Credential::email_password("a@b.com", "pw"))
        .wait()
        .unwrap();
    assert_eq!(user.uid, "uid-1");
    assert_eq!(h.transport.calls_to(Endpoint::VerifyAssertion), 0);
}

#[test]
fn account_conflict_needs_confirmation() {
    let h = harness();
    h.transport.respond(
        Endpoint::VerifyAssertion,
        TransportResponse::ok_json(&json!({
            "localId": "g-1",
            "needConfirmation": true,
            "idToken": "id"
        })),
    );
    let err = h
        .auth
        .sign_in_with_credential(&Credential::facebook("fb-token"))
        .wait()
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AccountExistsWithDifferentCredentials);
    assert!(h.auth.current_user().is_none());
}

#[test]
fn fetch_providers_and_password_reset() {
    let h = harness();
    h.transport.respond(
        Endpoint::CreateAuthUri,
        TransportResponse::ok_json(&json!({
            "allProviders": ["password", "google.com"],
            "registered": true
        })),
    );
    h.transport.respond(
        Endpoint::GetOobConfirmationCode,
        TransportResponse::ok_json(&json!({ "email": "a@b.com" })),
    );

    let providers = h.auth.fetch_providers_for_email("a@b.com").wait().unwrap();
    assert_eq!(providers.providers, vec!["password", "google.com"]);

    h.auth.send_password_reset_email("a@b.com").wait().unwrap();
    let reset = h
        .transport
        .calls()
        .into_iter()
        .find(|call| call.endpoint == Endpoint::GetOobConfirmationCode)
        .unwrap();
    assert_eq!(reset.body["requestType"], "PASSWORD_RESET");
    assert_eq!(reset.body["email"], "a@b.com");
}

#[test]
fn reload_refreshes_profile() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    h.transport.respond(
        Endpoint::GetAccountInfo,
        TransportResponse::ok_json(&json!({
            "users": [{
                "localId": "uid-1",
                "email": "a@b.com",
                "emailVerified": true,
                "displayName": "Ada",
                "passwordHash": "x",
                "providerUserInfo": [{ "providerId": "password", "rawId": "a@b.com" }],
                "createdAt": "1000",
                "lastLoginAt": "2000"
            }]
        })),
    );

    let signed_in = h
        .auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap();
    let reloaded = h.auth.reload_user().wait().unwrap();

    assert!(reloaded.is_email_verified);
    assert_eq!(reloaded.display_name.as_deref(), Some("Ada"));
    assert_eq!(reloaded.metadata.creation_timestamp_ms, 1000);
    assert_eq!(reloaded.metadata.last_sign_in_timestamp_ms, 2000);
    assert_eq!(reloaded.provider_data[0].uid, "a@b.com");
    assert_eq!(reloaded.id_token, signed_in.id_token);
    assert_eq!(h.auth.current_user(), Some(reloaded));
    assert_eq!(h.transport.calls()[1].body["idToken"], signed_in.id_token.expose());
}

#[test]
fn last_result_tracks_sign_in() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    let future = h.auth.sign_in_with_email_and_password("a@b.com", "pw");
    let user = future.wait().unwrap();
    drop(future);

    let last = h
        .auth
        .last_result::<User>(OperationKind::SignInWithEmailAndPassword);
    assert_eq!(last.value(), Some(user));
    // Asking for the wrong result type yields an invalid future.
    assert!(
        h.auth
            .last_result::<String>(OperationKind::SignInWithEmailAndPassword)
            .wait()
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn sign_in_can_be_awaited() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    let user = h
        .auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .await
        .unwrap();
    assert_eq!(user.uid, "uid-1");
    let token = h.auth.get_token(false).await.unwrap();
    assert_eq!(token, user.id_token.expose());
    drop(h);
}

#[tokio::test(flavor = "multi_thread")]
async fn session_runs_on_caller_runtime() {
    let transport = StubTransport::new();
    transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-1"));
    let auth = Auth::builder(AuthConfig::new("test-api-key"))
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .runtime_handle(tokio::runtime::Handle::current())
        .build()
        .unwrap();
    let user = auth.sign_in_anonymously().await.unwrap();
    assert!(user.is_anonymous);
    drop(auth);
    assert_eq!(transport.call_count(), 1);
}

//! Invalid input fails synchronously and never reaches the transport.

use warden_engine::{Credential, ErrorCode, ErrorKind, FutureStatus};

use crate::common::harness;

#[test]
fn invalid_credentials_fail_before_dispatch() {
    let h = harness();
    let cases = [
        (Credential::email_password("", "x"), ErrorCode::MissingEmail),
        (Credential::email_password("nope", "x"), ErrorCode::InvalidEmail),
        (Credential::email_password("a@b.com", ""), ErrorCode::MissingPassword),
        (Credential::google(None, None), ErrorCode::MissingCredential),
        (Credential::facebook(""), ErrorCode::MissingCredential),
        (Credential::github(""), ErrorCode::MissingCredential),
        (Credential::twitter("", "s"), ErrorCode::MissingCredential),
        (Credential::oauth("", Some("id"), None), ErrorCode::MissingCredential),
        (Credential::play_games(""), ErrorCode::MissingCredential),
        (
            Credential::GameCenter {
                player_id: "G:1".to_string(),
            },
            ErrorCode::ApiNotAvailable,
        ),
        (
            Credential::Phone {
                verification_id: "v".to_string(),
                verification_code: "1".into(),
            },
            ErrorCode::ApiNotAvailable,
        ),
    ];

    for (credential, code) in cases {
        let future = h.auth.sign_in_with_credential(&credential);
        assert_eq!(future.status(), FutureStatus::Complete, "{credential:?}");
        assert_eq!(future.error().unwrap().code(), code, "{credential:?}");

        let future = h.auth.sign_in_and_retrieve_data_with_credential(&credential);
        assert_eq!(future.status(), FutureStatus::Complete);
        assert_eq!(future.error().unwrap().code(), code);
    }
    assert_eq!(h.transport.call_count(), 0);
}

#[test]
fn email_operations_reject_bad_addresses() {
    let h = harness();

    let err = h.auth.sign_in_with_email_and_password("", "x").error().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.code(), ErrorCode::MissingEmail);

    let err = h
        .auth
        .create_user_with_email_and_password("a@b.com", "")
        .error()
        .unwrap();
    assert_eq!(err.code(), ErrorCode::MissingPassword);

    let err = h.auth.send_password_reset_email("not-an-email").error().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.code(), ErrorCode::InvalidEmail);

    let err = h.auth.fetch_providers_for_email("a@b").error().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidEmail);

    let err = h.auth.sign_in_with_custom_token("").error().unwrap();
    assert_eq!(err.code(), ErrorCode::InvalidCustomToken);

    assert_eq!(h.transport.call_count(), 0);
}

#[test]
fn user_operations_need_a_signed_in_user() {
    let h = harness();
    let err = h.auth.get_token(false).error().unwrap();
    assert_eq!(err.code(), ErrorCode::NoSignedInUser);
    let err = h.auth.get_token(true).error().unwrap();
    assert_eq!(err.code(), ErrorCode::NoSignedInUser);
    let err = h.auth.reload_user().error().unwrap();
    assert_eq!(err.code(), ErrorCode::NoSignedInUser);
    assert_eq!(h.transport.call_count(), 0);
}

#[test]
fn rejected_operation_is_the_last_result() {
    let h = harness();
    let _ = h.auth.send_password_reset_email("bad");
    let last = h
        .auth
        .last_result::<()>(warden_engine::OperationKind::SendPasswordResetEmail);
    assert_eq!(last.status(), FutureStatus::Complete);
    assert_eq!(last.error().unwrap().code(), ErrorCode::InvalidEmail);
}

//! Sessions talking to a mock backend over real HTTP.

use std::net::TcpListener;

use serde_json::json;
use warden_engine::{Auth, AuthConfig, ErrorCode};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{fake_id_token, init_tracing};

const RELYING_PARTY: &str = "/identitytoolkit/v3/relyingparty";

fn session(server: &MockServer) -> Auth {
    init_tracing();
    Auth::new(AuthConfig::new("http-key").with_emulator(&server.uri())).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn password_sign_in_then_forced_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{RELYING_PARTY}/verifyPassword")))
        .and(query_param("key", "http-key"))
        .and(body_partial_json(json!({
            "email": "a@b.com",
            "password": "pw",
            "returnSecureToken": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "localId": "uid-1",
            "email": "a@b.com",
            "idToken": fake_id_token("uid-1", "first"),
            "refreshToken": "refresh-1",
            "expiresIn": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/securetoken/v1/token"))
        .and(query_param("key", "http-key"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": "refresh-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id_token": "second",
            "access_token": "second",
            "refresh_token": "refresh-2",
            "expires_in": "3600"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = session(&server);
    let user = auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .await
        .unwrap();
    assert_eq!(user.uid, "uid-1");

    let token = auth.get_token(true).await.unwrap();
    assert_eq!(token, "second");
    let user = auth.current_user().unwrap();
    assert_eq!(user.refresh_token.expose(), "refresh-2");
    drop(auth);
}

#[tokio::test(flavor = "multi_thread")]
async fn backend_error_body_maps_to_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{RELYING_PARTY}/verifyPassword")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "EMAIL_NOT_FOUND" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = session(&server);
    let err = auth
        .sign_in_with_email_and_password("ghost@b.com", "pw")
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UserNotFound);
    assert!(auth.current_user().is_none());
    drop(auth);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_backend_is_network_failure() {
    // Nothing listens on a port whose listener was dropped.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut config = AuthConfig::new("http-key").with_emulator(&uri);
    config.rpc.max_retries = 0;
    let auth = Auth::new(config).unwrap();
    let err = auth.sign_in_anonymously().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NetworkRequestFailed);
    drop(auth);
}

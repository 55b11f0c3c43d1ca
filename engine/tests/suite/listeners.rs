use std::sync::{Arc, Mutex};

use warden_engine::{AuthStateListener, IdTokenListener, User};
use warden_rpc::Endpoint;

use crate::common::{harness, secure_token_ok, sign_up_ok, verify_password_ok};

type Seen = Arc<Mutex<Vec<Option<String>>>>;

fn recorder() -> (Seen, impl Fn(Option<&User>) + Send + Sync + 'static) {
    let seen: Seen = Arc::default();
    let sink = Arc::clone(&seen);
    let listener = move |user: Option<&User>| {
        sink.lock()
            .unwrap()
            .push(user.map(|user| user.uid.clone()));
    };
    (seen, listener)
}

fn uids(seen: &Seen) -> Vec<Option<String>> {
    seen.lock().unwrap().clone()
}

#[test]
fn auth_state_follows_sign_in_and_out() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    let (seen, listener) = recorder();
    assert!(h.auth.add_auth_state_listener(Arc::new(listener)));
    assert_eq!(uids(&seen), vec![None]);

    h.auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap();
    h.auth.sign_out();
    assert_eq!(
        uids(&seen),
        vec![None, Some("uid-1".to_string()), None]
    );
}

#[test]
fn sign_out_without_user_is_silent() {
    let h = harness();
    let (seen, listener) = recorder();
    h.auth.add_auth_state_listener(Arc::new(listener));
    h.auth.sign_out();
    h.auth.sign_out();
    assert_eq!(uids(&seen), vec![None]);
}

#[test]
fn token_refresh_reaches_id_token_listeners() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    h.transport
        .respond(Endpoint::SecureToken, secure_token_ok("rotated"));
    h.auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap();

    let (auth_seen, auth_listener) = recorder();
    let (token_seen, token_listener) = recorder();
    h.auth.add_auth_state_listener(Arc::new(auth_listener));
    h.auth.add_id_token_listener(Arc::new(token_listener));

    h.auth.get_token(true).wait().unwrap();
    assert_eq!(uids(&auth_seen).len(), 1);
    assert_eq!(
        uids(&token_seen),
        vec![Some("uid-1".to_string()), Some("uid-1".to_string())]
    );
}

#[test]
fn duplicate_listener_is_rejected() {
    let h = harness();
    let (seen, listener) = recorder();
    let listener: Arc<dyn AuthStateListener> = Arc::new(listener);
    assert!(h.auth.add_auth_state_listener(Arc::clone(&listener)));
    assert!(!h.auth.add_auth_state_listener(Arc::clone(&listener)));
    assert_eq!(uids(&seen).len(), 1);

    assert!(h.auth.remove_auth_state_listener(&listener));
    assert!(!h.auth.remove_auth_state_listener(&listener));
}

#[test]
fn removed_listener_stops_hearing() {
    let h = harness();
    h.transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-1"));
    let (seen, listener) = recorder();
    let listener: Arc<dyn IdTokenListener> = Arc::new(listener);
    h.auth.add_id_token_listener(Arc::clone(&listener));
    assert!(h.auth.remove_id_token_listener(&listener));

    h.auth.sign_in_anonymously().wait().unwrap();
    assert_eq!(uids(&seen), vec![None]);
}

#[test]
fn listeners_see_the_committed_user() {
    let h = harness();
    h.transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-1"));

    let observed: Arc<Mutex<Vec<bool>>> = Arc::default();
    let sink = Arc::clone(&observed);
    let auth_ref = Arc::new(Mutex::new(None::<Option<User>>));
    let slot = Arc::clone(&auth_ref);
    h.auth
        .add_auth_state_listener(Arc::new(move |user: Option<&User>| {
            *slot.lock().unwrap() = Some(user.cloned());
            sink.lock().unwrap().push(user.is_some());
        }));

    let user = h.auth.sign_in_anonymously().wait().unwrap();
    assert_eq!(*observed.lock().unwrap(), vec![false, true]);
    assert_eq!(*auth_ref.lock().unwrap(), Some(Some(user)));
}

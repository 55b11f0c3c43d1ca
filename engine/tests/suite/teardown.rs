//! Dropping a session waits for in-flight work and silences listeners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use warden_engine::{FunctionId, RefreshPhase, User};
use warden_rpc::Endpoint;

use crate::common::{
    WAIT, harness, secure_token_ok, sign_up_ok, verify_password_ok, wait_until,
};

const BLOCKED: Duration = Duration::from_millis(200);

#[test]
fn drop_waits_for_refresher_mid_fetch() {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-1", "a@b.com"));
    h.transport
        .respond(Endpoint::SecureToken, secure_token_ok("late"));
    h.auth
        .sign_in_with_email_and_password("a@b.com", "pw")
        .wait()
        .unwrap();

    h.transport.hold();
    h.clock.advance(Duration::from_secs(2700));
    h.auth.enable_auto_refresh();
    assert!(wait_until(WAIT, || h.transport.calls_to(Endpoint::SecureToken) == 1));
    assert_eq!(h.auth.refresh_phase(), RefreshPhase::Refreshing);

    let (done_tx, done_rx) = mpsc::channel();
    let auth = h.auth;
    let dropper = thread::spawn(move || {
        drop(auth);
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(BLOCKED).is_err());
    h.transport.release(1);
    done_rx.recv_timeout(WAIT).unwrap();
    dropper.join().unwrap();
    assert_eq!(h.transport.calls_to(Endpoint::SecureToken), 1);
}

#[test]
fn drop_waits_for_pending_operation() {
    let h = harness();
    h.transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-1"));
    h.transport.hold();

    let future = h.auth.sign_in_anonymously();
    assert!(wait_until(WAIT, || h.transport.call_count() == 1));
    assert!(future.is_pending());
    assert_eq!(h.auth.pending_operations(), 1);

    let (done_tx, done_rx) = mpsc::channel();
    let auth = h.auth;
    let dropper = thread::spawn(move || {
        drop(auth);
        done_tx.send(()).unwrap();
    });

    assert!(done_rx.recv_timeout(BLOCKED).is_err());
    h.transport.release(1);
    done_rx.recv_timeout(WAIT).unwrap();
    dropper.join().unwrap();

    // The handle outlives the session and still holds the result.
    assert_eq!(future.wait().unwrap().uid, "anon-1");
}

#[test]
fn no_notifications_after_drop() {
    let h = harness();
    h.transport.respond(Endpoint::SignUpNewUser, sign_up_ok("anon-1"));
    h.auth.sign_in_anonymously().wait().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    h.auth
        .add_auth_state_listener(Arc::new(move |_: Option<&User>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let functions = Arc::clone(h.auth.function_registry());
    drop(h.auth);

    // Clearing the user during teardown is not a sign-out.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for id in FunctionId::ALL {
        assert!(!functions.is_registered(id));
    }
    assert!(!functions.call(FunctionId::AuthStartTokenListener, None));
}

#[test]
fn drop_of_idle_session_is_prompt() {
    let h = harness();
    h.auth.enable_auto_refresh();
    let (done_tx, done_rx) = mpsc::channel();
    let auth = h.auth;
    thread::spawn(move || {
        drop(auth);
        done_tx.send(()).unwrap();
    });
    done_rx.recv_timeout(WAIT).unwrap();
}

//! A full session from invalid input through auto-refresh bookkeeping.

use warden_engine::{ErrorKind, FutureStatus};
use warden_rpc::Endpoint;

use crate::common::{START_MS, harness, verify_password_ok};

#[test]
fn end_to_end_session() -> anyhow::Result<()> {
    let h = harness();
    h.transport
        .respond(Endpoint::VerifyPassword, verify_password_ok("uid-7", "x@y.com"));

    let rejected = h.auth.sign_in_with_email_and_password("", "x");
    assert_eq!(rejected.status(), FutureStatus::Complete);
    assert_eq!(rejected.error().unwrap().kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.transport.call_count(), 0);

    let user = h
        .auth
        .sign_in_with_email_and_password("x@y.com", "hunter2")
        .wait()?;
    assert!(!user.is_anonymous);
    assert_eq!(user.token_timestamp_ms, START_MS);
    assert_eq!(h.transport.call_count(), 1);

    let reset = h.auth.send_password_reset_email("not-an-email");
    assert_eq!(reset.error().unwrap().kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.transport.call_count(), 1);

    h.auth.enable_auto_refresh();
    h.auth.enable_auto_refresh();
    h.auth.disable_auto_refresh();
    assert_eq!(h.auth.auto_refresh_ref_count(), 1);
    assert!(h.auth.is_auto_refresh_wanted());

    h.auth.sign_out();
    assert!(h.auth.current_user().is_none());
    let token = h.auth.get_token(false);
    assert_eq!(token.status(), FutureStatus::Complete);
    assert!(token.error().is_some());
    Ok(())
}

//! Id-token fetch and account reload.

use std::sync::Arc;

use warden_rpc::requests::{GetAccountInfoRequest, SecureTokenRequest};
use warden_rpc::responses::{AccountInfo, SecureTokenResponse};
use warden_types::{
    AuthError, ErrorCode, ErrorKind, OperationKind, Secret, User, UserInfo, UserMetadata,
};

use crate::auth::{Auth, AuthShared};
use crate::dispatch::call_async;
use crate::future::{AuthFuture, TokenRefresh};
use crate::listeners::Notify;

fn user_changed_error() -> AuthError {
    AuthError::new(
        ErrorKind::InternalInconsistency,
        ErrorCode::UserMismatch,
        "the signed-in user changed while the request was in flight",
    )
}

impl AuthShared {
    /// Cached token when still fresh, otherwise a refresh through the secure
    /// token endpoint. Concurrent refreshes share one backend call.
    pub fn get_token(
        self: &Arc<Self>,
        force_refresh: bool,
        kind: OperationKind,
    ) -> AuthFuture<String> {
        let Some(user) = self.registry.current_user() else {
            return self.failed(kind, AuthError::no_signed_in_user());
        };
        if !force_refresh
            && !user.token_needs_refresh(self.clock.now_millis(), self.expiry_buffer_ms)
        {
            return self.completed(kind, user.id_token.expose().to_string());
        }
        if user.refresh_token.is_empty() {
            return self.failed(kind, AuthError::invalid_credential(ErrorCode::UserTokenExpired));
        }

        match self.registry.begin_token_refresh(kind) {
            TokenRefresh::InFlight(future) => future,
            TokenRefresh::Started(promise, future) => {
                let request = SecureTokenRequest::refresh(user.refresh_token.expose());
                let uid = user.uid;
                call_async(self, promise, request, move |shared, response| {
                    shared.apply_token_refresh(&uid, response?)
                });
                future
            }
        }
    }

    /// Store a refreshed token on the current user, if it is still the user
    /// the refresh was issued for, and notify id-token listeners.
    fn apply_token_refresh(
        &self,
        uid: &str,
        response: SecureTokenResponse,
    ) -> Result<String, AuthError> {
        let token = response.fresh_id_token().to_string();
        if token.is_empty() {
            return Err(AuthError::new(
                ErrorKind::InternalInconsistency,
                ErrorCode::Failure,
                "secure token response is missing the id token",
            ));
        }
        let now_ms = self.clock.now_millis();
        let expires_at_ms = now_ms.saturating_add(response.expires_in_secs().saturating_mul(1000));

        let stored = self.listeners.update_user(&self.registry, |slot| match slot {
            Some(user) if user.uid == uid => {
                user.id_token = Secret::new(token.as_str());
                if !response.refresh_token.is_empty() {
                    user.refresh_token = Secret::new(response.refresh_token.as_str());
                }
                user.access_token_expires_at_ms = expires_at_ms;
                user.token_timestamp_ms = now_ms;
                (Notify::ID_TOKEN, true)
            }
            _ => (Notify::NONE, false),
        });
        if !stored {
            tracing::debug!("User changed during token refresh; fresh token not stored");
        }
        Ok(token)
    }

    /// Refresh profile fields from an account-info record. Listeners are not
    /// notified; the token is unchanged.
    fn apply_account_info(&self, uid: &str, account: AccountInfo) -> Result<User, AuthError> {
        if !account.local_id.is_empty() && account.local_id != uid {
            return Err(user_changed_error());
        }
        self.listeners.update_user(&self.registry, |slot| {
            let Some(user) = slot.as_mut() else {
                return (Notify::NONE, Err(AuthError::no_signed_in_user()));
            };
            if user.uid != uid {
                return (Notify::NONE, Err(user_changed_error()));
            }
            user.metadata = UserMetadata {
                creation_timestamp_ms: account.created_at_ms(),
                last_sign_in_timestamp_ms: account.last_login_at_ms(),
            };
            user.has_email_password_credential = account.has_password();
            user.is_email_verified = account.email_verified;
            user.is_anonymous = user.is_anonymous
                && account.email.is_none()
                && account.provider_user_info.is_empty();
            user.email = account.email;
            user.display_name = account.display_name;
            user.photo_url = account.photo_url;
            user.phone_number = account.phone_number;
            user.provider_data = account
                .provider_user_info
                .into_iter()
                .map(|info| UserInfo {
                    uid: info.raw_id.or(info.federated_id).unwrap_or_default(),
                    provider_id: info.provider_id,
                    email: info.email,
                    display_name: info.display_name,
                    photo_url: info.photo_url,
                    phone_number: info.phone_number,
                })
                .collect();
            (Notify::NONE, Ok(user.clone()))
        })
    }
}

impl Auth {
    /// The current id token. `force_refresh` always goes to the backend;
    /// otherwise the cached token is returned unless it is close to expiry.
    pub fn get_token(&self, force_refresh: bool) -> AuthFuture<String> {
        self.shared.get_token(force_refresh, OperationKind::GetToken)
    }

    /// Re-read the signed-in user's profile from the backend.
    pub fn reload_user(&self) -> AuthFuture<User> {
        let kind = OperationKind::ReloadUser;
        let Some(user) = self.current_user() else {
            return self.shared.failed(kind, AuthError::no_signed_in_user());
        };
        let (promise, future) = self.shared.registry.create(kind);
        let uid = user.uid;
        call_async(
            &self.shared,
            promise,
            GetAccountInfoRequest::new(user.id_token.expose()),
            move |shared, response| {
                let account = response?
                    .users
                    .into_iter()
                    .next()
                    .ok_or_else(|| AuthError::backend("USER_NOT_FOUND"))?;
                shared.apply_account_info(&uid, account)
            },
        );
        future
    }
}

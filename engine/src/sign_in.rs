//! Sign-in, account creation and the other email-keyed operations.
//!
//! Every operation validates its input first. Invalid input fails the
//! returned future before it is handed back and never reaches the transport.

use warden_rpc::requests::{
    CreateAuthUriRequest, GetOobConfirmationCodeRequest, SignUpNewUserRequest,
    VerifyCustomTokenRequest, VerifyPasswordRequest,
};
use warden_rpc::{RpcRequest, SignInData, SignInPayload};
use warden_types::{
    AdditionalUserInfo, AuthError, Credential, EMAIL_PASSWORD_PROVIDER_ID, ErrorCode, ErrorKind,
    FetchProvidersResult, OperationKind, Secret, SignInResult, User, UserInfo, UserMetadata,
};

use crate::auth::{Auth, AuthShared};
use crate::credential::{SignInRequest, sign_in_request};
use crate::dispatch::call_async;
use crate::future::AuthFuture;
use crate::validate::{
    validate_credential, validate_custom_token, validate_email, validate_email_and_password,
};

/// Provider id of every account the identity backend manages.
const ACCOUNT_PROVIDER_ID: &str = "firebase";

/// Sign-in providers that do not become linked provider profiles.
const UNLINKED_PROVIDERS: [&str; 2] = ["anonymous", "custom"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Anonymous,
    EmailPassword,
    Federated,
}

fn into_user(result: SignInResult) -> User {
    result.user
}

fn into_result(result: SignInResult) -> SignInResult {
    result
}

fn user_from_sign_in(data: SignInData, origin: Origin, now_ms: u64) -> User {
    let provider_id = match origin {
        Origin::Anonymous => None,
        Origin::EmailPassword => data
            .provider_id
            .or_else(|| Some(EMAIL_PASSWORD_PROVIDER_ID.to_string())),
        Origin::Federated => data.provider_id,
    };
    let provider_data = provider_id
        .as_deref()
        .filter(|id| !UNLINKED_PROVIDERS.contains(id))
        .map(|id| UserInfo {
            uid: data.uid.clone(),
            provider_id: id.to_string(),
            email: data.email.clone(),
            display_name: data.display_name.clone(),
            photo_url: data.photo_url.clone(),
            phone_number: None,
        })
        .into_iter()
        .collect();

    User {
        uid: data.uid,
        email: data.email,
        display_name: data.display_name,
        photo_url: data.photo_url,
        phone_number: None,
        provider_id: ACCOUNT_PROVIDER_ID.to_string(),
        is_anonymous: origin == Origin::Anonymous,
        is_email_verified: false,
        has_email_password_credential: provider_id.as_deref() == Some(EMAIL_PASSWORD_PROVIDER_ID),
        id_token: Secret::new(data.id_token),
        refresh_token: Secret::new(data.refresh_token),
        access_token_expires_at_ms: now_ms
            .saturating_add(data.expires_in_secs.saturating_mul(1000)),
        token_timestamp_ms: now_ms,
        metadata: UserMetadata {
            creation_timestamp_ms: if data.is_new_user { now_ms } else { 0 },
            last_sign_in_timestamp_ms: now_ms,
        },
        provider_data,
    }
}

/// Response handler shared by every sign-in flow: build the user, install
/// it as current, and notify listeners.
fn finish_sign_in<P: SignInPayload>(
    shared: &AuthShared,
    response: Result<P, AuthError>,
    origin: Origin,
) -> Result<SignInResult, AuthError> {
    let mut data = response?.into_sign_in_data()?;
    if data.id_token.is_empty() || data.uid.is_empty() {
        return Err(AuthError::new(
            ErrorKind::InternalInconsistency,
            ErrorCode::Failure,
            "sign-in response is missing the account id or id token",
        ));
    }
    let info = AdditionalUserInfo {
        provider_id: data.provider_id.clone().unwrap_or_default(),
        user_name: data.user_name.take(),
        is_new_user: data.is_new_user,
        profile: std::mem::take(&mut data.profile),
    };
    let user = user_from_sign_in(data, origin, shared.clock.now_millis());
    shared.set_signed_in_user(user.clone());
    Ok(SignInResult { user, info })
}

impl Auth {
    fn dispatch_sign_in<R, T>(
        &self,
        kind: OperationKind,
        request: R,
        origin: Origin,
        finish: fn(SignInResult) -> T,
    ) -> AuthFuture<T>
    where
        R: RpcRequest + 'static,
        R::Response: SignInPayload,
        T: Clone + Send + 'static,
    {
        let (promise, future) = self.shared.registry.create::<T>(kind);
        call_async(&self.shared, promise, request, move |shared, response| {
            finish_sign_in(shared, response, origin).map(finish)
        });
        future
    }

    fn dispatch_credential<T: Clone + Send + 'static>(
        &self,
        kind: OperationKind,
        credential: &Credential,
        finish: fn(SignInResult) -> T,
    ) -> AuthFuture<T> {
        let request = validate_credential(credential).and_then(|()| sign_in_request(credential));
        match request {
            Ok(SignInRequest::Password(request)) => {
                self.dispatch_sign_in(kind, request, Origin::EmailPassword, finish)
            }
            Ok(SignInRequest::Assertion(request)) => {
                self.dispatch_sign_in(kind, request, Origin::Federated, finish)
            }
            Err(e) => self.shared.failed(kind, e),
        }
    }

    pub fn sign_in_with_email_and_password(&self, email: &str, password: &str) -> AuthFuture<User> {
        let kind = OperationKind::SignInWithEmailAndPassword;
        if let Err(e) = validate_email_and_password(email, password) {
            return self.shared.failed(kind, e);
        }
        self.dispatch_sign_in(
            kind,
            VerifyPasswordRequest::new(email, password),
            Origin::EmailPassword,
            into_user,
        )
    }

    pub fn create_user_with_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> AuthFuture<User> {
        let kind = OperationKind::CreateUserWithEmailAndPassword;
        if let Err(e) = validate_email_and_password(email, password) {
            return self.shared.failed(kind, e);
        }
        self.dispatch_sign_in(
            kind,
            SignUpNewUserRequest::with_email_and_password(email, password),
            Origin::EmailPassword,
            into_user,
        )
    }

    /// Sign in as a new anonymous user. If the current user is already
    /// anonymous the returned future is complete with that user and no
    /// request is made.
    pub fn sign_in_anonymously(&self) -> AuthFuture<User> {
        let kind = OperationKind::SignInAnonymously;
        if let Some(user) = self.current_user().filter(|user| user.is_anonymous) {
            tracing::debug!("Already signed in anonymously; reusing current user");
            return self.shared.completed(kind, user);
        }
        self.dispatch_sign_in(kind, SignUpNewUserRequest::anonymous(), Origin::Anonymous, into_user)
    }

    pub fn sign_in_with_custom_token(&self, token: &str) -> AuthFuture<User> {
        let kind = OperationKind::SignInWithCustomToken;
        if let Err(e) = validate_custom_token(token) {
            return self.shared.failed(kind, e);
        }
        self.dispatch_sign_in(
            kind,
            VerifyCustomTokenRequest::new(token),
            Origin::Federated,
            into_user,
        )
    }

    pub fn sign_in_with_credential(&self, credential: &Credential) -> AuthFuture<User> {
        self.dispatch_credential(OperationKind::SignInWithCredential, credential, into_user)
    }

    /// Like [`sign_in_with_credential`](Self::sign_in_with_credential), also
    /// returning the provider's additional user info.
    pub fn sign_in_and_retrieve_data_with_credential(
        &self,
        credential: &Credential,
    ) -> AuthFuture<SignInResult> {
        self.dispatch_credential(
            OperationKind::SignInAndRetrieveDataWithCredential,
            credential,
            into_result,
        )
    }

    pub fn fetch_providers_for_email(&self, email: &str) -> AuthFuture<FetchProvidersResult> {
        let kind = OperationKind::FetchProvidersForEmail;
        if let Err(e) = validate_email(email) {
            return self.shared.failed(kind, e);
        }
        let (promise, future) = self.shared.registry.create(kind);
        call_async(
            &self.shared,
            promise,
            CreateAuthUriRequest::new(email),
            |_, response| {
                Ok(FetchProvidersResult {
                    providers: response?.all_providers,
                })
            },
        );
        future
    }

    pub fn send_password_reset_email(&self, email: &str) -> AuthFuture<()> {
        let kind = OperationKind::SendPasswordResetEmail;
        if let Err(e) = validate_email(email) {
            return self.shared.failed(kind, e);
        }
        let (promise, future) = self.shared.registry.create(kind);
        call_async(
            &self.shared,
            promise,
            GetOobConfirmationCodeRequest::password_reset(email),
            |_, response| response.map(|_| ()),
        );
        future
    }
}

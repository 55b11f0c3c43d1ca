//! Sign-in credentials.
//!
//! A [`Credential`] is a plain value: the provider kind plus whatever that
//! provider needs to prove identity. It owns no threads and no handles.

use serde::{Deserialize, Serialize};

use crate::Secret;

pub const EMAIL_PASSWORD_PROVIDER_ID: &str = "password";
pub const GOOGLE_PROVIDER_ID: &str = "google.com";
pub const FACEBOOK_PROVIDER_ID: &str = "facebook.com";
pub const GITHUB_PROVIDER_ID: &str = "github.com";
pub const TWITTER_PROVIDER_ID: &str = "twitter.com";
pub const PLAY_GAMES_PROVIDER_ID: &str = "playgames.google.com";
pub const GAME_CENTER_PROVIDER_ID: &str = "gc.apple.com";
pub const PHONE_PROVIDER_ID: &str = "phone";

/// Tagged union over the supported identity providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Credential {
    EmailPassword {
        email: String,
        password: Secret,
    },
    Google {
        id_token: Option<Secret>,
        access_token: Option<Secret>,
    },
    Facebook {
        access_token: Secret,
    },
    GitHub {
        token: Secret,
    },
    Twitter {
        token: Secret,
        secret: Secret,
    },
    /// Any other OAuth/OIDC provider, identified by its provider id.
    OAuth {
        provider_id: String,
        id_token: Option<Secret>,
        access_token: Option<Secret>,
        raw_nonce: Option<String>,
    },
    PlayGames {
        server_auth_code: Secret,
    },
    GameCenter {
        player_id: String,
    },
    Phone {
        verification_id: String,
        verification_code: Secret,
    },
}

fn present(value: Option<&Secret>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

impl Credential {
    #[must_use]
    pub fn email_password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self::EmailPassword {
            email: email.into(),
            password: Secret::new(password),
        }
    }

    #[must_use]
    pub fn google(id_token: Option<&str>, access_token: Option<&str>) -> Self {
        Self::Google {
            id_token: id_token.map(Secret::from),
            access_token: access_token.map(Secret::from),
        }
    }

    #[must_use]
    pub fn facebook(access_token: impl Into<String>) -> Self {
        Self::Facebook {
            access_token: Secret::new(access_token),
        }
    }

    #[must_use]
    pub fn github(token: impl Into<String>) -> Self {
        Self::GitHub {
            token: Secret::new(token),
        }
    }

    #[must_use]
    pub fn twitter(token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::Twitter {
            token: Secret::new(token),
            secret: Secret::new(secret),
        }
    }

    #[must_use]
    pub fn oauth(
        provider_id: impl Into<String>,
        id_token: Option<&str>,
        access_token: Option<&str>,
    ) -> Self {
        Self::OAuth {
            provider_id: provider_id.into(),
            id_token: id_token.map(Secret::from),
            access_token: access_token.map(Secret::from),
            raw_nonce: None,
        }
    }

    #[must_use]
    pub fn play_games(server_auth_code: impl Into<String>) -> Self {
        Self::PlayGames {
            server_auth_code: Secret::new(server_auth_code),
        }
    }

    #[must_use]
    pub fn provider_id(&self) -> &str {
        match self {
            Self::EmailPassword { .. } => EMAIL_PASSWORD_PROVIDER_ID,
            Self::Google { .. } => GOOGLE_PROVIDER_ID,
            Self::Facebook { .. } => FACEBOOK_PROVIDER_ID,
            Self::GitHub { .. } => GITHUB_PROVIDER_ID,
            Self::Twitter { .. } => TWITTER_PROVIDER_ID,
            Self::OAuth { provider_id, .. } => provider_id,
            Self::PlayGames { .. } => PLAY_GAMES_PROVIDER_ID,
            Self::GameCenter { .. } => GAME_CENTER_PROVIDER_ID,
            Self::Phone { .. } => PHONE_PROVIDER_ID,
        }
    }

    /// Whether the provider-specific payload carries the fields its provider needs.
    ///
    /// Email/password structure (format, emptiness) is checked separately so
    /// the caller can report the precise missing field.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        match self {
            Self::EmailPassword { .. } => true,
            Self::Google {
                id_token,
                access_token,
            } => present(id_token.as_ref()) || present(access_token.as_ref()),
            Self::Facebook { access_token } => !access_token.is_empty(),
            Self::GitHub { token } => !token.is_empty(),
            Self::Twitter { token, secret } => !token.is_empty() && !secret.is_empty(),
            Self::OAuth {
                provider_id,
                id_token,
                access_token,
                ..
            } => {
                !provider_id.trim().is_empty()
                    && (present(id_token.as_ref()) || present(access_token.as_ref()))
            }
            Self::PlayGames { server_auth_code } => !server_auth_code.is_empty(),
            Self::GameCenter { player_id } => !player_id.is_empty(),
            Self::Phone {
                verification_id,
                verification_code,
            } => !verification_id.is_empty() && !verification_code.is_empty(),
        }
    }

    /// Game Center and phone sign-in need a native SDK and are unavailable here.
    #[must_use]
    pub const fn is_supported_on_desktop(&self) -> bool {
        !matches!(self, Self::GameCenter { .. } | Self::Phone { .. })
    }

    /// Password-based credentials use the verify-password response family;
    /// everything else goes through verify-assertion.
    #[must_use]
    pub const fn is_password_based(&self) -> bool {
        matches!(self, Self::EmailPassword { .. })
    }
}

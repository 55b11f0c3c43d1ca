//! Core domain types for Warden.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the engine.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod credential;
mod error;
mod operation;
mod secret;
mod user;

pub use credential::{
    Credential, EMAIL_PASSWORD_PROVIDER_ID, FACEBOOK_PROVIDER_ID, GAME_CENTER_PROVIDER_ID,
    GITHUB_PROVIDER_ID, GOOGLE_PROVIDER_ID, PHONE_PROVIDER_ID, PLAY_GAMES_PROVIDER_ID,
    TWITTER_PROVIDER_ID,
};
pub use error::{AuthError, ErrorCode, ErrorKind};
pub use operation::{FutureStatus, OperationKind};
pub use secret::{ApiKey, Secret};
pub use user::{
    AdditionalUserInfo, FetchProvidersResult, SignInResult, User, UserInfo, UserMetadata,
};

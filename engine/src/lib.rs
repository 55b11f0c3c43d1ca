//! Session engine for Warden: asynchronous completion, sign-in flows, and
//! background id-token refresh.
//!
//! # Architecture
//!
//! - [`Auth`] - one session, passed explicitly to every operation
//! - [`AuthFuture`] / `Promise` - write-once results, observable by polling,
//!   continuation, `.await`, or a blocking wait
//! - RPC dispatch - each backend call runs on the session's tokio runtime and
//!   resolves its promise through a single response handler
//! - Token refresher - a dedicated thread that keeps the id token fresh while
//!   at least one auto-refresh request is outstanding
//! - Listeners - auth-state and id-token observers
//! - [`FunctionRegistry`] - the three named entry points other components use
//!
//! # Lock order
//!
//! 1. Refresher state mutex
//! 2. Listener-set mutex
//! 3. Future-registry mutex (also guards the current user)
//!
//! A thread holding a lock may only take locks further down this list. No
//! lock is held while invoking listeners or completion callbacks, or while
//! blocking on a future or the refresher's wakeup semaphore.

mod auth;
mod clock;
mod credential;
mod dispatch;
mod future;
mod listeners;
mod refresh;
mod registry;
mod sign_in;
mod sync;
mod token;
mod validate;

pub use auth::{Auth, AuthBuilder, InitError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use future::{AuthFuture, Completion, ContractViolation, FutureRegistry, Promise};
pub use listeners::{AuthStateListener, IdTokenListener};
pub use refresh::{RefreshPhase, needs_refresh};
pub use registry::{FunctionId, FunctionRegistry};
pub use sync::Semaphore;

pub use warden_config::AuthConfig;
pub use warden_types::{
    AdditionalUserInfo, AuthError, Credential, ErrorCode, ErrorKind, FetchProvidersResult,
    FutureStatus, OperationKind, SignInResult, User, UserInfo, UserMetadata,
};

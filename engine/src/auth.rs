//! The auth session handle and its construction.

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::runtime::{Handle, Runtime};
use warden_config::AuthConfig;
use warden_rpc::{Endpoints, HttpTransport, Transport};
use warden_types::{ApiKey, AuthError, OperationKind, User};

use crate::clock::{Clock, SystemClock};
use crate::future::{AuthFuture, FutureRegistry};
use crate::listeners::{AuthStateListener, IdTokenListener, ListenerRegistry, Notify};
use crate::refresh::{RefreshPhase, TokenRefresher};
use crate::registry::{FunctionId, FunctionRegistry};

const RPC_THREAD_NAME: &str = "warden-rpc";

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// State shared between the session handle, runtime tasks, the refresher
/// thread and registered functions.
pub(crate) struct AuthShared {
    pub app_name: String,
    pub api_key: ApiKey,
    pub endpoints: Endpoints,
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub runtime: Handle,
    pub registry: Arc<FutureRegistry>,
    pub listeners: ListenerRegistry,
    pub refresher: TokenRefresher,
    pub expiry_buffer_ms: u64,
}

impl AuthShared {
    /// A future that is already failed with `error`.
    pub fn failed<T: Clone + Send + 'static>(
        &self,
        kind: OperationKind,
        error: AuthError,
    ) -> AuthFuture<T> {
        tracing::debug!(operation = %kind, %error, "Rejected before dispatch");
        let (mut promise, future) = self.registry.create::<T>(kind);
        let _ = promise.fail(error);
        future
    }

    /// A future that is already complete with `value`.
    pub fn completed<T: Clone + Send + 'static>(
        &self,
        kind: OperationKind,
        value: T,
    ) -> AuthFuture<T> {
        let (mut promise, future) = self.registry.create::<T>(kind);
        let _ = promise.complete(value);
        future
    }

    /// Replace the current user after a successful sign-in and notify both
    /// listener sets.
    pub fn set_signed_in_user(&self, user: User) {
        tracing::info!(
            app = %self.app_name,
            anonymous = user.is_anonymous,
            "User signed in"
        );
        self.listeners.update_user(&self.registry, |slot| {
            *slot = Some(user);
            (Notify::BOTH, ())
        });
    }

    pub fn sign_out(&self) {
        let signed_out = self.listeners.update_user(&self.registry, |slot| match slot.take() {
            Some(_) => (Notify::BOTH, true),
            None => (Notify::NONE, false),
        });
        if signed_out {
            tracing::info!(app = %self.app_name, "User signed out");
        }
    }
}

/// Failure to bring up a session.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("failed to build HTTP transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to start RPC runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to spawn token refresh thread: {0}")]
    RefreshThread(#[source] std::io::Error),
}

/// Configures and starts an [`Auth`] session.
pub struct AuthBuilder {
    config: AuthConfig,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    functions: Option<Arc<FunctionRegistry>>,
    runtime: Option<Handle>,
}

impl AuthBuilder {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            transport: None,
            clock: None,
            functions: None,
            runtime: None,
        }
    }

    /// Use `transport` instead of an [`HttpTransport`] built from config.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register the session's functions in `functions` instead of a private
    /// registry.
    pub fn function_registry(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Run RPCs on an existing runtime instead of a session-owned one.
    pub fn runtime_handle(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<Auth, InitError> {
        let config = self.config;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&config.http_options())?),
        };
        let (runtime, handle) = match self.runtime {
            Some(handle) => (None, handle),
            None => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(config.rpc.worker_threads.max(1))
                    .thread_name(RPC_THREAD_NAME)
                    .enable_all()
                    .build()
                    .map_err(InitError::Runtime)?;
                let handle = runtime.handle().clone();
                (Some(runtime), handle)
            }
        };

        let shared = Arc::new(AuthShared {
            app_name: config.app_name.clone(),
            api_key: config.api_key.clone(),
            endpoints: config.backend_endpoints(),
            transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            runtime: handle,
            registry: Arc::new(FutureRegistry::new()),
            listeners: ListenerRegistry::default(),
            refresher: TokenRefresher::new(config.refresh_interval(), config.retry_after_failure()),
            expiry_buffer_ms: millis(config.expiry_buffer()),
        });

        let weak = Arc::downgrade(&shared);
        shared.listeners.add_id_token(
            &shared.registry,
            Arc::new(move |user: Option<&User>| {
                if let Some(shared) = weak.upgrade() {
                    shared
                        .refresher
                        .observe_token(user, shared.clock.now_millis());
                }
            }),
        );
        shared
            .refresher
            .start(Arc::clone(&shared))
            .map_err(InitError::RefreshThread)?;

        let functions = self.functions.unwrap_or_default();
        register_functions(&functions, Arc::downgrade(&shared));

        tracing::info!(app = %shared.app_name, "Auth session initialized");
        Ok(Auth {
            shared,
            functions,
            runtime,
        })
    }
}

fn register_functions(functions: &FunctionRegistry, shared: Weak<AuthShared>) {
    let session = Weak::clone(&shared);
    // Empty when signed out; `false` only once the session is gone.
    functions.register(FunctionId::AuthGetCurrentToken, move |out| {
        let Some(shared) = session.upgrade() else {
            return false;
        };
        if let Some(out) = out {
            *out = shared.refresher.current_token().unwrap_or_default();
        }
        true
    });
    let session = Weak::clone(&shared);
    functions.register(FunctionId::AuthStartTokenListener, move |_| {
        session.upgrade().is_some_and(|s| {
            s.refresher.enable();
            true
        })
    });
    functions.register(FunctionId::AuthStopTokenListener, move |_| {
        shared.upgrade().is_some_and(|s| {
            s.refresher.disable();
            true
        })
    });
}

/// One authenticated application instance.
///
/// Every operation returns an [`AuthFuture`] without blocking. Dropping the
/// session tears it down synchronously: the refresher is joined, pending
/// operations drain, and listeners are cleared before the runtime stops. It
/// must therefore not be dropped from inside one of its own listeners or
/// completion callbacks.
pub struct Auth {
    pub(crate) shared: Arc<AuthShared>,
    functions: Arc<FunctionRegistry>,
    runtime: Option<Runtime>,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("app_name", &self.shared.app_name)
            .field("owns_runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}

impl Auth {
    /// Start a session from `config` with the default HTTP transport.
    pub fn new(config: AuthConfig) -> Result<Self, InitError> {
        AuthBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: AuthConfig) -> AuthBuilder {
        AuthBuilder::new(config)
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.shared.app_name
    }

    /// Snapshot of the signed-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.shared.registry.current_user()
    }

    /// The most recent operation of `kind`, or an `Invalid` future.
    #[must_use]
    pub fn last_result<T: Clone + Send + 'static>(&self, kind: OperationKind) -> AuthFuture<T> {
        self.shared.registry.last_result(kind)
    }

    /// Operations that have not finished running their callbacks.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.shared.registry.pending_count()
    }

    #[must_use]
    pub fn function_registry(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Clear the current user. Listeners fire only if someone was signed in.
    pub fn sign_out(&self) {
        self.shared.sign_out();
    }

    pub fn add_auth_state_listener(&self, listener: Arc<dyn AuthStateListener>) -> bool {
        self.shared
            .listeners
            .add_auth_state(&self.shared.registry, listener)
    }

    pub fn remove_auth_state_listener(&self, listener: &Arc<dyn AuthStateListener>) -> bool {
        self.shared.listeners.remove_auth_state(listener)
    }

    pub fn add_id_token_listener(&self, listener: Arc<dyn IdTokenListener>) -> bool {
        self.shared
            .listeners
            .add_id_token(&self.shared.registry, listener)
    }

    pub fn remove_id_token_listener(&self, listener: &Arc<dyn IdTokenListener>) -> bool {
        self.shared.listeners.remove_id_token(listener)
    }

    /// Ask the refresher to keep the id token fresh. Balanced by
    /// [`disable_auto_refresh`](Self::disable_auto_refresh).
    pub fn enable_auto_refresh(&self) {
        self.shared.refresher.enable();
    }

    pub fn disable_auto_refresh(&self) {
        self.shared.refresher.disable();
    }

    #[must_use]
    pub fn auto_refresh_ref_count(&self) -> u32 {
        self.shared.refresher.ref_count()
    }

    #[must_use]
    pub fn is_auto_refresh_wanted(&self) -> bool {
        self.auto_refresh_ref_count() > 0
    }

    #[must_use]
    pub fn refresh_phase(&self) -> RefreshPhase {
        self.shared.refresher.phase()
    }
}

impl Drop for Auth {
    fn drop(&mut self) {
        tracing::info!(app = %self.shared.app_name, "Destroying auth session");
        for id in FunctionId::ALL {
            self.functions.unregister(id);
        }
        // The refresher may be mid-fetch; joining it first means no new
        // refresh can start while pending operations drain.
        self.shared.refresher.stop();
        self.shared.registry.wait_idle();
        self.shared.listeners.close();
        self.shared.registry.with_user(|user| *user = None);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

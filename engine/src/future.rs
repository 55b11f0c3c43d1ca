//! Future/promise registry.
//!
//! Every asynchronous operation owns one entry in a session's
//! [`FutureRegistry`]. The engine holds the write side ([`Promise`]); callers
//! hold any number of read handles ([`AuthFuture`]). An entry moves from
//! `Pending` to a terminal status exactly once.
//!
//! The registry mutex is the innermost lock in the engine (see the lock order
//! in the crate docs). It also guards the session's current user so that a
//! completion and the user mutation that produced it are serialized.
//!
//! Completion callbacks, wakers and blocking waiters are released only after
//! the result is stored and the mutex is dropped, so a callback always
//! observes its own result and may freely query the registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use warden_types::{AuthError, ErrorCode, ErrorKind, FutureStatus, OperationKind, User};

use crate::sync::{Semaphore, lock_unpoisoned};

type Callback<T> = Box<dyn FnOnce(&Completion<T>) + Send>;

/// Final state of an operation, handed to completion callbacks.
#[derive(Debug, Clone)]
pub struct Completion<T> {
    kind: OperationKind,
    status: FutureStatus,
    result: Result<T, AuthError>,
}

impl<T> Completion<T> {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// `Complete` for finished operations (successful or failed), `Invalid`
    /// for abandoned ones.
    #[must_use]
    pub const fn status(&self) -> FutureStatus {
        self.status
    }

    pub fn result(&self) -> Result<&T, &AuthError> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&AuthError> {
        self.result.as_ref().err()
    }

    pub fn into_result(self) -> Result<T, AuthError> {
        self.result
    }
}

/// Misuse of the promise contract. Always an engine bug.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("{kind} operation completed more than once")]
    AlreadyComplete { kind: OperationKind },
    #[error("{kind} operation has no registry entry")]
    MissingEntry { kind: OperationKind },
}

impl From<ContractViolation> for AuthError {
    fn from(violation: ContractViolation) -> Self {
        AuthError::internal(violation.to_string())
    }
}

/// Log a contract violation; fatal in debug builds.
fn report(violation: ContractViolation) -> ContractViolation {
    tracing::error!(%violation, "Future contract violated");
    if cfg!(debug_assertions) {
        panic!("future contract violated: {violation}");
    }
    violation
}

fn abandoned_error(kind: OperationKind) -> AuthError {
    AuthError::new(
        ErrorKind::InternalInconsistency,
        ErrorCode::Internal,
        format!("{kind} operation was abandoned before completing"),
    )
}

fn invalid_future_error(kind: OperationKind) -> AuthError {
    AuthError::new(
        ErrorKind::InternalInconsistency,
        ErrorCode::Internal,
        format!("no {kind} result is available"),
    )
}

struct Slot<T> {
    outcome: Option<Result<T, AuthError>>,
    callbacks: Vec<Callback<T>>,
    wakers: Vec<Waker>,
    signals: Vec<Arc<Semaphore>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            outcome: None,
            callbacks: Vec::new(),
            wakers: Vec::new(),
            signals: Vec::new(),
        }
    }
}

struct Entry {
    kind: OperationKind,
    status: FutureStatus,
    /// Live handles: the promise until it resolves, each `AuthFuture`, and
    /// the last-result slot for `kind`.
    refs: usize,
    slot: Box<dyn Any + Send>,
}

impl Entry {
    fn slot<T: 'static>(&self) -> Option<&Slot<T>> {
        self.slot.downcast_ref::<Slot<T>>()
    }

    fn slot_mut<T: 'static>(&mut self) -> Option<&mut Slot<T>> {
        self.slot.downcast_mut::<Slot<T>>()
    }
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<u64, Entry>,
    last_results: HashMap<OperationKind, u64>,
    /// Operations created but not yet through their callbacks.
    pending: usize,
    /// The token refresh currently in flight, shared by concurrent callers.
    token_refresh: Option<u64>,
    user: Option<User>,
}

impl RegistryState {
    fn insert<T: Send + 'static>(&mut self, kind: OperationKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            Entry {
                kind,
                status: FutureStatus::Pending,
                refs: 3,
                slot: Box::new(Slot::<T>::new()),
            },
        );
        if let Some(previous) = self.last_results.insert(kind, id) {
            self.release(previous);
        }
        self.pending += 1;
        id
    }

    /// Make an existing entry the last result of `kind` as well.
    fn record_last_result(&mut self, kind: OperationKind, id: u64) {
        if self.last_results.get(&kind) == Some(&id) {
            return;
        }
        self.retain(id);
        if let Some(previous) = self.last_results.insert(kind, id) {
            self.release(previous);
        }
    }

    fn retain(&mut self, id: u64) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.refs += 1;
        }
    }

    fn release(&mut self, id: u64) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            self.entries.remove(&id);
        }
    }
}

/// A token refresh request: either joined to one already running, or newly
/// started and owed a dispatch by the caller.
pub(crate) enum TokenRefresh {
    InFlight(AuthFuture<String>),
    Started(Promise<String>, AuthFuture<String>),
}

/// Per-session table of outstanding operations.
pub struct FutureRegistry {
    state: Mutex<RegistryState>,
    idle: Condvar,
}

impl fmt::Debug for FutureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FutureRegistry")
            .field("entries", &state.entries.len())
            .field("pending", &state.pending)
            .finish_non_exhaustive()
    }
}

impl Default for FutureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the pending count once an operation's callbacks have run,
/// even if one of them panicked.
struct PendingGuard<'a>(&'a FutureRegistry);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl FutureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            idle: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock_unpoisoned(&self.state)
    }

    /// Create a pending operation. The new entry becomes the last result of
    /// its kind.
    pub fn create<T: Clone + Send + 'static>(
        self: &Arc<Self>,
        kind: OperationKind,
    ) -> (Promise<T>, AuthFuture<T>) {
        let id = self.lock().insert::<T>(kind);
        (
            Promise::new(Arc::clone(self), id, kind),
            AuthFuture::new(Arc::clone(self), Some(id), kind),
        )
    }

    /// Join the token refresh in flight, or start a new one.
    pub(crate) fn begin_token_refresh(self: &Arc<Self>, kind: OperationKind) -> TokenRefresh {
        let mut state = self.lock();
        if let Some(id) = state.token_refresh
            && state
                .entries
                .get(&id)
                .is_some_and(|entry| entry.status == FutureStatus::Pending)
        {
            state.retain(id);
            state.record_last_result(kind, id);
            drop(state);
            tracing::debug!(operation = %kind, "Joining token refresh already in flight");
            return TokenRefresh::InFlight(AuthFuture::new(Arc::clone(self), Some(id), kind));
        }
        let id = state.insert::<String>(kind);
        state.token_refresh = Some(id);
        drop(state);
        TokenRefresh::Started(
            Promise::new(Arc::clone(self), id, kind),
            AuthFuture::new(Arc::clone(self), Some(id), kind),
        )
    }

    /// The most recent operation of `kind`, or an `Invalid` future if there
    /// is none with result type `T`.
    pub fn last_result<T: Clone + Send + 'static>(
        self: &Arc<Self>,
        kind: OperationKind,
    ) -> AuthFuture<T> {
        let mut state = self.lock();
        let id = state
            .last_results
            .get(&kind)
            .copied()
            .filter(|id| state.entries.get(id).is_some_and(|e| e.slot::<T>().is_some()));
        if let Some(id) = id {
            state.retain(id);
        }
        drop(state);
        AuthFuture::new(Arc::clone(self), id, kind)
    }

    fn resolve<T: Clone + Send + 'static>(
        &self,
        id: u64,
        kind: OperationKind,
        outcome: Result<T, AuthError>,
        status: FutureStatus,
    ) -> Result<(), ContractViolation> {
        let (completion, callbacks, wakers, signals) = {
            let mut state = self.lock();
            let Some(entry) = state.entries.get_mut(&id) else {
                return Err(ContractViolation::MissingEntry { kind });
            };
            if entry.status != FutureStatus::Pending {
                return Err(ContractViolation::AlreadyComplete { kind });
            }
            let Some(slot) = entry.slot.downcast_mut::<Slot<T>>() else {
                return Err(ContractViolation::MissingEntry { kind });
            };
            let completion = Completion {
                kind,
                status,
                result: outcome.clone(),
            };
            slot.outcome = Some(outcome);
            let callbacks = std::mem::take(&mut slot.callbacks);
            let wakers = std::mem::take(&mut slot.wakers);
            let signals = std::mem::take(&mut slot.signals);
            entry.status = status;
            if state.token_refresh == Some(id) {
                state.token_refresh = None;
            }
            (completion, callbacks, wakers, signals)
        };

        let _pending = PendingGuard(self);
        for callback in callbacks {
            callback(&completion);
        }
        for waker in wakers {
            waker.wake();
        }
        for signal in signals {
            signal.post();
        }
        Ok(())
    }

    fn release(&self, id: u64) {
        self.lock().release(id);
    }

    fn retain(&self, id: u64) {
        self.lock().retain(id);
    }

    fn status(&self, id: u64) -> FutureStatus {
        self.lock()
            .entries
            .get(&id)
            .map_or(FutureStatus::Invalid, |entry| entry.status)
    }

    fn outcome<T: Clone + 'static>(&self, id: u64) -> Option<Result<T, AuthError>> {
        let state = self.lock();
        state.entries.get(&id)?.slot::<T>()?.outcome.clone()
    }

    fn completion<T: Clone + 'static>(&self, id: u64) -> Option<Completion<T>> {
        let state = self.lock();
        let entry = state.entries.get(&id)?;
        let result = entry.slot::<T>()?.outcome.clone()?;
        Some(Completion {
            kind: entry.kind,
            status: entry.status,
            result,
        })
    }

    /// Queue `callback`, or hand it back if the operation already finished.
    fn add_callback<T: Clone + 'static>(
        &self,
        id: u64,
        callback: Callback<T>,
    ) -> Option<Callback<T>> {
        let mut state = self.lock();
        match state.entries.get_mut(&id) {
            Some(entry) if entry.status == FutureStatus::Pending => {
                if let Some(slot) = entry.slot_mut::<T>() {
                    slot.callbacks.push(callback);
                    return None;
                }
                Some(callback)
            }
            _ => Some(callback),
        }
    }

    /// Register `waker`, unless the operation already finished.
    fn poll_outcome<T: Clone + 'static>(
        &self,
        id: u64,
        waker: &Waker,
    ) -> Option<Result<T, AuthError>> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(&id)?;
        let pending = entry.status == FutureStatus::Pending;
        let slot = entry.slot_mut::<T>()?;
        if pending {
            if !slot.wakers.iter().any(|w| w.will_wake(waker)) {
                slot.wakers.push(waker.clone());
            }
            return None;
        }
        slot.outcome.clone()
    }

    /// Register a blocking waiter. `false` if the operation already finished.
    fn add_signal<T: 'static>(&self, id: u64, signal: &Arc<Semaphore>) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&id) else {
            return false;
        };
        if entry.status != FutureStatus::Pending {
            return false;
        }
        match entry.slot_mut::<T>() {
            Some(slot) => {
                slot.signals.push(Arc::clone(signal));
                true
            }
            None => false,
        }
    }

    /// Operations that have not yet finished running their callbacks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending
    }

    /// Block until no operation is pending.
    pub fn wait_idle(&self) {
        let mut state = self.lock();
        while state.pending > 0 {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_idle`](Self::wait_idle) with an upper bound. `true` if idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .idle
            .wait_timeout_while(state, timeout, |state| state.pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        state.pending == 0
    }

    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.lock().user.clone()
    }

    #[must_use]
    pub fn has_user(&self) -> bool {
        self.lock().user.is_some()
    }

    /// Run `f` against the current user with the registry mutex held.
    ///
    /// `f` must not call back into the registry or block.
    pub fn with_user<R>(&self, f: impl FnOnce(&mut Option<User>) -> R) -> R {
        f(&mut self.lock().user)
    }
}

/// Write side of one registry entry.
///
/// Dropping a promise that was never resolved marks its entry `Invalid`.
pub struct Promise<T: Clone + Send + 'static> {
    registry: Arc<FutureRegistry>,
    id: u64,
    kind: OperationKind,
    resolved: bool,
    _result: PhantomData<fn(T)>,
}

impl<T: Clone + Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    fn new(registry: Arc<FutureRegistry>, id: u64, kind: OperationKind) -> Self {
        Self {
            registry,
            id,
            kind,
            resolved: false,
            _result: PhantomData,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Another read handle onto this promise's entry.
    #[must_use]
    pub fn future(&self) -> AuthFuture<T> {
        self.registry.retain(self.id);
        AuthFuture::new(Arc::clone(&self.registry), Some(self.id), self.kind)
    }

    pub fn complete(&mut self, value: T) -> Result<(), ContractViolation> {
        self.resolve(Ok(value))
    }

    pub fn fail(&mut self, error: AuthError) -> Result<(), ContractViolation> {
        self.resolve(Err(error))
    }

    /// Complete or fail depending on `outcome`. Only the first call succeeds;
    /// later calls are contract violations (a panic in debug builds).
    pub fn resolve(&mut self, outcome: Result<T, AuthError>) -> Result<(), ContractViolation> {
        if self.resolved {
            return Err(report(ContractViolation::AlreadyComplete { kind: self.kind }));
        }
        self.resolved = true;
        let result = self
            .registry
            .resolve(self.id, self.kind, outcome, FutureStatus::Complete);
        self.registry.release(self.id);
        result.map_err(report)
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        tracing::warn!(operation = %self.kind, "Promise dropped without completing");
        let abandoned: Result<T, AuthError> = Err(abandoned_error(self.kind));
        if let Err(violation) =
            self.registry
                .resolve(self.id, self.kind, abandoned, FutureStatus::Invalid)
        {
            tracing::error!(%violation, "Failed to invalidate abandoned promise");
        }
        self.registry.release(self.id);
    }
}

/// Read handle onto an operation's eventual result.
///
/// Implements [`Future`], so it can be awaited on any executor; it can also
/// be polled with [`status`](Self::status), observed with
/// [`on_completion`](Self::on_completion), or blocked on with
/// [`wait`](Self::wait).
pub struct AuthFuture<T> {
    registry: Arc<FutureRegistry>,
    /// `None` for a future that never had an operation behind it.
    id: Option<u64>,
    kind: OperationKind,
    _result: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for AuthFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthFuture")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for AuthFuture<T> {
    fn clone(&self) -> Self {
        if let Some(id) = self.id {
            self.registry.retain(id);
        }
        Self {
            registry: Arc::clone(&self.registry),
            id: self.id,
            kind: self.kind,
            _result: PhantomData,
        }
    }
}

impl<T> Drop for AuthFuture<T> {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.registry.release(id);
        }
    }
}

impl<T> AuthFuture<T> {
    /// Takes ownership of one reference already counted for `id`.
    fn new(registry: Arc<FutureRegistry>, id: Option<u64>, kind: OperationKind) -> Self {
        Self {
            registry,
            id,
            kind,
            _result: PhantomData,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> FutureStatus {
        self.id
            .map_or(FutureStatus::Invalid, |id| self.registry.status(id))
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status() == FutureStatus::Pending
    }
}

impl<T: Clone + Send + 'static> AuthFuture<T> {
    /// The outcome, if the operation has finished.
    #[must_use]
    pub fn result(&self) -> Option<Result<T, AuthError>> {
        match self.id {
            Some(id) => self.registry.outcome::<T>(id),
            None => Some(Err(invalid_future_error(self.kind))),
        }
    }

    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.result().and_then(Result::ok)
    }

    #[must_use]
    pub fn error(&self) -> Option<AuthError> {
        self.result().and_then(Result::err)
    }

    /// Run `callback` once the operation finishes, on the completing thread.
    /// If it has already finished, `callback` runs now, on this thread.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&Completion<T>) + Send + 'static,
    {
        let Some(id) = self.id else {
            callback(&Completion {
                kind: self.kind,
                status: FutureStatus::Invalid,
                result: Err(invalid_future_error(self.kind)),
            });
            return;
        };
        let Some(callback) = self.registry.add_callback::<T>(id, Box::new(callback)) else {
            return;
        };
        let completion = self.registry.completion::<T>(id).unwrap_or(Completion {
            kind: self.kind,
            status: FutureStatus::Invalid,
            result: Err(invalid_future_error(self.kind)),
        });
        callback(&completion);
    }

    /// Block the calling thread until the operation finishes.
    ///
    /// Must not be called from an async task running on the engine's own
    /// runtime.
    pub fn wait(&self) -> Result<T, AuthError> {
        let Some(id) = self.id else {
            return Err(invalid_future_error(self.kind));
        };
        let signal = Arc::new(Semaphore::new(0));
        if self.registry.add_signal::<T>(id, &signal) {
            signal.wait();
        }
        self.registry
            .outcome::<T>(id)
            .unwrap_or_else(|| Err(invalid_future_error(self.kind)))
    }

    /// Block for at most `timeout`. `None` if still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, AuthError>> {
        let Some(id) = self.id else {
            return Some(Err(invalid_future_error(self.kind)));
        };
        let signal = Arc::new(Semaphore::new(0));
        if self.registry.add_signal::<T>(id, &signal) && !signal.wait_timeout(timeout) {
            return None;
        }
        self.registry.outcome::<T>(id)
    }
}

impl<T: Clone + Send + 'static> Future for AuthFuture<T> {
    type Output = Result<T, AuthError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(id) = self.id else {
            return Poll::Ready(Err(invalid_future_error(self.kind)));
        };
        match self.registry.poll_outcome::<T>(id, cx.waker()) {
            Some(outcome) => Poll::Ready(outcome),
            None if self.registry.status(id) == FutureStatus::Pending => Poll::Pending,
            None => Poll::Ready(Err(invalid_future_error(self.kind))),
        }
    }
}

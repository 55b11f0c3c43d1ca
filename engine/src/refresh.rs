//! Background id-token refresher.
//!
//! One OS thread per session. It sleeps on a wakeup semaphore until there is
//! both a signed-in user and at least one auto-refresh request, then forces a
//! token fetch whenever the last refresh is older than the refresh interval.
//!
//! `disable` only decrements the request count. The thread notices on its
//! next check and parks itself; nothing is interrupted mid-fetch.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use warden_types::{OperationKind, Secret, User};

use crate::auth::AuthShared;
use crate::sync::{Semaphore, lock_unpoisoned};

const THREAD_NAME: &str = "warden-token-refresh";

/// Where the refresher is in its scheduling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    /// No signed-in user or no auto-refresh request; parked until woken.
    WaitingForUser,
    CheckingFreshness,
    /// Blocked on a forced token fetch.
    Refreshing,
    /// Token is fresh; timed wait for the rest of the interval.
    WaitingForInterval,
    ShuttingDown,
}

impl fmt::Display for RefreshPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingForUser => "waiting_for_user",
            Self::CheckingFreshness => "checking_freshness",
            Self::Refreshing => "refreshing",
            Self::WaitingForInterval => "waiting_for_interval",
            Self::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Whether a token acquired at `last_refresh_ms` is due for a forced refresh.
#[must_use]
pub fn needs_refresh(now_ms: u64, last_refresh_ms: u64, interval: Duration) -> bool {
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_sub(last_refresh_ms) >= interval_ms
}

struct RefreshState {
    ref_count: u32,
    shutting_down: bool,
    phase: RefreshPhase,
    current_token: Option<Secret>,
    token_timestamp_ms: u64,
    /// Earliest time of the next forced refresh after a failed one.
    retry_not_before_ms: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Park,
    Refresh,
    Sleep(Duration),
    Exit,
}

impl RefreshState {
    fn next_step(&self, has_user: bool, now_ms: u64, interval: Duration) -> Step {
        if self.shutting_down {
            return Step::Exit;
        }
        if self.ref_count == 0 || !has_user {
            return Step::Park;
        }
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        let due_at = self.token_timestamp_ms.saturating_add(interval_ms);
        let not_before = due_at.max(self.retry_not_before_ms);
        if needs_refresh(now_ms, self.token_timestamp_ms, interval)
            && now_ms >= self.retry_not_before_ms
        {
            Step::Refresh
        } else {
            Step::Sleep(Duration::from_millis(not_before.saturating_sub(now_ms).max(1)))
        }
    }
}

pub(crate) struct TokenRefresher {
    state: Mutex<RefreshState>,
    wakeup: Semaphore,
    worker: Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
    retry_after_failure: Duration,
}

impl TokenRefresher {
    pub fn new(interval: Duration, retry_after_failure: Duration) -> Self {
        Self {
            state: Mutex::new(RefreshState {
                ref_count: 0,
                shutting_down: false,
                phase: RefreshPhase::WaitingForUser,
                current_token: None,
                token_timestamp_ms: 0,
                retry_not_before_ms: 0,
            }),
            wakeup: Semaphore::new(0),
            worker: Mutex::new(None),
            interval,
            retry_after_failure,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        lock_unpoisoned(&self.state)
    }

    pub fn start(&self, shared: Arc<AuthShared>) -> std::io::Result<()> {
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(&shared))?;
        *lock_unpoisoned(&self.worker) = Some(handle);
        Ok(())
    }

    /// Set the shutdown flag, wake the thread, and join it. A refresh already
    /// in flight is allowed to finish first.
    pub fn stop(&self) {
        self.lock().shutting_down = true;
        self.wakeup.post();
        let Some(handle) = lock_unpoisoned(&self.worker).take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            tracing::warn!("Token refresher asked to join itself; detaching");
            return;
        }
        if handle.join().is_err() {
            tracing::error!("Token refresh thread panicked");
        }
    }

    pub fn enable(&self) {
        let ref_count = {
            let mut state = self.lock();
            state.ref_count = state.ref_count.saturating_add(1);
            state.ref_count
        };
        tracing::debug!(ref_count, "Auto refresh enabled");
        self.wakeup.post();
    }

    /// Decrement only. The thread idles by itself once the count is zero.
    pub fn disable(&self) {
        let mut state = self.lock();
        if state.ref_count == 0 {
            drop(state);
            tracing::warn!("Auto refresh disabled more times than it was enabled");
            return;
        }
        state.ref_count -= 1;
        tracing::debug!(ref_count = state.ref_count, "Auto refresh disabled");
    }

    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.lock().ref_count
    }

    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.lock()
            .current_token
            .as_ref()
            .map(|token| token.expose().to_string())
    }

    /// Id-token listener body: track the token and wake the thread.
    pub fn observe_token(&self, user: Option<&User>, now_ms: u64) {
        {
            let mut state = self.lock();
            match user.filter(|user| !user.id_token.is_empty()) {
                Some(user) => {
                    if state.current_token.as_ref() != Some(&user.id_token) {
                        state.current_token = Some(user.id_token.clone());
                        state.token_timestamp_ms = now_ms;
                        state.retry_not_before_ms = 0;
                    }
                }
                None => {
                    state.current_token = None;
                    state.token_timestamp_ms = 0;
                }
            }
        }
        self.wakeup.post();
    }
}

fn run(shared: &Arc<AuthShared>) {
    let refresher = &shared.refresher;
    tracing::debug!("Token refresher started");
    loop {
        let step = {
            let mut state = refresher.lock();
            if !state.shutting_down {
                state.phase = RefreshPhase::CheckingFreshness;
            }
            // Lock order: refresher state, then the registry.
            let has_user = shared.registry.has_user();
            let step = state.next_step(has_user, shared.clock.now_millis(), refresher.interval);
            state.phase = match step {
                Step::Park => RefreshPhase::WaitingForUser,
                Step::Refresh => RefreshPhase::Refreshing,
                Step::Sleep(_) => RefreshPhase::WaitingForInterval,
                Step::Exit => RefreshPhase::ShuttingDown,
            };
            step
        };

        match step {
            Step::Exit => break,
            Step::Park => refresher.wakeup.wait(),
            Step::Sleep(remaining) => {
                tracing::trace!(?remaining, "Token fresh; sleeping");
                refresher.wakeup.wait_timeout(remaining);
            }
            Step::Refresh => {
                tracing::debug!("Forcing id token refresh");
                let outcome = shared
                    .get_token(true, OperationKind::GetTokenForRefresher)
                    .wait();
                let now_ms = shared.clock.now_millis();
                let mut state = refresher.lock();
                match outcome {
                    // The id-token listener records a stored token. A
                    // token for a user who is gone must not land here.
                    Ok(token) => {
                        state.retry_not_before_ms = 0;
                        if state
                            .current_token
                            .as_ref()
                            .is_some_and(|current| current.expose() == token)
                        {
                            state.token_timestamp_ms = now_ms;
                        }
                    }
                    Err(e) => {
                        let backoff = u64::try_from(refresher.retry_after_failure.as_millis())
                            .unwrap_or(u64::MAX);
                        state.retry_not_before_ms = now_ms.saturating_add(backoff);
                        drop(state);
                        tracing::warn!(%e, "Id token refresh failed; keeping current token");
                    }
                }
            }
        }
    }
    tracing::debug!("Token refresher stopped");
}

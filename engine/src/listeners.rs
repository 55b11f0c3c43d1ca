//! Auth-state and id-token listener sets.
//!
//! Notification snapshots the relevant set under the listener mutex and
//! invokes callbacks after releasing it. A callback may add or remove
//! listeners, but must not block on the session it is observing.

use std::sync::{Arc, Mutex, MutexGuard};

use warden_types::User;

use crate::future::FutureRegistry;
use crate::sync::lock_unpoisoned;

/// Notified when a user signs in or out.
pub trait AuthStateListener: Send + Sync {
    fn on_auth_state_changed(&self, user: Option<&User>);
}

/// Notified when the signed-in user's id token changes, including sign-in
/// and sign-out.
pub trait IdTokenListener: Send + Sync {
    fn on_id_token_changed(&self, user: Option<&User>);
}

impl<F> AuthStateListener for F
where
    F: Fn(Option<&User>) + Send + Sync,
{
    fn on_auth_state_changed(&self, user: Option<&User>) {
        self(user);
    }
}

impl<F> IdTokenListener for F
where
    F: Fn(Option<&User>) + Send + Sync,
{
    fn on_id_token_changed(&self, user: Option<&User>) {
        self(user);
    }
}

/// Which listener sets a user mutation should notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Notify {
    pub auth_state: bool,
    pub id_token: bool,
}

impl Notify {
    pub const NONE: Self = Self {
        auth_state: false,
        id_token: false,
    };
    pub const ID_TOKEN: Self = Self {
        auth_state: false,
        id_token: true,
    };
    pub const BOTH: Self = Self {
        auth_state: true,
        id_token: true,
    };
}

/// Listener identity is the allocation, not the vtable.
fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[derive(Default)]
struct ListenerSets {
    /// Set at teardown; no registration or notification after this.
    closed: bool,
    auth_state: Vec<Arc<dyn AuthStateListener>>,
    id_token: Vec<Arc<dyn IdTokenListener>>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    sets: Mutex<ListenerSets>,
}

impl ListenerRegistry {
    fn lock(&self) -> MutexGuard<'_, ListenerSets> {
        lock_unpoisoned(&self.sets)
    }

    /// Register `listener` and invoke it once with the current user.
    /// `false` if it is already registered or the session is closed.
    pub fn add_auth_state(
        &self,
        registry: &FutureRegistry,
        listener: Arc<dyn AuthStateListener>,
    ) -> bool {
        let user = {
            let mut sets = self.lock();
            if sets.closed {
                return false;
            }
            if sets.auth_state.iter().any(|l| same_listener(l, &listener)) {
                tracing::warn!("Auth state listener registered twice; ignoring");
                return false;
            }
            sets.auth_state.push(Arc::clone(&listener));
            registry.current_user()
        };
        listener.on_auth_state_changed(user.as_ref());
        true
    }

    pub fn add_id_token(
        &self,
        registry: &FutureRegistry,
        listener: Arc<dyn IdTokenListener>,
    ) -> bool {
        let user = {
            let mut sets = self.lock();
            if sets.closed {
                return false;
            }
            if sets.id_token.iter().any(|l| same_listener(l, &listener)) {
                tracing::warn!("Id token listener registered twice; ignoring");
                return false;
            }
            sets.id_token.push(Arc::clone(&listener));
            registry.current_user()
        };
        listener.on_id_token_changed(user.as_ref());
        true
    }

    pub fn remove_auth_state(&self, listener: &Arc<dyn AuthStateListener>) -> bool {
        let mut sets = self.lock();
        let before = sets.auth_state.len();
        sets.auth_state.retain(|l| !same_listener(l, listener));
        sets.auth_state.len() != before
    }

    pub fn remove_id_token(&self, listener: &Arc<dyn IdTokenListener>) -> bool {
        let mut sets = self.lock();
        let before = sets.id_token.len();
        sets.id_token.retain(|l| !same_listener(l, listener));
        sets.id_token.len() != before
    }

    /// Mutate the current user and notify listeners of the result.
    ///
    /// Takes the listener mutex, then the registry mutex, so user changes
    /// and the listener snapshots taken for them are ordered consistently.
    pub fn update_user<R>(
        &self,
        registry: &FutureRegistry,
        mutate: impl FnOnce(&mut Option<User>) -> (Notify, R),
    ) -> R {
        let (user, auth_state, id_token, out) = {
            let sets = self.lock();
            let (notify, out, user) = registry.with_user(|slot| {
                let (notify, out) = mutate(slot);
                (notify, out, slot.clone())
            });
            if sets.closed || notify == Notify::NONE {
                return out;
            }
            let auth_state = if notify.auth_state {
                sets.auth_state.clone()
            } else {
                Vec::new()
            };
            let id_token = if notify.id_token {
                sets.id_token.clone()
            } else {
                Vec::new()
            };
            (user, auth_state, id_token, out)
        };

        for listener in &auth_state {
            listener.on_auth_state_changed(user.as_ref());
        }
        for listener in &id_token {
            listener.on_id_token_changed(user.as_ref());
        }
        out
    }

    /// Clear both sets and refuse further use.
    pub fn close(&self) {
        let mut sets = self.lock();
        sets.closed = true;
        let cleared = sets.auth_state.len() + sets.id_token.len();
        sets.auth_state.clear();
        sets.id_token.clear();
        tracing::debug!(cleared, "Listener sets cleared");
    }

    #[cfg(test)]
    pub fn counts(&self) -> (usize, usize) {
        let sets = self.lock();
        (sets.auth_state.len(), sets.id_token.len())
    }
}

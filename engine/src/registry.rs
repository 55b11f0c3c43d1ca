//! Named entry points exposed to the surrounding application.
//!
//! Other components (a database client, a storage client) reach the auth
//! session only through these functions, never through the session type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::sync::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionId {
    /// Writes the cached id token into the output slot.
    AuthGetCurrentToken,
    /// Adds one auto-refresh request.
    AuthStartTokenListener,
    /// Removes one auto-refresh request.
    AuthStopTokenListener,
}

impl FunctionId {
    pub const ALL: [Self; 3] = [
        Self::AuthGetCurrentToken,
        Self::AuthStartTokenListener,
        Self::AuthStopTokenListener,
    ];
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthGetCurrentToken => "auth_get_current_token",
            Self::AuthStartTokenListener => "auth_start_token_listener",
            Self::AuthStopTokenListener => "auth_stop_token_listener",
        };
        f.write_str(name)
    }
}

type RegisteredFunction = Arc<dyn Fn(Option<&mut String>) -> bool + Send + Sync>;

#[derive(Default)]
pub struct FunctionRegistry {
    functions: Mutex<HashMap<FunctionId, RegisteredFunction>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let functions = lock_unpoisoned(&self.functions);
        f.debug_struct("FunctionRegistry")
            .field("registered", &functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `function` to `id`. `false` if `id` is already bound.
    pub fn register<F>(&self, id: FunctionId, function: F) -> bool
    where
        F: Fn(Option<&mut String>) -> bool + Send + Sync + 'static,
    {
        let mut functions = lock_unpoisoned(&self.functions);
        if functions.contains_key(&id) {
            tracing::warn!(function = %id, "Function already registered");
            return false;
        }
        functions.insert(id, Arc::new(function));
        true
    }

    pub fn unregister(&self, id: FunctionId) -> bool {
        lock_unpoisoned(&self.functions).remove(&id).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, id: FunctionId) -> bool {
        lock_unpoisoned(&self.functions).contains_key(&id)
    }

    /// Invoke `id`. `false` if nothing is registered or the function failed.
    pub fn call(&self, id: FunctionId, out: Option<&mut String>) -> bool {
        let function = lock_unpoisoned(&self.functions).get(&id).cloned();
        match function {
            Some(function) => function(out),
            None => false,
        }
    }
}

//! Hands RPCs to the session runtime and routes their outcome into a promise.

use std::sync::Arc;

use warden_rpc::RpcRequest;
use warden_types::AuthError;

use crate::auth::AuthShared;
use crate::future::Promise;

/// Run `request` on the session runtime and resolve `promise` through
/// `handler`.
///
/// Returns as soon as the task is queued. The transport is invoked exactly
/// once; `handler` is the only place the outcome is translated, so every
/// transport and parse failure reaches the promise as an [`AuthError`].
pub(crate) fn call_async<R, T, H>(
    shared: &Arc<AuthShared>,
    promise: Promise<T>,
    request: R,
    handler: H,
) where
    R: RpcRequest + 'static,
    T: Clone + Send + 'static,
    H: FnOnce(&AuthShared, Result<R::Response, AuthError>) -> Result<T, AuthError>
        + Send
        + 'static,
{
    let kind = promise.kind();
    tracing::debug!(operation = %kind, endpoint = %R::ENDPOINT, "Dispatching backend call");
    let task_shared = Arc::clone(shared);
    shared.runtime.spawn(async move {
        let mut promise = promise;
        let response = warden_rpc::execute(
            task_shared.transport.as_ref(),
            &task_shared.endpoints,
            &task_shared.api_key,
            &request,
        )
        .await;
        let outcome = handler(&task_shared, response);
        if let Err(e) = &outcome {
            tracing::debug!(operation = %kind, %e, "Operation failed");
        }
        // A violation is already logged by the promise.
        let _ = promise.resolve(outcome);
    });
}

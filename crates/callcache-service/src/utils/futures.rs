use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use sentry::{Hub, SentryFutureExt};
use tokio::task::JoinHandle;

/// Execute a callback on dropping of the container type.
///
/// The callback must not panic under any circumstance. Since it is called while dropping an item,
/// this might result in aborting program execution.
pub struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    /// Creates a new `CallOnDrop`.
    pub fn new<F: FnOnce() + Send + 'static>(f: F) -> CallOnDrop {
        CallOnDrop {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// Spawns a fallible background task that never takes the process down.
///
/// Errors returned by the future are logged, and so are panics raised while polling it. The task
/// runs with a fresh sentry [`Hub`] forked from the current one.
///
/// The returned handle resolves to `true` if the future completed with `Ok`.
pub fn spawn_guarded<F, E>(name: &'static str, future: F) -> JoinHandle<bool>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let task = async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::error!(task = name, "Background task failed: {err}");
                false
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "<non-string panic payload>".to_owned());
                tracing::error!(task = name, "Recovered from panic in background task: {message}");
                false
            }
        }
    };

    tokio::spawn(task.bind_hub(Hub::new_from_top(Hub::current())))
}

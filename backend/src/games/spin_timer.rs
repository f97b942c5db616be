use std::future::Future;
use std::time::Duration;

use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Fires a callback once the wheel has had time to stop. Dropping the timer
/// (for example together with the session that owns it) cancels the callback.
pub struct SpinTimer {
    _guard: DropGuard,
}

impl SpinTimer {
    pub fn schedule<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {
                    debug!("Spin timer cancelled before firing");
                }
                _ = tokio::time::sleep(delay) => {
                    on_fire().await;
                }
            }
        });

        Self { _guard: token.drop_guard() }
    }

    /// Cancels the pending callback by dropping the guard.
    pub fn cancel(self) {
        drop(self);
    }
}

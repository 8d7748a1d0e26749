use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a live change-feed subscription.
///
/// Cancelling (or dropping) the handle stops delivery: the feed task checks
/// the token before every callback, so no event or error is reported once
/// [`Subscription::cancel`] has returned, apart from a callback that was
/// already running.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    #[must_use]
    pub fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            token,
            task: Some(task),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels and waits for the feed task to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "change feed task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

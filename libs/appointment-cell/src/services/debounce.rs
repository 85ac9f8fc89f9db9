use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to one scheduled run. Resolves to `None` if a newer schedule (or
/// the owning session going away) cancelled it.
pub type Pending<T> = JoinHandle<Option<T>>;

/// Last-input-wins delay in front of an async check.
///
/// Each [`Debouncer::schedule`] cancels whatever was scheduled before it,
/// including a run already past its delay and still awaiting I/O.
pub struct Debouncer {
    delay: Duration,
    current: Option<CancellationToken>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, current: None }
    }

    pub fn schedule<F>(&mut self, work: F) -> Pending<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.cancel();

        let token = CancellationToken::new();
        self.current = Some(token.clone());
        let delay = self.delay;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Debounced check superseded");
                    None
                }
                output = async move {
                    tokio::time::sleep(delay).await;
                    work.await
                } => Some(output),
            }
        })
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

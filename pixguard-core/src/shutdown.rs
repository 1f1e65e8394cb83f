use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Abstraction over a handle that can be queried for completion and aborted.
pub trait Abortable {
    /// Abort the underlying task if it is still running.
    fn abort(&mut self);
    /// Return `true` if the underlying task has completed.
    fn is_finished(&self) -> bool;
}

impl Abortable for JoinHandle<()> {
    fn abort(&mut self) {
        // JoinHandle::abort takes &self
        Self::abort(self);
    }

    fn is_finished(&self) -> bool {
        Self::is_finished(self)
    }
}

/// Abstraction over a one-shot stop signal.
pub trait Stoppable {
    /// Send a best-effort stop signal to request graceful shutdown.
    fn send(self);
}

impl Stoppable for ShutdownSignal {
    fn send(self) {
        self.trigger();
    }
}

/// Drop-time logic for worker groups:
/// - send a best-effort stop signal if present
/// - abort every task that hasn't finished yet
pub fn drop_impl<H, S>(handles: &mut Vec<H>, stop_tx: &mut Option<S>)
where
    H: Abortable,
    S: Stoppable,
{
    if let Some(tx) = stop_tx.take() {
        tx.send();
    }
    for mut h in handles.drain(..) {
        if !h.is_finished() {
            h.abort();
        }
    }
}

/// Owning side of a shared cancellation signal.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// New, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Token observing this signal.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// True once `trigger` has been called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable cancellation token.
///
/// A token whose [`ShutdownSignal`] has been dropped counts as cancelled.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

impl Shutdown {
    /// Token that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self { rx: None }
    }

    /// Non-blocking check.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx
            .as_ref()
            .is_some_and(|rx| *rx.borrow() || rx.has_changed().is_err())
    }

    /// Resolve once the signal fires.
    pub async fn cancelled(&self) {
        match &self.rx {
            None => std::future::pending::<()>().await,
            Some(rx) => {
                let mut rx = rx.clone();
                // Err means the sender is gone, which also counts as shutdown.
                let _ = rx.wait_for(|stopped| *stopped).await;
            }
        }
    }
}

/// A set of background tasks stopped together.
///
/// `stop` fires the signal and waits for every task; dropping the group fires
/// the signal and aborts tasks that are still running.
#[derive(Debug)]
pub struct WorkerGroup {
    signal: Option<ShutdownSignal>,
    token: Shutdown,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Empty group with its own signal.
    #[must_use]
    pub fn new() -> Self {
        let signal = ShutdownSignal::new();
        let token = signal.subscribe();
        Self {
            signal: Some(signal),
            token,
            handles: Vec::new(),
        }
    }

    /// Token for tasks spawned into this group.
    #[must_use]
    pub fn token(&self) -> Shutdown {
        self.token.clone()
    }

    /// Spawn a task on the current runtime and track it.
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(fut));
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no task is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Fire the signal and wait for every task to return.
    pub async fn stop(mut self) {
        if let Some(signal) = self.signal.take() {
            signal.trigger();
        }
        for handle in std::mem::take(&mut self.handles) {
            if let Err(_err) = handle.await {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "worker task ended abnormally");
            }
        }
    }
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        drop_impl(&mut self.handles, &mut self.signal);
    }
}

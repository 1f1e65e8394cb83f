//! Per-host request pacing.
//!
//! Every host key gets its own bounded FIFO queue drained by a dedicated worker
//! that dispatches at most one queued unit of work per tick. Hosts are created
//! lazily on first use and live until [`RateLimiter::close`] (or until the last
//! clone of the limiter is dropped).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pixguard_core::{Shutdown, ShutdownSignal};
use pixguard_types::{PixguardError, RateLimitConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A queued unit of work with its result channel, erased over its output type.
trait Dispatch: Send {
    /// False once the caller cancelled or stopped waiting.
    fn is_live(&self) -> bool;
    /// Run the work and deliver its result.
    fn dispatch(self: Box<Self>) -> BoxFuture;
    /// Deliver `err` without running the work.
    fn reject(self: Box<Self>, err: PixguardError);
}

struct Request<T, F> {
    work: F,
    tx: oneshot::Sender<Result<T, PixguardError>>,
    cancel: Shutdown,
}

impl<T, F, Fut> Dispatch for Request<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, PixguardError>> + Send + 'static,
{
    fn is_live(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }

    fn dispatch(self: Box<Self>) -> BoxFuture {
        let Self { work, tx, .. } = *self;
        Box::pin(async move {
            let out = work().await;
            let _ = tx.send(out);
        })
    }

    fn reject(self: Box<Self>, err: PixguardError) {
        let _ = self.tx.send(Err(err));
    }
}

type Queue = mpsc::Sender<Box<dyn Dispatch>>;

struct Inner {
    cfg: RateLimitConfig,
    hosts: Mutex<HashMap<String, Queue>>,
    signal: ShutdownSignal,
}

/// Host-scoped rate limiter. Cheap to clone; clones share queues and workers.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("cfg", &self.inner.cfg)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter; no worker runs until the first request for a host.
    #[must_use]
    pub fn new(cfg: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                hosts: Mutex::new(HashMap::new()),
                signal: ShutdownSignal::new(),
            }),
        }
    }

    /// Configured pacing.
    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.inner.cfg
    }

    /// Run `work` once the host's next dispatch slot comes up.
    ///
    /// Enqueueing waits while the host queue is full. If `cancel` fires first,
    /// `Cancelled` is returned and the work never runs. Work whose caller has
    /// gone away by the time it is dequeued is skipped without using a slot.
    ///
    /// # Errors
    /// Returns `Cancelled`, `LimiterClosed`, or whatever `work` returns.
    pub async fn execute<T, F, Fut>(
        &self,
        cancel: &Shutdown,
        host: &str,
        work: F,
    ) -> Result<T, PixguardError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, PixguardError>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(PixguardError::Cancelled);
        }
        let queue = self.queue_for(host)?;
        let (tx, rx) = oneshot::channel();
        let req: Box<dyn Dispatch> = Box::new(Request {
            work,
            tx,
            cancel: cancel.clone(),
        });

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PixguardError::Cancelled),
            sent = queue.send(req) => sent.map_err(|_| PixguardError::LimiterClosed)?,
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PixguardError::Cancelled),
            out = rx => out.unwrap_or(Err(PixguardError::LimiterClosed)),
        }
    }

    /// Requests currently waiting in `host`'s queue.
    #[must_use]
    pub fn queued(&self, host: &str) -> usize {
        let hosts = self
            .inner
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        hosts
            .get(host)
            .map_or(0, |q| q.max_capacity() - q.capacity())
    }

    /// Stop every host worker. Queued and future requests fail with `LimiterClosed`.
    pub fn close(&self) {
        self.inner.signal.trigger();
        self.inner
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// True after [`RateLimiter::close`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.signal.is_triggered()
    }

    fn queue_for(&self, host: &str) -> Result<Queue, PixguardError> {
        let mut hosts = self
            .inner
            .hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.signal.is_triggered() {
            return Err(PixguardError::LimiterClosed);
        }
        if let Some(q) = hosts.get(host) {
            return Ok(q.clone());
        }
        let (tx, rx) = mpsc::channel(self.inner.cfg.queue_capacity.max(1));
        let stop = self.inner.signal.subscribe();
        tokio::spawn(run_host(
            host.to_owned(),
            rx,
            self.inner.cfg.interval(),
            stop,
        ));
        hosts.insert(host.to_owned(), tx.clone());
        Ok(tx)
    }
}

async fn run_host(
    host: String,
    mut rx: mpsc::Receiver<Box<dyn Dispatch>>,
    every: Duration,
    stop: Shutdown,
) {
    #[cfg(feature = "tracing")]
    tracing::debug!(host = %host, interval_ms = every.as_millis(), "rate limiter worker started");
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let req = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            next = rx.recv() => match next {
                Some(req) => req,
                None => break,
            },
        };
        if !req.is_live() {
            req.reject(PixguardError::Cancelled);
            continue;
        }
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                req.reject(PixguardError::LimiterClosed);
                break;
            }
            _ = ticker.tick() => {}
        }
        if !req.is_live() {
            req.reject(PixguardError::Cancelled);
            continue;
        }
        tokio::spawn(req.dispatch());
    }

    rx.close();
    while let Ok(req) = rx.try_recv() {
        req.reject(PixguardError::LimiterClosed);
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(host = %host, "rate limiter worker stopped");
    #[cfg(not(feature = "tracing"))]
    let _ = host;
}

//! Trailing-edge debouncing of sync or async functions.
//!
//! A burst of calls that arrive less than `delay` apart collapses into a single
//! execution with the arguments of the last call. Every call gets its own
//! future back; only the future of the call that actually runs ever settles
//! with the function's result.

use crate::config::{AbandonPolicy, DebounceConfig};
use crate::error::{DebounceError, Error};
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use futures::{Future, FutureExt};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type BoxedFn<A, R, E> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<R, E>> + Send + Sync>;
type Reply<R, E> = oneshot::Sender<Result<R, DebounceError<E>>>;

/// The single call waiting for its timer
struct PendingInvocation<A, R, E> {
    generation: u64,
    args: A,
    reply: Reply<R, E>,
    timer: JoinHandle<()>,
}

struct State<A, R, E> {
    pending: Option<PendingInvocation<A, R, E>>,
    generation: u64,
    stats: DebounceStats,
}

struct Inner<A, R, E> {
    func: BoxedFn<A, R, E>,
    config: DebounceConfig,
    runtime: Handle,
    state: Mutex<State<A, R, E>>,
}

/// Debouncer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceStats {
    pub calls: u64,
    pub superseded: u64,
    pub cancelled: u64,
    pub executed: u64,
    pub pending: bool,
    pub last_call_at: Option<DateTime<Utc>>,
}

/// A debounced function.
///
/// Cloning is cheap and every clone shares the same pending invocation.
pub struct Debouncer<A, R, E> {
    inner: Arc<Inner<A, R, E>>,
}

impl<A, R, E> Clone for Debouncer<A, R, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Create a debounced version of `func` together with its teardown handle
pub fn debounce<A, R, E, F, Fut>(
    func: F,
    delay: Duration,
) -> Result<(Debouncer<A, R, E>, CancelHandle), Error>
where
    A: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let debouncer = Debouncer::new(func, delay)?;
    let cancel = debouncer.cancel_handle();
    Ok((debouncer, cancel))
}

impl<A, R, E> Debouncer<A, R, E>
where
    A: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    /// Debounce an async function
    pub fn new<F, Fut>(func: F, delay: Duration) -> Result<Self, Error>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        Self::with_config(func, DebounceConfig::new(delay))
    }

    /// Debounce a plain function
    pub fn from_fn<F>(func: F, delay: Duration) -> Result<Self, Error>
    where
        F: Fn(A) -> Result<R, E> + Send + Sync + 'static,
    {
        Self::new(move |args| future::ready(func(args)), delay)
    }

    /// Debounce an async function with a full configuration.
    ///
    /// Must be called from within a Tokio runtime; the timers are spawned on it.
    pub fn with_config<F, Fut>(func: F, config: DebounceConfig) -> Result<Self, Error>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime("debounce"))?;
        let func: BoxedFn<A, R, E> = Arc::new(move |args: A| func(args).boxed());

        Ok(Self {
            inner: Arc::new(Inner {
                func,
                config,
                runtime,
                state: Mutex::new(State {
                    pending: None,
                    generation: 0,
                    stats: DebounceStats::default(),
                }),
            }),
        })
    }

    /// Schedule `func(args)` after the configured delay, superseding any
    /// call still waiting.
    pub fn call(&self, args: A) -> DebouncedCall<R, E> {
        let (reply, receiver) = oneshot::channel();
        let deadline = Instant::now() + self.inner.config.delay();

        let mut state = self.inner.lock();
        state.generation += 1;
        let generation = state.generation;
        state.stats.calls += 1;
        state.stats.last_call_at = Some(Utc::now());

        if let Some(previous) = state.pending.take() {
            previous.timer.abort();
            state.stats.superseded += 1;
            log::debug!(
                "Debounced call {} superseded by call {}",
                previous.generation,
                generation
            );
        }

        let inner = Arc::clone(&self.inner);
        let timer = self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            inner.fire(generation).await;
        });

        state.pending = Some(PendingInvocation {
            generation,
            args,
            reply,
            timer,
        });

        DebouncedCall::new(receiver, self.inner.config.abandon)
    }

    /// Drop the pending invocation, if any. Its future is abandoned.
    pub fn cancel(&self) -> bool {
        self.inner.cancel_pending()
    }

    /// Run the pending invocation now instead of waiting for its timer
    pub fn flush(&self) -> bool {
        let pending = {
            let mut state = self.inner.lock();
            let pending = state.pending.take();
            if pending.is_some() {
                state.stats.executed += 1;
            }
            pending
        };

        match pending {
            Some(pending) => {
                pending.timer.abort();
                log::debug!("Flushing debounced call {}", pending.generation);
                let inner = Arc::clone(&self.inner);
                self.inner
                    .runtime
                    .spawn(async move { inner.execute(pending.args, pending.reply).await });
                true
            }
            None => false,
        }
    }

    /// Whether a call is waiting for its timer
    pub fn is_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.inner.config.delay()
    }

    pub fn stats(&self) -> DebounceStats {
        let state = self.inner.lock();
        DebounceStats {
            pending: state.pending.is_some(),
            ..state.stats.clone()
        }
    }

    /// A type-erased handle that can tear this debouncer down
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            inner: self.inner.clone(),
        }
    }
}

impl<A, R, E> Inner<A, R, E> {
    fn lock(&self) -> MutexGuard<'_, State<A, R, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending(&self) -> bool {
        let pending = {
            let mut state = self.lock();
            let pending = state.pending.take();
            if pending.is_some() {
                state.stats.cancelled += 1;
            }
            pending
        };

        match pending {
            Some(pending) => {
                pending.timer.abort();
                log::debug!("Cancelled debounced call {}", pending.generation);
                true
            }
            None => false,
        }
    }

    async fn fire(&self, generation: u64) {
        let pending = {
            let mut state = self.lock();
            let current = state
                .pending
                .as_ref()
                .is_some_and(|pending| pending.generation == generation);
            if current {
                state.stats.executed += 1;
                state.pending.take()
            } else {
                None
            }
        };

        match pending {
            Some(pending) => self.execute(pending.args, pending.reply).await,
            None => log::trace!("Timer for debounced call {} is stale", generation),
        }
    }

    async fn execute(&self, args: A, reply: Reply<R, E>) {
        let func = Arc::clone(&self.func);
        let outcome = AssertUnwindSafe(async move { func(args).await })
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(DebounceError::Call(error)),
            Err(_) => {
                log::warn!("Debounced function panicked");
                Err(DebounceError::Panicked)
            }
        };

        if reply.send(result).is_err() {
            log::trace!("Caller dropped its debounced future before it settled");
        }
    }
}

trait Teardown: Send + Sync {
    fn cancel(&self) -> bool;
}

impl<A, R, E> Teardown for Inner<A, R, E>
where
    A: Send,
    R: Send,
    E: Send,
{
    fn cancel(&self) -> bool {
        self.cancel_pending()
    }
}

/// Tears down a debouncer without knowing its argument or result types
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<dyn Teardown>,
}

impl CancelHandle {
    /// Clear the pending timer. Returns whether a call was pending.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

/// Future returned by [`Debouncer::call`].
///
/// Under [`AbandonPolicy::Silent`] a superseded or cancelled call stays
/// pending forever; callers that cannot tolerate that should wrap it in
/// `tokio::time::timeout`.
#[must_use = "futures do nothing unless polled"]
pub struct DebouncedCall<R, E> {
    receiver: oneshot::Receiver<Result<R, DebounceError<E>>>,
    abandon: AbandonPolicy,
    abandoned: bool,
}

impl<R, E> DebouncedCall<R, E> {
    fn new(receiver: oneshot::Receiver<Result<R, DebounceError<E>>>, abandon: AbandonPolicy) -> Self {
        Self {
            receiver,
            abandon,
            abandoned: false,
        }
    }
}

impl<R, E> Future for DebouncedCall<R, E> {
    type Output = Result<R, DebounceError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.abandoned {
            return Poll::Pending;
        }

        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without a reply: superseded, cancelled or the runtime went away
            Poll::Ready(Err(_)) => match self.abandon {
                AbandonPolicy::Reject => Poll::Ready(Err(DebounceError::Abandoned)),
                AbandonPolicy::Silent => {
                    self.abandoned = true;
                    Poll::Pending
                }
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

//! Request lifecycle state and per-surface stream ownership.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

// ─── OperationState ──────────────────────────────────────────────────────────

/// Lifecycle of one asynchronous operation as a presentation layer sees it.
///
/// A single enum instead of separate loading/error/data flags, so the
/// impossible combinations cannot be represented.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationState<T> {
    Idle,
    InFlight,
    Settled(Result<T, String>),
}

impl<T> Default for OperationState<T> {
    fn default() -> Self {
        OperationState::Idle
    }
}

impl<T> OperationState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, OperationState::InFlight)
    }

    /// The value of the last successful run.
    pub fn data(&self) -> Option<&T> {
        match self {
            OperationState::Settled(Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// The message of the last failed run.
    pub fn error(&self) -> Option<&str> {
        match self {
            OperationState::Settled(Err(message)) => Some(message),
            _ => None,
        }
    }
}

// ─── Operation ───────────────────────────────────────────────────────────────

/// Publishes the [`OperationState`] of a repeatable operation over a watch
/// channel. Subscribers always see the latest state.
#[derive(Debug)]
pub struct Operation<T> {
    tx: watch::Sender<OperationState<T>>,
}

impl<T> Default for Operation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Operation<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(OperationState::Idle);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<OperationState<T>> {
        self.tx.subscribe()
    }

    /// Back to `Idle`, dropping the last outcome.
    pub fn reset(&self) {
        self.tx.send_replace(OperationState::Idle);
    }
}

impl<T: Clone> Operation<T> {
    /// Snapshot of the current state.
    pub fn state(&self) -> OperationState<T> {
        self.tx.borrow().clone()
    }

    /// Drive `fut` to completion, publishing `InFlight` then `Settled`.
    /// The original outcome is handed back unchanged.
    pub async fn run<F, E>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if_current(fut, || true).await
    }

    /// Like [`run`](Self::run), but the outcome is only published while
    /// `is_current` holds. A call that has been replaced by a newer one
    /// returns its result without touching the state the newer call owns.
    pub async fn run_if_current<F, E, C>(&self, fut: F, is_current: C) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
        C: Fn() -> bool,
    {
        self.tx.send_replace(OperationState::InFlight);
        let result = fut.await;
        if !is_current() {
            tracing::debug!("discarding outcome of a replaced operation");
            return result;
        }
        let settled = match &result {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(e.to_string()),
        };
        self.tx.send_replace(OperationState::Settled(settled));
        result
    }
}

// ─── StreamSite ──────────────────────────────────────────────────────────────

/// Handle on one stream started through a [`StreamSite`].
#[derive(Debug, Clone)]
pub struct StreamTicket {
    token: CancellationToken,
    generation: u64,
}

impl StreamTicket {
    /// Token to hand to the streaming call.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Default)]
struct SiteSlot {
    token: Option<CancellationToken>,
    generation: u64,
}

/// One UI surface that shows at most one streamed call at a time.
///
/// Starting a new stream cancels the previous one, so a superseded stream
/// stops delivering frames. Each start bumps a generation counter; only the
/// ticket from the latest start is current. Stopping cancels without
/// starting anything new, so the stopped ticket stays current.
#[derive(Debug, Default)]
pub struct StreamSite {
    current: Mutex<SiteSlot>,
}

impl StreamSite {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, SiteSlot> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel whatever is in flight and hand out the ticket for a new stream.
    pub fn begin(&self) -> StreamTicket {
        let mut slot = self.slot();
        if let Some(previous) = slot.token.take() {
            tracing::debug!(generation = slot.generation, "superseding in-flight stream");
            previous.cancel();
        }
        slot.generation += 1;
        let token = CancellationToken::new();
        slot.token = Some(token.clone());
        StreamTicket {
            token,
            generation: slot.generation,
        }
    }

    /// Cancel the in-flight stream, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.slot().token.take() {
            token.cancel();
        }
    }

    /// Whether no stream has been started since `ticket` was handed out.
    pub fn is_current(&self, ticket: &StreamTicket) -> bool {
        self.slot().generation == ticket.generation
    }

    pub fn is_active(&self) -> bool {
        self.slot().token.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

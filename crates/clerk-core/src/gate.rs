//! Single-slot rendezvous between the worker and the boundary.
//!
//! The worker deposits a request and waits; the boundary deposits exactly
//! one reply and wakes it. One slot per gate: opening a new request
//! supersedes any request still outstanding. The gate knows nothing about
//! session state; announcing the request is the caller's job.

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Gate error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("Gate cancelled")]
    Cancelled,
    #[error("Request superseded by a newer request")]
    Superseded,
}

struct Slot<Q, R> {
    generation: u64,
    request: Option<Q>,
    reply: Option<oneshot::Sender<R>>,
}

/// Single-slot rendezvous, generic over request and reply payloads.
pub struct Gate<Q, R> {
    name: &'static str,
    slot: Mutex<Slot<Q, R>>,
    cancel: CancellationToken,
}

impl<Q, R> Gate<Q, R> {
    /// Create a gate whose waiters give up once `cancel` fires.
    #[must_use]
    pub const fn new(name: &'static str, cancel: CancellationToken) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot {
                generation: 0,
                request: None,
                reply: None,
            }),
            cancel,
        }
    }

    /// Gate name, used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, Slot<Q, R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deposit a request and return a waiter for its reply.
    ///
    /// Any reply state from an earlier request is discarded first.
    pub fn open(&self, request: Q) -> Waiter<'_, Q, R> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.lock();
        if slot.reply.is_some() {
            tracing::warn!(gate = self.name, "superseding outstanding request");
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.request = Some(request);
        slot.reply = Some(tx);
        Waiter {
            gate: self,
            generation: slot.generation,
            rx,
        }
    }

    /// Deliver a reply to the outstanding request.
    ///
    /// Returns `false` when nothing was waiting; the value is dropped.
    pub fn reply(&self, value: R) -> bool {
        let sender = self.lock().reply.take();
        let delivered = sender.is_some_and(|tx| tx.send(value).is_ok());
        if !delivered {
            tracing::debug!(gate = self.name, "reply discarded, no outstanding request");
        }
        delivered
    }

    /// Whether a request is waiting for its reply.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock().reply.is_some()
    }

    /// Copy of the outstanding request, if any.
    #[must_use]
    pub fn pending(&self) -> Option<Q>
    where
        Q: Clone,
    {
        self.lock().request.clone()
    }
}

/// Handle on one outstanding request.
///
/// Dropping it clears the slot unless a newer request already took it over.
pub struct Waiter<'a, Q, R> {
    gate: &'a Gate<Q, R>,
    generation: u64,
    rx: oneshot::Receiver<R>,
}

impl<Q, R> Waiter<'_, Q, R> {
    /// Block until the reply arrives or the gate is cancelled.
    ///
    /// # Errors
    /// Returns [`GateError::Cancelled`] on cancellation and
    /// [`GateError::Superseded`] if a newer request replaced this one.
    pub async fn wait(mut self) -> Result<R, GateError> {
        let cancel = self.gate.cancel.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(GateError::Cancelled),
            reply = &mut self.rx => reply.map_err(|_| GateError::Superseded),
        }
    }
}

impl<Q, R> Drop for Waiter<'_, Q, R> {
    fn drop(&mut self) {
        let mut slot = self.gate.lock();
        if slot.generation == self.generation {
            slot.request = None;
            slot.reply = None;
        }
    }
}

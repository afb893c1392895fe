//! A write-once cell that multicasts its value to any number of observers.
//!
//! A [`ResultCell`] starts out *pending* and is *resolved* exactly once through its
//! [`CellResolver`]. The resolver is the only write handle and is consumed by
//! [`resolve`](CellResolver::resolve), so a cell can never be resolved twice or revert to the
//! pending state.
//!
//! Observers are created with [`ResultCell::observe`]. Each observation is a one-shot future
//! which completes immediately if the cell is already resolved, or as soon as it is. If the
//! resolver is dropped without resolving the cell, every observation completes with
//! [`Abandoned`] instead of waiting forever.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};
use thiserror::Error;

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// The resolver of a [`ResultCell`] was dropped without providing a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("result cell abandoned before it was resolved")]
pub struct Abandoned;

/// Process-unique identity of a [`ResultCell`].
///
/// All clones of a cell share the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    fn next() -> Self {
        Self(NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The lifecycle state of a [`ResultCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// No value yet.
    Pending,
    /// The value is available and will never change.
    Resolved,
    /// The resolver was dropped, the cell will never get a value.
    Abandoned,
}

type Channel<T> = Shared<oneshot::Receiver<T>>;

/// Shared state holding the eventual result for one key.
pub struct ResultCell<T> {
    id: CellId,
    channel: Channel<T>,
}

impl<T> ResultCell<T> {
    /// The identity of this cell.
    pub fn id(&self) -> CellId {
        self.id
    }
}

impl<T> Clone for ResultCell<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            channel: self.channel.clone(),
        }
    }
}

impl<T: Clone> ResultCell<T> {
    /// Creates a new pending cell, along with the single handle that can resolve it.
    pub fn pending() -> (Self, CellResolver<T>) {
        let id = CellId::next();
        let (sender, receiver) = oneshot::channel();
        let cell = ResultCell {
            id,
            channel: receiver.shared(),
        };
        (cell, CellResolver { id, sender })
    }

    /// Creates a cell that already holds `value`.
    pub fn resolved(value: T) -> Self {
        let (cell, resolver) = Self::pending();
        resolver.resolve(value);
        cell
    }

    /// Returns the value if the cell has been resolved, without waiting.
    ///
    /// This is a snapshot: a cell that is reported as pending may be resolved an instant later.
    pub fn peek(&self) -> Option<Result<T, Abandoned>> {
        self.channel
            .clone()
            .now_or_never()
            .map(|result| result.map_err(|_canceled| Abandoned))
    }

    /// The current lifecycle state of the cell. See [`peek`](Self::peek).
    pub fn state(&self) -> CellState {
        match self.peek() {
            None => CellState::Pending,
            Some(Ok(_)) => CellState::Resolved,
            Some(Err(Abandoned)) => CellState::Abandoned,
        }
    }

    /// Attaches a new observer to this cell.
    ///
    /// The returned future yields the value exactly once. Dropping it detaches only this
    /// observer and has no effect on the cell or on other observers.
    pub fn observe(&self) -> Observation<T> {
        Observation {
            channel: self.channel.clone(),
        }
    }
}

impl<T: Clone> fmt::Debug for ResultCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCell")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// The write handle of a [`ResultCell`].
pub struct CellResolver<T> {
    id: CellId,
    sender: oneshot::Sender<T>,
}

impl<T> CellResolver<T> {
    /// The identity of the cell this resolves.
    pub fn id(&self) -> CellId {
        self.id
    }

    /// Resolves the cell with its permanent value, waking up all observers.
    ///
    /// Returns `false` if nobody can observe the value anymore.
    pub fn resolve(self, value: T) -> bool {
        self.sender.send(value).is_ok()
    }
}

impl<T> fmt::Debug for CellResolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellResolver")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A one-shot observation of a [`ResultCell`], created by [`ResultCell::observe`].
#[must_use = "observations do nothing unless polled"]
pub struct Observation<T> {
    channel: Channel<T>,
}

impl<T: Clone> Future for Observation<T> {
    type Output = Result<T, Abandoned>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.channel
            .poll_unpin(cx)
            .map(|result| result.map_err(|_canceled| Abandoned))
    }
}

impl<T> fmt::Debug for Observation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation").finish_non_exhaustive()
    }
}

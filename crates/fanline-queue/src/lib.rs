//! Bounded single-producer / single-consumer queues for fanline workers.
//!
//! Storage threads hand records to a worker's room thread through one
//! bounded SPSC ring each. The ring rejects instead of blocking: a full
//! queue returns the element to the caller, which maps directly onto the
//! tailer's `NoBuffer` retry contract. A shared [`Signal`] lets the
//! consumer park when every ring it drains is empty.

pub mod signal;
pub mod spsc;

pub use signal::Signal;
pub use spsc::{Consumer, Producer, spsc};

/// Error occurring when pushing into a queue is unsuccessful.
///
/// Both variants hand the rejected element back to the caller, so ownership
/// is only transferred on success.
#[derive(Debug, Eq, PartialEq)]
pub enum PushError<T> {
    /// The queue is full.
    Full(T),
    /// The consumer has been dropped.
    Closed(T),
}

impl<T> PushError<T> {
    /// Recovers the element that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value) | PushError::Closed(value) => value,
        }
    }
}

/// Error occurring when popping from a queue is unsuccessful.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PopError {
    /// The queue is empty.
    Empty,
    /// The producer has been dropped and the queue is drained.
    Closed,
}

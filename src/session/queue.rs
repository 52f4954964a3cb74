//! Outbound queue and batch snapshots.
//!
//! Command descriptors accumulate here in strict FIFO order until the link
//! is connected and a flush drains them into a single [`BatchFrame`]
//! (constructed by the caller from the snapshot).
//!
//! FIFO order is load-bearing: the pixel strip relies on buffer updates
//! reaching the device before the show command that follows them.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::protocol::CommandDescriptor;

// ============================================================================
// OutboundQueue
// ============================================================================

/// Strict-FIFO accumulator of command descriptors.
///
/// Mutated only from the link's event-loop task, so the only guard needed is
/// the reentrancy flag around flushes.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    /// Pending descriptors, head = oldest.
    items: VecDeque<CommandDescriptor>,
    /// Set while a drained snapshot is in flight.
    flushing: bool,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends descriptors at the tail, preserving their relative order.
    pub fn enqueue(&mut self, descriptors: impl IntoIterator<Item = CommandDescriptor>) {
        self.items.extend(descriptors);
    }

    /// Number of queued descriptors.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` while a snapshot is in flight.
    #[inline]
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Atomically drains the whole queue for a flush.
    ///
    /// Returns `None` when the queue is empty or a flush is already in
    /// progress (reentrant flushes are no-ops). Descriptors enqueued after
    /// this snapshot stay behind for the next flush; the caller must pair a
    /// `Some` return with [`finish_flush`](Self::finish_flush).
    #[must_use]
    pub fn begin_flush(&mut self) -> Option<Vec<CommandDescriptor>> {
        if self.flushing || self.items.is_empty() {
            return None;
        }

        self.flushing = true;
        Some(self.items.drain(..).collect())
    }

    /// Clears the in-flight flag after a flush attempt completes.
    pub fn finish_flush(&mut self) {
        self.flushing = false;
    }

    /// Restores a failed snapshot to the head of the queue.
    ///
    /// Descriptors enqueued while the snapshot was in flight stay behind it,
    /// so global FIFO order survives a send failure. The next flush retries
    /// the snapshot first.
    pub fn restore_front(&mut self, snapshot: Vec<CommandDescriptor>) {
        for descriptor in snapshot.into_iter().rev() {
            self.items.push_front(descriptor);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

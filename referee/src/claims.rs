use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use setgame::PlayerId;
use tracing::trace;

use crate::error::{RefereeError, RefereeResult};

/// FIFO of players waiting for the dealer to check their set.
///
/// Players block in [`submit`](Self::submit) while the queue is full and the
/// dealer blocks in [`wait`](Self::wait) while it is empty. Closing the queue
/// releases both and is how a session is terminated.
pub struct ClaimQueue {
    state: Mutex<QueueState>,
    /// Signalled when a claim arrives or the queue is closed.
    claim_arrived: Condvar,
    /// Signalled when a claim leaves the queue or the queue is closed.
    space_freed: Condvar,
    capacity: usize,
}

struct QueueState {
    pending: VecDeque<PlayerId>,
    closed: bool,
}

/// Why [`ClaimQueue::wait`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    /// At least one claim is pending.
    Claim,
    /// The deadline passed with no claim pending.
    Deadline,
    Closed,
}

impl ClaimQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            claim_arrived: Condvar::new(),
            space_freed: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends a claim by `player`.
    ///
    /// A player may only have one pending claim. After the queue is closed
    /// this returns without enqueueing anything.
    pub fn submit(&self, player: PlayerId) -> RefereeResult<()> {
        let mut state = self.state.lock();
        if state.pending.contains(&player) {
            return Err(RefereeError::InvariantViolation {
                player,
                reason: "submitted a second claim while one was pending",
            });
        }
        while state.pending.len() >= self.capacity && !state.closed {
            self.space_freed.wait(&mut state);
        }
        if state.closed {
            return Ok(());
        }
        state.pending.push_back(player);
        trace!(%player, pending = state.pending.len(), "Claim submitted");
        self.claim_arrived.notify_one();
        Ok(())
    }

    /// Blocks until a claim is pending, `deadline` passes, or the queue is
    /// closed. Closing takes precedence over pending claims.
    pub fn wait(&self, deadline: Instant) -> Wake {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Wake::Closed;
            }
            if !state.pending.is_empty() {
                return Wake::Claim;
            }
            if self.claim_arrived.wait_until(&mut state, deadline).timed_out() {
                // A claim may have raced with the timeout.
                return if state.closed {
                    Wake::Closed
                } else if !state.pending.is_empty() {
                    Wake::Claim
                } else {
                    Wake::Deadline
                };
            }
        }
    }

    /// Takes the oldest claim.
    pub fn pop(&self) -> Option<PlayerId> {
        let mut state = self.state.lock();
        let player = state.pending.pop_front();
        if player.is_some() {
            self.space_freed.notify_one();
        }
        player
    }

    /// Removes `player`'s pending claim, if any.
    pub fn withdraw(&self, player: PlayerId) -> bool {
        let mut state = self.state.lock();
        match state.pending.iter().position(|&p| p == player) {
            Some(pos) => {
                state.pending.remove(pos);
                self.space_freed.notify_one();
                true
            }
            None => false,
        }
    }

    /// Empties the queue and returns the claims that were pending, oldest first.
    pub fn drain(&self) -> Vec<PlayerId> {
        let mut state = self.state.lock();
        let drained: Vec<PlayerId> = state.pending.drain(..).collect();
        self.space_freed.notify_all();
        drained
    }

    /// Wakes every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.claim_arrived.notify_all();
        self.space_freed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pending(&self, player: PlayerId) -> bool {
        self.state.lock().pending.contains(&player)
    }
}

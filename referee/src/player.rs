use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use setgame::{Observer, PlayerId, Slot};
use tracing::{debug, info, trace};

use crate::claims::ClaimQueue;
use crate::error::{RefereeError, RefereeResult};
use crate::input::ComputerInput;
use crate::table::{Table, TOKENS_PER_PLAYER};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerKind {
    /// Key presses come from outside, through [`PlayerHandle::key_pressed`].
    Human,
    /// Key presses come from a [`ComputerInput`] thread.
    Computer,
}

/// Until when a player's input is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freeze {
    Until(Instant),
    /// While the dealer reshuffles.
    Indefinitely,
}

impl Freeze {
    pub fn is_active(&self, now: Instant) -> bool {
        match self {
            Freeze::Until(deadline) => now < *deadline,
            Freeze::Indefinitely => true,
        }
    }

    /// `None` for an indefinite freeze.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self {
            Freeze::Until(deadline) => Some(deadline.saturating_duration_since(now)),
            Freeze::Indefinitely => None,
        }
    }
}

/// The dealer's decision on a claim, as delivered to the claiming player.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Point,
    Penalty,
    /// The claim could no longer be checked; no freeze.
    Moot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    Verdict(Verdict),
    Terminate,
}

/// Score and freeze of one player. Only the dealer writes these.
struct PlayerStatus {
    score: AtomicU32,
    freeze: Mutex<Freeze>,
}

/// Everything outside a player's own thread talks to the player through
/// this handle: input sources press keys, the dealer delivers verdicts.
#[derive(Clone)]
pub struct PlayerHandle {
    id: PlayerId,
    kind: PlayerKind,
    status: Arc<PlayerStatus>,
    inputs: Sender<Slot>,
    signals: Sender<Signal>,
    observer: Arc<dyn Observer>,
}

/// The receiving end of a [`PlayerHandle`], consumed by the [`PlayerAgent`].
pub struct Inbox {
    inputs: Receiver<Slot>,
    signals: Receiver<Signal>,
}

#[cfg(test)]
impl Inbox {
    pub(crate) fn key_presses(&self) -> Vec<Slot> {
        self.inputs.try_iter().collect()
    }

    pub(crate) fn received(&self) -> Vec<Signal> {
        self.signals.try_iter().collect()
    }
}

impl PlayerHandle {
    /// Creates a player that is frozen until the dealer first unfreezes it.
    pub fn new(id: PlayerId, kind: PlayerKind, observer: Arc<dyn Observer>) -> (Self, Inbox) {
        // Same capacity as the token count: nobody needs more key presses banked.
        let (input_tx, input_rx) = bounded(TOKENS_PER_PLAYER);
        let (signal_tx, signal_rx) = unbounded();
        let handle = Self {
            id,
            kind,
            status: Arc::new(PlayerStatus {
                score: AtomicU32::new(0),
                freeze: Mutex::new(Freeze::Indefinitely),
            }),
            inputs: input_tx,
            signals: signal_tx,
            observer,
        };
        let inbox = Inbox {
            inputs: input_rx,
            signals: signal_rx,
        };
        (handle, inbox)
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn kind(&self) -> PlayerKind {
        self.kind
    }

    pub fn score(&self) -> u32 {
        self.status.score.load(Ordering::Acquire)
    }

    pub fn freeze(&self) -> Freeze {
        *self.status.freeze.lock()
    }

    pub fn is_frozen(&self, now: Instant) -> bool {
        self.freeze().is_active(now)
    }

    /// A key for `slot` was pressed. Returns whether the press was accepted.
    ///
    /// Presses while frozen, or while earlier presses are still unprocessed,
    /// are dropped.
    pub fn key_pressed(&self, slot: Slot) -> bool {
        if self.is_frozen(Instant::now()) {
            trace!(player = %self.id, %slot, "Key press while frozen");
            return false;
        }
        match self.inputs.try_send(slot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Awards a point and resumes the player after `freeze`. Returns the new score.
    pub fn point(&self, freeze: Duration) -> u32 {
        let score = self.status.score.fetch_add(1, Ordering::AcqRel) + 1;
        self.observer.score_changed(self.id, score);
        self.freeze_for(freeze);
        self.send(Signal::Verdict(Verdict::Point));
        score
    }

    /// Resumes the player after `freeze`, without a point.
    pub fn penalty(&self, freeze: Duration) {
        self.freeze_for(freeze);
        self.send(Signal::Verdict(Verdict::Penalty));
    }

    /// Resumes the player right away, its claim could not be checked.
    pub fn release(&self) {
        self.send(Signal::Verdict(Verdict::Moot));
    }

    pub fn freeze_indefinitely(&self) {
        *self.status.freeze.lock() = Freeze::Indefinitely;
        self.observer.freeze_changed(self.id, None);
    }

    pub fn unfreeze(&self) {
        *self.status.freeze.lock() = Freeze::Until(Instant::now());
        self.observer.freeze_changed(self.id, Some(Duration::ZERO));
    }

    /// Asks the player thread to finish. Idempotent.
    pub fn terminate(&self) {
        self.send(Signal::Terminate);
    }

    fn freeze_for(&self, duration: Duration) {
        *self.status.freeze.lock() = Freeze::Until(Instant::now() + duration);
        self.observer.freeze_changed(self.id, Some(duration));
    }

    fn send(&self, signal: Signal) {
        // The player thread may already be gone during shutdown.
        if self.signals.send(signal).is_err() {
            debug!(player = %self.id, ?signal, "Player no longer listening");
        }
    }
}

enum Event {
    Signal(Option<Signal>),
    KeyPressed(Option<Slot>),
}

/// The thread of one player: turns key presses into tokens, and claims a set
/// whenever it has placed its last token.
///
/// The agent waits for input in `event_loop`, applies a token in
/// `key_pressed` and blocks in `claim` until its verdict arrives.
pub struct PlayerAgent {
    handle: PlayerHandle,
    inbox: Inbox,
    table: Arc<Table>,
    claims: Arc<ClaimQueue>,
}

impl PlayerAgent {
    pub fn new(
        handle: PlayerHandle,
        inbox: Inbox,
        table: Arc<Table>,
        claims: Arc<ClaimQueue>,
    ) -> Self {
        Self {
            handle,
            inbox,
            table,
            claims,
        }
    }

    /// Starts the player thread, and for computer players the thread that
    /// generates its key presses.
    pub fn spawn(
        self,
        computer: Option<ComputerInput>,
    ) -> RefereeResult<JoinHandle<RefereeResult<()>>> {
        let name = format!("player-{}", self.handle.id.0);
        std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run(computer))
            .map_err(|source| RefereeError::Spawn { name, source })
    }

    pub fn run(mut self, computer: Option<ComputerInput>) -> RefereeResult<()> {
        let id = self.handle.id;
        info!(player = %id, kind = ?self.handle.kind, "Player starting");
        let generator = computer.map(ComputerInput::spawn).transpose()?;

        let result = self.event_loop();

        if let Some(generator) = generator {
            generator.stop()?;
        }
        info!(player = %id, "Player terminated");
        result
    }

    fn event_loop(&mut self) -> RefereeResult<()> {
        loop {
            let event = select! {
                recv(self.inbox.signals) -> signal => Event::Signal(signal.ok()),
                recv(self.inbox.inputs) -> slot => Event::KeyPressed(slot.ok()),
            };
            let flow = match event {
                Event::Signal(Some(Signal::Verdict(verdict))) => {
                    debug!(player = %self.handle.id, ?verdict, "Verdict without a pending claim");
                    ControlFlow::Continue(())
                }
                Event::KeyPressed(Some(slot)) => self.key_pressed(slot)?,
                // Terminated, or every sender is gone.
                Event::Signal(_) | Event::KeyPressed(None) => ControlFlow::Break(()),
            };
            if flow.is_break() {
                return Ok(());
            }
        }
    }

    fn key_pressed(&mut self, slot: Slot) -> RefereeResult<ControlFlow<()>> {
        let id = self.handle.id;
        if self.handle.is_frozen(Instant::now()) {
            trace!(player = %id, %slot, "Dropping key press while frozen");
            return Ok(ControlFlow::Continue(()));
        }

        if self.table.remove_token(id, slot) {
            trace!(player = %id, %slot, "Token removed");
            Ok(ControlFlow::Continue(()))
        } else if self.table.place_token(id, slot) && self.table.free_token_count(id) == 0 {
            self.claim()
        } else {
            Ok(ControlFlow::Continue(()))
        }
    }

    /// Submits a claim and blocks until the dealer has ruled on it.
    fn claim(&mut self) -> RefereeResult<ControlFlow<()>> {
        let id = self.handle.id;
        self.claims.submit(id)?;
        trace!(player = %id, "Awaiting verdict");

        loop {
            match self.inbox.signals.recv() {
                Ok(Signal::Verdict(verdict)) => {
                    debug!(player = %id, ?verdict, "Claim decided");
                    break;
                }
                Ok(Signal::Terminate) | Err(_) => return Ok(ControlFlow::Break(())),
            }
        }

        // Key presses made while waiting are stale.
        let discarded = self.inbox.inputs.try_iter().count();
        if discarded > 0 {
            trace!(player = %id, discarded, "Discarded key presses");
        }
        Ok(ControlFlow::Continue(()))
    }
}

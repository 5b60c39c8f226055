use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use setgame::Observer;
use tracing::info;

use crate::error::{RefereeError, RefereeResult};
use crate::player::PlayerHandle;

/// The deadline of the current round, shared between the dealer, which sets
/// it, and the timer, which displays it.
#[derive(Default)]
pub struct RoundClock {
    deadline: Mutex<Option<Instant>>,
}

impl RoundClock {
    /// Starts a round lasting `duration` and returns its deadline.
    pub fn start_round(&self, duration: Duration) -> Instant {
        let deadline = Instant::now() + duration;
        *self.deadline.lock() = Some(deadline);
        deadline
    }

    pub fn end_round(&self) {
        *self.deadline.lock() = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    /// Time left in the current round, `None` between rounds.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }
}

/// Pushes the countdown and every player's remaining freeze to the observer.
struct Refresher {
    clock: Arc<RoundClock>,
    players: Vec<PlayerHandle>,
    observer: Arc<dyn Observer>,
    warning: Duration,
}

impl Refresher {
    fn tick(&self, now: Instant) {
        if let Some(remaining) = self.clock.remaining(now) {
            self.observer
                .countdown_changed(remaining, remaining <= self.warning);
        }
        for player in &self.players {
            self.observer
                .freeze_changed(player.id(), player.freeze().remaining(now));
        }
    }
}

/// The thread refreshing the countdown and freeze displays.
pub struct RoundTimer {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl RoundTimer {
    pub fn spawn(
        clock: Arc<RoundClock>,
        players: Vec<PlayerHandle>,
        observer: Arc<dyn Observer>,
        refresh: Duration,
        warning: Duration,
    ) -> RefereeResult<Self> {
        let refresher = Refresher {
            clock,
            players,
            observer,
            warning,
        };
        let (stop_tx, stop_rx) = bounded(0);
        let thread = std::thread::Builder::new()
            .name(String::from("timer"))
            .spawn(move || run(refresher, refresh, stop_rx))
            .map_err(|source| RefereeError::Spawn {
                name: String::from("timer"),
                source,
            })?;
        Ok(Self {
            stop: stop_tx,
            thread,
        })
    }

    /// Stops the thread and waits for it.
    pub fn stop(self) -> RefereeResult<()> {
        drop(self.stop);
        self.thread
            .join()
            .map_err(|_| RefereeError::ThreadPanicked(String::from("timer")))
    }
}

fn run(refresher: Refresher, refresh: Duration, stop: Receiver<()>) {
    info!("Timer starting");
    loop {
        refresher.tick(Instant::now());
        match stop.recv_timeout(refresh) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("Timer terminated");
}

use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use setgame::{PlayerId, Slot};
use tracing::{info, trace, warn};

use crate::error::{RefereeError, RefereeResult};
use crate::player::{PlayerHandle, PlayerKind};
use crate::table::{Table, TOKENS_PER_PLAYER};

/// Generates random key presses for a computer player.
///
/// Each press picks one of the player's three token positions; if a token is
/// there, that slot is pressed again (taking the token back), otherwise a
/// random slot is pressed.
pub struct ComputerInput {
    handle: PlayerHandle,
    table: Arc<Table>,
    rng: StdRng,
    max_delay: Duration,
}

/// A running [`ComputerInput`] thread.
pub struct GeneratorHandle {
    name: String,
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl ComputerInput {
    pub fn new(handle: PlayerHandle, table: Arc<Table>, seed: u64, max_delay: Duration) -> Self {
        Self {
            handle,
            table,
            rng: StdRng::seed_from_u64(seed),
            max_delay,
        }
    }

    pub fn spawn(self) -> RefereeResult<GeneratorHandle> {
        let name = format!("computer-{}", self.handle.id().0);
        let (stop_tx, stop_rx) = bounded(0);
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || self.run(stop_rx))
            .map_err(|source| RefereeError::Spawn {
                name: name.clone(),
                source,
            })?;
        Ok(GeneratorHandle {
            name,
            stop: stop_tx,
            thread,
        })
    }

    fn next_key(&mut self) -> Slot {
        let tokens = self.table.token_slots(self.handle.id());
        match tokens.get(self.rng.gen_range(0..TOKENS_PER_PLAYER)) {
            Some(&slot) => slot,
            None => Slot(self.rng.gen_range(0..self.table.table_size()) as u8),
        }
    }

    fn run(mut self, stop: Receiver<()>) {
        let id = self.handle.id();
        info!(player = %id, "Computer input starting");
        let max_delay_ms = self.max_delay.as_millis() as u64;
        loop {
            let slot = self.next_key();
            let accepted = self.handle.key_pressed(slot);
            trace!(player = %id, %slot, accepted, "Computer key press");

            let pause = Duration::from_millis(self.rng.gen_range(0..=max_delay_ms));
            match stop.recv_timeout(pause) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(player = %id, "Computer input terminated");
    }
}

impl GeneratorHandle {
    /// Stops the thread and waits for it.
    pub fn stop(self) -> RefereeResult<()> {
        drop(self.stop);
        self.thread
            .join()
            .map_err(|_| RefereeError::ThreadPanicked(self.name))
    }
}

/// How [`feed_key_presses`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEnd {
    /// A `quit` line was read.
    Quit,
    EndOfInput,
}

/// Forwards key presses of human players read line by line from `reader`.
///
/// Each line is `<player> <slot>`; `quit` stops reading. Malformed lines and
/// presses for computer players are skipped with a warning.
pub fn feed_key_presses(
    reader: impl BufRead,
    handles: &[PlayerHandle],
) -> anyhow::Result<InputEnd> {
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            return Ok(InputEnd::Quit);
        }
        match parse_key_press(line) {
            Some((player, slot)) => match handles.get(player.index()) {
                Some(handle) if handle.kind() == PlayerKind::Human => {
                    let accepted = handle.key_pressed(slot);
                    trace!(%player, %slot, accepted, "Key press");
                }
                Some(_) => warn!(%player, "Not a human player"),
                None => warn!(%player, "No such player"),
            },
            None => warn!(line, "Expected '<player> <slot>' or 'quit'"),
        }
    }
    Ok(InputEnd::EndOfInput)
}

fn parse_key_press(line: &str) -> Option<(PlayerId, Slot)> {
    let mut parts = line.split_whitespace();
    let player = parts.next()?.parse().ok()?;
    let slot = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((PlayerId(player), Slot(slot)))
}

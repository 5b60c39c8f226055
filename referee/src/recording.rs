use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use setgame::{Card, Observer, PlayerId, Slot};

/// One visible change of the game, as stored in a recording.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    CardPlaced { card: Card, slot: Slot },
    CardRemoved { slot: Slot },
    TokenPlaced { player: PlayerId, slot: Slot },
    TokenRemoved { player: PlayerId, slot: Slot },
    ScoreChanged { player: PlayerId, score: u32 },
    WinnersAnnounced { winners: Vec<PlayerId> },
}

/// Observer that keeps every game event in order, and can write them out as
/// one JSON file per game.
///
/// The countdown and freeze displays are refreshed many times per second and
/// are not recorded.
#[derive(Default)]
pub struct Recorder {
    directory: Option<PathBuf>,
    inner: Mutex<RecorderState>,
}

#[derive(Default)]
struct RecorderState {
    num: usize,
    events: Vec<GameEvent>,
}

impl Recorder {
    /// A recorder that writes into `directory`, which must exist.
    pub fn new(directory: PathBuf) -> anyhow::Result<Self> {
        if !directory.is_dir() {
            anyhow::bail!("Directory '{}' does not exist", directory.display());
        }
        Ok(Self {
            directory: Some(directory),
            inner: Mutex::new(RecorderState {
                num: 1,
                events: Vec::new(),
            }),
        })
    }

    /// The events recorded since the last [`write_game_recording`](Self::write_game_recording).
    pub fn events(&self) -> Vec<GameEvent> {
        self.inner.lock().events.clone()
    }

    /// Writes the recorded events to `game_NNNNNN.json` and starts a new
    /// recording. Returns the path written to, or `None` for a recorder
    /// without a directory.
    pub fn write_game_recording(&self) -> anyhow::Result<Option<PathBuf>> {
        let Some(directory) = &self.directory else {
            return Ok(None);
        };
        let (num, events) = {
            let mut inner = self.inner.lock();
            let num = inner.num;
            inner.num += 1;
            (num, std::mem::take(&mut inner.events))
        };
        let filepath = directory.join(format!("game_{:0>6}.json", num));
        let writer = BufWriter::new(File::create(&filepath)?);
        serde_json::to_writer_pretty(writer, &events)?;
        Ok(Some(filepath))
    }

    fn record(&self, event: GameEvent) {
        self.inner.lock().events.push(event);
    }
}

impl Observer for Recorder {
    fn card_placed(&self, card: Card, slot: Slot) {
        self.record(GameEvent::CardPlaced { card, slot });
    }

    fn card_removed(&self, slot: Slot) {
        self.record(GameEvent::CardRemoved { slot });
    }

    fn token_placed(&self, player: PlayerId, slot: Slot) {
        self.record(GameEvent::TokenPlaced { player, slot });
    }

    fn token_removed(&self, player: PlayerId, slot: Slot) {
        self.record(GameEvent::TokenRemoved { player, slot });
    }

    fn score_changed(&self, player: PlayerId, score: u32) {
        self.record(GameEvent::ScoreChanged { player, score });
    }

    fn winners_announced(&self, winners: &[PlayerId]) {
        self.record(GameEvent::WinnersAnnounced {
            winners: winners.to_vec(),
        });
    }
}

/// Forwards every notification to several observers.
pub struct Observers(pub Vec<Arc<dyn Observer>>);

impl Observer for Observers {
    fn card_placed(&self, card: Card, slot: Slot) {
        self.0.iter().for_each(|o| o.card_placed(card, slot));
    }

    fn card_removed(&self, slot: Slot) {
        self.0.iter().for_each(|o| o.card_removed(slot));
    }

    fn token_placed(&self, player: PlayerId, slot: Slot) {
        self.0.iter().for_each(|o| o.token_placed(player, slot));
    }

    fn token_removed(&self, player: PlayerId, slot: Slot) {
        self.0.iter().for_each(|o| o.token_removed(player, slot));
    }

    fn score_changed(&self, player: PlayerId, score: u32) {
        self.0.iter().for_each(|o| o.score_changed(player, score));
    }

    fn freeze_changed(&self, player: PlayerId, remaining: Option<Duration>) {
        self.0.iter().for_each(|o| o.freeze_changed(player, remaining));
    }

    fn countdown_changed(&self, remaining: Duration, warn: bool) {
        self.0.iter().for_each(|o| o.countdown_changed(remaining, warn));
    }

    fn winners_announced(&self, winners: &[PlayerId]) {
        self.0.iter().for_each(|o| o.winners_announced(winners));
    }
}

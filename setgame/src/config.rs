use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{FeatureOracle, PlayerId};

/// Static session settings, read once at startup.
///
/// Every field has a default, so a config file only needs to list the
/// settings it changes:
/// ```
/// let config: setgame::Config = serde_json::from_str(r#"{ "players": 4, "humans": 1 }"#).unwrap();
/// assert_eq!(config.table_size(), 12);
/// assert!(config.is_human(setgame::PlayerId(0)));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of players in the session.
    pub players: usize,
    /// The first `humans` players take their input from outside; the rest
    /// are computer players.
    pub humans: usize,
    pub rows: usize,
    pub columns: usize,
    /// Number of values each card feature can take.
    pub feature_size: u8,
    /// Number of features per card.
    pub feature_count: u8,
    /// Number of cards in play, at most `feature_size ^ feature_count`.
    pub deck_size: usize,
    /// Time until the table is reshuffled.
    pub round_duration_ms: u64,
    pub point_freeze_ms: u64,
    pub penalty_freeze_ms: u64,
    /// The countdown is displayed as a warning once it drops below this.
    pub countdown_warning_ms: u64,
    /// Artificial delay for placing or removing a card.
    pub table_delay_ms: u64,
    /// How often the countdown and freeze displays are refreshed.
    pub display_refresh_ms: u64,
    /// Upper bound of the pause between two computer key presses.
    pub ai_max_delay_ms: u64,
    /// Log every set on the table after dealing.
    pub hints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            players: 2,
            humans: 0,
            rows: 3,
            columns: 4,
            feature_size: 3,
            feature_count: 4,
            deck_size: 81,
            round_duration_ms: 60_000,
            point_freeze_ms: 1_000,
            penalty_freeze_ms: 3_000,
            countdown_warning_ms: 5_000,
            table_delay_ms: 0,
            display_refresh_ms: 100,
            ai_max_delay_ms: 100,
            hints: false,
        }
    }
}

/// A config that can't be used to run a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("a session needs at least one player")]
    NoPlayers,
    #[error("at most {max} players are supported, got {players}")]
    TooManyPlayers { players: usize, max: usize },
    #[error("{humans} human players configured, but only {players} players in total")]
    TooManyHumans { humans: usize, players: usize },
    #[error("the table has no slots ({rows} rows, {columns} columns)")]
    EmptyTable { rows: usize, columns: usize },
    #[error("the table has {slots} slots, at most {max} are supported")]
    TableTooLarge { slots: usize, max: usize },
    #[error("cards need at least two values per feature and one feature")]
    DegenerateFeatures,
    #[error("deck size {deck_size} exceeds the {max} distinct cards the features allow")]
    DeckTooLarge { deck_size: usize, max: usize },
    #[error("round duration must be positive")]
    ZeroRoundDuration,
    #[error("display refresh interval must be positive")]
    ZeroDisplayRefresh,
}

impl Config {
    /// Reads a JSON config file and validates it.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file '{}'", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Could not parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.players == 0 {
            return Err(ConfigError::NoPlayers);
        }
        // Ids, slots and cards are stored in a u8.
        let max = usize::from(u8::MAX) + 1;
        if self.players > max {
            return Err(ConfigError::TooManyPlayers {
                players: self.players,
                max,
            });
        }
        if self.humans > self.players {
            return Err(ConfigError::TooManyHumans {
                humans: self.humans,
                players: self.players,
            });
        }
        if self.table_size() == 0 {
            return Err(ConfigError::EmptyTable {
                rows: self.rows,
                columns: self.columns,
            });
        }
        if self.table_size() > max {
            return Err(ConfigError::TableTooLarge {
                slots: self.table_size(),
                max,
            });
        }
        if self.feature_size < 2 || self.feature_count == 0 {
            return Err(ConfigError::DegenerateFeatures);
        }
        let max_deck = self.oracle().max_deck_size().min(max);
        if self.deck_size > max_deck {
            return Err(ConfigError::DeckTooLarge {
                deck_size: self.deck_size,
                max: max_deck,
            });
        }
        if self.round_duration_ms == 0 {
            return Err(ConfigError::ZeroRoundDuration);
        }
        if self.display_refresh_ms == 0 {
            return Err(ConfigError::ZeroDisplayRefresh);
        }
        Ok(())
    }

    pub fn table_size(&self) -> usize {
        self.rows * self.columns
    }

    pub fn is_human(&self, player: PlayerId) -> bool {
        player.index() < self.humans
    }

    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> {
        (0..self.players).map(|idx| PlayerId(idx as u8))
    }

    /// The feature oracle matching this deck layout.
    pub fn oracle(&self) -> FeatureOracle {
        FeatureOracle::new(self.feature_size, self.feature_count)
    }

    pub fn round_duration(&self) -> Duration {
        Duration::from_millis(self.round_duration_ms)
    }

    pub fn point_freeze(&self) -> Duration {
        Duration::from_millis(self.point_freeze_ms)
    }

    pub fn penalty_freeze(&self) -> Duration {
        Duration::from_millis(self.penalty_freeze_ms)
    }

    pub fn countdown_warning(&self) -> Duration {
        Duration::from_millis(self.countdown_warning_ms)
    }

    pub fn table_delay(&self) -> Duration {
        Duration::from_millis(self.table_delay_ms)
    }

    pub fn display_refresh(&self) -> Duration {
        Duration::from_millis(self.display_refresh_ms)
    }

    pub fn ai_max_delay(&self) -> Duration {
        Duration::from_millis(self.ai_max_delay_ms)
    }
}

use setgame::{Card, ConfigError, PlayerId, Slot};

/// A board operation was called with a broken precondition.
///
/// These only happen when the dealer's bookkeeping is wrong, so they end the
/// session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("slot {0} does not exist")]
    NoSuchSlot(Slot),
    #[error("card {0} is not part of the deck")]
    NoSuchCard(Card),
    #[error("slot {slot} already holds card {existing}")]
    SlotOccupied { slot: Slot, existing: Card },
    #[error("card {card} is already on the table at slot {slot}")]
    CardAlreadyPlaced { card: Card, slot: Slot },
    #[error("slot {0} holds no card")]
    SlotEmpty(Slot),
}

/// Error type for a running session.
///
/// Races between players and the dealer are not errors; everything here is
/// fatal.
#[derive(Debug, thiserror::Error)]
pub enum RefereeError {
    #[error("invalid session config")]
    Config(#[from] ConfigError),
    #[error("illegal board operation")]
    Board(#[from] BoardError),
    #[error("claim by {player} violates the claim protocol: {reason}")]
    InvariantViolation {
        player: PlayerId,
        reason: &'static str,
    },
    #[error("the {0} thread panicked")]
    ThreadPanicked(String),
    #[error("could not spawn the {name} thread")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

pub type RefereeResult<T> = Result<T, RefereeError>;

use serde::{Deserialize, Serialize};

/// A card in the deck.
///
/// Cards are opaque identifiers in `[0, deck_size)`. Whether three cards form a
/// set is decided by a [`SetOracle`](crate::SetOracle), not by the card itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Card(pub u8);

/// A position on the table grid, in `[0, rows * columns)`.
///
/// Slots are numbered in row-major order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u8);

/// Identifies one player of a session, in `[0, players)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u8);

impl Card {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl Slot {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// The `(row, column)` of this slot on a grid with `columns` columns.
    pub fn coordinates(self, columns: usize) -> (usize, usize) {
        (self.index() / columns, self.index() % columns)
    }
}

impl PlayerId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// All cards of a deck with `deck_size` cards, in ascending order.
pub fn full_deck(deck_size: usize) -> Vec<Card> {
    (0..deck_size).map(|idx| Card(idx as u8)).collect()
}

/// All slots of a table with `table_size` slots, in ascending order.
pub fn all_slots(table_size: usize) -> impl Iterator<Item = Slot> {
    (0..table_size).map(|idx| Slot(idx as u8))
}

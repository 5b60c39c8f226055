use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use setgame::{all_slots, visualize_table, Card, Observer, PlayerId, Slot};

use crate::error::{BoardError, RefereeResult};

/// How many tokens each player can have on the table at once.
pub const TOKENS_PER_PLAYER: usize = 3;

/// The shared table: which card lies in which slot, and which slots each
/// player has marked with a token.
///
/// All state sits behind a single lock, so every method is atomic with respect
/// to all others. Observer notifications are sent while the lock is held,
/// which keeps them in the same order as the mutations.
pub struct Table {
    state: Mutex<TableState>,
    /// Artificial latency for placing and removing cards.
    delay: Duration,
    observer: Arc<dyn Observer>,
}

struct TableState {
    // slot_to_card[s] == Some(c) iff card_to_slot[c] == Some(s)
    slot_to_card: Vec<Option<Card>>,
    card_to_slot: Vec<Option<Slot>>,
    // Token slots per player, in placement order. Every slot in here holds a card.
    tokens: Vec<Vec<Slot>>,
}

/// Result of [`Table::remove_card`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemovedCard {
    pub card: Card,
    /// Players that had a token on the slot, which was removed along with the card.
    pub affected_players: Vec<PlayerId>,
}

/// A consistent copy of the table, e.g. for rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSnapshot {
    pub slot_to_card: Vec<Option<Card>>,
    pub tokens: Vec<Vec<Slot>>,
}

impl Table {
    pub fn new(
        table_size: usize,
        deck_size: usize,
        players: usize,
        delay: Duration,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            state: Mutex::new(TableState {
                slot_to_card: vec![None; table_size],
                card_to_slot: vec![None; deck_size],
                tokens: vec![Vec::with_capacity(TOKENS_PER_PLAYER); players],
            }),
            delay,
            observer,
        }
    }

    pub fn table_size(&self) -> usize {
        self.state.lock().slot_to_card.len()
    }

    /// Puts `card` into the empty `slot`.
    pub fn place_card(&self, card: Card, slot: Slot) -> RefereeResult<()> {
        self.settle();
        let mut state = self.state.lock();
        match state.slot_to_card.get(slot.index()) {
            None => return Err(BoardError::NoSuchSlot(slot).into()),
            Some(Some(existing)) => {
                return Err(BoardError::SlotOccupied {
                    slot,
                    existing: *existing,
                }
                .into())
            }
            Some(None) => {}
        }
        match state.card_to_slot.get(card.index()) {
            None => return Err(BoardError::NoSuchCard(card).into()),
            Some(Some(placed)) => {
                return Err(BoardError::CardAlreadyPlaced {
                    card,
                    slot: *placed,
                }
                .into())
            }
            Some(None) => {}
        }
        state.slot_to_card[slot.index()] = Some(card);
        state.card_to_slot[card.index()] = Some(slot);
        self.observer.card_placed(card, slot);
        Ok(())
    }

    /// Takes the card out of `slot`, together with every token on it.
    pub fn remove_card(&self, slot: Slot) -> RefereeResult<RemovedCard> {
        self.settle();
        let mut state = self.state.lock();
        let card = match state.slot_to_card.get(slot.index()) {
            None => return Err(BoardError::NoSuchSlot(slot).into()),
            Some(None) => return Err(BoardError::SlotEmpty(slot).into()),
            Some(Some(card)) => *card,
        };

        let mut affected_players = Vec::new();
        for (idx, slots) in state.tokens.iter_mut().enumerate() {
            if let Some(pos) = slots.iter().position(|&s| s == slot) {
                slots.remove(pos);
                let player = PlayerId(idx as u8);
                self.observer.token_removed(player, slot);
                affected_players.push(player);
            }
        }

        state.slot_to_card[slot.index()] = None;
        state.card_to_slot[card.index()] = None;
        self.observer.card_removed(slot);
        Ok(RemovedCard {
            card,
            affected_players,
        })
    }

    /// Clears the table and returns the cards that were on it, in slot order.
    pub fn remove_all_cards(&self) -> RefereeResult<Vec<Card>> {
        let occupied: Vec<Slot> = {
            let state = self.state.lock();
            all_slots(state.slot_to_card.len())
                .filter(|slot| state.slot_to_card[slot.index()].is_some())
                .collect()
        };
        occupied
            .into_iter()
            .map(|slot| self.remove_card(slot).map(|removed| removed.card))
            .collect()
    }

    /// Marks `slot` with one of the player's tokens.
    ///
    /// Fails if the player already has a token there, has no token left, or
    /// the slot holds no card.
    pub fn place_token(&self, player: PlayerId, slot: Slot) -> bool {
        let mut state = self.state.lock();
        if !matches!(state.slot_to_card.get(slot.index()), Some(Some(_))) {
            return false;
        }
        let Some(slots) = state.tokens.get_mut(player.index()) else {
            return false;
        };
        if slots.contains(&slot) || slots.len() >= TOKENS_PER_PLAYER {
            return false;
        }
        slots.push(slot);
        self.observer.token_placed(player, slot);
        true
    }

    /// Returns whether a token was removed.
    pub fn remove_token(&self, player: PlayerId, slot: Slot) -> bool {
        let mut state = self.state.lock();
        let Some(slots) = state.tokens.get_mut(player.index()) else {
            return false;
        };
        match slots.iter().position(|&s| s == slot) {
            Some(pos) => {
                slots.remove(pos);
                self.observer.token_removed(player, slot);
                true
            }
            None => false,
        }
    }

    /// The player's token slots, in placement order.
    pub fn token_slots(&self, player: PlayerId) -> Vec<Slot> {
        self.state
            .lock()
            .tokens
            .get(player.index())
            .cloned()
            .unwrap_or_default()
    }

    pub fn free_token_count(&self, player: PlayerId) -> usize {
        let state = self.state.lock();
        let used = state.tokens.get(player.index()).map_or(0, Vec::len);
        TOKENS_PER_PLAYER - used
    }

    /// The player's token slots with the cards in them, if the player has all
    /// three tokens placed.
    pub fn claimed_set(&self, player: PlayerId) -> Option<[(Slot, Card); TOKENS_PER_PLAYER]> {
        let state = self.state.lock();
        let slots = state.tokens.get(player.index())?;
        let claimed: Vec<(Slot, Card)> = slots
            .iter()
            .map(|&slot| state.slot_to_card[slot.index()].map(|card| (slot, card)))
            .collect::<Option<_>>()?;
        claimed.try_into().ok()
    }

    pub fn card_at(&self, slot: Slot) -> Option<Card> {
        self.state.lock().slot_to_card.get(slot.index()).copied().flatten()
    }

    pub fn slot_of(&self, card: Card) -> Option<Slot> {
        self.state.lock().card_to_slot.get(card.index()).copied().flatten()
    }

    /// The cards on the table, in slot order.
    pub fn cards_on_table(&self) -> Vec<Card> {
        self.state.lock().slot_to_card.iter().flatten().copied().collect()
    }

    pub fn count_cards(&self) -> usize {
        self.state.lock().slot_to_card.iter().flatten().count()
    }

    pub fn empty_slots(&self) -> Vec<Slot> {
        let state = self.state.lock();
        all_slots(state.slot_to_card.len())
            .filter(|slot| state.slot_to_card[slot.index()].is_none())
            .collect()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        let state = self.state.lock();
        TableSnapshot {
            slot_to_card: state.slot_to_card.clone(),
            tokens: state.tokens.clone(),
        }
    }

    pub fn render(&self, columns: usize) -> String {
        let snapshot = self.snapshot();
        visualize_table(&snapshot.slot_to_card, &snapshot.tokens, columns)
    }

    fn settle(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let state = self.state.lock();
        for (slot, card) in state.slot_to_card.iter().enumerate() {
            if let Some(card) = card {
                assert_eq!(state.card_to_slot[card.index()], Some(Slot(slot as u8)));
            }
        }
        for (card, slot) in state.card_to_slot.iter().enumerate() {
            if let Some(slot) = slot {
                assert_eq!(state.slot_to_card[slot.index()], Some(Card(card as u8)));
            }
        }
        for slots in &state.tokens {
            assert!(slots.len() <= TOKENS_PER_PLAYER);
            for (i, slot) in slots.iter().enumerate() {
                assert!(state.slot_to_card[slot.index()].is_some());
                assert!(!slots[i + 1..].contains(slot));
            }
        }
    }
}

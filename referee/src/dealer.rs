use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use setgame::{full_deck, Card, Config, Observer, PlayerId, SetOracle};
use tracing::{debug, error, info, trace};

use crate::claims::{ClaimQueue, Wake};
use crate::error::{RefereeError, RefereeResult};
use crate::player::{PlayerHandle, Verdict};
use crate::table::Table;
use crate::timer::{RoundClock, RoundTimer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    Filling,
    Active,
    Draining,
    Ended,
}

/// How the dealer ruled on one claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimOutcome {
    pub player: PlayerId,
    pub verdict: Verdict,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameSummary {
    /// Indexed by player id.
    pub scores: Vec<u32>,
    pub winners: Vec<PlayerId>,
    pub rounds: usize,
}

/// Owns the deck and runs the rounds: deals, rules on claims in the order
/// they were made, and reshuffles when the round time is up.
pub struct Dealer {
    config: Config,
    table: Arc<Table>,
    claims: Arc<ClaimQueue>,
    players: Vec<PlayerHandle>,
    oracle: Arc<dyn SetOracle>,
    observer: Arc<dyn Observer>,
    clock: Arc<RoundClock>,
    /// Cards in neither the table nor the discard pile. Dealt from the end.
    deck: Vec<Card>,
    rng: StdRng,
    phase: RoundPhase,
    rounds: usize,
}

impl Dealer {
    pub fn new(
        config: Config,
        table: Arc<Table>,
        claims: Arc<ClaimQueue>,
        players: Vec<PlayerHandle>,
        oracle: Arc<dyn SetOracle>,
        observer: Arc<dyn Observer>,
        rng: StdRng,
    ) -> Self {
        let deck = full_deck(config.deck_size);
        Self {
            config,
            table,
            claims,
            players,
            oracle,
            observer,
            clock: Arc::new(RoundClock::default()),
            deck,
            rng,
            phase: RoundPhase::Ended,
            rounds: 0,
        }
    }

    /// Plays until the deck runs out of sets or the claim queue is closed,
    /// then shuts down the player threads in `agents` and announces the
    /// winners.
    ///
    /// On a fatal error the players are still terminated and joined before
    /// the error is returned.
    pub fn run(mut self, agents: Vec<JoinHandle<RefereeResult<()>>>) -> RefereeResult<GameSummary> {
        info!(
            players = self.players.len(),
            deck = self.deck.len(),
            "Dealer starting"
        );
        let played = self.play();
        if let Err(err) = &played {
            error!(%err, "Session aborted");
        }

        self.enter(RoundPhase::Ended);
        self.claims.close();
        for player in &self.players {
            player.terminate();
        }
        let joined = join_agents(agents);
        played?;
        joined?;

        let scores: Vec<u32> = self.players.iter().map(PlayerHandle::score).collect();
        let winners = compute_winners(&scores);
        info!(?scores, ?winners, rounds = self.rounds, "Game over");
        self.observer.winners_announced(&winners);
        Ok(GameSummary {
            scores,
            winners,
            rounds: self.rounds,
        })
    }

    fn play(&mut self) -> RefereeResult<()> {
        let timer = RoundTimer::spawn(
            Arc::clone(&self.clock),
            self.players.clone(),
            Arc::clone(&self.observer),
            self.config.display_refresh(),
            self.config.countdown_warning(),
        )?;
        let played = self.play_rounds();
        self.clock.end_round();
        let stopped = timer.stop();
        played.and(stopped)
    }

    fn play_rounds(&mut self) -> RefereeResult<()> {
        while !self.should_finish() {
            self.rounds += 1;
            let deadline = self.fill()?;
            self.play_round(deadline)?;
            self.drain()?;
        }
        Ok(())
    }

    fn should_finish(&self) -> bool {
        if self.claims.is_closed() {
            info!("Termination requested");
            return true;
        }
        if !self.oracle.any_set(&self.deck) {
            info!(remaining = self.deck.len(), "No sets left in the deck");
            return true;
        }
        false
    }

    /// Shuffles, deals a full table and starts the round. Returns the round's
    /// deadline.
    fn fill(&mut self) -> RefereeResult<Instant> {
        self.enter(RoundPhase::Filling);
        self.deck.shuffle(&mut self.rng);
        self.deal()?;
        // Claims made after the last drain refer to tokens that are gone.
        // Reset before unfreezing, claims on the new cards must survive.
        for player in self.claims.drain() {
            debug!(%player, "Claim dropped by the reshuffle");
            self.handle(player)?.release();
        }
        let deadline = self.clock.start_round(self.config.round_duration());
        for player in &self.players {
            player.unfreeze();
        }
        if self.config.hints {
            self.log_hints();
        }
        debug!(
            round = self.rounds,
            "Table dealt\n{}",
            self.table.render(self.config.columns)
        );
        Ok(deadline)
    }

    fn play_round(&mut self, deadline: Instant) -> RefereeResult<()> {
        self.enter(RoundPhase::Active);
        while Instant::now() < deadline {
            match self.claims.wait(deadline) {
                Wake::Claim => {
                    if let Some(outcome) = self.resolve_next_claim()? {
                        debug!(
                            player = %outcome.player,
                            verdict = ?outcome.verdict,
                            "Claim resolved"
                        );
                    }
                    self.deal()?;
                }
                Wake::Deadline | Wake::Closed => break,
            }
        }
        Ok(())
    }

    /// Takes every card back into the deck.
    fn drain(&mut self) -> RefereeResult<()> {
        self.enter(RoundPhase::Draining);
        for player in &self.players {
            player.freeze_indefinitely();
        }
        self.clock.end_round();
        let cards = self.table.remove_all_cards()?;
        self.deck.extend(cards);
        for player in self.claims.drain() {
            debug!(%player, "Claim dropped by the reshuffle");
            self.handle(player)?.release();
        }
        Ok(())
    }

    /// Fills the empty slots in ascending order, as long as the deck lasts.
    fn deal(&mut self) -> RefereeResult<usize> {
        let mut dealt = 0;
        for slot in self.table.empty_slots() {
            let Some(card) = self.deck.pop() else {
                break;
            };
            self.table.place_card(card, slot)?;
            dealt += 1;
        }
        Ok(dealt)
    }

    /// Rules on the oldest pending claim. Returns `None` if there was none.
    pub fn resolve_next_claim(&self) -> RefereeResult<Option<ClaimOutcome>> {
        let Some(player) = self.claims.pop() else {
            return Ok(None);
        };
        let handle = self.handle(player)?;

        // A card under one of the tokens was taken by an earlier claim.
        let Some(claimed) = self.table.claimed_set(player) else {
            debug!(%player, "Claimed tokens are gone");
            handle.release();
            return Ok(Some(ClaimOutcome {
                player,
                verdict: Verdict::Moot,
            }));
        };

        if !self.oracle.is_valid_set(claimed.map(|(_, card)| card)) {
            handle.penalty(self.config.penalty_freeze());
            info!(%player, "Not a set");
            return Ok(Some(ClaimOutcome {
                player,
                verdict: Verdict::Penalty,
            }));
        }

        for (slot, _) in claimed {
            let removed = self.table.remove_card(slot)?;
            for other in removed.affected_players {
                if other != player && self.claims.withdraw(other) {
                    debug!(player = %other, by = %player, "Claim overtaken");
                    self.handle(other)?.release();
                }
            }
        }
        let score = handle.point(self.config.point_freeze());
        info!(%player, score, "Set found");
        Ok(Some(ClaimOutcome {
            player,
            verdict: Verdict::Point,
        }))
    }

    fn log_hints(&self) {
        let cards = self.table.cards_on_table();
        for set in self.oracle.find_sets(&cards, usize::MAX) {
            let mut slots: Vec<u8> = set
                .iter()
                .filter_map(|&card| self.table.slot_of(card))
                .map(|slot| slot.0)
                .collect();
            slots.sort_unstable();
            info!(?slots, "Hint");
        }
    }

    fn handle(&self, player: PlayerId) -> RefereeResult<&PlayerHandle> {
        self.players
            .get(player.index())
            .ok_or(RefereeError::InvariantViolation {
                player,
                reason: "not a player of this session",
            })
    }

    fn enter(&mut self, phase: RoundPhase) {
        trace!(from = ?self.phase, to = ?phase, "Dealer phase");
        self.phase = phase;
    }
}

/// Every player with the highest score.
pub fn compute_winners(scores: &[u32]) -> Vec<PlayerId> {
    let Some(&best) = scores.iter().max() else {
        return Vec::new();
    };
    scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score == best)
        .map(|(idx, _)| PlayerId(idx as u8))
        .collect()
}

/// Joins every thread, returning the first failure.
pub(crate) fn join_agents(agents: Vec<JoinHandle<RefereeResult<()>>>) -> RefereeResult<()> {
    let mut result = Ok(());
    for agent in agents {
        let name = agent.thread().name().unwrap_or("player").to_owned();
        let joined = agent
            .join()
            .map_err(|_| RefereeError::ThreadPanicked(name))
            .and_then(|finished| finished);
        if let Err(err) = joined {
            error!(%err, "Player thread failed");
            if result.is_ok() {
                result = Err(err);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use parking_lot::Mutex;
    use rand::SeedableRng;
    use setgame::{FeatureOracle, Slot};

    use super::*;
    use crate::player::tests::eventually;
    use crate::player::{Freeze, Inbox, PlayerKind, Signal};
    use crate::recording::{GameEvent, Observers, Recorder};

    struct NoSets;

    impl SetOracle for NoSets {
        fn is_valid_set(&self, _cards: [Card; 3]) -> bool {
            false
        }
    }

    struct AnyTriple;

    impl SetOracle for AnyTriple {
        fn is_valid_set(&self, _cards: [Card; 3]) -> bool {
            true
        }
    }

    struct Fixture {
        dealer: Dealer,
        inboxes: Vec<Inbox>,
        table: Arc<Table>,
        claims: Arc<ClaimQueue>,
        recorder: Arc<Recorder>,
        claimer: Arc<EagerClaimer>,
    }

    /// Acts for player 0 as soon as it is unfrozen: marks slots 0, 1 and 2
    /// and claims them. Fires once after being armed.
    #[derive(Default)]
    struct EagerClaimer {
        target: Mutex<Option<(Arc<Table>, Arc<ClaimQueue>)>>,
    }

    impl EagerClaimer {
        fn arm(&self, table: &Arc<Table>, claims: &Arc<ClaimQueue>) {
            *self.target.lock() = Some((Arc::clone(table), Arc::clone(claims)));
        }
    }

    impl Observer for EagerClaimer {
        fn freeze_changed(&self, player: PlayerId, remaining: Option<Duration>) {
            if player != PlayerId(0) || remaining != Some(Duration::ZERO) {
                return;
            }
            let Some((table, claims)) = self.target.lock().take() else {
                return;
            };
            for slot in 0..3 {
                assert!(table.place_token(player, Slot(slot)));
            }
            claims.submit(player).unwrap();
        }
    }

    fn fixture(config: Config, oracle: Arc<dyn SetOracle>) -> Fixture {
        let recorder = Arc::new(Recorder::default());
        let claimer = Arc::new(EagerClaimer::default());
        let observer: Arc<dyn Observer> = Arc::new(Observers(vec![
            recorder.clone() as Arc<dyn Observer>,
            claimer.clone(),
        ]));
        let table = Arc::new(Table::new(
            config.table_size(),
            config.deck_size,
            config.players,
            Duration::ZERO,
            Arc::clone(&observer),
        ));
        let claims = Arc::new(ClaimQueue::new(config.players));
        let (players, inboxes): (Vec<_>, Vec<_>) = config
            .player_ids()
            .map(|id| PlayerHandle::new(id, PlayerKind::Computer, Arc::clone(&observer)))
            .unzip();
        let dealer = Dealer::new(
            config,
            Arc::clone(&table),
            Arc::clone(&claims),
            players,
            oracle,
            observer,
            StdRng::seed_from_u64(1),
        );
        Fixture {
            dealer,
            inboxes,
            table,
            claims,
            recorder,
            claimer,
        }
    }

    impl Fixture {
        /// Puts the given cards into slots 0, 1, ...
        fn lay(&mut self, cards: &[u8]) {
            for (slot, &card) in cards.iter().enumerate() {
                self.table.place_card(Card(card), Slot(slot as u8)).unwrap();
                self.dealer.deck.retain(|&c| c != Card(card));
            }
        }

        fn tokens(&self, player: u8, slots: [u8; 3]) {
            for slot in slots {
                assert!(self.table.place_token(PlayerId(player), Slot(slot)));
            }
        }

        fn player(&self, player: u8) -> &PlayerHandle {
            &self.dealer.players[usize::from(player)]
        }
    }

    fn config(players: usize) -> Config {
        Config {
            players,
            rows: 2,
            columns: 3,
            ..Config::default()
        }
    }

    #[test]
    fn claims_are_resolved_in_arrival_order() {
        let mut f = fixture(config(3), Arc::new(NoSets));
        f.lay(&[0, 1, 2, 3, 4, 5]);
        f.tokens(2, [0, 1, 2]);
        f.tokens(0, [0, 1, 2]);
        f.tokens(1, [3, 4, 5]);
        for p in [2, 0, 1] {
            f.claims.submit(PlayerId(p)).unwrap();
        }

        let outcomes: Vec<ClaimOutcome> =
            std::iter::from_fn(|| f.dealer.resolve_next_claim().unwrap()).collect();
        let order: Vec<PlayerId> = outcomes.iter().map(|o| o.player).collect();
        assert_eq!(order, vec![PlayerId(2), PlayerId(0), PlayerId(1)]);
        assert!(outcomes.iter().all(|o| o.verdict == Verdict::Penalty));
        for inbox in &f.inboxes {
            assert_eq!(inbox.received(), vec![Signal::Verdict(Verdict::Penalty)]);
        }
        // Wrong claims don't touch the table.
        assert_eq!(f.table.count_cards(), 6);
        assert_eq!(f.table.token_slots(PlayerId(1)), vec![Slot(3), Slot(4), Slot(5)]);
    }

    #[test]
    fn penalty_freezes_the_claimant() {
        let mut f = fixture(config(1), Arc::new(FeatureOracle::default()));
        // Cards 0, 1 and 3 differ in two features, but 0 and 3 agree on the first.
        f.lay(&[0, 1, 3]);
        f.tokens(0, [0, 1, 2]);
        f.claims.submit(PlayerId(0)).unwrap();
        let before = Instant::now();

        let outcome = f.dealer.resolve_next_claim().unwrap().unwrap();
        assert_eq!(outcome.verdict, Verdict::Penalty);
        assert_eq!(f.player(0).score(), 0);
        assert!(f.player(0).is_frozen(before + Duration::from_millis(2_900)));
        assert!(!f.player(0).is_frozen(Instant::now() + Duration::from_millis(3_100)));
    }

    #[test]
    fn simultaneous_claims_on_one_set_score_once() {
        let mut f = fixture(config(3), Arc::new(FeatureOracle::default()));
        f.lay(&[0, 1, 2, 40]);
        for p in 0..3 {
            f.tokens(p, [0, 1, 2]);
            f.claims.submit(PlayerId(p)).unwrap();
        }
        let freezes_before: Vec<Freeze> = (1..3).map(|p| f.player(p).freeze()).collect();

        let outcome = f.dealer.resolve_next_claim().unwrap().unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome {
                player: PlayerId(0),
                verdict: Verdict::Point
            }
        );
        assert!(f.claims.is_empty());
        assert_eq!(f.inboxes[0].received(), vec![Signal::Verdict(Verdict::Point)]);
        for p in 1..3 {
            assert_eq!(f.inboxes[p].received(), vec![Signal::Verdict(Verdict::Moot)]);
            assert_eq!(f.player(p as u8).freeze(), freezes_before[p - 1]);
            assert!(f.table.token_slots(PlayerId(p as u8)).is_empty());
        }
        let scores: Vec<u32> = f.dealer.players.iter().map(PlayerHandle::score).collect();
        assert_eq!(scores, vec![1, 0, 0]);
        assert_eq!(f.table.cards_on_table(), vec![Card(40)]);
        f.table.assert_consistent();
    }

    #[test]
    fn claim_with_vanished_tokens_is_moot() {
        let mut f = fixture(config(1), Arc::new(AnyTriple));
        f.lay(&[0, 1, 2]);
        f.tokens(0, [0, 1, 2]);
        f.claims.submit(PlayerId(0)).unwrap();
        f.table.remove_card(Slot(1)).unwrap();

        let outcome = f.dealer.resolve_next_claim().unwrap().unwrap();
        assert_eq!(outcome.verdict, Verdict::Moot);
        assert_eq!(f.player(0).score(), 0);
        assert_eq!(f.player(0).freeze(), Freeze::Indefinitely);
        assert_eq!(f.table.count_cards(), 2);
    }

    #[test]
    fn claim_by_unknown_player_is_fatal() {
        let f = fixture(config(2), Arc::new(AnyTriple));
        f.claims.submit(PlayerId(7)).unwrap();
        assert!(matches!(
            f.dealer.resolve_next_claim(),
            Err(RefereeError::InvariantViolation { player: PlayerId(7), .. })
        ));
    }

    #[test]
    fn fill_deals_in_slot_order_and_unfreezes() {
        let mut f = fixture(config(2), Arc::new(AnyTriple));
        // Left over from before the deal.
        f.claims.submit(PlayerId(1)).unwrap();

        let deadline = f.dealer.fill().unwrap();
        assert_eq!(f.dealer.clock.deadline(), Some(deadline));
        assert_eq!(f.table.count_cards(), 6);
        assert_eq!(f.dealer.deck.len(), 75);
        let placed: Vec<Slot> = f
            .recorder
            .events()
            .into_iter()
            .filter_map(|event| match event {
                GameEvent::CardPlaced { slot, .. } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(placed, (0..6).map(Slot).collect::<Vec<_>>());

        let later = Instant::now() + Duration::from_millis(1);
        assert!(f.dealer.players.iter().all(|p| !p.is_frozen(later)));
        assert!(f.claims.is_empty());
        assert_eq!(f.inboxes[1].received(), vec![Signal::Verdict(Verdict::Moot)]);
    }

    #[test]
    fn claim_made_right_after_the_deal_is_adjudicated() {
        let mut f = fixture(config(1), Arc::new(AnyTriple));
        f.claimer.arm(&f.table, &f.claims);

        f.dealer.fill().unwrap();
        assert_eq!(f.table.token_slots(PlayerId(0)), vec![Slot(0), Slot(1), Slot(2)]);
        assert!(f.claims.is_pending(PlayerId(0)));
        assert!(f.inboxes[0].received().is_empty());

        let outcome = f.dealer.resolve_next_claim().unwrap().unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome {
                player: PlayerId(0),
                verdict: Verdict::Point
            }
        );
        assert_eq!(f.inboxes[0].received(), vec![Signal::Verdict(Verdict::Point)]);
    }

    #[test]
    fn refill_keeps_the_round_deadline() {
        let mut f = fixture(config(1), Arc::new(AnyTriple));
        let deadline = f.dealer.fill().unwrap();
        f.tokens(0, [1, 3, 5]);
        f.claims.submit(PlayerId(0)).unwrap();

        let outcome = f.dealer.resolve_next_claim().unwrap().unwrap();
        assert_eq!(outcome.verdict, Verdict::Point);
        assert_eq!(f.table.empty_slots(), vec![Slot(1), Slot(3), Slot(5)]);
        assert_eq!(f.dealer.deal().unwrap(), 3);
        assert_eq!(f.table.count_cards(), 6);
        assert_eq!(f.dealer.deck.len(), 72);
        assert_eq!(f.dealer.clock.deadline(), Some(deadline));
    }

    #[test]
    fn deal_stops_when_the_deck_is_empty() {
        let mut f = fixture(
            Config {
                deck_size: 4,
                ..config(1)
            },
            Arc::new(AnyTriple),
        );
        assert_eq!(f.dealer.deal().unwrap(), 4);
        assert_eq!(f.table.empty_slots(), vec![Slot(4), Slot(5)]);
        assert_eq!(f.dealer.deal().unwrap(), 0);
    }

    #[test]
    fn drain_returns_cards_and_releases_queued_claims() {
        let mut f = fixture(config(2), Arc::new(AnyTriple));
        f.dealer.fill().unwrap();
        f.tokens(1, [0, 2, 4]);
        f.claims.submit(PlayerId(1)).unwrap();

        f.dealer.drain().unwrap();
        assert_eq!(f.table.count_cards(), 0);
        assert!(f.table.token_slots(PlayerId(1)).is_empty());
        assert_eq!(f.dealer.deck.len(), 81);
        assert!(f.claims.is_empty());
        assert_eq!(f.inboxes[1].received(), vec![Signal::Verdict(Verdict::Moot)]);
        assert!(f
            .dealer
            .players
            .iter()
            .all(|p| p.freeze() == Freeze::Indefinitely));
        assert_eq!(f.dealer.clock.deadline(), None);
    }

    #[test]
    fn ends_by_itself_without_sets_in_the_deck() {
        let config = Config {
            deck_size: 2,
            ..config(2)
        };
        let f = fixture(config, Arc::new(FeatureOracle::default()));
        let claims = Arc::clone(&f.claims);
        let recorder = Arc::clone(&f.recorder);

        let summary = f.dealer.run(Vec::new()).unwrap();
        assert_eq!(
            summary,
            GameSummary {
                scores: vec![0, 0],
                winners: vec![PlayerId(0), PlayerId(1)],
                rounds: 0
            }
        );
        assert!(claims.is_closed());
        assert_eq!(
            recorder.events().last(),
            Some(&GameEvent::WinnersAnnounced {
                winners: vec![PlayerId(0), PlayerId(1)]
            })
        );
    }

    #[test]
    fn closing_the_queue_ends_a_running_round() {
        let f = fixture(config(2), Arc::new(FeatureOracle::default()));
        let claims = Arc::clone(&f.claims);
        let table = Arc::clone(&f.table);
        let dealer = thread::spawn(move || f.dealer.run(Vec::new()));

        assert!(eventually(|| table.count_cards() == 6));
        claims.close();
        let summary = dealer.join().unwrap().unwrap();
        assert_eq!(summary.rounds, 1);
        assert_eq!(table.count_cards(), 0);
    }

    #[test]
    fn reshuffles_when_the_round_times_out() {
        let config = Config {
            round_duration_ms: 10,
            ..config(1)
        };
        let f = fixture(config, Arc::new(FeatureOracle::default()));
        let claims = Arc::clone(&f.claims);
        let recorder = Arc::clone(&f.recorder);
        let dealer = thread::spawn(move || f.dealer.run(Vec::new()));

        let removed = || {
            recorder
                .events()
                .iter()
                .filter(|event| matches!(event, GameEvent::CardRemoved { .. }))
                .count()
        };
        assert!(eventually(|| removed() >= 12));
        claims.close();
        let summary = dealer.join().unwrap().unwrap();
        assert!(summary.rounds >= 2);
    }

    #[test]
    fn winners_are_all_players_with_the_top_score() {
        assert_eq!(compute_winners(&[3, 5, 5]), vec![PlayerId(1), PlayerId(2)]);
        assert_eq!(compute_winners(&[0]), vec![PlayerId(0)]);
        assert_eq!(compute_winners(&[]), Vec::<PlayerId>::new());
    }
}

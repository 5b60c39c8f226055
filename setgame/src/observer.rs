use std::time::Duration;

use tracing::{debug, info, trace};

use crate::{Card, PlayerId, Slot};

/// Receives every visible change of a session.
///
/// Notifications are one-way and may arrive from any session thread, so
/// implementations must be cheap and must not call back into the session.
/// All methods default to doing nothing.
pub trait Observer: Send + Sync {
    fn card_placed(&self, _card: Card, _slot: Slot) {}
    fn card_removed(&self, _slot: Slot) {}
    fn token_placed(&self, _player: PlayerId, _slot: Slot) {}
    fn token_removed(&self, _player: PlayerId, _slot: Slot) {}
    fn score_changed(&self, _player: PlayerId, _score: u32) {}
    /// `None` means the player is frozen until further notice, `Some(ZERO)`
    /// that it is not frozen.
    fn freeze_changed(&self, _player: PlayerId, _remaining: Option<Duration>) {}
    fn countdown_changed(&self, _remaining: Duration, _warn: bool) {}
    fn winners_announced(&self, _winners: &[PlayerId]) {}
}

/// Ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Logs all notifications through `tracing`.
///
/// Countdown and freeze refreshes are frequent, so they are only logged at
/// `trace` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn card_placed(&self, card: Card, slot: Slot) {
        debug!(%card, %slot, "Card placed");
    }

    fn card_removed(&self, slot: Slot) {
        debug!(%slot, "Card removed");
    }

    fn token_placed(&self, player: PlayerId, slot: Slot) {
        trace!(%player, %slot, "Token placed");
    }

    fn token_removed(&self, player: PlayerId, slot: Slot) {
        trace!(%player, %slot, "Token removed");
    }

    fn score_changed(&self, player: PlayerId, score: u32) {
        info!(%player, score, "Score changed");
    }

    fn freeze_changed(&self, player: PlayerId, remaining: Option<Duration>) {
        trace!(%player, ?remaining, "Freeze");
    }

    fn countdown_changed(&self, remaining: Duration, warn: bool) {
        trace!(remaining_ms = remaining.as_millis() as u64, warn, "Countdown");
    }

    fn winners_announced(&self, winners: &[PlayerId]) {
        let winners: Vec<String> = winners.iter().map(ToString::to_string).collect();
        info!(winners = winners.join(", "), "Game over");
    }
}

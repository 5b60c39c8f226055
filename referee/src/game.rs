use std::sync::Arc;
use std::thread::JoinHandle;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use setgame::{Config, Observer, SetOracle};
use tracing::{debug, info};

use crate::claims::ClaimQueue;
use crate::dealer::{join_agents, Dealer, GameSummary};
use crate::error::{RefereeError, RefereeResult};
use crate::input::ComputerInput;
use crate::player::{PlayerAgent, PlayerHandle, PlayerKind};
use crate::table::Table;

/// Lets other threads feed input into a running session and stop it.
#[derive(Clone)]
pub struct SessionHandle {
    claims: Arc<ClaimQueue>,
    players: Vec<PlayerHandle>,
}

impl SessionHandle {
    /// Ends the session after the current claim. Idempotent.
    pub fn terminate(&self) {
        if !self.claims.is_closed() {
            info!("Terminating session");
        }
        self.claims.close();
    }

    pub fn is_terminated(&self) -> bool {
        self.claims.is_closed()
    }

    /// Indexed by player id.
    pub fn players(&self) -> &[PlayerHandle] {
        &self.players
    }
}

/// A session whose threads are running.
pub struct Session {
    handle: SessionHandle,
    table: Arc<Table>,
    dealer: JoinHandle<RefereeResult<GameSummary>>,
}

impl Session {
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Waits for the session to end.
    pub fn join(self) -> RefereeResult<GameSummary> {
        self.dealer
            .join()
            .map_err(|_| RefereeError::ThreadPanicked(String::from("dealer")))?
    }
}

/// Starts the player threads and the dealer.
///
/// The first `config.humans` players wait for key presses through
/// [`SessionHandle::players`], the others get a computer input thread. All
/// randomness in the session is derived from `rng`. Fails without starting
/// anything if `config` does not validate.
pub fn start_session(
    config: &Config,
    oracle: Arc<dyn SetOracle>,
    observer: Arc<dyn Observer>,
    rng: &mut StdRng,
) -> RefereeResult<Session> {
    config.validate()?;
    let table = Arc::new(Table::new(
        config.table_size(),
        config.deck_size,
        config.players,
        config.table_delay(),
        Arc::clone(&observer),
    ));
    let claims = Arc::new(ClaimQueue::new(config.players));

    let (players, inboxes): (Vec<_>, Vec<_>) = config
        .player_ids()
        .map(|id| {
            let kind = if config.is_human(id) {
                PlayerKind::Human
            } else {
                PlayerKind::Computer
            };
            PlayerHandle::new(id, kind, Arc::clone(&observer))
        })
        .unzip();
    let handle = SessionHandle {
        claims: Arc::clone(&claims),
        players: players.clone(),
    };

    let mut agents = Vec::with_capacity(players.len());
    for (player, inbox) in players.iter().zip(inboxes) {
        let computer = (player.kind() == PlayerKind::Computer).then(|| {
            ComputerInput::new(
                player.clone(),
                Arc::clone(&table),
                rng.gen(),
                config.ai_max_delay(),
            )
        });
        let agent = PlayerAgent::new(
            player.clone(),
            inbox,
            Arc::clone(&table),
            Arc::clone(&claims),
        );
        match agent.spawn(computer) {
            Ok(thread) => agents.push(thread),
            Err(err) => {
                abort(&handle, agents);
                return Err(err);
            }
        }
    }

    let dealer = Dealer::new(
        config.clone(),
        Arc::clone(&table),
        claims,
        players,
        oracle,
        observer,
        StdRng::seed_from_u64(rng.gen()),
    );
    let dealer = std::thread::Builder::new()
        .name(String::from("dealer"))
        .spawn(move || dealer.run(agents))
        .map_err(|source| {
            // The player threads were detached along with the closure.
            handle.terminate();
            handle.players.iter().for_each(PlayerHandle::terminate);
            RefereeError::Spawn {
                name: String::from("dealer"),
                source,
            }
        })?;

    Ok(Session {
        handle,
        table,
        dealer,
    })
}

/// Runs a session to its end.
pub fn play_session(
    config: &Config,
    oracle: Arc<dyn SetOracle>,
    observer: Arc<dyn Observer>,
    rng: &mut StdRng,
) -> RefereeResult<GameSummary> {
    start_session(config, oracle, observer, rng)?.join()
}

fn abort(handle: &SessionHandle, agents: Vec<JoinHandle<RefereeResult<()>>>) {
    handle.terminate();
    for player in &handle.players {
        player.terminate();
    }
    if let Err(err) = join_agents(agents) {
        debug!(%err, "Player failed while aborting");
    }
}

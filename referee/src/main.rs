use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use referee::{
    feed_key_presses, start_session, GameSummary, InputEnd, Observers, Recorder, SessionHandle,
};
use setgame::{Config, Observer, TracingObserver};
use tracing::{error, info};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
struct Args {
    /// Path to a JSON config file; built-in defaults are used otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Number of players, overrides the config file
    #[arg(short, long)]
    players: Option<usize>,

    /// Number of human players, overrides the config file
    #[arg(long)]
    humans: Option<usize>,

    /// Terminate the session after this many seconds
    #[arg(short, long)]
    duration_secs: Option<u64>,

    /// Record the game's events as JSON files into this directory
    #[arg(short, long)]
    record_games_to_directory: Option<PathBuf>,

    /// A log level among "off", "error", "warn", "info", "debug", "trace"
    #[arg(short, long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    initialize_logging(args.log_level);

    // Get a random seed
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(players) = args.players {
        config.players = players;
    }
    if let Some(humans) = args.humans {
        config.humans = humans;
    }
    config.validate()?;

    let recorder = match args.record_games_to_directory {
        Some(dir_path) => Some(Arc::new(Recorder::new(dir_path)?)),
        None => None,
    };
    let mut observers: Vec<Arc<dyn Observer>> = vec![Arc::new(TracingObserver)];
    if let Some(recorder) = &recorder {
        observers.push(recorder.clone());
    }

    let session = start_session(
        &config,
        Arc::new(config.oracle()),
        Arc::new(Observers(observers)),
        &mut rng,
    )?;
    spawn_stdin_input(session.handle(), config.humans > 0)?;
    if let Some(secs) = args.duration_secs {
        spawn_time_limit(session.handle(), Duration::from_secs(secs))?;
    }

    let summary = session.join()?;

    if let Some(recorder) = &recorder {
        if let Some(path) = recorder.write_game_recording()? {
            info!(path = %path.display(), "Recording written");
        }
    }
    print_summary(&summary);
    Ok(())
}

/// Reads `<player> <slot>` lines from stdin. A `quit` line ends the session,
/// and so does the end of input if there are human players.
fn spawn_stdin_input(handle: SessionHandle, has_humans: bool) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name(String::from("stdin-input"))
        .spawn(move || {
            match feed_key_presses(std::io::stdin().lock(), handle.players()) {
                Ok(InputEnd::Quit) => handle.terminate(),
                Ok(InputEnd::EndOfInput) if has_humans => handle.terminate(),
                Ok(InputEnd::EndOfInput) => {}
                Err(err) => {
                    error!(%err, "Could not read input");
                    handle.terminate();
                }
            }
        })
        .context("Could not spawn the input thread")?;
    Ok(())
}

fn spawn_time_limit(handle: SessionHandle, limit: Duration) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name(String::from("time-limit"))
        .spawn(move || {
            std::thread::sleep(limit);
            info!(secs = limit.as_secs(), "Time limit reached");
            handle.terminate();
        })
        .context("Could not spawn the time limit thread")?;
    Ok(())
}

fn print_summary(summary: &GameSummary) {
    eprintln!("End result after {} rounds:", summary.rounds);
    for (idx, score) in summary.scores.iter().enumerate() {
        let is_winner = summary.winners.iter().any(|winner| winner.index() == idx);
        eprintln!(
            "- P{} scored {}{}",
            idx,
            score,
            if is_winner { " (winner)" } else { "" }
        );
    }
}

fn initialize_logging(level: LevelFilter) {
    let format = tracing_subscriber::fmt::format()
        .with_target(false)
        .compact();

    let filter = Targets::new().with_default(level);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().event_format(format))
        .with(filter)
        .init();
}

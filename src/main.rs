//! oinkoink: best-first search engine for gravity connection games.
//!
//! ## Usage
//!
//! - `oinkoink` / `oinkoink demo` - Search the empty board and play one self-play game
//! - `oinkoink play` - Play against the engine over stdin/stdout
//! - `oinkoink match` - Pit two evaluators against each other
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for per-search
//! summaries.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;

use oinkoink::board::{Board, Geometry};
use oinkoink::console::ConsoleEngine;
use oinkoink::constants::{
    BATCH_SIZE, BATCH_WAIT_MS, DEFAULT_HEIGHT, DEFAULT_WIDTH, DEFAULT_WIN_LENGTH, N_SIMS,
    NUM_SAMPLING_MOVES, PB_C_BASE, PB_C_INIT, ROLLOUTS_PER_EVAL, ROOT_DIRICHLET_ALPHA,
    ROOT_EXPLORATION_FRACTION,
};
use oinkoink::evaluator::{BatchedEvaluator, Evaluator, MemoEvaluator};
use oinkoink::game::{play_game, play_match};
use oinkoink::mcts::SearchConfig;
use oinkoink::player::ComputerPlayer;
use oinkoink::{playout, scoring};

/// Best-first search engine for Connect-Four-style games
#[derive(Parser)]
#[command(name = "oinkoink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    search: SearchArgs,

    #[command(flatten)]
    board: BoardArgs,

    /// Scoring function for the engine
    #[arg(long, value_enum, default_value_t = EvaluatorKind::Centre, global = true)]
    evaluator: EvaluatorKind,

    /// Seed for move sampling, root noise, and rollouts
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the empty board, then play one self-play game
    Demo,
    /// Play against the engine with a line-based text protocol
    Play,
    /// Play a match between the engine and an opponent evaluator
    Match {
        /// Number of games
        #[arg(long, default_value_t = 10)]
        games: usize,
        /// Scoring function for the opponent
        #[arg(long, value_enum, default_value_t = EvaluatorKind::Uniform)]
        opponent: EvaluatorKind,
        /// Keep the engine on o instead of alternating colours
        #[arg(long)]
        no_switch: bool,
    },
}

#[derive(Args)]
struct SearchArgs {
    /// Simulations per move
    #[arg(long, default_value_t = N_SIMS, global = true)]
    simulations: usize,
    #[arg(long, default_value_t = PB_C_BASE, global = true)]
    pb_c_base: f32,
    #[arg(long, default_value_t = PB_C_INIT, global = true)]
    pb_c_init: f32,
    /// Sample moves by visit count for this many plies
    #[arg(long, default_value_t = NUM_SAMPLING_MOVES, global = true)]
    sampling_moves: usize,
    #[arg(long, default_value_t = ROOT_DIRICHLET_ALPHA, global = true)]
    dirichlet_alpha: f32,
    /// Share of the root prior replaced by Dirichlet noise
    #[arg(long, default_value_t = ROOT_EXPLORATION_FRACTION, global = true)]
    exploration_fraction: f32,
}

impl SearchArgs {
    fn to_config(&self) -> Result<SearchConfig> {
        let config = SearchConfig {
            simulations: self.simulations,
            pb_c_base: self.pb_c_base,
            pb_c_init: self.pb_c_init,
            num_sampling_moves: self.sampling_moves,
            root_dirichlet_alpha: self.dirichlet_alpha,
            root_exploration_fraction: self.exploration_fraction,
        };
        config.validate().context("invalid search options")?;
        Ok(config)
    }
}

#[derive(Args)]
struct BoardArgs {
    #[arg(long, default_value_t = DEFAULT_HEIGHT, global = true)]
    height: usize,
    #[arg(long, default_value_t = DEFAULT_WIDTH, global = true)]
    width: usize,
    /// Pieces in a row needed to win
    #[arg(long, default_value_t = DEFAULT_WIN_LENGTH, global = true)]
    win_length: usize,
}

impl BoardArgs {
    fn to_geometry(&self) -> Result<Geometry> {
        Geometry::new(self.height, self.width, self.win_length).context("invalid board options")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum EvaluatorKind {
    /// Line-count heuristic
    Centre,
    /// Even value, flat prior
    Uniform,
    /// Random playouts scored in batches on a worker thread
    Rollout,
}

fn make_evaluator(kind: EvaluatorKind, seed: Option<u64>) -> Box<dyn Evaluator> {
    match kind {
        EvaluatorKind::Centre => Box::new(MemoEvaluator::new(scoring::centre)),
        EvaluatorKind::Uniform => Box::new(MemoEvaluator::new(scoring::uniform)),
        EvaluatorKind::Rollout => {
            let rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            let score = std::sync::Mutex::new(playout::rollout(ROLLOUTS_PER_EVAL, rng));
            Box::new(BatchedEvaluator::new(
                BATCH_SIZE,
                Duration::from_millis(BATCH_WAIT_MS),
                move |boards: &[Board]| {
                    let mut score = score.lock().unwrap_or_else(|e| e.into_inner());
                    boards.iter().map(|board| (*score)(board)).collect()
                },
            ))
        }
    }
}

fn make_player(
    name: &str,
    kind: EvaluatorKind,
    config: SearchConfig,
    seed: Option<u64>,
) -> ComputerPlayer {
    let player = ComputerPlayer::new(name, config, make_evaluator(kind, seed));
    match seed {
        Some(seed) => player.with_seed(seed),
        None => player,
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.search.to_config()?;
    let geometry = cli.board.to_geometry()?;

    match cli.command {
        Some(Commands::Play) => {
            let player = make_player("engine", cli.evaluator, config, cli.seed);
            let mut engine = ConsoleEngine::new(Board::new(geometry), player);
            engine.run(io::stdin().lock(), io::stdout().lock())?;
        }
        Some(Commands::Match {
            games,
            opponent,
            no_switch,
        }) => {
            let mut first = make_player("engine", cli.evaluator, config.clone(), cli.seed);
            let opponent_seed = cli.seed.map(|s| s.wrapping_add(1));
            let mut second = make_player("opponent", opponent, config, opponent_seed);
            let summary = play_match(games, &mut first, &mut second, geometry, !no_switch)?;
            println!("{summary}");
        }
        Some(Commands::Demo) | None => run_demo(cli.evaluator, cli.seed, config, geometry)?,
    }
    Ok(())
}

fn run_demo(
    kind: EvaluatorKind,
    seed: Option<u64>,
    config: SearchConfig,
    geometry: Geometry,
) -> Result<()> {
    println!("oinkoink: best-first search for connection games\n");

    println!("=== Search from the empty board ===");
    let mut player = make_player("engine", kind, config.clone(), seed);
    let mut board = Board::new(geometry);
    let record = player.make_move(&mut board)?;
    println!("{board}");
    println!(
        "Chose column {} with value {:.3} ({} simulations, {} evaluations)",
        record.mv, record.value, record.stats.simulations, record.stats.evaluations
    );
    let policy: Vec<String> = record.policy.iter().map(|p| format!("{p:.2}")).collect();
    println!("Visit policy: [{}]\n", policy.join(", "));

    println!("=== Self-play game ===");
    let mut o = make_player("o", kind, config.clone(), seed);
    let mut x = make_player("x", kind, config, seed.map(|s| s.wrapping_add(1)));
    let game = play_game(&mut o, &mut x, Board::new(geometry))?;
    let final_board = Board::from_moves(geometry, &game.moves);
    println!("{final_board}");
    println!("Moves: {:?}", game.moves);
    info!("demo game finished: {}", game.result);
    Ok(())
}

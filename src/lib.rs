//! oinkoink: best-first tree search for gravity connection games.
//!
//! Plays Connect-Four-family games (any height × width up to 64 cells, any
//! win length) with a PUCT-guided search over an arena tree. Positions reached
//! by different move orders share their statistics through an age-bucketed
//! transition table, and a slow or batched evaluator can leave evaluations in
//! flight while the search keeps going.
//!
//! ## Modules
//!
//! - [`constants`] - Default geometry, search parameters, and values
//! - [`board`] - Bit-grid board, rules, and results
//! - [`transition_table`] - Age-bucketed position caches
//! - [`node`] - Per-position statistics, evaluations, and proven results
//! - [`tree`] - Arena tree: selection, backpropagation, rerooting, move choice
//! - [`evaluator`] - Evaluator trait with synchronous and batched backends
//! - [`scoring`] / [`playout`] - Scoring functions to plug into evaluators
//! - [`mcts`] - The simulation loop
//! - [`player`] / [`game`] - Players, games, and matches
//! - [`console`] - Text protocol for playing against the engine
//!
//! ## Example
//!
//! ```
//! use oinkoink::board::Board;
//! use oinkoink::evaluator::MemoEvaluator;
//! use oinkoink::mcts::{SearchConfig, search};
//! use oinkoink::scoring;
//! use oinkoink::tree::Tree;
//!
//! let mut tree = Tree::new(Board::default());
//! let mut evaluator = MemoEvaluator::new(scoring::centre);
//! let config = SearchConfig::default().with_simulations(200);
//!
//! let stats = search(&config, &mut tree, &mut evaluator).unwrap();
//! let best = tree.select_best_move().unwrap();
//! println!("{} simulations, best column {}", stats.simulations, best.mv);
//! ```

pub mod board;
pub mod console;
pub mod constants;
pub mod evaluator;
pub mod game;
pub mod mcts;
pub mod node;
pub mod player;
pub mod playout;
pub mod scoring;
pub mod transition_table;
pub mod tree;

//! Search-backed player.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::board::Board;
use crate::evaluator::Evaluator;
use crate::mcts::{SearchConfig, SearchError, SearchStats, choose_move, search_with_rng};
use crate::tree::Tree;

/// What a player decided on one turn.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveRecord {
    pub mv: usize,
    /// Value of the chosen move for the side that played it.
    pub value: f32,
    /// Root visit distribution over the columns.
    pub policy: Vec<f32>,
    pub stats: SearchStats,
}

/// Keeps one search tree across turns and reroots it onto each new position.
pub struct ComputerPlayer {
    name: String,
    config: SearchConfig,
    evaluator: Box<dyn Evaluator>,
    tree: Option<Tree>,
    rng: fastrand::Rng,
    noise_rng: StdRng,
}

impl ComputerPlayer {
    pub fn new(name: impl Into<String>, config: SearchConfig, evaluator: Box<dyn Evaluator>) -> Self {
        Self {
            name: name.into(),
            config,
            evaluator,
            tree: None,
            rng: fastrand::Rng::new(),
            noise_rng: StdRng::from_entropy(),
        }
    }

    /// Make move sampling and root noise reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self.noise_rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The tree from the last search, if any.
    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Forget the search tree, e.g. before a new game.
    pub fn reset(&mut self) {
        self.tree = None;
    }

    /// Search `board`, play the chosen move on it, and report the decision.
    pub fn make_move(&mut self, board: &mut Board) -> Result<MoveRecord, SearchError> {
        let tree = self.tree.get_or_insert_with(|| Tree::new(*board));
        tree.update_root(board);
        self.evaluator.evict_below(board.age());

        let stats = search_with_rng(&self.config, tree, self.evaluator.as_mut(), &mut self.noise_rng)?;
        // A tiny budget can end before the root is expanded.
        let root = tree.root();
        tree.expand_node(root);
        let choice = choose_move(&self.config, tree, &mut self.rng)
            .ok_or(SearchError::NoMove { age: board.age() })?;
        let policy = tree.policy();

        board.play(choice.mv);
        Ok(MoveRecord {
            mv: choice.mv,
            value: choice.value,
            policy,
            stats,
        })
    }
}

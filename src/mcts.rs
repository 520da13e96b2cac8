//! Best-first tree search driver.
//!
//! Each simulation descends from the root by PUCT score, expands a node the
//! second time it is reached, and then either backpropagates an exact result
//! (terminal board or proven node) or asks the evaluator for a value.
//!
//! An evaluator may answer `Pending`. The leaf then gets a placeholder and a
//! ghost visit on its whole path, and is parked in a FIFO queue. Finished
//! results are drained between simulations, stopping at the first entry still
//! in flight, and the queue is drained to empty (blocking) once the budget is
//! spent.

use std::collections::VecDeque;

use log::{debug, trace, warn};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use thiserror::Error;

use crate::constants::{
    N_SIMS, NUM_SAMPLING_MOVES, PB_C_BASE, PB_C_INIT, ROOT_DIRICHLET_ALPHA,
    ROOT_EXPLORATION_FRACTION,
};
use crate::evaluator::{Evaluation, Evaluator};
use crate::node::{PositionEvaluation, TerminalResult, normalise_prior};
use crate::tree::{MoveChoice, NodeId, Tree};

/// Search parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    /// Simulations per search.
    pub simulations: usize,
    pub pb_c_base: f32,
    pub pb_c_init: f32,
    /// Moves are sampled by visit count while the root is younger than this.
    pub num_sampling_moves: usize,
    pub root_dirichlet_alpha: f32,
    /// Share of the root prior replaced by noise.
    pub root_exploration_fraction: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            simulations: N_SIMS,
            pb_c_base: PB_C_BASE,
            pb_c_init: PB_C_INIT,
            num_sampling_moves: NUM_SAMPLING_MOVES,
            root_dirichlet_alpha: ROOT_DIRICHLET_ALPHA,
            root_exploration_fraction: ROOT_EXPLORATION_FRACTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("pb_c_base must be positive and finite, got {0}")]
    PbCBase(f32),
    #[error("pb_c_init must be non-negative and finite, got {0}")]
    PbCInit(f32),
    #[error("root exploration fraction must be within [0, 1], got {0}")]
    ExplorationFraction(f32),
    #[error("root dirichlet alpha must be positive when root noise is enabled, got {0}")]
    DirichletAlpha(f32),
}

impl SearchConfig {
    pub fn with_simulations(mut self, simulations: usize) -> Self {
        self.simulations = simulations;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.pb_c_base.is_finite() && self.pb_c_base > 0.0) {
            return Err(ConfigError::PbCBase(self.pb_c_base));
        }
        if !(self.pb_c_init.is_finite() && self.pb_c_init >= 0.0) {
            return Err(ConfigError::PbCInit(self.pb_c_init));
        }
        if !(0.0..=1.0).contains(&self.root_exploration_fraction) {
            return Err(ConfigError::ExplorationFraction(self.root_exploration_fraction));
        }
        let alpha = self.root_dirichlet_alpha;
        if self.root_exploration_fraction > 0.0 && !(alpha.is_finite() && alpha > 0.0) {
            return Err(ConfigError::DirichletAlpha(alpha));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("evaluator returned a non-finite evaluation at age {age}")]
    NonFiniteEvaluation { age: usize },
    #[error("no move to choose at age {age}")]
    NoMove { age: usize },
}

/// Counters for one call to [`search`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub simulations: usize,
    /// Real evaluations backpropagated, immediate or resolved from the queue.
    pub evaluations: usize,
    /// Evaluations answered `Pending`.
    pub ghosts: usize,
    /// Simulations that ended on a terminal board or proven node.
    pub terminal_visits: usize,
    /// Longest the pending queue got.
    pub max_pending: usize,
}

/// Blend Dirichlet noise into `prior` over the legal moves, then renormalise.
///
/// With `alpha` or `fraction` at zero only the masking and renormalising apply.
pub fn add_exploration_noise<R: Rng + ?Sized>(
    prior: &mut [f32],
    legal_moves: &[usize],
    alpha: f32,
    fraction: f32,
    rng: &mut R,
) {
    if alpha > 0.0 && fraction > 0.0 && !legal_moves.is_empty() {
        if let Ok(gamma) = Gamma::new(alpha, 1.0) {
            let noise: Vec<f32> = legal_moves.iter().map(|_| gamma.sample(rng)).collect();
            let total: f32 = noise.iter().sum();
            if total > 0.0 {
                for (&mv, n) in legal_moves.iter().zip(&noise) {
                    prior[mv] = prior[mv] * (1.0 - fraction) + fraction * n / total;
                }
            }
        }
    }
    let normalised = normalise_prior(prior, legal_moves, prior.len());
    prior.copy_from_slice(&normalised);
}

/// Run `config.simulations` simulations from the tree's root.
pub fn search(
    config: &SearchConfig,
    tree: &mut Tree,
    evaluator: &mut dyn Evaluator,
) -> Result<SearchStats, SearchError> {
    search_with_rng(config, tree, evaluator, &mut rand::thread_rng())
}

/// [`search`] with an explicit source for the root noise.
pub fn search_with_rng<R: Rng + ?Sized>(
    config: &SearchConfig,
    tree: &mut Tree,
    evaluator: &mut dyn Evaluator,
    rng: &mut R,
) -> Result<SearchStats, SearchError> {
    config.validate()?;
    let mut run = SearchRun {
        config,
        tree,
        evaluator,
        rng,
        pending: VecDeque::new(),
        stats: SearchStats::default(),
        root_noise_done: false,
    };

    let root = run.tree.root();
    let root_data = run.tree.data(root);
    if root_data.is_evaluated() && !root_data.pending {
        run.apply_root_noise();
    }

    for _ in 0..config.simulations {
        if run.root_decided() {
            break;
        }
        run.simulate()?;
        run.stats.simulations += 1;
        if run.evaluator.has_update() {
            run.drain(false)?;
        }
    }
    run.drain(true)?;

    let root = run.tree.root();
    let stats = run.stats;
    debug!(
        "search at age {}: {} sims, {} evals, {} ghosts, {} terminal, root visits {}",
        run.tree.root_board().age(),
        stats.simulations,
        stats.evaluations,
        stats.ghosts,
        stats.terminal_visits,
        run.tree.data(root).search_value.visit_count,
    );
    Ok(stats)
}

/// Pick the move to play after a search: sampled by visits early in the game,
/// greedy afterwards.
pub fn choose_move(
    config: &SearchConfig,
    tree: &Tree,
    rng: &mut fastrand::Rng,
) -> Option<MoveChoice> {
    if tree.root_board().age() < config.num_sampling_moves {
        tree.select_softmax_move(rng)
    } else {
        tree.select_best_move()
    }
}

struct SearchRun<'a, R: ?Sized> {
    config: &'a SearchConfig,
    tree: &'a mut Tree,
    evaluator: &'a mut dyn Evaluator,
    rng: &'a mut R,
    pending: VecDeque<NodeId>,
    stats: SearchStats,
    root_noise_done: bool,
}

impl<R: Rng + ?Sized> SearchRun<'_, R> {
    fn root_decided(&self) -> bool {
        let root = self.tree.data(self.tree.root());
        root.is_terminal() || root.board.is_terminal() || root.non_terminal_moves().is_empty()
    }

    fn simulate(&mut self) -> Result<(), SearchError> {
        let mut node = self.tree.root();
        while self.tree.has_children(node) && !self.tree.data(node).is_terminal() {
            match self.tree.select_child(self.config, node) {
                Some(child) => node = child,
                None => break,
            }
        }

        let data = self.tree.data(node);
        if data.is_evaluated()
            && !data.is_terminal()
            && !data.board.is_terminal()
            && !self.tree.has_children(node)
        {
            self.tree.expand_node(node);
            if let Some(child) = self.tree.select_child(self.config, node) {
                node = child;
            }
        }

        let data = self.tree.data(node);
        let board = data.board;
        let terminal = data
            .terminal_result
            .or_else(|| board.result().map(|result| TerminalResult::new(result, board.age())));
        if let Some(terminal) = terminal {
            self.tree.backpropagate_terminal(node, terminal);
            self.tree.backpropagate(node, terminal.result.value());
            self.stats.terminal_visits += 1;
            return Ok(());
        }

        match self.evaluator.evaluate(&board) {
            Evaluation::Ready(evaluation) => {
                let value = self.store_evaluation(node, &evaluation)?;
                self.tree.backpropagate(node, value);
            }
            Evaluation::Pending => {
                self.tree.data_mut(node).set_placeholder();
                self.tree.backpropagate_ghost(node);
                self.pending.push_back(node);
                self.stats.ghosts += 1;
                self.stats.max_pending = self.stats.max_pending.max(self.pending.len());
            }
        }
        Ok(())
    }

    /// Store a real evaluation on `node` and return its side-O value.
    fn store_evaluation(
        &mut self,
        node: NodeId,
        evaluation: &PositionEvaluation,
    ) -> Result<f32, SearchError> {
        if !evaluation.is_finite() {
            let age = self.tree.data(node).board.age();
            warn!("non-finite evaluation at age {age}: {evaluation:?}");
            return Err(SearchError::NonFiniteEvaluation { age });
        }
        let data = self.tree.data_mut(node);
        data.set_evaluation(evaluation);
        let value = data
            .position_evaluation
            .as_ref()
            .map_or(evaluation.value, |stored| stored.value);
        self.stats.evaluations += 1;

        if node == self.tree.root() {
            self.apply_root_noise();
        }
        Ok(value)
    }

    fn apply_root_noise(&mut self) {
        if self.root_noise_done {
            return;
        }
        self.root_noise_done = true;
        let (alpha, fraction) = (
            self.config.root_dirichlet_alpha,
            self.config.root_exploration_fraction,
        );
        let root = self.tree.root();
        let data = self.tree.data_mut(root);
        let legal_moves = data.legal_moves.clone();
        if let Some(evaluation) = data.position_evaluation.as_mut() {
            add_exploration_noise(&mut evaluation.prior, &legal_moves, alpha, fraction, &mut *self.rng);
        }
    }

    /// Resolve queued evaluations in order. Without `block`, stop at the first
    /// one still in flight.
    fn drain(&mut self, block: bool) -> Result<(), SearchError> {
        while let Some(&node) = self.pending.front() {
            let board = self.tree.data(node).board;
            match self.evaluator.poll(&board) {
                Some(evaluation) => {
                    self.pending.pop_front();
                    let value = self.store_evaluation(node, &evaluation)?;
                    self.tree.backpropagate_replace_ghost(node, value);
                    trace!("resolved ghost at age {}, {} left", board.age(), self.pending.len());
                }
                None if block => self.evaluator.wait_for_update(),
                None => break,
            }
        }
        Ok(())
    }
}

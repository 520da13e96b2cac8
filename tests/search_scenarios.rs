//! End-to-end search scenarios
//!
//! Drives the simulation loop through the public API: lazy expansion, proven
//! wins and losses, root priors, visit conservation, and in-flight
//! evaluations resolved in and out of order.

use std::collections::HashMap;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use oinkoink::board::{Board, GameResult, Geometry};
use oinkoink::evaluator::{BatchedEvaluator, Evaluation, Evaluator, MemoEvaluator};
use oinkoink::mcts::{SearchConfig, search, search_with_rng};
use oinkoink::node::{PositionEvaluation, TerminalResult};
use oinkoink::scoring;
use oinkoink::tree::{NodeId, Tree};

// =============================================================================
// Helpers
// =============================================================================

fn grid(rows: &[&str], mark: char) -> Vec<Vec<bool>> {
    rows.iter()
        .map(|row| row.chars().map(|c| c == mark).collect())
        .collect()
}

fn picture(rows: &[&str]) -> Board {
    Board::from_grids(Geometry::default(), &grid(rows, 'o'), &grid(rows, 'x')).unwrap()
}

fn even(board: &Board) -> PositionEvaluation {
    PositionEvaluation::uniform(0.5, board.width())
}

fn visits(tree: &Tree, id: NodeId) -> u32 {
    tree.data(id).search_value.visit_count
}

fn assert_no_ghosts(tree: &Tree) {
    for id in tree.node_ids() {
        assert_eq!(tree.data(id).search_value.ghost_count, 0);
    }
}

/// Answers `Pending` for every new board and releases results only when
/// polled for updates, every `every` calls. With `newest_first` only the most
/// recent request is released at a time, so results arrive out of order.
struct DelayedEvaluator {
    queued: Vec<Board>,
    ready: HashMap<Board, PositionEvaluation>,
    every: usize,
    newest_first: bool,
    calls: usize,
}

impl DelayedEvaluator {
    fn new(every: usize, newest_first: bool) -> Self {
        Self {
            queued: Vec::new(),
            ready: HashMap::new(),
            every,
            newest_first,
            calls: 0,
        }
    }

    fn release_all(&mut self) {
        for board in self.queued.drain(..) {
            self.ready.insert(board, scoring::centre(&board));
        }
    }
}

impl Evaluator for DelayedEvaluator {
    fn evaluate(&mut self, board: &Board) -> Evaluation {
        if let Some(evaluation) = self.ready.get(board) {
            return Evaluation::Ready(evaluation.clone());
        }
        if !self.queued.contains(board) {
            self.queued.push(*board);
        }
        Evaluation::Pending
    }

    fn has_update(&mut self) -> bool {
        self.calls += 1;
        if self.calls % self.every != 0 || self.queued.is_empty() {
            return false;
        }
        if self.newest_first {
            if let Some(board) = self.queued.pop() {
                self.ready.insert(board, scoring::centre(&board));
            }
        } else {
            self.release_all();
        }
        true
    }

    fn poll(&mut self, board: &Board) -> Option<PositionEvaluation> {
        self.ready.get(board).cloned()
    }

    fn wait_for_update(&mut self) {
        self.release_all();
    }
}

// =============================================================================
// Lazy expansion
// =============================================================================

#[test]
fn test_first_simulation_only_evaluates_root() {
    let config = SearchConfig::default().with_simulations(1);
    let mut tree = Tree::new(Board::default());
    let mut evaluator = MemoEvaluator::new(even);

    search(&config, &mut tree, &mut evaluator).unwrap();
    let root = tree.root();
    assert_eq!(visits(&tree, root), 1);
    assert!(!tree.has_children(root));
    assert!(tree.data(root).is_evaluated());

    // the second simulation expands the root and evaluates exactly one child
    search(&config, &mut tree, &mut evaluator).unwrap();
    assert_eq!(tree.children(root).count(), 7);
    let touched: Vec<usize> = tree
        .children(root)
        .filter(|&(_, child)| visits(&tree, child) > 0 || tree.data(child).is_evaluated())
        .map(|(mv, _)| mv)
        .collect();
    assert_eq!(touched, vec![0]);
    assert_eq!(visits(&tree, root), 2);
}

// =============================================================================
// Proven results
// =============================================================================

#[test]
fn test_immediate_win_is_proven() {
    let board = Board::from_moves(Geometry::default(), &[0, 0, 1, 1, 2, 2]);
    let config = SearchConfig::default().with_simulations(200);
    let mut tree = Tree::new(board);
    let mut evaluator = MemoEvaluator::new(even);

    let stats = search(&config, &mut tree, &mut evaluator).unwrap();
    let root = tree.root();
    let win = TerminalResult::new(GameResult::OWin, 7);
    assert_eq!(tree.data(root).terminal_result, Some(win));
    let winning_child = tree.child(root, 3).unwrap();
    assert_eq!(tree.data(winning_child).terminal_result, Some(win));
    assert!(stats.simulations < 200);

    let best = tree.select_best_move().unwrap();
    assert_eq!(best.mv, 3);
    assert_eq!(best.value, 1.0);

    // a proven root stays proven and is not searched again
    let again = search(&config, &mut tree, &mut evaluator).unwrap();
    assert_eq!(again.simulations, 0);
    assert_eq!(tree.data(root).terminal_result, Some(win));
}

#[test]
fn test_forced_loss_is_proven() {
    // x threatens both ends of its bottom row; every o reply loses at age 8
    let board = picture(&[
        ".......",
        ".......",
        ".......",
        ".......",
        ".ooo...",
        ".xxx...",
    ]);
    let config = SearchConfig::default().with_simulations(5000);
    let mut tree = Tree::new(board);
    let mut evaluator = MemoEvaluator::new(even);

    let stats = search(&config, &mut tree, &mut evaluator).unwrap();
    let root = tree.root();
    assert_eq!(
        tree.data(root).terminal_result,
        Some(TerminalResult::new(GameResult::XWin, 8))
    );
    assert!(stats.simulations < 5000);
    for (_, child) in tree.children(root) {
        assert_eq!(
            tree.data(child).terminal_result.map(|t| t.result),
            Some(GameResult::XWin)
        );
    }

    let best = tree.select_best_move().unwrap();
    assert_eq!(best.mv, 0);
    assert_eq!(best.value, 0.0);
}

// =============================================================================
// Root prior
// =============================================================================

#[test]
fn test_root_prior_is_masked_and_normalised() {
    // column 0 is full
    let board = Board::from_moves(Geometry::default(), &[0, 0, 0, 0, 0, 0]);
    let config = SearchConfig::default().with_simulations(10);
    let mut tree = Tree::new(board);
    let mut evaluator = MemoEvaluator::new(|_: &Board| {
        PositionEvaluation::new(0.5, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0])
    });

    search(&config, &mut tree, &mut evaluator).unwrap();
    let prior = &tree.data(tree.root()).position_evaluation.as_ref().unwrap().prior;
    assert_eq!(prior[0], 0.0);
    for mv in 1..7 {
        let expected = (mv + 1) as f32 / 27.0;
        assert!((prior[mv] - expected).abs() < 1e-6, "column {mv}: {}", prior[mv]);
    }
}

#[test]
fn test_root_noise_keeps_prior_on_legal_moves() {
    let board = Board::from_moves(Geometry::default(), &[0, 0, 0, 0, 0, 0]);
    let config = SearchConfig {
        root_dirichlet_alpha: 0.3,
        root_exploration_fraction: 0.25,
        ..SearchConfig::default().with_simulations(10)
    };
    let mut tree = Tree::new(board);
    let mut evaluator = MemoEvaluator::new(scoring::centre);

    search_with_rng(&config, &mut tree, &mut evaluator, &mut StdRng::seed_from_u64(3)).unwrap();
    let prior = &tree.data(tree.root()).position_evaluation.as_ref().unwrap().prior;
    assert_eq!(prior[0], 0.0);
    assert!((prior.iter().sum::<f32>() - 1.0).abs() < 1e-5);
}

// =============================================================================
// Visit conservation
// =============================================================================

#[test]
fn test_each_simulation_adds_one_visit_per_path_node() {
    let config = SearchConfig::default().with_simulations(1);
    let mut tree = Tree::new(Board::default());
    let mut evaluator = MemoEvaluator::new(scoring::centre);

    for _ in 0..300 {
        let before: HashMap<NodeId, u32> =
            tree.node_ids().map(|id| (id, visits(&tree, id))).collect();
        search(&config, &mut tree, &mut evaluator).unwrap();

        let root = tree.root();
        assert_eq!(visits(&tree, root), before[&root] + 1);
        for id in tree.node_ids() {
            let delta = visits(&tree, id) - before.get(&id).copied().unwrap_or(0);
            assert!(delta <= 1, "node gained {delta} visits in one simulation");
        }
    }

    // every visit after the root's own evaluation went through one child
    let root = tree.root();
    let child_visits: u32 = tree.children(root).map(|(_, child)| visits(&tree, child)).sum();
    assert_eq!(child_visits, visits(&tree, root) - 1);
}

// =============================================================================
// In-flight evaluations
// =============================================================================

#[test]
fn test_ghosts_resolved_in_order() {
    let config = SearchConfig::default().with_simulations(200);
    let mut tree = Tree::new(Board::default());
    let mut evaluator = DelayedEvaluator::new(3, false);

    let stats = search(&config, &mut tree, &mut evaluator).unwrap();
    assert!(stats.ghosts > 0);
    assert_eq!(stats.simulations, 200);
    assert_eq!(stats.simulations, stats.evaluations + stats.terminal_visits);
    assert_eq!(visits(&tree, tree.root()), 200);
    assert_no_ghosts(&tree);
    assert!(tree.data(tree.root()).search_value.mean().is_some());
}

#[test]
fn test_ghosts_resolved_out_of_order() {
    let config = SearchConfig::default().with_simulations(200);
    let mut tree = Tree::new(Board::default());
    let mut evaluator = DelayedEvaluator::new(2, true);

    let stats = search(&config, &mut tree, &mut evaluator).unwrap();
    assert!(stats.max_pending > 1);
    assert_eq!(visits(&tree, tree.root()), 200);
    assert_no_ghosts(&tree);
    for id in tree.node_ids() {
        assert!(!tree.data(id).pending);
    }
}

#[test]
fn test_search_with_batched_evaluator() {
    let config = SearchConfig::default().with_simulations(150);
    let mut tree = Tree::new(Board::default());
    let mut evaluator = BatchedEvaluator::new(4, Duration::from_millis(1), |boards: &[Board]| {
        boards.iter().map(scoring::centre).collect()
    });

    let stats = search(&config, &mut tree, &mut evaluator).unwrap();
    assert_eq!(stats.simulations, 150);
    assert_eq!(visits(&tree, tree.root()), 150);
    assert_no_ghosts(&tree);
    assert!(tree.select_best_move().is_some());
    assert_eq!(evaluator.in_flight(), 0);
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_identical_searches_agree() {
    let config = SearchConfig {
        root_dirichlet_alpha: 0.3,
        root_exploration_fraction: 0.25,
        ..SearchConfig::default().with_simulations(300)
    };
    let run = || {
        let mut tree = Tree::new(Board::default());
        let mut evaluator = MemoEvaluator::new(scoring::centre);
        search_with_rng(&config, &mut tree, &mut evaluator, &mut StdRng::seed_from_u64(42))
            .unwrap();
        (tree.policy(), tree.select_best_move())
    };
    assert_eq!(run(), run());
}

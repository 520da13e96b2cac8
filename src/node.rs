//! Per-position search data.
//!
//! A [`NodeData`] is shared by every tree node that reaches the same board
//! (transpositions), so it holds only what depends on the position itself:
//! statistics, the evaluator's output, and proven results.

use std::collections::BTreeSet;

use crate::board::{Board, GameResult, Side, value_to_side};
use crate::constants::{LOSS_VALUE, WIN_VALUE};

/// Running value statistics, counting in-flight (ghost) visits separately.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SearchValue {
    /// Sum of backpropagated side-O values.
    pub value_sum: f32,
    pub visit_count: u32,
    pub ghost_count: u32,
}

impl SearchValue {
    pub fn add(&mut self, value: f32) {
        self.value_sum += value;
        self.visit_count += 1;
    }

    pub fn add_ghost(&mut self) {
        self.ghost_count += 1;
    }

    /// Turn one ghost visit into a real visit with the given value.
    ///
    /// # Panics
    /// If there is no ghost to replace.
    pub fn replace_ghost(&mut self, value: f32) {
        assert!(self.ghost_count > 0, "replace_ghost without a pending ghost");
        self.ghost_count -= 1;
        self.add(value);
    }

    /// Visits including ghosts.
    #[inline]
    pub fn total(&self) -> u32 {
        self.visit_count + self.ghost_count
    }

    /// Mean side-O value, or `None` before any (real or ghost) visit.
    pub fn mean(&self) -> Option<f32> {
        self.mean_for(Side::O)
    }

    /// Mean value for `side`. Ghost visits score as losses for whoever asks.
    pub fn mean_for(&self, side: Side) -> Option<f32> {
        let n = self.total();
        if n == 0 {
            return None;
        }
        let sum = match side {
            Side::O => self.value_sum,
            Side::X => self.visit_count as f32 * WIN_VALUE - self.value_sum,
        };
        Some(sum / n as f32)
    }
}

/// The evaluator's opinion of a position.
#[derive(Clone, Debug, PartialEq)]
pub struct PositionEvaluation {
    /// Desirability in `[0, 1]`. The evaluator reports it for the side to
    /// move; once stored on a node it is kept for side O.
    pub value: f32,
    /// One entry per column.
    pub prior: Vec<f32>,
}

impl PositionEvaluation {
    pub fn new(value: f32, prior: Vec<f32>) -> Self {
        Self { value, prior }
    }

    /// Flat prior over `width` columns with the given value.
    pub fn uniform(value: f32, width: usize) -> Self {
        Self {
            value,
            prior: vec![1.0 / width as f32; width],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.prior.iter().all(|p| p.is_finite())
    }
}

/// Zero out illegal columns and rescale to sum to one.
///
/// Falls back to a flat distribution over legal columns when they carry no mass.
pub fn normalise_prior(prior: &[f32], legal_moves: &[usize], width: usize) -> Vec<f32> {
    let mut out = vec![0.0; width];
    for &mv in legal_moves {
        out[mv] = prior.get(mv).copied().unwrap_or(0.0).max(0.0);
    }
    let total: f32 = out.iter().sum();
    if total > 0.0 {
        out.iter_mut().for_each(|p| *p /= total);
    } else if !legal_moves.is_empty() {
        let flat = 1.0 / legal_moves.len() as f32;
        for &mv in legal_moves {
            out[mv] = flat;
        }
    }
    out
}

/// A proven outcome and the ply at which it is forced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TerminalResult {
    pub result: GameResult,
    pub age: usize,
}

impl TerminalResult {
    pub fn new(result: GameResult, age: usize) -> Self {
        Self { result, age }
    }

    /// Age used when comparing lines. Draws count as lasting the whole game.
    pub fn effective_age(&self, area: usize) -> usize {
        match self.result {
            GameResult::Draw => area,
            _ => self.age,
        }
    }
}

/// Search state for one board.
#[derive(Clone, Debug)]
pub struct NodeData {
    pub board: Board,
    pub legal_moves: Vec<usize>,
    pub search_value: SearchValue,
    /// Normalised evaluation, value for side O.
    pub position_evaluation: Option<PositionEvaluation>,
    /// The evaluation above is a placeholder until the evaluator answers.
    pub pending: bool,
    pub terminal_result: Option<TerminalResult>,
    /// Children already proven, excluded from ordinary selection.
    pub terminal_moves: BTreeSet<usize>,
}

impl NodeData {
    pub fn new(board: Board) -> Self {
        Self {
            legal_moves: board.legal_moves(),
            board,
            search_value: SearchValue::default(),
            position_evaluation: None,
            pending: false,
            terminal_result: None,
            terminal_moves: BTreeSet::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_result.is_some()
    }

    pub fn is_evaluated(&self) -> bool {
        self.position_evaluation.is_some()
    }

    /// Legal moves not yet proven terminal, ascending.
    pub fn non_terminal_moves(&self) -> Vec<usize> {
        self.legal_moves
            .iter()
            .copied()
            .filter(|mv| !self.terminal_moves.contains(mv))
            .collect()
    }

    /// Store an evaluation reported for the side to move, normalising the prior
    /// and converting the value to side O.
    pub fn set_evaluation(&mut self, evaluation: &PositionEvaluation) {
        let mover = self.board.side_to_move();
        let prior = normalise_prior(&evaluation.prior, &self.legal_moves, self.board.width());
        self.position_evaluation = Some(PositionEvaluation {
            value: value_to_side(evaluation.value, mover),
            prior,
        });
        self.pending = false;
    }

    /// Attach a loss-for-the-mover value and flat prior while the real
    /// evaluation is in flight.
    pub fn set_placeholder(&mut self) {
        let mover = self.board.side_to_move();
        let width = self.board.width();
        self.position_evaluation = Some(PositionEvaluation {
            value: value_to_side(LOSS_VALUE, mover),
            prior: normalise_prior(&vec![1.0; width], &self.legal_moves, width),
        });
        self.pending = true;
    }

    /// Value of this position for `side`: proven result first, then search
    /// statistics, then the stored evaluation.
    pub fn value(&self, side: Side) -> Option<f32> {
        if let Some(terminal) = self.terminal_result {
            return Some(terminal.result.value_for(side));
        }
        if let Some(mean) = self.search_value.mean_for(side) {
            return Some(mean);
        }
        self.position_evaluation
            .as_ref()
            .map(|eval| value_to_side(eval.value, side))
    }
}

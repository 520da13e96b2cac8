//! Monte Carlo playouts (random game simulation).
//!
//! A playout drops pieces into uniformly random legal columns until the game
//! ends. [`rollout`] turns a number of playouts into a scoring function for
//! [`crate::evaluator::MemoEvaluator`].

use crate::board::{Board, GameResult};
use crate::node::PositionEvaluation;

/// Play random legal moves from `board` until the game is decided.
pub fn playout(board: &Board, rng: &mut fastrand::Rng) -> GameResult {
    let mut board = *board;
    loop {
        if let Some(result) = board.result() {
            return result;
        }
        let moves = board.legal_moves();
        board.play(moves[rng.usize(..moves.len())]);
    }
}

/// Scoring function averaging `n` playouts, value for the side to move.
///
/// The prior is flat; the tree masks it to the legal columns.
pub fn rollout(n: usize, mut rng: fastrand::Rng) -> impl FnMut(&Board) -> PositionEvaluation {
    let n = n.max(1);
    move |board: &Board| {
        let mover = board.side_to_move();
        let total: f32 = (0..n)
            .map(|_| playout(board, &mut rng).value_for(mover))
            .sum();
        PositionEvaluation::uniform(total / n as f32, board.width())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Geometry;

    #[test]
    fn test_playout_reaches_terminal() {
        let mut rng = fastrand::Rng::with_seed(1);
        for _ in 0..20 {
            playout(&Board::default(), &mut rng);
        }
    }

    #[test]
    fn test_playout_of_decided_board() {
        let board = Board::from_moves(Geometry::default(), &[0, 0, 1, 1, 2, 2, 3]);
        let mut rng = fastrand::Rng::with_seed(1);
        assert_eq!(playout(&board, &mut rng), GameResult::OWin);
    }

    #[test]
    fn test_rollout_value_for_mover() {
        // o has an open three on the bottom row with x to move
        let board = Board::from_moves(Geometry::default(), &[1, 1, 2, 2, 3]);
        let mut score = rollout(200, fastrand::Rng::with_seed(3));
        let evaluation = score(&board);
        assert!(evaluation.value < 0.5);
        assert_eq!(evaluation.prior.len(), 7);
    }

    #[test]
    fn test_rollout_is_seeded() {
        let board = Board::from_moves(Geometry::default(), &[3, 3]);
        let a = rollout(10, fastrand::Rng::with_seed(9))(&board);
        let b = rollout(10, fastrand::Rng::with_seed(9))(&board);
        assert_eq!(a, b);
    }
}

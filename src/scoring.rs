//! Cheap heuristic scoring functions for [`crate::evaluator::MemoEvaluator`].

use crate::board::{Board, Geometry, Side, value_to_side};
use crate::constants::DRAW_VALUE;
use crate::node::PositionEvaluation;

/// Number of winning lines that pass through each cell, indexed `[row][col]`.
pub fn line_counts(geometry: Geometry) -> Vec<Vec<u32>> {
    let (h, w, k) = (
        geometry.height() as isize,
        geometry.width() as isize,
        geometry.win_length() as isize,
    );
    let mut counts = vec![vec![0u32; w as usize]; h as usize];
    for (dr, dc) in [(0, 1), (1, 0), (1, 1), (1, -1)] {
        for row in 0..h {
            for col in 0..w {
                let (end_row, end_col) = (row + (k - 1) * dr, col + (k - 1) * dc);
                if !(0..h).contains(&end_row) || !(0..w).contains(&end_col) {
                    continue;
                }
                for i in 0..k {
                    counts[(row + i * dr) as usize][(col + i * dc) as usize] += 1;
                }
            }
        }
    }
    counts
}

/// Favour pieces on cells that take part in many lines.
///
/// The side-O value is `0.5 + (o - x) / total`, where `o` and `x` sum the line
/// counts under each side's pieces and `total` sums them over the whole board.
/// The prior is the column totals, normalised.
pub fn centre(board: &Board) -> PositionEvaluation {
    let geometry = board.geometry();
    let counts = line_counts(geometry);
    let total: u32 = counts.iter().flatten().sum();

    let mut balance = 0i64;
    for (row, line) in counts.iter().enumerate() {
        for (col, &count) in line.iter().enumerate() {
            match board.cell(row, col) {
                Some(Side::O) => balance += count as i64,
                Some(Side::X) => balance -= count as i64,
                None => {}
            }
        }
    }

    let value = match board.result() {
        Some(result) => result.value(),
        None if total == 0 => DRAW_VALUE,
        None => (DRAW_VALUE + balance as f32 / total as f32).clamp(0.0, 1.0),
    };

    let columns: Vec<f32> = (0..geometry.width())
        .map(|col| counts.iter().map(|line| line[col]).sum::<u32>() as f32)
        .collect();
    let mass: f32 = columns.iter().sum();
    let prior = if mass > 0.0 {
        columns.iter().map(|c| c / mass).collect()
    } else {
        vec![1.0 / geometry.width() as f32; geometry.width()]
    };

    PositionEvaluation::new(value_to_side(value, board.side_to_move()), prior)
}

/// Even value and flat prior for every position.
pub fn uniform(board: &Board) -> PositionEvaluation {
    PositionEvaluation::uniform(DRAW_VALUE, board.width())
}

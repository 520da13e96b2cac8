//! Integration tests for oinkoink
//!
//! Board rules on several geometries, the transition tables, and the
//! evaluators, exercised through the public API only.

use std::time::Duration;

use oinkoink::board::{Board, BoardError, GameResult, Geometry, Side};
use oinkoink::evaluator::{BatchedEvaluator, Evaluation, Evaluator, MemoEvaluator};
use oinkoink::node::PositionEvaluation;
use oinkoink::scoring;
use oinkoink::transition_table::{SharedTransitionTable, TableError, TransitionTable};

// =============================================================================
// Helper functions for setting up test positions
// =============================================================================

/// Occupancy grid for `mark`, rows listed top to bottom.
fn grid(rows: &[&str], mark: char) -> Vec<Vec<bool>> {
    rows.iter()
        .map(|row| row.chars().map(|c| c == mark).collect())
        .collect()
}

/// Board from a picture using `o`, `x` and `.`, rows top to bottom.
fn picture(geometry: Geometry, rows: &[&str]) -> Result<Board, BoardError> {
    Board::from_grids(geometry, &grid(rows, 'o'), &grid(rows, 'x'))
}

fn standard(moves: &[usize]) -> Board {
    Board::from_moves(Geometry::default(), moves)
}

// =============================================================================
// Board rules
// =============================================================================

#[test]
fn test_alternating_sides() {
    let mut board = Board::default();
    assert_eq!(board.side_to_move(), Side::O);
    board.play(0);
    assert_eq!(board.side_to_move(), Side::X);
    board.play(0);
    assert_eq!(board.side_to_move(), Side::O);
    assert_eq!(board.age(), 2);
}

#[test]
fn test_win_is_reported_by_play() {
    let mut board = standard(&[0, 6, 1, 6, 2, 6]);
    assert_eq!(board.play(3), Some(GameResult::OWin));
    assert!(board.legal_moves().is_empty());
}

#[test]
fn test_picture_matches_replay() {
    let rows = [
        ".......",
        ".......",
        ".......",
        "...o...",
        "..xx...",
        "..oox..",
    ];
    let board = picture(Geometry::default(), &rows).unwrap();
    assert_eq!(board, standard(&[2, 2, 3, 3, 3, 4]));
    assert_eq!(board.cell(2, 3), Some(Side::O));
    assert_eq!(board.result(), None);
}

#[test]
fn test_picture_with_existing_win() {
    let rows = ["x...", "xo..", "xo..", "xoo."];
    let board = picture(Geometry::new(4, 4, 4).unwrap(), &rows).unwrap();
    assert_eq!(board.result(), Some(GameResult::XWin));
    assert!(board.legal_moves().is_empty());
}

#[test]
fn test_picture_rejects_wrong_shape() {
    let rows = [".......", "......."];
    assert_eq!(
        picture(Geometry::default(), &rows),
        Err(BoardError::Shape {
            height: 6,
            width: 7
        })
    );
}

#[test]
fn test_small_geometry_diagonal() {
    // 3 in a row on a 4x4 board
    let g = Geometry::new(4, 4, 3).unwrap();
    let board = Board::from_moves(g, &[0, 1, 1, 2, 3, 2, 2]);
    assert_eq!(board.result(), Some(GameResult::OWin));
}

#[test]
fn test_full_board_draw_on_wide_board() {
    // 1 row, 4 columns, need all 4: alternating play can never win
    let g = Geometry::new(1, 4, 4).unwrap();
    let board = Board::from_moves(g, &[0, 1, 2, 3]);
    assert_eq!(board.result(), Some(GameResult::Draw));
    assert_eq!(board.age(), g.area());
}

#[test]
fn test_display_has_header_and_rows() {
    let text = standard(&[3]).to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0], "0 1 2 3 4 5 6");
    assert_eq!(lines[6], "- - - o - - -");
}

// =============================================================================
// Transition tables
// =============================================================================

#[test]
fn test_table_eviction_by_age() {
    // positions at ages 5, 6 and 7
    let boards = [
        standard(&[0, 1, 2, 3, 4]),
        standard(&[0, 1, 2, 3, 4, 5]),
        standard(&[0, 1, 2, 3, 4, 5, 6]),
    ];
    let mut table = TransitionTable::new();
    for (i, board) in boards.iter().enumerate() {
        table.put(*board, i);
    }
    table.evict_below(6);

    assert_eq!(table.get(&boards[0]), Err(TableError::NotFound { age: 5 }));
    assert_eq!(table.get(&boards[1]), Ok(&1));
    assert_eq!(table.get(&boards[2]), Ok(&2));
}

#[test]
fn test_shared_table_matches_plain_table() {
    let shared = SharedTransitionTable::new();
    let mut plain = TransitionTable::new();
    for mv in 0..7 {
        let board = standard(&[mv, (mv + 1) % 7]);
        shared.put(board, mv);
        plain.put(board, mv);
    }
    assert_eq!(shared.len(), plain.len());
    for mv in 0..7 {
        let board = standard(&[mv, (mv + 1) % 7]);
        assert_eq!(shared.get(&board).ok(), plain.get(&board).ok().copied());
    }
}

// =============================================================================
// Evaluators
// =============================================================================

#[test]
fn test_memo_evaluator_through_trait_object() {
    let mut evaluator: Box<dyn Evaluator> = Box::new(MemoEvaluator::new(scoring::centre));
    let board = standard(&[3, 3]);
    assert!(!evaluator.has_update());
    let Evaluation::Ready(evaluation) = evaluator.evaluate(&board) else {
        panic!("memo evaluator never defers");
    };
    assert_eq!(evaluator.poll(&board), Some(evaluation));
}

#[test]
fn test_batched_evaluator_matches_memo() {
    let mut batched = BatchedEvaluator::new(8, Duration::from_millis(1), |boards: &[Board]| {
        boards.iter().map(scoring::centre).collect()
    });
    let mut memo = MemoEvaluator::new(scoring::centre);

    let boards: Vec<Board> = (0..7).map(|mv| standard(&[mv])).collect();
    for board in &boards {
        assert_eq!(batched.evaluate(board), Evaluation::Pending);
    }
    for board in &boards {
        let result = loop {
            if let Some(result) = batched.poll(board) {
                break result;
            }
            batched.wait_for_update();
        };
        assert_eq!(Evaluation::Ready(result), memo.evaluate(board));
    }
}

#[test]
fn test_batched_evaluator_evicts_results() {
    let mut batched = BatchedEvaluator::new(1, Duration::from_millis(1), |boards: &[Board]| {
        boards
            .iter()
            .map(|b| PositionEvaluation::uniform(0.5, b.width()))
            .collect()
    });
    let board = standard(&[0]);
    batched.evaluate(&board);
    while batched.poll(&board).is_none() {
        batched.wait_for_update();
    }
    batched.evict_below(2);
    assert_eq!(batched.poll(&board), None);
}

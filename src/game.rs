//! Games and matches between two computer players.

use std::fmt;

use log::{debug, info};

use crate::board::{Board, GameResult, Geometry, Side};
use crate::mcts::SearchError;
use crate::player::ComputerPlayer;

/// Everything recorded while playing one game.
#[derive(Clone, Debug, PartialEq)]
pub struct GameRecord {
    /// Position before each move.
    pub boards: Vec<Board>,
    pub moves: Vec<usize>,
    /// Search value of each chosen move for the side that played it.
    pub values: Vec<f32>,
    /// Root visit distribution behind each move.
    pub policies: Vec<Vec<f32>>,
    pub result: GameResult,
}

impl GameRecord {
    /// Final result scored for the side to move in each recorded position.
    pub fn training_values(&self) -> Vec<f32> {
        self.boards
            .iter()
            .map(|board| self.result.value_for(board.side_to_move()))
            .collect()
    }
}

/// Play `o` against `x` from `board` until the game is decided.
pub fn play_game(
    o: &mut ComputerPlayer,
    x: &mut ComputerPlayer,
    board: Board,
) -> Result<GameRecord, SearchError> {
    let mut board = board;
    let mut record = GameRecord {
        boards: Vec::new(),
        moves: Vec::new(),
        values: Vec::new(),
        policies: Vec::new(),
        result: GameResult::Draw,
    };

    record.result = loop {
        if let Some(result) = board.result() {
            break result;
        }
        record.boards.push(board);
        let player = match board.side_to_move() {
            Side::O => &mut *o,
            Side::X => &mut *x,
        };
        let decision = player.make_move(&mut board)?;
        debug!(
            "{} plays {} (value {:.3})",
            player.name(),
            decision.mv,
            decision.value
        );
        record.moves.push(decision.mv);
        record.values.push(decision.value);
        record.policies.push(decision.policy);
    };

    info!(
        "{} (o) vs {} (x): {} after {} moves",
        o.name(),
        x.name(),
        record.result,
        record.moves.len()
    );
    Ok(record)
}

/// Results of a match from the first player's point of view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
}

impl MatchSummary {
    pub fn games(&self) -> usize {
        self.wins + self.draws + self.losses
    }

    /// Wins plus half the draws, as a fraction of games played.
    pub fn score(&self) -> f32 {
        if self.games() == 0 {
            return 0.0;
        }
        (self.wins as f32 + 0.5 * self.draws as f32) / self.games() as f32
    }

    fn record(&mut self, result: GameResult, side: Side) {
        match result.winner() {
            Some(winner) if winner == side => self.wins += 1,
            Some(_) => self.losses += 1,
            None => self.draws += 1,
        }
    }
}

impl fmt::Display for MatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} wins, {} draws, {} losses (score {:.3})",
            self.wins,
            self.draws,
            self.losses,
            self.score()
        )
    }
}

/// Play `games` games between `first` and `second`.
///
/// `first` plays o unless `switch` is set, in which case the sides swap every
/// game. Trees are reset between games.
pub fn play_match(
    games: usize,
    first: &mut ComputerPlayer,
    second: &mut ComputerPlayer,
    geometry: Geometry,
    switch: bool,
) -> Result<MatchSummary, SearchError> {
    let mut summary = MatchSummary::default();
    for game in 0..games {
        first.reset();
        second.reset();
        let swapped = switch && game % 2 == 1;
        let record = if swapped {
            play_game(second, first, Board::new(geometry))?
        } else {
            play_game(first, second, Board::new(geometry))?
        };
        let side = if swapped { Side::X } else { Side::O };
        summary.record(record.result, side);
        debug!("game {}: {} for {}", game + 1, record.result, first.name());
    }
    info!("{} vs {}: {}", first.name(), second.name(), summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::MemoEvaluator;
    use crate::mcts::SearchConfig;
    use crate::scoring;

    fn player(name: &str, simulations: usize, seed: u64) -> ComputerPlayer {
        ComputerPlayer::new(
            name,
            SearchConfig::default().with_simulations(simulations),
            Box::new(MemoEvaluator::new(scoring::centre)),
        )
        .with_seed(seed)
    }

    #[test]
    fn test_game_record_is_consistent() {
        let mut o = player("o", 30, 1);
        let mut x = player("x", 30, 2);
        let record = play_game(&mut o, &mut x, Board::default()).unwrap();

        let n = record.moves.len();
        assert!(n >= 7);
        assert_eq!(record.boards.len(), n);
        assert_eq!(record.values.len(), n);
        assert_eq!(record.policies.len(), n);
        for (i, board) in record.boards.iter().enumerate() {
            assert_eq!(board.age(), i);
            assert!(board.is_legal(record.moves[i]));
        }

        let replay = Board::from_moves(Geometry::default(), &record.moves);
        assert_eq!(replay.result(), Some(record.result));
    }

    #[test]
    fn test_training_values_follow_side_to_move() {
        let record = GameRecord {
            boards: vec![
                Board::default(),
                Board::from_moves(Geometry::default(), &[3]),
            ],
            moves: vec![3, 3],
            values: vec![0.5, 0.5],
            policies: vec![vec![], vec![]],
            result: GameResult::OWin,
        };
        assert_eq!(record.training_values(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_match_summary_score() {
        let summary = MatchSummary {
            wins: 2,
            draws: 1,
            losses: 1,
        };
        assert_eq!(summary.games(), 4);
        assert!((summary.score() - 0.625).abs() < 1e-6);
        assert_eq!(MatchSummary::default().score(), 0.0);
    }

    #[test]
    fn test_match_counts_every_game() {
        let mut first = player("a", 20, 3);
        let mut second = player("b", 20, 4);
        let summary = play_match(
            2,
            &mut first,
            &mut second,
            Geometry::new(4, 4, 3).unwrap(),
            true,
        )
        .unwrap();
        assert_eq!(summary.games(), 2);
    }
}

//! Gravity-drop connection board.
//!
//! Each side's pieces live in a `u64` bit-grid laid out column-major from the
//! bottom: cell `(row, col)` is bit `col * height + row`, with row 0 at the
//! bottom. Side O always moves first, so the side to move and the ply count
//! both follow from the piece counts.

use std::fmt;

use thiserror::Error;

use crate::constants::{
    DEFAULT_HEIGHT, DEFAULT_WIDTH, DEFAULT_WIN_LENGTH, DRAW_VALUE, LOSS_VALUE, MAX_CELLS,
    WIN_VALUE,
};

/// One of the two players.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Moves first.
    O,
    X,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::O => Side::X,
            Side::X => Side::O,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::O => write!(f, "o"),
            Side::X => write!(f, "x"),
        }
    }
}

/// Outcome of a finished position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GameResult {
    OWin,
    XWin,
    Draw,
}

impl GameResult {
    /// The side that won, if any.
    pub fn winner(self) -> Option<Side> {
        match self {
            GameResult::OWin => Some(Side::O),
            GameResult::XWin => Some(Side::X),
            GameResult::Draw => None,
        }
    }

    /// Canonical value from side O's point of view.
    pub fn value(self) -> f32 {
        match self {
            GameResult::OWin => WIN_VALUE,
            GameResult::XWin => LOSS_VALUE,
            GameResult::Draw => DRAW_VALUE,
        }
    }

    /// Value from the given side's point of view.
    pub fn value_for(self, side: Side) -> f32 {
        value_to_side(self.value(), side)
    }

    pub fn win_for(side: Side) -> GameResult {
        match side {
            Side::O => GameResult::OWin,
            Side::X => GameResult::XWin,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameResult::OWin => write!(f, "o wins"),
            GameResult::XWin => write!(f, "x wins"),
            GameResult::Draw => write!(f, "draw"),
        }
    }
}

/// Convert a side-O value to the given side's point of view (and back).
#[inline]
pub fn value_to_side(value: f32, side: Side) -> f32 {
    match side {
        Side::O => value,
        Side::X => WIN_VALUE - value,
    }
}

/// Errors raised when a board or geometry is rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("invalid geometry {height}x{width} with win length {win_length}")]
    InvalidGeometry {
        height: usize,
        width: usize,
        win_length: usize,
    },
    #[error("grid shape does not match {height}x{width}")]
    Shape { height: usize, width: usize },
    #[error("both sides occupy row {row} column {col}")]
    Overlap { row: usize, col: usize },
    #[error("piece at row {row} column {col} has an empty cell below it")]
    Floating { row: usize, col: usize },
    #[error("piece counts o={o} x={x} are not reachable by alternating play")]
    PieceCount { o: u32, x: u32 },
    #[error("side {0} is to move but has already won")]
    MoverAlreadyWon(Side),
}

/// Board dimensions and the connection length needed to win.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    height: u8,
    width: u8,
    win_length: u8,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT as u8,
            width: DEFAULT_WIDTH as u8,
            win_length: DEFAULT_WIN_LENGTH as u8,
        }
    }
}

impl Geometry {
    pub fn new(height: usize, width: usize, win_length: usize) -> Result<Self, BoardError> {
        let invalid = height == 0
            || width == 0
            || win_length == 0
            || height.checked_mul(width).is_none_or(|cells| cells > MAX_CELLS)
            || win_length > height.max(width);
        if invalid {
            return Err(BoardError::InvalidGeometry {
                height,
                width,
                win_length,
            });
        }
        Ok(Self {
            height: height as u8,
            width: width as u8,
            win_length: win_length as u8,
        })
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height as usize
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width as usize
    }

    #[inline]
    pub fn win_length(&self) -> usize {
        self.win_length as usize
    }

    /// Total number of cells; also the age of any full board.
    #[inline]
    pub fn area(&self) -> usize {
        self.height() * self.width()
    }

    #[inline]
    fn bit(&self, row: usize, col: usize) -> u64 {
        1u64 << (col * self.height() + row)
    }

    #[inline]
    fn column_mask(&self, col: usize) -> u64 {
        let h = self.height();
        // h < 64 unless the board is a single 64-cell column.
        let ones = if h >= 64 { u64::MAX } else { (1u64 << h) - 1 };
        ones << (col * h)
    }
}

/// Row/column steps for the four line directions.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// A position: two disjoint bit-grids plus the cached result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Board {
    geometry: Geometry,
    o_pieces: u64,
    x_pieces: u64,
    result: Option<GameResult>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(Geometry::default())
    }
}

impl Board {
    /// An empty board.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            o_pieces: 0,
            x_pieces: 0,
            result: None,
        }
    }

    /// Build a board from per-side occupancy grids, rows listed top to bottom.
    pub fn from_grids(
        geometry: Geometry,
        o_rows: &[Vec<bool>],
        x_rows: &[Vec<bool>],
    ) -> Result<Self, BoardError> {
        let (h, w) = (geometry.height(), geometry.width());
        let shape_ok = |rows: &[Vec<bool>]| rows.len() == h && rows.iter().all(|r| r.len() == w);
        if !shape_ok(o_rows) || !shape_ok(x_rows) {
            return Err(BoardError::Shape {
                height: h,
                width: w,
            });
        }

        let mut board = Self::new(geometry);
        for (i, (o_row, x_row)) in o_rows.iter().zip(x_rows).enumerate() {
            let row = h - 1 - i;
            for col in 0..w {
                if o_row[col] && x_row[col] {
                    return Err(BoardError::Overlap { row, col });
                }
                if o_row[col] {
                    board.o_pieces |= geometry.bit(row, col);
                }
                if x_row[col] {
                    board.x_pieces |= geometry.bit(row, col);
                }
            }
        }

        board.check_valid()?;
        board.result = board.scan_result();
        Ok(board)
    }

    /// Replay a sequence of moves from the empty board.
    ///
    /// # Panics
    /// If any move is illegal.
    pub fn from_moves(geometry: Geometry, moves: &[usize]) -> Self {
        let mut board = Self::new(geometry);
        for &mv in moves {
            board.play(mv);
        }
        board
    }

    fn check_valid(&self) -> Result<(), BoardError> {
        let g = self.geometry;
        let occupied = self.occupied();
        for col in 0..g.width() {
            let mut seen_empty = false;
            for row in 0..g.height() {
                let filled = occupied & g.bit(row, col) != 0;
                if filled && seen_empty {
                    return Err(BoardError::Floating { row, col });
                }
                seen_empty |= !filled;
            }
        }

        let o = self.o_pieces.count_ones();
        let x = self.x_pieces.count_ones();
        if o != x && o != x + 1 {
            return Err(BoardError::PieceCount { o, x });
        }

        let mover = self.side_to_move();
        if self.has_line(self.pieces(mover)) {
            return Err(BoardError::MoverAlreadyWon(mover));
        }
        Ok(())
    }

    #[inline]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.geometry.width()
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.geometry.area()
    }

    #[inline]
    fn occupied(&self) -> u64 {
        self.o_pieces | self.x_pieces
    }

    #[inline]
    fn pieces(&self, side: Side) -> u64 {
        match side {
            Side::O => self.o_pieces,
            Side::X => self.x_pieces,
        }
    }

    /// Number of pieces placed so far (ply count).
    #[inline]
    pub fn age(&self) -> usize {
        self.occupied().count_ones() as usize
    }

    pub fn side_to_move(&self) -> Side {
        if self.o_pieces.count_ones() == self.x_pieces.count_ones() {
            Side::O
        } else {
            Side::X
        }
    }

    /// The decided result, or `None` while the game is still running.
    #[inline]
    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.result.is_some()
    }

    /// Which side, if any, occupies the given cell (row 0 is the bottom).
    pub fn cell(&self, row: usize, col: usize) -> Option<Side> {
        if row >= self.geometry.height() || col >= self.geometry.width() {
            return None;
        }
        let bit = self.geometry.bit(row, col);
        if self.o_pieces & bit != 0 {
            Some(Side::O)
        } else if self.x_pieces & bit != 0 {
            Some(Side::X)
        } else {
            None
        }
    }

    #[inline]
    fn column_height(&self, col: usize) -> usize {
        (self.occupied() & self.geometry.column_mask(col)).count_ones() as usize
    }

    pub fn is_legal(&self, mv: usize) -> bool {
        self.result.is_none()
            && mv < self.geometry.width()
            && self.column_height(mv) < self.geometry.height()
    }

    /// Columns that can still receive a piece, ascending. Empty once decided.
    pub fn legal_moves(&self) -> Vec<usize> {
        (0..self.geometry.width())
            .filter(|&mv| self.is_legal(mv))
            .collect()
    }

    /// Drop a piece for the side to move into column `mv`.
    ///
    /// Returns the result after the move (`None` while undecided).
    ///
    /// # Panics
    /// If the move is illegal or the target cell is already occupied.
    pub fn play(&mut self, mv: usize) -> Option<GameResult> {
        assert!(self.is_legal(mv), "illegal move {mv} on\n{self}");
        let row = self.column_height(mv);
        let bit = self.geometry.bit(row, mv);
        assert!(self.occupied() & bit == 0, "cell {row},{mv} already occupied");

        let side = self.side_to_move();
        match side {
            Side::O => self.o_pieces |= bit,
            Side::X => self.x_pieces |= bit,
        }

        self.result = if self.line_through(self.pieces(side), row, mv) {
            Some(GameResult::win_for(side))
        } else if self.age() == self.area() {
            Some(GameResult::Draw)
        } else {
            None
        };
        self.result
    }

    /// Copy of the board with `mv` played.
    pub fn with_move(&self, mv: usize) -> Board {
        let mut next = *self;
        next.play(mv);
        next
    }

    fn occupied_by(&self, pieces: u64, row: isize, col: isize) -> bool {
        let g = self.geometry;
        row >= 0
            && col >= 0
            && (row as usize) < g.height()
            && (col as usize) < g.width()
            && pieces & g.bit(row as usize, col as usize) != 0
    }

    /// Whether `pieces` holds a full line passing through `(row, col)`.
    fn line_through(&self, pieces: u64, row: usize, col: usize) -> bool {
        let k = self.geometry.win_length();
        DIRECTIONS.iter().any(|&(dr, dc)| {
            let mut count = 1;
            for sign in [1isize, -1] {
                let (mut r, mut c) = (row as isize + sign * dr, col as isize + sign * dc);
                while self.occupied_by(pieces, r, c) {
                    count += 1;
                    r += sign * dr;
                    c += sign * dc;
                }
            }
            count >= k
        })
    }

    /// Whether `pieces` holds any full line anywhere on the board.
    fn has_line(&self, pieces: u64) -> bool {
        let g = self.geometry;
        let k = g.win_length() as isize;
        (0..g.height()).any(|row| {
            (0..g.width()).any(|col| {
                DIRECTIONS.iter().any(|&(dr, dc)| {
                    (0..k).all(|i| {
                        self.occupied_by(pieces, row as isize + i * dr, col as isize + i * dc)
                    })
                })
            })
        })
    }

    fn scan_result(&self) -> Option<GameResult> {
        if self.has_line(self.o_pieces) {
            Some(GameResult::OWin)
        } else if self.has_line(self.x_pieces) {
            Some(GameResult::XWin)
        } else if self.age() == self.area() {
            Some(GameResult::Draw)
        } else {
            None
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.geometry;
        let header: String = (0..g.width()).map(|c| format!("{} ", c % 10)).collect();
        writeln!(f, "{}", header.trim_end())?;
        for row in (0..g.height()).rev() {
            let line: Vec<&str> = (0..g.width())
                .map(|col| match self.cell(row, col) {
                    Some(Side::O) => "o",
                    Some(Side::X) => "x",
                    None => "-",
                })
                .collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        write!(f, "{}", header.trim_end())
    }
}

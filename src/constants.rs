//! Constants for board geometry, search parameters, and canonical values.
//!
//! Everything here is a default. Geometry and search parameters can be
//! overridden at runtime (see [`crate::board::Geometry`] and
//! [`crate::mcts::SearchConfig`]).

// =============================================================================
// Board Geometry
// =============================================================================

/// Default number of rows.
pub const DEFAULT_HEIGHT: usize = 6;

/// Default number of columns (and therefore move slots).
pub const DEFAULT_WIDTH: usize = 7;

/// Default number of pieces in a row needed to win.
pub const DEFAULT_WIN_LENGTH: usize = 4;

/// Each side's pieces are stored in one `u64`, so a board holds at most 64 cells.
pub const MAX_CELLS: usize = 64;

// =============================================================================
// Canonical Values
// =============================================================================

/// Value of a position won by the side being scored.
pub const WIN_VALUE: f32 = 1.0;

/// Value of a drawn position.
pub const DRAW_VALUE: f32 = 0.5;

/// Value of a position lost by the side being scored.
pub const LOSS_VALUE: f32 = 0.0;

/// Value assumed for a child that has neither statistics nor an evaluation.
pub const FIRST_PLAY_VALUE: f32 = LOSS_VALUE;

// =============================================================================
// Search Parameters
// =============================================================================

/// Default number of simulations per move.
pub const N_SIMS: usize = 800;

/// PUCT base constant.
pub const PB_C_BASE: f32 = 19652.0;

/// PUCT initial exploration constant.
pub const PB_C_INIT: f32 = 1.25;

/// Below this ply count moves are sampled from the visit distribution.
pub const NUM_SAMPLING_MOVES: usize = 0;

/// Default Dirichlet alpha for root noise (0 disables the noise).
pub const ROOT_DIRICHLET_ALPHA: f32 = 0.0;

/// Default fraction of root noise blended into the prior (0 disables the noise).
pub const ROOT_EXPLORATION_FRACTION: f32 = 0.0;

// =============================================================================
// Evaluators
// =============================================================================

/// Default number of random playouts per rollout evaluation.
pub const ROLLOUTS_PER_EVAL: usize = 8;

/// Default number of positions scored together by the batched evaluator.
pub const BATCH_SIZE: usize = 16;

/// Default time the batched evaluator waits to fill a batch, in milliseconds.
pub const BATCH_WAIT_MS: u64 = 2;

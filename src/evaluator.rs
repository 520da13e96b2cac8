//! Position evaluators.
//!
//! The search talks to every evaluator through the [`Evaluator`] trait. A
//! synchronous evaluator always answers [`Evaluation::Ready`]; a batched one may
//! answer [`Evaluation::Pending`] and deliver the result later through
//! [`Evaluator::poll`]. Both memoize by board, and both hand out clones so the
//! caller can never alter a cached entry.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::board::Board;
use crate::node::PositionEvaluation;
use crate::transition_table::{SharedTransitionTable, TransitionTable};

/// Answer to an evaluation request.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    Ready(PositionEvaluation),
    /// Accepted but not finished; poll for it later.
    Pending,
}

pub trait Evaluator {
    /// Evaluate `board`, value for the side to move.
    fn evaluate(&mut self, board: &Board) -> Evaluation;

    /// Whether new results have arrived since the last call.
    fn has_update(&mut self) -> bool {
        false
    }

    /// Result for a board previously answered with `Pending`, if it is done.
    fn poll(&mut self, board: &Board) -> Option<PositionEvaluation> {
        match self.evaluate(board) {
            Evaluation::Ready(evaluation) => Some(evaluation),
            Evaluation::Pending => None,
        }
    }

    /// Block until new results arrive.
    fn wait_for_update(&mut self) {}

    /// Forget cached positions younger than `age`.
    fn evict_below(&mut self, _age: usize) {}
}

// =============================================================================
// Synchronous
// =============================================================================

/// Wraps a scoring function with a per-board cache.
pub struct MemoEvaluator<F> {
    score: F,
    cache: TransitionTable<PositionEvaluation>,
    store_positions: bool,
    calls: usize,
}

impl<F> MemoEvaluator<F>
where
    F: FnMut(&Board) -> PositionEvaluation,
{
    pub fn new(score: F) -> Self {
        Self {
            score,
            cache: TransitionTable::new(),
            store_positions: true,
            calls: 0,
        }
    }

    /// Disable (or re-enable) the cache.
    pub fn store_positions(mut self, store: bool) -> Self {
        self.store_positions = store;
        self
    }

    /// Number of times the scoring function ran.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl<F> Evaluator for MemoEvaluator<F>
where
    F: FnMut(&Board) -> PositionEvaluation,
{
    fn evaluate(&mut self, board: &Board) -> Evaluation {
        if let Ok(evaluation) = self.cache.get(board) {
            return Evaluation::Ready(evaluation.clone());
        }
        let evaluation = (self.score)(board);
        self.calls += 1;
        if self.store_positions {
            self.cache.put(*board, evaluation.clone());
        }
        Evaluation::Ready(evaluation)
    }

    fn evict_below(&mut self, age: usize) {
        self.cache.evict_below(age);
    }
}

// =============================================================================
// Batched
// =============================================================================

struct Shared {
    results: SharedTransitionTable<PositionEvaluation>,
    /// Bumped after every finished batch.
    generation: Mutex<u64>,
    progress: Condvar,
}

fn lock_generation(shared: &Shared) -> MutexGuard<'_, u64> {
    shared.generation.lock().unwrap_or_else(|e| e.into_inner())
}

/// Scores positions in batches on a background thread.
///
/// Requests go to the worker over a channel. The worker waits for up to
/// `batch_size` boards (at most `max_wait` after the first), scores them in one
/// call, and publishes the results in a shared table.
pub struct BatchedEvaluator {
    shared: Arc<Shared>,
    sender: Option<Sender<Board>>,
    worker: Option<JoinHandle<()>>,
    requested: HashSet<Board>,
    seen_generation: u64,
}

impl BatchedEvaluator {
    pub fn new<F>(batch_size: usize, max_wait: Duration, score: F) -> Self
    where
        F: Fn(&[Board]) -> Vec<PositionEvaluation> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            results: SharedTransitionTable::new(),
            generation: Mutex::new(0),
            progress: Condvar::new(),
        });
        let (sender, receiver) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || {
            worker_loop(receiver, &worker_shared, batch_size.max(1), max_wait, score);
        });

        Self {
            shared,
            sender: Some(sender),
            worker: Some(worker),
            requested: HashSet::new(),
            seen_generation: 0,
        }
    }

    /// Requests sent and not yet collected.
    pub fn in_flight(&self) -> usize {
        self.requested.len()
    }

    fn worker_stopped(&self) -> bool {
        self.worker.as_ref().is_none_or(|w| w.is_finished())
    }

    fn take_result(&mut self, board: &Board) -> Option<PositionEvaluation> {
        let evaluation = self.shared.results.get(board).ok()?;
        self.requested.remove(board);
        Some(evaluation)
    }
}

impl Evaluator for BatchedEvaluator {
    fn evaluate(&mut self, board: &Board) -> Evaluation {
        if let Some(evaluation) = self.take_result(board) {
            return Evaluation::Ready(evaluation);
        }
        if self.requested.insert(*board) {
            let sent = self.sender.as_ref().is_some_and(|s| s.send(*board).is_ok());
            if !sent {
                warn!("batch worker is gone, request for age {} dropped", board.age());
            }
        }
        Evaluation::Pending
    }

    fn has_update(&mut self) -> bool {
        let generation = *lock_generation(&self.shared);
        if generation != self.seen_generation {
            self.seen_generation = generation;
            true
        } else {
            false
        }
    }

    fn poll(&mut self, board: &Board) -> Option<PositionEvaluation> {
        self.take_result(board)
    }

    /// # Panics
    /// If the worker has stopped, since nothing would ever arrive.
    fn wait_for_update(&mut self) {
        let mut generation = lock_generation(&self.shared);
        while *generation == self.seen_generation {
            assert!(!self.worker_stopped(), "batch evaluator worker stopped");
            generation = self
                .shared
                .progress
                .wait_timeout(generation, Duration::from_millis(50))
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        self.seen_generation = *generation;
    }

    fn evict_below(&mut self, age: usize) {
        self.shared.results.evict_below(age);
        self.requested.retain(|board| board.age() >= age);
    }
}

impl Drop for BatchedEvaluator {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("batch evaluator worker panicked");
            }
        }
    }
}

fn worker_loop<F>(
    receiver: Receiver<Board>,
    shared: &Shared,
    batch_size: usize,
    max_wait: Duration,
    score: F,
) where
    F: Fn(&[Board]) -> Vec<PositionEvaluation>,
{
    while let Ok(first) = receiver.recv() {
        let mut batch = vec![first];
        let deadline = Instant::now() + max_wait;
        while batch.len() < batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(remaining) {
                Ok(board) => batch.push(board),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        let evaluations = score(&batch);
        if evaluations.len() != batch.len() {
            warn!(
                "batch scorer returned {} results for {} boards",
                evaluations.len(),
                batch.len()
            );
        }
        trace!("scored batch of {}", batch.len());

        // A missing result is published as NaN so the search reports it
        // instead of waiting forever.
        let mut evaluations = evaluations.into_iter();
        for board in batch {
            let evaluation = evaluations
                .next()
                .unwrap_or_else(|| PositionEvaluation::new(f32::NAN, Vec::new()));
            shared.results.put(board, evaluation);
        }

        *lock_generation(shared) += 1;
        shared.progress.notify_all();
    }
    debug!("batch evaluator worker exiting");
}

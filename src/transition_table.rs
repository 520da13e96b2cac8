//! Age-bucketed cache from board to previously computed data.
//!
//! Entries are grouped by the board's age (ply count). Once real moves have
//! been played, no position younger than the current one can occur again, so
//! whole buckets are dropped at once with [`TransitionTable::evict_below`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use thiserror::Error;

use crate::board::Board;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("position of age {age} not in transition table")]
    NotFound { age: usize },
}

/// Single-owner table. Lookup finds the bucket by age, then hashes the board.
#[derive(Debug, Clone)]
pub struct TransitionTable<V> {
    buckets: BTreeMap<usize, HashMap<Board, V>>,
}

impl<V> Default for TransitionTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TransitionTable<V> {
    pub fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    pub fn contains(&self, board: &Board) -> bool {
        self.buckets
            .get(&board.age())
            .is_some_and(|bucket| bucket.contains_key(board))
    }

    pub fn get(&self, board: &Board) -> Result<&V, TableError> {
        self.buckets
            .get(&board.age())
            .and_then(|bucket| bucket.get(board))
            .ok_or(TableError::NotFound { age: board.age() })
    }

    /// Insert or overwrite the entry for `board`.
    pub fn put(&mut self, board: Board, value: V) {
        self.buckets
            .entry(board.age())
            .or_default()
            .insert(board, value);
    }

    /// Drop every bucket whose age is below `min_age`.
    pub fn evict_below(&mut self, min_age: usize) {
        self.buckets = self.buckets.split_off(&min_age);
    }

    /// Entries in ascending age order.
    pub fn iter(&self) -> impl Iterator<Item = (&Board, &V)> + '_ {
        self.buckets.values().flat_map(HashMap::iter)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(HashMap::is_empty)
    }
}

type Bucket<V> = Arc<Mutex<HashMap<Board, V>>>;

/// Table shared between threads.
///
/// The bucket index sits behind a read-write lock and every bucket has its own
/// mutex, so operations on different ages do not contend. Values are cloned out
/// on read.
#[derive(Debug)]
pub struct SharedTransitionTable<V> {
    buckets: RwLock<BTreeMap<usize, Bucket<V>>>,
}

impl<V> Default for SharedTransitionTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<V>(bucket: &Bucket<V>) -> MutexGuard<'_, HashMap<Board, V>> {
    // Poisoning leaves the map itself intact.
    bucket.lock().unwrap_or_else(|e| e.into_inner())
}

impl<V> SharedTransitionTable<V> {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
        }
    }

    fn bucket(&self, age: usize) -> Option<Bucket<V>> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(&age).cloned()
    }

    pub fn contains(&self, board: &Board) -> bool {
        self.bucket(board.age()).is_some_and(|bucket| {
            let entries = lock(&bucket);
            entries.contains_key(board)
        })
    }

    pub fn put(&self, board: Board, value: V) {
        let bucket = match self.bucket(board.age()) {
            Some(bucket) => bucket,
            None => {
                let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
                Arc::clone(buckets.entry(board.age()).or_default())
            }
        };
        lock(&bucket).insert(board, value);
    }

    pub fn evict_below(&self, min_age: usize) {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        *buckets = buckets.split_off(&min_age);
    }

    pub fn len(&self) -> usize {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.values().map(|bucket| lock(bucket).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> SharedTransitionTable<V> {
    pub fn get(&self, board: &Board) -> Result<V, TableError> {
        self.bucket(board.age())
            .and_then(|bucket| {
                let entries = lock(&bucket);
                entries.get(board).cloned()
            })
            .ok_or(TableError::NotFound { age: board.age() })
    }
}

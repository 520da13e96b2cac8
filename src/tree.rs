//! Arena-backed search tree.
//!
//! Tree nodes live in a `Vec` and refer to each other through [`NodeId`]
//! handles: each node knows its parent (a plain back-reference) and maps moves
//! to child handles. The per-position [`NodeData`] lives in a second arena and
//! is found through the transition table, so transposed positions reached by
//! different paths share statistics, evaluations, and proven results.
//!
//! Statistics are updated by whole-path passes (`backpropagate*`) that walk
//! the parent chain from a leaf to the root.

use std::collections::{BTreeMap, HashMap};

use log::trace;

use crate::board::{Board, Side};
use crate::constants::FIRST_PLAY_VALUE;
use crate::mcts::SearchConfig;
use crate::node::{NodeData, SearchValue, TerminalResult};
use crate::transition_table::TransitionTable;

/// Handle of a node in the tree arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a [`NodeData`] in the data arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DataId(u32);

impl DataId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
struct TreeNode {
    data: DataId,
    parent: Option<NodeId>,
    mv: Option<usize>,
    children: BTreeMap<usize, NodeId>,
}

/// A root move picked after search, with its value for the side that plays it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveChoice {
    pub mv: usize,
    pub value: f32,
}

pub struct Tree {
    nodes: Vec<TreeNode>,
    data: Vec<NodeData>,
    table: TransitionTable<DataId>,
    root: NodeId,
}

impl Tree {
    pub fn new(board: Board) -> Self {
        let mut tree = Self {
            nodes: Vec::with_capacity(1024),
            data: Vec::with_capacity(1024),
            table: TransitionTable::new(),
            root: NodeId(0),
        };
        tree.root = tree.alloc(board, None, None);
        tree
    }

    /// Find the data for `board` in the table, creating it on first sight.
    fn data_for(&mut self, board: Board) -> DataId {
        if let Ok(&id) = self.table.get(&board) {
            return id;
        }
        let id = DataId(self.data.len() as u32);
        self.data.push(NodeData::new(board));
        self.table.put(board, id);
        id
    }

    fn alloc(&mut self, board: Board, parent: Option<NodeId>, mv: Option<usize>) -> NodeId {
        let data = self.data_for(board);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TreeNode {
            data,
            parent,
            mv,
            children: BTreeMap::new(),
        });
        id
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_board(&self) -> &Board {
        &self.data(self.root).board
    }

    #[inline]
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.data[self.nodes[id.index()].data.index()]
    }

    #[inline]
    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        let data = self.nodes[id.index()].data;
        &mut self.data[data.index()]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    /// The move that led from the parent to this node.
    pub fn move_into(&self, id: NodeId) -> Option<usize> {
        self.nodes[id.index()].mv
    }

    /// Children in ascending move order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.nodes[id.index()]
            .children
            .iter()
            .map(|(&mv, &child)| (mv, child))
    }

    pub fn child(&self, id: NodeId, mv: usize) -> Option<NodeId> {
        self.nodes[id.index()].children.get(&mv).copied()
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        !self.nodes[id.index()].children.is_empty()
    }

    /// Every node in the tree, root first.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct positions still reachable through the table.
    pub fn position_count(&self) -> usize {
        self.table.len()
    }

    /// Create a child for every legal move. Children are not evaluated.
    pub fn expand_node(&mut self, id: NodeId) {
        if self.has_children(id) || self.data(id).is_terminal() {
            return;
        }
        let board = self.data(id).board;
        for mv in self.data(id).legal_moves.clone() {
            let child = self.alloc(board.with_move(mv), Some(id), Some(mv));
            self.nodes[id.index()].children.insert(mv, child);
        }
    }

    /// Value of a node for `side`, falling back to the first-play value.
    pub fn node_value(&self, id: NodeId, side: Side) -> f32 {
        self.data(id).value(side).unwrap_or(FIRST_PLAY_VALUE)
    }

    /// PUCT score of `child` as seen by the side to move at `parent`.
    pub fn ucb_score(&self, config: &SearchConfig, parent: NodeId, child: NodeId) -> f32 {
        let parent_data = self.data(parent);
        let n_parent = parent_data.search_value.total() as f32;
        let n_child = self.data(child).search_value.total() as f32;

        let mut pb_c = ((n_parent + config.pb_c_base + 1.0) / config.pb_c_base).ln() + config.pb_c_init;
        pb_c *= n_parent.sqrt() / (n_child + 1.0);

        let mv = self.move_into(child).unwrap_or_default();
        let prior = match &parent_data.position_evaluation {
            Some(eval) => eval.prior.get(mv).copied().unwrap_or(0.0),
            None => 1.0 / parent_data.legal_moves.len().max(1) as f32,
        };
        pb_c * prior + self.node_value(child, parent_data.board.side_to_move())
    }

    /// Highest-scoring child not yet proven terminal. Ties go to the lowest move.
    ///
    /// Returns `None` when every child is terminal (or there are none); callers
    /// check [`NodeData::non_terminal_moves`] first.
    pub fn select_child(&self, config: &SearchConfig, id: NodeId) -> Option<NodeId> {
        let terminal_moves = &self.data(id).terminal_moves;
        let mut best: Option<(f32, NodeId)> = None;
        for (mv, child) in self.children(id) {
            if terminal_moves.contains(&mv) {
                continue;
            }
            let score = self.ucb_score(config, id, child);
            if best.is_none_or(|(best_score, _)| score > best_score) {
                best = Some((score, child));
            }
        }
        best.map(|(_, child)| child)
    }

    /// Apply `update` to the leaf and every ancestor.
    fn update_path(&mut self, leaf: NodeId, mut update: impl FnMut(&mut SearchValue)) {
        let mut current = Some(leaf);
        while let Some(id) = current {
            update(&mut self.data_mut(id).search_value);
            current = self.parent(id);
        }
    }

    /// Add a side-O value to the leaf and all its ancestors.
    pub fn backpropagate(&mut self, leaf: NodeId, value: f32) {
        self.update_path(leaf, |sv| sv.add(value));
    }

    /// Record an in-flight evaluation on the leaf and all its ancestors.
    pub fn backpropagate_ghost(&mut self, leaf: NodeId) {
        self.update_path(leaf, SearchValue::add_ghost);
    }

    /// Resolve one ghost on the leaf and all its ancestors with a side-O value.
    pub fn backpropagate_replace_ghost(&mut self, leaf: NodeId, value: f32) {
        self.update_path(leaf, |sv| sv.replace_ghost(value));
    }

    /// Mark `leaf` as proven and push the proof up as far as it goes.
    ///
    /// An ancestor whose mover can pick a proven win becomes a win, forced at
    /// the earliest winning age among its terminal children. An ancestor whose
    /// every legal move is proven takes the best outcome for its mover, the
    /// longest line among equals. Otherwise propagation stops. Results already
    /// proven are never changed. Returns the last node visited.
    pub fn backpropagate_terminal(&mut self, leaf: NodeId, terminal: TerminalResult) -> NodeId {
        let mut node = leaf;
        let mut terminal = terminal;
        loop {
            let data = self.data_mut(node);
            match data.terminal_result {
                Some(existing) => terminal = existing,
                None => data.terminal_result = Some(terminal),
            }

            let (Some(parent), Some(mv)) = (self.parent(node), self.move_into(node)) else {
                return node;
            };
            let parent_data = self.data_mut(parent);
            parent_data.terminal_moves.insert(mv);
            if parent_data.is_terminal() {
                return parent;
            }

            let mover = parent_data.board.side_to_move();
            let next = if terminal.result.winner() == Some(mover) {
                self.shortest_win(parent, mover)
            } else if self.data(parent).non_terminal_moves().is_empty() {
                self.best_forced_outcome(parent, mover)
            } else {
                None
            };

            match next {
                Some(next) => {
                    terminal = next;
                    node = parent;
                }
                None => return parent,
            }
        }
    }

    /// Proven children of `id`, ascending by move.
    fn terminal_children(&self, id: NodeId) -> impl Iterator<Item = (usize, TerminalResult)> + '_ {
        let terminal_moves = &self.data(id).terminal_moves;
        self.children(id)
            .filter(move |(mv, _)| terminal_moves.contains(mv))
            .filter_map(move |(mv, child)| self.data(child).terminal_result.map(|t| (mv, t)))
    }

    fn shortest_win(&self, id: NodeId, mover: Side) -> Option<TerminalResult> {
        self.terminal_children(id)
            .filter(|(_, t)| t.result.winner() == Some(mover))
            .map(|(_, t)| t)
            .min_by_key(|t| t.age)
    }

    fn best_forced_outcome(&self, id: NodeId, mover: Side) -> Option<TerminalResult> {
        let area = self.data(id).board.area();
        let mut best: Option<TerminalResult> = None;
        for (_, t) in self.terminal_children(id) {
            let better = match best {
                None => true,
                Some(b) => {
                    let (value, best_value) = (t.result.value_for(mover), b.result.value_for(mover));
                    value > best_value
                        || (value == best_value && t.effective_age(area) > b.effective_age(area))
                }
            };
            if better {
                best = Some(t);
            }
        }
        best
    }

    /// Greedy root move.
    ///
    /// Undecided root: highest value for the mover. Proven win: the shortest
    /// forced win. Proven loss or draw: the best outcome, longest line first.
    /// Ties go to the lowest move. `None` if the root has no children.
    pub fn select_best_move(&self) -> Option<MoveChoice> {
        let root = self.data(self.root);
        let mover = root.board.side_to_move();
        let area = root.board.area();

        let choice = match root.terminal_result {
            Some(t) if t.result.winner() == Some(mover) => self
                .terminal_children(self.root)
                .filter(|(_, c)| c.result.winner() == Some(mover))
                .min_by_key(|&(mv, c)| (c.effective_age(area), mv))
                .map(|(mv, _)| mv),
            Some(_) => {
                let mut best: Option<(f32, usize, usize)> = None;
                for (mv, c) in self.terminal_children(self.root) {
                    let key = (c.result.value_for(mover), c.effective_age(area));
                    let better = best.is_none_or(|(value, age, _)| {
                        key.0 > value || (key.0 == value && key.1 > age)
                    });
                    if better {
                        best = Some((key.0, key.1, mv));
                    }
                }
                best.map(|(_, _, mv)| mv)
            }
            None => None,
        };

        let mv = match choice {
            Some(mv) => mv,
            None => self.highest_value_move(mover)?,
        };
        let child = self.child(self.root, mv)?;
        Some(MoveChoice {
            mv,
            value: self.node_value(child, mover),
        })
    }

    fn highest_value_move(&self, mover: Side) -> Option<usize> {
        let mut best: Option<(f32, usize)> = None;
        for (mv, child) in self.children(self.root) {
            let value = self.node_value(child, mover);
            if best.is_none_or(|(best_value, _)| value > best_value) {
                best = Some((value, mv));
            }
        }
        best.map(|(_, mv)| mv)
    }

    /// Sample a root move in proportion to child visit counts.
    ///
    /// Children proven lost for the mover are skipped while anything else is
    /// available. A proven root defers to [`Tree::select_best_move`].
    pub fn select_softmax_move(&self, rng: &mut fastrand::Rng) -> Option<MoveChoice> {
        let root = self.data(self.root);
        if root.is_terminal() {
            return self.select_best_move();
        }
        let mover = root.board.side_to_move();
        let loses = |id: NodeId| {
            self.data(id)
                .terminal_result
                .is_some_and(|t| t.result.winner() == Some(mover.opponent()))
        };

        let mut candidates: Vec<(usize, NodeId)> =
            self.children(self.root).filter(|&(_, c)| !loses(c)).collect();
        if candidates.is_empty() {
            candidates = self.children(self.root).collect();
        }
        if candidates.is_empty() {
            return None;
        }

        let weights: Vec<f32> = candidates
            .iter()
            .map(|&(_, c)| self.data(c).search_value.visit_count as f32)
            .collect();
        let total: f32 = weights.iter().sum();
        let index = if total > 0.0 {
            let target = rng.f32() * total;
            let mut cumulative = 0.0;
            weights
                .iter()
                .position(|&w| {
                    cumulative += w;
                    target < cumulative
                })
                .unwrap_or(candidates.len() - 1)
        } else {
            rng.usize(..candidates.len())
        };

        let (mv, child) = candidates[index];
        Some(MoveChoice {
            mv,
            value: self.node_value(child, mover),
        })
    }

    /// Root visit distribution over all columns.
    pub fn policy(&self) -> Vec<f32> {
        let mut policy = vec![0.0; self.root_board().width()];
        for (mv, child) in self.children(self.root) {
            policy[mv] = self.data(child).search_value.visit_count as f32;
        }
        let total: f32 = policy.iter().sum();
        if total > 0.0 {
            policy.iter_mut().for_each(|p| *p /= total);
        }
        policy
    }

    /// Make the node for `board` the new root.
    ///
    /// Reuses a matching descendant when the search already reached it,
    /// otherwise starts a fresh node (sharing any data still in the table).
    /// Positions younger than the new root are evicted from the table, and the
    /// arenas are rebuilt from what is still reachable, so every [`NodeId`]
    /// handed out before the call is invalidated.
    pub fn update_root(&mut self, board: &Board) {
        if self.root_board() == board {
            return;
        }
        let root = match self.find_descendant(board) {
            Some(id) => id,
            None => self.alloc(*board, None, None),
        };
        let node = &mut self.nodes[root.index()];
        node.parent = None;
        node.mv = None;
        self.root = root;
        self.table.evict_below(board.age());
        self.compact();
    }

    /// Drop every node outside the root's subtree and every position the
    /// table no longer holds, renumbering what is left.
    fn compact(&mut self) {
        let before = (self.nodes.len(), self.data.len());

        // Nodes in breadth-first order from the root, so the root becomes 0.
        let mut order = vec![self.root];
        let mut node_ids = HashMap::new();
        node_ids.insert(self.root, NodeId(0));
        let mut next = 0;
        while next < order.len() {
            for &child in self.nodes[order[next].index()].children.values() {
                node_ids.insert(child, NodeId(order.len() as u32));
                order.push(child);
            }
            next += 1;
        }

        // Table entries first, then any reachable data the table lost.
        let mut data = Vec::new();
        let mut data_ids: HashMap<DataId, DataId> = HashMap::new();
        let mut table = TransitionTable::new();
        let kept = self
            .table
            .iter()
            .map(|(_, &id)| id)
            .chain(order.iter().map(|&id| self.nodes[id.index()].data));
        for old in kept {
            if data_ids.contains_key(&old) {
                continue;
            }
            let new = DataId(data.len() as u32);
            let node_data: NodeData = self.data[old.index()].clone();
            table.put(node_data.board, new);
            data.push(node_data);
            data_ids.insert(old, new);
        }

        let nodes = order
            .iter()
            .map(|&old| {
                let node = &self.nodes[old.index()];
                TreeNode {
                    data: data_ids[&node.data],
                    parent: node.parent.map(|parent| node_ids[&parent]),
                    mv: node.mv,
                    children: node
                        .children
                        .iter()
                        .map(|(&mv, child)| (mv, node_ids[child]))
                        .collect(),
                }
            })
            .collect();

        self.nodes = nodes;
        self.data = data;
        self.table = table;
        self.root = NodeId(0);
        trace!(
            "compacted tree: {} -> {} nodes, {} -> {} positions",
            before.0,
            self.nodes.len(),
            before.1,
            self.data.len()
        );
    }

    /// Reroot on the child reached by playing `mv` at the root.
    pub fn advance(&mut self, mv: usize) {
        let board = self.root_board().with_move(mv);
        self.update_root(&board);
    }

    fn find_descendant(&self, board: &Board) -> Option<NodeId> {
        let root_age = self.root_board().age();
        if board.age() <= root_age {
            return None;
        }
        let mut frontier = vec![self.root];
        for _ in root_age..board.age() {
            frontier = frontier
                .iter()
                .flat_map(|&id| self.nodes[id.index()].children.values().copied())
                .collect();
        }
        frontier.into_iter().find(|&id| self.data(id).board == *board)
    }
}

//! Per-tree actor index: O(1) "previous node with the same symbol" queries.
//!
//! Each node of a tree maps to an *actor symbol* through a pluggable
//! strategy; the index records, per symbol, the ordered node sequence and a
//! per-node predecessor array. The `PREV_NODE_TYPE` / `PREV_NODE_VALUE` /
//! `PREV_NODE_CONTEXT` ops resolve through it in amortized constant time.

use rustc_hash::FxHashMap;

use crate::counts::Feature;

use super::slice::SlicedCursor;
use super::storage::TreeStorage;
use super::traversal::{LocalCursor, TreeCursor};

// =============================================================================
// Actor symbols
// =============================================================================

/// Strategy deriving an actor symbol from a node. Symbols below zero are not
/// indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActorSymbol {
    /// Group nodes by type.
    ByType,
    /// Group nodes by value.
    ByValue,
    /// Group nodes by a fingerprint of the node's and up to two ancestors'
    /// (value, type) pairs.
    ByContext,
}

impl ActorSymbol {
    /// The symbol of the node under the cursor; slicing applies to every
    /// read, including the ancestor walk of `ByContext`.
    pub fn symbol_at(&self, cursor: &SlicedCursor<'_>) -> i32 {
        match self {
            ActorSymbol::ByType => cursor.node().type_id(),
            ActorSymbol::ByValue => cursor.node().value_id(),
            ActorSymbol::ByContext => {
                let mut cursor = *cursor;
                let mut fingerprint = Feature::new();
                let mut context_size = 0;
                loop {
                    fingerprint.push(cursor.node().value_id());
                    fingerprint.push(cursor.node().type_id());
                    context_size += 1;
                    if !(cursor.up() && context_size < 3) {
                        break;
                    }
                }
                fingerprint.hash()
            }
        }
    }
}

// =============================================================================
// ActorIndex
// =============================================================================

#[derive(Clone, Copy, Debug)]
struct SymbolPredecessor {
    symbol: i32,
    predecessor: i32,
}

impl Default for SymbolPredecessor {
    fn default() -> Self {
        Self {
            symbol: -1,
            predecessor: -1,
        }
    }
}

/// Index over one tree for one [`ActorSymbol`] strategy. Built once, then
/// read-only (and freely shared across threads).
#[derive(Debug)]
pub struct ActorIndex<'a> {
    finder: ActorSymbol,
    tree: &'a TreeStorage<'a>,
    sequences: FxHashMap<i32, Vec<i32>>,
    predecessors: Vec<SymbolPredecessor>,
}

impl<'a> ActorIndex<'a> {
    /// Walks the tree in pre-order and records every node under its symbol.
    pub fn build(finder: ActorSymbol, tree: &'a TreeStorage<'a>) -> Self {
        let mut sequences: FxHashMap<i32, Vec<i32>> = FxHashMap::default();
        let mut predecessors = vec![SymbolPredecessor::default(); tree.len()];

        tree.for_each_subnode(0, |node_id| {
            let symbol = finder.symbol_at(&SlicedCursor::new(tree, node_id, None));
            if symbol >= 0 {
                let symbol_nodes = sequences.entry(symbol).or_default();
                predecessors[node_id as usize].symbol = symbol;
                if let Some(&last) = symbol_nodes.last() {
                    predecessors[node_id as usize].predecessor = last;
                }
                symbol_nodes.push(node_id);
            }
        });

        Self {
            finder,
            tree,
            sequences,
            predecessors,
        }
    }

    pub fn finder(&self) -> ActorSymbol {
        self.finder
    }

    /// The ordered node sequence of `symbol`, if any node produced it.
    pub fn sequence(&self, symbol: i32) -> Option<&[i32]> {
        self.sequences.get(&symbol).map(Vec::as_slice)
    }

    /// Fast path: when `storage` is the indexed tree and the recorded symbol
    /// at `position` matches, returns the predecessor position (`-1` when
    /// the node is the first of its symbol). `None` means the index does not
    /// apply here.
    fn predecessor_slot(&self, storage: &TreeStorage<'_>, symbol: i32, position: i32) -> Option<i32> {
        if !std::ptr::eq(
            storage as *const TreeStorage<'_> as *const (),
            self.tree as *const TreeStorage<'_> as *const (),
        ) {
            return None;
        }
        assert!((position as usize) < self.predecessors.len());
        let slot = self.predecessors[position as usize];
        if slot.symbol == symbol {
            Some(slot.predecessor)
        } else {
            None
        }
    }
}

// =============================================================================
// ActorSymbolIter
// =============================================================================

/// Walks backwards through the occurrences of one symbol, starting from a
/// position that may live in a non-indexed overlay store.
pub struct ActorSymbolIter<'a, 'i> {
    symbol: i32,
    cursor: SlicedCursor<'a>,
    index: &'i ActorIndex<'a>,
}

impl<'a, 'i> ActorSymbolIter<'a, 'i> {
    pub fn new(symbol: i32, cursor: SlicedCursor<'a>, index: &'i ActorIndex<'a>) -> Self {
        Self {
            symbol,
            cursor,
            index,
        }
    }

    /// Moves to the previous node with this symbol. In the indexed tree this
    /// is one predecessor-array read; in an overlay it is a local pre-order
    /// predecessor scan, falling back to a binary search of the indexed
    /// sequence from the attachment position.
    pub fn move_left(&mut self) -> bool {
        if let Some(predecessor) = self.index.predecessor_slot(
            self.cursor.tree_storage(),
            self.symbol,
            self.cursor.position(),
        ) {
            if predecessor < 0 {
                return false;
            }
            self.cursor = SlicedCursor::new(
                self.cursor.tree_storage(),
                predecessor,
                self.cursor.slice(),
            );
            return true;
        }

        if let Some(link) = self.cursor.tree_storage().parent() {
            // Non-indexed local store: enumerate pre-order predecessors and
            // recompute their symbols.
            let mut local = LocalCursor::new(self.cursor.tree_storage(), self.cursor.position());
            loop {
                if local.left() {
                    while local.down_last_child() {}
                } else if !local.up() {
                    break;
                }
                let symbol = self
                    .index
                    .finder()
                    .symbol_at(&SlicedCursor::new(local.tree_storage(), local.position(), None));
                if symbol == self.symbol {
                    self.cursor = SlicedCursor::new(
                        local.tree_storage(),
                        local.position(),
                        self.cursor.slice(),
                    );
                    return true;
                }
            }

            // Not in the local store; continue from the attachment position
            // in the indexed parent.
            self.cursor = SlicedCursor::new(link.storage, link.position, self.cursor.slice());
        }

        let sequence = match self.index.sequence(self.symbol) {
            Some(sequence) => sequence,
            None => return false,
        };
        let at = sequence.partition_point(|&p| p < self.cursor.position());
        if at == 0 {
            return false;
        }
        self.cursor = SlicedCursor::new(
            self.cursor.tree_storage(),
            sequence[at - 1],
            self.cursor.slice(),
        );
        true
    }

    pub fn item(&self) -> SlicedCursor<'a> {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{SubstitutionNode, TreeSubstitution};

    fn tree_from(rows: Vec<[i32; 4]>) -> TreeStorage<'static> {
        let mut storage = TreeStorage::new();
        storage.substitute_node(0, &TreeSubstitution::from(rows));
        storage.check_consistency().unwrap();
        storage
    }

    fn fixture() -> TreeStorage<'static> {
        tree_from(vec![
            [100, -1, 1, -1],
            [101, -1, -1, 2],
            [105, -1, -1, 3],
            [106, -1, -1, 4],
            [101, -1, -1, 5],
            [105, -1, -1, -1],
        ])
    }

    #[test]
    fn iterator_walks_indexed_tree() {
        let tree = fixture();
        let index = ActorIndex::build(ActorSymbol::ByType, &tree);

        {
            let mut it = ActorSymbolIter::new(105, SlicedCursor::new(&tree, 5, None), &index);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 2);
            assert!(!it.move_left());
        }
        {
            let mut it = ActorSymbolIter::new(101, SlicedCursor::new(&tree, 4, None), &index);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 1);
            assert!(!it.move_left());
        }
        {
            let mut it = ActorSymbolIter::new(106, SlicedCursor::new(&tree, 3, None), &index);
            assert!(!it.move_left());
        }
    }

    #[test]
    fn iterator_scans_overlay_then_falls_back_to_index() {
        let tree = fixture();
        let index = ActorIndex::build(ActorSymbol::ByType, &tree);

        let mut subtree = TreeStorage::overlay(&tree, 3);
        subtree.substitute_node(
            0,
            &TreeSubstitution::from(vec![
                [106, -1, 1, -1],
                [105, -1, -1, 2],
                [101, -1, -1, 3],
                [105, -1, -1, 4],
                [105, -1, -1, -1],
            ]),
        );

        {
            let mut it = ActorSymbolIter::new(105, SlicedCursor::new(&tree, 5, None), &index);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 2);
            assert!(!it.move_left());
        }
        {
            let mut it = ActorSymbolIter::new(105, SlicedCursor::new(&subtree, 3, None), &index);
            assert!(it.move_left());
            assert!(std::ptr::eq(
                it.item().tree_storage() as *const TreeStorage<'_> as *const (),
                &subtree as *const TreeStorage<'_> as *const (),
            ));
            assert_eq!(it.item().position(), 1);
            assert!(it.move_left());
            assert!(std::ptr::eq(
                it.item().tree_storage() as *const TreeStorage<'_> as *const (),
                &tree as *const TreeStorage<'_> as *const (),
            ));
            assert_eq!(it.item().position(), 2);
            assert!(!it.move_left());
        }
        {
            let mut it = ActorSymbolIter::new(105, SlicedCursor::new(&subtree, 4, None), &index);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 3);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 1);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 2);
            assert!(!it.move_left());
        }
        {
            subtree.substitute_single_node(
                4,
                &SubstitutionNode {
                    ty: 109,
                    val: -1,
                    first_child: -1,
                    right_sib: -1,
                },
            );
            let mut it = ActorSymbolIter::new(109, SlicedCursor::new(&subtree, 4, None), &index);
            assert!(!it.move_left());
        }
        {
            let mut it = ActorSymbolIter::new(101, SlicedCursor::new(&subtree, 2, None), &index);
            assert!(it.move_left());
            assert_eq!(it.item().position(), 1);
            assert!(!it.move_left());
        }
    }

    /// Walking `move_left` from the last occurrence of a symbol yields the
    /// same node sequence (reversed) as a linear pre-order scan.
    #[test]
    fn move_left_matches_linear_scan() {
        let tree = tree_from(vec![
            [100, 7, 1, -1],
            [101, 7, 2, 4],
            [100, 8, -1, 3],
            [101, 7, -1, -1],
            [100, 7, 5, -1],
            [101, 8, -1, -1],
        ]);

        for finder in [ActorSymbol::ByType, ActorSymbol::ByValue, ActorSymbol::ByContext] {
            let index = ActorIndex::build(finder, &tree);

            let mut scan: std::collections::HashMap<i32, Vec<i32>> = Default::default();
            tree.for_each_subnode(0, |node_id| {
                let symbol = finder.symbol_at(&SlicedCursor::new(&tree, node_id, None));
                if symbol >= 0 {
                    scan.entry(symbol).or_default().push(node_id);
                }
            });

            for (symbol, expected) in &scan {
                let &last = expected.last().unwrap();
                let mut walked = vec![last];
                let mut it =
                    ActorSymbolIter::new(*symbol, SlicedCursor::new(&tree, last, None), &index);
                while it.move_left() {
                    walked.push(it.item().position());
                }
                walked.reverse();
                assert_eq!(&walked, expected, "symbol {symbol} with {finder:?}");
            }
        }
    }

    #[test]
    fn context_symbols_depend_on_ancestors() {
        let tree = fixture();
        let leaf = ActorSymbol::ByContext.symbol_at(&SlicedCursor::new(&tree, 2, None));
        let other = ActorSymbol::ByContext.symbol_at(&SlicedCursor::new(&tree, 5, None));
        // Same (value, type) pair at the node itself, same ancestors: the
        // fingerprints collide by construction.
        assert_eq!(leaf, other);

        let root = ActorSymbol::ByContext.symbol_at(&SlicedCursor::new(&tree, 0, None));
        assert_ne!(leaf, root);
        assert!(leaf >= 0 && root >= 0);
    }
}

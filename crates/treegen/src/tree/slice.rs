//! Slices: declaring a suffix of node ids invisible to feature extraction.
//!
//! Learning conditions each node only on the part of the tree that was
//! predicted before it. A [`TreeSlice`] declares the ids at and after the
//! prediction target as removed; a [`SlicedCursor`] is the traversal that
//! enforces the declaration.

use super::node::{TreeNode, POINTER_IN_PARENT};
use super::storage::TreeStorage;
use super::traversal::TreeCursor;

/// Read-only declaration that node ids `[begin, end)` of one specific store
/// must not be read. The `begin` node is the prediction target; its type is
/// readable only when `allow_read_type_for_begin` is set (used when the
/// value is predicted for an already-known type).
#[derive(Clone, Copy, Debug)]
pub struct TreeSlice<'a> {
    storage: &'a TreeStorage<'a>,
    begin: i32,
    end: i32,
    allow_read_type_for_begin: bool,
}

impl<'a> TreeSlice<'a> {
    /// Slices everything from `begin` to the end of the store: in canonical
    /// DFS order that is exactly the still-to-be-predicted part.
    pub fn from_node(storage: &'a TreeStorage<'a>, begin: i32, allow_read_type_for_begin: bool) -> Self {
        Self {
            storage,
            begin,
            end: storage.len() as i32,
            allow_read_type_for_begin,
        }
    }

    /// True if reading `node_id` of `storage` is forbidden.
    #[inline]
    pub fn is_sliced(&self, storage: &TreeStorage<'_>, node_id: i32) -> bool {
        same_storage(storage, self.storage) && node_id >= self.begin && node_id < self.end
    }

    /// The first sliced node (the prediction target).
    #[inline]
    pub fn begin_node(&self) -> i32 {
        self.begin
    }

    /// One past the last sliced node.
    #[inline]
    pub fn end_node(&self) -> i32 {
        self.end
    }

    pub fn sliced_storage(&self) -> &'a TreeStorage<'a> {
        self.storage
    }

    #[inline]
    pub fn allow_read_type_for_begin(&self) -> bool {
        self.allow_read_type_for_begin
    }
}

#[inline]
fn same_storage(a: &TreeStorage<'_>, b: &TreeStorage<'_>) -> bool {
    std::ptr::eq(
        a as *const TreeStorage<'_> as *const (),
        b as *const TreeStorage<'_> as *const (),
    )
}

// =============================================================================
// SlicedCursor
// =============================================================================

/// Traversal that crosses overlay boundaries and observes a [`TreeSlice`]:
/// sliced nodes read as `EMPTY` and cannot be entered, except for the begin
/// node, which keeps its structural position (`child_index`, `left_sib`,
/// `parent`) and optionally its type.
///
/// After moving up out of an overlay the cursor remembers the attachment, so
/// one `down_*` can return into the overlay instead of descending into the
/// replaced content of the parent store.
#[derive(Clone, Copy, Debug)]
pub struct SlicedCursor<'a> {
    storage: &'a TreeStorage<'a>,
    position: i32,
    slice: Option<&'a TreeSlice<'a>>,
    last_subtree: Option<(&'a TreeStorage<'a>, i32)>,
}

impl<'a> SlicedCursor<'a> {
    pub fn new(
        storage: &'a TreeStorage<'a>,
        position: i32,
        slice: Option<&'a TreeSlice<'a>>,
    ) -> Self {
        Self {
            storage,
            position,
            slice,
            last_subtree: None,
        }
    }

    pub fn tree_storage(&self) -> &'a TreeStorage<'a> {
        self.storage
    }

    pub fn slice(&self) -> Option<&'a TreeSlice<'a>> {
        self.slice
    }

    #[inline]
    fn is_sliced(&self, storage: &TreeStorage<'_>, node_id: i32) -> bool {
        self.slice
            .map_or(false, |slice| slice.is_sliced(storage, node_id))
    }

    fn move_to_parent_storage(&mut self) -> TreeNode {
        debug_assert_eq!(self.position, 0);
        let link = self
            .storage
            .parent()
            .expect("attachment marker without a parent store");
        self.last_subtree = Some((self.storage, link.position));
        self.position = link.position;
        self.storage = link.storage;
        *self.storage.node(self.position)
    }

    fn can_move_to_parent_storage(&self) -> bool {
        let (slice, link) = match (self.slice, self.storage.parent()) {
            (Some(slice), Some(link)) => (slice, link),
            _ => return true,
        };
        !(slice.is_sliced(link.storage, link.position) && link.position != slice.begin_node())
    }

    fn can_move_to_subtree_storage(&self, position: i32) -> bool {
        matches!(self.last_subtree, Some((_, p)) if p == position)
    }

    fn move_to_subtree_storage(&mut self) {
        let (subtree, _) = self.last_subtree.take().expect("no remembered subtree");
        self.storage = subtree;
        self.position = 0;
    }
}

impl<'a> TreeCursor for SlicedCursor<'a> {
    /// The observed node: `EMPTY` inside the slice, with the begin node
    /// keeping its structural fields (and its type when allowed).
    fn node(&self) -> TreeNode {
        if self.is_sliced(self.storage, self.position) {
            let slice = self.slice.expect("sliced without a slice");
            if self.position == slice.begin_node() {
                let stored = self.storage.node(self.position);
                let mut result = TreeNode::EMPTY;
                result.child_index = stored.child_index;
                result.left_sib = stored.left_sib;
                result.parent = stored.parent;
                if slice.allow_read_type_for_begin() {
                    result.set_type(stored.type_id());
                }
                return result;
            }
            return TreeNode::EMPTY;
        }
        *self.storage.node(self.position)
    }

    #[inline]
    fn position(&self) -> i32 {
        self.position
    }

    fn left(&mut self) -> bool {
        let mut left_sib = self.storage.node(self.position).left_sib;
        if left_sib == POINTER_IN_PARENT && self.can_move_to_parent_storage() {
            left_sib = self.move_to_parent_storage().left_sib;
        }
        if left_sib < 0 {
            return false;
        }
        if self.is_sliced(self.storage, left_sib) {
            debug_assert_ne!(left_sib, self.slice.unwrap().begin_node());
            return false;
        }
        self.position = left_sib;
        true
    }

    fn right(&mut self) -> bool {
        let mut right_sib = self.node().right_sib;
        if right_sib == POINTER_IN_PARENT && self.can_move_to_parent_storage() {
            right_sib = self.move_to_parent_storage().right_sib;
        }
        if right_sib < 0 {
            return false;
        }
        // Moving right into the slice would reveal that the predicted node
        // has nodes after it; only the begin node itself may be entered.
        if self.is_sliced(self.storage, right_sib)
            && right_sib != self.slice.unwrap().begin_node()
        {
            return false;
        }
        self.position = right_sib;
        true
    }

    fn up(&mut self) -> bool {
        let mut parent = self.storage.node(self.position).parent;
        if parent == POINTER_IN_PARENT && self.can_move_to_parent_storage() {
            parent = self.move_to_parent_storage().parent;
        }
        if parent < 0 {
            return false;
        }
        if self.is_sliced(self.storage, parent) {
            debug_assert_ne!(parent, self.slice.unwrap().begin_node());
            return false;
        }
        self.position = parent;
        true
    }

    fn down_first_child(&mut self) -> bool {
        let first_child = self.storage.node(self.position).first_child;
        if first_child < 0 {
            return false;
        }
        if self.can_move_to_subtree_storage(first_child) {
            self.move_to_subtree_storage();
            return true;
        }
        if self.is_sliced(self.storage, first_child)
            && first_child != self.slice.unwrap().begin_node()
        {
            return false;
        }
        self.position = first_child;
        true
    }

    fn down_last_child(&mut self) -> bool {
        let last_child = self.storage.node(self.position).last_child;
        if last_child < 0 {
            return false;
        }
        if self.can_move_to_subtree_storage(last_child) {
            self.move_to_subtree_storage();
            return true;
        }
        // The last child must stay hidden both when it is sliced (complete
        // tree) and when it is a not-yet-predicted non-terminal (completion
        // subtree); otherwise the model could learn from the existence of
        // its own output.
        if self.is_sliced(self.storage, last_child)
            || self.storage.node(last_child).has_non_terminal()
        {
            return false;
        }
        self.position = last_child;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{FullCursor, TreeSubstitution};
    use crate::StringInterner;

    fn tree_from(rows: Vec<[i32; 4]>) -> TreeStorage<'static> {
        let mut storage = TreeStorage::new();
        storage.substitute_node(0, &TreeSubstitution::from(rows));
        storage.check_consistency().unwrap();
        storage
    }

    #[test]
    fn full_cursor_crosses_overlays() {
        let root_tree = tree_from(vec![
            [7, -1, 1, -1],
            [1, -1, -1, 2],
            [-2, -1, -1, 3],
            [4, -1, -1, -1],
        ]);
        assert_eq!(root_tree.debug_string(None), "[7 [1] [-2] [4]]");

        let mut second_tree = TreeStorage::overlay(&root_tree, 2);
        second_tree.substitute_node(
            0,
            &TreeSubstitution::from(vec![[5, -1, 1, -1], [6, -1, -1, 2], [10, -1, -1, -1]]),
        );
        assert_eq!(second_tree.debug_string(None), "[5 [6] [10]]");

        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.down_first_child());
            assert_eq!(t.node().type_id(), 6);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.down_last_child());
            assert_eq!(t.node().type_id(), 10);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.up());
            assert_eq!(t.node().type_id(), 7);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.left());
            assert_eq!(t.node().type_id(), 1);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.right());
            assert_eq!(t.node().type_id(), 4);
            assert!(!t.right());
            assert!(t.up());
            assert_eq!(t.node().type_id(), 7);
        }

        let patch = second_tree.to_inline_patch().unwrap();
        assert_eq!(second_tree.debug_string(None), "[5 [6] [10]]");
        drop(second_tree);

        let mut root_tree = root_tree;
        root_tree.inline_patch(&patch);
        assert_eq!(root_tree.debug_string(None), "[7 [1] [5 [6] [10]] [4]]");
        root_tree.check_consistency().unwrap();
    }

    #[test]
    fn full_cursor_without_right_sibling_at_attachment() {
        let root_tree = tree_from(vec![[7, -1, 1, -1], [1, -1, -1, 2], [-2, -1, -1, -1]]);
        assert_eq!(root_tree.debug_string(None), "[7 [1] [-2]]");

        let mut second_tree = TreeStorage::overlay(&root_tree, 2);
        second_tree.substitute_node(
            0,
            &TreeSubstitution::from(vec![[5, -1, 1, -1], [6, -1, -1, 2], [10, -1, -1, -1]]),
        );

        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.left());
            assert_eq!(t.node().type_id(), 1);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(!t.right()); // no right sibling
            assert_eq!(t.node().type_id(), 5); // unmoved
            assert!(t.down_first_child());
            assert_eq!(t.node().type_id(), 6);
            assert!(t.up());
            assert!(t.left());
            assert_eq!(t.node().type_id(), 1);
        }

        let patch = second_tree.to_inline_patch().unwrap();
        drop(second_tree);
        let mut root_tree = root_tree;
        root_tree.inline_patch(&patch);
        assert_eq!(root_tree.debug_string(None), "[7 [1] [5 [6] [10]]]");
        root_tree.check_consistency().unwrap();

        {
            let mut t = FullCursor::new(&root_tree, 0);
            assert!(t.down_first_child());
            let sub = root_tree.subtree_from_node(t.position());
            assert_eq!(sub.debug_string(None), "[1]");
            sub.check_consistency().unwrap();
        }
        {
            let mut t = FullCursor::new(&root_tree, 0);
            assert!(t.down_last_child());
            let sub = root_tree.subtree_from_node(t.position());
            assert_eq!(sub.debug_string(None), "[5 [6] [10]]");
            sub.check_consistency().unwrap();
        }
    }

    #[test]
    fn full_cursor_without_left_sibling_at_attachment() {
        let root_tree = tree_from(vec![[7, -1, 1, -1], [-2, -1, -1, 2], [4, -1, -1, -1]]);
        assert_eq!(root_tree.debug_string(None), "[7 [-2] [4]]");

        let mut second_tree = TreeStorage::overlay(&root_tree, 1);
        second_tree.substitute_node(
            0,
            &TreeSubstitution::from(vec![[5, -1, 1, -1], [6, -1, -1, 2], [10, -1, -1, -1]]),
        );

        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.up());
            assert_eq!(t.node().type_id(), 7);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(!t.left()); // no left sibling
            assert_eq!(t.node().type_id(), 5); // unmoved
            assert!(t.down_first_child());
            assert_eq!(t.node().type_id(), 6);
            assert!(t.up());
            assert!(t.up());
            assert_eq!(t.node().type_id(), 7);
        }
        {
            let mut t = FullCursor::new(&second_tree, 0);
            assert!(t.right());
            assert_eq!(t.node().type_id(), 4);
        }

        let patch = second_tree.to_inline_patch().unwrap();
        drop(second_tree);
        let mut root_tree = root_tree;
        root_tree.inline_patch(&patch);
        assert_eq!(root_tree.debug_string(None), "[7 [5 [6] [10]] [4]]");
        root_tree.check_consistency().unwrap();
    }

    #[test]
    fn sliced_cursor_returns_into_the_overlay() {
        let root_tree = tree_from(vec![[7, -1, 1, -1], [3, -1, -1, 2], [4, -1, -1, -1]]);
        let mut second_tree = TreeStorage::overlay(&root_tree, 1);
        second_tree.substitute_node(
            0,
            &TreeSubstitution::from(vec![[5, -1, 1, -1], [6, -1, -1, 2], [10, -1, -1, -1]]),
        );

        {
            let slice = TreeSlice::from_node(&root_tree, second_tree.position_in_parent(), false);
            let mut t = SlicedCursor::new(&second_tree, 0, Some(&slice));
            assert!(t.up());
            assert_eq!(t.node().type_id(), 7);
            assert!(t.down_first_child());
            // Back inside the overlay, not the replaced parent content.
            assert_eq!(t.node().type_id(), 5);
            assert_eq!(t.node().child_index, 0);
            assert!(t.down_first_child());
            assert_eq!(t.node().type_id(), 6);
        }
        {
            let slice = TreeSlice::from_node(&root_tree, second_tree.position_in_parent(), false);
            let mut t = SlicedCursor::new(&second_tree, 0, Some(&slice));
            assert!(t.up());
            assert_eq!(t.node().type_id(), 7);
            // The sliced right sibling of the predicted subtree stays hidden.
            assert!(!t.down_last_child());
        }
    }

    #[test]
    fn sliced_cursor_reads_begin_node_as_empty() {
        let root_tree = tree_from(vec![[7, -1, 1, -1], [3, -1, -1, 2], [4, -1, -1, -1]]);
        let mut second_tree = TreeStorage::overlay(&root_tree, 2);
        second_tree.substitute_node(
            0,
            &TreeSubstitution::from(vec![[5, -1, 1, -1], [6, -1, -1, 2], [10, -1, -1, -1]]),
        );

        let slice = TreeSlice::from_node(&root_tree, second_tree.position_in_parent(), false);
        let mut t = SlicedCursor::new(&second_tree, 0, Some(&slice));
        assert!(t.up());
        assert_eq!(t.node().type_id(), 7);
        assert!(t.down_first_child());
        assert_eq!(t.node().type_id(), 3);
        assert!(t.right());
        assert_eq!(t.node().type_id(), -1);
    }

    #[test]
    fn slice_blocks_right_and_optionally_reveals_begin_type() {
        let mut tree = tree_from(vec![
            [5, -1, 1, -1],
            [51, -1, 2, 4],
            [511, -1, -1, 3],
            [512, -1, -1, -1],
            [52, -1, -1, -1],
        ]);
        assert_eq!(tree.debug_string(None), "[5 [51 [511] [512]] [52]]");
        tree.canonicalize();

        {
            let slice = TreeSlice::from_node(&tree, 1, true);
            let mut t = SlicedCursor::new(&tree, 0, Some(&slice));
            assert_eq!(t.node().type_id(), 5);
            assert!(t.down_first_child());
            // Readable: it is the begin node and type reads are allowed.
            assert_eq!(t.node().type_id(), 51);
            assert!(!t.right());
            assert_eq!(t.node().type_id(), 51);
            assert!(!t.right());
        }
        {
            let slice = TreeSlice::from_node(&tree, 2, true);
            let mut t = SlicedCursor::new(&tree, 0, Some(&slice));
            assert_eq!(t.node().type_id(), 5);
            assert!(t.down_first_child());
            assert_eq!(t.node().type_id(), 51);
            assert!(!t.right());
            assert_eq!(t.node().type_id(), 51);
        }
    }

    #[test]
    fn down_last_never_enters_the_slice() {
        let mut interner = StringInterner::new();
        let root = interner.intern("Root");
        let var_decls = interner.intern("VarDecls");
        let var = interner.intern("Var");
        let plus_expr = interner.intern("PlusExpr");
        let v1 = interner.intern("v1");
        let v2 = interner.intern("v2");

        // Complete tree: the sliced last child is a real node.
        let tree = tree_from(vec![
            [root, -1, 1, -1],
            [var_decls, -1, 2, 3],
            [var, v1, -1, -1],
            [plus_expr, -1, 4, -1],
            [var, v1, -1, 5],
            [var, v2, -1, -1],
        ]);
        {
            let slice = TreeSlice::from_node(&tree, 4, false);
            let mut t = SlicedCursor::new(&tree, 4, Some(&slice));
            assert!(t.up());
            assert_eq!(t.position(), 3);
            assert_eq!(t.node().type_id(), plus_expr);
            assert!(!t.down_last_child());
            assert_eq!(t.position(), 3);
        }

        // Completion subtree: the last child is the non-terminal target.
        let tree = tree_from(vec![
            [root, -1, 1, -1],
            [var_decls, -1, 2, 3],
            [var, v1, -1, -1],
            [plus_expr, -1, 4, -1],
            [var, v1, -1, -1],
        ]);
        {
            let slice = TreeSlice::from_node(&tree, 4, false);
            let mut t = SlicedCursor::new(&tree, 4, Some(&slice));
            assert!(t.up());
            assert_eq!(t.position(), 3);
            assert!(!t.down_last_child());
            assert_eq!(t.position(), 3);
        }
        {
            let slice = TreeSlice::from_node(&tree, 4, false);
            let mut t = SlicedCursor::new(&tree, 4, Some(&slice));
            assert!(t.up());
            // The begin node itself can be entered going down-first.
            assert!(t.down_first_child());
            assert_eq!(t.position(), 4);
        }
    }
}

//! Cursors over tree arenas.
//!
//! All cursors share one operation set (`up`, `left`, `right`,
//! `down_first_child`, `down_last_child`, `node`, `position`); every move
//! returns `false` and leaves the position unchanged when it is impossible.
//! `node()` returns the 32-byte record by value so that views which
//! synthesize nodes (the sliced cursor) have the same shape.
//!
//! - [`FullCursor`]: read-only, follows overlay attachment markers into the
//!   parent store.
//! - [`LocalCursor`]: read-only, confined to one store.
//! - [`EpsWriter`]: writable, visits missing child / right-sibling positions
//!   as `EMPTY`-labeled eps nodes; an eps node whose type is written becomes
//!   a real arena node on the next move.

use super::node::{TreeNode, EMPTY_NODE_LABEL, NO_TREE_NODE, POINTER_IN_PARENT};
use super::storage::TreeStorage;

/// Shared navigation interface for generic walking code.
pub trait TreeCursor {
    fn node(&self) -> TreeNode;
    fn position(&self) -> i32;
    fn up(&mut self) -> bool;
    fn left(&mut self) -> bool;
    fn right(&mut self) -> bool;
    fn down_first_child(&mut self) -> bool;
    fn down_last_child(&mut self) -> bool;
}

/// One step of forward pre-order DFS. Returns `false` at the end.
pub fn advance_pre_order<C: TreeCursor>(cursor: &mut C) -> bool {
    if cursor.down_first_child() {
        return true;
    }
    loop {
        if cursor.right() {
            return true;
        }
        if !cursor.up() {
            return false;
        }
    }
}

/// Moves to the first node of a forward post-order DFS.
pub fn descend_to_post_order_start<C: TreeCursor>(cursor: &mut C) {
    while cursor.down_first_child() {}
}

/// One step of forward post-order DFS. Returns `false` at the end.
pub fn advance_post_order<C: TreeCursor>(cursor: &mut C) -> bool {
    if cursor.right() {
        descend_to_post_order_start(cursor);
        return true;
    }
    cursor.up()
}

// =============================================================================
// FullCursor
// =============================================================================

/// Read-only cursor that crosses overlay boundaries: `up`, `left` and
/// `right` follow `POINTER_IN_PARENT` markers into the parent store.
#[derive(Clone, Copy, Debug)]
pub struct FullCursor<'a> {
    storage: &'a TreeStorage<'a>,
    position: i32,
}

impl<'a> FullCursor<'a> {
    pub fn new(storage: &'a TreeStorage<'a>, position: i32) -> Self {
        Self { storage, position }
    }

    pub fn tree_storage(&self) -> &'a TreeStorage<'a> {
        self.storage
    }

    /// Moves to the parent store's node at the attachment position and
    /// returns it. The cursor then points at the same logical node.
    fn move_to_parent_storage(&mut self) -> TreeNode {
        let link = self
            .storage
            .parent()
            .expect("attachment marker without a parent store");
        self.position = link.position;
        self.storage = link.storage;
        *self.storage.node(self.position)
    }
}

impl<'a> TreeCursor for FullCursor<'a> {
    #[inline]
    fn node(&self) -> TreeNode {
        *self.storage.node(self.position)
    }

    #[inline]
    fn position(&self) -> i32 {
        self.position
    }

    fn up(&mut self) -> bool {
        let mut parent = self.node().parent;
        if parent == POINTER_IN_PARENT {
            parent = self.move_to_parent_storage().parent;
        }
        if parent < 0 {
            return false;
        }
        self.position = parent;
        true
    }

    fn left(&mut self) -> bool {
        let mut left_sib = self.node().left_sib;
        if left_sib == POINTER_IN_PARENT {
            left_sib = self.move_to_parent_storage().left_sib;
        }
        if left_sib < 0 {
            return false;
        }
        self.position = left_sib;
        true
    }

    fn right(&mut self) -> bool {
        let mut right_sib = self.node().right_sib;
        if right_sib == POINTER_IN_PARENT {
            right_sib = self.move_to_parent_storage().right_sib;
        }
        if right_sib < 0 {
            return false;
        }
        self.position = right_sib;
        true
    }

    fn down_first_child(&mut self) -> bool {
        let first_child = self.node().first_child;
        if first_child < 0 {
            return false;
        }
        self.position = first_child;
        true
    }

    fn down_last_child(&mut self) -> bool {
        let last_child = self.node().last_child;
        if last_child < 0 {
            return false;
        }
        self.position = last_child;
        true
    }
}

// =============================================================================
// LocalCursor
// =============================================================================

/// Read-only cursor confined to one store; attachment markers read as "no
/// neighbor".
#[derive(Clone, Copy, Debug)]
pub struct LocalCursor<'a> {
    storage: &'a TreeStorage<'a>,
    position: i32,
}

impl<'a> LocalCursor<'a> {
    pub fn new(storage: &'a TreeStorage<'a>, position: i32) -> Self {
        Self { storage, position }
    }

    pub fn tree_storage(&self) -> &'a TreeStorage<'a> {
        self.storage
    }
}

impl<'a> TreeCursor for LocalCursor<'a> {
    #[inline]
    fn node(&self) -> TreeNode {
        *self.storage.node(self.position)
    }

    #[inline]
    fn position(&self) -> i32 {
        self.position
    }

    fn up(&mut self) -> bool {
        let parent = self.node().parent;
        if parent < 0 {
            return false;
        }
        self.position = parent;
        true
    }

    fn left(&mut self) -> bool {
        let left_sib = self.node().left_sib;
        if left_sib < 0 {
            return false;
        }
        self.position = left_sib;
        true
    }

    fn right(&mut self) -> bool {
        let right_sib = self.node().right_sib;
        if right_sib < 0 {
            return false;
        }
        self.position = right_sib;
        true
    }

    fn down_first_child(&mut self) -> bool {
        let first_child = self.node().first_child;
        if first_child < 0 {
            return false;
        }
        self.position = first_child;
        true
    }

    fn down_last_child(&mut self) -> bool {
        let last_child = self.node().last_child;
        if last_child < 0 {
            return false;
        }
        self.position = last_child;
        true
    }
}

/// Number of nodes in the subtree under the cursor.
pub fn tree_size(mut cursor: LocalCursor<'_>) -> i32 {
    let start = cursor.position();
    let mut result = 0;
    loop {
        result += 1;
        if !cursor.down_first_child() {
            loop {
                if cursor.position() == start {
                    return result;
                }
                if cursor.right() {
                    break;
                }
                let moved = cursor.up();
                debug_assert!(moved);
            }
        }
    }
}

// =============================================================================
// EpsWriter
// =============================================================================

/// Writable cursor that can stand on not-yet-existing ("eps") child and
/// right-sibling positions. Writing a non-`EMPTY` type into an eps position
/// materializes the node as the parent's new last child on the next move.
#[derive(Debug)]
pub struct EpsWriter<'s, 'p> {
    storage: &'s mut TreeStorage<'p>,
    position: i32,
    eps: TreeNode,
}

impl<'s, 'p> EpsWriter<'s, 'p> {
    pub fn new(storage: &'s mut TreeStorage<'p>, position: i32) -> Self {
        Self {
            storage,
            position,
            eps: TreeNode::EMPTY,
        }
    }

    #[inline]
    pub fn position(&self) -> i32 {
        self.position
    }

    #[inline]
    pub fn node(&self) -> TreeNode {
        if self.position < 0 {
            self.eps
        } else {
            *self.storage.node(self.position)
        }
    }

    /// Overwrites the current node's labels (on the eps scratch node when
    /// the position does not exist yet).
    pub fn set_labels(&mut self, ty: i32, val: i32) {
        if self.position < 0 {
            self.eps.ty = ty;
            self.eps.val = val;
        } else {
            let n = self.storage.node_mut(self.position);
            n.ty = ty;
            n.val = val;
        }
    }

    /// Materializes an eps node carrying a non-`EMPTY` type. No-op on real
    /// positions and on content-free eps nodes.
    pub fn write_node(&mut self) {
        if self.position < 0 {
            self.position = self.storage.add_last_node(self.eps);
        }
    }

    fn allocate_eps_child(&mut self) {
        self.eps = TreeNode {
            ty: EMPTY_NODE_LABEL,
            val: NO_TREE_NODE,
            parent: self.position,
            left_sib: NO_TREE_NODE,
            right_sib: NO_TREE_NODE,
            first_child: NO_TREE_NODE,
            last_child: NO_TREE_NODE,
            child_index: 0,
        };
    }

    fn allocate_eps_right_sibling(&mut self) {
        debug_assert!(self.position >= 0);
        let current = self.node();
        self.eps = TreeNode {
            ty: EMPTY_NODE_LABEL,
            val: NO_TREE_NODE,
            parent: current.parent,
            left_sib: self.position,
            right_sib: NO_TREE_NODE,
            first_child: NO_TREE_NODE,
            last_child: NO_TREE_NODE,
            child_index: current.child_index + 1,
        };
    }

    /// One step of forward pre-order DFS over the eps view, materializing
    /// the current node if its labels were written.
    pub fn advance_pre_order(&mut self) -> bool {
        if self.down_first_child() {
            return true;
        }
        loop {
            if self.right() {
                return true;
            }
            if !self.up() {
                return false;
            }
        }
    }

    pub fn up(&mut self) -> bool {
        self.write_node();
        let parent = self.node().parent;
        if parent < 0 {
            return false;
        }
        self.position = parent;
        true
    }

    pub fn left(&mut self) -> bool {
        if self.node().ty == EMPTY_NODE_LABEL {
            return false;
        }
        self.write_node();
        let left_sib = self.storage.node(self.position).left_sib;
        if left_sib < 0 {
            return false;
        }
        self.position = left_sib;
        true
    }

    pub fn right(&mut self) -> bool {
        if self.node().ty == EMPTY_NODE_LABEL {
            return false;
        }
        self.write_node();
        let right_sib = self.storage.node(self.position).right_sib;
        if right_sib < 0 {
            if self.position == 0 {
                // Nothing on the right of the root.
                return false;
            }
            self.allocate_eps_right_sibling();
        }
        self.position = right_sib;
        true
    }

    pub fn down_first_child(&mut self) -> bool {
        if self.node().ty == EMPTY_NODE_LABEL {
            return false;
        }
        self.write_node();
        let first_child = self.storage.node(self.position).first_child;
        if first_child < 0 {
            self.allocate_eps_child();
        }
        self.position = first_child;
        true
    }

    pub fn down_last_child(&mut self) -> bool {
        if self.node().ty == EMPTY_NODE_LABEL {
            return false;
        }
        self.write_node();
        let last_child = self.storage.node(self.position).last_child;
        if last_child < 0 {
            self.allocate_eps_child();
        }
        self.position = last_child;
        true
    }
}

//! Arena tree storage with overlay attachment and free-list slot reuse.

use serde_json::Value;

use crate::interner::StringInterner;

use super::node::{
    SubstitutionNode, TreeNode, TreeSubstitution, EMPTY_NODE_LABEL, NO_TREE_NODE, POINTER_FREED,
    POINTER_IN_PARENT, UNKNOWN_LABEL,
};
use super::traversal::{advance_post_order, descend_to_post_order_start, EpsWriter, LocalCursor, TreeCursor};

// =============================================================================
// Errors
// =============================================================================

/// Structural validation errors for [`TreeStorage::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("node {node} is reachable but its arena slot is freed")]
    ReachableFreedSlot { node: i32 },
    #[error("node {parent} does not list node {node} as its first child")]
    FirstChildLink { parent: i32, node: i32 },
    #[error("node {parent} does not list node {node} as its last child")]
    LastChildLink { parent: i32, node: i32 },
    #[error("sibling links between nodes {node} and {sibling} disagree")]
    SiblingLink { node: i32, sibling: i32 },
    #[error("node {node} has child index {actual}, expected {expected}")]
    ChildIndex { node: i32, expected: i32, actual: i32 },
    #[error("node {child} does not point back to parent {parent}")]
    ParentLink { parent: i32, child: i32 },
    #[error("cycle while walking the tree structure")]
    StructureCycle,
    #[error("cycle in the free list")]
    FreeListCycle,
    #[error("{live} live plus {freed} freed slots do not cover an arena of {total}")]
    SlotCount { live: usize, freed: usize, total: usize },
}

/// Errors raised while building a tree from its JSON form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AstJsonError {
    #[error("AST is not a JSON array")]
    NotAnArray,
    #[error("AST array contains no node objects")]
    Empty,
    #[error("AST element {index} is not an object")]
    NotAnObject { index: usize },
    #[error("AST element {index} declares id {id}")]
    IdMismatch { index: usize, id: i64 },
    #[error("AST element {index} has no string `type`")]
    MissingType { index: usize },
    #[error("child {child} of node {parent} does not come after its parent")]
    ChildNotAfterParent { parent: i32, child: i32 },
    #[error("child {child} is out of range for {count} nodes")]
    ChildOutOfRange { child: i32, count: usize },
}

// =============================================================================
// TreeStorage
// =============================================================================

/// Attachment of an overlay store to its parent store.
#[derive(Clone, Copy, Debug)]
pub struct ParentLink<'p> {
    pub storage: &'p TreeStorage<'p>,
    pub position: i32,
}

/// An AST held in a dense arena of [`TreeNode`]s.
///
/// Node id 0 is always the root of this store. Freed slots form an intrusive
/// free list threaded through the type field. A store may be an *overlay*: a
/// subtree-in-progress attached to a read-only parent store at a position;
/// its root then carries `POINTER_IN_PARENT` markers that overlay-crossing
/// cursors resolve against the parent.
#[derive(Debug, Clone)]
pub struct TreeStorage<'p> {
    nodes: Vec<TreeNode>,
    parent: Option<ParentLink<'p>>,
    first_free: i32,
}

/// One slot of the eps-order label sequence: a real position with its raw
/// labels, or a missing child / right-sibling slot (`position == -1`).
#[derive(Clone, Copy, Debug)]
pub(crate) struct EpsLabel {
    pub position: i32,
    pub ty: i32,
    pub val: i32,
}

impl EpsLabel {
    fn empty() -> Self {
        EpsLabel {
            position: NO_TREE_NODE,
            ty: EMPTY_NODE_LABEL,
            val: NO_TREE_NODE,
        }
    }
}

/// Result of projecting an overlay store for [`TreeStorage::inline_patch`].
#[derive(Clone, Debug)]
pub struct InlinePatch {
    pub position_in_parent: i32,
    labels: Vec<(i32, i32)>,
}

impl<'p> Default for TreeStorage<'p> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'p> TreeStorage<'p> {
    /// A store holding a single root node with unknown type.
    pub fn new() -> Self {
        Self {
            nodes: vec![first_node()],
            parent: None,
            first_free: -1,
        }
    }

    /// A fresh overlay store attached to `parent` at `position`.
    ///
    /// The root mirrors the parent node's child index and carries
    /// `POINTER_IN_PARENT` markers for the parent and for the left/right
    /// siblings that exist in the parent store.
    pub fn overlay(parent: &'p TreeStorage<'p>, position: i32) -> Self {
        let mut storage = Self::new();
        let attach = parent.node(position);
        let root = &mut storage.nodes[0];
        if attach.left_sib >= 0 {
            root.left_sib = POINTER_IN_PARENT;
        }
        if attach.right_sib >= 0 {
            root.right_sib = POINTER_IN_PARENT;
        }
        root.parent = POINTER_IN_PARENT;
        root.child_index = attach.child_index;
        storage.parent = Some(ParentLink {
            storage: parent,
            position,
        });
        storage
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn node(&self, node_id: i32) -> &TreeNode {
        &self.nodes[node_id as usize]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, node_id: i32) -> &mut TreeNode {
        &mut self.nodes[node_id as usize]
    }

    /// Number of allocated arena slots (live and freed).
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn parent(&self) -> Option<ParentLink<'p>> {
        self.parent
    }

    /// Attachment position in the parent store, `-1` for root stores.
    #[inline]
    pub fn position_in_parent(&self) -> i32 {
        self.parent.map_or(-1, |link| link.position)
    }

    /// True if any live node still has an unknown type or value.
    pub fn has_non_terminal(&self) -> bool {
        let mut cursor = LocalCursor::new(self.as_local(), 0);
        loop {
            if cursor.node().has_non_terminal() {
                return true;
            }
            if !super::traversal::advance_pre_order(&mut cursor) {
                return false;
            }
        }
    }

    /// Number of children of the node at `position`.
    pub fn num_node_children(&self, position: i32) -> i32 {
        let mut cursor = LocalCursor::new(self.as_local(), position);
        if !cursor.down_first_child() {
            return 0;
        }
        let mut count = 1;
        while cursor.right() {
            count += 1;
        }
        count
    }

    /// Number of nodes in the subtree rooted at `position`.
    pub fn subtree_size(&self, position: i32) -> i32 {
        super::traversal::tree_size(LocalCursor::new(self.as_local(), position))
    }

    /// The label the model predicts at `position`: the value id, or for
    /// types the packed [`TypeLabel`](super::TypeLabel).
    pub fn label_at(&self, position: i32, for_type: bool) -> i32 {
        let n = self.node(position);
        if for_type {
            super::node::encode_type_label(super::node::TypeLabel {
                type_id: n.type_id(),
                has_first_child: n.first_child != NO_TREE_NODE,
                has_right_sib: n.right_sib != NO_TREE_NODE,
            })
        } else {
            n.value_id()
        }
    }

    /// Re-borrows `self` at a caller-chosen (shorter) lifetime so cursor
    /// types parameterized by one lifetime can be built from it.
    #[inline]
    pub(crate) fn as_local<'a>(&'a self) -> &'a TreeStorage<'a> {
        self
    }

    /// Visits `start` and every node below it in pre-order.
    pub fn for_each_subnode(&self, start: i32, mut f: impl FnMut(i32)) {
        let mut current = start;
        loop {
            f(current);
            if self.node(current).first_child >= 0 {
                current = self.node(current).first_child;
            } else {
                loop {
                    if current == start {
                        return;
                    }
                    let right_sib = self.node(current).right_sib;
                    if right_sib >= 0 {
                        current = right_sib;
                        break;
                    }
                    current = self.node(current).parent;
                    debug_assert!(current >= 0);
                }
            }
        }
    }

    // =========================================================================
    // JSON construction
    // =========================================================================

    /// Builds a tree from the JSON array form: objects with `type`,
    /// optional `value`, optional forward `children` references, and an
    /// optional `id` that must equal the element index. A trailing
    /// non-object element (the conventional `0` sentinel) is tolerated.
    pub fn from_json(
        v: &Value,
        interner: &mut StringInterner,
    ) -> Result<TreeStorage<'static>, AstJsonError> {
        let array = v.as_array().ok_or(AstJsonError::NotAnArray)?;

        let mut node_count = array.len();
        while node_count > 0 && !array[node_count - 1].is_object() {
            node_count -= 1;
        }
        if node_count == 0 {
            return Err(AstJsonError::Empty);
        }

        let mut storage = TreeStorage {
            nodes: vec![parsed_node(); node_count],
            parent: None,
            first_free: -1,
        };
        storage.nodes[0].child_index = 0;

        for (node_id, json_node) in array.iter().take(node_count).enumerate() {
            let obj = json_node
                .as_object()
                .ok_or(AstJsonError::NotAnObject { index: node_id })?;
            if let Some(id) = obj.get("id") {
                let id = id.as_i64().unwrap_or(-1);
                if id != node_id as i64 {
                    return Err(AstJsonError::IdMismatch { index: node_id, id });
                }
            }
            let ty = obj
                .get("type")
                .and_then(Value::as_str)
                .ok_or(AstJsonError::MissingType { index: node_id })?;
            storage.nodes[node_id].ty = interner.intern(ty);
            storage.nodes[node_id].val = match obj.get("value").and_then(Value::as_str) {
                Some(value) => interner.intern(value),
                None => NO_TREE_NODE,
            };

            if let Some(children) = obj.get("children").and_then(Value::as_array) {
                let mut last_child_id = NO_TREE_NODE;
                for (i, child) in children.iter().enumerate() {
                    let child_id = child.as_i64().unwrap_or(-1) as i32;
                    // Children always come after their parent; this is what
                    // makes the id order a tree order.
                    if child_id <= node_id as i32 {
                        return Err(AstJsonError::ChildNotAfterParent {
                            parent: node_id as i32,
                            child: child_id,
                        });
                    }
                    if child_id as usize >= node_count {
                        return Err(AstJsonError::ChildOutOfRange {
                            child: child_id,
                            count: node_count,
                        });
                    }
                    let node_id = node_id as i32;
                    storage.nodes[child_id as usize].child_index = i as i32;
                    storage.nodes[child_id as usize].parent = node_id;
                    if last_child_id == NO_TREE_NODE {
                        storage.nodes[node_id as usize].first_child = child_id;
                    } else {
                        storage.nodes[last_child_id as usize].right_sib = child_id;
                        storage.nodes[child_id as usize].left_sib = last_child_id;
                    }
                    storage.nodes[node_id as usize].last_child = child_id;
                    last_child_id = child_id;
                }
            }
        }

        Ok(storage)
    }

    // =========================================================================
    // Eps label sequences
    // =========================================================================

    /// The pre-order label sequence of the eps view of the subtree at
    /// `start`: each node contributes its raw labels, childless nodes are
    /// followed by one missing-first-child slot, and one missing-right-
    /// sibling slot closes every child list.
    pub(crate) fn eps_label_sequence(&self, start: i32) -> Vec<EpsLabel> {
        enum Step {
            Visit(i32),
            CloseChildren,
        }

        let mut out = Vec::new();
        let mut stack = vec![Step::Visit(start)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(pos) => {
                    let n = self.node(pos);
                    out.push(EpsLabel {
                        position: pos,
                        ty: n.ty,
                        val: n.val,
                    });
                    if n.first_child >= 0 {
                        stack.push(Step::CloseChildren);
                        let mut children = Vec::new();
                        let mut c = n.first_child;
                        while c >= 0 {
                            children.push(c);
                            c = self.node(c).right_sib;
                        }
                        for &c in children.iter().rev() {
                            stack.push(Step::Visit(c));
                        }
                    } else {
                        out.push(EpsLabel::empty());
                    }
                }
                Step::CloseChildren => out.push(EpsLabel::empty()),
            }
        }
        out
    }

    /// Replays an eps-order label sequence starting at `start`,
    /// materializing every slot written with a non-`EMPTY` type.
    fn write_eps_labels(&mut self, start: i32, labels: &[(i32, i32)]) {
        let mut writer = EpsWriter::new(self, start);
        for &(ty, val) in labels {
            writer.set_labels(ty, val);
            writer.advance_pre_order();
        }
    }

    // =========================================================================
    // Subtree extraction and overlay projection
    // =========================================================================

    /// Detaches the subtree at `node` into its own store. For the root this
    /// is a plain copy; otherwise the result is an overlay attached at
    /// `node`, in canonical DFS order.
    pub fn subtree_from_node<'a>(&'a self, node: i32) -> TreeStorage<'a> {
        if node == 0 {
            return self.clone();
        }
        let mut result = TreeStorage::overlay(self.as_local(), node);
        let labels: Vec<(i32, i32)> = self
            .eps_label_sequence(node)
            .iter()
            .map(|l| (l.ty, l.val))
            .collect();
        result.write_eps_labels(0, &labels);
        result
    }

    /// The overlay a completion model predicts into: the subtree rooted at
    /// `position`'s parent (or at `position` for the root), with
    /// `position`'s labels blanked to `UNKNOWN` (type kept when the value is
    /// being predicted) and every node after `position` in DFS order
    /// dropped.
    pub fn subtree_for_completion<'a>(
        &'a self,
        position: i32,
        is_for_node_type: bool,
    ) -> TreeStorage<'a> {
        let mut subtree_pos = self.node(position).parent;
        if subtree_pos == NO_TREE_NODE {
            subtree_pos = position;
        }

        let mut labels = Vec::new();
        for slot in self.eps_label_sequence(subtree_pos) {
            if slot.position == position {
                let ty = if is_for_node_type {
                    UNKNOWN_LABEL
                } else {
                    self.node(position).type_id()
                };
                labels.push((ty, UNKNOWN_LABEL));
                break;
            }
            let n = TreeNode {
                ty: slot.ty,
                val: slot.val,
                ..TreeNode::EMPTY
            };
            labels.push((n.type_id(), n.value_id()));
        }

        let mut subtree = TreeStorage::overlay(self.as_local(), subtree_pos);
        subtree.write_eps_labels(0, &labels);
        subtree
    }

    /// Reorders the arena so node ids are in pre-order DFS. Idempotent and
    /// invisible to label reads; compacts freed slots away.
    pub fn canonicalize(&mut self) {
        let labels: Vec<(i32, i32)> = self
            .eps_label_sequence(0)
            .iter()
            .map(|l| (l.ty, l.val))
            .collect();
        let mut tmp = match self.parent {
            Some(link) => TreeStorage::overlay(link.storage, link.position),
            None => TreeStorage::new(),
        };
        tmp.nodes.reserve(self.nodes.len());
        tmp.write_eps_labels(0, &labels);
        self.nodes = tmp.nodes;
        self.first_free = tmp.first_free;
    }

    /// Captures this overlay's content for [`TreeStorage::inline_patch`].
    /// Returns `None` for stores without a parent.
    pub fn to_inline_patch(&self) -> Option<InlinePatch> {
        let link = self.parent?;
        Some(InlinePatch {
            position_in_parent: link.position,
            labels: self
                .eps_label_sequence(0)
                .iter()
                .map(|l| (l.ty, l.val))
                .collect(),
        })
    }

    /// Projects a captured overlay onto this store at the attachment
    /// position. The overlay itself can be discarded afterwards.
    pub fn inline_patch(&mut self, patch: &InlinePatch) {
        self.remove_node_children(patch.position_in_parent);
        self.write_eps_labels(patch.position_in_parent, &patch.labels);
    }

    /// Overwrites the node at `node_id` (and everything below it) with the
    /// content of `other`.
    pub fn substitute_node_with_tree(&mut self, node_id: i32, other: &TreeStorage<'_>) {
        let labels: Vec<(i32, i32)> = other
            .eps_label_sequence(0)
            .iter()
            .map(|l| (l.ty, l.val))
            .collect();
        self.remove_node_children(node_id);
        self.write_eps_labels(node_id, &labels);
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes every node below `position`, returning their slots to the
    /// free list (the topmost arena slot is popped instead).
    pub fn remove_node_children(&mut self, position: i32) {
        let first = self.node(position).first_child;
        if first < 0 {
            return;
        }

        let mut order = Vec::new();
        {
            let mut cursor = LocalCursor::new(self.as_local(), first);
            descend_to_post_order_start(&mut cursor);
            while cursor.position() != position {
                order.push(cursor.position());
                if !advance_post_order(&mut cursor) {
                    break;
                }
            }
        }

        self.node_mut(position).first_child = NO_TREE_NODE;
        self.node_mut(position).last_child = NO_TREE_NODE;
        for node_id in order {
            self.deallocate_node(node_id);
        }
    }

    /// Removes the node at `position` and its subtree. The node must have no
    /// right sibling; the root cannot be removed.
    pub fn remove_node(&mut self, position: i32) {
        self.remove_node_children(position);
        if position == 0 {
            return;
        }
        let node = *self.node(position);
        assert!(node.right_sib < 0, "cannot remove a node with a right sibling");
        if node.parent >= 0 {
            if self.node(node.parent).first_child == position {
                self.node_mut(node.parent).first_child = NO_TREE_NODE;
            }
            self.node_mut(node.parent).last_child = node.left_sib;
        }
        if node.left_sib >= 0 {
            self.node_mut(node.left_sib).right_sib = NO_TREE_NODE;
        }
        self.deallocate_node(position);
    }

    // =========================================================================
    // Substitution
    // =========================================================================

    /// An empty substitution, or one whose root brings a concrete right
    /// sibling, removes/extends the target and is only legal off-root on a
    /// node without a right sibling.
    pub fn can_substitute_node(&self, node_id: i32, subst: &TreeSubstitution) -> bool {
        let node = self.node(node_id);
        if subst.nodes.is_empty() || subst.nodes[0].right_sib >= 0 {
            return node_id != 0 && node.right_sib == NO_TREE_NODE;
        }
        true
    }

    /// Writes a substitution template over `node_id`. The subtree below the
    /// node is removed first; `-2` markers in the template spawn
    /// `UNKNOWN`-labeled eps nodes as write targets for later substitutions.
    pub fn substitute_node(&mut self, node_id: i32, subst: &TreeSubstitution) {
        debug_assert!(self.can_substitute_node(node_id, subst));
        if subst.nodes.is_empty() {
            self.remove_node(node_id);
            return;
        }
        self.remove_node_children(node_id);

        let mut queue = std::collections::VecDeque::new();
        queue.push_back((0usize, node_id));
        while let Some((subst_index, at)) = queue.pop_front() {
            let n = subst.nodes[subst_index];
            assert_ne!(n.ty, EMPTY_NODE_LABEL, "substitution node without a type");
            self.node_mut(at).ty = n.ty;
            self.node_mut(at).val = n.val;

            if n.first_child != -1 {
                let mut writer = EpsWriter::new(self, at);
                let moved = writer.down_first_child();
                debug_assert!(moved);
                writer.set_labels(UNKNOWN_LABEL, UNKNOWN_LABEL);
                writer.write_node();
                let child_pos = writer.position();
                assert!(child_pos != -1);
                if n.first_child >= 0 {
                    queue.push_back((n.first_child as usize, child_pos));
                }
            }
            if n.right_sib != -1 {
                if n.right_sib == -2 && at == 0 {
                    continue;
                }
                let mut writer = EpsWriter::new(self, at);
                let moved = writer.right();
                assert!(moved, "substitution cannot add a right sibling here");
                if writer.node().ty == EMPTY_NODE_LABEL {
                    writer.set_labels(UNKNOWN_LABEL, UNKNOWN_LABEL);
                }
                writer.write_node();
                let sib_pos = writer.position();
                assert!(sib_pos != -1);
                if n.right_sib >= 0 {
                    queue.push_back((n.right_sib as usize, sib_pos));
                }
            }
        }
    }

    pub fn can_substitute_single_node(&self, node_id: i32, subst_node: &SubstitutionNode) -> bool {
        let node = self.node(node_id);
        if subst_node.right_sib >= 0 {
            return node_id != 0 && node.right_sib == NO_TREE_NODE;
        }
        true
    }

    /// Writes one substitution node over `node_id`, spawning unknown eps
    /// neighbors for its `-2` markers.
    pub fn substitute_single_node(&mut self, node_id: i32, subst_node: &SubstitutionNode) {
        self.remove_node_children(node_id);
        self.node_mut(node_id).ty = subst_node.ty;
        self.node_mut(node_id).val = subst_node.val;
        if subst_node.first_child != -1 {
            let mut writer = EpsWriter::new(self, node_id);
            let moved = writer.down_first_child();
            debug_assert!(moved);
            writer.set_labels(UNKNOWN_LABEL, UNKNOWN_LABEL);
            writer.write_node();
        }
        if subst_node.right_sib != -1 && node_id != 0 {
            let mut writer = EpsWriter::new(self, node_id);
            let moved = writer.right();
            debug_assert!(moved);
            writer.set_labels(UNKNOWN_LABEL, UNKNOWN_LABEL);
            writer.write_node();
        }
    }

    /// Removing (`ty == EMPTY_NODE_LABEL`) is only legal for childless
    /// nodes without right siblings, off the root.
    pub fn can_substitute_node_type(&self, node_id: i32, ty: i32) -> bool {
        let node = self.node(node_id);
        if ty == EMPTY_NODE_LABEL {
            return node_id != 0
                && node.right_sib == NO_TREE_NODE
                && node.first_child == NO_TREE_NODE;
        }
        true
    }

    /// Writes a bare type over `node_id` with unknown value, spawning
    /// unknown first-child and (off root) right-sibling eps nodes;
    /// `EMPTY_NODE_LABEL` removes the node instead.
    pub fn substitute_node_type(&mut self, node_id: i32, ty: i32) {
        if ty == EMPTY_NODE_LABEL {
            self.remove_node(node_id);
            return;
        }
        self.remove_node_children(node_id);
        self.node_mut(node_id).ty = ty;
        self.node_mut(node_id).val = UNKNOWN_LABEL;
        {
            let mut writer = EpsWriter::new(self, node_id);
            let moved = writer.down_first_child();
            debug_assert!(moved);
            writer.set_labels(UNKNOWN_LABEL, UNKNOWN_LABEL);
            writer.write_node();
        }
        if node_id != 0 {
            let mut writer = EpsWriter::new(self, node_id);
            let moved = writer.right();
            debug_assert!(moved);
            writer.set_labels(UNKNOWN_LABEL, UNKNOWN_LABEL);
            writer.write_node();
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Materializes `added` as its parent's new last child and fixes the
    /// sibling/parent links. Returns `-1` for content-free nodes.
    pub(crate) fn add_last_node(&mut self, added: TreeNode) -> i32 {
        if added.ty == EMPTY_NODE_LABEL {
            return -1;
        }
        let node_id = self.allocate_node(added);
        let node = *self.node(node_id);
        if node.left_sib >= 0 {
            self.node_mut(node.left_sib).right_sib = node_id;
        }
        debug_assert!(node.parent >= 0);
        if self.node(node.parent).first_child < 0 {
            self.node_mut(node.parent).first_child = node_id;
        }
        self.node_mut(node.parent).last_child = node_id;
        debug_assert!(node.right_sib < 0);
        node_id
    }

    fn allocate_node(&mut self, data: TreeNode) -> i32 {
        if self.first_free != -1 {
            let result = self.first_free;
            self.first_free = self.nodes[result as usize].ty;
            debug_assert_eq!(self.nodes[result as usize].parent, POINTER_FREED);
            self.nodes[result as usize] = data;
            return result;
        }
        self.nodes.push(data);
        (self.nodes.len() - 1) as i32
    }

    fn deallocate_node(&mut self, node_id: i32) {
        if node_id as usize == self.nodes.len() - 1 {
            self.nodes.pop();
            return;
        }
        self.nodes[node_id as usize].parent = POINTER_FREED;
        self.nodes[node_id as usize].ty = self.first_free;
        self.first_free = node_id;
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Verifies every structural invariant: mutual sibling links, parent
    /// back-pointers, child indices, first/last child agreement, and that
    /// live plus freed slots exactly cover the arena.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        let mut live = 0usize;
        let mut stack = vec![0i32];
        let mut steps = 0usize;
        while let Some(node_id) = stack.pop() {
            steps += 1;
            if steps > self.nodes.len() {
                return Err(ConsistencyError::StructureCycle);
            }
            let node = self.node(node_id);
            if node.parent == POINTER_FREED {
                return Err(ConsistencyError::ReachableFreedSlot { node: node_id });
            }
            if node.parent >= 0 && node.left_sib < 0 && self.node(node.parent).first_child != node_id
            {
                return Err(ConsistencyError::FirstChildLink {
                    parent: node.parent,
                    node: node_id,
                });
            }
            if node.left_sib < 0 {
                let expected = if node_id == 0 {
                    match self.parent {
                        Some(link) => link.storage.node(link.position).child_index,
                        None => 0,
                    }
                } else {
                    0
                };
                if node.child_index != expected {
                    return Err(ConsistencyError::ChildIndex {
                        node: node_id,
                        expected,
                        actual: node.child_index,
                    });
                }
            } else {
                let left = self.node(node.left_sib);
                if left.right_sib != node_id {
                    return Err(ConsistencyError::SiblingLink {
                        node: node_id,
                        sibling: node.left_sib,
                    });
                }
                if left.parent != node.parent {
                    return Err(ConsistencyError::ParentLink {
                        parent: node.parent,
                        child: node.left_sib,
                    });
                }
                if left.child_index + 1 != node.child_index {
                    return Err(ConsistencyError::ChildIndex {
                        node: node_id,
                        expected: left.child_index + 1,
                        actual: node.child_index,
                    });
                }
            }
            if node.right_sib >= 0 && self.node(node.right_sib).left_sib != node_id {
                return Err(ConsistencyError::SiblingLink {
                    node: node_id,
                    sibling: node.right_sib,
                });
            }
            if node.parent >= 0 && node.right_sib < 0 && self.node(node.parent).last_child != node_id
            {
                return Err(ConsistencyError::LastChildLink {
                    parent: node.parent,
                    node: node_id,
                });
            }
            if node.first_child >= 0 && self.node(node.first_child).parent != node_id {
                return Err(ConsistencyError::ParentLink {
                    parent: node_id,
                    child: node.first_child,
                });
            }
            if node.last_child >= 0 && self.node(node.last_child).parent != node_id {
                return Err(ConsistencyError::ParentLink {
                    parent: node_id,
                    child: node.last_child,
                });
            }

            live += 1;
            if node.right_sib >= 0 {
                stack.push(node.right_sib);
            }
            if node.first_child >= 0 {
                stack.push(node.first_child);
            }
        }

        let mut freed = 0usize;
        let mut slot = self.first_free;
        while slot != -1 {
            slot = self.nodes[slot as usize].ty;
            freed += 1;
            if freed > self.nodes.len() {
                return Err(ConsistencyError::FreeListCycle);
            }
        }
        if live + freed != self.nodes.len() {
            return Err(ConsistencyError::SlotCount {
                live,
                freed,
                total: self.nodes.len(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Debug rendering
    // =========================================================================

    /// `[type:value [child] ...]` rendering used by tests and diagnostics.
    pub fn debug_string(&self, interner: Option<&StringInterner>) -> String {
        let mut s = String::new();
        self.debug_traverse(&mut s, 0, interner);
        s
    }

    fn debug_traverse(&self, s: &mut String, mut node_id: i32, interner: Option<&StringInterner>) {
        for i in 0..=self.nodes.len() {
            if i > 0 {
                s.push(' ');
            }
            s.push('[');
            if self.node(node_id).parent == POINTER_FREED {
                s.push_str("ERR ");
            }
            s.push_str(&self.node_to_string(interner, node_id));
            if self.node(node_id).first_child >= 0 {
                s.push(' ');
                self.debug_traverse(s, self.node(node_id).first_child, interner);
            }
            s.push(']');
            node_id = self.node(node_id).right_sib;
            if node_id < 0 {
                break;
            }
        }
    }

    /// `type:value` rendering of one node.
    pub fn node_to_string(&self, interner: Option<&StringInterner>, node_id: i32) -> String {
        let node = self.node(node_id);
        let mut result = String::new();
        match interner {
            Some(ss) if node.ty >= 0 => result.push_str(ss.get(node.ty)),
            _ => result.push_str(&node.ty.to_string()),
        }
        match interner {
            Some(ss) if node.val >= 0 => {
                result.push(':');
                result.push_str(ss.get(node.val));
            }
            _ => {
                if node.val != NO_TREE_NODE {
                    result.push(':');
                    result.push_str(&node.val.to_string());
                }
            }
        }
        result
    }
}

fn first_node() -> TreeNode {
    TreeNode {
        ty: UNKNOWN_LABEL,
        val: NO_TREE_NODE,
        parent: NO_TREE_NODE,
        left_sib: NO_TREE_NODE,
        right_sib: NO_TREE_NODE,
        first_child: NO_TREE_NODE,
        last_child: NO_TREE_NODE,
        child_index: 0,
    }
}

fn parsed_node() -> TreeNode {
    TreeNode {
        ty: UNKNOWN_LABEL,
        val: NO_TREE_NODE,
        parent: NO_TREE_NODE,
        left_sib: NO_TREE_NODE,
        right_sib: NO_TREE_NODE,
        first_child: NO_TREE_NODE,
        last_child: NO_TREE_NODE,
        child_index: -1,
    }
}

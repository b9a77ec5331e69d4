//! Tree node record, label sentinels and the packed type-label encoding.

/// Label of a node position that exists structurally but carries no content
/// yet (an "eps" node), and the observed label of sliced or unknown nodes.
pub const EMPTY_NODE_LABEL: i32 = -1;

/// Label of a node whose type or value is still to be predicted.
pub const UNKNOWN_LABEL: i32 = -2;

/// Structural pointer: no such neighbor.
pub const NO_TREE_NODE: i32 = -1;
/// Structural pointer: the real value lives in the parent store at the
/// overlay attachment position.
pub const POINTER_IN_PARENT: i32 = -2;
/// Structural pointer: the arena slot is on the free list.
pub const POINTER_FREED: i32 = -3;

/// One node of a [`TreeStorage`](super::TreeStorage) arena.
///
/// Exactly 32 bytes; adding fields would hurt the hot traversal loops.
/// Structural pointers are indices into the owning arena, `NO_TREE_NODE`,
/// or `POINTER_IN_PARENT` (only on overlay roots).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeNode {
    pub(crate) ty: i32,
    pub(crate) val: i32,
    pub parent: i32,
    pub left_sib: i32,
    pub right_sib: i32,
    pub first_child: i32,
    pub last_child: i32,
    pub child_index: i32,
}

const _: () = assert!(std::mem::size_of::<TreeNode>() == 32);

impl TreeNode {
    /// A detached, content-free node.
    pub const EMPTY: TreeNode = TreeNode {
        ty: EMPTY_NODE_LABEL,
        val: EMPTY_NODE_LABEL,
        parent: NO_TREE_NODE,
        left_sib: NO_TREE_NODE,
        right_sib: NO_TREE_NODE,
        first_child: NO_TREE_NODE,
        last_child: NO_TREE_NODE,
        child_index: -1,
    };

    /// The observable type: an unknown type reads as [`EMPTY_NODE_LABEL`].
    #[inline]
    pub fn type_id(&self) -> i32 {
        if self.ty != UNKNOWN_LABEL {
            self.ty
        } else {
            EMPTY_NODE_LABEL
        }
    }

    /// The observable value: an unknown value reads as [`EMPTY_NODE_LABEL`].
    #[inline]
    pub fn value_id(&self) -> i32 {
        if self.val != UNKNOWN_LABEL {
            self.val
        } else {
            EMPTY_NODE_LABEL
        }
    }

    #[inline]
    pub fn set_type(&mut self, ty: i32) {
        self.ty = ty;
    }

    #[inline]
    pub fn set_value(&mut self, val: i32) {
        self.val = val;
    }

    #[inline]
    pub fn is_unknown_type(&self) -> bool {
        self.ty == UNKNOWN_LABEL
    }

    #[inline]
    pub fn is_unknown_value(&self) -> bool {
        self.val == UNKNOWN_LABEL
    }

    /// True if the type or the value still needs to be predicted.
    #[inline]
    pub fn has_non_terminal(&self) -> bool {
        self.is_unknown_type() || self.is_unknown_value()
    }
}

// =============================================================================
// Type labels
// =============================================================================

/// A predicted node type together with the structural bits that say whether
/// the node has children and right siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypeLabel {
    pub type_id: i32,
    pub has_first_child: bool,
    pub has_right_sib: bool,
}

impl TypeLabel {
    /// The single-node substitution that writes this label: unknown value,
    /// and unknown child/right-sibling eps markers where the bits are set.
    pub fn to_substitution_node(self) -> SubstitutionNode {
        SubstitutionNode {
            ty: self.type_id,
            val: UNKNOWN_LABEL,
            first_child: if self.has_first_child { -2 } else { -1 },
            right_sib: if self.has_right_sib { -2 } else { -1 },
        }
    }
}

/// Packs a [`TypeLabel`] into 32 bits: low 30 bits carry the type id, bit 30
/// `has_first_child`, bit 31 `has_right_sib`.
///
/// Inverse of [`decode_type_label`] whenever `|type_id| < 2^29`.
pub fn encode_type_label(label: TypeLabel) -> i32 {
    debug_assert!(label.type_id <= 0x1fff_ffff, "type id too large to encode");
    let mut x = (label.type_id as u32) & 0x3fff_ffff;
    if label.has_first_child {
        x |= 0x4000_0000;
    }
    if label.has_right_sib {
        x |= 0x8000_0000;
    }
    x as i32
}

/// Unpacks a label produced by [`encode_type_label`], sign-extending the
/// type id from 30 bits.
pub fn decode_type_label(encoded: i32) -> TypeLabel {
    let x = encoded as u32;
    let has_first_child = (x & 0x4000_0000) != 0;
    let has_right_sib = (x & 0x8000_0000) != 0;
    let mut ty = x & 0x3fff_ffff;
    if ty & 0x2000_0000 != 0 {
        ty |= 0xe000_0000;
    }
    TypeLabel {
        type_id: ty as i32,
        has_first_child,
        has_right_sib,
    }
}

// =============================================================================
// Substitutions
// =============================================================================

/// One node of a substitution template.
///
/// `first_child` and `right_sib` are `-1` when absent, `-2` when present but
/// not part of the template (an unknown eps node is spawned as a future
/// write target), or the index of the template node describing them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubstitutionNode {
    pub ty: i32,
    pub val: i32,
    pub first_child: i32,
    pub right_sib: i32,
}

/// A tree-shaped template written over a node by
/// [`TreeStorage::substitute_node`](super::TreeStorage::substitute_node).
/// Entry 0 replaces the target node itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeSubstitution {
    pub nodes: Vec<SubstitutionNode>,
}

impl TreeSubstitution {
    pub fn new(nodes: Vec<SubstitutionNode>) -> Self {
        Self { nodes }
    }
}

impl From<Vec<[i32; 4]>> for TreeSubstitution {
    fn from(rows: Vec<[i32; 4]>) -> Self {
        Self {
            nodes: rows
                .into_iter()
                .map(|[ty, val, first_child, right_sib]| SubstitutionNode {
                    ty,
                    val,
                    first_child,
                    right_sib,
                })
                .collect(),
        }
    }
}

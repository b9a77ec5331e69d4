//! Tree storage, traversal, slicing, comparison and actor indexing.

pub mod compare;
pub mod index;
pub mod node;
pub mod slice;
pub mod storage;
pub mod traversal;

pub use compare::{compare_trees, compare_trees_eq_diff, TreeCompareInfo};
pub use index::{ActorIndex, ActorSymbol, ActorSymbolIter};
pub use node::{
    decode_type_label, encode_type_label, SubstitutionNode, TreeNode, TreeSubstitution, TypeLabel,
    EMPTY_NODE_LABEL, NO_TREE_NODE, POINTER_FREED, POINTER_IN_PARENT, UNKNOWN_LABEL,
};
pub use slice::{SlicedCursor, TreeSlice};
pub use storage::{AstJsonError, ConsistencyError, InlinePatch, ParentLink, TreeStorage};
pub use traversal::{
    advance_post_order, advance_pre_order, descend_to_post_order_start, tree_size, EpsWriter,
    FullCursor, LocalCursor, TreeCursor,
};

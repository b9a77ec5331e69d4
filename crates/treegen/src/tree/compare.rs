//! Lockstep comparison of two trees.

use super::traversal::{tree_size, LocalCursor, TreeCursor};

/// Counts of label agreements and structural differences between two trees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeCompareInfo {
    pub type_eq: i32,
    pub type_diff: i32,
    pub value_eq: i32,
    pub value_diff: i32,
    pub size_greater_diffs: i32,
    pub size_smaller_diffs: i32,
    pub aggregated_trees: i32,
}

impl Default for TreeCompareInfo {
    fn default() -> Self {
        Self {
            type_eq: 0,
            type_diff: 0,
            value_eq: 0,
            value_diff: 0,
            size_greater_diffs: 0,
            size_smaller_diffs: 0,
            aggregated_trees: 1,
        }
    }
}

impl TreeCompareInfo {
    pub fn differences(&self) -> i32 {
        self.type_diff + self.value_diff + self.size_greater_diffs + self.size_smaller_diffs
    }

    pub fn equalities(&self) -> i32 {
        self.type_eq + self.value_eq
    }

    /// Average node-count difference across the aggregated comparisons.
    /// Divides by 2 because size diffs are counted once for types and once
    /// for values.
    pub fn avg_node_difference(&self) -> f64 {
        (((self.size_greater_diffs - self.size_smaller_diffs) / 2) as f64)
            / self.aggregated_trees as f64
    }

    pub fn add(&mut self, other: &TreeCompareInfo) {
        self.type_eq += other.type_eq;
        self.type_diff += other.type_diff;
        self.value_eq += other.value_eq;
        self.value_diff += other.value_diff;
        self.size_greater_diffs += other.size_greater_diffs;
        self.size_smaller_diffs += other.size_smaller_diffs;
        self.aggregated_trees += 1;
    }
}

/// Compares the subtrees under `t1` and `t2` node by node.
///
/// Where one side has children or right siblings the other lacks, the excess
/// side contributes twice its subtree size to the matching size counter
/// (doubled because both the type and the value of every excess node
/// differ).
pub fn compare_trees(
    mut t1: LocalCursor<'_>,
    mut t2: LocalCursor<'_>,
    only_types: bool,
    max_depth: i32,
) -> TreeCompareInfo {
    let mut info = TreeCompareInfo::default();
    let mut depth = 0;
    let start1 = t1.position();
    let start2 = t2.position();
    loop {
        if t1.node().ty == t2.node().ty {
            info.type_eq += 1;
        } else {
            info.type_diff += 1;
        }
        if !only_types {
            if t1.node().val == t2.node().val {
                info.value_eq += 1;
            } else {
                info.value_diff += 1;
            }
        }

        if depth < max_depth {
            let t1_down = t1.down_first_child();
            let t2_down = t2.down_first_child();
            depth += 1;
            if t1_down && t2_down {
                continue;
            }
            if t1_down && !t2_down {
                loop {
                    info.size_greater_diffs += 2 * tree_size(t1);
                    if !t1.right() {
                        break;
                    }
                }
                t1.up();
                depth -= 1;
            }
            if !t1_down && t2_down {
                loop {
                    info.size_smaller_diffs += 2 * tree_size(t2);
                    if !t2.right() {
                        break;
                    }
                }
                t2.up();
                depth -= 1;
            }
        }

        loop {
            if t1.position() == start1 {
                debug_assert_eq!(t2.position(), start2);
                return info;
            }

            let t1_right = t1.right();
            let t2_right = t2.right();
            if t1_right && t2_right {
                break;
            }
            if t1_right && !t2_right {
                info.size_greater_diffs += 2 * tree_size(t1);
                continue;
            }
            if t2_right && !t1_right {
                info.size_smaller_diffs += 2 * tree_size(t2);
                continue;
            }

            let u1 = t1.up();
            let u2 = t2.up();
            debug_assert!(u1 && u2);
            depth -= 1;
        }
    }
}

/// Total label equalities and differences between two trees.
pub fn compare_trees_eq_diff(t1: LocalCursor<'_>, t2: LocalCursor<'_>) -> (i32, i32) {
    let info = compare_trees(t1, t2, false, i32::MAX);
    (info.equalities(), info.differences())
}

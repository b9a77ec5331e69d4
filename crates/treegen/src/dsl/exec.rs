//! Execution of TCond programs against a tree.
//!
//! An [`ExecutionContext`] is built once per (read-only, canonically
//! ordered) tree: it owns the three actor indexes that make the
//! `PREV_NODE_*` ops O(1) amortized. Feature emissions flow into a caller
//! callback, which the compiler monomorphizes into the interpreter loop.

use crate::tree::{
    ActorIndex, ActorSymbol, ActorSymbolIter, SlicedCursor, TreeCursor, TreeStorage,
};

use super::tcond::{OpCode, TCondProgram};

/// Per-tree execution state for the TCond interpreter.
pub struct ExecutionContext<'a> {
    tree: &'a TreeStorage<'a>,
    by_type: ActorIndex<'a>,
    by_value: ActorIndex<'a>,
    by_context: ActorIndex<'a>,
}

impl<'a> ExecutionContext<'a> {
    /// Indexes `tree` for all three actor-symbol strategies.
    pub fn new(tree: &'a TreeStorage<'a>) -> Self {
        Self {
            tree,
            by_type: ActorIndex::build(ActorSymbol::ByType, tree),
            by_value: ActorIndex::build(ActorSymbol::ByValue, tree),
            by_context: ActorIndex::build(ActorSymbol::ByContext, tree),
        }
    }

    pub fn tree(&self) -> &'a TreeStorage<'a> {
        self.tree
    }

    /// Runs `program` from the cursor's position, emitting features in
    /// order. Impossible moves are silent no-ops; programs always terminate.
    pub fn execute<F: FnMut(i32)>(
        &self,
        program: &TCondProgram,
        cursor: &mut SlicedCursor<'a>,
        emit: &mut F,
    ) {
        for op in program.ops() {
            match op.code {
                OpCode::WriteType => emit(cursor.node().type_id()),
                OpCode::WriteValue => emit(cursor.node().value_id()),
                // Negative so position features stay disjoint from interned
                // ids in branch-case keys.
                OpCode::WritePos => emit(-1000 - cursor.node().child_index),
                OpCode::Up => {
                    cursor.up();
                }
                OpCode::Left => {
                    cursor.left();
                }
                OpCode::Right => {
                    cursor.right();
                }
                OpCode::DownFirst => {
                    cursor.down_first_child();
                }
                OpCode::DownLast => {
                    cursor.down_last_child();
                }
                OpCode::PrevLeaf => loop {
                    if cursor.left() {
                        while cursor.down_last_child() {}
                        break;
                    }
                    if !cursor.up() {
                        break;
                    }
                },
                OpCode::NextLeaf => loop {
                    if cursor.right() {
                        while cursor.down_first_child() {}
                        break;
                    }
                    if !cursor.up() {
                        break;
                    }
                },
                OpCode::PrevDfs => {
                    if cursor.left() {
                        while cursor.down_last_child() {}
                    } else {
                        cursor.up();
                    }
                }
                OpCode::PrevNodeValue => {
                    let symbol = ActorSymbol::ByValue.symbol_at(cursor);
                    if symbol != -1 {
                        self.move_to_previous(symbol, &self.by_value, cursor);
                    }
                }
                OpCode::PrevNodeType => {
                    let symbol = ActorSymbol::ByType.symbol_at(cursor);
                    self.move_to_previous(symbol, &self.by_type, cursor);
                }
                OpCode::PrevNodeContext => {
                    let symbol = ActorSymbol::ByContext.symbol_at(cursor);
                    self.move_to_previous(symbol, &self.by_context, cursor);
                }
            }
        }
    }

    fn move_to_previous(
        &self,
        symbol: i32,
        index: &ActorIndex<'a>,
        cursor: &mut SlicedCursor<'a>,
    ) {
        let mut iter = ActorSymbolIter::new(symbol, *cursor, index);
        if iter.move_left() {
            *cursor = iter.item();
        }
    }
}

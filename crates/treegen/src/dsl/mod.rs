//! The TCond conditioning language and TGen program tables.
//!
//! - [`tcond`]: straight-line tree-walking programs and their text form.
//! - [`exec`]: the interpreter, with per-tree actor indexes.
//! - [`simple`] / [`branched`]: the two kinds of table entries.
//! - [`program`]: the indexed [`TGenProgram`] table with load/save.

pub mod branched;
pub mod exec;
pub mod program;
pub mod simple;
pub mod tcond;

pub use branched::{BranchCond, BranchCondProgram};
pub use exec::ExecutionContext;
pub use program::{ProgramEntry, TGenLoadError, TGenProgram};
pub use simple::SimpleCondProgram;
pub use tcond::{Op, OpCode, ProgramParseError, TCondProgram};

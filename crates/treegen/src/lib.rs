//! treegen: probabilistic models of program syntax trees.
//!
//! Given a corpus of ASTs, treegen learns a generative distribution over
//! node types or node values, conditioned on context features extracted by
//! small tree-walking programs (the TCond language). At inference it scores
//! a node's observed label, predicts the best label, and reports entropy,
//! error-rate and confidence metrics.
//!
//! # Key Types
//!
//! - [`TGenModel`] / [`ModelConfig`] - the model with train/score/predict
//! - [`TGenProgram`] - an indexed table of conditioning programs
//! - [`TreeStorage`] - arena AST storage with overlay subtrees
//! - [`ExecutionContext`] - per-tree interpreter state with actor indexes
//! - [`MetricComputation`] - evaluation metric accumulation
//!
//! # Training
//!
//! Load a [`TGenProgram`], load corpora via [`data::load_corpus`], then feed
//! every node of every training tree to [`TGenModel::train_sample`] and
//! freeze with [`TGenModel::end_training`]. See the [`model`] module.

pub mod counts;
pub mod data;
pub mod dsl;
pub mod interner;
pub mod model;
pub mod tree;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use interner::StringInterner;

pub use tree::{
    FullCursor, LocalCursor, SlicedCursor, TreeCursor, TreeNode, TreeSlice, TreeStorage,
    TreeSubstitution,
};

pub use dsl::{
    BranchCondProgram, ExecutionContext, ProgramEntry, SimpleCondProgram, TCondProgram,
    TGenProgram,
};

pub use counts::{Feature, FeatureCounter, Smoothing, SmoothingKind};

pub use model::{MetricComputation, MetricKind, ModelConfig, TGenModel};

pub use data::{load_corpus, CorpusOptions};

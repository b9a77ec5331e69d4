//! The generative model over node labels.
//!
//! A [`TGenModel`] ties the pieces together: it resolves a chain of
//! branched programs to a straight-line one, extracts (optionally
//! TEq-remapped) labels, counts `(feature, label)` pairs during training,
//! and scores labels with progressive back-off at inference.

mod config;
mod metrics;

pub use config::ModelConfig;
pub use metrics::{MetricComputation, MetricKind, UnknownMetricError};

use std::cell::RefCell;

use crate::counts::{Feature, FeatureCounter, Smoothing};
use crate::dsl::{BranchCondProgram, ExecutionContext, ProgramEntry, TGenProgram};
use crate::tree::{encode_type_label, FullCursor, SlicedCursor, TreeCursor, TreeSlice, TypeLabel};

/// First pseudo-label assigned by TEq remapping.
const TEQ_LABEL_INDEX_START: i32 = -10;
/// Number of eq-program emissions eligible for TEq remapping.
const TEQ_MAX_LABEL_INDEX: i32 = 10;

thread_local! {
    // Scratch for branch dispatch in the resolver; cleared per evaluation.
    static BRANCH_SCRATCH: RefCell<Vec<i32>> = const { RefCell::new(Vec::new()) };
}

// =============================================================================
// Program execution glue
// =============================================================================

/// Runs the *context* program of entry `id`, following branched entries.
/// Branch conditions run on a copy of the cursor; the called program
/// continues from the original position.
pub fn execute_context_by_id<'a, F: FnMut(i32)>(
    exec: &ExecutionContext<'a>,
    cursor: &mut SlicedCursor<'a>,
    id: usize,
    table: &TGenProgram,
    emit: &mut F,
) {
    match table.entry(id) {
        ProgramEntry::Simple(simple) => exec.execute(&simple.context, cursor, emit),
        ProgramEntry::Branched(branched) => {
            let target = branched.evaluate(exec, cursor);
            execute_context_by_id(exec, cursor, target, table, emit);
        }
    }
}

/// Runs the *equality* program of entry `id`, following branched entries.
/// Unlike the context variant, branch conditions advance the cursor itself.
pub fn execute_eq_by_id<'a, F: FnMut(i32)>(
    exec: &ExecutionContext<'a>,
    cursor: &mut SlicedCursor<'a>,
    id: usize,
    table: &TGenProgram,
    emit: &mut F,
) {
    match table.entry(id) {
        ProgramEntry::Simple(simple) => exec.execute(&simple.eq, cursor, emit),
        ProgramEntry::Branched(branched) => {
            let mut emissions = Vec::new();
            exec.execute(&branched.cond.program, cursor, &mut |v| emissions.push(v));
            let target = branched.target_for(&emissions);
            execute_eq_by_id(exec, cursor, target, table, emit);
        }
    }
}

// =============================================================================
// TGenModel
// =============================================================================

/// A generative model of node types or node values, conditioned by a TGen
/// program.
///
/// The program is an input artifact and stays immutable; the model owns one
/// [`FeatureCounter`] per program entry. Counters are mutated only by
/// [`train_sample`](TGenModel::train_sample) and frozen by
/// [`end_training`](TGenModel::end_training), which is the barrier between
/// the training and evaluation phases.
pub struct TGenModel {
    program: TGenProgram,
    is_for_node_type: bool,
    config: ModelConfig,
    counts: Vec<FeatureCounter>,
}

impl TGenModel {
    pub fn new(program: TGenProgram, is_for_node_type: bool, config: ModelConfig) -> Self {
        let counts = (0..program.len())
            .map(|_| FeatureCounter::new(config.smoothing))
            .collect();
        Self {
            program,
            is_for_node_type,
            config,
            counts,
        }
    }

    #[inline]
    pub fn is_for_node_type(&self) -> bool {
        self.is_for_node_type
    }

    #[inline]
    pub fn program(&self) -> &TGenProgram {
        &self.program
    }

    #[inline]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The id training and evaluation start from: the table's last entry.
    pub fn start_id(&self) -> usize {
        self.program.start_id()
    }

    /// Follows the branched-switch chain from `program_id` down to a
    /// straight-line program.
    ///
    /// # Panics
    ///
    /// Panics when the chain is longer than the program table: a
    /// consistency failure in the program artifact.
    fn resolve_program<'a>(
        &self,
        mut program_id: usize,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
        slice: &'a TreeSlice<'a>,
    ) -> usize {
        let mut call_length = 0;
        while let ProgramEntry::Branched(branched) = self.program.entry(program_id) {
            program_id = self.submodel_branch(branched, exec, sample, slice);
            call_length += 1;
            assert!(
                call_length <= self.program.len(),
                "branched call chain exceeds the program table size"
            );
        }
        program_id
    }

    fn submodel_branch<'a>(
        &self,
        branched: &BranchCondProgram,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
        slice: &'a TreeSlice<'a>,
    ) -> usize {
        BRANCH_SCRATCH.with(|scratch| {
            let mut emissions = scratch.borrow_mut();
            emissions.clear();
            let mut cursor =
                SlicedCursor::new(sample.tree_storage(), sample.position(), Some(slice));
            exec.execute(&branched.cond.program, &mut cursor, &mut |v| {
                emissions.push(v)
            });
            branched.target_for(emissions.as_slice())
        })
    }

    // =========================================================================
    // Training
    // =========================================================================

    /// Adds one training sample: the node at the cursor, with everything at
    /// and after it in DFS order sliced away.
    pub fn train_sample<'a>(
        &mut self,
        program_id: usize,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
    ) {
        let storage = sample.tree_storage();
        let slice = TreeSlice::from_node(storage, sample.position(), !self.is_for_node_type);

        let program_id = self.resolve_program(program_id, exec, sample, &slice);
        let label = self.label_at(program_id, exec, sample, &slice, true);

        let (program, counts) = (&self.program, &mut self.counts);
        let counter = &mut counts[program_id];
        let mut feature = Feature::new();
        counter.add(feature, label, 1);

        let mut cursor = SlicedCursor::new(storage, sample.position(), Some(&slice));
        execute_context_by_id(exec, &mut cursor, program_id, program, &mut |emitted| {
            feature.push(emitted);
            counter.add(feature, label, 1);
        });
    }

    /// Freezes all counters. Must be called after the last
    /// [`train_sample`](TGenModel::train_sample) and before any scoring.
    pub fn end_training(&mut self) {
        for counter in &mut self.counts {
            counter.end_adding();
        }
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// The label the model is asked to predict at the sample position.
    ///
    /// With TEq enabled, the straight-line program's equality program runs
    /// first: a raw label equal to one of its first ten emissions is
    /// remapped to a distinct small negative integer. For node types the
    /// result is then packed with [`encode_type_label`]; a TEq-remapped
    /// type therefore packs a negative pseudo-label, outside the 30-bit
    /// range the encoding documents for plain ids.
    pub fn label_at<'a>(
        &self,
        mut program_id: usize,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
        slice: &'a TreeSlice<'a>,
        use_teq: bool,
    ) -> i32 {
        let use_teq = use_teq && self.config.enable_teq;
        if use_teq {
            program_id = self.resolve_program(program_id, exec, sample, slice);
        }

        let node = sample.node();
        let mut label = if self.is_for_node_type {
            node.type_id()
        } else {
            node.value_id()
        };

        if use_teq {
            let mut op_count = 0;
            let mut cursor =
                SlicedCursor::new(sample.tree_storage(), sample.position(), Some(slice));
            execute_eq_by_id(exec, &mut cursor, program_id, &self.program, &mut |op| {
                if label >= 0 && op == label && op_count < TEQ_MAX_LABEL_INDEX {
                    label = TEQ_LABEL_INDEX_START - op_count;
                }
                op_count += 1;
            });
        }
        if self.is_for_node_type {
            label = encode_type_label(TypeLabel {
                type_id: label,
                has_first_child: node.first_child != -1,
                has_right_sib: node.right_sib != -1,
            });
        }
        label
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Base-2 log-probability of the observed label at the sample position.
    pub fn log_prob<'a>(
        &self,
        program_id: usize,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
        slice: &'a TreeSlice<'a>,
    ) -> f64 {
        let program_id = self.resolve_program(program_id, exec, sample, slice);
        let label = self.label_at(program_id, exec, sample, slice, true);
        self.log_prob_inner(
            program_id,
            exec,
            SlicedCursor::new(sample.tree_storage(), sample.position(), Some(slice)),
            label,
        )
    }

    fn log_prob_inner<'a>(
        &self,
        program_id: usize,
        exec: &ExecutionContext<'a>,
        cursor: SlicedCursor<'a>,
        label: i32,
    ) -> f64 {
        let counter = &self.counts[program_id];
        let mut feature = Feature::new();
        let mut smoothing = Smoothing::new(self.config.smoothing);

        // The unconditioned feature seeds the back-off chain.
        if let Some(stats) = counter.stats(feature) {
            smoothing.set_unconditioned(
                counter.count(feature, label),
                stats.unique_labels(),
                stats.total_count(),
                counter.label_continuations(feature, label),
                counter.total_continuations(feature),
            );
        }

        let mut cursor = cursor;
        execute_context_by_id(exec, &mut cursor, program_id, &self.program, &mut |emitted| {
            feature.push(emitted);
            if let Some(stats) = counter.stats(feature) {
                smoothing.add_forward_backoff(
                    counter.count(feature, label),
                    stats.unique_labels(),
                    stats.total_count(),
                    stats.bucket_counts(),
                    counter.label_continuations(feature, label),
                    counter.total_continuations(feature),
                    counter.kneser_ney_delta(feature),
                );
            }
        });

        smoothing.log_prob()
    }

    /// The label the model is most confident in, with its log-probability.
    ///
    /// Beam search: the top `beam_size` labels of the unconditioned
    /// distribution are scored first, then after every context emission the
    /// top labels of the longer feature are scored as well. Returns
    /// `(0.0, -1)` when the resolved counter is empty.
    pub fn best_label<'a>(
        &self,
        program_id: usize,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
        slice: &'a TreeSlice<'a>,
    ) -> (f64, i32) {
        let program_id = self.resolve_program(program_id, exec, sample, slice);
        let counter = &self.counts[program_id];
        let beam_size = self.config.beam_size;

        let mut feature = Feature::new();
        let unconditioned = counter.labels_by_probability(feature);
        if unconditioned.is_empty() {
            return (0.0, -1);
        }

        let fresh_cursor =
            || SlicedCursor::new(sample.tree_storage(), sample.position(), Some(slice));

        let mut best_label = unconditioned[0].1;
        let mut best_score = self.log_prob_inner(program_id, exec, fresh_cursor(), best_label);
        for &(_, label) in unconditioned.iter().take(beam_size).skip(1) {
            if label != best_label {
                let score = self.log_prob_inner(program_id, exec, fresh_cursor(), label);
                if score > best_score {
                    best_score = score;
                    best_label = label;
                }
            }
        }

        let mut cursor = fresh_cursor();
        execute_context_by_id(exec, &mut cursor, program_id, &self.program, &mut |emitted| {
            feature.push(emitted);
            for &(_, label) in counter.labels_by_probability(feature).iter().take(beam_size) {
                if label != best_label {
                    let score = self.log_prob_inner(program_id, exec, fresh_cursor(), label);
                    if score > best_score {
                        best_score = score;
                        best_label = label;
                    }
                }
            }
        });

        (best_score, best_label)
    }

    /// True when the best predicted label equals the observed one.
    pub fn is_label_best_prediction<'a>(
        &self,
        program_id: usize,
        exec: &ExecutionContext<'a>,
        sample: FullCursor<'a>,
        slice: &'a TreeSlice<'a>,
    ) -> bool {
        let program_id = self.resolve_program(program_id, exec, sample, slice);
        self.best_label(program_id, exec, sample, slice).1
            == self.label_at(program_id, exec, sample, slice, true)
    }
}

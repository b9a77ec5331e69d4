//! Evaluation metrics over trained models.

use std::str::FromStr;

use crate::dsl::ExecutionContext;
use crate::tree::{FullCursor, TreeSlice};

use super::TGenModel;

/// Which quantity an evaluation pass averages over its samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MetricKind {
    /// Mean `-log2 p(label)`.
    #[default]
    Entropy,
    /// Fraction of samples whose best predicted label differs from the
    /// actual one.
    ErrorRate,
    /// Fraction of samples scored with probability at most 50%.
    Confidence50,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown metric `{0}`; expected entropy, errorrate or confidence50")]
pub struct UnknownMetricError(String);

impl FromStr for MetricKind {
    type Err = UnknownMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entropy" => Ok(MetricKind::Entropy),
            "errorrate" => Ok(MetricKind::ErrorRate),
            "confidence50" => Ok(MetricKind::Confidence50),
            other => Err(UnknownMetricError(other.to_owned())),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MetricKind::Entropy => "entropy",
            MetricKind::ErrorRate => "error rate",
            MetricKind::Confidence50 => "confidence >50%",
        })
    }
}

/// Accumulates one metric over evaluation samples.
#[derive(Debug, Clone)]
pub struct MetricComputation {
    kind: MetricKind,
    value: f64,
    num_samples: usize,
}

impl MetricComputation {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            value: 0.0,
            num_samples: 0,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Scores the node at `position` of the execution context's tree. A
    /// fresh slice is built per sample; slices carry no mutable state.
    pub fn add_sample<'a>(
        &mut self,
        model: &TGenModel,
        exec: &ExecutionContext<'a>,
        position: i32,
    ) {
        let sample = FullCursor::new(exec.tree(), position);
        let slice = TreeSlice::from_node(exec.tree(), position, !model.is_for_node_type());

        self.num_samples += 1;
        match self.kind {
            MetricKind::Entropy => {
                self.value -= model.log_prob(model.start_id(), exec, sample, &slice);
            }
            MetricKind::ErrorRate => {
                if !model.is_label_best_prediction(model.start_id(), exec, sample, &slice) {
                    self.value += 1.0;
                }
            }
            MetricKind::Confidence50 => {
                // log2(p) <= -1 means p <= 50%: counted as an error.
                if model.log_prob(model.start_id(), exec, sample, &slice) <= -1.0 {
                    self.value += 1.0;
                }
            }
        }
    }

    /// The averaged metric value.
    pub fn value(&self) -> f64 {
        if self.num_samples == 0 {
            return 0.0;
        }
        self.value / self.num_samples as f64
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }
}

//! Model configuration.

use bon::Builder;

use crate::counts::SmoothingKind;

use super::metrics::MetricKind;

/// Immutable configuration of a [`TGenModel`](super::TGenModel).
///
/// # Example
///
/// ```
/// use treegen::counts::SmoothingKind;
/// use treegen::model::ModelConfig;
///
/// let config = ModelConfig::builder()
///     .smoothing(SmoothingKind::KneserNey { fixed_delta: None })
///     .beam_size(8)
///     .build();
/// assert!(config.enable_teq);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ModelConfig {
    /// Back-off smoothing applied when scoring labels.
    #[builder(default)]
    pub smoothing: SmoothingKind,

    /// Number of candidate labels scored at each back-off order during best
    /// label search.
    #[builder(default = 4)]
    pub beam_size: usize,

    /// Whether equality programs remap labels that repeat earlier emissions
    /// (TEq).
    #[builder(default = true)]
    pub enable_teq: bool,

    /// Metric evaluated when the caller does not name one.
    #[builder(default)]
    pub default_metric: MetricKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

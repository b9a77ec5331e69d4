//! Back-off smoothing: Witten–Bell, Kneser–Ney and Laplace.

use std::str::FromStr;

/// Which smoothing the model applies when backing off across feature
/// lengths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SmoothingKind {
    /// Witten–Bell interpolation (the default).
    WittenBell,
    /// Kneser–Ney with continuation counts. `fixed_delta` pins the discount
    /// to one value; otherwise discounts are estimated per feature length.
    KneserNey { fixed_delta: Option<f64> },
    /// Plain add-one smoothing.
    Laplace,
}

impl Default for SmoothingKind {
    fn default() -> Self {
        SmoothingKind::WittenBell
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown smoothing `{0}`; expected wittenbell, kneserney or laplace")]
pub struct UnknownSmoothingError(String);

impl FromStr for SmoothingKind {
    type Err = UnknownSmoothingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wittenbell" => Ok(SmoothingKind::WittenBell),
            "kneserney" => Ok(SmoothingKind::KneserNey { fixed_delta: None }),
            "laplace" => Ok(SmoothingKind::Laplace),
            other => Err(UnknownSmoothingError(other.to_owned())),
        }
    }
}

// =============================================================================
// Kneser–Ney discounts
// =============================================================================

/// Per-feature-length discount estimates.
///
/// `counts[i]` is the number of labels seen exactly `i` times (saturated at
/// 4). With `Y = n1 / (n1 + 2 n2)`, the discounts are
/// `d1 = 1 − 2Y·n2/n1`, `d2 = 2 − 3Y·n3/n2`, `d3 = 3 − 4Y·n4/n3`, each
/// clamped to `[0, 1]`, and `d0 = 0`.
#[derive(Clone, Debug)]
pub struct KneserNeyDelta {
    counts: [u32; 5],
    deltas: [f64; 4],
    estimated: bool,
}

impl Default for KneserNeyDelta {
    fn default() -> Self {
        Self {
            counts: [0; 5],
            deltas: [0.0; 4],
            estimated: false,
        }
    }
}

impl KneserNeyDelta {
    pub fn clear(&mut self) {
        self.counts = [0; 5];
        self.deltas = [0.0; 4];
        self.estimated = false;
    }

    pub fn add_count(&mut self, count: u32) {
        debug_assert!(count > 0);
        self.counts[count.min(4) as usize] += 1;
    }

    /// The discount for a raw count (saturated at 3).
    pub fn delta(&self, count: u32) -> f64 {
        debug_assert!(self.estimated, "delta read before end_adding");
        self.deltas[count.min(3) as usize]
    }

    pub fn end_adding(&mut self) {
        self.estimated = true;
        let [_, n1, n2, n3, n4] = self.counts.map(f64::from);
        tracing::debug!(n1, n2, n3, n4, "estimating discounts");
        if self.counts[1] != 0 || self.counts[2] != 0 {
            let y = n1 / (n1 + 2.0 * n2);
            if self.counts[1] != 0 {
                self.deltas[1] = 1.0 - 2.0 * y * (n2 / n1);
            }
            if self.counts[2] != 0 {
                self.deltas[2] = 2.0 - 3.0 * y * (n3 / n2);
            }
            if self.counts[3] != 0 {
                self.deltas[3] = 3.0 - 4.0 * y * (n4 / n3);
            }
        }
        for delta in &mut self.deltas {
            *delta = delta.clamp(0.0, 1.0);
        }
        tracing::debug!(
            d1 = self.deltas[1],
            d2 = self.deltas[2],
            d3 = self.deltas[3],
            "discounts estimated"
        );
    }
}

// =============================================================================
// Smoothing state machine
// =============================================================================

/// Probability accumulator driven from the shortest feature to the longest.
///
/// Starts in the "no feature" state; [`set_unconditioned`]
/// (`Smoothing::set_unconditioned`) installs the empty-feature probability,
/// then every longer feature folds in via
/// [`add_forward_backoff`](Smoothing::add_forward_backoff).
#[derive(Clone, Debug)]
pub struct Smoothing {
    kind: SmoothingKind,
    prob: f64,
    // Lower-order continuation probability for Kneser–Ney.
    prob_tmp: f64,
}

impl Smoothing {
    pub fn new(kind: SmoothingKind) -> Self {
        Self {
            kind,
            prob: 0.0,
            prob_tmp: 0.0,
        }
    }

    /// Installs the empty-feature probability
    /// `(count + 1) / (total + unique + 1)` and, for Kneser–Ney, the
    /// auxiliary continuation probability.
    pub fn set_unconditioned(
        &mut self,
        count: u32,
        unique_count: u32,
        total_count: u32,
        continuation_count: u32,
        total_continuations: u32,
    ) {
        self.prob = (count as f64 + 1.0) / (total_count as f64 + unique_count as f64 + 1.0);
        if matches!(self.kind, SmoothingKind::KneserNey { .. }) {
            debug_assert!(continuation_count <= 1);
            self.prob_tmp = (continuation_count as f64 + 1.0)
                / (continuation_count as f64 + total_continuations as f64 + 1.0);
        }
    }

    /// Folds in the statistics of the next-longer feature.
    #[allow(clippy::too_many_arguments)]
    pub fn add_forward_backoff(
        &mut self,
        count: u32,
        unique_count: u32,
        total_count: u32,
        bucket_counts: &[u32; 4],
        continuation_count: u32,
        total_continuations: u32,
        delta: Option<&KneserNeyDelta>,
    ) {
        let count_f = count as f64;
        let unique_f = unique_count as f64;
        let total_f = total_count as f64;
        match self.kind {
            SmoothingKind::WittenBell => {
                let p_ml = count_f / total_f;
                let lambda = 1.0 - unique_f / (unique_f + total_f);
                debug_assert!((0.0..=1.0).contains(&p_ml));
                self.prob = lambda * p_ml + (1.0 - lambda) * self.prob;
            }
            SmoothingKind::KneserNey {
                fixed_delta: Some(d),
            } => {
                let continuation_f = continuation_count as f64;
                let total_cont_f = total_continuations as f64;
                // Higher order uses raw counts.
                let lambda = unique_f * d / total_f;
                let p_ml = (count_f - d).max(0.0) / total_f;
                debug_assert!((0.0..=1.0).contains(&p_ml));
                self.prob = p_ml + lambda * self.prob_tmp;
                // Lower order uses continuation counts.
                let lambda = continuation_f * d / total_cont_f;
                self.prob_tmp =
                    (continuation_f - d).max(0.0) / total_cont_f + lambda * self.prob_tmp;
            }
            SmoothingKind::KneserNey { fixed_delta: None } => {
                let delta = delta.expect("estimated discounts required");
                let continuation_f = continuation_count as f64;
                let total_cont_f = total_continuations as f64;
                let discount_mass = delta.delta(1) * bucket_counts[1] as f64
                    + delta.delta(2) * bucket_counts[2] as f64
                    + delta.delta(3) * bucket_counts[3] as f64;
                // Higher order uses raw counts.
                let p_ml = (count_f - delta.delta(count)).max(0.0) / total_f;
                debug_assert!((0.0..=1.0).contains(&p_ml));
                self.prob = p_ml + (discount_mass / total_f) * self.prob_tmp;
                // A zero probability would make the log-prob unbounded; fall
                // back to add-one, which is not part of Kneser–Ney proper.
                if self.prob == 0.0 {
                    self.prob = (1.0 + count_f) / (1.0 + unique_f + total_f);
                }
                // Lower order uses continuation counts.
                self.prob_tmp = (continuation_f - delta.delta(continuation_count)).max(0.0)
                    / total_cont_f
                    + (discount_mass / total_cont_f) * self.prob_tmp;
            }
            SmoothingKind::Laplace => {
                self.prob = (count_f + 1.0) / (total_f + unique_f + 1.0);
            }
        }
    }

    /// Base-2 log of the accumulated probability.
    #[inline]
    pub fn log_prob(&self) -> f64 {
        self.prob.log2()
    }

    #[inline]
    pub fn prob(&self) -> f64 {
        self.prob
    }
}

//! Feature hashing and per-feature label counters.
//!
//! A [`Feature`] is the order-preserving rolling hash of an emitted integer
//! sequence; a [`FeatureCounter`] maps `(feature, label)` pairs to counts
//! and, once frozen, serves the aggregate statistics that the smoothing
//! state machine consumes.

mod smoothing;

pub use smoothing::{KneserNeyDelta, Smoothing, SmoothingKind, UnknownSmoothingError};

use rustc_hash::FxHashMap;

// =============================================================================
// Feature
// =============================================================================

/// Combines a rolling hash with one more value; order-sensitive, result
/// always non-negative.
#[inline]
pub(crate) fn fingerprint_cat(seed: i32, value: i32) -> i32 {
    let mut h = ((seed as u32 as u64) << 32) | (value as u32 as u64);
    h = h.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^= h >> 29;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 32;
    (h as u32 & 0x7fff_ffff) as i32
}

/// A back-off feature: the 32-bit rolling hash of an emission sequence plus
/// its length. Equality and hashing are by hash alone, which makes it a
/// cheap hash-map key; the length selects the continuation statistics tier.
#[derive(Clone, Copy, Debug, Default)]
pub struct Feature {
    hash: i32,
    len: u32,
}

impl Feature {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, value: i32) {
        self.hash = fingerprint_cat(self.hash, value);
        self.len += 1;
    }

    #[inline]
    pub fn hash(&self) -> i32 {
        self.hash
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for Feature {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Feature {}

impl std::hash::Hash for Feature {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash);
    }
}

// =============================================================================
// Per-feature statistics
// =============================================================================

/// Aggregate statistics of one feature, available after
/// [`FeatureCounter::end_adding`].
#[derive(Clone, Debug, Default)]
pub struct FeatureStats {
    total_count: u32,
    unique_labels: u32,
    bucket_counts: [u32; 4],
    sorted_by_prob: Vec<(f64, i32)>,
}

impl FeatureStats {
    #[inline]
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    #[inline]
    pub fn unique_labels(&self) -> u32 {
        self.unique_labels
    }

    /// `bucket_counts[min(c, 3)]` counts the labels with raw count `c`;
    /// buckets 1..=3 drive the Kneser–Ney discount mass.
    #[inline]
    pub fn bucket_counts(&self) -> &[u32; 4] {
        &self.bucket_counts
    }

    /// `(probability, label)` pairs sorted by descending maximum-likelihood
    /// probability.
    #[inline]
    pub fn labels_by_probability(&self) -> &[(f64, i32)] {
        &self.sorted_by_prob
    }
}

/// Kneser–Ney continuation statistics for one feature length.
#[derive(Clone, Debug, Default)]
struct ContinuationStats {
    per_label: FxHashMap<i32, u32>,
    total: u32,
}

// =============================================================================
// FeatureCounter
// =============================================================================

/// Counts `(feature, label)` occurrences for one program entry.
///
/// Mutable only until [`end_adding`](FeatureCounter::end_adding); afterwards
/// the per-feature stats, the per-length continuation counts and the
/// Kneser–Ney discounts are frozen and reads are lock-free.
#[derive(Debug)]
pub struct FeatureCounter {
    smoothing: SmoothingKind,
    counts: FxHashMap<(Feature, i32), u32>,
    stats: FxHashMap<Feature, FeatureStats>,
    continuations: FxHashMap<u32, ContinuationStats>,
    deltas: FxHashMap<u32, KneserNeyDelta>,
    finalized: bool,
}

impl FeatureCounter {
    pub fn new(smoothing: SmoothingKind) -> Self {
        Self {
            smoothing,
            counts: FxHashMap::default(),
            stats: FxHashMap::default(),
            continuations: FxHashMap::default(),
            deltas: FxHashMap::default(),
            finalized: false,
        }
    }

    /// Adds `count` occurrences of `label` under `feature`.
    pub fn add(&mut self, feature: Feature, label: i32, count: u32) {
        debug_assert!(!self.finalized, "add after end_adding");
        *self.counts.entry((feature, label)).or_insert(0) += count;
    }

    /// Freezes the counter and computes all derived statistics. Must be
    /// called exactly once, after the last [`add`](FeatureCounter::add).
    pub fn end_adding(&mut self) {
        assert!(!self.finalized, "end_adding called twice");
        self.finalized = true;

        let is_kneser_ney = matches!(self.smoothing, SmoothingKind::KneserNey { .. });
        let mut max_feature_len = 0u32;
        for (&(feature, label), &count) in &self.counts {
            let stats = self.stats.entry(feature).or_default();
            stats.total_count += count;
            stats.unique_labels += 1;
            stats.bucket_counts[count.min(3) as usize] += 1;
            stats.sorted_by_prob.push((count as f64, label));
            max_feature_len = max_feature_len.max(feature.len());

            if is_kneser_ney {
                let continuation = self.continuations.entry(feature.len()).or_default();
                *continuation.per_label.entry(label).or_insert(0) += 1;
                continuation.total += 1;
                self.deltas.entry(feature.len()).or_default().add_count(count);
            }
        }

        if is_kneser_ney {
            // The highest order keeps discounts estimated from raw counts;
            // lower orders re-estimate from continuation counts.
            for (&len, continuation) in &self.continuations {
                let delta = self.deltas.get_mut(&len).expect("delta for counted length");
                if len != max_feature_len {
                    delta.clear();
                    for &count in continuation.per_label.values() {
                        delta.add_count(count);
                    }
                }
                delta.end_adding();
            }
        }

        for stats in self.stats.values_mut() {
            let total = stats.total_count as f64;
            for entry in &mut stats.sorted_by_prob {
                entry.0 /= total;
            }
            stats
                .sorted_by_prob
                .sort_by(|a, b| b.partial_cmp(a).expect("finite probabilities"));
        }
    }

    /// Raw count of `(feature, label)`, zero if unseen.
    #[inline]
    pub fn count(&self, feature: Feature, label: i32) -> u32 {
        self.counts.get(&(feature, label)).copied().unwrap_or(0)
    }

    /// Aggregate stats of `feature`, if it was ever counted.
    #[inline]
    pub fn stats(&self, feature: Feature) -> Option<&FeatureStats> {
        self.stats.get(&feature)
    }

    /// Labels of `feature` sorted by descending probability; empty when the
    /// feature is unknown.
    pub fn labels_by_probability(&self, feature: Feature) -> &[(f64, i32)] {
        self.stats
            .get(&feature)
            .map(|s| s.sorted_by_prob.as_slice())
            .unwrap_or(&[])
    }

    /// Number of distinct features of `feature`'s length that carried
    /// `label` (Kneser–Ney continuation count); zero for other smoothings.
    pub fn label_continuations(&self, feature: Feature, label: i32) -> u32 {
        if !matches!(self.smoothing, SmoothingKind::KneserNey { .. }) {
            return 0;
        }
        self.continuations
            .get(&feature.len())
            .and_then(|c| c.per_label.get(&label).copied())
            .unwrap_or(0)
    }

    /// Total continuation count of `feature`'s length; zero for other
    /// smoothings.
    pub fn total_continuations(&self, feature: Feature) -> u32 {
        if !matches!(self.smoothing, SmoothingKind::KneserNey { .. }) {
            return 0;
        }
        self.continuations
            .get(&feature.len())
            .map(|c| c.total)
            .unwrap_or(0)
    }

    /// The estimated discounts for `feature`'s length.
    ///
    /// # Panics
    ///
    /// Panics under Kneser–Ney smoothing when the length was never counted;
    /// callers look up [`stats`](FeatureCounter::stats) first.
    pub fn kneser_ney_delta(&self, feature: Feature) -> Option<&KneserNeyDelta> {
        if !matches!(self.smoothing, SmoothingKind::KneserNey { .. }) {
            return None;
        }
        Some(
            self.deltas
                .get(&feature.len())
                .expect("discounts for counted feature length"),
        )
    }

    #[inline]
    pub fn smoothing(&self) -> SmoothingKind {
        self.smoothing
    }
}

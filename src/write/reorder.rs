use std::cmp::Ordering;

use crate::coding::score_unchecked;

use super::block::StagingRow;

/// Largest window (in samples) whose weighted reference count fits the accumulator
pub const MAX_WINDOW_SAMPLES: usize = 46_360;

/// Permutes block rows to cluster similar genotype distributions
///
/// Every row's samples are split into equal windows. The feature of a window is the
/// reference-allele count of each sample weighted by its distance to the window end,
/// so rows with similar genotypes at similar samples receive similar features.
///
/// Biallelic rows always precede multiallelic rows. Biallelic rows are sorted by
/// descending feature vector and multiallelic rows by ascending feature vector; equal
/// rows keep their insertion order. When disabled, rows are only grouped.
#[derive(Clone, Copy, Debug)]
pub struct Reorderer {
    enabled: bool,
    windows: usize,
    window_len: usize,
}
impl Reorderer {
    #[must_use]
    pub fn new(enabled: bool, window_count: usize, num_samples: usize) -> Self {
        let windows = window_count
            .max(num_samples.div_ceil(MAX_WINDOW_SAMPLES) + 1)
            .max(1);
        let window_len = num_samples.div_ceil(windows).max(1);
        Self {
            enabled,
            windows,
            window_len,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of windows per feature vector
    #[must_use]
    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Computes the feature vector of a row of validated genotype codes
    pub fn fill_features(&self, genotypes: &[u8], features: &mut Vec<u64>) {
        features.clear();
        if !self.enabled {
            return;
        }
        features.resize(self.windows, 0);
        for (window, chunk) in genotypes.chunks(self.window_len).enumerate() {
            let end = chunk.len() as u64;
            features[window] = chunk
                .iter()
                .enumerate()
                .map(|(s, code)| u64::from(score_unchecked(*code)) * (end - s as u64))
                .sum();
        }
    }

    /// Fills `order` with the storage order of `rows`
    pub fn sort(&self, rows: &[StagingRow], order: &mut Vec<usize>) {
        order.clear();
        order.extend(0..rows.len());
        if self.enabled {
            order.sort_by(|a, b| Self::compare(&rows[*a], &rows[*b]));
        } else {
            order.sort_by_key(|idx| !rows[*idx].biallelic);
        }
    }

    fn compare(a: &StagingRow, b: &StagingRow) -> Ordering {
        match (a.biallelic, b.biallelic) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => b.features.cmp(&a.features),
            (false, false) => a.features.cmp(&b.features),
        }
    }
}

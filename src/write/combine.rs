use crate::coding::GroupCoder;

use super::block::StagingRow;

/// Serializes the genotype codes of a row into the genotype stream
///
/// Biallelic rows are packed into combined bytes, one per group of samples.
/// Multiallelic rows are stored as one raw code per sample.
#[derive(Clone, Copy, Debug)]
pub struct Combiner {
    group: GroupCoder,
}
impl Combiner {
    #[must_use]
    pub fn new(phased: bool) -> Self {
        Self {
            group: GroupCoder::new(phased),
        }
    }

    /// Number of bytes a row occupies in the genotype stream
    #[must_use]
    pub fn row_len(&self, biallelic: bool, num_samples: usize) -> usize {
        if biallelic {
            self.group.encoded_len(num_samples)
        } else {
            num_samples
        }
    }

    /// Appends the encoded row to `out`
    pub fn combine(&self, row: &StagingRow, out: &mut Vec<u8>) {
        if row.biallelic {
            self.group.pack_row(&row.genotypes, out);
        } else {
            out.extend_from_slice(&row.genotypes);
        }
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_combine_biallelic() {
        let combiner = Combiner::new(false);
        let row = StagingRow {
            genotypes: vec![0, 1, 2, 3, 3],
            biallelic: true,
            ..StagingRow::default()
        };
        let mut out = Vec::new();
        combiner.combine(&row, &mut out);
        assert_eq!(out.len(), combiner.row_len(true, 5));
        // 0*64 + 1*16 + 2*4 + 3 and a padded group of 3s
        assert_eq!(out, vec![27, 255]);
    }

    #[test]
    fn test_combine_multiallelic() {
        let combiner = Combiner::new(true);
        let row = StagingRow {
            genotypes: vec![0, 9, 225, 1],
            biallelic: false,
            ..StagingRow::default()
        };
        let mut out = vec![7];
        combiner.combine(&row, &mut out);
        assert_eq!(out, vec![7, 0, 9, 225, 1]);
        assert_eq!(combiner.row_len(false, 4), 4);
    }
}

//! Site records
//!
//! A [`Variant`] is one site of the genotype matrix: its coordinates, its alleles and one
//! genotype code per subject. The same type is handed to the writer and returned by the
//! reader; write-time staging state lives in the block writer instead.

mod transform;

use crate::{
    coding::{alleles_of, GenotypeCoder, MISSING},
    error::{CodingError, Result},
};

/// Placeholder ALT text of a site without alternate alleles
pub const NO_ALTERNATIVE: &[u8] = b".";

/// A single site with one genotype code per subject
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Variant {
    /// Chromosome name
    pub chromosome: String,
    /// Position on the chromosome
    pub position: u32,
    /// Reference allele text
    pub reference: Vec<u8>,
    /// Comma-separated alternate alleles (`.` when there are none)
    pub alternative: Vec<u8>,
    /// One genotype code per subject
    pub genotypes: Vec<u8>,
    /// Whether the genotype codes are phased
    pub phased: bool,
}
impl Variant {
    #[must_use]
    pub fn new(
        chromosome: impl Into<String>,
        position: u32,
        reference: impl Into<Vec<u8>>,
        alternative: impl Into<Vec<u8>>,
        genotypes: Vec<u8>,
        phased: bool,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            reference: reference.into(),
            alternative: alternative.into(),
            genotypes,
            phased,
        }
    }

    /// Coder matching the orientation of this variant
    #[must_use]
    pub fn coder(&self) -> GenotypeCoder {
        GenotypeCoder::new(self.phased)
    }

    #[must_use]
    pub fn has_alternative(&self) -> bool {
        !self.alternative.is_empty() && self.alternative != NO_ALTERNATIVE
    }

    /// Iterates the alternate alleles
    pub fn alternatives(&self) -> impl Iterator<Item = &[u8]> {
        let take = if self.has_alternative() { usize::MAX } else { 0 };
        self.alternative.split(|b| *b == b',').take(take)
    }

    /// Iterates all alleles, REF first
    pub fn alleles(&self) -> impl Iterator<Item = &[u8]> {
        std::iter::once(self.reference.as_slice()).chain(self.alternatives())
    }

    /// Returns allele `index` (REF is `0`)
    #[must_use]
    pub fn allele(&self, index: usize) -> Option<&[u8]> {
        self.alleles().nth(index)
    }

    /// Number of alleles including REF
    #[must_use]
    pub fn allele_count(&self) -> usize {
        1 + self.alternatives().count()
    }

    /// A site with at most one alternate allele
    #[must_use]
    pub fn is_biallelic(&self) -> bool {
        self.allele_count() <= 2
    }

    #[must_use]
    pub fn num_subjects(&self) -> usize {
        self.genotypes.len()
    }

    /// Replaces the ALT text with a list of alleles
    pub fn set_alternatives<'a, I>(&mut self, alternatives: I)
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        self.alternative.clear();
        for (idx, allele) in alternatives.into_iter().enumerate() {
            if idx > 0 {
                self.alternative.push(b',');
            }
            self.alternative.extend_from_slice(allele);
        }
        if self.alternative.is_empty() {
            self.alternative.extend_from_slice(NO_ALTERNATIVE);
        }
    }

    /// Checks that every genotype code references an allele of this site
    pub fn validate(&self) -> Result<()> {
        let alleles = self.allele_count();
        for code in &self.genotypes {
            if let Some([i, j]) = alleles_of(*code)? {
                let allele = i.max(j);
                if usize::from(allele) >= alleles {
                    return Err(CodingError::CodeExceedsAlleles {
                        code: *code,
                        allele,
                        alleles,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Number of occurrences of every allele (REF first) across called genotypes
    pub fn allele_counts(&self) -> Result<Vec<u32>> {
        let mut counts = vec![0u32; self.allele_count()];
        for code in &self.genotypes {
            if let Some(pair) = alleles_of(*code)? {
                for allele in pair {
                    let Some(count) = counts.get_mut(allele as usize) else {
                        return Err(CodingError::CodeExceedsAlleles {
                            code: *code,
                            allele,
                            alleles: self.allele_count(),
                        }
                        .into());
                    };
                    *count += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Population summary statistics over the ALT alleles
    pub fn allele_stats(&self) -> Result<AlleleStats> {
        let counts = self.allele_counts()?;
        Ok(AlleleStats {
            an: counts.iter().sum(),
            ac: counts[1..].to_vec(),
        })
    }

    /// Number of subjects with a missing call
    #[must_use]
    pub fn num_missing(&self) -> usize {
        self.genotypes.iter().filter(|c| **c == MISSING).count()
    }

    pub fn clear(&mut self) {
        self.chromosome.clear();
        self.position = 0;
        self.reference.clear();
        self.alternative.clear();
        self.genotypes.clear();
    }
}

/// AC / AN / AF of a site
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlleleStats {
    /// Allele count for every ALT allele
    pub ac: Vec<u32>,
    /// Total number of called alleles
    pub an: u32,
}
impl AlleleStats {
    /// Frequency of ALT allele `index`, `None` when no allele was called
    #[must_use]
    pub fn af(&self, index: usize) -> Option<f64> {
        if self.an == 0 {
            return None;
        }
        self.ac
            .get(index)
            .map(|ac| f64::from(*ac) / f64::from(self.an))
    }
}

#[cfg(test)]
mod testing {
    use super::*;

    fn unphased(alt: &str, gts: &[&str]) -> Variant {
        let coder = GenotypeCoder::UNPHASED;
        Variant::new(
            "chr1",
            100,
            "A",
            alt,
            gts.iter().map(|g| coder.parse(g.as_bytes()).unwrap()).collect(),
            false,
        )
    }

    #[test]
    fn test_alleles() {
        let variant = unphased("C,G", &["0/1"]);
        assert_eq!(variant.allele_count(), 3);
        assert!(!variant.is_biallelic());
        assert_eq!(variant.allele(2), Some(&b"G"[..]));
        assert_eq!(variant.allele(3), None);

        let variant = unphased(".", &["0/0"]);
        assert_eq!(variant.allele_count(), 1);
        assert!(variant.is_biallelic());
        assert_eq!(variant.alternatives().count(), 0);

        let variant = unphased("", &["0/0"]);
        assert_eq!(variant.allele_count(), 1);
    }

    #[test]
    fn test_set_alternatives() {
        let mut variant = unphased("C", &["0/1"]);
        variant.set_alternatives([&b"T"[..], &b"TT"[..]]);
        assert_eq!(variant.alternative, b"T,TT");
        variant.set_alternatives(std::iter::empty());
        assert_eq!(variant.alternative, b".");
    }

    #[test]
    fn test_validate() {
        assert!(unphased("C", &["0/1", "1/1", "./."]).validate().is_ok());
        assert!(unphased("C", &["0/2"]).validate().is_err());
    }

    #[test]
    fn test_allele_stats() {
        let variant = unphased("C,G", &["0/1", "1/2", "./.", "2/2"]);
        let stats = variant.allele_stats().unwrap();
        assert_eq!(stats.an, 6);
        assert_eq!(stats.ac, vec![2, 3]);
        assert_eq!(stats.af(0), Some(2.0 / 6.0));
        assert_eq!(stats.af(2), None);
        assert_eq!(variant.num_missing(), 1);

        let empty = unphased("C", &["./.", "./."]).allele_stats().unwrap();
        assert_eq!(empty.an, 0);
        assert_eq!(empty.af(0), None);
    }
}

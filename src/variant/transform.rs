use crate::{
    coding::{alleles_of, MAX_ALLELES, MISSING},
    error::{Result, TransformError, WriteError},
};

use super::Variant;

/// Allele-level rewrites of a site
impl Variant {
    /// Decomposes a multiallelic site into one biallelic site per ALT allele
    ///
    /// In part `k` the `k`-th alternate allele becomes the ALT allele and every other
    /// alternate allele is folded onto the reference. Biallelic sites are returned as-is.
    pub fn split(&self) -> Result<Vec<Variant>> {
        if self.is_biallelic() {
            return Ok(vec![self.clone()]);
        }
        let coder = self.coder();
        let alleles = self.allele_count();
        let mut parts = Vec::with_capacity(alleles - 1);
        let mut mapping = vec![0u8; alleles];
        for (k, alternative) in self.alternatives().enumerate() {
            mapping.fill(0);
            mapping[k + 1] = 1;
            let genotypes = self
                .genotypes
                .iter()
                .map(|code| coder.remap(*code, &mapping))
                .collect::<Result<Vec<u8>>>()?;
            parts.push(Variant {
                chromosome: self.chromosome.clone(),
                position: self.position,
                reference: self.reference.clone(),
                alternative: alternative.to_vec(),
                genotypes,
                phased: self.phased,
            });
        }
        Ok(parts)
    }

    /// Merges biallelic parts of one site back into a single variant
    ///
    /// Parts must agree on chromosome, position, REF, orientation and subject count.
    /// For phased data every haplotype takes the ALT allele of the first part that calls
    /// it; unphased calls collect ALT copies across parts in part order. A subject that
    /// is missing in every part stays missing.
    pub fn join(parts: &[Variant]) -> Result<Variant> {
        let Some(first) = parts.first() else {
            return Err(TransformError::NoParts.into());
        };
        for part in parts {
            if part.chromosome != first.chromosome {
                return Err(TransformError::IncompatibleParts("chromosome").into());
            }
            if part.position != first.position {
                return Err(TransformError::IncompatibleParts("position").into());
            }
            if part.reference != first.reference {
                return Err(TransformError::IncompatibleParts("reference").into());
            }
            if part.phased != first.phased {
                return Err(TransformError::IncompatibleParts("phase").into());
            }
            if part.genotypes.len() != first.genotypes.len() {
                return Err(TransformError::IncompatibleParts("subject count").into());
            }
            if !part.is_biallelic() {
                return Err(TransformError::NotBiallelic(part.allele_count()).into());
            }
        }

        // joined allele index of every part's ALT (0 when the part has none)
        let mut alternatives: Vec<&[u8]> = Vec::new();
        let mut index = Vec::with_capacity(parts.len());
        for part in parts {
            match part.alternatives().next() {
                Some(alternative) => {
                    let idx = match alternatives.iter().position(|a| *a == alternative) {
                        Some(idx) => idx,
                        None => {
                            alternatives.push(alternative);
                            alternatives.len() - 1
                        }
                    };
                    index.push(idx + 1);
                }
                None => index.push(0),
            }
        }
        if alternatives.len() + 1 > MAX_ALLELES {
            return Err(WriteError::AlleleOverflow {
                alleles: alternatives.len() + 1,
                max: MAX_ALLELES,
            }
            .into());
        }

        let coder = first.coder();
        let mut genotypes = Vec::with_capacity(first.genotypes.len());
        for sample in 0..first.genotypes.len() {
            let mut called = false;
            let mut haplotypes = [0usize; 2];
            let mut filled = 0;
            for (part, allele) in parts.iter().zip(&index) {
                let Some([i, j]) = alleles_of(part.genotypes[sample])? else {
                    continue;
                };
                called = true;
                if *allele == 0 {
                    continue;
                }
                if first.phased {
                    for (h, a) in [i, j].into_iter().enumerate() {
                        if a == 1 && haplotypes[h] == 0 {
                            haplotypes[h] = *allele;
                        }
                    }
                } else {
                    let copies = usize::from(i == 1) + usize::from(j == 1);
                    for _ in 0..copies {
                        if filled < 2 {
                            haplotypes[filled] = *allele;
                            filled += 1;
                        }
                    }
                }
            }
            genotypes.push(if called {
                coder.encode(haplotypes[0], haplotypes[1])?
            } else {
                MISSING
            });
        }

        let mut joined = Variant {
            chromosome: first.chromosome.clone(),
            position: first.position,
            reference: first.reference.clone(),
            alternative: Vec::new(),
            genotypes,
            phased: first.phased,
        };
        joined.set_alternatives(alternatives);
        Ok(joined)
    }

    /// Re-indexes the genotype codes onto a new allele list
    ///
    /// The target list must contain every allele of the site.
    pub fn reset_alleles(&mut self, reference: &[u8], alternatives: &[&[u8]]) -> Result<()> {
        let targets: Vec<&[u8]> = std::iter::once(reference)
            .chain(alternatives.iter().copied())
            .collect();
        if targets.len() > MAX_ALLELES {
            return Err(WriteError::AlleleOverflow {
                alleles: targets.len(),
                max: MAX_ALLELES,
            }
            .into());
        }

        let mut mapping = Vec::with_capacity(self.allele_count());
        for allele in self.alleles() {
            let Some(idx) = targets.iter().position(|t| *t == allele) else {
                return Err(
                    TransformError::MissingAllele(String::from_utf8_lossy(allele).into_owned())
                        .into(),
                );
            };
            mapping.push(idx as u8);
        }

        let coder = self.coder();
        for code in &mut self.genotypes {
            *code = coder.remap(*code, &mapping)?;
        }
        self.reference = reference.to_vec();
        self.set_alternatives(alternatives.iter().copied());
        Ok(())
    }

    /// Exchanges REF and ALT of a biallelic site and re-orients every call
    pub fn flip(&mut self) -> Result<()> {
        let alleles = self.allele_count();
        if alleles != 2 {
            return Err(TransformError::NotBiallelic(alleles).into());
        }
        let coder = self.coder();
        for code in &mut self.genotypes {
            *code = coder.reverse(*code)?;
        }
        std::mem::swap(&mut self.reference, &mut self.alternative);
        Ok(())
    }

    /// Drops ALT alleles that no subject carries, returning how many were dropped
    pub fn trim_unused_alleles(&mut self) -> Result<usize> {
        let counts = self.allele_counts()?;
        if counts[1..].iter().all(|c| *c > 0) {
            return Ok(0);
        }

        let mut mapping = vec![0u8; counts.len()];
        let mut kept: Vec<Vec<u8>> = Vec::with_capacity(counts.len());
        for (idx, allele) in self.alleles().enumerate().skip(1) {
            if counts[idx] > 0 {
                kept.push(allele.to_vec());
                mapping[idx] = kept.len() as u8;
            }
        }

        let coder = self.coder();
        for code in &mut self.genotypes {
            *code = coder.remap(*code, &mapping)?;
        }
        let removed = counts.len() - 1 - kept.len();
        self.set_alternatives(kept.iter().map(Vec::as_slice));
        Ok(removed)
    }
}

#[cfg(test)]
mod testing {
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::{coding::GenotypeCoder, Error};

    fn variant(alt: &str, gts: &[&str], phased: bool) -> Variant {
        let coder = GenotypeCoder::new(phased);
        Variant::new(
            "chr2",
            5_000,
            "G",
            alt,
            gts.iter().map(|g| coder.parse(g.as_bytes()).unwrap()).collect(),
            phased,
        )
    }

    fn texts(variant: &Variant) -> Vec<String> {
        let coder = variant.coder();
        variant
            .genotypes
            .iter()
            .map(|c| String::from_utf8(coder.decode_to_vec(2, *c).unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn test_split() {
        let original = variant("A,T", &["0/1", "1/2", "2/2", "./."], false);
        let parts = original.split().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].alternative, b"A");
        assert_eq!(texts(&parts[0]), ["0/1", "0/1", "0/0", "./."]);
        assert_eq!(parts[1].alternative, b"T");
        assert_eq!(texts(&parts[1]), ["0/0", "0/1", "1/1", "./."]);
    }

    #[test]
    fn test_split_biallelic_is_identity() {
        let original = variant("A", &["0/1"], false);
        assert_eq!(original.split().unwrap(), vec![original]);
    }

    #[test]
    fn test_join_phased() {
        let original = variant("A,T,C", &["1|2", "2|0", "0|3", ".|.", "3|3"], true);
        let joined = Variant::join(&original.split().unwrap()).unwrap();
        assert_eq!(joined, original);
    }

    #[test]
    fn test_split_join_idempotent() {
        let mut rng = SmallRng::seed_from_u64(7);
        for phased in [true, false] {
            let coder = GenotypeCoder::new(phased);
            for alleles in 2..6usize {
                let genotypes = (0..50)
                    .map(|_| {
                        if rng.random_bool(0.1) {
                            MISSING
                        } else {
                            coder
                                .encode(rng.random_range(0..alleles), rng.random_range(0..alleles))
                                .unwrap()
                        }
                    })
                    .collect();
                let alternatives: Vec<String> = (1..alleles).map(|a| "A".repeat(a)).collect();
                let mut original = Variant::new(
                    "chr1",
                    42,
                    "G",
                    alternatives.join(","),
                    genotypes,
                    phased,
                );
                let joined = Variant::join(&original.split().unwrap()).unwrap();
                original.trim_unused_alleles().unwrap();
                let mut trimmed = joined.clone();
                trimmed.trim_unused_alleles().unwrap();
                assert_eq!(trimmed, original);
            }
        }
    }

    #[test]
    fn test_join_mismatch() {
        let a = variant("A", &["0/1"], false);
        let mut b = variant("T", &["0/1"], false);
        b.position += 1;
        assert!(matches!(
            Variant::join(&[a.clone(), b]),
            Err(Error::TransformError(TransformError::IncompatibleParts("position")))
        ));
        assert!(matches!(
            Variant::join(&[]),
            Err(Error::TransformError(TransformError::NoParts))
        ));
        let multi = variant("A,T", &["0/1"], false);
        assert!(Variant::join(&[a, multi]).is_err());
    }

    #[test]
    fn test_reset_alleles() {
        let mut site = variant("A", &["0/1", "1/1", "./."], false);
        site.reset_alleles(b"G", &[b"T", b"A"]).unwrap();
        assert_eq!(site.alternative, b"T,A");
        assert_eq!(texts(&site), ["0/2", "2/2", "./."]);

        let mut site = variant("A", &["0/1"], false);
        assert!(matches!(
            site.reset_alleles(b"G", &[b"T"]),
            Err(Error::TransformError(TransformError::MissingAllele(_)))
        ));
    }

    #[test]
    fn test_reset_alleles_swaps_reference() {
        let mut site = variant("A", &["0|1", "0|0"], true);
        site.reset_alleles(b"A", &[b"G"]).unwrap();
        assert_eq!(site.reference, b"A");
        assert_eq!(texts(&site), ["1|0", "1|1"]);
    }

    #[test]
    fn test_flip() {
        let mut site = variant("A", &["0|1", "1|1", ".|.", "0|0"], true);
        site.flip().unwrap();
        assert_eq!(site.reference, b"A");
        assert_eq!(site.alternative, b"G");
        assert_eq!(texts(&site), ["1|0", "0|0", ".|.", "1|1"]);

        let mut multi = variant("A,T", &["0/1"], false);
        assert!(multi.flip().is_err());
    }

    #[test]
    fn test_trim_unused_alleles() {
        let mut site = variant("A,T,C", &["0/3", "3/3", "0/0"], false);
        assert_eq!(site.trim_unused_alleles().unwrap(), 2);
        assert_eq!(site.alternative, b"C");
        assert_eq!(texts(&site), ["0/1", "1/1", "0/0"]);

        let mut site = variant("A", &["0/0"], false);
        assert_eq!(site.trim_unused_alleles().unwrap(), 1);
        assert_eq!(site.alternative, b".");
    }
}

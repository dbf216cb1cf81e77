use crate::error::{CodingError, Result};

/// Maximum number of alleles (REF included) a site may carry
pub const MAX_ALLELES: usize = 15;

/// The genotype code reserved for a missing call
pub const MISSING: u8 = 0;

/// The largest valid genotype code (`14|0`)
pub const MAX_CODE: u8 = 225;

/// Marks table slots that no allele pair maps to
const INVALID: u8 = u8::MAX;

/// Code of the ordered allele pair `(i, j)`
const fn pair_code(i: usize, j: usize) -> u8 {
    if i >= j {
        ((i + 1) * (i + 1) - j) as u8
    } else {
        (j * j + i + 1) as u8
    }
}

/// Exchanges the reference allele with the first alternate
const fn swap_reference(allele: usize) -> usize {
    match allele {
        0 => 1,
        1 => 0,
        _ => allele,
    }
}

/// Lookup tables indexed by genotype code
struct Tables {
    /// code -> ordered allele pair
    pairs: [[u8; 2]; 256],
    /// code -> code of the sorted pair
    unphased: [u8; 256],
    /// code -> code with alleles 0 and 1 exchanged
    reversed: [u8; 256],
    /// code -> number of reference alleles
    score: [u8; 256],
}
impl Tables {
    const fn build() -> Self {
        let mut pairs = [[INVALID; 2]; 256];
        let mut unphased = [INVALID; 256];
        let mut reversed = [INVALID; 256];
        let mut score = [0u8; 256];

        unphased[MISSING as usize] = MISSING;
        reversed[MISSING as usize] = MISSING;

        let mut i = 0;
        while i < MAX_ALLELES {
            let mut j = 0;
            while j < MAX_ALLELES {
                let code = pair_code(i, j) as usize;
                pairs[code] = [i as u8, j as u8];
                unphased[code] = if i <= j {
                    pair_code(i, j)
                } else {
                    pair_code(j, i)
                };
                reversed[code] = pair_code(swap_reference(i), swap_reference(j));
                score[code] = (i == 0) as u8 + (j == 0) as u8;
                j += 1;
            }
            i += 1;
        }

        Self {
            pairs,
            unphased,
            reversed,
            score,
        }
    }
}

/// Process-wide tables, evaluated at compile time
static TABLES: Tables = Tables::build();

/// Returns the ordered allele pair of a code, `None` for a missing call
pub fn alleles_of(code: u8) -> Result<Option<[u8; 2]>> {
    if code == MISSING {
        return Ok(None);
    }
    let pair = TABLES.pairs[code as usize];
    if pair[0] == INVALID {
        return Err(CodingError::InvalidCode(code).into());
    }
    Ok(Some(pair))
}

/// Folds a phased code onto its unphased representation
pub fn to_unphased(code: u8) -> Result<u8> {
    match TABLES.unphased[code as usize] {
        INVALID => Err(CodingError::InvalidCode(code).into()),
        folded => Ok(folded),
    }
}

/// Number of reference alleles carried by a code
///
/// Missing calls score zero.
pub fn score_of(code: u8) -> Result<u8> {
    if code > MAX_CODE {
        return Err(CodingError::InvalidCode(code).into());
    }
    Ok(TABLES.score[code as usize])
}

/// Table lookup without domain checks, for codes validated at admission
#[inline]
pub(crate) fn score_unchecked(code: u8) -> u8 {
    TABLES.score[code as usize]
}

/// Largest allele index referenced by a code (zero for missing calls)
pub fn max_allele(code: u8) -> Result<u8> {
    Ok(alleles_of(code)?.map_or(0, |[i, j]| i.max(j)))
}

fn push_allele(allele: u8, out: &mut Vec<u8>) {
    if allele < 10 {
        out.push(b'0' + allele);
    } else {
        out.push(b'1');
        out.push(b'0' + allele - 10);
    }
}

fn parse_allele(text: &[u8]) -> Result<Option<usize>> {
    if text == b"." {
        return Ok(None);
    }
    if text.is_empty() || text.len() > 3 || !text.iter().all(u8::is_ascii_digit) {
        return Err(CodingError::InvalidGenotypeText(String::from_utf8_lossy(text).into_owned()).into());
    }
    let index = text
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
    if index >= MAX_ALLELES {
        return Err(CodingError::AlleleIndexOutOfRange {
            index,
            max: MAX_ALLELES,
        }
        .into());
    }
    Ok(Some(index))
}

/// Encodes and decodes genotype codes under one orientation
///
/// The coder is a copyable handle over the process-wide tables. A phased coder keeps
/// the allele order of every call; an unphased coder folds `j|i` onto `i/j`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GenotypeCoder {
    phased: bool,
}
impl GenotypeCoder {
    pub const PHASED: Self = Self { phased: true };
    pub const UNPHASED: Self = Self { phased: false };

    #[must_use]
    pub const fn new(phased: bool) -> Self {
        Self { phased }
    }

    #[must_use]
    pub const fn is_phased(&self) -> bool {
        self.phased
    }

    /// Encodes the allele pair `(i, j)`
    pub fn encode(&self, i: usize, j: usize) -> Result<u8> {
        for index in [i, j] {
            if index >= MAX_ALLELES {
                return Err(CodingError::AlleleIndexOutOfRange {
                    index,
                    max: MAX_ALLELES,
                }
                .into());
            }
        }
        if self.phased || i <= j {
            Ok(pair_code(i, j))
        } else {
            Ok(pair_code(j, i))
        }
    }

    /// The code of a missing call
    #[must_use]
    pub const fn encode_missing(&self) -> u8 {
        MISSING
    }

    /// Appends the VCF text of a code to `out`
    ///
    /// Haploid (`ploidy == 1`) homozygous codes decode to a single allele.
    pub fn decode(&self, ploidy: u8, code: u8, out: &mut Vec<u8>) -> Result<()> {
        if ploidy == 0 || ploidy > 2 {
            return Err(CodingError::InvalidPloidy(ploidy).into());
        }
        let separator = if self.phased { b'|' } else { b'/' };
        let Some([mut i, mut j]) = alleles_of(code)? else {
            if ploidy == 1 {
                out.push(b'.');
            } else {
                out.extend_from_slice(&[b'.', separator, b'.']);
            }
            return Ok(());
        };
        if ploidy == 1 && i == j {
            push_allele(i, out);
            return Ok(());
        }
        if !self.phased && i > j {
            std::mem::swap(&mut i, &mut j);
        }
        push_allele(i, out);
        out.push(separator);
        push_allele(j, out);
        Ok(())
    }

    /// Returns the VCF text of a code as a new buffer
    pub fn decode_to_vec(&self, ploidy: u8, code: u8) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(5);
        self.decode(ploidy, code, &mut out)?;
        Ok(out)
    }

    /// Parses VCF genotype text (`0/1`, `1|0`, `./.`, `.`, `2`) into a code
    ///
    /// A call with any missing allele is treated as missing.
    pub fn parse(&self, text: &[u8]) -> Result<u8> {
        let split = memchr::memchr2(b'/', b'|', text);
        let (first, second) = match split {
            Some(idx) => (parse_allele(&text[..idx])?, parse_allele(&text[idx + 1..])?),
            None => {
                let allele = parse_allele(text)?;
                (allele, allele)
            }
        };
        match (first, second) {
            (Some(i), Some(j)) => self.encode(i, j),
            _ => Ok(MISSING),
        }
    }

    /// Exchanges the reference allele with the first alternate in a code
    ///
    /// Used to re-orient calls when two sources disagree on which allele is the reference.
    pub fn reverse(&self, code: u8) -> Result<u8> {
        let reversed = TABLES.reversed[code as usize];
        if reversed == INVALID {
            return Err(CodingError::InvalidCode(code).into());
        }
        if self.phased {
            Ok(reversed)
        } else {
            to_unphased(reversed)
        }
    }

    /// Re-indexes the alleles of a code through `mapping[old] = new`
    pub fn remap(&self, code: u8, mapping: &[u8]) -> Result<u8> {
        let Some([i, j]) = alleles_of(code)? else {
            return Ok(MISSING);
        };
        let lookup = |allele: u8| {
            mapping
                .get(allele as usize)
                .copied()
                .ok_or(CodingError::CodeExceedsAlleles {
                    code,
                    allele,
                    alleles: mapping.len(),
                })
        };
        self.encode(usize::from(lookup(i)?), usize::from(lookup(j)?))
    }

    /// Validates a code against a site with `alleles` alleles, folding it if unphased
    pub fn normalize(&self, code: u8, alleles: usize) -> Result<u8> {
        let Some([i, j]) = alleles_of(code)? else {
            return Ok(MISSING);
        };
        let allele = i.max(j);
        if usize::from(allele) >= alleles {
            return Err(CodingError::CodeExceedsAlleles {
                code,
                allele,
                alleles,
            }
            .into());
        }
        if self.phased {
            Ok(code)
        } else {
            to_unphased(code)
        }
    }
}

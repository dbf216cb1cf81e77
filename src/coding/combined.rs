use crate::error::{CodingError, Result};

/// Number of phased biallelic codes packed per byte
pub const PHASED_GROUP_SIZE: usize = 3;

/// Number of unphased biallelic codes packed per byte
pub const UNPHASED_GROUP_SIZE: usize = 4;

/// Phased biallelic codes: missing, `0|0`, `0|1`, `1|1`, `1|0`
const PHASED_RADIX: u8 = 5;

/// Unphased biallelic codes: missing, `0/0`, `0/1`, `1/1`
const UNPHASED_RADIX: u8 = 4;

const INVALID: u8 = u8::MAX;

const fn build_unpack(radix: u8, group_size: usize) -> [[u8; 4]; 256] {
    let mut table = [[INVALID; 4]; 256];
    let mut limit = 1usize;
    let mut k = 0;
    while k < group_size {
        limit *= radix as usize;
        k += 1;
    }

    let mut byte = 0;
    while byte < limit {
        let mut rest = byte;
        let mut slot = group_size;
        while slot > 0 {
            slot -= 1;
            table[byte][slot] = (rest % radix as usize) as u8;
            rest /= radix as usize;
        }
        byte += 1;
    }
    table
}

static UNPACK_PHASED: [[u8; 4]; 256] = build_unpack(PHASED_RADIX, PHASED_GROUP_SIZE);
static UNPACK_UNPHASED: [[u8; 4]; 256] = build_unpack(UNPHASED_RADIX, UNPHASED_GROUP_SIZE);

/// Packs biallelic genotype codes into combined bytes
///
/// Codes are combined with fixed-radix positional arithmetic: three radix-5 codes per byte
/// for phased data, four radix-4 codes per byte for unphased data. The first code of a
/// group is the most significant digit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupCoder {
    phased: bool,
}
impl GroupCoder {
    #[must_use]
    pub const fn new(phased: bool) -> Self {
        Self { phased }
    }

    /// Number of codes packed into one byte
    #[must_use]
    pub const fn group_size(&self) -> usize {
        if self.phased {
            PHASED_GROUP_SIZE
        } else {
            UNPHASED_GROUP_SIZE
        }
    }

    #[must_use]
    pub const fn radix(&self) -> u8 {
        if self.phased {
            PHASED_RADIX
        } else {
            UNPHASED_RADIX
        }
    }

    /// Number of combined bytes needed for `num_samples` codes
    #[must_use]
    pub const fn encoded_len(&self, num_samples: usize) -> usize {
        num_samples.div_ceil(self.group_size())
    }

    /// Returns the (group, slot) coordinates of a sample
    #[must_use]
    pub const fn locate(&self, sample: usize) -> (usize, usize) {
        (sample / self.group_size(), sample % self.group_size())
    }

    /// Packs one group of codes into a byte
    ///
    /// A partial trailing group (fewer codes than the group size) is padded by
    /// replicating its last real code into every unused slot.
    #[must_use]
    pub fn pack(&self, codes: &[u8]) -> u8 {
        debug_assert!(!codes.is_empty() && codes.len() <= self.group_size());
        debug_assert!(codes.iter().all(|c| *c < self.radix()));
        let last = codes.len() - 1;
        (0..self.group_size()).fold(0u8, |acc, slot| {
            acc * self.radix() + codes[slot.min(last)]
        })
    }

    /// Packs a whole row of codes, appending one byte per group to `out`
    pub fn pack_row(&self, codes: &[u8], out: &mut Vec<u8>) {
        out.extend(codes.chunks(self.group_size()).map(|group| self.pack(group)));
    }

    /// Unpacks a combined byte into its codes
    ///
    /// Only the first [`group_size`](Self::group_size) entries are meaningful.
    pub fn unpack(&self, byte: u8) -> Result<[u8; 4]> {
        let codes = if self.phased {
            UNPACK_PHASED[byte as usize]
        } else {
            UNPACK_UNPHASED[byte as usize]
        };
        if codes[0] == INVALID {
            return Err(CodingError::InvalidCombinedCode {
                code: byte,
                phased: self.phased,
            }
            .into());
        }
        Ok(codes)
    }

    /// Decodes the code stored at `slot` of a combined byte
    pub fn decode(&self, byte: u8, slot: usize) -> Result<u8> {
        Ok(self.unpack(byte)?[slot])
    }

    /// Unpacks a full row of `num_samples` codes, appending them to `out`
    pub fn unpack_row(&self, bytes: &[u8], num_samples: usize, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        for byte in bytes {
            out.extend_from_slice(&self.unpack(*byte)?[..self.group_size()]);
        }
        out.truncate(start + num_samples);
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;

    #[test]
    fn test_group_geometry() {
        let phased = GroupCoder::new(true);
        let unphased = GroupCoder::new(false);
        assert_eq!(phased.group_size(), 3);
        assert_eq!(unphased.group_size(), 4);
        assert_eq!(phased.encoded_len(7), 3);
        assert_eq!(unphased.encoded_len(8), 2);
        assert_eq!(unphased.encoded_len(9), 3);
        assert_eq!(phased.locate(7), (2, 1));
        assert_eq!(unphased.locate(7), (1, 3));
    }

    #[test]
    fn test_every_byte_round_trips() {
        for coder in [GroupCoder::new(true), GroupCoder::new(false)] {
            let limit = u32::from(coder.radix()).pow(coder.group_size() as u32);
            for byte in 0..limit {
                let byte = byte as u8;
                let codes = coder.unpack(byte).unwrap();
                assert_eq!(coder.pack(&codes[..coder.group_size()]), byte);
            }
        }
    }

    #[test]
    fn test_invalid_phased_byte() {
        let coder = GroupCoder::new(true);
        assert!(coder.unpack(125).is_err());
        assert!(coder.unpack(124).is_ok());
    }

    #[test]
    fn test_partial_group_padding() {
        let coder = GroupCoder::new(false);
        let byte = coder.pack(&[1, 2]);
        assert_eq!(coder.unpack(byte).unwrap(), [1, 2, 2, 2]);

        let coder = GroupCoder::new(true);
        let byte = coder.pack(&[4]);
        assert_eq!(coder.unpack(byte).unwrap()[..3], [4, 4, 4]);
    }

    #[test]
    fn test_row_inverse() {
        let mut rng = SmallRng::seed_from_u64(42);
        for coder in [GroupCoder::new(true), GroupCoder::new(false)] {
            for len in 1..40 {
                let codes: Vec<u8> = (0..len)
                    .map(|_| rng.random_range(0..coder.radix()))
                    .collect();
                let mut packed = Vec::new();
                coder.pack_row(&codes, &mut packed);
                assert_eq!(packed.len(), coder.encoded_len(len));

                let mut unpacked = Vec::new();
                coder.unpack_row(&packed, len, &mut unpacked).unwrap();
                assert_eq!(unpacked, codes);

                // padding beyond the last real code replicates it
                let last = *packed.last().unwrap();
                let filled = len % coder.group_size();
                if filled != 0 {
                    let group = coder.unpack(last).unwrap();
                    for slot in filled..coder.group_size() {
                        assert_eq!(group[slot], codes[len - 1]);
                    }
                }
            }
        }
    }
}

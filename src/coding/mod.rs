//! # Genotype coding
//!
//! Every sample's call at a site is stored as a single byte, the *genotype code*.
//! The ordered allele pair `(i, j)` maps to
//!
//! ```text
//! code(i, j) = (i + 1)^2 - j    if i >= j
//!            = j^2 + i + 1      otherwise
//! ```
//!
//! which is a bijection from `[0, 15)^2` onto `[1, 225]`. Code `0` is reserved for a
//! missing call. Unphased data folds `j/i` onto `i/j` so only sorted pairs occur.
//!
//! For biallelic sites the codes collapse onto a tiny domain (`0..=4` phased, `0..=3`
//! unphased) and several samples are packed into one *combined* byte by
//! [`GroupCoder`].
//!
//! All tables are evaluated at compile time and are shared read-only by every reader
//! and writer.

mod combined;
mod genotype;

pub use combined::{GroupCoder, PHASED_GROUP_SIZE, UNPHASED_GROUP_SIZE};
pub use genotype::{
    alleles_of, max_allele, score_of, to_unphased, GenotypeCoder, MAX_ALLELES, MAX_CODE, MISSING,
};
pub(crate) use genotype::score_unchecked;

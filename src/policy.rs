//! Admission policies for sites with too many alleles
//!
//! The genotype code domain caps a site at [`MAX_ALLELES`](crate::coding::MAX_ALLELES)
//! alleles, and a writer may be configured with a lower cap. This module decides what
//! happens to a site above the cap before it reaches the block writer.

use crate::{
    error::{Result, WriteError},
    variant::Variant,
};

/// Policy for handling sites with more alleles than the writer accepts
///
/// The default policy is `Drop`, which skips the site and counts it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Skip the site (default policy)
    #[default]
    Drop,

    /// Decompose the site into one biallelic site per ALT allele
    Split,

    /// Fail with [`WriteError::AlleleOverflow`]
    Reject,
}
impl OverflowPolicy {
    /// Applies the policy to a site exceeding `max_alleles`
    ///
    /// The buffer is cleared first.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The sites in `ibuf` should be written instead of the original
    /// * `Ok(false)` - The site should be skipped
    /// * `Err(Error)` - The policy is `Reject`
    ///
    /// # Examples
    ///
    /// ```
    /// # use gtblock::{OverflowPolicy, Result, Variant};
    /// # fn main() -> Result<()> {
    /// let variant = Variant::new("chr1", 10, "A", "C,G,T", vec![2, 0], false);
    /// let mut parts = Vec::new();
    /// assert!(OverflowPolicy::Split.handle(&variant, 2, &mut parts)?);
    /// assert_eq!(parts.len(), 3);
    /// assert!(!OverflowPolicy::Drop.handle(&variant, 2, &mut parts)?);
    /// assert!(parts.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn handle(
        &self,
        variant: &Variant,
        max_alleles: usize,
        ibuf: &mut Vec<Variant>,
    ) -> Result<bool> {
        ibuf.clear();
        match self {
            Self::Drop => Ok(false),
            Self::Split => {
                ibuf.extend(variant.split()?);
                Ok(true)
            }
            Self::Reject => Err(WriteError::AlleleOverflow {
                alleles: variant.allele_count(),
                max: max_alleles,
            }
            .into()),
        }
    }
}

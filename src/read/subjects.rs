use crate::{
    coding::GroupCoder,
    error::{ReadError, Result},
};

/// A projection of the file's subjects onto a caller-chosen subset
///
/// Each selected ordinal is resolved once to its `(group, slot)` coordinates inside a
/// combined biallelic row. Multiallelic rows store one byte per subject, so the ordinal
/// itself is the byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubjectSelection {
    ordinals: Vec<usize>,
    locations: Vec<(usize, usize)>,
}
impl SubjectSelection {
    /// Resolves `ordinals` against a file with `num_subjects` subjects
    pub fn new(ordinals: &[usize], num_subjects: usize, group: GroupCoder) -> Result<Self> {
        if let Some(bad) = ordinals.iter().find(|idx| **idx >= num_subjects) {
            return Err(ReadError::SubjectOutOfRange {
                requested_index: *bad,
                max_index: num_subjects,
            }
            .into());
        }
        Ok(Self {
            ordinals: ordinals.to_vec(),
            locations: ordinals.iter().map(|idx| group.locate(*idx)).collect(),
        })
    }

    #[must_use]
    pub fn ordinals(&self) -> &[usize] {
        &self.ordinals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    /// Decodes the selected codes of a combined biallelic row
    pub fn project_combined(&self, row: &[u8], group: GroupCoder, out: &mut Vec<u8>) -> Result<()> {
        for (group_idx, slot) in &self.locations {
            out.push(group.decode(row[*group_idx], *slot)?);
        }
        Ok(())
    }

    /// Copies the selected codes of a raw multiallelic row
    pub fn project_raw(&self, row: &[u8], out: &mut Vec<u8>) {
        out.extend(self.ordinals.iter().map(|idx| row[*idx]));
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::Error;

    #[test]
    fn test_out_of_range() {
        let group = GroupCoder::new(false);
        assert!(matches!(
            SubjectSelection::new(&[0, 4], 4, group),
            Err(Error::ReadError(ReadError::SubjectOutOfRange {
                requested_index: 4,
                max_index: 4
            }))
        ));
    }

    #[test]
    fn test_projection() {
        let group = GroupCoder::new(true);
        let codes = [1, 2, 3, 4, 0, 2, 3];
        let mut row = Vec::new();
        group.pack_row(&codes, &mut row);

        let selection = SubjectSelection::new(&[6, 0, 4, 4], codes.len(), group).unwrap();
        assert_eq!(selection.len(), 4);
        let mut out = Vec::new();
        selection.project_combined(&row, group, &mut out).unwrap();
        assert_eq!(out, vec![3, 1, 0, 0]);

        out.clear();
        selection.project_raw(&[9, 8, 7, 6, 5, 4, 3], &mut out);
        assert_eq!(out, vec![3, 9, 5, 5]);
    }
}

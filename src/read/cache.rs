use std::cmp::Ordering;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use memchr::memchr;

use crate::{
    coding::{to_unphased, GroupCoder},
    compress::Compressor,
    core::{
        utils::{extension_read, Span},
        Node,
    },
    error::{FormatError, Result},
    variant::NO_ALTERNATIVE,
};

use super::subjects::SubjectSelection;

/// Metadata of one decompressed row
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct RowMeta {
    pub position: u32,
    pub allele_count: usize,
    pub reference: Span,
    pub alternative: Span,
    /// Index of the row in storage order
    pub storage: usize,
}

/// Number of alleles (REF included) described by ALT text
fn allele_count(alternative: &[u8]) -> usize {
    if alternative.is_empty() || alternative == NO_ALTERNATIVE {
        1
    } else {
        2 + memchr::memchr_iter(b',', alternative).count()
    }
}

/// Compares rows by position, allele count, REF and ALT
fn genomic_order(a: &RowMeta, b: &RowMeta, alleles: &[u8]) -> Ordering {
    a.position
        .cmp(&b.position)
        .then(a.allele_count.cmp(&b.allele_count))
        .then_with(|| a.reference.slice(alleles).cmp(b.reference.slice(alleles)))
        .then_with(|| {
            a.alternative
                .slice(alleles)
                .cmp(b.alternative.slice(alleles))
        })
}

/// Placement of rows inside the genotype stream
#[derive(Clone, Copy)]
struct RowLayout {
    num_biallelic: usize,
    stride: usize,
    num_subjects: usize,
}
impl RowLayout {
    /// Genotype bytes of the row stored at `storage` and whether they are combined
    fn row<'a>(&self, genotypes: &'a [u8], storage: usize) -> (&'a [u8], bool) {
        if storage < self.num_biallelic {
            let start = storage * self.stride;
            (&genotypes[start..start + self.stride], true)
        } else {
            let start =
                self.num_biallelic * self.stride + (storage - self.num_biallelic) * self.num_subjects;
            (&genotypes[start..start + self.num_subjects], false)
        }
    }
}

/// Holds exactly one decompressed block
///
/// Rows are kept in genomic order (position, allele count, REF, ALT) regardless of the
/// order they were stored in. Rows equal on all four are ordered by their genotype bytes.
/// The genotype stream is only decompressed on demand, or eagerly when such ties exist.
pub(crate) struct DecompressionCache {
    /// `(chromosome id, node index)` of the loaded block
    loaded: Option<(usize, usize)>,
    genotypes_loaded: bool,
    node: Node,

    rows: Vec<RowMeta>,

    // decompressed streams
    positions: Vec<u8>,
    alleles: Vec<u8>,
    genotypes: Vec<u8>,

    /// Reusable compressed buffer
    zbuf: Vec<u8>,

    num_subjects: usize,
    group: GroupCoder,
}
impl DecompressionCache {
    pub fn new(num_subjects: usize, phased: bool) -> Self {
        Self {
            loaded: None,
            genotypes_loaded: false,
            node: Node::default(),
            rows: Vec::default(),
            positions: Vec::default(),
            alleles: Vec::default(),
            genotypes: Vec::default(),
            zbuf: Vec::default(),
            num_subjects,
            group: GroupCoder::new(phased),
        }
    }

    pub fn invalidate(&mut self) {
        self.loaded = None;
        self.genotypes_loaded = false;
        self.rows.clear();
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows of the loaded block in genomic order
    pub fn rows(&self) -> &[RowMeta] {
        &self.rows
    }

    pub fn reference(&self, row: &RowMeta) -> &[u8] {
        row.reference.slice(&self.alleles)
    }

    pub fn alternative(&self, row: &RowMeta) -> &[u8] {
        row.alternative.slice(&self.alleles)
    }

    /// Loads the block of `node` unless it is already loaded
    ///
    /// With `with_genotypes` unset only positions and alleles are decompressed; a later
    /// call requesting genotypes completes the load.
    pub fn fill<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        compressor: &mut dyn Compressor,
        key: (usize, usize),
        node: &Node,
        with_genotypes: bool,
    ) -> Result<()> {
        if self.loaded != Some(key) {
            self.invalidate();
            self.node = *node;
            self.load_metadata(reader, compressor)?;
            self.loaded = Some(key);
            debug!(
                "filled cache: chromosome={} node={} rows={}",
                key.0,
                key.1,
                self.rows.len()
            );
        }
        if with_genotypes && !self.genotypes_loaded {
            self.load_genotypes(reader, compressor)?;
            self.genotypes_loaded = true;
        }
        Ok(())
    }

    /// Decompresses positions and alleles and sorts the rows into genomic order
    fn load_metadata<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        compressor: &mut dyn Compressor,
    ) -> Result<()> {
        let node = self.node;
        reader.seek(SeekFrom::Start(
            node.offset + u64::from(node.len_z_genotypes),
        ))?;

        extension_read(reader, &mut self.zbuf, node.len_z_positions as usize)?;
        compressor.decompress(&self.zbuf, &mut self.positions)?;
        if self.positions.len() != node.len_positions() {
            return Err(FormatError::StreamLengthMismatch {
                stream: "position",
                expected: node.len_positions(),
                found: self.positions.len(),
            }
            .into());
        }

        extension_read(reader, &mut self.zbuf, node.len_z_alleles as usize)?;
        compressor.decompress(&self.zbuf, &mut self.alleles)?;
        if self.alleles.len() != node.len_alleles as usize {
            return Err(FormatError::StreamLengthMismatch {
                stream: "allele",
                expected: node.len_alleles as usize,
                found: self.alleles.len(),
            }
            .into());
        }

        // slice REF and ALT of every row in storage order
        let mut cursor = 0;
        for (storage, chunk) in self.positions.chunks_exact(4).enumerate() {
            let rest = &self.alleles[cursor..];
            let tab = memchr(b'\t', rest).ok_or(FormatError::MalformedAlleles(storage))?;
            let end = memchr(b'/', &rest[tab + 1..])
                .ok_or(FormatError::MalformedAlleles(storage))?
                + tab
                + 1;
            let alternative = &rest[tab + 1..end];
            self.rows.push(RowMeta {
                position: LittleEndian::read_u32(chunk),
                allele_count: allele_count(alternative),
                reference: Span::new(cursor, tab),
                alternative: Span::new(cursor + tab + 1, end - tab - 1),
                storage,
            });
            cursor += end + 1;
        }
        if cursor != self.alleles.len() {
            return Err(FormatError::MalformedAlleles(self.rows.len()).into());
        }

        // undo the write-time reordering
        let alleles = &self.alleles;
        self.rows.sort_by(|a, b| genomic_order(a, b, alleles));
        let tied = self
            .rows
            .windows(2)
            .any(|pair| genomic_order(&pair[0], &pair[1], alleles).is_eq());

        // duplicate sites fall back to their genotypes
        if tied {
            self.load_genotypes(reader, compressor)?;
            self.genotypes_loaded = true;
            let layout = self.layout();
            let (alleles, genotypes) = (&self.alleles, &self.genotypes);
            self.rows.sort_by(|a, b| {
                genomic_order(a, b, alleles).then_with(|| {
                    layout
                        .row(genotypes, a.storage)
                        .0
                        .cmp(layout.row(genotypes, b.storage).0)
                })
            });
        }
        Ok(())
    }

    fn load_genotypes<R: Read + Seek>(
        &mut self,
        reader: &mut R,
        compressor: &mut dyn Compressor,
    ) -> Result<()> {
        let node = self.node;
        reader.seek(SeekFrom::Start(node.offset))?;
        extension_read(reader, &mut self.zbuf, node.len_z_genotypes as usize)?;
        compressor.decompress(&self.zbuf, &mut self.genotypes)?;

        let expected = node.num_biallelic as usize * self.stride()
            + node.num_multiallelic as usize * self.num_subjects;
        if self.genotypes.len() != expected || expected != node.len_genotypes as usize {
            return Err(FormatError::StreamLengthMismatch {
                stream: "genotype",
                expected,
                found: self.genotypes.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Bytes per combined biallelic row
    fn stride(&self) -> usize {
        self.group.encoded_len(self.num_subjects)
    }

    fn layout(&self) -> RowLayout {
        RowLayout {
            num_biallelic: self.node.num_biallelic as usize,
            stride: self.stride(),
            num_subjects: self.num_subjects,
        }
    }

    /// Appends the codes of row `index` to `out`
    ///
    /// Codes are restricted to `selection` when set and folded to their unphased form when
    /// `unphased` is set. Requires a fill with genotypes.
    pub fn decode_genotypes(
        &self,
        index: usize,
        selection: Option<&SubjectSelection>,
        unphased: bool,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let start = out.len();
        let (bytes, combined) = self.layout().row(&self.genotypes, self.rows[index].storage);
        match (selection, combined) {
            (Some(selection), true) => selection.project_combined(bytes, self.group, out)?,
            (Some(selection), false) => selection.project_raw(bytes, out),
            (None, true) => self.group.unpack_row(bytes, self.num_subjects, out)?,
            (None, false) => out.extend_from_slice(bytes),
        }
        if unphased {
            for code in &mut out[start..] {
                *code = to_unphased(*code)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::{
        compress::CompressorKind, core::Directory, read::Reader, variant::Variant,
        write::WriterBuilder, GenotypeCoder,
    };

    fn encode(phased: bool, rows: &[(u32, &str, &str, &[&str])]) -> Vec<u8> {
        let coder = GenotypeCoder::new(phased);
        let mut buffer = Vec::new();
        {
            let mut writer = WriterBuilder::default()
                .phased(phased)
                .build(Cursor::new(&mut buffer), &["a", "b", "c", "d", "e"])
                .unwrap();
            for (position, reference, alternative, gts) in rows {
                let genotypes = gts.iter().map(|g| coder.parse(g.as_bytes()).unwrap()).collect();
                writer
                    .write(&Variant::new(
                        "chr1",
                        *position,
                        *reference,
                        *alternative,
                        genotypes,
                        phased,
                    ))
                    .unwrap();
            }
            writer.finish().unwrap();
        }
        buffer
    }

    fn open(buffer: &[u8]) -> (Cursor<&[u8]>, Directory, Box<dyn Compressor + Send>) {
        let reader = Reader::new(Cursor::new(buffer)).unwrap();
        let directory = reader.directory().clone();
        let compressor = CompressorKind::Zstd.build(3).unwrap();
        (Cursor::new(buffer), directory, compressor)
    }

    #[test]
    fn test_rows_are_sorted() {
        let buffer = encode(
            false,
            &[
                (5, "A", "C,G", &["0/2", "1/1", "0/0", "./.", "2/2"]),
                (5, "A", "T", &["0/1", "0/1", "0/0", "0/0", "1/1"]),
                (9, "G", ".", &["0/0", "0/0", "0/0", "0/0", "0/0"]),
                (7, "C", "A", &["1/1", "1/1", "0/1", "0/0", "./."]),
            ],
        );
        let (mut stream, directory, mut compressor) = open(&buffer);
        let node = directory.nodes(0)[0];
        let mut cache = DecompressionCache::new(5, false);
        cache
            .fill(&mut stream, &mut *compressor, (0, 0), &node, true)
            .unwrap();

        let order: Vec<(u32, &[u8])> = cache
            .rows()
            .iter()
            .map(|row| (row.position, cache.alternative(row)))
            .collect();
        assert_eq!(
            order,
            vec![
                (5, b"T".as_slice()),
                (5, b"C,G".as_slice()),
                (7, b"A".as_slice()),
                (9, b".".as_slice())
            ]
        );
        assert_eq!(cache.rows()[1].allele_count, 3);
        assert_eq!(cache.rows()[3].allele_count, 1);

        let mut out = Vec::new();
        cache.decode_genotypes(1, None, false, &mut out).unwrap();
        let coder = GenotypeCoder::UNPHASED;
        let text: Vec<Vec<u8>> = out
            .iter()
            .map(|code| coder.decode_to_vec(2, *code).unwrap())
            .collect();
        assert_eq!(
            text,
            vec![
                b"0/2".to_vec(),
                b"1/1".to_vec(),
                b"0/0".to_vec(),
                b"./.".to_vec(),
                b"2/2".to_vec()
            ]
        );
    }

    #[test]
    fn test_lazy_genotypes_and_projection() {
        let buffer = encode(
            true,
            &[
                (1, "A", "C", &["0|1", "1|0", "1|1", ".|.", "0|0"]),
                (2, "A", "C", &["1|0", "1|0", "0|0", "0|1", "1|1"]),
            ],
        );
        let (mut stream, directory, mut compressor) = open(&buffer);
        let node = directory.nodes(0)[0];
        let mut cache = DecompressionCache::new(5, true);
        cache
            .fill(&mut stream, &mut *compressor, (0, 0), &node, false)
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!cache.genotypes_loaded);

        cache
            .fill(&mut stream, &mut *compressor, (0, 0), &node, true)
            .unwrap();
        let group = GroupCoder::new(true);
        let selection = SubjectSelection::new(&[1, 4], 5, group).unwrap();

        let mut out = Vec::new();
        cache
            .decode_genotypes(0, Some(&selection), false, &mut out)
            .unwrap();
        assert_eq!(out, vec![4, 1]);

        out.clear();
        cache
            .decode_genotypes(0, Some(&selection), true, &mut out)
            .unwrap();
        assert_eq!(out, vec![2, 1]);
    }

    #[test]
    fn test_corrupt_alleles() {
        let buffer = encode(false, &[(1, "A", "C", &["0/1", "0/0", "0/0", "0/0", "0/0"])]);
        let (mut stream, directory, mut compressor) = open(&buffer);
        let mut node = directory.nodes(0)[0];
        node.len_alleles += 1;
        let mut cache = DecompressionCache::new(5, false);
        assert!(cache
            .fill(&mut stream, &mut *compressor, (0, 0), &node, false)
            .is_err());
    }
}

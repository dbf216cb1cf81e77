//! # Writing genotype block files
//!
//! The [`Writer`] accepts a stream of [`Variant`]s and accumulates them into blocks of
//! at most `1 << block_size_class` rows. A block is flushed when it is full (and the next
//! site moves to a new position) or when the chromosome changes.
//!
//! Flushing a block permutes its rows with the row-reorder heuristic, packs biallelic
//! genotype rows into combined codes, and compresses three independent streams
//! (genotypes, positions, alleles) which are streamed to the sink immediately.
//!
//! On [`finish`](Writer::finish) the node directory and chromosome table are appended
//! and the pre-reserved header is rewritten with the final statistics.
//!
//! ```
//! # use std::io::Cursor;
//! # use gtblock::{GenotypeCoder, Result, Variant, WriterBuilder};
//! # fn main() -> Result<()> {
//! let mut buffer = Vec::new();
//! let mut writer = WriterBuilder::default()
//!     .phased(false)
//!     .build(Cursor::new(&mut buffer), &["s1", "s2"])?;
//!
//! let coder = GenotypeCoder::UNPHASED;
//! let genotypes = vec![coder.parse(b"0/1")?, coder.parse(b"1/1")?];
//! writer.write(&Variant::new("chr1", 100, "A", "G", genotypes, false))?;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

mod block;
mod combine;
mod reorder;

use std::collections::HashMap;
use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info, warn};

use crate::{
    coding::{GenotypeCoder, MAX_ALLELES},
    compress::{Compressor, CompressorKind},
    core::{Directory, FileHeader, FileHeaderBuilder, Node},
    error::{Result, WriteError},
    policy::OverflowPolicy,
    variant::Variant,
};

use block::{GenotypeBlock, ALLELE_SEPARATOR, ROW_TERMINATOR};
use reorder::Reorderer;

/// Delimiter of the subject table
pub(crate) const SUBJECT_SEPARATOR: &str = "\t";

/// Builder for [`Writer`]
///
/// ```
/// # use std::io::Cursor;
/// # use gtblock::{CompressorKind, OverflowPolicy, Result, WriterBuilder};
/// # fn main() -> Result<()> {
/// let writer = WriterBuilder::default()
///     .phased(true)
///     .compressor(CompressorKind::Zstd)
///     .level(9)
///     .block_size_class(12)
///     .reorder(false)
///     .max_alleles(4)
///     .overflow_policy(OverflowPolicy::Split)
///     .reference("file:///data/GRCh38.fa")
///     .build(Cursor::new(Vec::<u8>::new()), &["NA12878"])?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct WriterBuilder {
    /// Prebuilt header (overrides the individual header options)
    header: Option<FileHeader>,
    phased: Option<bool>,
    compressor: Option<CompressorKind>,
    level: Option<u8>,
    block_size_class: Option<u8>,

    reorder: Option<bool>,
    window_count: Option<usize>,
    max_alleles: Option<usize>,
    overflow_policy: Option<OverflowPolicy>,
    reference: Option<String>,
}
impl WriterBuilder {
    #[must_use]
    pub fn header(mut self, header: FileHeader) -> Self {
        self.header = Some(header);
        self
    }

    #[must_use]
    pub fn phased(mut self, phased: bool) -> Self {
        self.phased = Some(phased);
        self
    }

    #[must_use]
    pub fn compressor(mut self, compressor: CompressorKind) -> Self {
        self.compressor = Some(compressor);
        self
    }

    #[must_use]
    pub fn level(mut self, level: u8) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn block_size_class(mut self, block_size_class: u8) -> Self {
        self.block_size_class = Some(block_size_class);
        self
    }

    /// Enables the row-reorder heuristic (default on)
    #[must_use]
    pub fn reorder(mut self, reorder: bool) -> Self {
        self.reorder = Some(reorder);
        self
    }

    /// Minimum number of feature windows per row (default 1)
    #[must_use]
    pub fn window_count(mut self, window_count: usize) -> Self {
        self.window_count = Some(window_count);
        self
    }

    /// Maximum number of alleles per site, clamped to `[2, 15]`
    #[must_use]
    pub fn max_alleles(mut self, max_alleles: usize) -> Self {
        self.max_alleles = Some(max_alleles);
        self
    }

    #[must_use]
    pub fn overflow_policy(mut self, overflow_policy: OverflowPolicy) -> Self {
        self.overflow_policy = Some(overflow_policy);
        self
    }

    /// Reference URL or path recorded in the file
    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn build<W, S>(self, inner: W, subjects: &[S]) -> Result<Writer<W>>
    where
        W: Write + Seek,
        S: AsRef<str>,
    {
        let header = match self.header {
            Some(header) => header,
            None => {
                let mut builder = FileHeaderBuilder::new().phased(self.phased.unwrap_or(false));
                if let Some(compressor) = self.compressor {
                    builder = builder.compressor(compressor);
                }
                if let Some(level) = self.level {
                    builder = builder.level(level);
                }
                if let Some(block_size_class) = self.block_size_class {
                    builder = builder.block_size_class(block_size_class);
                }
                builder.build()?
            }
        };
        Writer::new(
            inner,
            header,
            subjects,
            WriterOptions {
                reorder: self.reorder.unwrap_or(true),
                window_count: self.window_count.unwrap_or(1),
                max_alleles: self.max_alleles.unwrap_or(MAX_ALLELES),
                overflow_policy: self.overflow_policy.unwrap_or_default(),
                reference: self.reference.unwrap_or_default(),
            },
        )
    }
}

/// Write-time options that are not stored in the file header
#[derive(Clone, Debug)]
pub struct WriterOptions {
    pub reorder: bool,
    pub window_count: usize,
    pub max_alleles: usize,
    pub overflow_policy: OverflowPolicy,
    pub reference: String,
}

/// Writer for genotype block files
///
/// A writer owns its sink exclusively and is not thread-safe. Dropping an unfinished
/// writer finishes it; errors raised at that point can only be logged, so callers
/// should call [`finish`](Self::finish) explicitly.
pub struct Writer<W: Write + Seek> {
    /// Inner sink
    inner: W,

    /// File header (rewritten at finish)
    header: FileHeader,

    /// Absolute offset of the header in the sink
    start: u64,

    /// Absolute offset of the next block
    offset: u64,

    /// The block being accumulated
    block: GenotypeBlock,

    /// Compressor shared by all streams
    compressor: Box<dyn Compressor + Send>,

    /// Directory nodes in file order
    nodes: Vec<Node>,

    /// Chromosome table and name lookup
    chromosomes: Vec<String>,
    chromosome_ids: HashMap<String, u32>,

    coder: GenotypeCoder,
    num_subjects: usize,
    max_alleles: usize,
    policy: OverflowPolicy,

    /// Reusable buffers for normalized codes and overflow parts
    codes: Vec<u8>,
    parts: Vec<Variant>,

    num_variants: u64,
    num_dropped: u64,
    finished: bool,
}
impl<W: Write + Seek> Writer<W> {
    /// Creates a writer, reserving the header and writing the reference and subject table
    pub fn new<S: AsRef<str>>(
        mut inner: W,
        header: FileHeader,
        subjects: &[S],
        options: WriterOptions,
    ) -> Result<Self> {
        if options.reference.contains('\n') {
            return Err(WriteError::InvalidReference(options.reference).into());
        }
        for subject in subjects {
            let subject = subject.as_ref();
            if subject.is_empty() || subject.contains(SUBJECT_SEPARATOR) || subject.contains('\n') {
                return Err(WriteError::InvalidSubjectName(subject.to_string()).into());
            }
        }
        let mut compressor = header.compressor_kind()?.build(header.level)?;

        // Reserve the header
        let start = inner.stream_position()?;
        header.write_bytes(&mut inner)?;

        // Reference text
        inner.write_all(options.reference.as_bytes())?;
        inner.write_all(b"\n")?;

        // Subject table
        let names = subjects
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<&str>>()
            .join(SUBJECT_SEPARATOR);
        let mut z_names = Vec::new();
        compressor.compress(names.as_bytes(), &mut z_names)?;
        inner.write_u32::<LittleEndian>(z_names.len() as u32)?;
        inner.write_all(&z_names)?;

        let offset = inner.stream_position()?;
        let phased = header.is_phased();
        let reorderer = Reorderer::new(options.reorder, options.window_count, subjects.len());
        Ok(Self {
            inner,
            header,
            start,
            offset,
            block: GenotypeBlock::new(header.block_rows(), phased, reorderer),
            compressor,
            nodes: Vec::default(),
            chromosomes: Vec::default(),
            chromosome_ids: HashMap::default(),
            coder: GenotypeCoder::new(phased),
            num_subjects: subjects.len(),
            max_alleles: options.max_alleles.clamp(2, MAX_ALLELES),
            policy: options.overflow_policy,
            codes: Vec::default(),
            parts: Vec::default(),
            num_variants: 0,
            num_dropped: 0,
            finished: false,
        })
    }

    /// Returns the header of the writer
    pub fn header(&self) -> FileHeader {
        self.header
    }

    pub fn is_phased(&self) -> bool {
        self.header.is_phased()
    }

    pub fn num_subjects(&self) -> usize {
        self.num_subjects
    }

    /// Number of variants written so far (split parts count individually)
    pub fn num_variants(&self) -> u64 {
        self.num_variants
    }

    /// Number of variants dropped by the overflow policy
    pub fn num_dropped(&self) -> u64 {
        self.num_dropped
    }

    /// Number of nodes flushed so far
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Gets a mutable reference to the underlying sink
    pub fn by_ref(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Writes a variant
    ///
    /// # Returns
    ///
    /// * `Ok(true)` if the variant (or its split parts) was staged
    /// * `Ok(false)` if the variant was dropped by the overflow policy
    /// * `Err(_)` if the variant is invalid, was rejected, or writing failed
    pub fn write(&mut self, variant: &Variant) -> Result<bool> {
        if self.finished {
            return Err(WriteError::AlreadyFinished.into());
        }
        if variant.genotypes.len() != self.num_subjects {
            return Err(WriteError::SampleCountMismatch {
                expected: self.num_subjects,
                found: variant.genotypes.len(),
            }
            .into());
        }

        let alleles = variant.allele_count();
        if alleles <= self.max_alleles {
            self.stage(variant)?;
            return Ok(true);
        }

        let mut parts = std::mem::take(&mut self.parts);
        let admitted = self.policy.handle(variant, self.max_alleles, &mut parts);
        let result = match admitted {
            Ok(true) => parts.iter().try_for_each(|part| self.stage(part)).map(|()| true),
            Ok(false) => {
                warn!(
                    "dropping site {}:{} with {alleles} alleles (maximum {})",
                    variant.chromosome, variant.position, self.max_alleles
                );
                self.num_dropped += 1;
                Ok(false)
            }
            Err(e) => Err(e),
        };
        self.parts = parts;
        result
    }

    /// Validates, normalizes and stages an admitted variant
    fn stage(&mut self, variant: &Variant) -> Result<()> {
        for text in [&variant.reference, &variant.alternative] {
            if text.contains(&ALLELE_SEPARATOR) || text.contains(&ROW_TERMINATOR) {
                return Err(
                    WriteError::InvalidAlleleText(String::from_utf8_lossy(text).into_owned())
                        .into(),
                );
            }
        }
        if variant.chromosome.is_empty() || variant.chromosome.contains('\n') {
            return Err(WriteError::InvalidChromosomeName(variant.chromosome.clone()).into());
        }

        let alleles = variant.allele_count();
        self.codes.clear();
        for code in &variant.genotypes {
            self.codes.push(self.coder.normalize(*code, alleles)?);
        }

        let chromosome = self.chromosome_id(&variant.chromosome);
        if self.block.chromosome().is_some_and(|c| c != chromosome) {
            self.flush()?;
        }
        if self.block.is_full() && self.block.last_position() != Some(variant.position) {
            self.flush()?;
        }
        self.block
            .push(chromosome, variant, &self.codes, alleles <= 2);
        self.num_variants += 1;
        Ok(())
    }

    fn chromosome_id(&mut self, name: &str) -> u32 {
        if let Some(id) = self.chromosome_ids.get(name) {
            return *id;
        }
        let id = self.chromosomes.len() as u32;
        self.chromosomes.push(name.to_string());
        self.chromosome_ids.insert(name.to_string(), id);
        id
    }

    /// Flushes the current block to the sink
    pub fn flush(&mut self) -> Result<()> {
        if let Some(node) = self
            .block
            .flush_to(&mut self.inner, self.offset, &mut *self.compressor)?
        {
            debug!(
                "node {} at offset {} covers [{}, {}]",
                self.nodes.len(),
                node.offset,
                node.min_pos,
                node.max_pos
            );
            self.offset += node.block_len();
            self.nodes.push(node);
        }
        Ok(())
    }

    /// Flushes the last block, writes the directory and rewrites the header
    ///
    /// Finishing twice is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.flush()?;

        Directory::write_trailer(&mut self.inner, &self.chromosomes, &self.nodes)?;
        let directory = Directory::new(self.chromosomes.clone(), &self.nodes)?;

        self.header.set_ordered(directory.all_ordered());
        self.header.max_block_bytes = directory.max_block_bytes();
        self.header.num_variants = self.num_variants;

        let end = self.inner.stream_position()?;
        self.inner.seek(SeekFrom::Start(self.start))?;
        self.header.write_bytes(&mut self.inner)?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;

        info!(
            "finished writer: variants={} dropped={} nodes={} ordered={}",
            self.num_variants,
            self.num_dropped,
            self.nodes.len(),
            self.header.is_ordered()
        );
        Ok(())
    }
}

impl<W: Write + Seek> Drop for Writer<W> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("failed to finish writer on drop: {e}");
        }
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::Error;

    fn sink() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    fn unphased(chromosome: &str, position: u32, alt: &str, gts: &[&str]) -> Variant {
        let coder = GenotypeCoder::UNPHASED;
        Variant::new(
            chromosome,
            position,
            "A",
            alt,
            gts.iter().map(|g| coder.parse(g.as_bytes()).unwrap()).collect(),
            false,
        )
    }

    #[test]
    fn test_header_is_rewritten() {
        let mut buffer = Vec::new();
        {
            let mut writer = WriterBuilder::default()
                .build(Cursor::new(&mut buffer), &["a", "b"])
                .unwrap();
            writer.write(&unphased("1", 10, "C", &["0/1", "1/1"])).unwrap();
            writer.write(&unphased("1", 20, "C", &["0/0", "./."])).unwrap();
            writer.finish().unwrap();
            assert_eq!(writer.num_nodes(), 1);
        }
        let header = FileHeader::from_bytes(&buffer).unwrap();
        assert_eq!(header.num_variants, 2);
        assert!(header.is_ordered());
        assert!(header.max_block_bytes > 0);
    }

    #[test]
    fn test_flush_on_chromosome_change() {
        let mut writer = WriterBuilder::default()
            .build(sink(), &["a"])
            .unwrap();
        writer.write(&unphased("1", 10, "C", &["0/1"])).unwrap();
        writer.write(&unphased("2", 5, "C", &["0/1"])).unwrap();
        assert_eq!(writer.num_nodes(), 1);
        writer.write(&unphased("1", 20, "C", &["0/1"])).unwrap();
        assert_eq!(writer.num_nodes(), 2);
        writer.finish().unwrap();
        assert_eq!(writer.num_nodes(), 3);
    }

    #[test]
    fn test_ties_stay_in_one_block() {
        let mut writer = WriterBuilder::default()
            .block_size_class(1)
            .build(sink(), &["a"])
            .unwrap();
        for position in [1, 2, 2, 2, 3] {
            writer.write(&unphased("1", position, "C", &["0/1"])).unwrap();
        }
        // [1, 2, 2, 2] then [3]
        assert_eq!(writer.num_nodes(), 1);
        writer.finish().unwrap();
        assert_eq!(writer.nodes[0].num_variants(), 4);
        assert_eq!(writer.nodes[1].num_variants(), 1);
    }

    #[test]
    fn test_sample_count_mismatch() {
        let mut writer = WriterBuilder::default()
            .build(sink(), &["a", "b"])
            .unwrap();
        assert!(matches!(
            writer.write(&unphased("1", 10, "C", &["0/1"])),
            Err(Error::WriteError(WriteError::SampleCountMismatch { .. }))
        ));
    }

    #[test]
    fn test_invalid_codes_and_text() {
        let mut writer = WriterBuilder::default()
            .build(sink(), &["a"])
            .unwrap();
        assert!(matches!(
            writer.write(&unphased("1", 10, "C", &["0/2"])),
            Err(Error::CodingError(_))
        ));
        assert!(matches!(
            writer.write(&unphased("1", 10, "C/T", &["0/1"])),
            Err(Error::WriteError(WriteError::InvalidAlleleText(_)))
        ));
        assert!(matches!(
            writer.write(&unphased("", 10, "C", &["0/1"])),
            Err(Error::WriteError(WriteError::InvalidChromosomeName(_)))
        ));
        assert_eq!(writer.num_variants(), 0);
    }

    #[test]
    fn test_invalid_subjects() {
        assert!(WriterBuilder::default()
            .build(sink(), &["a\tb"])
            .is_err());
        assert!(WriterBuilder::default()
            .build(sink(), &[""])
            .is_err());
        assert!(WriterBuilder::default()
            .reference("a\nb")
            .build(sink(), &["a"])
            .is_err());
    }

    #[test]
    fn test_overflow_policies() {
        let site = unphased("1", 10, "C,G,T", &["1/2", "0/3"]);

        let mut writer = WriterBuilder::default()
            .max_alleles(3)
            .build(sink(), &["a", "b"])
            .unwrap();
        assert!(!writer.write(&site).unwrap());
        assert_eq!(writer.num_dropped(), 1);
        assert_eq!(writer.num_variants(), 0);

        let mut writer = WriterBuilder::default()
            .max_alleles(3)
            .overflow_policy(OverflowPolicy::Split)
            .build(sink(), &["a", "b"])
            .unwrap();
        assert!(writer.write(&site).unwrap());
        assert_eq!(writer.num_variants(), 3);

        let mut writer = WriterBuilder::default()
            .max_alleles(3)
            .overflow_policy(OverflowPolicy::Reject)
            .build(sink(), &["a", "b"])
            .unwrap();
        assert!(writer.write(&site).unwrap_err().is_allele_overflow());
    }

    #[test]
    fn test_write_after_finish() {
        let mut writer = WriterBuilder::default()
            .build(sink(), &["a"])
            .unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(matches!(
            writer.write(&unphased("1", 10, "C", &["0/1"])),
            Err(Error::WriteError(WriteError::AlreadyFinished))
        ));
    }
}

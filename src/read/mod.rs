//! # Reading genotype block files
//!
//! A [`Reader`] owns its byte source exclusively and holds exactly one decompressed
//! block at a time. Rows are always handed out in genomic order, whatever order the
//! writer stored them in.
//!
//! Sequential access walks a [`Pointer`] over the node directory. Positional access
//! through [`search`](Reader::search) is supported on chromosomes whose nodes are
//! ordered.
//!
//! ```
//! # use std::io::Cursor;
//! # use gtblock::{GenotypeCoder, Reader, Result, Variant, WriterBuilder};
//! # fn main() -> Result<()> {
//! # let mut buffer = Vec::new();
//! # {
//! #     let mut writer = WriterBuilder::default().build(Cursor::new(&mut buffer), &["s1", "s2"])?;
//! #     let coder = GenotypeCoder::UNPHASED;
//! #     let genotypes = vec![coder.parse(b"0/1")?, coder.parse(b"1/1")?];
//! #     writer.write(&Variant::new("chr1", 100, "A", "G", genotypes, false))?;
//! #     writer.finish()?;
//! # }
//! let mut reader = Reader::new(Cursor::new(buffer.as_slice()))?;
//! reader.select_subjects_by_name(&["s2"])?;
//!
//! let mut variant = Variant::default();
//! while reader.next_into(&mut variant)? {
//!     assert_eq!(variant.genotypes.len(), 1);
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod cursor;
mod subjects;

use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use memmap2::Mmap;

use crate::{
    coding::GroupCoder,
    compress::{Compressor, CompressorKind},
    core::{utils::extension_read, Directory, FileHeader, Node},
    error::{FormatError, ReadError, Result},
    variant::Variant,
    write::SUBJECT_SEPARATOR,
};

use cache::DecompressionCache;
pub use cursor::{NodeBounds, Pointer, TERMINAL};
pub use subjects::SubjectSelection;

/// Reader for genotype block files over any seekable byte source
pub struct Reader<R: Read + Seek> {
    /// Inner byte source
    inner: R,

    header: FileHeader,
    kind: CompressorKind,
    reference: String,

    /// Subject table and node directory, shared between clones
    subjects: Arc<Vec<String>>,
    directory: Arc<Directory>,

    compressor: Box<dyn Compressor + Send>,
    cache: DecompressionCache,
    pointer: Pointer,

    /// Projection of the output subjects (all subjects when unset)
    selection: Option<SubjectSelection>,

    /// Fold phased codes into unphased codes on output
    unphased_output: bool,
}
impl<R: Read + Seek> Reader<R> {
    /// Opens a reader, validating the header, subject table and node directory
    pub fn new(mut inner: R) -> Result<Self> {
        let mut header_buf = [0u8; size_of::<FileHeader>()];
        inner.read_exact(&mut header_buf)?;
        let header = FileHeader::from_bytes(&header_buf)?;
        let kind = header.compressor_kind()?;
        let mut compressor = kind.build(header.level)?;

        let reference = read_reference(&mut inner)?;

        // Subject table
        let z_len = inner.read_u32::<LittleEndian>()?;
        let table_start = inner.stream_position()?;
        let file_len = inner.seek(SeekFrom::End(0))?;
        let table_end = table_start + u64::from(z_len);
        if table_end > file_len {
            return Err(FormatError::Truncated {
                expected: table_end,
                found: file_len,
            }
            .into());
        }
        inner.seek(SeekFrom::Start(table_start))?;
        let z_len = z_len as usize;
        let mut z_names = Vec::new();
        let mut names = Vec::new();
        extension_read(&mut inner, &mut z_names, z_len)?;
        compressor.decompress(&z_names, &mut names)?;
        let names = std::str::from_utf8(&names)?;
        let subjects: Vec<String> = if names.is_empty() {
            Vec::new()
        } else {
            names.split(SUBJECT_SEPARATOR).map(String::from).collect()
        };

        let directory = Directory::read_from(&mut inner, &header)?;
        debug!(
            "opened reader: subjects={} chromosomes={} nodes={} variants={}",
            subjects.len(),
            directory.num_chromosomes(),
            directory.num_nodes(),
            header.num_variants
        );

        let pointer = Pointer::full(&directory);
        let cache = DecompressionCache::new(subjects.len(), header.is_phased());
        Ok(Self {
            inner,
            header,
            kind,
            reference,
            subjects: Arc::new(subjects),
            directory: Arc::new(directory),
            compressor,
            cache,
            pointer,
            selection: None,
            unphased_output: false,
        })
    }

    #[must_use]
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Reference URL or path recorded by the writer
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Whether the stored codes are phased
    #[must_use]
    pub fn is_phased(&self) -> bool {
        self.header.is_phased()
    }

    /// Whether returned variants carry phased codes
    #[must_use]
    pub fn output_phased(&self) -> bool {
        self.header.is_phased() && !self.unphased_output
    }

    #[must_use]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[must_use]
    pub fn chromosomes(&self) -> &[String] {
        self.directory.chromosomes()
    }

    /// All subjects of the file
    #[must_use]
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    #[must_use]
    pub fn num_subjects(&self) -> usize {
        self.subjects.len()
    }

    /// Subjects returned by the reader, in output order
    #[must_use]
    pub fn selected_subjects(&self) -> Vec<&str> {
        match &self.selection {
            Some(selection) => selection
                .ordinals()
                .iter()
                .map(|idx| self.subjects[*idx].as_str())
                .collect(),
            None => self.subjects.iter().map(String::as_str).collect(),
        }
    }

    /// Total number of variants in the file
    #[must_use]
    pub fn num_variants(&self) -> usize {
        self.header.num_variants as usize
    }

    #[must_use]
    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    /// Replaces the cursor
    pub fn set_pointer(&mut self, pointer: Pointer) {
        self.pointer = pointer;
    }

    /// Restricts output to subjects by ordinal, in the given order
    pub fn select_subjects(&mut self, ordinals: &[usize]) -> Result<()> {
        let group = GroupCoder::new(self.header.is_phased());
        self.selection = Some(SubjectSelection::new(
            ordinals,
            self.subjects.len(),
            group,
        )?);
        Ok(())
    }

    /// Restricts output to subjects by name, in the given order
    pub fn select_subjects_by_name<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let ordinals = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.subjects
                    .iter()
                    .position(|s| s == name)
                    .ok_or_else(|| ReadError::UnknownSubject(name.to_string()).into())
            })
            .collect::<Result<Vec<usize>>>()?;
        self.select_subjects(&ordinals)
    }

    /// Returns every subject again
    pub fn select_all_subjects(&mut self) {
        self.selection = None;
    }

    /// Folds phased codes into unphased codes on output
    pub fn set_unphased_output(&mut self, unphased: bool) {
        self.unphased_output = unphased;
    }

    fn resolve_chromosomes<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.directory
                    .chromosome_id(name)
                    .ok_or_else(|| ReadError::UnknownChromosome(name.to_string()).into())
            })
            .collect()
    }

    /// Restricts iteration to the named chromosomes, visited in the given order
    pub fn limit_chromosomes<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let ids = self.resolve_chromosomes(names)?;
        self.pointer = Pointer::new(ids, &self.directory);
        Ok(())
    }

    /// Restricts iteration to the named chromosomes and a node range
    ///
    /// Nodes of the first chromosome start at `start_node`; nodes of the last chromosome
    /// end before `end_node`.
    pub fn limit_nodes<S: AsRef<str>>(
        &mut self,
        names: &[S],
        start_node: usize,
        end_node: usize,
    ) -> Result<()> {
        let ids = self.resolve_chromosomes(names)?;
        self.pointer = Pointer::limited(
            ids,
            NodeBounds {
                start: start_node,
                end: end_node,
            },
            &self.directory,
        );
        Ok(())
    }

    /// Removes every chromosome and node restriction and rewinds
    pub fn clear_limits(&mut self) {
        self.pointer = Pointer::full(&self.directory);
    }

    /// Rewinds to the first variant of the cursor
    pub fn reset(&mut self) {
        self.pointer.rewind(&self.directory);
    }

    /// Jumps to `variant` of `node` on a chromosome
    ///
    /// Returns `false` (and exhausts the cursor) if the target lies outside of the
    /// cursor's limits.
    pub fn seek(&mut self, chromosome: &str, node: usize, variant: usize) -> Result<bool> {
        let list_index = self.list_index(chromosome)?;
        Ok(self
            .pointer
            .seek(list_index, node, variant, &self.directory))
    }

    /// Index of a chromosome in the cursor's chromosome list
    fn list_index(&self, chromosome: &str) -> Result<usize> {
        self.directory
            .chromosome_id(chromosome)
            .and_then(|id| self.pointer.position_of(id))
            .ok_or_else(|| ReadError::UnknownChromosome(chromosome.to_string()).into())
    }

    /// Positions the cursor at the first variant at or after `position`
    ///
    /// Returns `true` if a variant at exactly `position` exists. Otherwise the cursor is
    /// left at the next following variant (possibly on a later chromosome, or exhausted).
    ///
    /// # Errors
    ///
    /// * [`ReadError::UnknownChromosome`] if the chromosome is not visited by the cursor
    /// * [`ReadError::UnsupportedRandomAccess`] if the chromosome's nodes are not ordered
    pub fn search(&mut self, chromosome: &str, position: u32) -> Result<bool> {
        let list_index = self.list_index(chromosome)?;
        let Some(id) = self.pointer.chromosomes().get(list_index).copied() else {
            return Err(ReadError::UnknownChromosome(chromosome.to_string()).into());
        };
        if !self.directory.is_ordered(id) {
            return Err(ReadError::UnsupportedRandomAccess {
                chromosome: chromosome.to_string(),
            }
            .into());
        }

        let range = self.pointer.node_range(list_index, &self.directory);
        let nodes = self.directory.nodes(id);
        if range.is_empty() {
            self.pointer
                .seek_node(list_index + 1, 0, &self.directory);
            return Ok(false);
        }
        if position < nodes[range.start].min_pos {
            self.pointer
                .seek_node(list_index, range.start, &self.directory);
            return Ok(false);
        }
        if position > nodes[range.end - 1].max_pos {
            self.pointer
                .seek_node(list_index, range.end, &self.directory);
            return Ok(false);
        }

        let from = if self.pointer.chromosome_id() == Some(id) {
            self.pointer.node()
        } else {
            range.start
        };
        let (n, _) = walk_nodes(nodes, range, from, position);

        let node = nodes[n];
        if node.min_pos > position {
            debug!(
                "search for {chromosome}:{position} falls between nodes {} and {n}",
                n - 1
            );
            self.pointer.seek_node(list_index, n, &self.directory);
            return Ok(false);
        }

        self.cache.fill(
            &mut self.inner,
            &mut *self.compressor,
            (id, n),
            &node,
            false,
        )?;
        let rows = self.cache.rows();
        let index = rows.partition_point(|row| row.position < position);
        let found = rows.get(index).is_some_and(|row| row.position == position);
        if !self.pointer.seek(list_index, n, index, &self.directory) {
            self.pointer.seek_node(list_index, n + 1, &self.directory);
        }
        Ok(found)
    }

    /// Decodes the variant under the cursor into `variant` and advances
    ///
    /// Returns `false` once the cursor is exhausted, leaving `variant` untouched.
    pub fn next_into(&mut self, variant: &mut Variant) -> Result<bool> {
        let Some(id) = self.pointer.chromosome_id() else {
            return Ok(false);
        };
        let n = self.pointer.node();
        let node = self.directory.nodes(id)[n];
        self.cache
            .fill(&mut self.inner, &mut *self.compressor, (id, n), &node, true)?;

        let index = self.pointer.variant();
        let row = self.cache.rows()[index];
        variant.chromosome.clear();
        variant
            .chromosome
            .push_str(&self.directory.chromosomes()[id]);
        variant.position = row.position;
        variant.reference.clear();
        variant
            .reference
            .extend_from_slice(self.cache.reference(&row));
        variant.alternative.clear();
        variant
            .alternative
            .extend_from_slice(self.cache.alternative(&row));
        variant.genotypes.clear();
        self.cache.decode_genotypes(
            index,
            self.selection.as_ref(),
            self.unphased_output && self.header.is_phased(),
            &mut variant.genotypes,
        )?;
        variant.phased = self.output_phased();

        self.pointer.next(&self.directory);
        Ok(true)
    }

    /// Decodes the variant under the cursor into a new value and advances
    pub fn next_variant(&mut self) -> Result<Option<Variant>> {
        let mut variant = Variant::default();
        if self.next_into(&mut variant)? {
            Ok(Some(variant))
        } else {
            Ok(None)
        }
    }

    /// Iterates the remaining variants of the cursor
    pub fn variants(&mut self) -> Variants<'_, R> {
        Variants { reader: self }
    }
}

/// Walks from node `from` toward the first node of `range` whose end is at or after
/// `position`
///
/// Returns the node reached and the number of nodes stepped over, which is bounded by
/// the distance between `from` and the target node.
fn walk_nodes(nodes: &[Node], range: Range<usize>, from: usize, position: u32) -> (usize, usize) {
    let mut n = from.clamp(range.start, range.end - 1);
    let mut steps = 0;
    while n + 1 < range.end && nodes[n].max_pos < position {
        n += 1;
        steps += 1;
    }
    while n > range.start && nodes[n - 1].max_pos >= position {
        n -= 1;
        steps += 1;
    }
    (n, steps)
}

/// Reads the newline-terminated reference text
fn read_reference<R: Read>(reader: &mut R) -> Result<String> {
    let mut text = Vec::new();
    loop {
        match reader.read_u8() {
            Ok(b'\n') => break,
            Ok(byte) => text.push(byte),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(FormatError::MissingReferenceTerminator.into());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(std::str::from_utf8(&text)?.to_string())
}

impl Reader<BufReader<File>> {
    /// Opens a buffered reader over a file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

/// Iterator over the remaining variants of a [`Reader`]
pub struct Variants<'a, R: Read + Seek> {
    reader: &'a mut Reader<R>,
}
impl<R: Read + Seek> Iterator for Variants<'_, R> {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_variant().transpose()
    }
}

/// A memory map shared between reader clones
#[derive(Clone)]
pub struct SharedMmap(Arc<Mmap>);
impl AsRef<[u8]> for SharedMmap {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A reader over a memory-mapped file
///
/// Clones share the map, subject table and directory but own their cursor, cache and
/// compressor, so each clone can be moved to its own thread.
pub type MmapReader = Reader<Cursor<SharedMmap>>;

impl MmapReader {
    /// Maps a file and opens a reader over it
    pub fn from_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;

        // Safety: the file is open and won't be modified while mapped
        let mmap = unsafe { Mmap::map(&file)? };
        Self::new(Cursor::new(SharedMmap(Arc::new(mmap))))
    }
}

impl Clone for MmapReader {
    fn clone(&self) -> Self {
        Self {
            inner: Cursor::new(self.inner.get_ref().clone()),
            header: self.header,
            kind: self.kind,
            reference: self.reference.clone(),
            subjects: Arc::clone(&self.subjects),
            directory: Arc::clone(&self.directory),
            compressor: self.kind.instantiate(self.header.level),
            cache: DecompressionCache::new(self.subjects.len(), self.header.is_phased()),
            pointer: self.pointer.clone(),
            selection: self.selection.clone(),
            unphased_output: self.unphased_output,
        }
    }
}

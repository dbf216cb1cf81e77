use std::io;

use byteorder::{LittleEndian, WriteBytesExt};
use log::debug;

use crate::{
    compress::Compressor,
    core::Node,
    error::{Result, WriteError},
    variant::Variant,
};

use super::{combine::Combiner, reorder::Reorderer};

/// Delimiter between REF and ALT in the allele stream
pub(crate) const ALLELE_SEPARATOR: u8 = b'\t';

/// Terminator of every row in the allele stream
pub(crate) const ROW_TERMINATOR: u8 = b'/';

/// Converts a stream length to its node field, failing instead of truncating
fn stream_len(stream: &'static str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| WriteError::BlockTooLarge { stream, len }.into())
}

/// A row of the block being accumulated
///
/// Rows are pooled and reused across blocks, so their buffers keep their capacity.
#[derive(Clone, Debug, Default)]
pub(crate) struct StagingRow {
    pub(crate) position: u32,
    pub(crate) reference: Vec<u8>,
    pub(crate) alternative: Vec<u8>,
    pub(crate) genotypes: Vec<u8>,
    pub(crate) features: Vec<u64>,
    pub(crate) biallelic: bool,
}

/// The block currently being accumulated by a writer
///
/// All rows of a block share one chromosome. On flush the rows are reordered, encoded
/// into three independent streams, compressed and streamed to the sink.
pub(crate) struct GenotypeBlock {
    /// Pool of staging rows (only `..active` are live)
    rows: Vec<StagingRow>,
    active: usize,

    /// Chromosome id of the live rows
    chromosome: Option<u32>,

    /// Maximum number of rows before a flush is requested
    capacity: usize,

    reorderer: Reorderer,
    combiner: Combiner,

    /// Storage order of the live rows
    order: Vec<usize>,

    // reusable stream buffers
    genotypes: Vec<u8>,
    positions: Vec<u8>,
    alleles: Vec<u8>,

    // reusable compression buffers
    z_genotypes: Vec<u8>,
    z_positions: Vec<u8>,
    z_alleles: Vec<u8>,
}
impl GenotypeBlock {
    pub fn new(capacity: usize, phased: bool, reorderer: Reorderer) -> Self {
        Self {
            rows: Vec::default(),
            active: 0,
            chromosome: None,
            capacity: capacity.max(1),
            reorderer,
            combiner: Combiner::new(phased),
            order: Vec::default(),
            genotypes: Vec::default(),
            positions: Vec::default(),
            alleles: Vec::default(),
            z_genotypes: Vec::default(),
            z_positions: Vec::default(),
            z_alleles: Vec::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_full(&self) -> bool {
        self.active >= self.capacity
    }

    pub fn chromosome(&self) -> Option<u32> {
        self.chromosome
    }

    /// Position of the most recently staged row
    pub fn last_position(&self) -> Option<u32> {
        self.active
            .checked_sub(1)
            .map(|idx| self.rows[idx].position)
    }

    /// Stages a variant whose codes were already normalized into `genotypes`
    pub fn push(&mut self, chromosome: u32, variant: &Variant, genotypes: &[u8], biallelic: bool) {
        if self.active == self.rows.len() {
            self.rows.push(StagingRow::default());
        }
        let row = &mut self.rows[self.active];
        row.position = variant.position;
        row.reference.clear();
        row.reference.extend_from_slice(&variant.reference);
        row.alternative.clear();
        row.alternative.extend_from_slice(&variant.alternative);
        row.genotypes.clear();
        row.genotypes.extend_from_slice(genotypes);
        row.biallelic = biallelic;
        self.reorderer.fill_features(genotypes, &mut row.features);

        self.chromosome = Some(chromosome);
        self.active += 1;
    }

    /// Clears the live rows, keeping the pool
    pub fn clear(&mut self) {
        self.active = 0;
        self.chromosome = None;
    }

    /// Encodes the live rows into the three streams in storage order
    fn encode_streams(&mut self) -> io::Result<()> {
        let rows = &self.rows[..self.active];
        self.reorderer.sort(rows, &mut self.order);

        self.genotypes.clear();
        self.positions.clear();
        self.alleles.clear();
        for idx in &self.order {
            let row = &rows[*idx];
            self.combiner.combine(row, &mut self.genotypes);
            self.positions.write_u32::<LittleEndian>(row.position)?;
            self.alleles.extend_from_slice(&row.reference);
            self.alleles.push(ALLELE_SEPARATOR);
            self.alleles.extend_from_slice(&row.alternative);
            self.alleles.push(ROW_TERMINATOR);
        }
        Ok(())
    }

    /// Compress all streams into their compressed representation
    fn compress_streams(&mut self, compressor: &mut dyn Compressor) -> Result<()> {
        compressor.compress(&self.genotypes, &mut self.z_genotypes)?;
        compressor.compress(&self.positions, &mut self.z_positions)?;
        compressor.compress(&self.alleles, &mut self.z_alleles)?;
        Ok(())
    }

    fn write<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.z_genotypes)?;
        writer.write_all(&self.z_positions)?;
        writer.write_all(&self.z_alleles)?;
        Ok(())
    }

    /// Processes the live rows and streams the compressed block to `writer`
    ///
    /// `offset` is the absolute file offset the block will be written at. Returns the
    /// directory node of the block, or `None` if the block was empty.
    pub fn flush_to<W: io::Write>(
        &mut self,
        writer: &mut W,
        offset: u64,
        compressor: &mut dyn Compressor,
    ) -> Result<Option<Node>> {
        let Some(chromosome) = self.chromosome.filter(|_| !self.is_empty()) else {
            return Ok(None);
        };

        // bounds and row groups
        let rows = &self.rows[..self.active];
        let min_pos = rows.iter().map(|r| r.position).min().unwrap_or(0);
        let max_pos = rows.iter().map(|r| r.position).max().unwrap_or(0);
        let num_biallelic = rows.iter().filter(|r| r.biallelic).count();
        let num_multiallelic = rows.len() - num_biallelic;

        // reorder, combine and serialize
        self.encode_streams()?;

        // compress each stream
        self.compress_streams(compressor)?;

        let node = Node {
            offset,
            chromosome,
            min_pos,
            max_pos,
            len_z_genotypes: stream_len("compressed genotype", self.z_genotypes.len())?,
            len_z_positions: stream_len("compressed position", self.z_positions.len())?,
            len_z_alleles: stream_len("compressed allele", self.z_alleles.len())?,
            len_genotypes: stream_len("genotype", self.genotypes.len())?,
            len_alleles: stream_len("allele", self.alleles.len())?,
            num_biallelic: num_biallelic as u32,
            num_multiallelic: num_multiallelic as u32,
        };
        debug!(
            "flushed block: chromosome={chromosome} rows={} biallelic={num_biallelic} z_genotypes={} z_positions={} z_alleles={}",
            self.active,
            node.len_z_genotypes,
            node.len_z_positions,
            node.len_z_alleles,
        );

        // write the compressed streams to the inner writer
        self.write(writer)?;

        // clear the internal state
        self.clear();

        Ok(Some(node))
    }
}

//! # gtblock
//!
//! A block-compressed, randomly accessible binary format for population genotype
//! matrices (sites × subjects).
//!
//! Every call is stored as a one-byte genotype code. Biallelic rows are packed several
//! codes per byte, rows inside a block are permuted for compression locality, and three
//! independent streams (genotypes, positions, alleles) are compressed per block. A node
//! directory at the end of the file enables positional search on ordered chromosomes.
//!
//! * [`Writer`] / [`WriterBuilder`] accumulate and flush blocks.
//! * [`Reader`] / [`MmapReader`] iterate, seek and search, always in genomic order.
//! * [`ParallelReader`] distributes nodes of a memory-mapped file over threads.
//! * [`VcfFormatter`] renders decoded variants as VCF text.
//!
//! ```
//! # use std::io::Cursor;
//! # use gtblock::{GenotypeCoder, Reader, Result, Variant, VcfFormatter, WriterBuilder};
//! # fn main() -> Result<()> {
//! let coder = GenotypeCoder::PHASED;
//! let mut buffer = Vec::new();
//! {
//!     let mut writer = WriterBuilder::default()
//!         .phased(true)
//!         .build(Cursor::new(&mut buffer), &["NA12878", "NA12891"])?;
//!     for (position, gts) in [(1_000, [b"0|1", b"1|1"]), (2_000, [b"1|0", b"0|0"])] {
//!         let genotypes = gts.iter().map(|g| coder.parse(*g)).collect::<Result<Vec<u8>>>()?;
//!         writer.write(&Variant::new("chr20", position, "A", "G", genotypes, true))?;
//!     }
//!     writer.finish()?;
//! }
//!
//! let mut reader = Reader::new(Cursor::new(buffer.as_slice()))?;
//! assert!(reader.search("chr20", 2_000)?);
//!
//! let mut formatter = VcfFormatter::new(true);
//! let mut line = Vec::new();
//! if let Some(variant) = reader.next_variant()? {
//!     formatter.format(&variant, &mut line)?;
//! }
//! assert!(line.starts_with(b"chr20\t2000\t."));
//! # Ok(())
//! # }
//! ```

pub mod coding;
pub mod compress;
pub mod core;
pub mod error;
pub mod format;
pub mod parallel;
pub mod policy;
pub mod read;
pub mod variant;
pub mod write;

pub use coding::{GenotypeCoder, GroupCoder, MAX_ALLELES, MISSING};
pub use compress::{Compressor, CompressorKind};
pub use crate::core::{Directory, FileHeader, FileHeaderBuilder, Node, MAX_BLOCK_SIZE_CLASS};
pub use error::{
    CodingError, Error, FormatError, IntoGtblockError, ReadError, Result, TransformError,
    WriteError,
};
pub use format::VcfFormatter;
pub use parallel::{ParallelProcessor, ParallelReader};
pub use policy::OverflowPolicy;
pub use read::{MmapReader, Reader};
pub use variant::{AlleleStats, Variant};
pub use write::{Writer, WriterBuilder, WriterOptions};

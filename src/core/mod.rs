//! # On-disk layout
//!
//! A genotype block file is sealed at close and never modified afterward.
//!
//! ```text
//! ┌─────────────────────────┐
//! │       File Header       │ 32 bytes (rewritten at close)
//! ├─────────────────────────┤
//! │     Reference text      │ '\n' terminated
//! ├─────────────────────────┤
//! │     Subject table       │ u32 length + compressed names
//! ├─────────────────────────┤
//! │ z(genotypes)            │
//! │ z(positions)            │ one triplet per node
//! │ z(alleles)              │
//! ├─────────────────────────┤
//! │          ...            │ more triplets
//! ├─────────────────────────┤
//! │     Node directory      │ 48 bytes per node
//! ├─────────────────────────┤
//! │    Chromosome table     │ '\n' joined names
//! ├─────────────────────────┤
//! │         Footer          │ 8 bytes
//! └─────────────────────────┘
//! ```
//!
//! The offsets of the block triplets are only recorded in the [`Node`] directory.

mod header;
mod node;
pub(crate) mod utils;

pub use header::{FileHeader, FileHeaderBuilder};
pub use node::{Directory, Footer, Node};

/// The magic number for genotype block files.
pub const FILE_MAGIC: &[u8; 7] = b"GTBFILE";

/// The current file version.
pub const FILE_VERSION: u8 = 1;

/// The default block size class (`1 << 13` rows per block).
pub const DEFAULT_BLOCK_SIZE_CLASS: u8 = 13;

/// The largest supported block size class (`1 << 16` rows per block).
pub const MAX_BLOCK_SIZE_CLASS: u8 = 16;

/// Header flag: genotypes are phased
pub const FLAG_PHASED: u8 = 1 << 0;

/// Header flag: every chromosome's nodes are disjoint and increasing
pub const FLAG_ORDERED: u8 = 1 << 1;

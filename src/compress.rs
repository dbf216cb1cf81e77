//! Pluggable byte compressors
//!
//! Every block stream, the subject table and nothing else passes through a
//! [`Compressor`]. The compressor is chosen by an integer id stored in the file header,
//! together with a level that must fall in the compressor's valid range.

use std::io::{self, Read, Write};
use std::ops::RangeInclusive;

use auto_impl::auto_impl;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use zstd::{stream::copy_decode, zstd_safe};

use crate::error::{FormatError, Result};

/// A compress/decompress black box over reusable buffers
#[auto_impl(&mut, Box)]
pub trait Compressor {
    /// The kind of this compressor (written to the file header)
    fn kind(&self) -> CompressorKind;

    /// Compresses `src`, replacing the contents of `dst`
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()>;

    /// Decompresses `src`, replacing the contents of `dst`
    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()>;
}

/// Registry of the available compressors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressorKind {
    /// ZSTD (id 0)
    #[default]
    Zstd,

    /// zlib deflate (id 1)
    Deflate,
}
impl CompressorKind {
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Zstd => 0,
            Self::Deflate => 1,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::Zstd),
            1 => Ok(Self::Deflate),
            _ => Err(FormatError::UnknownCompressor(id).into()),
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Zstd => "zstd",
            Self::Deflate => "deflate",
        }
    }

    /// The valid compression levels of this compressor
    #[must_use]
    pub const fn levels(self) -> RangeInclusive<u8> {
        match self {
            Self::Zstd => 1..=22,
            Self::Deflate => 0..=9,
        }
    }

    #[must_use]
    pub const fn default_level(self) -> u8 {
        match self {
            Self::Zstd => 3,
            Self::Deflate => 6,
        }
    }

    pub fn validate_level(self, level: u8) -> Result<()> {
        let levels = self.levels();
        if levels.contains(&level) {
            Ok(())
        } else {
            Err(FormatError::InvalidCompressionLevel {
                compressor: self.name(),
                level,
                min: *levels.start(),
                max: *levels.end(),
            }
            .into())
        }
    }

    /// Builds a compressor of this kind at the given level
    pub fn build(self, level: u8) -> Result<Box<dyn Compressor + Send>> {
        self.validate_level(level)?;
        Ok(self.instantiate(level))
    }

    /// Builds a compressor for a level that was already validated
    pub(crate) fn instantiate(self, level: u8) -> Box<dyn Compressor + Send> {
        match self {
            Self::Zstd => Box::new(ZstdCompressor::new(level)),
            Self::Deflate => Box::new(DeflateCompressor::new(level)),
        }
    }
}

/// ZSTD compressor with a reusable compression context
pub struct ZstdCompressor {
    level: i32,
    cctx: zstd_safe::CCtx<'static>,
}
impl ZstdCompressor {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self {
            level: i32::from(level),
            cctx: zstd_safe::CCtx::create(),
        }
    }
}
impl Compressor for ZstdCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Zstd
    }

    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        // determine the maximum compressed size
        let max_z_size = zstd_safe::compress_bound(src.len());
        dst.clear();
        dst.resize(max_z_size, 0);

        let true_size = self
            .cctx
            .compress(dst, src, self.level)
            .map_err(|e| io::Error::other(zstd_safe::get_error_name(e)))?;

        // clip to the true size
        dst.truncate(true_size);
        Ok(())
    }

    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        dst.clear();
        copy_decode(src, &mut *dst)?;
        Ok(())
    }
}

/// zlib deflate compressor
pub struct DeflateCompressor {
    level: u8,
}
impl DeflateCompressor {
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self { level }
    }
}
impl Compressor for DeflateCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Deflate
    }

    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        dst.clear();
        let mut encoder = ZlibEncoder::new(dst, Compression::new(u32::from(self.level)));
        encoder.write_all(src)?;
        encoder.finish()?;
        Ok(())
    }

    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        dst.clear();
        ZlibDecoder::new(src).read_to_end(dst)?;
        Ok(())
    }
}

use std::io::Write;

use bytemuck::{Pod, Zeroable};

use crate::{
    compress::CompressorKind,
    error::{FormatError, Result},
};

use super::{
    DEFAULT_BLOCK_SIZE_CLASS, FILE_MAGIC, FILE_VERSION, FLAG_ORDERED, FLAG_PHASED,
    MAX_BLOCK_SIZE_CLASS,
};

/// The fixed-size header at the start of every genotype block file
///
/// This is stored identically in memory and on disk. The writer reserves it on open and
/// rewrites it at close once the variant count, the ordered flag and the largest block
/// size are known.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct FileHeader {
    // File Type Metadata (8 bytes)
    /// File magic number
    magic: [u8; 7],
    /// File version number
    pub version: u8,

    // Configuration (8 bytes)
    /// Bitfield of [`FLAG_PHASED`] and [`FLAG_ORDERED`]
    pub flags: u8,
    /// Compressor id
    pub compressor: u8,
    /// Compression level
    pub level: u8,
    /// Rows per block are `1 << block_size_class`
    pub block_size_class: u8,
    /// Reserved for future use
    reserved: [u8; 4],

    // Statistics (16 bytes)
    /// Largest decompressed block (genotypes + positions + alleles) in bytes
    pub max_block_bytes: u64,
    /// Total number of variants in the file
    pub num_variants: u64,
}
impl Default for FileHeader {
    fn default() -> Self {
        let compressor = CompressorKind::default();
        Self {
            magic: *FILE_MAGIC,
            version: FILE_VERSION,
            flags: 0,
            compressor: compressor.id(),
            level: compressor.default_level(),
            block_size_class: DEFAULT_BLOCK_SIZE_CLASS,
            reserved: [0; 4],
            max_block_bytes: 0,
            num_variants: 0,
        }
    }
}

/// Flag getters and setters
impl FileHeader {
    pub fn set_phased(&mut self, phased: bool) {
        if phased {
            self.flags |= FLAG_PHASED;
        } else {
            self.flags &= !FLAG_PHASED;
        }
    }
    pub fn set_ordered(&mut self, ordered: bool) {
        if ordered {
            self.flags |= FLAG_ORDERED;
        } else {
            self.flags &= !FLAG_ORDERED;
        }
    }
    #[must_use]
    pub fn is_phased(&self) -> bool {
        self.flags & FLAG_PHASED != 0
    }
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.flags & FLAG_ORDERED != 0
    }
}

impl FileHeader {
    /// The compressor recorded in the header
    pub fn compressor_kind(&self) -> Result<CompressorKind> {
        CompressorKind::from_id(self.compressor)
    }

    /// Maximum number of rows per block
    #[must_use]
    pub fn block_rows(&self) -> usize {
        1 << self.block_size_class
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Reads and validates a header from the first bytes of a file
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < size_of::<Self>() {
            return Err(FormatError::Truncated {
                expected: size_of::<Self>() as u64,
                found: bytes.len() as u64,
            }
            .into());
        }
        let header: Self = bytemuck::pod_read_unaligned(&bytes[..size_of::<Self>()]);
        if header.magic != *FILE_MAGIC {
            return Err(FormatError::InvalidMagic(header.magic).into());
        }
        if header.version != FILE_VERSION {
            return Err(FormatError::InvalidFormatVersion(header.version).into());
        }
        header.compressor_kind()?.validate_level(header.level)?;
        if header.block_size_class > MAX_BLOCK_SIZE_CLASS {
            return Err(FormatError::InvalidBlockSizeClass(header.block_size_class).into());
        }
        Ok(header)
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

/// Builder for [`FileHeader`]
///
/// ```
/// # use gtblock::{CompressorKind, FileHeaderBuilder, Result};
/// # fn main() -> Result<()> {
/// let header = FileHeaderBuilder::new()
///     .phased(true)
///     .compressor(CompressorKind::Deflate)
///     .level(9)
///     .block_size_class(10)
///     .build()?;
/// assert!(header.is_phased());
/// assert_eq!(header.block_rows(), 1024);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct FileHeaderBuilder {
    phased: Option<bool>,
    compressor: Option<CompressorKind>,
    level: Option<u8>,
    block_size_class: Option<u8>,
}
impl FileHeaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    pub fn build(self) -> Result<FileHeader> {
        let compressor = self.compressor.unwrap_or_default();
        let level = self.level.unwrap_or(compressor.default_level());
        compressor.validate_level(level)?;

        let block_size_class = self.block_size_class.unwrap_or(DEFAULT_BLOCK_SIZE_CLASS);
        if block_size_class > MAX_BLOCK_SIZE_CLASS {
            return Err(FormatError::InvalidBlockSizeClass(block_size_class).into());
        }

        let mut header = FileHeader {
            compressor: compressor.id(),
            level,
            block_size_class,
            ..FileHeader::default()
        };
        header.set_phased(self.phased.unwrap_or(false));
        Ok(header)
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::Error;

    #[test]
    fn test_header_size() {
        assert_eq!(size_of::<FileHeader>(), 32);
    }

    #[test]
    fn test_default_header() {
        let header = FileHeaderBuilder::new().build().unwrap();
        assert!(!header.is_phased());
        assert!(!header.is_ordered());
        assert_eq!(header.compressor_kind().unwrap(), CompressorKind::Zstd);
        assert_eq!(header.level, 3);
        assert_eq!(header.block_rows(), 1 << DEFAULT_BLOCK_SIZE_CLASS);
    }

    #[test]
    fn test_header_bytes() {
        let mut header = FileHeaderBuilder::new()
            .phased(true)
            .compressor(CompressorKind::Deflate)
            .build()
            .unwrap();
        header.set_ordered(true);
        header.num_variants = 12;
        header.max_block_bytes = 4096;

        let mut buffer = vec![0xAA];
        header.write_bytes(&mut buffer).unwrap();
        let parsed = FileHeader::from_bytes(&buffer[1..]).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.is_phased());
        assert!(parsed.is_ordered());
        assert_eq!(parsed.level, 6);
    }

    #[test]
    fn test_invalid_options() {
        assert!(FileHeaderBuilder::new().level(0).build().is_err());
        assert!(FileHeaderBuilder::new()
            .compressor(CompressorKind::Deflate)
            .level(12)
            .build()
            .is_err());
        assert!(FileHeaderBuilder::new()
            .block_size_class(MAX_BLOCK_SIZE_CLASS + 1)
            .build()
            .is_err());
    }

    #[test]
    fn test_invalid_bytes() {
        let header = FileHeader::default();
        let mut bytes = header.as_bytes().to_vec();
        bytes[0] = b'X';
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(Error::FormatError(FormatError::InvalidMagic(_)))
        ));

        let mut bytes = header.as_bytes().to_vec();
        bytes[9] = 42;
        assert!(matches!(
            FileHeader::from_bytes(&bytes),
            Err(Error::FormatError(FormatError::UnknownCompressor(42)))
        ));

        assert!(matches!(
            FileHeader::from_bytes(&header.as_bytes()[..10]),
            Err(Error::FormatError(FormatError::Truncated { .. }))
        ));
    }
}

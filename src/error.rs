use std::error::Error as StdError;

/// Custom Result type for gtblock operations, wrapping the custom [`Error`] type
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the gtblock library, encompassing all possible error cases
/// that can occur while encoding, writing, reading or transforming genotype data.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Genotype codes or allele indices outside of their valid domain
    #[error("Error in genotype coding: {0}")]
    CodingError(#[from] CodingError),

    /// The file does not match the expected header or directory shape
    #[error("Error processing file format: {0}")]
    FormatError(#[from] FormatError),

    /// Errors that occur during write operations
    #[error("Error writing file: {0}")]
    WriteError(#[from] WriteError),

    /// Errors that occur during read operations
    #[error("Error reading file: {0}")]
    ReadError(#[from] ReadError),

    /// Errors that occur while transforming variants
    #[error("Error transforming variant: {0}")]
    TransformError(#[from] TransformError),

    /// Standard I/O errors
    #[error("Error with IO: {0}")]
    IoError(#[from] std::io::Error),

    /// UTF-8 conversion errors
    #[error("Error with UTF8: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Generic errors for other unexpected situations
    #[error("Generic error: {0}")]
    GenericError(#[from] Box<dyn StdError + Send + Sync>),
}
impl Error {
    /// Checks if the error was raised because a site carries more alleles than allowed
    ///
    /// This is the only error class with a meaningful recovery: the caller may drop or
    /// split the offending site and continue.
    #[must_use]
    pub fn is_allele_overflow(&self) -> bool {
        matches!(self, Self::WriteError(WriteError::AlleleOverflow { .. }))
    }

    /// Checks if the error was raised by a positional search on unordered data
    ///
    /// Callers receiving this error must fall back to a sequential scan.
    #[must_use]
    pub fn is_unsupported_random_access(&self) -> bool {
        matches!(
            self,
            Self::ReadError(ReadError::UnsupportedRandomAccess { .. })
        )
    }
}

/// Errors raised by the genotype coding tables
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CodingError {
    /// An allele index is outside of `[0, max)`
    #[error("Allele index {index} is out of range (maximum {max} alleles)")]
    AlleleIndexOutOfRange { index: usize, max: usize },

    /// A genotype code is outside of `[0, 225]`
    #[error("Invalid genotype code: {0}")]
    InvalidCode(u8),

    /// A combined code does not unpack under the configured radix
    #[error("Invalid combined code {code} (phased: {phased})")]
    InvalidCombinedCode { code: u8, phased: bool },

    /// A genotype code refers to an allele the site does not carry
    #[error("Genotype code {code} references allele {allele} but the site has {alleles} alleles")]
    CodeExceedsAlleles { code: u8, allele: u8, alleles: usize },

    /// Genotype text could not be parsed
    #[error("Invalid genotype text: {0}")]
    InvalidGenotypeText(String),

    /// Only haploid and diploid genotypes are supported
    #[error("Unsupported ploidy: {0} - expecting [1,2]")]
    InvalidPloidy(u8),
}

/// Errors specific to validating the on-disk layout
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// The magic number in the header does not match the expected value
    #[error("Invalid file magic: {0:?}")]
    InvalidMagic([u8; 7]),

    /// The format version in the header is not supported
    #[error("Invalid format version: {0}")]
    InvalidFormatVersion(u8),

    /// The compressor id in the header is unknown
    #[error("Unknown compressor id: {0}")]
    UnknownCompressor(u8),

    /// The compression level is outside of the compressor's range
    #[error("Compression level {level} is outside of the valid range [{min},{max}] for {compressor}")]
    InvalidCompressionLevel {
        compressor: &'static str,
        level: u8,
        min: u8,
        max: u8,
    },

    /// The block size class is outside of the supported range
    #[error("Invalid block size class: {0} - expecting [0,16]")]
    InvalidBlockSizeClass(u8),

    /// The variant count in the header disagrees with the node directory
    #[error("Header records {expected} variants but the node directory holds {found}")]
    VariantCountMismatch { expected: u64, found: u64 },

    /// A node refers to a chromosome missing from the chromosome table
    #[error("Node refers to chromosome id {id} but only {count} chromosomes are known")]
    UnknownChromosomeId { id: u32, count: usize },

    /// The file is too short to hold the structures it declares
    #[error("File is truncated: expected at least {expected} bytes, found {found}")]
    Truncated { expected: u64, found: u64 },

    /// A decompressed stream has an unexpected length
    #[error("Decompressed {stream} stream holds {found} bytes, expected {expected}")]
    StreamLengthMismatch {
        stream: &'static str,
        expected: usize,
        found: usize,
    },

    /// The allele stream is missing delimiters
    #[error("Malformed allele stream at row {0}")]
    MalformedAlleles(usize),

    /// The reference line is missing its terminator
    #[error("Missing newline after reference text")]
    MissingReferenceTerminator,
}

/// Errors that can occur while reading genotype blocks
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    /// Positional search was requested on a chromosome that is not ordered
    #[error("Chromosome {chromosome} is not ordered - positional search is unsupported")]
    UnsupportedRandomAccess { chromosome: String },

    /// A chromosome name is not present in the file (or not in the active cursor)
    #[error("Unknown chromosome: {0}")]
    UnknownChromosome(String),

    /// A subject name is not present in the file
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    /// A subject ordinal is outside of the file's subject range
    #[error("Requested subject index ({requested_index}) is out of subject range ({max_index})")]
    SubjectOutOfRange {
        requested_index: usize,
        max_index: usize,
    },

    /// A node index is outside of the directory
    #[error("Requested node index ({requested_index}) is out of node range ({max_index})")]
    NodeOutOfRange {
        requested_index: usize,
        max_index: usize,
    },

    /// A node range has its start after its end
    #[error("Invalid node range: {start}..{end}")]
    InvalidRange { start: usize, end: usize },

    /// A worker thread panicked during parallel processing
    #[error("Worker thread {0} panicked")]
    WorkerPanicked(usize),
}

/// Errors that can occur while writing genotype blocks
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    /// A site carries more alleles than the configured maximum
    #[error("Site carries {alleles} alleles but the maximum is {max}")]
    AlleleOverflow { alleles: usize, max: usize },

    /// A variant's genotype count disagrees with the subject table
    #[error("Variant has {found} genotypes but the file has {expected} subjects")]
    SampleCountMismatch { expected: usize, found: usize },

    /// Allele text contains a byte reserved by the allele stream
    #[error("Allele text contains a reserved delimiter: {0}")]
    InvalidAlleleText(String),

    /// A subject name contains a byte reserved by the subject table
    #[error("Subject name contains a reserved delimiter: {0}")]
    InvalidSubjectName(String),

    /// A chromosome name contains a byte reserved by the chromosome table
    #[error("Chromosome name contains a reserved delimiter: {0}")]
    InvalidChromosomeName(String),

    /// Reference text contains a newline
    #[error("Reference text contains a newline: {0}")]
    InvalidReference(String),

    /// Attempted to write after the writer was finished
    #[error("Writer is already finished")]
    AlreadyFinished,

    /// A block stream does not fit the 32-bit length fields of its node
    #[error("Block {stream} stream of {len} bytes exceeds the node length limit")]
    BlockTooLarge { stream: &'static str, len: usize },
}

/// Errors that can occur while transforming variants
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    /// Parts handed to `join` do not describe the same site
    #[error("Cannot join variants: mismatched {0}")]
    IncompatibleParts(&'static str),

    /// `join` requires at least one part
    #[error("Cannot join an empty set of variants")]
    NoParts,

    /// The operation requires a biallelic site
    #[error("Operation requires a biallelic site but found {0} alleles")]
    NotBiallelic(usize),

    /// An allele of the site is missing from the target allele list
    #[error("Allele {0} is missing from the target allele list")]
    MissingAllele(String),
}

/// Trait for converting arbitrary errors into `Error`
pub trait IntoGtblockError {
    fn into_gtblock_error(self) -> Error;
}

// Implement conversion for Box<dyn Error>
impl<E> IntoGtblockError for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_gtblock_error(self) -> Error {
        Error::GenericError(Box::new(self))
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum MyError {
        #[error("Custom error: {0}")]
        CustomError(String),
    }

    #[test]
    fn test_into_gtblock_error() {
        let my_error = MyError::CustomError(String::from("some error"));
        let error = my_error.into_gtblock_error();
        assert!(matches!(error, Error::GenericError(_)));
    }

    #[test]
    fn test_is_allele_overflow() {
        let error: Error = WriteError::AlleleOverflow {
            alleles: 20,
            max: 15,
        }
        .into();
        assert!(error.is_allele_overflow());
        assert!(!error.is_unsupported_random_access());
    }

    #[test]
    fn test_is_unsupported_random_access() {
        let error: Error = ReadError::UnsupportedRandomAccess {
            chromosome: "chr1".to_string(),
        }
        .into();
        assert!(error.is_unsupported_random_access());
        assert!(!error.is_allele_overflow());
    }

    #[test]
    fn test_coding_error_messages() {
        let error = CodingError::AlleleIndexOutOfRange { index: 16, max: 15 };
        let error_str = format!("{error}");
        assert!(error_str.contains("16"));
        assert!(error_str.contains("15"));

        let error = CodingError::InvalidCombinedCode {
            code: 200,
            phased: true,
        };
        assert!(format!("{error}").contains("phased"));
    }

    #[test]
    fn test_format_error_messages() {
        let error = FormatError::VariantCountMismatch {
            expected: 10,
            found: 8,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("10"));
        assert!(error_str.contains('8'));

        let error = FormatError::InvalidBlockSizeClass(40);
        assert!(format!("{error}").contains("40"));
    }

    #[test]
    fn test_read_error_subject_out_of_range() {
        let error = ReadError::SubjectOutOfRange {
            requested_index: 150,
            max_index: 100,
        };
        let error_str = format!("{error}");
        assert!(error_str.contains("150"));
        assert!(error_str.contains("100"));
    }

    #[test]
    fn test_error_conversions() {
        let error: Error = CodingError::InvalidCode(250).into();
        assert!(matches!(error, Error::CodingError(_)));

        let error: Error = FormatError::UnknownCompressor(9).into();
        assert!(matches!(error, Error::FormatError(_)));

        let error: Error = TransformError::NoParts.into();
        assert!(matches!(error, Error::TransformError(_)));

        let error: Error = std::io::Error::other("boom").into();
        assert!(matches!(error, Error::IoError(_)));
    }
}

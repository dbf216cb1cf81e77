use std::io::{Read, Seek, SeekFrom, Write};

use bytemuck::{Pod, Zeroable};

use crate::error::{FormatError, Result};

use super::FileHeader;

/// Directory record of one compressed block
///
/// This is stored identically in memory and on disk. A node is created once when its
/// block is flushed and never changes afterward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Node {
    /// Absolute file offset of the block triplet
    pub offset: u64,

    /// Index into the chromosome table
    pub chromosome: u32,
    /// Smallest position in the block
    pub min_pos: u32,
    /// Largest position in the block
    pub max_pos: u32,

    // length of compressed streams
    pub(crate) len_z_genotypes: u32,
    pub(crate) len_z_positions: u32,
    pub(crate) len_z_alleles: u32,

    // length of decompressed variable streams
    pub(crate) len_genotypes: u32,
    pub(crate) len_alleles: u32,

    /// Number of biallelic rows (stored first)
    pub num_biallelic: u32,
    /// Number of multiallelic rows
    pub num_multiallelic: u32,
}
impl Node {
    /// Number of variants stored in the node
    #[must_use]
    pub fn num_variants(&self) -> usize {
        self.num_biallelic as usize + self.num_multiallelic as usize
    }

    /// Length of the compressed triplet in bytes
    #[must_use]
    pub fn block_len(&self) -> u64 {
        u64::from(self.len_z_genotypes)
            + u64::from(self.len_z_positions)
            + u64::from(self.len_z_alleles)
    }

    /// Length of the decompressed position stream in bytes
    #[must_use]
    pub fn len_positions(&self) -> usize {
        self.num_variants() * size_of::<u32>()
    }

    /// Length of all three decompressed streams in bytes
    #[must_use]
    pub fn decompressed_len(&self) -> u64 {
        u64::from(self.len_genotypes) + self.len_positions() as u64 + u64::from(self.len_alleles)
    }

    /// Whether the position lies within `[min_pos, max_pos]`
    #[must_use]
    pub fn contains(&self, position: u32) -> bool {
        self.min_pos <= position && position <= self.max_pos
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// The fixed-width trailer at the end of every file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
#[repr(C)]
pub struct Footer {
    /// Length of the chromosome table in bytes
    pub chromosome_table_len: u32,
    /// Number of nodes in the directory
    pub num_nodes: u32,
}
impl Footer {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    /// Length of the directory, chromosome table and footer in bytes
    #[must_use]
    pub fn trailer_len(&self) -> u64 {
        u64::from(self.num_nodes) * size_of::<Node>() as u64
            + u64::from(self.chromosome_table_len)
            + size_of::<Self>() as u64
    }
}

/// The node directory, grouped by chromosome
///
/// Nodes keep their file order within each chromosome. A chromosome is *ordered* when
/// every node's range lies strictly before the next node's range, which is the
/// precondition for positional search.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    chromosomes: Vec<String>,
    nodes: Vec<Vec<Node>>,
    ordered: Vec<bool>,
    num_nodes: usize,
}
impl Directory {
    /// Groups a flat list of nodes (in file order) by chromosome
    pub fn new(chromosomes: Vec<String>, flat: &[Node]) -> Result<Self> {
        let mut nodes = vec![Vec::new(); chromosomes.len()];
        for node in flat {
            let Some(group) = nodes.get_mut(node.chromosome as usize) else {
                return Err(FormatError::UnknownChromosomeId {
                    id: node.chromosome,
                    count: chromosomes.len(),
                }
                .into());
            };
            group.push(*node);
        }
        let ordered = nodes
            .iter()
            .map(|group: &Vec<Node>| group.windows(2).all(|w| w[0].max_pos < w[1].min_pos))
            .collect();
        Ok(Self {
            chromosomes,
            nodes,
            ordered,
            num_nodes: flat.len(),
        })
    }

    /// Writes the node directory, the chromosome table and the footer
    pub fn write_trailer<W: Write>(
        writer: &mut W,
        chromosomes: &[String],
        nodes: &[Node],
    ) -> Result<()> {
        let table = chromosomes.join("\n");
        writer.write_all(bytemuck::cast_slice(nodes))?;
        writer.write_all(table.as_bytes())?;
        let footer = Footer {
            chromosome_table_len: table.len() as u32,
            num_nodes: nodes.len() as u32,
        };
        writer.write_all(footer.as_bytes())?;
        Ok(())
    }

    /// Reads the trailer from the end of a file and validates it against the header
    pub fn read_from<R: Read + Seek>(reader: &mut R, header: &FileHeader) -> Result<Self> {
        let file_len = reader.seek(SeekFrom::End(0))?;
        let min_len = (size_of::<FileHeader>() + size_of::<Footer>()) as u64;
        if file_len < min_len {
            return Err(FormatError::Truncated {
                expected: min_len,
                found: file_len,
            }
            .into());
        }

        let mut footer_buf = [0u8; size_of::<Footer>()];
        reader.seek(SeekFrom::Start(file_len - size_of::<Footer>() as u64))?;
        reader.read_exact(&mut footer_buf)?;
        let footer = Footer::from_bytes(&footer_buf);

        let trailer_len = footer.trailer_len();
        if trailer_len + size_of::<FileHeader>() as u64 > file_len {
            return Err(FormatError::Truncated {
                expected: trailer_len + size_of::<FileHeader>() as u64,
                found: file_len,
            }
            .into());
        }
        let trailer_start = file_len - trailer_len;

        reader.seek(SeekFrom::Start(trailer_start))?;
        let mut node_buf = vec![0u8; footer.num_nodes as usize * size_of::<Node>()];
        reader.read_exact(&mut node_buf)?;
        let flat: Vec<Node> = node_buf
            .chunks_exact(size_of::<Node>())
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let mut table_buf = vec![0u8; footer.chromosome_table_len as usize];
        reader.read_exact(&mut table_buf)?;
        let table = std::str::from_utf8(&table_buf)?;
        let chromosomes = if table.is_empty() {
            Vec::new()
        } else {
            table.split('\n').map(String::from).collect()
        };

        // every block triplet must end before the trailer
        for node in &flat {
            let end = node.offset + node.block_len();
            if end > trailer_start {
                return Err(FormatError::Truncated {
                    expected: end,
                    found: trailer_start,
                }
                .into());
            }
        }

        let directory = Self::new(chromosomes, &flat)?;
        let found = directory.num_variants() as u64;
        if found != header.num_variants {
            return Err(FormatError::VariantCountMismatch {
                expected: header.num_variants,
                found,
            }
            .into());
        }
        Ok(directory)
    }

    #[must_use]
    pub fn chromosomes(&self) -> &[String] {
        &self.chromosomes
    }

    #[must_use]
    pub fn num_chromosomes(&self) -> usize {
        self.chromosomes.len()
    }

    /// Returns the index of a chromosome by name
    #[must_use]
    pub fn chromosome_id(&self, name: &str) -> Option<usize> {
        self.chromosomes.iter().position(|c| c == name)
    }

    /// Returns the nodes of a chromosome in file order
    #[must_use]
    pub fn nodes(&self, chromosome: usize) -> &[Node] {
        self.nodes.get(chromosome).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn node(&self, chromosome: usize, node: usize) -> Option<&Node> {
        self.nodes.get(chromosome)?.get(node)
    }

    #[must_use]
    pub fn is_ordered(&self, chromosome: usize) -> bool {
        self.ordered.get(chromosome).copied().unwrap_or(false)
    }

    /// Whether every chromosome is ordered
    #[must_use]
    pub fn all_ordered(&self) -> bool {
        self.ordered.iter().all(|o| *o)
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[must_use]
    pub fn num_variants(&self) -> usize {
        self.nodes.iter().flatten().map(Node::num_variants).sum()
    }

    /// Largest decompressed block in bytes
    #[must_use]
    pub fn max_block_bytes(&self) -> u64 {
        self.nodes
            .iter()
            .flatten()
            .map(Node::decompressed_len)
            .max()
            .unwrap_or(0)
    }

    /// Iterates `(chromosome, node index, node)` in chromosome order
    pub fn iter_nodes(&self) -> impl Iterator<Item = (usize, usize, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(c, group)| group.iter().enumerate().map(move |(n, node)| (c, n, node)))
    }
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use crate::core::FileHeaderBuilder;

    fn node(chromosome: u32, min_pos: u32, max_pos: u32, rows: u32) -> Node {
        Node {
            chromosome,
            min_pos,
            max_pos,
            num_biallelic: rows,
            ..Node::default()
        }
    }

    #[test]
    fn test_struct_sizes() {
        assert_eq!(size_of::<Node>(), 48);
        assert_eq!(size_of::<Footer>(), 8);
    }

    #[test]
    fn test_ordered_flags() {
        let chromosomes = vec!["chr1".to_string(), "chr2".to_string()];
        let flat = [
            node(0, 10, 20, 2),
            node(1, 5, 50, 3),
            node(0, 30, 40, 1),
            node(1, 50, 60, 1),
        ];
        let directory = Directory::new(chromosomes, &flat).unwrap();
        assert!(directory.is_ordered(0));
        assert!(!directory.is_ordered(1));
        assert!(!directory.all_ordered());
        assert_eq!(directory.nodes(0).len(), 2);
        assert_eq!(directory.num_variants(), 7);
        assert_eq!(directory.chromosome_id("chr2"), Some(1));
        assert!(directory.chromosome_id("chrX").is_none());
    }

    #[test]
    fn test_unknown_chromosome_id() {
        let result = Directory::new(vec!["chr1".to_string()], &[node(3, 1, 2, 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_trailer_round_trip() {
        let mut header = FileHeaderBuilder::new().build().unwrap();
        header.num_variants = 5;
        let chromosomes = vec!["1".to_string(), "2".to_string()];
        let flat = [node(0, 1, 2, 2), node(1, 3, 4, 3)];

        let mut buffer = Cursor::new(Vec::new());
        header.write_bytes(&mut buffer).unwrap();
        Directory::write_trailer(&mut buffer, &chromosomes, &flat).unwrap();

        let directory = Directory::read_from(&mut buffer, &header).unwrap();
        assert_eq!(directory.chromosomes(), chromosomes.as_slice());
        assert_eq!(directory.nodes(1), &flat[1..]);
        assert_eq!(directory.num_nodes(), 2);

        header.num_variants = 6;
        assert!(matches!(
            Directory::read_from(&mut buffer, &header),
            Err(crate::Error::FormatError(
                FormatError::VariantCountMismatch { .. }
            ))
        ));
    }
}

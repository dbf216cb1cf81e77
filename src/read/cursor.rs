use std::ops::Range;

use crate::core::Directory;

/// Sentinel chromosome index of an exhausted cursor
pub const TERMINAL: usize = usize::MAX;

/// Half-open node bounds of a limited cursor
///
/// `start` restricts the first chromosome of the cursor and `end` restricts the last.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeBounds {
    pub start: usize,
    pub end: usize,
}

/// A `(chromosome, node, variant)` position over a list of chromosomes
///
/// The chromosome index addresses the cursor's own chromosome list, not the file's
/// chromosome table. Navigation never panics: invalid targets move the cursor to the
/// terminal state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pointer {
    /// Chromosome ids visited in order
    chromosomes: Vec<usize>,
    /// Optional node bounds on the first and last chromosome
    bounds: Option<NodeBounds>,

    chromosome: usize,
    node: usize,
    variant: usize,
}
impl Pointer {
    /// Creates a cursor over `chromosomes`, positioned at the first variant
    #[must_use]
    pub fn new(chromosomes: Vec<usize>, directory: &Directory) -> Self {
        let mut pointer = Self {
            chromosomes,
            bounds: None,
            chromosome: TERMINAL,
            node: 0,
            variant: 0,
        };
        pointer.rewind(directory);
        pointer
    }

    /// Creates a cursor over every chromosome of the file
    #[must_use]
    pub fn full(directory: &Directory) -> Self {
        Self::new((0..directory.num_chromosomes()).collect(), directory)
    }

    /// Creates a limited cursor
    ///
    /// Nodes of the first chromosome start at `bounds.start`; nodes of the last
    /// chromosome end before `bounds.end`.
    #[must_use]
    pub fn limited(chromosomes: Vec<usize>, bounds: NodeBounds, directory: &Directory) -> Self {
        let mut pointer = Self {
            chromosomes,
            bounds: Some(bounds),
            chromosome: TERMINAL,
            node: 0,
            variant: 0,
        };
        pointer.rewind(directory);
        pointer
    }

    /// Chromosome ids visited by this cursor
    #[must_use]
    pub fn chromosomes(&self) -> &[usize] {
        &self.chromosomes
    }

    #[must_use]
    pub fn bounds(&self) -> Option<NodeBounds> {
        self.bounds
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.chromosome == TERMINAL
    }

    /// Index into the cursor's chromosome list
    #[must_use]
    pub fn chromosome_index(&self) -> usize {
        self.chromosome
    }

    /// File chromosome id of the current position
    #[must_use]
    pub fn chromosome_id(&self) -> Option<usize> {
        self.chromosomes.get(self.chromosome).copied()
    }

    #[must_use]
    pub fn node(&self) -> usize {
        self.node
    }

    #[must_use]
    pub fn variant(&self) -> usize {
        self.variant
    }

    /// Index of a chromosome id in the cursor's list
    #[must_use]
    pub fn position_of(&self, chromosome_id: usize) -> Option<usize> {
        self.chromosomes.iter().position(|c| *c == chromosome_id)
    }

    /// The nodes of list entry `index` visible to this cursor
    #[must_use]
    pub fn node_range(&self, index: usize, directory: &Directory) -> Range<usize> {
        let Some(id) = self.chromosomes.get(index) else {
            return 0..0;
        };
        let mut start = 0;
        let mut end = directory.nodes(*id).len();
        if let Some(bounds) = self.bounds {
            if index == 0 {
                start = start.max(bounds.start);
            }
            if index + 1 == self.chromosomes.len() {
                end = end.min(bounds.end);
            }
        }
        start..end.max(start)
    }

    pub fn terminate(&mut self) {
        self.chromosome = TERMINAL;
        self.node = 0;
        self.variant = 0;
    }

    /// Moves to the first visible variant
    pub fn rewind(&mut self, directory: &Directory) {
        self.chromosome = 0;
        self.node = self.node_range(0, directory).start;
        self.variant = 0;
        self.settle(directory);
    }

    /// Moves forward until the position addresses an existing variant
    fn settle(&mut self, directory: &Directory) {
        while self.chromosome < self.chromosomes.len() {
            let range = self.node_range(self.chromosome, directory);
            let id = self.chromosomes[self.chromosome];
            self.node = self.node.max(range.start);
            while self.node < range.end {
                let rows = directory.nodes(id)[self.node].num_variants();
                if self.variant < rows {
                    return;
                }
                self.node += 1;
                self.variant = 0;
            }
            self.chromosome += 1;
            self.node = 0;
            self.variant = 0;
        }
        self.terminate();
    }

    /// Advances to the next variant, returning `false` once the cursor is exhausted
    pub fn next(&mut self, directory: &Directory) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.variant += 1;
        self.settle(directory);
        !self.is_terminal()
    }

    /// Jumps to `(chromosome index, node, variant)`
    ///
    /// Targets outside of the cursor's chromosome list, node bounds or node size move
    /// the cursor to the terminal state and return `false`.
    pub fn seek(
        &mut self,
        chromosome: usize,
        node: usize,
        variant: usize,
        directory: &Directory,
    ) -> bool {
        let valid = self.chromosomes.get(chromosome).is_some_and(|id| {
            self.node_range(chromosome, directory).contains(&node)
                && variant < directory.nodes(*id)[node].num_variants()
        });
        if valid {
            self.chromosome = chromosome;
            self.node = node;
            self.variant = variant;
        } else {
            self.terminate();
        }
        valid
    }

    /// Moves to the first variant at or after `(chromosome index, node)`
    ///
    /// Rolls over to later nodes and chromosomes, or to the terminal state.
    pub fn seek_node(&mut self, chromosome: usize, node: usize, directory: &Directory) {
        if chromosome >= self.chromosomes.len() {
            self.terminate();
            return;
        }
        self.chromosome = chromosome;
        self.node = node;
        self.variant = 0;
        self.settle(directory);
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::core::Node;

    /// chrA: nodes of 2 and 1 rows, chrB: no nodes, chrC: one node of 3 rows
    fn directory() -> Directory {
        let node = |chromosome: u32, min_pos: u32, rows: u32| Node {
            chromosome,
            min_pos,
            max_pos: min_pos + rows,
            num_biallelic: rows,
            ..Node::default()
        };
        Directory::new(
            vec!["chrA".to_string(), "chrB".to_string(), "chrC".to_string()],
            &[node(0, 10, 2), node(0, 20, 1), node(2, 5, 3)],
        )
        .unwrap()
    }

    fn walk(pointer: &mut Pointer, directory: &Directory) -> Vec<(usize, usize, usize)> {
        let mut visited = Vec::new();
        while !pointer.is_terminal() {
            visited.push((
                pointer.chromosome_id().unwrap(),
                pointer.node(),
                pointer.variant(),
            ));
            pointer.next(directory);
        }
        visited
    }

    #[test]
    fn test_full_walk() {
        let directory = directory();
        let mut pointer = Pointer::full(&directory);
        assert_eq!(
            walk(&mut pointer, &directory),
            vec![
                (0, 0, 0),
                (0, 0, 1),
                (0, 1, 0),
                (2, 0, 0),
                (2, 0, 1),
                (2, 0, 2)
            ]
        );
        assert!(!pointer.next(&directory));
    }

    #[test]
    fn test_limited_walk() {
        let directory = directory();
        let mut pointer = Pointer::limited(
            vec![0, 1, 2],
            NodeBounds { start: 1, end: 0 },
            &directory,
        );
        assert_eq!(walk(&mut pointer, &directory), vec![(0, 1, 0)]);

        let mut pointer = Pointer::limited(vec![0], NodeBounds { start: 0, end: 1 }, &directory);
        assert_eq!(
            walk(&mut pointer, &directory),
            vec![(0, 0, 0), (0, 0, 1)]
        );
    }

    #[test]
    fn test_empty_cursor() {
        let directory = directory();
        let pointer = Pointer::new(vec![1], &directory);
        assert!(pointer.is_terminal());
        let pointer = Pointer::new(Vec::new(), &directory);
        assert!(pointer.is_terminal());
    }

    #[test]
    fn test_seek() {
        let directory = directory();
        let mut pointer = Pointer::full(&directory);
        assert!(pointer.seek(2, 0, 2, &directory));
        assert_eq!(pointer.chromosome_id(), Some(2));
        assert!(!pointer.next(&directory));

        assert!(!pointer.seek(0, 0, 2, &directory));
        assert!(pointer.is_terminal());
        assert!(!pointer.seek(7, 0, 0, &directory));
        assert!(!pointer.seek(1, 0, 0, &directory));

        pointer.rewind(&directory);
        assert_eq!((pointer.chromosome_index(), pointer.node()), (0, 0));

        pointer.seek_node(0, 2, &directory);
        assert_eq!(pointer.chromosome_id(), Some(2));
        pointer.seek_node(5, 0, &directory);
        assert!(pointer.is_terminal());
    }

    #[test]
    fn test_clone_is_independent() {
        let directory = directory();
        let mut pointer = Pointer::full(&directory);
        let snapshot = pointer.clone();
        pointer.next(&directory);
        assert_ne!(pointer, snapshot);
        assert_eq!(snapshot.variant(), 0);
    }
}

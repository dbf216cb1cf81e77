use std::ops::Range;
use std::thread;

use crate::{
    error::ReadError,
    read::{MmapReader, NodeBounds, Pointer},
    variant::Variant,
    Result,
};

/// Trait for genotype readers that can process variants in parallel
///
/// This is implemented by the **reader** not by the **processor**.
/// For the **processor**, see the [`ParallelProcessor`] trait.
///
/// Work is distributed in units of directory nodes. Nodes are addressed by their flat
/// index in chromosome order (see [`Directory::iter_nodes`](crate::Directory::iter_nodes)).
pub trait ParallelReader {
    /// Processes every node of the reader's file in parallel
    ///
    /// A `num_threads` of zero uses one thread per available CPU.
    fn process_parallel<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
    ) -> Result<()>;

    /// Process nodes in parallel within a specified range
    ///
    /// The range is split into contiguous spans of nodes, one per thread.
    ///
    /// # Arguments
    ///
    /// * `processor` - The processor to use for each variant
    /// * `num_threads` - The number of threads to spawn
    /// * `range` - The range of flat node indices to process
    fn process_parallel_range<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()>;

    /// Validates a node range against the number of nodes in the file
    fn validate_range(&self, total_nodes: usize, range: &Range<usize>) -> Result<()> {
        if range.start >= total_nodes {
            Err(ReadError::NodeOutOfRange {
                requested_index: range.start,
                max_index: total_nodes,
            }
            .into())
        } else if range.end > total_nodes {
            Err(ReadError::NodeOutOfRange {
                requested_index: range.end,
                max_index: total_nodes,
            }
            .into())
        } else if range.start > range.end {
            Err(ReadError::InvalidRange {
                start: range.start,
                end: range.end,
            }
            .into())
        } else {
            Ok(())
        }
    }
}

/// Trait for types that can process variants in parallel.
///
/// This is implemented by the **processor** not by the **reader**.
/// For the **reader**, see the [`ParallelReader`] trait.
pub trait ParallelProcessor: Send + Clone {
    /// Process a single variant
    fn process_variant(&mut self, variant: &Variant) -> Result<()>;

    /// Called when a thread finishes processing a node
    /// Default implementation does nothing
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Set the thread ID for this processor
    ///
    /// Each thread should call this method with its own unique ID.
    fn set_tid(&mut self, _tid: usize) {
        // Default implementation does nothing
    }

    /// Get the thread ID for this processor
    fn get_tid(&self) -> Option<usize> {
        None
    }
}

impl ParallelReader for MmapReader {
    fn process_parallel<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        let num_nodes = self.directory().num_nodes();
        if num_nodes == 0 {
            return Ok(());
        }
        self.process_parallel_range(processor, num_threads, 0..num_nodes)
    }

    fn process_parallel_range<P: ParallelProcessor + Clone + 'static>(
        self,
        processor: P,
        num_threads: usize,
        range: Range<usize>,
    ) -> Result<()> {
        self.validate_range(self.directory().num_nodes(), &range)?;
        if range.is_empty() {
            return Ok(());
        }

        // Calculate the number of threads to use
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads.min(num_cpus::get())
        };
        let nodes_per_thread = range.len().div_ceil(num_threads);

        // (chromosome, node) of every flat node index
        let coordinates: Vec<(usize, usize)> = self
            .directory()
            .iter_nodes()
            .map(|(c, n, _)| (c, n))
            .collect();

        // Build thread handles
        let mut handles = Vec::new();
        for tid in 0..num_threads {
            let start = range.start + tid * nodes_per_thread;
            let end = (start + nodes_per_thread).min(range.end);
            if start >= end {
                break; // No nodes for this thread
            }

            let (first_chromosome, first_node) = coordinates[start];
            let (last_chromosome, last_node) = coordinates[end - 1];
            let pointer = Pointer::limited(
                (first_chromosome..=last_chromosome).collect(),
                NodeBounds {
                    start: first_node,
                    end: last_node + 1,
                },
                self.directory(),
            );

            let mut reader = self.clone();
            reader.set_pointer(pointer);
            let mut processor = processor.clone();
            processor.set_tid(tid);

            let handle = thread::spawn(move || -> Result<()> {
                let mut variant = Variant::default();
                let mut batch = None;
                loop {
                    let key = (reader.pointer().chromosome_id(), reader.pointer().node());
                    if batch.is_some_and(|b| b != key) {
                        processor.on_batch_complete()?;
                    }
                    if !reader.next_into(&mut variant)? {
                        break;
                    }
                    batch = Some(key);
                    processor.process_variant(&variant)?;
                }
                Ok(())
            });
            handles.push((tid, handle));
        }

        for (tid, handle) in handles {
            handle
                .join()
                .map_err(|_| ReadError::WorkerPanicked(tid))??;
        }
        Ok(())
    }
}

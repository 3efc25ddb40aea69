//! Input/output collaborators: the paired read supplier and the paired
//! writer, plus in-memory implementations used by tests and tools.

pub mod fastq_supplier;
pub mod sam_writer;

use std::io;

use crate::aligner::{PairedResult, SingleResult};
use crate::reads::{Read, ReadPair};

pub use fastq_supplier::PairedFastqSupplier;
pub use sam_writer::SamPairWriter;

/// Streams read pairs in input order; consecutive pairs with the same
/// barcode form a group and a barcode change marks a boundary. The
/// aligner never re-sorts.
pub trait PairedReadSupplier: Send {
    /// The next read pair, or `None` at end of input.
    fn next_pair(&mut self) -> io::Result<Option<(Read, Read)>>;
}

/// Receives one call per pair with every surviving record. Appends must be
/// externally synchronized when shared across workers.
pub trait PairedWriter: Send {
    fn write_pairs(
        &mut self,
        pair: &ReadPair,
        results: &[PairedResult],
        single_results: [&[SingleResult]; 2],
        first_is_primary: bool,
    ) -> io::Result<()>;
}

/// Supplier over an in-memory list of pairs.
pub struct MemorySupplier {
    pairs: std::vec::IntoIter<(Read, Read)>,
}

impl MemorySupplier {
    pub fn new(pairs: Vec<(Read, Read)>) -> Self {
        MemorySupplier {
            pairs: pairs.into_iter(),
        }
    }
}

impl PairedReadSupplier for MemorySupplier {
    fn next_pair(&mut self) -> io::Result<Option<(Read, Read)>> {
        Ok(self.pairs.next())
    }
}

/// One emitted pair captured by [`CollectingWriter`].
#[derive(Debug)]
pub struct EmittedPair {
    pub id: String,
    pub results: Vec<PairedResult>,
    pub single_results: [Vec<SingleResult>; 2],
    pub first_is_primary: bool,
}

/// Writer that keeps everything in memory; the test double for the writer
/// collaborator.
#[derive(Default)]
pub struct CollectingWriter {
    pub pairs: Vec<EmittedPair>,
}

impl PairedWriter for CollectingWriter {
    fn write_pairs(
        &mut self,
        pair: &ReadPair,
        results: &[PairedResult],
        single_results: [&[SingleResult]; 2],
        first_is_primary: bool,
    ) -> io::Result<()> {
        self.pairs.push(EmittedPair {
            id: pair.reads[0].id.clone(),
            results: results.to_vec(),
            single_results: [single_results[0].to_vec(), single_results[1].to_vec()],
            first_is_primary,
        });
        Ok(())
    }
}

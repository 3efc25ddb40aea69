//! Per-barcode working set: one progress record per pair plus the result
//! buffers, all sized together.
//!
//! The progress record consolidates what would otherwise be a set of
//! parallel arrays keyed by pair index (done flags, capacities, counters,
//! usefulness bits); a single vector of records cannot disagree with
//! itself on length.

use crate::aligner::arena::{BufferArena, Region};
use crate::aligner::pair_aligner::{AlignerParams, PairAligner};
use crate::aligner::{PairedResult, SingleResult};
use crate::reads::ReadPair;

/// Initial secondary-buffer capacity when secondary reporting is enabled.
/// Reallocation on overflow makes a small starting value cheap.
pub const INITIAL_SECONDARY_CAPACITY: i64 = 32;

/// Mutable per-pair state driven across the stages.
pub struct PairProgress {
    /// The pair still needs work in the current stage.
    pub not_done: bool,
    /// Usefulness of each mate (long enough, few enough Ns).
    pub useful: [bool; 2],
    /// The pair's single-pair aligner and its candidate pool.
    pub aligner: PairAligner,
    /// Paired secondaries currently admitted for this pair.
    pub max_paired_secondary: i64,
    /// Single secondaries currently admitted for this pair (both mates).
    pub max_single_secondary: i64,
    /// Paired secondaries stored in the result buffer.
    pub n_secondary: i64,
    /// Single secondaries stored per mate.
    pub n_single_secondary: [i64; 2],
}

/// All per-pair state for one barcode, allocated together and released
/// together. Indices in `[0, len())` are valid for every member.
pub struct BarcodeBatch {
    pub pairs: Vec<ReadPair>,
    pub progress: Vec<PairProgress>,
    /// Primary at `[0]`, secondaries after; outside the arena because they
    /// grow by doubling.
    pub results: Vec<Vec<PairedResult>>,
    pub single_results: Vec<[Vec<SingleResult>; 2]>,
}

impl BarcodeBatch {
    /// Assemble the batch, carving one scratch region per pair out of the
    /// arena. Returns `None` if the arena reservation cannot cover the
    /// batch (the reservation formula makes that impossible for batches
    /// within `max_barcode_size`).
    pub fn new(
        pairs: Vec<ReadPair>,
        useful: Vec<[bool; 2]>,
        params: AlignerParams,
        scratch_words: usize,
        initial_secondary: i64,
        arena: &mut BufferArena,
    ) -> Option<Self> {
        debug_assert_eq!(pairs.len(), useful.len());
        let n = pairs.len();
        let mut progress = Vec::with_capacity(n);
        for mate_useful in useful {
            let region: Region = arena.alloc(scratch_words)?;
            progress.push(PairProgress {
                not_done: true,
                useful: mate_useful,
                aligner: PairAligner::new(params, region),
                max_paired_secondary: initial_secondary,
                max_single_secondary: initial_secondary,
                n_secondary: 0,
                n_single_secondary: [0, 0],
            });
        }
        let results = (0..n).map(|_| Vec::new()).collect();
        let single_results = (0..n).map(|_| [Vec::new(), Vec::new()]).collect();
        Some(BarcodeBatch {
            pairs,
            progress,
            results,
            single_results,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

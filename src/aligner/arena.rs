//! Bulk-reservation scratch arena for a barcode's working set.
//!
//! One contiguous reservation is made per worker, sized by the pure
//! reservation functions below, and handed out as index regions: one per
//! pair aligner plus one shared region for the cluster-level rescoring
//! scratch. Canary words guard every region boundary and are verified at
//! each stage boundary. The arena is released all at once at the end of
//! the barcode (reset, keeping the reservation for the next one).
//!
//! Secondary-result buffers live outside the arena because they grow by
//! doubling on overflow.

use std::fmt;

use crate::align_opt::AlignOpt;
use crate::aligner::edit_distance::DistanceKernel;
use crate::aligner::MAX_READ_LENGTH;

/// Guard word planted at every region boundary.
pub const CANARY: i32 = 0x5EED_F00D;

/// An index range into the arena, held by its user across stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    start: usize,
    len: usize,
}

impl Region {
    /// An empty region for states that never touch the arena.
    pub const EMPTY: Region = Region { start: 0, len: 0 };

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Canary mismatch: something wrote past its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaCorruption {
    /// Word index of the first damaged canary.
    pub index: usize,
}

impl fmt::Display for ArenaCorruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arena canary overwritten at word {}; scratch buffer overrun",
            self.index
        )
    }
}

impl std::error::Error for ArenaCorruption {}

/// A flat scratch buffer with bump allocation and canary guards.
pub struct BufferArena {
    words: Vec<i32>,
    cursor: usize,
    canaries: Vec<usize>,
}

impl BufferArena {
    /// Reserve `words` scratch words up front.
    pub fn with_reservation(words: usize) -> Self {
        let mut arena = BufferArena {
            words: vec![0; words.max(1)],
            cursor: 0,
            canaries: Vec::new(),
        };
        arena.reset();
        arena
    }

    /// Total words reserved.
    pub fn reserved(&self) -> usize {
        self.words.len()
    }

    /// Carve out `len` words, guarded by a trailing canary.
    /// Returns `None` when the reservation is exhausted.
    pub fn alloc(&mut self, len: usize) -> Option<Region> {
        let end = self.cursor.checked_add(len)?;
        if end + 1 > self.words.len() {
            return None;
        }
        let region = Region {
            start: self.cursor,
            len,
        };
        self.words[end] = CANARY;
        self.canaries.push(end);
        self.cursor = end + 1;
        Some(region)
    }

    /// Mutable view of a previously allocated region.
    pub fn region_mut(&mut self, region: Region) -> &mut [i32] {
        &mut self.words[region.start..region.start + region.len]
    }

    /// Verify every canary word.
    pub fn check_canaries(&self) -> Result<(), ArenaCorruption> {
        for &idx in &self.canaries {
            if self.words[idx] != CANARY {
                return Err(ArenaCorruption { index: idx });
            }
        }
        Ok(())
    }

    /// Release everything allocated so far, keeping the reservation.
    pub fn reset(&mut self) {
        self.cursor = 1;
        self.canaries.clear();
        self.words[0] = CANARY;
        self.canaries.push(0);
    }
}

/// Words one pair aligner's scoring scratch requires: two DP rows for the
/// widest text window, plus the region's guard word.
pub fn single_aligner_reservation(opt: &AlignOpt) -> usize {
    let text_len = MAX_READ_LENGTH + opt.score_limit() as usize;
    DistanceKernel::scratch_words(text_len) + 1
}

/// Words the cluster-level machinery requires: one shared rescoring
/// scratch of the same shape, plus the arena's leading guard word.
pub fn cluster_aligner_reservation(opt: &AlignOpt) -> usize {
    single_aligner_reservation(opt) + 1
}

/// Total reservation for one worker:
/// `cluster_aligner_reservation + max_barcode_size * single_aligner_reservation`.
pub fn barcode_reservation(opt: &AlignOpt) -> usize {
    cluster_aligner_reservation(opt) + opt.max_barcode_size * single_aligner_reservation(opt)
}

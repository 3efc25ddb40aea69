//! Candidate placements produced by seeding and consumed by scoring.

use std::fmt;

use crate::genome::{Direction, GenomeLocation};

/// A hypothesized placement of one mate, accumulated from seed hits.
#[derive(Debug, Clone, Copy)]
pub struct MateCandidate {
    pub location: GenomeLocation,
    pub direction: Direction,
    /// Number of seeds voting for this placement.
    pub weight: u32,
}

/// A hypothesized joint placement of both mates with spacing in range.
#[derive(Debug, Clone, Copy)]
pub struct PairedCandidate {
    pub location: [GenomeLocation; 2],
    pub direction: [Direction; 2],
    /// Combined seed evidence of the two mates.
    pub weight: u32,
}

impl PairedCandidate {
    /// Leftmost of the two mate locations; the pair's anchor point for
    /// clustering.
    #[inline]
    pub fn anchor(&self) -> GenomeLocation {
        self.location[0].min(self.location[1])
    }
}

/// A paired candidate with per-mate edit-distance scores.
#[derive(Debug, Clone, Copy)]
pub struct ScoredPairCandidate {
    pub candidate: PairedCandidate,
    pub score: [i32; 2],
}

impl ScoredPairCandidate {
    #[inline]
    pub fn pair_score(&self) -> i32 {
        self.score[0] + self.score[1]
    }
}

/// A single-mate candidate with its edit-distance score.
#[derive(Debug, Clone, Copy)]
pub struct ScoredSingleCandidate {
    pub location: GenomeLocation,
    pub direction: Direction,
    pub score: i32,
}

/// Fatal-for-this-pair condition: the bounded candidate pool filled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePoolOverflow {
    pub capacity: usize,
}

impl fmt::Display for CandidatePoolOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidate pool capacity {} exhausted; rerun with a larger --max-candidate-pool-size",
            self.capacity
        )
    }
}

impl std::error::Error for CandidatePoolOverflow {}

/// Bounded pool of paired candidates for one read pair.
#[derive(Debug)]
pub struct CandidatePool {
    entries: Vec<PairedCandidate>,
    capacity: usize,
}

impl CandidatePool {
    pub fn new(capacity: usize) -> Self {
        CandidatePool {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn try_push(&mut self, candidate: PairedCandidate) -> Result<(), CandidatePoolOverflow> {
        if self.entries.len() >= self.capacity {
            return Err(CandidatePoolOverflow {
                capacity: self.capacity,
            });
        }
        self.entries.push(candidate);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PairedCandidate] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Genome coordinate types shared across the aligner.
//!
//! Locations are 64-bit offsets into the concatenated reference, with a
//! sentinel value for "no placement". Strand is carried separately as a
//! [`Direction`].

use std::fmt;

/// Offset into the concatenated reference genome.
pub type GenomeLocation = u64;

/// Sentinel location meaning "no placement".
pub const INVALID_GENOME_LOCATION: GenomeLocation = u64::MAX;

/// Returns true if `loc` denotes a real placement.
#[inline]
pub fn is_valid_location(loc: GenomeLocation) -> bool {
    loc != INVALID_GENOME_LOCATION
}

/// Strand of an alignment: the read matched the reference as given, or as
/// its reverse complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    ReverseComplement,
}

impl Direction {
    /// The opposite strand.
    #[inline]
    pub fn flipped(self) -> Direction {
        match self {
            Direction::Forward => Direction::ReverseComplement,
            Direction::ReverseComplement => Direction::Forward,
        }
    }

    /// True for the reverse-complement strand.
    #[inline]
    pub fn is_reverse(self) -> bool {
        matches!(self, Direction::ReverseComplement)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "+"),
            Direction::ReverseComplement => write!(f, "-"),
        }
    }
}

/// One contig of the concatenated reference.
#[derive(Debug, Clone)]
pub struct ContigSpan {
    /// Contig name as it appeared in the reference FASTA.
    pub name: String,
    /// Start offset of this contig in the concatenated space.
    pub offset: GenomeLocation,
    /// Contig length in bases.
    pub length: u64,
}

impl ContigSpan {
    /// True if `loc` falls inside this contig.
    #[inline]
    pub fn contains(&self, loc: GenomeLocation) -> bool {
        loc >= self.offset && loc < self.offset + self.length
    }
}

/// Locate the contig holding `loc` in a table sorted by offset.
///
/// Returns the contig index and the 0-based offset within the contig, or
/// `None` when `loc` is the invalid sentinel or past the end of the genome.
pub fn contig_at(contigs: &[ContigSpan], loc: GenomeLocation) -> Option<(usize, u64)> {
    if !is_valid_location(loc) || contigs.is_empty() {
        return None;
    }
    let idx = contigs.partition_point(|c| c.offset <= loc).checked_sub(1)?;
    let contig = &contigs[idx];
    if contig.contains(loc) {
        Some((idx, loc - contig.offset))
    } else {
        None
    }
}

//! Read and read-pair types, usefulness screening, ID matching, and the
//! emission filter policy.

use crate::aligner::AlignmentStatus;

/// A single sequencing read. Immutable after input.
#[derive(Debug, Clone)]
pub struct Read {
    /// Read identifier (without the leading '@').
    pub id: String,
    /// Bases in {A, C, G, T, N}, uppercase.
    pub seq: Vec<u8>,
    /// Per-base Phred+33 qualities, same length as `seq`.
    pub qual: Vec<u8>,
    /// Molecule barcode this read belongs to, if tagged.
    pub barcode: Option<String>,
}

impl Read {
    pub fn new(id: impl Into<String>, seq: &[u8], qual: &[u8], barcode: Option<String>) -> Self {
        Read {
            id: id.into(),
            seq: seq.to_ascii_uppercase(),
            qual: qual.to_vec(),
            barcode,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Number of ambiguous bases.
    pub fn count_of_ns(&self) -> usize {
        self.seq.iter().filter(|&&b| b == b'N').count()
    }

    /// A read is useful iff it is long enough to seed and clean enough to
    /// score within the edit-distance bound.
    pub fn is_useful(&self, min_read_length: usize, max_edit_distance: i32) -> bool {
        self.len() >= min_read_length && self.count_of_ns() as i32 <= max_edit_distance
    }

    /// Reverse complement of the sequence. N maps to N.
    pub fn reverse_complement(&self) -> Vec<u8> {
        self.seq
            .iter()
            .rev()
            .map(|&b| match b {
                b'A' => b'T',
                b'C' => b'G',
                b'G' => b'C',
                b'T' => b'A',
                _ => b'N',
            })
            .collect()
    }
}

/// An ordered read pair sharing an identifier stem and a barcode.
#[derive(Debug, Clone)]
pub struct ReadPair {
    pub reads: [Read; 2],
}

impl ReadPair {
    pub fn new(read_a: Read, read_b: Read) -> Self {
        ReadPair {
            reads: [read_a, read_b],
        }
    }

    /// Barcode of the pair; mates are expected to agree, the first tagged
    /// mate wins.
    pub fn barcode(&self) -> Option<&str> {
        self.reads
            .iter()
            .find_map(|r| r.barcode.as_deref())
    }
}

/// Strip a trailing "/1" or "/2" mate suffix from a read ID.
fn id_stem(id: &str) -> &str {
    match id.rfind('/') {
        Some(pos) if matches!(&id[pos..], "/1" | "/2") => &id[..pos],
        _ => id,
    }
}

/// Check that two IDs form a pair; they will usually be foo/1 and foo/2
/// for some foo.
pub fn read_ids_match(id0: &str, id1: &str) -> bool {
    id_stem(id0) == id_stem(id1)
}

/// Truncate an ID for error reporting.
pub fn id_for_error(id: &str) -> &str {
    &id[..id.len().min(200)]
}

/// Predicate deciding whether a result is emitted for a read.
///
/// `degraded` marks reads that failed usefulness screening; `is_secondary`
/// is set for every record after the primary.
pub trait FilterPredicate {
    fn pass_filter(
        &self,
        read: &Read,
        status: AlignmentStatus,
        degraded: bool,
        is_secondary: bool,
    ) -> bool;
}

/// Status-driven filter: each alignment status can be kept or dropped, and
/// degraded reads can be suppressed separately.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    pub emit_single_hits: bool,
    pub emit_multiple_hits: bool,
    pub emit_not_found: bool,
    pub emit_degraded: bool,
}

impl Default for StatusFilter {
    fn default() -> Self {
        StatusFilter {
            emit_single_hits: true,
            emit_multiple_hits: true,
            emit_not_found: true,
            emit_degraded: true,
        }
    }
}

impl FilterPredicate for StatusFilter {
    fn pass_filter(
        &self,
        _read: &Read,
        status: AlignmentStatus,
        degraded: bool,
        _is_secondary: bool,
    ) -> bool {
        if degraded && !self.emit_degraded {
            return false;
        }
        match status {
            AlignmentStatus::SingleHit => self.emit_single_hits,
            AlignmentStatus::MultipleHits => self.emit_multiple_hits,
            AlignmentStatus::NotFound => self.emit_not_found,
        }
    }
}

/// Combine per-mate filter outcomes under the configured policy.
#[inline]
pub fn combine_filter(both_mates: bool, pass0: bool, pass1: bool) -> bool {
    if both_mates {
        pass0 && pass1
    } else {
        pass0 || pass1
    }
}

//! Per-worker alignment statistics.
//!
//! Each worker owns one `AlignerStats` and updates it lock-free in the hot
//! path; the driver merges them with [`AlignerStats::add`] when workers
//! exit. Histograms follow the paired-aligner convention: a pair-distance
//! histogram clamped at `MAX_DISTANCE`, a symmetric 2-D histogram of
//! paired scores clamped at `MAX_SCORE`, and a MAPQ histogram over the
//! full 0..=70 scale.

use std::fmt;

use crate::aligner::{is_one_location, AlignmentStatus, PairedResult, MAX_MAPQ};

/// Widest pair distance tracked individually.
pub const MAX_DISTANCE: usize = 1000;
/// Largest per-mate score tracked individually.
pub const MAX_SCORE: usize = 15;

#[derive(Debug, Clone)]
pub struct AlignerStats {
    pub total_reads: u64,
    pub useless_reads: u64,
    pub filtered: u64,
    pub single_hits: u64,
    pub multi_hits: u64,
    pub not_found: u64,
    pub aligned_as_pairs: u64,
    pub extra_alignments: u64,
    pub same_complement: u64,
    pub barcodes_processed: u64,
    pub locations_scored: u64,

    pub mapq_histogram: Vec<u64>,
    /// Histogram of |locA - locB| for pairs with both mates placed.
    pub distance_counts: Vec<u64>,
    /// 2-D histogram of paired scores, low score first.
    pub score_counts: Vec<u64>,
}

impl Default for AlignerStats {
    fn default() -> Self {
        AlignerStats {
            total_reads: 0,
            useless_reads: 0,
            filtered: 0,
            single_hits: 0,
            multi_hits: 0,
            not_found: 0,
            aligned_as_pairs: 0,
            extra_alignments: 0,
            same_complement: 0,
            barcodes_processed: 0,
            locations_scored: 0,
            mapq_histogram: vec![0; usize::from(MAX_MAPQ) + 1],
            distance_counts: vec![0; MAX_DISTANCE + 1],
            score_counts: vec![0; (MAX_SCORE + 1) * (MAX_SCORE + 1)],
        }
    }
}

impl AlignerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_distance(&mut self, distance: u64) {
        let bucket = (distance as usize).min(MAX_DISTANCE);
        self.distance_counts[bucket] += 1;
    }

    pub fn increment_score(&mut self, s0: i32, s1: i32) {
        let mut s0 = (s0.max(0) as usize).min(MAX_SCORE);
        let mut s1 = (s1.max(0) as usize).min(MAX_SCORE);
        if s0 > s1 {
            std::mem::swap(&mut s0, &mut s1);
        }
        self.score_counts[s0 * (MAX_SCORE + 1) + s1] += 1;
    }

    /// Tally one emitted pair whose primary survived filtering.
    pub fn record_pair(&mut self, result: &PairedResult, useful: [bool; 2]) {
        for r in 0..2 {
            if !useful[r] {
                self.useless_reads += 1;
                continue;
            }
            match result.status[r] {
                AlignmentStatus::SingleHit => self.single_hits += 1,
                AlignmentStatus::MultipleHits => self.multi_hits += 1,
                AlignmentStatus::NotFound => self.not_found += 1,
            }
            if result.status[r] != AlignmentStatus::NotFound {
                self.mapq_histogram[usize::from(result.mapq[r].min(MAX_MAPQ))] += 1;
            }
        }

        if result.direction[0] == result.direction[1] {
            self.same_complement += 1;
        }

        if is_one_location(result.status[0]) && is_one_location(result.status[1]) {
            self.increment_distance(result.location[0].abs_diff(result.location[1]));
            self.increment_score(result.score[0], result.score[1]);
        }

        if result.aligned_as_pair {
            // They are a pair, after all.
            self.aligned_as_pairs += 2;
        }
    }

    /// Merge another worker's statistics into this one.
    pub fn add(&mut self, other: &AlignerStats) {
        self.total_reads += other.total_reads;
        self.useless_reads += other.useless_reads;
        self.filtered += other.filtered;
        self.single_hits += other.single_hits;
        self.multi_hits += other.multi_hits;
        self.not_found += other.not_found;
        self.aligned_as_pairs += other.aligned_as_pairs;
        self.extra_alignments += other.extra_alignments;
        self.same_complement += other.same_complement;
        self.barcodes_processed += other.barcodes_processed;
        self.locations_scored += other.locations_scored;
        for (a, b) in self.mapq_histogram.iter_mut().zip(&other.mapq_histogram) {
            *a += b;
        }
        for (a, b) in self.distance_counts.iter_mut().zip(&other.distance_counts) {
            *a += b;
        }
        for (a, b) in self.score_counts.iter_mut().zip(&other.score_counts) {
            *a += b;
        }
    }
}

impl fmt::Display for AlignerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reads: {} single hits, {} multi hits, {} not found, {} useless, {} filtered; \
             {} aligned as pairs, {} extra alignments, {} barcodes",
            self.total_reads,
            self.single_hits,
            self.multi_hits,
            self.not_found,
            self.useless_reads,
            self.filtered,
            self.aligned_as_pairs,
            self.extra_alignments,
            self.barcodes_processed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::Direction;

    fn placed_result() -> PairedResult {
        let mut r = PairedResult::unmapped();
        r.status = [AlignmentStatus::SingleHit; 2];
        r.location = [100, 400];
        r.direction = [Direction::Forward, Direction::ReverseComplement];
        r.score = [1, 2];
        r.mapq = [70, 70];
        r.aligned_as_pair = true;
        r
    }

    #[test]
    fn test_record_pair_tallies() {
        let mut stats = AlignerStats::new();
        stats.record_pair(&placed_result(), [true, true]);
        assert_eq!(stats.single_hits, 2);
        assert_eq!(stats.aligned_as_pairs, 2);
        assert_eq!(stats.mapq_histogram[70], 2);
        assert_eq!(stats.distance_counts[300], 1);
        assert_eq!(stats.score_counts[1 * (MAX_SCORE + 1) + 2], 1);
        assert_eq!(stats.same_complement, 0);
    }

    #[test]
    fn test_unuseful_mate_counts_useless() {
        let mut stats = AlignerStats::new();
        stats.record_pair(&placed_result(), [true, false]);
        assert_eq!(stats.single_hits, 1);
        assert_eq!(stats.useless_reads, 1);
    }

    #[test]
    fn test_distance_and_score_clamped() {
        let mut stats = AlignerStats::new();
        stats.increment_distance(50_000);
        assert_eq!(stats.distance_counts[MAX_DISTANCE], 1);
        stats.increment_score(99, 3);
        // Symmetric: stored as (low, high).
        assert_eq!(stats.score_counts[3 * (MAX_SCORE + 1) + MAX_SCORE], 1);
    }

    #[test]
    fn test_merge() {
        let mut a = AlignerStats::new();
        let mut b = AlignerStats::new();
        a.total_reads = 10;
        b.total_reads = 20;
        b.mapq_histogram[70] = 3;
        a.add(&b);
        assert_eq!(a.total_reads, 30);
        assert_eq!(a.mapq_histogram[70], 3);
    }
}

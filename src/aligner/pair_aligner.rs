//! Per-pair candidate generation and scoring (the single-pair aligner).
//!
//! One `PairAligner` instance lives per read pair in the barcode batch. It
//! extracts overlapping seeds from both mates on both strands, intersects
//! the per-mate hit sets into paired candidates within the spacing window,
//! scores candidates with the banded distance kernel, and selects primary
//! plus secondary results under the overflow contract.

use std::collections::HashMap;
use std::time::Instant;

use crate::aligner::arena::{BufferArena, Region};
use crate::aligner::candidates::{
    CandidatePool, CandidatePoolOverflow, MateCandidate, PairedCandidate, ScoredPairCandidate,
    ScoredSingleCandidate,
};
use crate::aligner::edit_distance::DistanceKernel;
use crate::aligner::{
    AlignmentStatus, BufferOverflow, PairedResult, SingleResult, MAX_MAPQ, MAX_READ_LENGTH,
};
use crate::align_opt::AlignOpt;
use crate::genome::{Direction, GenomeLocation};
use crate::index::ReferenceIndex;
use crate::reads::{Read, ReadPair};

/// Score gap at which the MAPQ estimate saturates at the ceiling.
const MAPQ_SATURATION_GAP: i32 = 7;

/// Approximate mapping quality from the score gap to the next-best
/// distinct placement. `None` means no competitor exists.
pub fn mapq_from_gap(gap: Option<i32>) -> u8 {
    match gap {
        None => MAX_MAPQ,
        Some(g) if g <= 0 => 1,
        Some(g) => (g * 10).min(i32::from(MAX_MAPQ)) as u8,
    }
}

/// Parameters the pair aligner copies out of [`AlignOpt`] plus the
/// index-supplied seed length.
#[derive(Debug, Clone, Copy)]
pub struct AlignerParams {
    pub seed_len: usize,
    pub min_spacing: u32,
    pub max_spacing: u32,
    pub max_hits: usize,
    pub max_edit_distance: i32,
    pub extra_search_depth: i32,
    pub num_seeds: usize,
    pub seed_coverage: f32,
    pub min_weight_to_check: u32,
    pub max_candidate_pool_size: usize,
    pub use_ordered_evaluation: bool,
    pub use_truncation: bool,
    pub kernel: DistanceKernel,
}

impl AlignerParams {
    pub fn from_opt(opt: &AlignOpt, seed_len: usize) -> Self {
        AlignerParams {
            seed_len,
            min_spacing: opt.min_spacing,
            max_spacing: opt.max_spacing,
            max_hits: opt.intersecting_aligner_max_hits,
            max_edit_distance: opt.max_edit_distance,
            extra_search_depth: opt.extra_search_depth,
            num_seeds: opt.num_seeds,
            seed_coverage: opt.seed_coverage,
            min_weight_to_check: opt.min_weight_to_check,
            max_candidate_pool_size: opt.max_candidate_pool_size,
            use_ordered_evaluation: opt.use_ordered_evaluation,
            use_truncation: opt.use_truncation,
            kernel: DistanceKernel {
                use_ukkonen: opt.use_ukkonen,
                use_truncation: opt.use_truncation,
            },
        }
    }

    #[inline]
    fn score_limit(&self) -> i32 {
        self.max_edit_distance + self.extra_search_depth
    }

    /// Number of seeds for a read of `read_len` bases; fixed count and
    /// adaptive coverage are mutually exclusive.
    fn seeds_for_read(&self, read_len: usize) -> usize {
        if self.num_seeds > 0 {
            return self.num_seeds;
        }
        if self.seed_len == 0 || read_len < self.seed_len {
            return 0;
        }
        let adaptive =
            (read_len as f32 * self.seed_coverage / self.seed_len as f32).ceil() as usize;
        adaptive.max(1).min(read_len - self.seed_len + 1)
    }
}

/// Primary and secondaries selected from the scored paired candidates.
#[derive(Debug)]
pub struct SelectedPair {
    pub primary: PairedResult,
    pub secondaries: Vec<PairedResult>,
    /// The primary's anchor fell inside the supplied cluster span.
    pub primary_in_cluster: bool,
}

/// Primary and secondaries for one mate aligned independently.
#[derive(Debug)]
pub struct SelectedSingle {
    pub primary: SingleResult,
    pub secondaries: Vec<SingleResult>,
}

/// Per-pair aligner state, owned by the pair's progress record.
pub struct PairAligner {
    params: AlignerParams,
    scratch: Region,
    /// Candidate locations per mate, kept for single-end fallback.
    mate_candidates: [Vec<MateCandidate>; 2],
    pool: CandidatePool,
    scored: Vec<ScoredPairCandidate>,
    single_scored: [Vec<ScoredSingleCandidate>; 2],
    scored_ready: bool,
    singles_ready: [bool; 2],
    pub popular_seeds_skipped: [u32; 2],
    pub n_small_hits: u32,
    pub n_locations_scored: u32,
}

impl PairAligner {
    pub fn new(params: AlignerParams, scratch: Region) -> Self {
        PairAligner {
            params,
            scratch,
            mate_candidates: [Vec::new(), Vec::new()],
            pool: CandidatePool::new(params.max_candidate_pool_size),
            scored: Vec::new(),
            single_scored: [Vec::new(), Vec::new()],
            scored_ready: false,
            singles_ready: [false, false],
            popular_seeds_skipped: [0, 0],
            n_small_hits: 0,
            n_locations_scored: 0,
        }
    }

    /// Extract seeds from both useful mates, look them up, and intersect
    /// the hit sets into paired candidates within the spacing window.
    ///
    /// Returns the number of paired candidates found.
    pub fn seed_and_intersect(
        &mut self,
        index: &dyn ReferenceIndex,
        pair: &ReadPair,
        useful: [bool; 2],
    ) -> Result<usize, CandidatePoolOverflow> {
        for which in 0..2 {
            if useful[which] {
                self.collect_mate_candidates(index, &pair.reads[which], which);
            }
        }

        // Proper orientation: one mate forward, the other reverse, within
        // [min_spacing, max_spacing] of each other.
        self.intersect(Direction::Forward, Direction::ReverseComplement)?;
        self.intersect(Direction::ReverseComplement, Direction::Forward)?;
        Ok(self.pool.len())
    }

    fn collect_mate_candidates(&mut self, index: &dyn ReferenceIndex, read: &Read, which: usize) {
        let seed_len = index.seed_length();
        let read_len = read.len().min(MAX_READ_LENGTH);
        if read_len < seed_len {
            return;
        }
        let n_seeds = self.params.seeds_for_read(read_len);
        if n_seeds == 0 {
            return;
        }
        let last_offset = read_len - seed_len;
        let step = if n_seeds > 1 {
            (last_offset as f32 / (n_seeds - 1) as f32).max(1.0)
        } else {
            1.0
        };

        let rc = read.reverse_complement();
        let mut votes: HashMap<(GenomeLocation, Direction), u32> = HashMap::new();

        let mut prev_offset = usize::MAX;
        for i in 0..n_seeds {
            let offset = ((i as f32 * step) as usize).min(last_offset);
            if offset == prev_offset {
                continue;
            }
            prev_offset = offset;

            for (direction, seq) in [
                (Direction::Forward, &read.seq),
                (Direction::ReverseComplement, &rc),
            ] {
                let seed = &seq[offset..offset + seed_len];
                if seed.contains(&b'N') {
                    continue;
                }
                let hits = index.lookup(seed);
                if hits.len() > self.params.max_hits {
                    // Popular seed: abandon it rather than flood the pool.
                    self.popular_seeds_skipped[which] += 1;
                    continue;
                }
                self.n_small_hits += hits.len() as u32;
                for &hit in hits {
                    if hit < offset as u64 {
                        continue;
                    }
                    *votes.entry((hit - offset as u64, direction)).or_insert(0) += 1;
                }
            }
        }

        let min_weight = self.params.min_weight_to_check;
        let mut candidates: Vec<MateCandidate> = votes
            .into_iter()
            .filter(|&(_, weight)| weight >= min_weight)
            .map(|((location, direction), weight)| MateCandidate {
                location,
                direction,
                weight,
            })
            .collect();
        candidates.sort_by_key(|c| c.location);
        self.mate_candidates[which] = candidates;
    }

    /// Merge mate-A candidates on `dir_a` with mate-B candidates on
    /// `dir_b` wherever their separation lies in the spacing window.
    fn intersect(
        &mut self,
        dir_a: Direction,
        dir_b: Direction,
    ) -> Result<(), CandidatePoolOverflow> {
        let (min_sep, max_sep) = (
            u64::from(self.params.min_spacing),
            u64::from(self.params.max_spacing),
        );
        let a_list = &self.mate_candidates[0];
        let b_list = &self.mate_candidates[1];
        let mut b_start = 0usize;
        for a in a_list.iter().filter(|c| c.direction == dir_a) {
            // Advance the window start; both lists are location-sorted.
            while b_start < b_list.len()
                && b_list[b_start].location + max_sep < a.location
            {
                b_start += 1;
            }
            for b in b_list[b_start..]
                .iter()
                .take_while(|b| b.location <= a.location + max_sep)
                .filter(|b| b.direction == dir_b)
            {
                let sep = a.location.abs_diff(b.location);
                if sep < min_sep || sep > max_sep {
                    continue;
                }
                self.pool.try_push(PairedCandidate {
                    location: [a.location, b.location],
                    direction: [dir_a, dir_b],
                    weight: a.weight + b.weight,
                })?;
            }
        }
        Ok(())
    }

    /// Score every surviving paired candidate with the distance kernel.
    /// Idempotent: a second call is a no-op.
    ///
    /// `max_extra` is the secondary reporting tolerance; with truncation
    /// enabled, candidates provably outside both the reporting window and
    /// the MAPQ gap are skipped without changing any reported value.
    pub fn score_candidates(
        &mut self,
        index: &dyn ReferenceIndex,
        pair: &ReadPair,
        arena: &mut BufferArena,
        max_extra: i64,
    ) {
        if self.scored_ready {
            return;
        }
        self.scored_ready = true;

        let mut order: Vec<PairedCandidate> = self.pool.entries().to_vec();
        if self.params.use_ordered_evaluation {
            // Strongest seed evidence first so the truncation bound
            // tightens as early as possible.
            order.sort_by_key(|c| (std::cmp::Reverse(c.weight), c.anchor()));
        }

        let full_limit = self.params.score_limit();
        let slack = (max_extra.clamp(0, i64::from(full_limit)) as i32).max(MAPQ_SATURATION_GAP);
        let mut best_pair_score = i32::MAX;

        for cand in order {
            let budget = if self.params.use_truncation && best_pair_score != i32::MAX {
                (best_pair_score + slack).min(2 * full_limit)
            } else {
                2 * full_limit
            };

            let Some(s0) = self.score_one(index, &pair.reads[0], cand.location[0], cand.direction[0], arena)
            else {
                continue;
            };
            if s0 > budget {
                continue;
            }
            let Some(s1) = self.score_one(index, &pair.reads[1], cand.location[1], cand.direction[1], arena)
            else {
                continue;
            };
            if s0 + s1 > budget {
                continue;
            }

            self.scored.push(ScoredPairCandidate {
                candidate: cand,
                score: [s0, s1],
            });
            if s0 + s1 < best_pair_score {
                best_pair_score = s0 + s1;
            }
        }

        // Deterministic order regardless of evaluation order.
        self.scored
            .sort_by_key(|s| (s.pair_score(), s.candidate.anchor(), s.candidate.location[0]));
    }

    fn score_one(
        &mut self,
        index: &dyn ReferenceIndex,
        read: &Read,
        location: GenomeLocation,
        direction: Direction,
        arena: &mut BufferArena,
    ) -> Option<i32> {
        let limit = self.params.score_limit();
        let window = read.len().min(MAX_READ_LENGTH) + limit as usize;
        let text = index.reference_slice(location, window)?;
        self.n_locations_scored += 1;
        let scratch = arena.region_mut(self.scratch);
        let oriented;
        let pattern: &[u8] = match direction {
            Direction::Forward => &read.seq,
            Direction::ReverseComplement => {
                oriented = read.reverse_complement();
                &oriented
            }
        };
        let pattern = &pattern[..pattern.len().min(MAX_READ_LENGTH)];
        self.params.kernel.distance(text, pattern, limit, scratch)
    }

    /// Number of scored paired candidates.
    pub fn scored_len(&self) -> usize {
        self.scored.len()
    }

    /// Select the best paired placement and all secondaries within
    /// `max_extra` of it, up to `capacity` secondaries.
    ///
    /// On overflow the required count is signalled and no buffers are
    /// touched. `cluster_span` gives in-cluster candidates priority on
    /// score ties.
    pub fn best_and_secondary(
        &self,
        max_extra: i64,
        capacity: usize,
        cluster_span: Option<(GenomeLocation, GenomeLocation)>,
    ) -> Result<Option<SelectedPair>, BufferOverflow> {
        if self.scored.is_empty() {
            return Ok(None);
        }

        let in_cluster = |c: &ScoredPairCandidate| {
            cluster_span
                .map(|(start, end)| c.candidate.anchor() >= start && c.candidate.anchor() <= end)
                .unwrap_or(false)
        };

        let best_score = self.scored[0].pair_score();
        // Scored candidates are sorted; ties on the minimal score form a
        // prefix. An in-cluster tie member wins the primary slot.
        let mut primary_idx = 0usize;
        let mut tie_width = 0usize;
        for (i, s) in self.scored.iter().enumerate() {
            if s.pair_score() != best_score {
                break;
            }
            tie_width += 1;
            if in_cluster(s) && !in_cluster(&self.scored[primary_idx]) {
                primary_idx = i;
            }
        }
        let primary_cand = &self.scored[primary_idx];
        let cluster_resolved = tie_width > 1 && in_cluster(primary_cand);

        // Count qualifying secondaries before building anything.
        let n_secondary = if max_extra < 0 {
            0
        } else {
            self.scored
                .iter()
                .enumerate()
                .filter(|&(i, s)| {
                    i != primary_idx && i64::from(s.pair_score() - best_score) <= max_extra
                })
                .count()
        };
        if n_secondary > capacity {
            return Err(BufferOverflow {
                needed: n_secondary,
            });
        }

        let gap = self
            .scored
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != primary_idx)
            .map(|(_, s)| s.pair_score() - best_score)
            .min();
        let mapq = mapq_from_gap(gap);
        let status = match gap {
            Some(0) if !cluster_resolved => AlignmentStatus::MultipleHits,
            _ => AlignmentStatus::SingleHit,
        };

        let primary = PairedResult {
            status: [status; 2],
            location: primary_cand.candidate.location,
            direction: primary_cand.candidate.direction,
            score: primary_cand.score,
            mapq: [mapq; 2],
            aligned_as_pair: true,
            from_align_together: true,
            nanos_in_align_together: 0,
            n_small_hits: self.n_small_hits,
            n_lv_calls: self.n_locations_scored,
        };

        let mut secondaries = Vec::with_capacity(n_secondary);
        if max_extra >= 0 {
            for (i, s) in self.scored.iter().enumerate() {
                if i == primary_idx || i64::from(s.pair_score() - best_score) > max_extra {
                    continue;
                }
                secondaries.push(PairedResult {
                    status: [AlignmentStatus::MultipleHits; 2],
                    location: s.candidate.location,
                    direction: s.candidate.direction,
                    score: s.score,
                    mapq: [0; 2],
                    aligned_as_pair: true,
                    from_align_together: true,
                    nanos_in_align_together: 0,
                    n_small_hits: 0,
                    n_lv_calls: 0,
                });
            }
        }

        Ok(Some(SelectedPair {
            primary,
            secondaries,
            primary_in_cluster: in_cluster(primary_cand),
        }))
    }

    /// Score one mate's candidates independently and select the best plus
    /// secondaries, under the same overflow contract as the paired path.
    pub fn single_fallback(
        &mut self,
        index: &dyn ReferenceIndex,
        read: &Read,
        which: usize,
        arena: &mut BufferArena,
        max_extra: i64,
        capacity: usize,
    ) -> Result<Option<SelectedSingle>, BufferOverflow> {
        if !self.singles_ready[which] {
            self.singles_ready[which] = true;
            let started = Instant::now();
            let candidates = std::mem::take(&mut self.mate_candidates[which]);
            let mut scored = Vec::new();
            for cand in &candidates {
                if let Some(score) =
                    self.score_one(index, read, cand.location, cand.direction, arena)
                {
                    scored.push(ScoredSingleCandidate {
                        location: cand.location,
                        direction: cand.direction,
                        score,
                    });
                }
            }
            self.mate_candidates[which] = candidates;
            scored.sort_by_key(|s| (s.score, s.location));
            self.single_scored[which] = scored;
            log::trace!(
                "single fallback mate {} scored {} candidates in {:?}",
                which,
                self.single_scored[which].len(),
                started.elapsed()
            );
        }

        let scored = &self.single_scored[which];
        if scored.is_empty() {
            return Ok(None);
        }
        let best = scored[0];

        let n_secondary = if max_extra < 0 {
            0
        } else {
            scored[1..]
                .iter()
                .filter(|s| i64::from(s.score - best.score) <= max_extra)
                .count()
        };
        if n_secondary > capacity {
            return Err(BufferOverflow {
                needed: n_secondary,
            });
        }

        let gap = scored.get(1).map(|s| s.score - best.score);
        let status = match gap {
            Some(0) => AlignmentStatus::MultipleHits,
            _ => AlignmentStatus::SingleHit,
        };
        let primary = SingleResult {
            status,
            location: best.location,
            direction: best.direction,
            score: best.score,
            mapq: mapq_from_gap(gap),
        };
        let mut secondaries = Vec::with_capacity(n_secondary);
        if max_extra >= 0 {
            for s in &scored[1..] {
                if i64::from(s.score - best.score) > max_extra {
                    break;
                }
                secondaries.push(SingleResult {
                    status: AlignmentStatus::MultipleHits,
                    location: s.location,
                    direction: s.direction,
                    score: s.score,
                    mapq: 0,
                });
            }
        }
        Ok(Some(SelectedSingle {
            primary,
            secondaries,
        }))
    }

    /// True when stage 1 produced at least one paired candidate.
    pub fn has_paired_candidates(&self) -> bool {
        !self.pool.is_empty()
    }

    /// Paired candidates surviving intersection, for cluster insertion.
    pub fn paired_candidates(&self) -> &[PairedCandidate] {
        self.pool.entries()
    }

    /// True when either mate produced candidate locations.
    pub fn has_single_candidates(&self, which: usize) -> bool {
        !self.mate_candidates[which].is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapq_from_gap() {
        assert_eq!(mapq_from_gap(None), 70);
        assert_eq!(mapq_from_gap(Some(0)), 1);
        assert_eq!(mapq_from_gap(Some(1)), 10);
        assert_eq!(mapq_from_gap(Some(7)), 70);
        assert_eq!(mapq_from_gap(Some(100)), 70);
    }

    #[test]
    fn test_seed_count_modes() {
        let mut opt = AlignOpt::default();
        opt.num_seeds = 4;
        let params = AlignerParams::from_opt(&opt, 20);
        assert_eq!(params.seeds_for_read(100), 4);

        opt.num_seeds = 0;
        opt.seed_coverage = 2.0;
        let params = AlignerParams::from_opt(&opt, 20);
        assert_eq!(params.seeds_for_read(100), 10);
        assert_eq!(params.seeds_for_read(10), 0);
    }
}

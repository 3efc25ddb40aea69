//! Barcode orchestrator: drives every pair of a barcode batch through the
//! staged alignment together.
//!
//! The stages form an explicit state machine:
//!
//! ```text
//! Seeding → PairedScoring → SingleFallback → Emitted
//! ```
//!
//! Seeding populates each pair's candidate pool and the shared cluster
//! index in one pass. Paired scoring runs cluster discovery once, then
//! scores and selects per pair, boosting candidates that fall inside the
//! pair's cluster; pairs whose secondary buffer overflows raise a flag and
//! the stage re-runs for those pairs alone after their capacity doubles.
//! Single fallback applies the same overflow protocol to mates that could
//! not be placed as a pair. Arena canaries are verified at every stage
//! boundary.

use std::io;
use std::time::Instant;

use crate::align_opt::AlignOpt;
use crate::aligner::arena::BufferArena;
use crate::aligner::batch::{BarcodeBatch, INITIAL_SECONDARY_CAPACITY};
use crate::aligner::cluster::{cluster_mapq_boost, ClusterIndex};
use crate::aligner::pair_aligner::{AlignerParams, SelectedSingle};
use crate::aligner::{
    is_one_location, single_aligner_reservation, AlignError, BufferOverflow,
};
use crate::genome::INVALID_GENOME_LOCATION;
use crate::index::ReferenceIndex;
use crate::reads::ReadPair;

/// Stage of the per-barcode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeStage {
    Seeding,
    PairedScoring,
    SingleFallback,
    Emitted,
}

/// Drives N pair aligners through the staged alignment for one barcode.
pub struct BarcodeOrchestrator<'a> {
    index: &'a dyn ReferenceIndex,
    opt: &'a AlignOpt,
    params: AlignerParams,
    scratch_words: usize,
}

impl<'a> BarcodeOrchestrator<'a> {
    pub fn new(index: &'a dyn ReferenceIndex, opt: &'a AlignOpt) -> Self {
        BarcodeOrchestrator {
            index,
            opt,
            params: AlignerParams::from_opt(opt, index.seed_length()),
            // The region granted to each pair; the guard word the arena
            // plants afterwards accounts for the +1 in the reservation.
            scratch_words: single_aligner_reservation(opt) - 1,
        }
    }

    /// Align every pair of one barcode batch. The returned batch holds the
    /// primary-plus-secondary results ready for emission; the arena is
    /// reset on entry and verified at every stage boundary.
    pub fn align_barcode(
        &self,
        arena: &mut BufferArena,
        pairs: Vec<ReadPair>,
        useful: Vec<[bool; 2]>,
    ) -> Result<BarcodeBatch, AlignError> {
        arena.reset();

        let initial_secondary = if self.opt.secondaries_enabled() {
            INITIAL_SECONDARY_CAPACITY
        } else {
            0
        };
        let mut batch = BarcodeBatch::new(
            pairs,
            useful,
            self.params,
            self.scratch_words,
            initial_secondary,
            arena,
        )
        .ok_or_else(|| {
            AlignError::Io(io::Error::new(
                io::ErrorKind::Other,
                "arena reservation exhausted; batch exceeds the configured max barcode size",
            ))
        })?;

        let contig_starts = self.index.contigs().iter().map(|c| c.offset).collect();
        let mut clusters = ClusterIndex::new(
            self.opt.max_cluster_span,
            self.opt.min_pairs_per_cluster,
            contig_starts,
        );

        let mut stage = BarcodeStage::Seeding;
        while stage != BarcodeStage::Emitted {
            arena.check_canaries().map_err(AlignError::from)?;
            stage = match stage {
                BarcodeStage::Seeding => {
                    self.seeding_stage(&mut batch, &mut clusters)?;
                    BarcodeStage::PairedScoring
                }
                BarcodeStage::PairedScoring => {
                    self.paired_scoring_stage(&mut batch, &mut clusters, arena)?;
                    BarcodeStage::SingleFallback
                }
                BarcodeStage::SingleFallback => {
                    self.single_fallback_stage(&mut batch, arena)?;
                    BarcodeStage::Emitted
                }
                BarcodeStage::Emitted => unreachable!("loop exits before Emitted"),
            };
            arena.check_canaries().map_err(AlignError::from)?;
        }

        if self.opt.force_spacing {
            self.apply_force_spacing(&mut batch);
        }

        Ok(batch)
    }

    /// Stage 1: seed every pair with a useful mate and populate the
    /// cluster index. Terminates in one pass; no overflow is possible
    /// here. Completion never short-circuits the barcode.
    fn seeding_stage(
        &self,
        batch: &mut BarcodeBatch,
        clusters: &mut ClusterIndex,
    ) -> Result<(), AlignError> {
        for idx in 0..batch.len() {
            let prog = &mut batch.progress[idx];
            let pair = &batch.pairs[idx];

            // Every pair gets a primary record up front; scoring
            // overwrites it, unplaced pairs keep NotFound.
            batch.results[idx].push(crate::aligner::PairedResult::unmapped());

            let n_candidates = prog
                .aligner
                .seed_and_intersect(self.index, pair, prog.useful)?;
            for cand in prog.aligner.paired_candidates() {
                clusters.insert(idx as u32, cand.anchor(), cand.direction[0], cand.weight);
            }
            if n_candidates == 0 {
                // Nothing to score together; stage 3 may still place the
                // mates one at a time.
                prog.not_done = false;
            }
        }
        log::trace!(
            "seeding: {} pairs, {} occupied cluster buckets",
            batch.len(),
            clusters.occupied_buckets()
        );
        Ok(())
    }

    /// Stage 2: discover clusters once, then score until no pair signals
    /// overflow, doubling the offending pair's capacity between passes.
    fn paired_scoring_stage(
        &self,
        batch: &mut BarcodeBatch,
        clusters: &mut ClusterIndex,
        arena: &mut BufferArena,
    ) -> Result<(), AlignError> {
        clusters.discover_clusters();
        loop {
            if self.paired_scoring_pass(batch, clusters, arena) {
                return Ok(());
            }
            for prog in batch.progress.iter_mut().filter(|p| p.not_done) {
                prog.max_paired_secondary =
                    (prog.max_paired_secondary * 2).max(INITIAL_SECONDARY_CAPACITY);
            }
        }
    }

    /// One pass over the pairs still flagged `not_done`. Finished pairs
    /// are untouched, so a re-entry is a no-op for them. Returns true when
    /// no pair overflowed.
    fn paired_scoring_pass(
        &self,
        batch: &mut BarcodeBatch,
        clusters: &ClusterIndex,
        arena: &mut BufferArena,
    ) -> bool {
        let max_extra = self.opt.max_secondary_edit_distance;
        let mut all_done = true;
        for idx in 0..batch.len() {
            let prog = &mut batch.progress[idx];
            if !prog.not_done {
                continue;
            }
            let pair = &batch.pairs[idx];
            let started = Instant::now();
            prog.aligner
                .score_candidates(self.index, pair, arena, max_extra);

            let cluster = clusters.cluster_for(idx as u32);
            let span = cluster.map(|c| (c.start, c.end));
            match prog.aligner.best_and_secondary(
                max_extra,
                prog.max_paired_secondary as usize,
                span,
            ) {
                Ok(None) => {
                    // No candidate survived scoring; the unmapped primary
                    // from stage 1 stands.
                    prog.not_done = false;
                }
                Ok(Some(mut sel)) => {
                    if let Some(c) = cluster.filter(|_| sel.primary_in_cluster) {
                        for mapq in sel.primary.mapq.iter_mut() {
                            *mapq = cluster_mapq_boost(
                                *mapq,
                                c.pair_count,
                                self.opt.min_pairs_per_cluster,
                            );
                        }
                    }
                    sel.primary.nanos_in_align_together = started.elapsed().as_nanos() as u64;

                    let cap = usize::try_from(self.opt.max_secondary_results)
                        .unwrap_or(usize::MAX);
                    sel.secondaries.truncate(cap);

                    let results = &mut batch.results[idx];
                    results.clear();
                    results.push(sel.primary);
                    results.extend(sel.secondaries);
                    prog.n_secondary = results.len() as i64 - 1;
                    prog.not_done = false;
                }
                Err(BufferOverflow { needed }) => {
                    debug_assert!(needed as i64 > prog.max_paired_secondary);
                    prog.not_done = true;
                    all_done = false;
                }
            }
        }
        all_done
    }

    /// Stage 3: place mates of unpaired pairs one at a time, with the same
    /// overflow protocol against the pair's single-secondary capacity.
    fn single_fallback_stage(
        &self,
        batch: &mut BarcodeBatch,
        arena: &mut BufferArena,
    ) -> Result<(), AlignError> {
        for idx in 0..batch.len() {
            let prog = &mut batch.progress[idx];
            let placed_as_pair = batch.results[idx][0].aligned_as_pair;
            prog.not_done = !placed_as_pair && (prog.useful[0] || prog.useful[1]);
        }
        loop {
            if self.single_fallback_pass(batch, arena) {
                return Ok(());
            }
            for prog in batch.progress.iter_mut().filter(|p| p.not_done) {
                prog.max_single_secondary =
                    (prog.max_single_secondary * 2).max(INITIAL_SECONDARY_CAPACITY);
            }
        }
    }

    fn single_fallback_pass(&self, batch: &mut BarcodeBatch, arena: &mut BufferArena) -> bool {
        let max_extra = self.opt.max_secondary_edit_distance;
        let mut all_done = true;
        for idx in 0..batch.len() {
            let prog = &mut batch.progress[idx];
            if !prog.not_done {
                continue;
            }
            let pair = &batch.pairs[idx];

            // Both mates share the pair's single-secondary capacity.
            let cap_total = prog.max_single_secondary as usize;
            let mut used = 0usize;
            let mut selections: [Option<SelectedSingle>; 2] = [None, None];
            let mut overflowed = false;
            for which in 0..2 {
                if !prog.useful[which] || !prog.aligner.has_single_candidates(which) {
                    continue;
                }
                match prog.aligner.single_fallback(
                    self.index,
                    &pair.reads[which],
                    which,
                    arena,
                    max_extra,
                    cap_total - used,
                ) {
                    Ok(Some(sel)) => {
                        used += sel.secondaries.len();
                        selections[which] = Some(sel);
                    }
                    Ok(None) => {}
                    Err(BufferOverflow { needed: _ }) => {
                        overflowed = true;
                        break;
                    }
                }
            }
            if overflowed {
                prog.not_done = true;
                all_done = false;
                continue;
            }

            let cap = usize::try_from(self.opt.max_secondary_results).unwrap_or(usize::MAX);
            let primary = &mut batch.results[idx][0];
            for which in 0..2 {
                if let Some(mut sel) = selections[which].take() {
                    primary.status[which] = sel.primary.status;
                    primary.location[which] = sel.primary.location;
                    primary.direction[which] = sel.primary.direction;
                    primary.score[which] = sel.primary.score;
                    primary.mapq[which] = sel.primary.mapq;

                    sel.secondaries.truncate(cap);
                    let target = &mut batch.single_results[idx][which];
                    target.clear();
                    target.extend(sel.secondaries);
                    prog.n_single_secondary[which] = target.len() as i64;
                }
            }
            primary.aligned_as_pair = false;
            primary.from_align_together = false;
            prog.not_done = false;
        }
        all_done
    }

    /// Either both mates align or neither does: demote half-mapped pairs.
    fn apply_force_spacing(&self, batch: &mut BarcodeBatch) {
        for result in batch.results.iter_mut().map(|r| &mut r[0]) {
            if is_one_location(result.status[0]) != is_one_location(result.status[1]) {
                result.status = [crate::aligner::AlignmentStatus::NotFound; 2];
                result.location = [INVALID_GENOME_LOCATION; 2];
            }
        }
    }
}

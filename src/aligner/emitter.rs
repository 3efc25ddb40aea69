//! Result emission: filtering, primary promotion, and writer handoff.
//!
//! Filtered entries are compacted by copying the last survivor into their
//! slot. When the primary itself is filtered out, the next surviving
//! record is promoted and `first_is_primary` records the demotion so the
//! writer and the statistics treat the first record as a secondary.

use std::io;

use crate::aligner::batch::BarcodeBatch;
use crate::aligner::PairedResult;
use crate::io::PairedWriter;
use crate::reads::{combine_filter, FilterPredicate, ReadPair};
use crate::stats::AlignerStats;

/// Emit one unmapped pair, honoring the filter policy. Returns whether the
/// record was written.
pub fn emit_unmapped_pair(
    pair: &ReadPair,
    degraded: [bool; 2],
    filter: &dyn FilterPredicate,
    both_mates: bool,
    writer: &mut dyn PairedWriter,
) -> io::Result<bool> {
    let result = PairedResult::unmapped();
    let pass0 = filter.pass_filter(&pair.reads[0], result.status[0], degraded[0], false);
    let pass1 = filter.pass_filter(&pair.reads[1], result.status[1], degraded[1], false);
    if !combine_filter(both_mates, pass0, pass1) {
        return Ok(false);
    }
    writer.write_pairs(pair, std::slice::from_ref(&result), [&[], &[]], true)?;
    Ok(true)
}

/// Filter, compact, and write every pair of an aligned batch, in input
/// pair order.
pub fn emit_batch(
    batch: &mut BarcodeBatch,
    filter: &dyn FilterPredicate,
    both_mates: bool,
    writer: &mut dyn PairedWriter,
    stats: &mut AlignerStats,
) -> io::Result<()> {
    for idx in 0..batch.len() {
        let prog = &batch.progress[idx];
        let pair = &batch.pairs[idx];
        let useful = prog.useful;

        // Paired results: primary plus secondaries.
        let results = &mut batch.results[idx];
        let mut n_secondary = prog.n_secondary;
        debug_assert_eq!(results.len() as i64, n_secondary + 1);
        let mut first_is_primary = true;
        let mut i: i64 = 0;
        while i <= n_secondary {
            let res = &results[i as usize];
            let is_secondary = i != 0 || !first_is_primary;
            let pass0 = filter.pass_filter(&pair.reads[0], res.status[0], !useful[0], is_secondary);
            let pass1 = filter.pass_filter(&pair.reads[1], res.status[1], !useful[1], is_secondary);
            if combine_filter(both_mates, pass0, pass1) {
                i += 1;
            } else {
                // Remove this one by moving the last survivor here.
                results.swap(i as usize, n_secondary as usize);
                n_secondary -= 1;
                if i == 0 {
                    first_is_primary = false;
                }
            }
        }
        results.truncate((n_secondary + 1).max(0) as usize);

        // Single secondaries, same predicate with the is-secondary bit set.
        for which in 0..2 {
            let singles = &mut batch.single_results[idx][which];
            let mut n = singles.len();
            let mut j = 0usize;
            while j < n {
                if filter.pass_filter(&pair.reads[which], singles[j].status, false, true) {
                    j += 1;
                } else {
                    singles.swap(j, n - 1);
                    n -= 1;
                }
            }
            singles.truncate(n);
        }

        writer.write_pairs(
            pair,
            &batch.results[idx],
            [
                &batch.single_results[idx][0],
                &batch.single_results[idx][1],
            ],
            first_is_primary,
        )?;

        stats.extra_alignments +=
            n_secondary.max(0) as u64 + u64::from(!first_is_primary);
        if first_is_primary && !batch.results[idx].is_empty() {
            stats.record_pair(&batch.results[idx][0], useful);
        } else {
            stats.filtered += 2;
        }
    }
    Ok(())
}

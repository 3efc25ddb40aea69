//! Worker plumbing: a reader thread groups the supplier's stream into
//! barcode batches and feeds them over a bounded channel to worker
//! threads. Each worker owns its orchestrator, arena, and statistics;
//! nothing mutable is shared inside the core. The reference index is
//! shared read-only and the writer is serialized behind a mutex.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Barrier, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::align_opt::AlignOpt;
use crate::aligner::emitter::{emit_batch, emit_unmapped_pair};
use crate::aligner::{barcode_reservation, AlignError, BarcodeOrchestrator, BufferArena};
use crate::index::ReferenceIndex;
use crate::io::{PairedReadSupplier, PairedWriter};
use crate::reads::{id_for_error, read_ids_match, FilterPredicate, Read, ReadPair};
use crate::stats::AlignerStats;

/// Consecutive pairs sharing one barcode, capped at `max_barcode_size`.
pub struct BarcodeGroup {
    pub pairs: Vec<(Read, Read)>,
}

fn pair_barcode(pair: &(Read, Read)) -> Option<&str> {
    pair.0.barcode.as_deref().or(pair.1.barcode.as_deref())
}

/// Drain the supplier, grouping consecutive same-barcode pairs. Barcode
/// grouping is the supplier's responsibility; this never re-sorts.
/// Oversized barcodes are split with a warning.
fn read_groups(
    supplier: &mut dyn PairedReadSupplier,
    max_barcode_size: usize,
    tx: &Sender<BarcodeGroup>,
) -> io::Result<()> {
    let max_barcode_size = max_barcode_size.max(1);
    let mut pending: Option<(Read, Read)> = None;
    loop {
        let first = match pending.take() {
            Some(pair) => pair,
            None => match supplier.next_pair()? {
                Some(pair) => pair,
                None => return Ok(()),
            },
        };
        let barcode: Option<String> = pair_barcode(&first).map(str::to_string);
        let mut group = vec![first];

        loop {
            if group.len() >= max_barcode_size {
                log::warn!(
                    "barcode {:?} exceeds max barcode size {}; splitting the batch",
                    barcode.as_deref().unwrap_or("<none>"),
                    max_barcode_size
                );
                break;
            }
            match supplier.next_pair()? {
                None => break,
                Some(next) => {
                    if pair_barcode(&next) == barcode.as_deref() {
                        group.push(next);
                    } else {
                        pending = Some(next);
                        break;
                    }
                }
            }
        }

        if tx.send(BarcodeGroup { pairs: group }).is_err() {
            // All workers exited; nothing left to feed.
            return Ok(());
        }
    }
}

/// One worker: receives barcode groups until the channel closes or
/// cancellation is observed between barcodes.
fn run_worker(
    index: Option<&dyn ReferenceIndex>,
    opt: &AlignOpt,
    rx: Receiver<BarcodeGroup>,
    writer: &Mutex<dyn PairedWriter>,
    filter: &(dyn FilterPredicate + Sync),
    cancel: &AtomicBool,
    barrier: Option<&Barrier>,
) -> Result<AlignerStats, AlignError> {
    let mut stats = AlignerStats::new();

    // Reserve the arena before the timing barrier so that all workers
    // allocate together and start together.
    let mut arena = index.map(|_| BufferArena::with_reservation(barcode_reservation(opt)));
    if let Some(barrier) = barrier {
        barrier.wait();
    }
    let orchestrator = index.map(|idx| BarcodeOrchestrator::new(idx, opt));

    while let Ok(group) = rx.recv() {
        if cancel.load(Ordering::Relaxed) {
            log::info!("cancellation observed; worker exiting between barcodes");
            break;
        }
        stats.barcodes_processed += 1;

        let mut pairs: Vec<ReadPair> = Vec::with_capacity(group.pairs.len());
        let mut useful_flags: Vec<[bool; 2]> = Vec::with_capacity(group.pairs.len());
        for (r0, r1) in group.pairs {
            // The two IDs must form a pair; usually foo/1 and foo/2.
            if !opt.ignore_mismatched_ids && !read_ids_match(&r0.id, &r1.id) {
                return Err(AlignError::MismatchedIds {
                    id0: id_for_error(&r0.id).to_string(),
                    id1: id_for_error(&r1.id).to_string(),
                });
            }
            stats.total_reads += 2;

            let useful = [
                r0.is_useful(opt.min_read_length, opt.max_edit_distance),
                r1.is_useful(opt.min_read_length, opt.max_edit_distance),
            ];
            let pair = ReadPair::new(r0, r1);

            if orchestrator.is_none() {
                // No index supplied: input/output only, everything is
                // NotFound and no arena resources are touched.
                let mut guard = writer.lock().unwrap();
                if emit_unmapped_pair(
                    &pair,
                    [!useful[0], !useful[1]],
                    filter,
                    opt.filter_both_mates,
                    &mut *guard,
                )? {
                    stats.not_found += 2;
                } else {
                    stats.filtered += 2;
                }
                continue;
            }

            if !useful[0] && !useful[1] {
                // Neither mate is worth seeding; emit unmapped up front.
                let mut guard = writer.lock().unwrap();
                if emit_unmapped_pair(
                    &pair,
                    [true, true],
                    filter,
                    opt.filter_both_mates,
                    &mut *guard,
                )? {
                    stats.useless_reads += 2;
                } else {
                    stats.filtered += 2;
                }
                continue;
            }

            pairs.push(pair);
            useful_flags.push(useful);
        }

        let (Some(orchestrator), Some(arena)) = (orchestrator.as_ref(), arena.as_mut()) else {
            continue;
        };
        if pairs.is_empty() {
            continue;
        }

        match orchestrator.align_barcode(arena, pairs, useful_flags) {
            Ok(mut batch) => {
                stats.locations_scored += batch
                    .progress
                    .iter()
                    .map(|p| u64::from(p.aligner.n_locations_scored))
                    .sum::<u64>();
                let mut guard = writer.lock().unwrap();
                emit_batch(
                    &mut batch,
                    filter,
                    opt.filter_both_mates,
                    &mut *guard,
                    &mut stats,
                )?;
            }
            Err(AlignError::CandidatePoolOverflow(err)) => {
                log::error!("skipping barcode: {}", err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(stats)
}

/// Run the full alignment: one reader thread plus `opt.n_threads` workers.
/// Returns the merged statistics, or the first fatal error.
pub fn run_alignment(
    index: Option<&dyn ReferenceIndex>,
    opt: &AlignOpt,
    mut supplier: Box<dyn PairedReadSupplier>,
    writer: &Mutex<dyn PairedWriter>,
    filter: &(dyn FilterPredicate + Sync),
    cancel: &AtomicBool,
) -> Result<AlignerStats, AlignError> {
    let n_workers = opt.n_threads.max(1);
    let (tx, rx) = bounded::<BarcodeGroup>(n_workers * 2);
    let barrier = opt.use_timing_barrier.then(|| Barrier::new(n_workers));
    let max_barcode_size = opt.max_barcode_size;

    thread::scope(|scope| {
        let reader = scope.spawn(move || read_groups(supplier.as_mut(), max_barcode_size, &tx));

        let mut workers = Vec::with_capacity(n_workers);
        for _ in 0..n_workers {
            let rx = rx.clone();
            let barrier = barrier.as_ref();
            workers.push(
                scope.spawn(move || run_worker(index, opt, rx, writer, filter, cancel, barrier)),
            );
        }
        drop(rx);

        let mut merged = AlignerStats::new();
        let mut first_error: Option<AlignError> = None;
        for handle in workers {
            match handle.join().expect("worker thread panicked") {
                Ok(stats) => merged.add(&stats),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        let reader_result = reader.join().expect("reader thread panicked");
        if let Some(err) = first_error {
            return Err(err);
        }
        reader_result.map_err(AlignError::from)?;
        Ok(merged)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySupplier;

    fn read(id: &str, barcode: Option<&str>) -> Read {
        Read::new(id, b"ACGT", b"IIII", barcode.map(str::to_string))
    }

    #[test]
    fn test_grouping_by_barcode() {
        let pairs = vec![
            (read("a/1", Some("BC1")), read("a/2", Some("BC1"))),
            (read("b/1", Some("BC1")), read("b/2", Some("BC1"))),
            (read("c/1", Some("BC2")), read("c/2", Some("BC2"))),
            (read("d/1", None), read("d/2", None)),
        ];
        let mut supplier = MemorySupplier::new(pairs);
        let (tx, rx) = bounded(16);
        read_groups(&mut supplier, 100, &tx).unwrap();
        drop(tx);

        let groups: Vec<BarcodeGroup> = rx.iter().collect();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].pairs.len(), 2);
        assert_eq!(groups[1].pairs.len(), 1);
        assert_eq!(groups[2].pairs.len(), 1);
    }

    #[test]
    fn test_oversized_barcode_split() {
        let pairs: Vec<(Read, Read)> = (0..5)
            .map(|i| {
                (
                    read(&format!("r{i}/1"), Some("BC")),
                    read(&format!("r{i}/2"), Some("BC")),
                )
            })
            .collect();
        let mut supplier = MemorySupplier::new(pairs);
        let (tx, rx) = bounded(16);
        read_groups(&mut supplier, 2, &tx).unwrap();
        drop(tx);

        let groups: Vec<BarcodeGroup> = rx.iter().collect();
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| g.pairs.len() <= 2));
    }
}

// End-to-end scenarios for the barcode-scoped pipeline, driven through
// the public crate API with an in-memory index, a vector-backed supplier,
// and a collecting writer.

mod common;

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use common::{pair_from, random_seq, rng, small_opt, READ_LEN, SEED_LEN};
use tether_align::align_opt::AlignOpt;
use tether_align::aligner::edit_distance::DistanceKernel;
use tether_align::aligner::{
    barcode_reservation, AlignError, AlignmentStatus, BarcodeOrchestrator, BufferArena, MAX_MAPQ,
};
use tether_align::index::{HashSeedIndex, ReferenceIndex};
use tether_align::io::{CollectingWriter, EmittedPair, MemorySupplier};
use tether_align::reads::{Read, ReadPair, StatusFilter};
use tether_align::stats::AlignerStats;
use tether_align::worker::run_alignment;

fn run(
    index: Option<&HashSeedIndex>,
    opt: &AlignOpt,
    pairs: Vec<(Read, Read)>,
) -> Result<(AlignerStats, Vec<EmittedPair>), AlignError> {
    let writer = Mutex::new(CollectingWriter::default());
    let filter = StatusFilter::default();
    let cancel = AtomicBool::new(false);
    let stats = run_alignment(
        index.map(|i| i as &dyn ReferenceIndex),
        opt,
        Box::new(MemorySupplier::new(pairs)),
        &writer,
        &filter,
        &cancel,
    )?;
    let collected = writer.into_inner().unwrap();
    Ok((stats, collected.pairs))
}

/// S1: one pair, both reads exact-match a single unique locus 300bp apart.
#[test]
fn s1_unique_exact_pair() {
    let mut rng = rng(11);
    let genome = random_seq(&mut rng, 20_000);
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);
    let opt = small_opt();

    let pairs = vec![pair_from(&genome, 5_000, 300, "frag1", Some("BX01"))];
    let (stats, emitted) = run(Some(&index), &opt, pairs).unwrap();

    assert_eq!(emitted.len(), 1);
    let primary = &emitted[0].results[0];
    assert_eq!(primary.status, [AlignmentStatus::SingleHit; 2]);
    assert_eq!(primary.score, [0, 0]);
    assert_eq!(primary.mapq, [MAX_MAPQ; 2]);
    assert_eq!(primary.location, [5_000, 5_300]);
    assert!(primary.from_align_together);
    assert!(primary.aligned_as_pair);
    assert_eq!(stats.single_hits, 2);
    assert_eq!(stats.aligned_as_pairs, 2);

    // Property 1: mate separation within the spacing window.
    let sep = primary.location[0].abs_diff(primary.location[1]);
    assert!(sep >= u64::from(opt.min_spacing) && sep <= u64::from(opt.max_spacing));

    // Round-trip: re-scoring the emitted placement reproduces the score.
    let kernel = DistanceKernel {
        use_ukkonen: true,
        use_truncation: true,
    };
    let limit = opt.max_edit_distance + opt.extra_search_depth;
    let mut scratch = vec![0i32; DistanceKernel::scratch_words(READ_LEN + limit as usize)];
    let text = index
        .reference_slice(primary.location[0], READ_LEN + limit as usize)
        .unwrap();
    let rescored = kernel
        .distance(text, &genome[5_000..5_000 + READ_LEN], limit, &mut scratch)
        .unwrap();
    assert_eq!(rescored, primary.score[0]);
}

/// A pair with a couple of substitutions still places, with the edit
/// distance reported.
#[test]
fn mismatches_reported_as_score() {
    let mut rng = rng(12);
    let genome = random_seq(&mut rng, 20_000);
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);
    let opt = small_opt();

    let (r0, r1) = pair_from(&genome, 8_000, 400, "frag1", Some("BX01"));
    let mut seq = r0.seq.clone();
    seq[40] = match seq[40] {
        b'A' => b'C',
        _ => b'A',
    };
    seq[80] = match seq[80] {
        b'G' => b'T',
        _ => b'G',
    };
    let r0 = Read::new(r0.id.clone(), &seq, &r0.qual, r0.barcode.clone());

    let (_, emitted) = run(Some(&index), &opt, vec![(r0, r1)]).unwrap();
    let primary = &emitted[0].results[0];
    assert_eq!(primary.status, [AlignmentStatus::SingleHit; 2]);
    assert_eq!(primary.score, [2, 0]);
}

/// S2: reads below the minimum length are useless; the pair is emitted
/// unmapped and accounted.
#[test]
fn s2_useless_reads() {
    let mut rng = rng(13);
    let genome = random_seq(&mut rng, 20_000);
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);
    let opt = small_opt();

    let quals = vec![b'I'; 30];
    let pairs = vec![(
        Read::new("short/1", &genome[100..130], &quals, None),
        Read::new("short/2", &genome[500..530], &quals, None),
    )];
    let (stats, emitted) = run(Some(&index), &opt, pairs).unwrap();

    assert_eq!(stats.useless_reads, 2);
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].results[0].status, [AlignmentStatus::NotFound; 2]);

    // With NotFound filtered out, the pair is dropped instead.
    let writer = Mutex::new(CollectingWriter::default());
    let filter = StatusFilter {
        emit_not_found: false,
        ..StatusFilter::default()
    };
    let cancel = AtomicBool::new(false);
    let quals = vec![b'I'; 30];
    let pairs = vec![(
        Read::new("short/1", &genome[100..130], &quals, None),
        Read::new("short/2", &genome[500..530], &quals, None),
    )];
    let stats = run_alignment(
        Some(&index),
        &opt,
        Box::new(MemorySupplier::new(pairs)),
        &writer,
        &filter,
        &cancel,
    )
    .unwrap();
    assert_eq!(stats.filtered, 2);
    assert!(writer.into_inner().unwrap().pairs.is_empty());
}

/// S3: a dense cluster on contig 1 pulls two ambiguously mapping pairs
/// onto contig 1 with boosted MAPQ.
#[test]
fn s3_cluster_resolves_ambiguous_pairs() {
    let mut rng = rng(14);
    let mut chr1 = random_seq(&mut rng, 50_000);
    let mut chr7 = random_seq(&mut rng, 10_000);
    // Duplicate a 1.5kb block of chr1 into chr7, clear of the unique
    // pairs' window, so reads from it map to both contigs with equal
    // score.
    let dup = chr1[42_000..43_500].to_vec();
    chr7[4_000..5_500].copy_from_slice(&dup);

    let index = HashSeedIndex::build(
        vec![
            ("chr1".to_string(), chr1.clone()),
            ("chr7".to_string(), chr7),
        ],
        SEED_LEN,
    );
    let opt = small_opt();

    // 50 unambiguous pairs across a 40kb window of chr1.
    let mut pairs = Vec::new();
    for i in 0..50 {
        let pos = 1_000 + i * 780; // spread over ~39kb
        pairs.push(pair_from(&chr1, pos, 300, &format!("u{i}"), Some("BX03")));
    }
    // 2 ambiguous pairs drawn from the duplicated block.
    for (i, off) in [(50usize, 42_100usize), (51, 42_600)] {
        pairs.push(pair_from(&chr1, off, 300, &format!("a{i}"), Some("BX03")));
    }

    let (_, emitted) = run(Some(&index), &opt, pairs).unwrap();
    assert_eq!(emitted.len(), 52);

    let chr1_len = 50_000u64;
    for pair in &emitted {
        let primary = &pair.results[0];
        assert_eq!(
            primary.status,
            [AlignmentStatus::SingleHit; 2],
            "{} should be placed",
            pair.id
        );
        assert!(
            primary.location.iter().all(|&loc| loc < chr1_len),
            "{} should land on contig 1, got {:?}",
            pair.id,
            primary.location
        );
    }

    // The ambiguous pairs were boosted above the bare tie-break MAPQ.
    for ambiguous in emitted.iter().filter(|p| p.id.starts_with('a')) {
        let mapq = ambiguous.results[0].mapq[0];
        assert!(
            mapq > 1 && mapq <= MAX_MAPQ,
            "{} expected boosted MAPQ, got {}",
            ambiguous.id,
            mapq
        );
    }
    // The unambiguous pairs keep their confident MAPQ.
    for unique in emitted.iter().filter(|p| p.id.starts_with('u')) {
        assert_eq!(unique.results[0].mapq[0], MAX_MAPQ);
    }
}

/// S4: one mate maps uniquely, the other has no seeds in range; single
/// fallback places the mapped mate, and force-spacing demotes both.
#[test]
fn s4_single_fallback_and_force_spacing() {
    let mut rng = rng(15);
    let genome = random_seq(&mut rng, 20_000);
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);

    let quals = vec![b'I'; READ_LEN];
    let junk = random_seq(&mut rng, READ_LEN); // not present in the reference
    let make_pairs = || {
        vec![(
            Read::new("half/1", &genome[3_000..3_000 + READ_LEN], &quals, None),
            Read::new("half/2", &junk, &quals, None),
        )]
    };

    let opt = small_opt();
    let (_, emitted) = run(Some(&index), &opt, make_pairs()).unwrap();
    let primary = &emitted[0].results[0];
    assert_eq!(primary.status[0], AlignmentStatus::SingleHit);
    assert_eq!(primary.status[1], AlignmentStatus::NotFound);
    assert_eq!(primary.location[0], 3_000);
    assert!(!primary.aligned_as_pair);
    assert!(!primary.from_align_together);

    let mut forced = small_opt();
    forced.force_spacing = true;
    let (_, emitted) = run(Some(&index), &forced, make_pairs()).unwrap();
    let primary = &emitted[0].results[0];
    assert_eq!(primary.status, [AlignmentStatus::NotFound; 2]);
    assert_eq!(
        primary.location,
        [tether_align::genome::INVALID_GENOME_LOCATION; 2]
    );
}

/// S5: 200 equally-scored placements overflow the secondary buffer, which
/// doubles 32 → 64 → 128 → 256 before the full set fits.
#[test]
fn s5_secondary_overflow_doubling() {
    let mut rng = rng(16);
    // Tandem repeat with a 2kb period: each read pair placement recurs
    // exactly once per unit.
    let unit = random_seq(&mut rng, 2_000);
    let mut genome = Vec::with_capacity(200 * unit.len() + 1_000);
    for _ in 0..200 {
        genome.extend_from_slice(&unit);
    }
    genome.extend(random_seq(&mut rng, 1_000));
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);

    let mut opt = small_opt();
    opt.max_secondary_edit_distance = 0;

    let pairs = vec![pair_from(&genome, 0, 300, "rep", Some("BX05"))];
    let mut useful = Vec::new();
    let mut read_pairs = Vec::new();
    for (r0, r1) in pairs {
        useful.push([true, true]);
        read_pairs.push(ReadPair::new(r0, r1));
    }

    // Drive the orchestrator directly to observe the capacity growth.
    let orchestrator = BarcodeOrchestrator::new(&index, &opt);
    let mut arena = BufferArena::with_reservation(barcode_reservation(&opt));
    let batch = orchestrator
        .align_barcode(&mut arena, read_pairs, useful)
        .unwrap();

    assert_eq!(batch.progress[0].max_paired_secondary, 256);
    assert_eq!(batch.progress[0].n_secondary, 199);
    assert_eq!(batch.results[0].len(), 200);

    // Property 4: secondaries sorted non-decreasing by score, all within
    // the tolerance of the primary.
    let primary_score: i32 = batch.results[0][0].score.iter().sum();
    let mut last = i32::MIN;
    for secondary in &batch.results[0][1..] {
        let score: i32 = secondary.score.iter().sum();
        assert!(score >= last);
        assert!(i64::from(score - primary_score) <= opt.max_secondary_edit_distance.max(0));
        last = score;
    }
}

/// S6: mismatched pair IDs are fatal with exit code 1 and both IDs named.
#[test]
fn s6_mismatched_ids_fatal() {
    let mut rng = rng(17);
    let genome = random_seq(&mut rng, 20_000);
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);
    let opt = small_opt();

    let quals = vec![b'I'; READ_LEN];
    let pairs = vec![(
        Read::new("abc/1", &genome[100..100 + READ_LEN], &quals, None),
        Read::new("xyz/2", &genome[400..400 + READ_LEN], &quals, None),
    )];
    let err = run(Some(&index), &opt, pairs).unwrap_err();
    assert_eq!(err.exit_code(), 1);
    let message = format!("{}", err);
    assert!(message.contains("abc/1"));
    assert!(message.contains("xyz/2"));

    // With the ignore flag the pair aligns normally.
    let mut lenient = small_opt();
    lenient.ignore_mismatched_ids = true;
    let quals = vec![b'I'; READ_LEN];
    let pairs = vec![(
        Read::new("abc/1", &genome[100..100 + READ_LEN], &quals, None),
        Read::new(
            "xyz/2",
            &common::revcomp(&genome[400..400 + READ_LEN]),
            &quals,
            None,
        ),
    )];
    let (_, emitted) = run(Some(&index), &lenient, pairs).unwrap();
    assert_eq!(emitted.len(), 1);
}

/// Fast path: without an index every pair is emitted NotFound, honoring
/// the filter, and nothing is aligned.
#[test]
fn no_index_fast_path() {
    let mut rng = rng(18);
    let genome = random_seq(&mut rng, 2_000);
    let opt = small_opt();
    let quals = vec![b'I'; READ_LEN];
    let pairs = vec![
        (
            Read::new("a/1", &genome[0..READ_LEN], &quals, None),
            Read::new("a/2", &genome[300..300 + READ_LEN], &quals, None),
        ),
        (
            Read::new("b/1", &genome[500..500 + READ_LEN], &quals, None),
            Read::new("b/2", &genome[900..900 + READ_LEN], &quals, None),
        ),
    ];
    let (stats, emitted) = run(None, &opt, pairs).unwrap();
    assert_eq!(emitted.len(), 2);
    assert!(emitted
        .iter()
        .all(|p| p.results[0].status == [AlignmentStatus::NotFound; 2]));
    assert_eq!(stats.not_found, 4);
    assert_eq!(stats.total_reads, 4);
}

/// Emission order within one barcode matches input pair order.
#[test]
fn emission_preserves_input_order() {
    let mut rng = rng(19);
    let genome = random_seq(&mut rng, 40_000);
    let index = HashSeedIndex::build(vec![("chr1".to_string(), genome.clone())], SEED_LEN);
    let opt = small_opt();

    let mut pairs = Vec::new();
    for i in 0..20 {
        pairs.push(pair_from(
            &genome,
            1_000 + i * 1_500,
            300,
            &format!("p{i:02}"),
            Some("BX07"),
        ));
    }
    let (_, emitted) = run(Some(&index), &opt, pairs).unwrap();
    let ids: Vec<&str> = emitted.iter().map(|p| p.id.as_str()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "input order must be preserved");
}

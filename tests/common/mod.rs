// Shared fixtures for the integration tests: deterministic synthetic
// references and read pairs drawn from them.
#![allow(dead_code)] // each test binary uses a subset of these helpers

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tether_align::align_opt::AlignOpt;
use tether_align::reads::Read;

pub const READ_LEN: usize = 100;
pub const SEED_LEN: usize = 16;

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter()
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

/// A proper pair drawn from `genome`: mate A forward at `pos`, mate B the
/// reverse complement of the window starting `dist` bases downstream.
pub fn pair_from(
    genome: &[u8],
    pos: usize,
    dist: usize,
    id: &str,
    barcode: Option<&str>,
) -> (Read, Read) {
    let quals = vec![b'I'; READ_LEN];
    let fwd = &genome[pos..pos + READ_LEN];
    let rev = revcomp(&genome[pos + dist..pos + dist + READ_LEN]);
    (
        Read::new(format!("{id}/1"), fwd, &quals, barcode.map(str::to_string)),
        Read::new(format!("{id}/2"), &rev, &quals, barcode.map(str::to_string)),
    )
}

/// Options scaled down for test batches; one worker for determinism.
pub fn small_opt() -> AlignOpt {
    let mut opt = AlignOpt::default();
    opt.max_barcode_size = 256;
    opt.n_threads = 1;
    opt
}

//! Reference index collaborator.
//!
//! The aligner only needs three things from an index: the seed length, a
//! seed-table lookup, and contig resolution (plus raw reference bases for
//! the scoring kernel). `HashSeedIndex` is the in-memory implementation:
//! a k-mer hash table over the concatenated reference, built in parallel.
//! Index persistence is out of scope; the table is rebuilt per run.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read as IoRead};
use std::path::Path;

use bio::io::fasta;
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;

use crate::genome::{contig_at, ContigSpan, GenomeLocation};

/// Read-only reference index, shared across workers.
///
/// Implementations must be reentrant under concurrent readers.
pub trait ReferenceIndex: Sync + Send {
    /// Seed (k-mer) length the lookup table was built with.
    fn seed_length(&self) -> usize;

    /// Locations whose forward-strand reference k-mer equals `seed`.
    /// Seeds containing ambiguous bases never match.
    fn lookup(&self, seed: &[u8]) -> &[GenomeLocation];

    /// Contig table, sorted by offset.
    fn contigs(&self) -> &[ContigSpan];

    /// Contig index and in-contig offset of `loc`.
    fn contig_of(&self, loc: GenomeLocation) -> Option<(usize, u64)> {
        contig_at(self.contigs(), loc)
    }

    /// Up to `len` reference bases starting at `loc`; shorter at the end
    /// of the genome. `None` when `loc` is out of range.
    fn reference_slice(&self, loc: GenomeLocation, len: usize) -> Option<&[u8]>;

    /// Total length of the concatenated reference.
    fn genome_length(&self) -> u64;
}

/// Pack a k-mer into 2 bits per base. `None` if it contains anything
/// outside {A, C, G, T} or is longer than 31 bases.
fn pack_seed(seed: &[u8]) -> Option<u64> {
    if seed.len() > 31 {
        return None;
    }
    let mut packed: u64 = 1; // leading 1 separates lengths
    for &base in seed {
        let code = match base {
            b'A' | b'a' => 0u64,
            b'C' | b'c' => 1,
            b'G' | b'g' => 2,
            b'T' | b't' => 3,
            _ => return None,
        };
        packed = (packed << 2) | code;
    }
    Some(packed)
}

/// In-memory k-mer hash index over a concatenated reference.
pub struct HashSeedIndex {
    seed_len: usize,
    sequence: Vec<u8>,
    contigs: Vec<ContigSpan>,
    table: HashMap<u64, Vec<GenomeLocation>>,
}

impl HashSeedIndex {
    /// Default seed length; short enough for bacterial-scale references,
    /// long enough to keep hit lists small on non-repetitive sequence.
    pub const DEFAULT_SEED_LENGTH: usize = 20;

    /// Build the index from named contig sequences.
    pub fn build(contig_data: Vec<(String, Vec<u8>)>, seed_len: usize) -> Self {
        assert!(seed_len > 0 && seed_len <= 31, "seed length must be 1..=31");

        let mut sequence = Vec::new();
        let mut contigs = Vec::new();
        for (name, seq) in contig_data {
            contigs.push(ContigSpan {
                name,
                offset: sequence.len() as u64,
                length: seq.len() as u64,
            });
            sequence.extend(seq.to_ascii_uppercase());
        }

        // Seed every in-contig position; positions spanning a contig
        // boundary are excluded. Each chunk of positions builds a private
        // table, merged at the end.
        let ranges: Vec<(u64, u64)> = contigs
            .iter()
            .filter(|c| c.length >= seed_len as u64)
            .map(|c| (c.offset, c.offset + c.length - seed_len as u64 + 1))
            .collect();
        let positions: Vec<u64> = ranges.into_iter().flat_map(|(lo, hi)| lo..hi).collect();

        const CHUNK: usize = 1 << 16;
        let partials: Vec<HashMap<u64, Vec<GenomeLocation>>> = positions
            .par_chunks(CHUNK)
            .map(|chunk| {
                let mut local: HashMap<u64, Vec<GenomeLocation>> = HashMap::new();
                for &pos in chunk {
                    let start = pos as usize;
                    if let Some(packed) = pack_seed(&sequence[start..start + seed_len]) {
                        local.entry(packed).or_default().push(pos);
                    }
                }
                local
            })
            .collect();

        let mut table: HashMap<u64, Vec<GenomeLocation>> = HashMap::new();
        for partial in partials {
            for (key, mut locs) in partial {
                table.entry(key).or_default().append(&mut locs);
            }
        }
        for locs in table.values_mut() {
            locs.sort_unstable();
        }

        log::info!(
            "seed index built: {} contigs, {} bases, {} distinct {}-mers",
            contigs.len(),
            sequence.len(),
            table.len(),
            seed_len
        );

        HashSeedIndex {
            seed_len,
            sequence,
            contigs,
            table,
        }
    }

    /// Load a FASTA reference (plain or gzip) and build the index.
    pub fn from_fasta(path: &Path, seed_len: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader: Box<dyn IoRead> = if path.extension().is_some_and(|e| e == "gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let fasta_reader = fasta::Reader::new(BufReader::new(reader));

        let mut contig_data = Vec::new();
        for record in fasta_reader.records() {
            let record = record.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            contig_data.push((record.id().to_string(), record.seq().to_vec()));
        }
        if contig_data.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no sequences in reference {}", path.display()),
            ));
        }
        Ok(Self::build(contig_data, seed_len))
    }
}

impl ReferenceIndex for HashSeedIndex {
    fn seed_length(&self) -> usize {
        self.seed_len
    }

    fn lookup(&self, seed: &[u8]) -> &[GenomeLocation] {
        static EMPTY: [GenomeLocation; 0] = [];
        if seed.len() != self.seed_len {
            return &EMPTY;
        }
        match pack_seed(seed).and_then(|packed| self.table.get(&packed)) {
            Some(locs) => locs,
            None => &EMPTY,
        }
    }

    fn contigs(&self) -> &[ContigSpan] {
        &self.contigs
    }

    fn reference_slice(&self, loc: GenomeLocation, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(loc).ok()?;
        if start >= self.sequence.len() {
            return None;
        }
        let end = (start + len).min(self.sequence.len());
        Some(&self.sequence[start..end])
    }

    fn genome_length(&self) -> u64 {
        self.sequence.len() as u64
    }
}

// Alignment options for the barcode-scoped paired aligner.
//
// One flat struct of public fields with a Default carrying the documented
// defaults, plus parse helpers for compound command-line values.

/// Tunable parameters for barcode-scoped paired alignment.
#[derive(Debug, Clone)]
pub struct AlignOpt {
    // Pair geometry
    pub min_spacing: u32, // Lower bound on mate separation
    pub max_spacing: u32, // Upper bound on mate separation
    pub force_spacing: bool, // Demote half-mapped pairs to NotFound

    // Barcode batching
    pub max_barcode_size: usize, // Max pairs per barcode batch

    // Cluster parameters
    pub min_pairs_per_cluster: usize, // Cluster admission threshold
    pub max_cluster_span: u64,        // Cluster geometric bound / bucket width

    // Seeding parameters
    pub intersecting_aligner_max_hits: usize, // Popular-seed skip threshold
    pub num_seeds: usize,   // Fixed seed count per read; 0 selects coverage mode
    pub seed_coverage: f32, // Adaptive seeds per read; used when num_seeds == 0
    pub min_weight_to_check: u32, // Minimum seed evidence for a candidate

    // Scoring parameters
    pub max_edit_distance: i32, // Scoring bound; also the N-count usefulness bound
    pub extra_search_depth: i32, // Widens the scoring bound for secondary discovery
    pub min_read_length: usize, // Usefulness bound

    // Candidate pool
    pub max_candidate_pool_size: usize, // Per-pair candidate cap

    // Secondary alignment reporting
    pub max_secondary_edit_distance: i64, // Negative disables secondary reporting
    pub max_secondary_results: i64,       // Absolute cap on emitted secondaries

    // Input policy
    pub quickly_drop_unpaired_reads: bool, // Drop SAM records missing mate info
    pub ignore_mismatched_ids: bool,       // Tolerate non-matching pair IDs
    pub filter_both_mates: bool,           // MatchBoth vs MatchEither

    // Kernel toggles; behavior-preserving when disabled
    pub use_ukkonen: bool,
    pub use_ordered_evaluation: bool,
    pub use_truncation: bool,

    // Processing
    pub n_threads: usize,
    pub use_timing_barrier: bool, // Synchronized worker start after arena reservation
}

pub const DEFAULT_MIN_SPACING: u32 = 50;
pub const DEFAULT_MAX_SPACING: u32 = 1000;
pub const DEFAULT_MAX_BARCODE_SIZE: usize = 60_000;
pub const DEFAULT_MIN_PAIRS_PER_CLUSTER: usize = 10;
pub const DEFAULT_MAX_CLUSTER_SPAN: u64 = 100_000;
pub const DEFAULT_INTERSECTING_ALIGNER_MAX_HITS: usize = 16_000;
pub const DEFAULT_MAX_CANDIDATE_POOL_SIZE: usize = 1 << 20;

impl Default for AlignOpt {
    fn default() -> Self {
        AlignOpt {
            min_spacing: DEFAULT_MIN_SPACING,
            max_spacing: DEFAULT_MAX_SPACING,
            force_spacing: false,

            max_barcode_size: DEFAULT_MAX_BARCODE_SIZE,

            min_pairs_per_cluster: DEFAULT_MIN_PAIRS_PER_CLUSTER,
            max_cluster_span: DEFAULT_MAX_CLUSTER_SPAN,

            intersecting_aligner_max_hits: DEFAULT_INTERSECTING_ALIGNER_MAX_HITS,
            num_seeds: 0,
            seed_coverage: 4.0,
            min_weight_to_check: 1,

            max_edit_distance: 15,
            extra_search_depth: 2,
            min_read_length: 50,

            max_candidate_pool_size: DEFAULT_MAX_CANDIDATE_POOL_SIZE,

            max_secondary_edit_distance: -1,
            max_secondary_results: i64::MAX,

            quickly_drop_unpaired_reads: true,
            ignore_mismatched_ids: false,
            filter_both_mates: false,

            use_ukkonen: true,
            use_ordered_evaluation: true,
            use_truncation: true,

            n_threads: 1,
            use_timing_barrier: false,
        }
    }
}

impl AlignOpt {
    /// Widest edit distance the scoring kernel may report.
    #[inline]
    pub fn score_limit(&self) -> i32 {
        self.max_edit_distance + self.extra_search_depth
    }

    /// True when secondary alignments are reported at all.
    #[inline]
    pub fn secondaries_enabled(&self) -> bool {
        self.max_secondary_edit_distance >= 0
    }

    /// Number of seeds to draw from a read of `read_len` bases.
    ///
    /// Fixed-count and adaptive-coverage selection are mutually exclusive:
    /// a nonzero `num_seeds` wins, otherwise the count is derived from
    /// `seed_coverage` and the seed length.
    pub fn seeds_for_read(&self, read_len: usize, seed_len: usize) -> usize {
        if self.num_seeds > 0 {
            return self.num_seeds;
        }
        if seed_len == 0 || read_len < seed_len {
            return 0;
        }
        let adaptive = (read_len as f32 * self.seed_coverage / seed_len as f32).ceil() as usize;
        adaptive.max(1).min(read_len - seed_len + 1)
    }

    /// Parse a "MIN,MAX" spacing argument.
    pub fn parse_spacing(s: &str) -> Result<(u32, u32), String> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 2 {
            return Err(format!("spacing must be MIN,MAX: {}", s));
        }
        let min = parts[0]
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid min spacing: {}", parts[0]))?;
        let max = parts[1]
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid max spacing: {}", parts[1]))?;
        if min > max {
            return Err(format!("min spacing {} exceeds max spacing {}", min, max));
        }
        Ok((min, max))
    }
}

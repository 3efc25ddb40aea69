//! Cluster index: spatial aggregation of candidate placements across a
//! barcode batch.
//!
//! Candidates from all pairs are bucketed by coarsened genomic region
//! (contig, bucket of `max_cluster_span` width, strand). After the batch
//! has contributed, discovery scans each bucket together with its
//! neighbor and greedily grows maximal windows no wider than
//! `max_cluster_span`. A window is admitted as a cluster iff it covers at
//! least `min_pairs_per_cluster` distinct pairs; each pair joins at most
//! one cluster (largest wins, ties broken on lowest coordinate).

use std::collections::HashMap;

use crate::aligner::MAX_MAPQ;
use crate::genome::{Direction, GenomeLocation};

/// One candidate contribution to a coarsened region.
#[derive(Debug, Clone, Copy)]
struct ClusterEntry {
    pair_index: u32,
    location: GenomeLocation,
    /// Seed evidence at insertion time.
    score: u32,
}

/// A spatially coherent set of pair candidates on one strand of one contig.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub contig: usize,
    pub direction: Direction,
    /// Leftmost member location.
    pub start: GenomeLocation,
    /// Rightmost member location; `end - start <= max_cluster_span`.
    pub end: GenomeLocation,
    /// Distinct pairs assigned to this cluster.
    pub pair_count: usize,
}

impl Cluster {
    /// True if `loc` falls inside the cluster's span.
    #[inline]
    pub fn contains(&self, loc: GenomeLocation) -> bool {
        loc >= self.start && loc <= self.end
    }
}

/// Maps coarsened genomic regions to the pairs with candidates there.
pub struct ClusterIndex {
    max_cluster_span: u64,
    min_pairs_per_cluster: usize,
    /// Contig start offsets, sorted; used to keep buckets contig-pure.
    contig_starts: Vec<GenomeLocation>,
    buckets: HashMap<(usize, u64, Direction), Vec<ClusterEntry>>,
    clusters: Vec<Cluster>,
    assignment: HashMap<u32, usize>,
    discovered: bool,
}

impl ClusterIndex {
    pub fn new(
        max_cluster_span: u64,
        min_pairs_per_cluster: usize,
        contig_starts: Vec<GenomeLocation>,
    ) -> Self {
        ClusterIndex {
            max_cluster_span: max_cluster_span.max(1),
            min_pairs_per_cluster: min_pairs_per_cluster.max(1),
            contig_starts,
            buckets: HashMap::new(),
            clusters: Vec::new(),
            assignment: HashMap::new(),
            discovered: false,
        }
    }

    fn contig_of(&self, loc: GenomeLocation) -> usize {
        self.contig_starts.partition_point(|&s| s <= loc).saturating_sub(1)
    }

    /// Record a candidate for `pair_index` at `location`. Amortized O(1).
    pub fn insert(
        &mut self,
        pair_index: u32,
        location: GenomeLocation,
        direction: Direction,
        score: u32,
    ) {
        debug_assert!(!self.discovered, "insert after discovery");
        let contig = self.contig_of(location);
        let bucket = location / self.max_cluster_span;
        self.buckets
            .entry((contig, bucket, direction))
            .or_default()
            .push(ClusterEntry {
                pair_index,
                location,
                score,
            });
    }

    /// Number of buckets currently holding at least one entry.
    pub fn occupied_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Scan buckets, grow maximal windows, admit clusters, and assign each
    /// pair to at most one of them. Runs once per batch.
    pub fn discover_clusters(&mut self) {
        if self.discovered {
            return;
        }
        self.discovered = true;

        // Group entries by (contig, strand); window growth handles the
        // bucket adjacency, so buckets only serve as the grouping key.
        let mut lanes: HashMap<(usize, Direction), Vec<ClusterEntry>> = HashMap::new();
        for ((contig, _bucket, direction), entries) in self.buckets.drain() {
            lanes
                .entry((contig, direction))
                .or_default()
                .extend(entries);
        }

        // Candidate windows: for each start entry, the maximal run of
        // entries within max_cluster_span.
        struct Window {
            contig: usize,
            direction: Direction,
            unique_pairs: usize,
        }
        let mut windows: Vec<(Window, Vec<ClusterEntry>)> = Vec::new();

        let mut lane_keys: Vec<(usize, Direction)> = lanes.keys().copied().collect();
        lane_keys.sort_by_key(|&(contig, dir)| (contig, dir.is_reverse()));

        for key in lane_keys {
            let mut entries = lanes.remove(&key).unwrap_or_default();
            entries.sort_by_key(|e| (e.location, std::cmp::Reverse(e.score), e.pair_index));
            let (contig, direction) = key;

            let mut hi = 0usize;
            let mut prev_hi = usize::MAX;
            for lo in 0..entries.len() {
                if hi < lo {
                    hi = lo;
                }
                while hi < entries.len()
                    && entries[hi].location - entries[lo].location <= self.max_cluster_span
                {
                    hi += 1;
                }
                // Skip windows wholly contained in the previous one.
                if hi == prev_hi {
                    continue;
                }
                prev_hi = hi;

                let mut pairs: Vec<u32> =
                    entries[lo..hi].iter().map(|e| e.pair_index).collect();
                pairs.sort_unstable();
                pairs.dedup();
                if pairs.len() >= self.min_pairs_per_cluster {
                    windows.push((
                        Window {
                            contig,
                            direction,
                            unique_pairs: pairs.len(),
                        },
                        entries[lo..hi].to_vec(),
                    ));
                }
            }
        }

        // Largest cluster wins contested pairs; ties go to the lowest
        // genomic coordinate.
        windows.sort_by(|(a, ea), (b, eb)| {
            b.unique_pairs
                .cmp(&a.unique_pairs)
                .then(ea[0].location.cmp(&eb[0].location))
        });

        for (window, entries) in windows {
            let mut members: Vec<&ClusterEntry> = entries
                .iter()
                .filter(|e| !self.assignment.contains_key(&e.pair_index))
                .collect();
            members.sort_by_key(|e| e.location);
            let mut pair_ids: Vec<u32> = members.iter().map(|e| e.pair_index).collect();
            pair_ids.sort_unstable();
            pair_ids.dedup();

            // Contested pairs went to bigger windows; what remains must
            // still clear the admission threshold on its own.
            if pair_ids.len() < self.min_pairs_per_cluster {
                continue;
            }

            let cluster_id = self.clusters.len();
            self.clusters.push(Cluster {
                contig: window.contig,
                direction: window.direction,
                start: members.first().map(|e| e.location).unwrap_or(0),
                end: members.last().map(|e| e.location).unwrap_or(0),
                pair_count: pair_ids.len(),
            });
            for pair in pair_ids {
                self.assignment.insert(pair, cluster_id);
            }
        }

        log::debug!(
            "cluster discovery: {} clusters over {} assigned pairs",
            self.clusters.len(),
            self.assignment.len()
        );
    }

    /// Cluster assigned to `pair_index`, if any. Valid after discovery.
    pub fn cluster_for(&self, pair_index: u32) -> Option<&Cluster> {
        debug_assert!(self.discovered, "cluster_for before discovery");
        self.assignment
            .get(&pair_index)
            .map(|&id| &self.clusters[id])
    }

    /// All admitted clusters.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }
}

/// MAPQ boost granted by cluster membership.
///
/// Monotonically non-decreasing in cluster cardinality, identity below the
/// admission threshold, clamped to the MAPQ ceiling. Many sibling pairs
/// from the same molecule agreeing on a region turn a weakly supported
/// candidate into a confident call.
pub fn cluster_mapq_boost(
    base_mapq: u8,
    cluster_pairs: usize,
    min_pairs_per_cluster: usize,
) -> u8 {
    let threshold = min_pairs_per_cluster.max(1);
    if cluster_pairs < threshold {
        return base_mapq;
    }
    let magnitude = (cluster_pairs / threshold).ilog2();
    let boosted = u32::from(base_mapq) + 10 + 4 * magnitude;
    boosted.min(u32::from(MAX_MAPQ)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(span: u64, min_pairs: usize) -> ClusterIndex {
        ClusterIndex::new(span, min_pairs, vec![0, 1_000_000])
    }

    #[test]
    fn test_cluster_admission_threshold() {
        let mut idx = index(1000, 3);
        idx.insert(0, 100, Direction::Forward, 1);
        idx.insert(1, 200, Direction::Forward, 1);
        idx.discover_clusters();
        assert!(idx.clusters().is_empty());
        assert!(idx.cluster_for(0).is_none());

        let mut idx = index(1000, 3);
        idx.insert(0, 100, Direction::Forward, 1);
        idx.insert(1, 200, Direction::Forward, 1);
        idx.insert(2, 300, Direction::Forward, 1);
        idx.discover_clusters();
        assert_eq!(idx.clusters().len(), 1);
        assert_eq!(idx.cluster_for(1).unwrap().pair_count, 3);
    }

    #[test]
    fn test_cluster_span_bound() {
        // Entries 5000 apart with a 1000 span never form one cluster.
        let mut idx = index(1000, 2);
        idx.insert(0, 1000, Direction::Forward, 1);
        idx.insert(1, 6000, Direction::Forward, 1);
        idx.discover_clusters();
        assert!(idx.clusters().is_empty());

        // Adjacent buckets still cluster when within the span.
        let mut idx = index(1000, 2);
        idx.insert(0, 950, Direction::Forward, 1);
        idx.insert(1, 1050, Direction::Forward, 1);
        idx.discover_clusters();
        assert_eq!(idx.clusters().len(), 1);
        let c = idx.cluster_for(0).unwrap();
        assert!(c.end - c.start <= 1000);
    }

    #[test]
    fn test_strands_do_not_mix() {
        let mut idx = index(1000, 2);
        idx.insert(0, 100, Direction::Forward, 1);
        idx.insert(1, 200, Direction::ReverseComplement, 1);
        idx.discover_clusters();
        assert!(idx.clusters().is_empty());
    }

    #[test]
    fn test_no_pair_in_two_clusters() {
        // Pair 2 sits between two dense groups; it may join only one.
        let mut idx = index(500, 3);
        for (pair, loc) in [(0u32, 100u64), (1, 150), (2, 400)] {
            idx.insert(pair, loc, Direction::Forward, 1);
        }
        for (pair, loc) in [(3u32, 700u64), (4, 750), (5, 800)] {
            idx.insert(pair, loc, Direction::Forward, 1);
        }
        idx.discover_clusters();

        let mut seen = std::collections::HashMap::new();
        for pair in 0u32..6 {
            if let Some(c) = idx.cluster_for(pair) {
                *seen.entry((c.start, c.end)).or_insert(0usize) += 1;
            }
        }
        let total_assigned: usize = seen.values().sum();
        let distinct_pairs = (0u32..6).filter(|&p| idx.cluster_for(p).is_some()).count();
        assert_eq!(total_assigned, distinct_pairs);
    }

    #[test]
    fn test_largest_cluster_wins_contested_pair() {
        // Pair 9's candidates fall in both a 3-pair and a 5-pair window;
        // the bigger window claims it.
        let mut idx = index(1000, 3);
        for (pair, loc) in [(0u32, 100u64), (1, 200), (9, 300)] {
            idx.insert(pair, loc, Direction::Forward, 1);
        }
        for (pair, loc) in [(3u32, 50_000u64), (4, 50_100), (5, 50_200), (6, 50_300), (9, 50_400)]
        {
            idx.insert(pair, loc, Direction::Forward, 1);
        }
        idx.discover_clusters();
        let c = idx.cluster_for(9).unwrap();
        assert!(c.start >= 50_000, "pair 9 should join the larger cluster");
    }

    #[test]
    fn test_boost_monotonic_and_clamped() {
        let mut last = 0u8;
        for pairs in 0..200 {
            let boosted = cluster_mapq_boost(1, pairs, 10);
            assert!(boosted >= last, "boost must be monotonic");
            assert!(boosted <= MAX_MAPQ);
            last = boosted;
        }
        // Below the threshold the boost is the identity.
        assert_eq!(cluster_mapq_boost(5, 9, 10), 5);
        // At or above it, strictly greater (until the clamp).
        assert!(cluster_mapq_boost(5, 10, 10) > 5);
        assert_eq!(cluster_mapq_boost(69, 1000, 10), MAX_MAPQ);
    }
}

//! Banded edit-distance kernel.
//!
//! Computes the minimum edit distance between a read (the pattern) and a
//! reference window (the text), anchored at the start of the window with a
//! free trailing end, bounded by a caller-supplied limit. The kernel is the
//! only scoring primitive in the pipeline; every reported score comes from
//! here.
//!
//! Two optimizations are switchable and behavior-preserving:
//! - Ukkonen banding restricts each DP row to the diagonal band that can
//!   still finish within the limit.
//! - Truncation abandons a row whose minimum already exceeds the limit.

/// Configuration for the kernel; copied from the aligner parameters.
#[derive(Debug, Clone, Copy)]
pub struct DistanceKernel {
    pub use_ukkonen: bool,
    pub use_truncation: bool,
}

impl DistanceKernel {
    /// Scratch words needed for a text window of `text_len` bases.
    /// Two DP rows of `text_len + 1` cells each.
    #[inline]
    pub fn scratch_words(text_len: usize) -> usize {
        2 * (text_len + 1)
    }

    /// Edit distance of `pattern` against a prefix-anchored alignment into
    /// `text`, or `None` if it exceeds `limit`.
    ///
    /// The alignment must start at `text[0]`; trailing text bases are free.
    /// `scratch` must hold at least [`Self::scratch_words`] cells for
    /// `text.len()`.
    pub fn distance(
        &self,
        text: &[u8],
        pattern: &[u8],
        limit: i32,
        scratch: &mut [i32],
    ) -> Option<i32> {
        if limit < 0 {
            return None;
        }
        let m = pattern.len();
        let n = text.len();
        if m == 0 {
            return Some(0);
        }
        // The pattern cannot fit: every alignment deletes the overhang.
        if m > n + limit as usize {
            return None;
        }

        let width = n + 1;
        debug_assert!(scratch.len() >= 2 * width);
        let (prev, curr) = scratch[..2 * width].split_at_mut(width);

        // Row 0: consuming text without pattern costs one deletion per base.
        for (j, cell) in prev.iter_mut().enumerate() {
            *cell = j as i32;
        }

        let band = limit as usize;
        let mut last_lo = 0usize;
        let mut last_hi = n;
        for i in 1..=m {
            // Columns outside |i - j| <= limit cannot finish within the
            // limit; with banding off we sweep the whole row and get the
            // same answer for every in-limit result.
            let (lo, hi) = if self.use_ukkonen {
                (i.saturating_sub(band), (i + band).min(n))
            } else {
                (0, n)
            };

            // Left sentinel: the cell just outside the band is at least
            // i - (lo - 1) = limit + 1 edits deep, so row index i is a safe
            // stand-in for it.
            curr[lo.saturating_sub(1)] = i as i32;
            let mut row_min = curr[lo.saturating_sub(1)];
            let pb = pattern[i - 1];
            for j in lo.max(1)..=hi {
                let sub = prev[j - 1] + i32::from(text[j - 1] != pb);
                let del = prev[j] + 1;
                let ins = curr[j - 1] + 1;
                let cell = sub.min(del).min(ins);
                curr[j] = cell;
                if cell < row_min {
                    row_min = cell;
                }
            }
            // Seed the column just past the band so the next row's delete
            // lookup never reads a stale cell.
            if hi < n {
                curr[hi + 1] = limit + 1;
            }
            if self.use_truncation && row_min > limit {
                return None;
            }
            prev[..width].copy_from_slice(&curr[..width]);
            last_lo = lo;
            last_hi = hi;
        }

        // Free trailing text: best cell in the final row. Columns outside
        // the final band are at least limit + 1 deep and never win.
        let best = prev[last_lo..=last_hi]
            .iter()
            .copied()
            .min()
            .unwrap_or(i32::MAX);
        if best > limit {
            None
        } else {
            Some(best)
        }
    }
}

//! Per-pixel sample bookkeeping.
//!
//! Every pixel has a live sample count and an allocated capacity
//! (in sample slots), plus a cumulative-capacity prefix sum that turns a
//! `(pixel, sample)` pair into a byte offset in the shared flat buffer
//! with one multiply. Capacities can be set freely before the buffer is
//! allocated; afterwards they only grow, and growth requires rebasing the
//! prefix sum of every subsequent pixel.

/// Per-pixel sample counts, capacities, and the cumulative-capacity
/// prefix sum.
#[derive(Debug, Clone, Default)]
pub struct PixelTable {
    nsamples: Vec<u32>,
    capacity: Vec<u32>,
    cumcapacity: Vec<u64>,
}

impl PixelTable {
    /// Creates a table for `npixels` pixels, all with zero samples.
    pub fn new(npixels: usize) -> Self {
        Self {
            nsamples: vec![0; npixels],
            capacity: vec![0; npixels],
            cumcapacity: vec![0; npixels],
        }
    }

    /// Number of pixels.
    #[inline]
    pub fn npixels(&self) -> usize {
        self.nsamples.len()
    }

    /// Live sample count of `pixel`, 0 for out of range.
    #[inline]
    pub fn samples(&self, pixel: usize) -> u32 {
        self.nsamples.get(pixel).copied().unwrap_or(0)
    }

    /// Allocated capacity of `pixel` in sample slots, 0 for out of range.
    #[inline]
    pub fn capacity(&self, pixel: usize) -> u32 {
        self.capacity.get(pixel).copied().unwrap_or(0)
    }

    /// Sum of capacities of all pixels strictly before `pixel`.
    /// Only meaningful once [`build_cumulative`](Self::build_cumulative)
    /// has run (i.e. after allocation).
    #[inline]
    pub fn cumcapacity(&self, pixel: usize) -> u64 {
        self.cumcapacity.get(pixel).copied().unwrap_or(0)
    }

    /// Directly sets the sample count, bumping capacity to match.
    /// Pre-allocation path only; after allocation sample-count changes go
    /// through insert/erase so existing data survives.
    pub fn set_samples_raw(&mut self, pixel: usize, samps: u32) {
        if let Some(n) = self.nsamples.get_mut(pixel) {
            *n = samps;
            if self.capacity[pixel] < samps {
                self.capacity[pixel] = samps;
            }
        }
    }

    /// Overwrites just the live sample count. The caller is responsible
    /// for keeping `count <= capacity`.
    pub(crate) fn set_count(&mut self, pixel: usize, count: u32) {
        if let Some(n) = self.nsamples.get_mut(pixel) {
            debug_assert!(count <= self.capacity[pixel]);
            *n = count;
        }
    }

    /// Bulk sample counts for every pixel; single linear pass.
    /// Pre-allocation path only. No-op unless `samples` covers every pixel.
    pub fn set_all_samples_raw(&mut self, samples: &[u32]) {
        if samples.len() != self.nsamples.len() {
            return;
        }
        self.nsamples.copy_from_slice(samples);
        for (cap, &s) in self.capacity.iter_mut().zip(samples) {
            if *cap < s {
                *cap = s;
            }
        }
    }

    /// Directly overwrites the capacity of `pixel`. Pre-allocation path
    /// only; the caller keeps `capacity >= nsamples`.
    pub(crate) fn set_capacity_raw(&mut self, pixel: usize, cap: u32) {
        if let Some(c) = self.capacity.get_mut(pixel) {
            debug_assert!(cap >= self.nsamples[pixel]);
            *c = cap;
        }
    }

    /// Records a new capacity for `pixel`, returning the old one if it
    /// actually grew. Capacity never shrinks through this call.
    pub(crate) fn grow_capacity(&mut self, pixel: usize, cap: u32) -> Option<u32> {
        let old = *self.capacity.get(pixel)?;
        if cap <= old {
            return None;
        }
        self.capacity[pixel] = cap;
        Some(old)
    }

    /// Recomputes the full prefix sum and returns the total capacity in
    /// sample slots. Called once, at allocation time.
    pub(crate) fn build_cumulative(&mut self) -> u64 {
        let mut total = 0u64;
        for (i, &cap) in self.capacity.iter().enumerate() {
            self.cumcapacity[i] = total;
            total += cap as u64;
        }
        total
    }

    /// Adds `delta` slots to the cumulative offset of every pixel after
    /// `pixel`. Restores invariant 2 after a single pixel's capacity grows.
    pub(crate) fn rebase_after(&mut self, pixel: usize, delta: u64) {
        for c in self.cumcapacity.iter_mut().skip(pixel + 1) {
            *c += delta;
        }
    }

    /// Total capacity in sample slots across all pixels.
    pub fn total_capacity(&self) -> u64 {
        self.capacity.iter().map(|&c| c as u64).sum()
    }

    /// All live sample counts, in pixel order.
    pub fn all_samples(&self) -> &[u32] {
        &self.nsamples
    }

    /// All capacities, in pixel order.
    pub(crate) fn all_capacities(&self) -> &[u32] {
        &self.capacity
    }

    /// Checks invariants 1 and 2: capacity covers samples for every
    /// pixel, and (when `cumulative` is set) the prefix sum is exact.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self, cumulative: bool) {
        let mut running = 0u64;
        for p in 0..self.npixels() {
            assert!(self.capacity[p] >= self.nsamples[p], "pixel {}", p);
            if cumulative {
                assert_eq!(self.cumcapacity[p], running, "pixel {}", p);
            }
            running += self.capacity[p] as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_reads() {
        let table = PixelTable::new(4);
        assert_eq!(table.samples(99), 0);
        assert_eq!(table.capacity(99), 0);
    }

    #[test]
    fn test_set_samples_bumps_capacity() {
        let mut table = PixelTable::new(4);
        table.set_samples_raw(1, 5);
        assert_eq!(table.samples(1), 5);
        assert_eq!(table.capacity(1), 5);
        // Shrinking the count leaves capacity alone.
        table.set_samples_raw(1, 2);
        assert_eq!(table.samples(1), 2);
        assert_eq!(table.capacity(1), 5);
        table.check_invariants(false);
    }

    #[test]
    fn test_cumulative_prefix() {
        let mut table = PixelTable::new(4);
        table.set_samples_raw(0, 2);
        table.set_samples_raw(1, 3);
        table.set_samples_raw(3, 1);
        let total = table.build_cumulative();
        assert_eq!(total, 6);
        assert_eq!(table.cumcapacity(0), 0);
        assert_eq!(table.cumcapacity(1), 2);
        assert_eq!(table.cumcapacity(2), 5);
        assert_eq!(table.cumcapacity(3), 5);
        table.check_invariants(true);
    }

    #[test]
    fn test_grow_and_rebase() {
        let mut table = PixelTable::new(3);
        table.set_samples_raw(0, 2);
        table.set_samples_raw(1, 2);
        table.set_samples_raw(2, 2);
        table.build_cumulative();

        let old = table.grow_capacity(1, 5);
        assert_eq!(old, Some(2));
        table.rebase_after(1, 3);
        table.check_invariants(true);

        // Growing to a smaller or equal capacity is a no-op.
        assert_eq!(table.grow_capacity(1, 4), None);
        assert_eq!(table.grow_capacity(1, 5), None);
    }

    #[test]
    fn test_set_all_samples_requires_full_cover() {
        let mut table = PixelTable::new(3);
        table.set_all_samples_raw(&[1, 2]); // wrong length, ignored
        assert_eq!(table.samples(0), 0);
        table.set_all_samples_raw(&[1, 2, 3]);
        assert_eq!(table.samples(2), 3);
        assert_eq!(table.total_capacity(), 6);
    }
}

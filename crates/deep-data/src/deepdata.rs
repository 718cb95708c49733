//! The deep-pixel container and its depth-compositing algorithms.
//!
//! [`DeepData`] holds the contents of an image of "deep" pixels: pixels
//! with a variable number of depth samples, as used by OpenEXR deep
//! scanline/tile images and deep compositing workflows. Each sample is a
//! fixed-size record of channel values; all samples of all pixels live in
//! one flat buffer that is allocated lazily, once total capacity is
//! known.
//!
//! # Access contract
//!
//! Accessors are deliberately permissive: an out-of-range pixel, channel,
//! or sample index reads as zero (or `None` for slice views) and writes
//! are dropped. Deep data comes from production pipelines where partial
//! or corrupt input should degrade gracefully rather than abort a render.
//! Operations that combine two containers return `false` on a channel
//! count mismatch; the caller decides how loud to be about it.
//!
//! # Sharing discipline
//!
//! `DeepData` is a passive value type: mutation goes through `&mut self`,
//! so the capacity-growth hazards of the shared prefix sum cannot be
//! raced by construction. For parallel fill by format readers,
//! [`DeepData::pixel_chunks_mut`] hands out disjoint per-pixel byte
//! regions that independent threads may write without any lock.
//!
//! # Example
//!
//! ```
//! use deep_data::DeepData;
//! use deep_core::TypeDesc;
//!
//! let mut dd = DeepData::new(100, &[TypeDesc::FLOAT; 5], &["R", "G", "B", "A", "Z"]);
//! dd.set_samples(0, 2);
//! dd.set_deep_value(0, 4, 0, 0.5); // Z of first sample
//! dd.set_deep_value(0, 4, 1, 2.0); // Z of second sample
//! dd.sort(0);
//! ```

use deep_core::{DeepSpec, TypeDesc};
use smallvec::SmallVec;

use crate::layout::{ChannelLayout, ChannelRole};
use crate::store::{self, SampleStore};
use crate::table::PixelTable;

/// Alphas below this are treated as zero when redistributing color in
/// [`DeepData::split`]; dividing by them would amplify noise.
const ALPHA_EPSILON: f32 = 1e-6;

/// Container for deep-pixel sample data plus the compositing algorithms
/// that operate on it.
#[derive(Debug, Clone, Default)]
pub struct DeepData {
    layout: ChannelLayout,
    table: PixelTable,
    store: SampleStore,
}

impl DeepData {
    /// Creates an empty, uninitialized container.
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// Creates a container with `npixels` pixels and the given channels.
    /// Channel types may supply a single entry to be replicated.
    pub fn new(npixels: usize, channeltypes: &[TypeDesc], channelnames: &[&str]) -> Self {
        let mut dd = Self::default();
        let names: Vec<String> = channelnames.iter().map(|s| s.to_string()).collect();
        dd.init(npixels, channelnames.len(), channeltypes, &names);
        dd
    }

    /// Creates a container sized and typed from an image descriptor.
    pub fn from_spec(spec: &DeepSpec) -> Self {
        let mut dd = Self::default();
        dd.init_from_spec(spec);
        dd
    }

    /// Resets all state and re-resolves channel roles. All pixels start
    /// with zero samples; no sample storage is allocated yet.
    pub fn init(
        &mut self,
        npixels: usize,
        nchannels: usize,
        channeltypes: &[TypeDesc],
        channelnames: &[String],
    ) {
        self.layout = ChannelLayout::new(nchannels, channeltypes, channelnames);
        self.table = PixelTable::new(npixels);
        self.store = SampleStore::default();
    }

    /// [`init`](Self::init) from a [`DeepSpec`] descriptor.
    pub fn init_from_spec(&mut self, spec: &DeepSpec) {
        let types = spec.resolved_channelformats();
        self.init(
            spec.image_pixels() as usize,
            spec.nchannels,
            &types,
            &spec.channel_names,
        );
    }

    /// Resets to the empty initial state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Alias for [`clear`](Self::clear): resetting drops the sample
    /// buffer, so memory is released immediately.
    pub fn free(&mut self) {
        self.clear();
    }

    /// Whether the container has been initialized with pixels.
    pub fn initialized(&self) -> bool {
        self.table.npixels() > 0
    }

    /// Whether the sample buffer has been allocated. While false,
    /// capacity changes are cheap.
    pub fn allocated(&self) -> bool {
        self.store.allocated()
    }

    // ------------------------------------------------------------------
    // Layout accessors
    // ------------------------------------------------------------------

    /// Total number of pixels.
    #[inline]
    pub fn pixels(&self) -> usize {
        self.table.npixels()
    }

    /// Number of channels per sample.
    #[inline]
    pub fn channels(&self) -> usize {
        self.layout.nchannels()
    }

    /// Name of channel `c`, `""` for out of range.
    pub fn channelname(&self, c: usize) -> &str {
        self.layout.name(c)
    }

    /// Storage type of channel `c`.
    pub fn channeltype(&self, c: usize) -> TypeDesc {
        self.layout.channel_type(c)
    }

    /// Size in bytes of one datum of channel `c`.
    pub fn channelsize(&self, c: usize) -> usize {
        self.layout.channel_size(c)
    }

    /// Size in bytes of one full sample record.
    pub fn samplesize(&self) -> usize {
        self.layout.samplesize()
    }

    /// Resolved channel index for a semantic role, if any.
    pub fn role_channel(&self, role: ChannelRole) -> Option<usize> {
        self.layout.role(role)
    }

    /// The Z (depth front) channel.
    #[inline]
    pub fn z_channel(&self) -> Option<usize> {
        self.layout.role(ChannelRole::Z)
    }

    /// The Zback channel; aliases Z when no Zback exists.
    #[inline]
    pub fn zback_channel(&self) -> Option<usize> {
        self.layout.role(ChannelRole::ZBack)
    }

    /// The combined alpha channel.
    #[inline]
    pub fn a_channel(&self) -> Option<usize> {
        self.layout.role(ChannelRole::Alpha)
    }

    /// The AR channel, falling back to the combined alpha.
    #[inline]
    pub fn ar_channel(&self) -> Option<usize> {
        self.layout.ar_or_alpha()
    }

    /// The AG channel, falling back to the combined alpha.
    #[inline]
    pub fn ag_channel(&self) -> Option<usize> {
        self.layout.ag_or_alpha()
    }

    /// The AB channel, falling back to the combined alpha.
    #[inline]
    pub fn ab_channel(&self) -> Option<usize> {
        self.layout.ab_or_alpha()
    }

    /// Whether `other` has exactly the same channel types, in order.
    pub fn same_channeltypes(&self, other: &DeepData) -> bool {
        self.layout.same_channeltypes(&other.layout)
    }

    /// All channel types, in channel order.
    pub fn all_channeltypes(&self) -> &[TypeDesc] {
        self.layout.channel_types()
    }

    // ------------------------------------------------------------------
    // Sample counts and capacity
    // ------------------------------------------------------------------

    /// Live sample count of `pixel`, 0 for out of range.
    #[inline]
    pub fn samples(&self, pixel: usize) -> u32 {
        self.table.samples(pixel)
    }

    /// Allocated capacity of `pixel` in sample slots.
    #[inline]
    pub fn capacity(&self, pixel: usize) -> u32 {
        self.table.capacity(pixel)
    }

    /// All live sample counts, in pixel order.
    pub fn all_samples(&self) -> &[u32] {
        self.table.all_samples()
    }

    /// Sets the sample count of one pixel.
    ///
    /// Before allocation this just records the count (bumping capacity to
    /// match). After allocation it becomes an insert or erase at the end
    /// of the pixel's sample list, so surviving samples keep their
    /// contents.
    pub fn set_samples(&mut self, pixel: usize, samps: u32) {
        if pixel >= self.table.npixels() {
            return;
        }
        if !self.store.allocated() {
            self.table.set_samples_raw(pixel, samps);
            return;
        }
        let cur = self.table.samples(pixel);
        if samps > cur {
            self.insert_samples(pixel, cur as usize, (samps - cur) as usize);
        } else if samps < cur {
            self.erase_samples(pixel, samps as usize, (cur - samps) as usize);
        }
    }

    /// Bulk form of [`set_samples`](Self::set_samples); `samples` must
    /// cover every pixel. A single linear pass when unallocated.
    pub fn set_all_samples(&mut self, samples: &[u32]) {
        if samples.len() != self.table.npixels() {
            tracing::warn!(
                given = samples.len(),
                npixels = self.table.npixels(),
                "set_all_samples: length mismatch, ignoring"
            );
            return;
        }
        if !self.store.allocated() {
            self.table.set_all_samples_raw(samples);
        } else {
            for (pixel, &s) in samples.iter().enumerate() {
                self.set_samples(pixel, s);
            }
        }
    }

    /// Sets the capacity of one pixel.
    ///
    /// Cheap before allocation. Afterwards capacity only grows: growing
    /// inserts a gap into the shared buffer and rebases the cumulative
    /// offset of every subsequent pixel, an O(bytes after this pixel)
    /// operation. Requests at or below the current capacity are ignored.
    pub fn set_capacity(&mut self, pixel: usize, cap: u32) {
        if pixel >= self.table.npixels() {
            return;
        }
        if !self.store.allocated() {
            // Record only; never drop below the live sample count.
            let floor = self.table.samples(pixel);
            self.table.set_capacity_raw(pixel, cap.max(floor));
            return;
        }
        self.grow_capacity_allocated(pixel, cap);
    }

    fn grow_capacity_allocated(&mut self, pixel: usize, cap: u32) {
        let Some(old) = self.table.grow_capacity(pixel, cap) else {
            return;
        };
        let delta = (cap - old) as u64;
        let samplesize = self.layout.samplesize();
        let gap_offset = (self.table.cumcapacity(pixel) + old as u64) as usize * samplesize;
        tracing::debug!(pixel, old, new = cap, "growing pixel capacity after allocation");
        self.store.insert_gap(gap_offset, delta as usize * samplesize);
        self.table.rebase_after(pixel, delta);
    }

    /// One-time lazy allocation: computes the cumulative-capacity prefix
    /// sum from the capacities set so far and sizes the flat buffer.
    fn ensure_allocated(&mut self) {
        if self.store.allocated() {
            return;
        }
        let total = self.table.build_cumulative();
        let nbytes = total as usize * self.layout.samplesize();
        tracing::trace!(total_samples = total, nbytes, "allocating deep sample buffer");
        self.store.allocate(nbytes);
    }

    // ------------------------------------------------------------------
    // Addressing and typed value access
    // ------------------------------------------------------------------

    /// Byte offset of sample `sample` of `pixel` in the flat buffer.
    /// Valid only once allocated and for in-range indices.
    #[inline]
    fn sample_offset(&self, pixel: usize, sample: usize) -> usize {
        (self.table.cumcapacity(pixel) as usize + sample) * self.layout.samplesize()
    }

    /// Byte offset of `(pixel, channel, sample)`, or `None` for any
    /// out-of-range index or before allocation.
    fn datum_offset(&self, pixel: usize, channel: usize, sample: usize) -> Option<usize> {
        if !self.store.allocated()
            || pixel >= self.table.npixels()
            || channel >= self.layout.nchannels()
            || sample >= self.table.samples(pixel) as usize
        {
            return None;
        }
        Some(self.sample_offset(pixel, sample) + self.layout.channel_offset(channel))
    }

    /// The raw bytes of one channel datum, or `None` for invalid indices.
    pub fn sample_bytes(&self, pixel: usize, channel: usize, sample: usize) -> Option<&[u8]> {
        let offset = self.datum_offset(pixel, channel, sample)?;
        Some(&self.store.data()[offset..offset + self.layout.channel_size(channel)])
    }

    /// Mutable raw bytes of one channel datum. Triggers the one-time
    /// lazy allocation.
    pub fn sample_bytes_mut(
        &mut self,
        pixel: usize,
        channel: usize,
        sample: usize,
    ) -> Option<&mut [u8]> {
        self.ensure_allocated();
        let offset = self.datum_offset(pixel, channel, sample)?;
        let size = self.layout.channel_size(channel);
        Some(&mut self.store.data_mut()[offset..offset + size])
    }

    /// Value of channel `channel`, sample `sample` of `pixel`, converted
    /// to f32. Reads as 0.0 for any invalid index.
    pub fn deep_value(&self, pixel: usize, channel: usize, sample: usize) -> f32 {
        match self.datum_offset(pixel, channel, sample) {
            Some(offset) => store::read_f32(
                self.store.data(),
                offset,
                self.layout.channel_type(channel).basetype,
            ),
            None => 0.0,
        }
    }

    /// Like [`deep_value`](Self::deep_value) but converted to u32, for
    /// integer channels such as object IDs and sample flags.
    pub fn deep_value_uint(&self, pixel: usize, channel: usize, sample: usize) -> u32 {
        match self.datum_offset(pixel, channel, sample) {
            Some(offset) => store::read_u32(
                self.store.data(),
                offset,
                self.layout.channel_type(channel).basetype,
            ),
            None => 0,
        }
    }

    /// Writes `value` converted to the channel's storage type. Dropped
    /// silently for invalid indices. Triggers lazy allocation.
    pub fn set_deep_value(&mut self, pixel: usize, channel: usize, sample: usize, value: f32) {
        self.ensure_allocated();
        if let Some(offset) = self.datum_offset(pixel, channel, sample) {
            let ty = self.layout.channel_type(channel).basetype;
            store::write_f32(self.store.data_mut(), offset, ty, value);
        }
    }

    /// u32 variant of [`set_deep_value`](Self::set_deep_value).
    pub fn set_deep_value_uint(
        &mut self,
        pixel: usize,
        channel: usize,
        sample: usize,
        value: u32,
    ) {
        self.ensure_allocated();
        if let Some(offset) = self.datum_offset(pixel, channel, sample) {
            let ty = self.layout.channel_type(channel).basetype;
            store::write_u32(self.store.data_mut(), offset, ty, value);
        }
    }

    // ------------------------------------------------------------------
    // Sample list mutation
    // ------------------------------------------------------------------

    /// Inserts `n` sample slots at index `samplepos` of `pixel`, growing
    /// capacity if needed and shifting later samples forward. The new
    /// slots are uninitialized until written.
    pub fn insert_samples(&mut self, pixel: usize, samplepos: usize, n: usize) {
        if n == 0 || pixel >= self.table.npixels() {
            return;
        }
        self.ensure_allocated();
        let old = self.table.samples(pixel) as usize;
        let samplepos = samplepos.min(old);
        let needed = (old + n) as u32;
        if needed > self.table.capacity(pixel) {
            self.grow_capacity_allocated(pixel, needed);
        }
        let samplesize = self.layout.samplesize();
        let base = self.sample_offset(pixel, samplepos);
        let move_bytes = (old - samplepos) * samplesize;
        if move_bytes > 0 {
            // copy_within handles the overlap; trailing samples shift
            // forward by n slots.
            self.store
                .data_mut()
                .copy_within(base..base + move_bytes, base + n * samplesize);
        }
        self.table.set_count(pixel, needed);
    }

    /// Erases up to `n` samples starting at `samplepos`, shifting later
    /// samples back. Capacity is not reclaimed: the freed slots become
    /// holes, trading memory for speed.
    pub fn erase_samples(&mut self, pixel: usize, samplepos: usize, n: usize) {
        if pixel >= self.table.npixels() {
            return;
        }
        let old = self.table.samples(pixel) as usize;
        if samplepos >= old {
            return;
        }
        let n = n.min(old - samplepos);
        if n == 0 {
            return;
        }
        if self.store.allocated() {
            let samplesize = self.layout.samplesize();
            let dst = self.sample_offset(pixel, samplepos);
            let src = dst + n * samplesize;
            let move_bytes = (old - samplepos - n) * samplesize;
            if move_bytes > 0 {
                self.store.data_mut().copy_within(src..src + move_bytes, dst);
            }
        }
        self.table.set_count(pixel, (old - n) as u32);
    }

    /// Copies one full sample record from `src`. Channels convert by
    /// value (through f32), or through the uint path when both sides
    /// store exact unsigned-32 to avoid precision loss. Returns false on
    /// a channel count mismatch or invalid indices.
    pub fn copy_deep_sample(
        &mut self,
        pixel: usize,
        sample: usize,
        src: &DeepData,
        srcpixel: usize,
        srcsample: usize,
    ) -> bool {
        if src.channels() != self.channels() {
            tracing::warn!(
                dst = self.channels(),
                src = src.channels(),
                "copy_deep_sample: channel count mismatch"
            );
            return false;
        }
        self.ensure_allocated();
        if sample >= self.table.samples(pixel) as usize
            || srcsample >= src.table.samples(srcpixel) as usize
        {
            return false;
        }
        if self.same_channeltypes(src) && src.allocated() {
            let samplesize = self.layout.samplesize();
            let dst_off = self.sample_offset(pixel, sample);
            let src_off = src.sample_offset(srcpixel, srcsample);
            self.store.data_mut()[dst_off..dst_off + samplesize]
                .copy_from_slice(&src.store.data()[src_off..src_off + samplesize]);
            return true;
        }
        for c in 0..self.channels() {
            let dst_ty = self.layout.channel_type(c).basetype;
            let src_ty = src.layout.channel_type(c).basetype;
            if dst_ty == deep_core::BaseType::UInt32 && src_ty == deep_core::BaseType::UInt32 {
                let v = src.deep_value_uint(srcpixel, c, srcsample);
                self.set_deep_value_uint(pixel, c, sample, v);
            } else {
                let v = src.deep_value(srcpixel, c, srcsample);
                self.set_deep_value(pixel, c, sample, v);
            }
        }
        true
    }

    /// Copies an entire pixel's sample list from `src`. An out-of-range
    /// source pixel reads as empty (destination gets zero samples; not an
    /// error). A matching channel type list end-to-end copies raw bytes.
    pub fn copy_deep_pixel(&mut self, pixel: usize, src: &DeepData, srcpixel: usize) -> bool {
        if pixel >= self.table.npixels() {
            return false;
        }
        if srcpixel >= src.pixels() {
            self.set_samples(pixel, 0);
            return true;
        }
        if src.channels() != self.channels() {
            tracing::warn!(
                dst = self.channels(),
                src = src.channels(),
                "copy_deep_pixel: channel count mismatch"
            );
            return false;
        }
        let nsamples = src.samples(srcpixel);
        self.set_samples(pixel, nsamples);
        if nsamples == 0 {
            return true;
        }
        self.ensure_allocated();
        if self.same_channeltypes(src) && src.allocated() {
            let nbytes = nsamples as usize * self.layout.samplesize();
            let dst_off = self.sample_offset(pixel, 0);
            let src_off = src.sample_offset(srcpixel, 0);
            self.store.data_mut()[dst_off..dst_off + nbytes]
                .copy_from_slice(&src.store.data()[src_off..src_off + nbytes]);
            return true;
        }
        for s in 0..nsamples as usize {
            if !self.copy_deep_sample(pixel, s, src, srcpixel, s) {
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Bulk extraction
    // ------------------------------------------------------------------

    /// The entire flat sample buffer. Triggers lazy allocation, so the
    /// cumulative offsets are final afterwards.
    pub fn all_data(&mut self) -> &[u8] {
        self.ensure_allocated();
        self.store.data()
    }

    /// The live samples of one pixel as raw bytes
    /// (`samples(pixel) * samplesize()` long), or `None` when out of
    /// range or unallocated.
    pub fn pixel_data(&self, pixel: usize) -> Option<&[u8]> {
        if !self.store.allocated() || pixel >= self.table.npixels() {
            return None;
        }
        let base = self.sample_offset(pixel, 0);
        let nbytes = self.table.samples(pixel) as usize * self.layout.samplesize();
        Some(&self.store.data()[base..base + nbytes])
    }

    /// Iterator over every pixel's capacity region as disjoint mutable
    /// byte slices, in pixel order. Triggers lazy allocation.
    ///
    /// This is the lock-free parallel fill path: the regions partition
    /// the buffer, so independent threads can each take a chunk and
    /// write sample data without synchronization (e.g. via
    /// `std::thread::scope` or rayon), as long as no capacity changes
    /// happen concurrently, which `&mut self` already guarantees.
    pub fn pixel_chunks_mut(&mut self) -> PixelChunksMut<'_> {
        self.ensure_allocated();
        PixelChunksMut {
            rest: self.store.data_mut(),
            caps: self.table.all_capacities().iter(),
            samplesize: self.layout.samplesize(),
        }
    }

    // ------------------------------------------------------------------
    // Compositing algorithms
    // ------------------------------------------------------------------

    /// Splits every sample of `pixel` whose depth interval strictly
    /// straddles `depth` into a front and back part meeting at `depth`,
    /// redistributing alpha and alpha-weighted color so the composited
    /// result is unchanged. Returns whether any sample was split; false
    /// if the layout has no Z channel.
    pub fn split(&mut self, pixel: usize, depth: f32) -> bool {
        let (Some(zchan), Some(zbackchan)) = (self.z_channel(), self.zback_channel()) else {
            return false;
        };
        let nch = self.channels();
        let mut split_occurred = false;
        let mut s = 0usize;
        while s < self.table.samples(pixel) as usize {
            let zf = self.deep_value(pixel, zchan, s);
            let zb = self.deep_value(pixel, zbackchan, s);
            if zf < depth && depth < zb {
                split_occurred = true;
                self.insert_samples(pixel, s + 1, 1);
                // Duplicate the full record into the new slot, then pull
                // the shared boundary to `depth`.
                let samplesize = self.layout.samplesize();
                let base = self.sample_offset(pixel, s);
                self.store
                    .data_mut()
                    .copy_within(base..base + samplesize, base + samplesize);
                self.set_deep_value(pixel, zbackchan, s, depth);
                self.set_deep_value(pixel, zchan, s + 1, depth);

                // Fractional widths of the two sub-intervals.
                let xf = (depth - zf) / (zb - zf);
                let xb = (zb - depth) / (zb - zf);

                // First pass: redistribute color by its alpha. The alpha
                // channels themselves must wait for a second pass, since
                // these computations read the original alpha.
                for c in 0..nch {
                    let Some(alphachan) = self.layout.my_alpha(c) else {
                        continue;
                    };
                    if alphachan == c {
                        continue;
                    }
                    let a = self.deep_value(pixel, alphachan, s);
                    let val = self.deep_value(pixel, c, s);
                    if a.abs() < ALPHA_EPSILON {
                        // Nearly clear: proportional by width.
                        self.set_deep_value(pixel, c, s, val * xf);
                        self.set_deep_value(pixel, c, s + 1, val * xb);
                    } else {
                        let af = -f32::exp_m1(xf * f32::ln_1p(-a));
                        let ab = -f32::exp_m1(xb * f32::ln_1p(-a));
                        self.set_deep_value(pixel, c, s, (af / a) * val);
                        self.set_deep_value(pixel, c, s + 1, (ab / a) * val);
                    }
                }
                // Second pass: the alphas.
                for c in 0..nch {
                    if self.layout.my_alpha(c) != Some(c) {
                        continue;
                    }
                    let a = self.deep_value(pixel, c, s);
                    let (af, ab) = if a >= 1.0 {
                        (1.0, 1.0)
                    } else {
                        (
                            -f32::exp_m1(xf * f32::ln_1p(-a)),
                            -f32::exp_m1(xb * f32::ln_1p(-a)),
                        )
                    };
                    self.set_deep_value(pixel, c, s, af);
                    self.set_deep_value(pixel, c, s + 1, ab);
                }
                // The back half starts exactly at `depth`; it cannot
                // straddle it again.
                s += 1;
            }
            s += 1;
        }
        split_occurred
    }

    /// Stable sort of `pixel`'s samples by `(Z, Zback)` ascending,
    /// physically reordering the sample records. No-op for fewer than
    /// two samples or without a Z channel.
    pub fn sort(&mut self, pixel: usize) {
        let Some(zchan) = self.z_channel() else {
            return;
        };
        let zbackchan = self.zback_channel().unwrap_or(zchan);
        let nsamples = self.table.samples(pixel) as usize;
        if nsamples <= 1 {
            return;
        }
        self.ensure_allocated();

        let keys: Vec<(f32, f32)> = (0..nsamples)
            .map(|s| {
                (
                    self.deep_value(pixel, zchan, s),
                    self.deep_value(pixel, zbackchan, s),
                )
            })
            .collect();
        let mut order: Vec<usize> = (0..nsamples).collect();
        order.sort_by(|&a, &b| {
            keys[a]
                .0
                .total_cmp(&keys[b].0)
                .then(keys[a].1.total_cmp(&keys[b].1))
        });
        if order.iter().enumerate().all(|(i, &s)| i == s) {
            return;
        }

        // Physical reorder through a one-pixel scratch buffer.
        let samplesize = self.layout.samplesize();
        let base = self.sample_offset(pixel, 0);
        let scratch = self.store.data()[base..base + nsamples * samplesize].to_vec();
        let data = self.store.data_mut();
        for (new_idx, &old_idx) in order.iter().enumerate() {
            data[base + new_idx * samplesize..base + (new_idx + 1) * samplesize]
                .copy_from_slice(&scratch[old_idx * samplesize..(old_idx + 1) * samplesize]);
        }
    }

    /// Collapses runs of consecutive samples with bit-identical
    /// `(Z, Zback)` into single samples using the "under" operator.
    /// The pixel must already be sorted.
    pub fn merge_overlaps(&mut self, pixel: usize) {
        let Some(zchan) = self.z_channel() else {
            return;
        };
        let zbackchan = self.zback_channel().unwrap_or(zchan);
        let nch = self.channels();
        let mut s = 1usize;
        while s < self.table.samples(pixel) as usize {
            let z0 = self.deep_value(pixel, zchan, s - 1);
            let z1 = self.deep_value(pixel, zchan, s);
            let zb0 = self.deep_value(pixel, zbackchan, s - 1);
            let zb1 = self.deep_value(pixel, zbackchan, s);
            if z0.to_bits() == z1.to_bits() && zb0.to_bits() == zb1.to_bits() {
                // Compute every merged value from the original samples
                // before writing anything; color merges read the
                // original alphas.
                let mut merged: SmallVec<[(usize, f32); 8]> = SmallVec::new();
                for c in 0..nch {
                    let Some(alphachan) = self.layout.my_alpha(c) else {
                        continue;
                    };
                    let a0 = self.deep_value(pixel, alphachan, s - 1);
                    let a1 = self.deep_value(pixel, alphachan, s);
                    let v = if alphachan == c {
                        a0 + a1 - a0 * a1
                    } else {
                        let c0 = self.deep_value(pixel, c, s - 1);
                        let c1 = self.deep_value(pixel, c, s);
                        merge_colors(a0, c0, a1, c1)
                    };
                    merged.push((c, v));
                }
                for (c, v) in merged {
                    self.set_deep_value(pixel, c, s - 1, v);
                }
                self.erase_samples(pixel, s, 1);
                // Stay at `s`: the next sample may now coincide too.
            } else {
                s += 1;
            }
        }
    }

    /// Merges all samples of `src`'s pixel into this pixel, producing a
    /// correctly composited union: samples of the result either coincide
    /// exactly or are disjoint in depth. Returns false on a channel
    /// count mismatch.
    pub fn merge_deep_pixels(&mut self, pixel: usize, src: &DeepData, srcpixel: usize) -> bool {
        let srcsamples = src.samples(srcpixel) as usize;
        if srcsamples == 0 {
            return true;
        }
        let dstsamples = self.samples(pixel) as usize;
        if dstsamples == 0 {
            return self.copy_deep_pixel(pixel, src, srcpixel);
        }
        if src.channels() != self.channels() {
            tracing::warn!(
                dst = self.channels(),
                src = src.channels(),
                "merge_deep_pixels: channel count mismatch"
            );
            return false;
        }

        self.set_samples(pixel, (dstsamples + srcsamples) as u32);
        self.ensure_allocated();
        for i in 0..srcsamples {
            self.copy_deep_sample(pixel, dstsamples + i, src, srcpixel, i);
        }
        self.sort(pixel);

        // Split at every sample boundary so any two samples either are
        // disjoint or exactly coincide, then collapse the coincident ones.
        if let (Some(zchan), Some(zbackchan)) = (self.z_channel(), self.zback_channel()) {
            let mut s = 0usize;
            while s < self.table.samples(pixel) as usize {
                let z = self.deep_value(pixel, zchan, s);
                let zback = self.deep_value(pixel, zbackchan, s);
                self.split(pixel, z);
                self.split(pixel, zback);
                s += 1;
            }
            self.sort(pixel);
            self.merge_overlaps(pixel);
        }
        true
    }

    /// Truncates the sample list after the first fully opaque sample
    /// (alpha >= 1); everything behind it is invisible. No-op without an
    /// alpha channel.
    pub fn occlusion_cull(&mut self, pixel: usize) {
        let Some(alphachan) = self.a_channel() else {
            return;
        };
        let nsamples = self.table.samples(pixel) as usize;
        for s in 0..nsamples {
            if self.deep_value(pixel, alphachan, s) >= 1.0 {
                self.set_samples(pixel, (s + 1) as u32);
                break;
            }
        }
    }

    /// The depth at which `pixel` becomes fully opaque: the Zback of the
    /// first sample (in order) whose alpha reaches 1.0, averaging
    /// AR/AG/AB when present. Returns `f32::MAX` for an empty pixel, a
    /// missing Z channel, or a pixel that never reaches full opacity;
    /// with no alpha information at all, the nearest sample's Z is the
    /// best available answer.
    pub fn opaque_z(&self, pixel: usize) -> f32 {
        let Some(zchan) = self.z_channel() else {
            return f32::MAX;
        };
        let nsamples = self.table.samples(pixel) as usize;
        if nsamples == 0 {
            return f32::MAX;
        }
        let Some(archan) = self.ar_channel() else {
            return self.deep_value(pixel, zchan, 0);
        };
        let agchan = self.ag_channel().unwrap_or(archan);
        let abchan = self.ab_channel().unwrap_or(archan);
        let zbackchan = self.zback_channel().unwrap_or(zchan);
        for s in 0..nsamples {
            let mut alpha = self.deep_value(pixel, archan, s);
            if agchan != archan || abchan != archan {
                alpha = (alpha
                    + self.deep_value(pixel, agchan, s)
                    + self.deep_value(pixel, abchan, s))
                    / 3.0;
            }
            if alpha >= 1.0 {
                return self.deep_value(pixel, zbackchan, s);
            }
        }
        f32::MAX
    }
}

/// Merges the colors of two coincident samples under the "under"
/// operator, weighting each by `-log1p(-a)/a` so near-zero alphas stay
/// numerically stable; coincident fully-opaque pairs average.
fn merge_colors(a0: f32, c0: f32, a1: f32, c1: f32) -> f32 {
    if a0 >= 1.0 && a1 >= 1.0 {
        return 0.5 * (c0 + c1);
    }
    if a0 >= 1.0 {
        return c0;
    }
    if a1 >= 1.0 {
        return c1;
    }
    const MAX: f32 = f32::MAX;
    let u0 = -f32::ln_1p(-a0);
    let v0 = if u0 < a0 * MAX { u0 / a0 } else { 1.0 };
    let u1 = -f32::ln_1p(-a1);
    let v1 = if u1 < a1 * MAX { u1 / a1 } else { 1.0 };
    let u = u0 + u1;
    let am = a0 + a1 - a0 * a1;
    let w = if u > 1.0 || am < u * MAX { am / u } else { 1.0 };
    (c0 * v0 + c1 * v1) * w
}

/// Iterator of disjoint per-pixel mutable byte regions; see
/// [`DeepData::pixel_chunks_mut`].
pub struct PixelChunksMut<'a> {
    rest: &'a mut [u8],
    caps: std::slice::Iter<'a, u32>,
    samplesize: usize,
}

impl<'a> Iterator for PixelChunksMut<'a> {
    type Item = &'a mut [u8];

    fn next(&mut self) -> Option<&'a mut [u8]> {
        let cap = *self.caps.next()?;
        let nbytes = cap as usize * self.samplesize;
        let data = std::mem::take(&mut self.rest);
        let (head, tail) = data.split_at_mut(nbytes);
        self.rest = tail;
        Some(head)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.caps.size_hint()
    }
}

impl<'a> ExactSizeIterator for PixelChunksMut<'a> {}

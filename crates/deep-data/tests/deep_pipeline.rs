//! End-to-end deep compositing pipeline tests against the public API.

use approx::assert_relative_eq;
use deep_core::{DeepSpec, TypeDesc};
use deep_data::prelude::*;
use deep_data::ops;

const NAMES: [&str; 4] = ["Z", "Zback", "A", "C"];

fn push_sample(dd: &mut DeepData, p: usize, z: f32, zback: f32, a: f32, c: f32) {
    let s = dd.samples(p) as usize;
    dd.set_samples(p, (s + 1) as u32);
    dd.set_deep_value(p, 0, s, z);
    dd.set_deep_value(p, 1, s, zback);
    dd.set_deep_value(p, 2, s, a);
    dd.set_deep_value(p, 3, s, c);
}

/// Over-composite a pixel front to back; the scalar ground truth the
/// deep operations must preserve.
fn flatten_alpha(dd: &DeepData, p: usize) -> f32 {
    let mut out = 0.0f32;
    for s in 0..dd.samples(p) as usize {
        let a = dd.deep_value(p, 2, s);
        out += a * (1.0 - out);
    }
    out
}

#[test]
fn split_then_recomposite_preserves_coverage() {
    let mut dd = DeepData::new(1, &[TypeDesc::FLOAT], &NAMES);
    push_sample(&mut dd, 0, 0.0, 1.0, 0.5, 10.0);
    push_sample(&mut dd, 0, 1.0, 2.0, 0.8, 20.0);

    // A depth outside every interval changes nothing.
    assert!(!dd.split(0, 5.0));
    assert_eq!(dd.samples(0), 2);

    // Split the first interval at its midpoint.
    assert!(dd.split(0, 0.5));
    assert_eq!(dd.samples(0), 3);
    let af = 1.0 - 0.5f32.powf(0.5);
    assert_relative_eq!(dd.deep_value(0, 2, 0), af, epsilon = 1e-6);
    assert_relative_eq!(dd.deep_value(0, 2, 1), af, epsilon = 1e-6);

    // The two halves composite back to the original alpha.
    let a0 = dd.deep_value(0, 2, 0);
    let a1 = dd.deep_value(0, 2, 1);
    assert_relative_eq!(a0 + a1 * (1.0 - a0), 0.5, epsilon = 1e-6);

    // Splitting at the same depth again subdivides nothing.
    assert!(!dd.split(0, 0.5));
    assert_eq!(dd.samples(0), 3);
}

#[test]
fn merge_two_elements_and_flatten() {
    let names = ["R", "G", "B", "A", "Z"];
    let mut fg = DeepData::new(4, &[TypeDesc::FLOAT; 5], &names);
    let mut bg = DeepData::new(4, &[TypeDesc::FLOAT; 5], &names);

    // Foreground: red at depth 1. Background: blue at depth 5.
    for p in 0..4 {
        fg.set_samples(p, 1);
        fg.set_deep_value(p, 0, 0, 0.4);
        fg.set_deep_value(p, 3, 0, 0.4);
        fg.set_deep_value(p, 4, 0, 1.0);

        bg.set_samples(p, 1);
        bg.set_deep_value(p, 2, 0, 0.6);
        bg.set_deep_value(p, 3, 0, 0.6);
        bg.set_deep_value(p, 4, 0, 5.0);
    }

    let mut merged = ops::deep_merge(&fg, &bg).unwrap();
    ops::deep_tidy(&mut merged);

    for p in 0..4 {
        assert_eq!(merged.samples(p), 2);
        // Nearest first after tidy.
        assert_relative_eq!(merged.deep_value(p, 4, 0), 1.0);
        assert_relative_eq!(merged.deep_value(p, 4, 1), 5.0);
        // Flattened alpha: 0.4 over 0.6.
        let a0 = merged.deep_value(p, 3, 0);
        let a1 = merged.deep_value(p, 3, 1);
        assert_relative_eq!(a0 + a1 * (1.0 - a0), 0.76, epsilon = 1e-6);
    }

    let stats = ops::deep_stats(&merged);
    assert_eq!(stats.total_samples, 8);
    assert_eq!(stats.max_samples_per_pixel, 2);
    assert_relative_eq!(stats.min_z, 1.0);
    assert_relative_eq!(stats.max_z, 5.0);
}

#[test]
fn overlapping_volumes_merge_exactly() {
    // Two half-transparent volumes sharing the interval [1,2]: after a
    // pixel merge their union has no partial overlaps and the shared
    // span is a single sample.
    let mut a = DeepData::new(1, &[TypeDesc::FLOAT], &NAMES);
    push_sample(&mut a, 0, 0.0, 2.0, 0.5, 10.0);
    let mut b = DeepData::new(1, &[TypeDesc::FLOAT], &NAMES);
    push_sample(&mut b, 0, 1.0, 3.0, 0.5, 20.0);

    assert!(a.merge_deep_pixels(0, &b, 0));
    assert_eq!(a.samples(0), 3);
    let intervals: Vec<(f32, f32)> = (0..3)
        .map(|s| (a.deep_value(0, 0, s), a.deep_value(0, 1, s)))
        .collect();
    assert_eq!(intervals, vec![(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)]);

    // Coverage of the union stays between either input's and full.
    let composited = flatten_alpha(&a, 0);
    assert!(composited > 0.5 && composited < 1.0);
}

#[test]
fn occlusion_and_holdout_pipeline() {
    let mut dd = DeepData::new(1, &[TypeDesc::FLOAT], &NAMES);
    push_sample(&mut dd, 0, 1.0, 1.0, 0.2, 1.0);
    push_sample(&mut dd, 0, 2.0, 2.0, 1.0, 2.0);
    push_sample(&mut dd, 0, 3.0, 3.0, 0.3, 3.0);

    assert_relative_eq!(dd.opaque_z(0), 2.0);

    dd.occlusion_cull(0);
    assert_eq!(dd.samples(0), 2);
    assert_relative_eq!(dd.deep_value(0, 2, 1), 1.0);

    // Hold out everything at or beyond depth 2.
    ops::deep_holdout_at(&mut dd, 2.0);
    assert_eq!(dd.samples(0), 1);
    assert_relative_eq!(dd.deep_value(0, 2, 0), 0.2);
}

#[test]
fn mixed_channel_formats_roundtrip() {
    let spec = DeepSpec::with_formats(
        8,
        8,
        &[
            TypeDesc::HALF,
            TypeDesc::HALF,
            TypeDesc::HALF,
            TypeDesc::HALF,
            TypeDesc::FLOAT,
            TypeDesc::UINT32,
        ],
        &["R", "G", "B", "A", "Z", "id"],
    );
    spec.validate().unwrap();
    let mut dd = DeepData::from_spec(&spec);
    assert_eq!(dd.pixels(), 64);
    assert_eq!(dd.samplesize(), 2 * 4 + 4 + 4);

    dd.set_samples(10, 2);
    dd.set_deep_value(10, 3, 1, 0.5);
    dd.set_deep_value(10, 4, 1, 7.25);
    dd.set_deep_value_uint(10, 5, 1, 123_456_789);

    assert_relative_eq!(dd.deep_value(10, 3, 1), 0.5);
    assert_relative_eq!(dd.deep_value(10, 4, 1), 7.25);
    // IDs survive bit-exactly through the uint path.
    assert_eq!(dd.deep_value_uint(10, 5, 1), 123_456_789);

    // Copy into an identical container and compare raw pixel bytes.
    let mut other = DeepData::from_spec(&spec);
    assert!(other.copy_deep_pixel(10, &dd, 10));
    assert_eq!(other.pixel_data(10), dd.pixel_data(10));
}

#[test]
fn parallel_reader_style_fill() {
    // The pattern a deep EXR reader uses: set all sample counts, then
    // fill disjoint per-pixel regions from worker threads.
    let mut dd = DeepData::new(64, &[TypeDesc::FLOAT], &["Z"]);
    let counts: Vec<u32> = (0..64).map(|p| (p % 5) as u32).collect();
    dd.set_all_samples(&counts);

    let chunks: Vec<&mut [u8]> = dd.pixel_chunks_mut().collect();
    std::thread::scope(|scope| {
        for (p, chunk) in chunks.into_iter().enumerate() {
            scope.spawn(move || {
                for (s, datum) in chunk.chunks_exact_mut(4).enumerate() {
                    datum.copy_from_slice(&((p + s) as f32).to_ne_bytes());
                }
            });
        }
    });

    for p in 0..64 {
        assert_eq!(dd.samples(p), (p % 5) as u32);
        for s in 0..dd.samples(p) as usize {
            assert_relative_eq!(dd.deep_value(p, 0, s), (p + s) as f32);
        }
    }
}

mod common;

use rand::Rng;

use gpu_radix::{histogram, host};

fn histogram_and_verify(buckets: usize, values: &[u32]) {
    let Some(ctx) = common::gpu() else { return };
    let mut expected = vec![0u32; buckets];
    host::histogram(&mut expected, values);

    let mut actual = vec![u32::MAX; buckets];
    histogram(&ctx, &mut actual, values).unwrap();
    assert_eq!(actual, expected, "histogram mismatch for {} values", values.len());
}

#[test]
fn test_small_example() {
    let Some(ctx) = common::gpu() else { return };
    let mut hist = [0u32; 4];
    histogram(&ctx, &mut hist, &[0, 3, 3, 1, 9, 3]).unwrap();
    assert_eq!(hist, [1, 1, 0, 3]);
}

#[test]
fn test_no_values() {
    let Some(ctx) = common::gpu() else { return };
    let mut hist = [5u32; 8];
    histogram(&ctx, &mut hist, &[]).unwrap();
    assert_eq!(hist, [0; 8]);
}

#[test]
fn test_no_buckets() {
    let Some(ctx) = common::gpu() else { return };
    let mut hist: [u32; 0] = [];
    histogram(&ctx, &mut hist, &[1, 2, 3]).unwrap();
}

#[test]
fn test_power_of_two_count() {
    let mut rng = common::seeded_rng(1);
    let values: Vec<u32> = (0..4096).map(|_| rng.gen_range(0..64)).collect();
    histogram_and_verify(64, &values);
}

#[test]
fn test_ragged_count_with_out_of_range() {
    let mut rng = common::seeded_rng(2);
    let values: Vec<u32> = (0..10_001).map(|_| rng.gen_range(0..300)).collect();
    histogram_and_verify(256, &values);
}

#[test]
fn test_counts_include_max_bucket_ties() {
    histogram_and_verify(3, &[u32::MAX, 2, 2, 0, u32::MAX]);
}

//! Host mirror of the device kernels.
//!
//! Every function here walks the data group by group in the layout the
//! kernels use, so a device result can be compared against it entry for
//! entry, not just against the final sorted order.

use crate::histogram::{table_index, table_len};
use crate::rank::RankStrategy;
use crate::{GROUP_WIDTH, MASK_WORDS, NUM_PASSES, RADIX, RADIX_BITS};

const W: usize = GROUP_WIDTH as usize;

fn digit(key: u32, shift: u32) -> u32 {
    (key >> shift) & (RADIX - 1)
}

/// Hierarchical exclusive scan with wrapping arithmetic.
pub fn exclusive_scan(values: &mut [u32]) {
    if values.len() <= 1 {
        if let Some(first) = values.first_mut() {
            *first = 0;
        }
        return;
    }

    let mut sums: Vec<u32> = values
        .chunks_mut(W)
        .map(|group| {
            let mut running = 0u32;
            for value in group.iter_mut() {
                let x = *value;
                *value = running;
                running = running.wrapping_add(x);
            }
            running
        })
        .collect();

    if sums.len() > 1 {
        exclusive_scan(&mut sums);
        for (group, base) in values.chunks_mut(W).zip(sums) {
            for value in group.iter_mut() {
                *value = value.wrapping_add(base);
            }
        }
    }
}

/// Bucket-major digit counts per group, as the histogram kernel writes them.
pub fn digit_histogram(keys: &[u32], shift: u32) -> Vec<u32> {
    let num_groups = keys.len().div_ceil(W);
    let mut hist = vec![0u32; table_len(num_groups)];
    for (group, chunk) in keys.chunks(W).enumerate() {
        for &key in chunk {
            hist[table_index(digit(key, shift), group, num_groups)] += 1;
        }
    }
    hist
}

/// Stable local ranks of one group's digits from per-bucket lane bitmasks.
pub fn ballot_ranks(digits: &[u32]) -> Vec<u32> {
    assert!(digits.len() <= W, "a group holds at most {} lanes", W);
    let mut masks = vec![[0u32; MASK_WORDS as usize]; RADIX as usize];
    for (lane, &d) in digits.iter().enumerate() {
        masks[d as usize][lane / 32] |= 1 << (lane % 32);
    }
    digits
        .iter()
        .enumerate()
        .map(|(lane, &d)| {
            let row = &masks[d as usize];
            let (word, bit) = (lane / 32, lane % 32);
            let below: u32 = row[..word].iter().map(|m| m.count_ones()).sum();
            below + (row[word] & ((1u32 << bit) - 1)).count_ones()
        })
        .collect()
}

/// Stable local ranks of one group's digits from per-bucket counters taken
/// in lane order.
pub fn counter_ranks(digits: &[u32]) -> Vec<u32> {
    let mut counters = vec![0u32; RADIX as usize];
    digits
        .iter()
        .map(|&d| {
            let rank = counters[d as usize];
            counters[d as usize] += 1;
            rank
        })
        .collect()
}

/// One stable pass on the digit at `shift`.
pub fn radix_pass(keys: &[u32], shift: u32, strategy: RankStrategy) -> Vec<u32> {
    let num_groups = keys.len().div_ceil(W);
    let mut hist = digit_histogram(keys, shift);
    exclusive_scan(&mut hist);

    let mut output = vec![0u32; keys.len()];
    for (group, chunk) in keys.chunks(W).enumerate() {
        let digits: Vec<u32> = chunk.iter().map(|&k| digit(k, shift)).collect();
        let ranks = match strategy {
            RankStrategy::Ballot => ballot_ranks(&digits),
            RankStrategy::AtomicCounter => counter_ranks(&digits),
        };
        for ((&key, &d), rank) in chunk.iter().zip(&digits).zip(ranks) {
            let dest = hist[table_index(d, group, num_groups)] + rank;
            output[dest as usize] = key;
        }
    }
    output
}

pub fn radix_sort(keys: &mut [u32], strategy: RankStrategy) {
    let mut current = keys.to_vec();
    for pass in 0..NUM_PASSES {
        current = radix_pass(&current, pass * RADIX_BITS, strategy);
    }
    keys.copy_from_slice(&current);
}

/// Counts of each value below `hist_out.len()`.
pub fn histogram(hist_out: &mut [u32], values_in: &[u32]) {
    let mut sorted = values_in.to_vec();
    sorted.sort_unstable();
    let upper_bound = |k: u32| sorted.partition_point(|&v| v <= k) as u32;
    for (k, count) in hist_out.iter_mut().enumerate() {
        let k = k as u32;
        let lower = if k == 0 { 0 } else { upper_bound(k - 1) };
        *count = upper_bound(k) - lower;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_scenario() {
        let mut counts = [2, 0, 3, 1];
        exclusive_scan(&mut counts);
        assert_eq!(counts, [0, 2, 2, 5]);
    }

    #[test]
    fn scan_crosses_groups() {
        let mut ones = vec![1u32; 3 * W + 7];
        exclusive_scan(&mut ones);
        assert!(ones.iter().enumerate().all(|(i, &v)| v == i as u32));
    }

    #[test]
    fn scan_wraps() {
        let mut values = [u32::MAX, 2, 0];
        exclusive_scan(&mut values);
        assert_eq!(values, [0, u32::MAX, 1]);
    }

    #[test]
    fn rank_scenario() {
        let digits = [1, 0, 1, 1, 0, 2, 1, 0];
        let expected = vec![0, 0, 1, 2, 1, 0, 3, 2];
        assert_eq!(ballot_ranks(&digits), expected);
        assert_eq!(counter_ranks(&digits), expected);
    }

    #[test]
    fn ballot_ranks_span_mask_words() {
        let digits = vec![7u32; W];
        let expected: Vec<u32> = (0..W as u32).collect();
        assert_eq!(ballot_ranks(&digits), expected);
    }

    #[test]
    fn histogram_table_sums_to_n() {
        let keys: Vec<u32> = (0..1000u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
        let hist = digit_histogram(&keys, 8);
        assert_eq!(hist.len(), table_len(4));
        assert_eq!(hist.iter().sum::<u32>(), 1000);
    }

    #[test]
    fn sort_scenario_keeps_ties_in_order() {
        // Tag each key with its position in the bits above the sorted digits.
        let keys = [5u32, 3, 5, 1, 3, 2];
        let tagged: Vec<u32> = keys.iter().enumerate().map(|(i, &k)| k | ((i as u32) << 16)).collect();
        let pass = radix_pass(&tagged, 0, RankStrategy::Ballot);
        let low: Vec<u32> = pass.iter().map(|k| k & 0xff).collect();
        let origin: Vec<u32> = pass.iter().map(|k| k >> 16).collect();
        assert_eq!(low, [1, 2, 3, 3, 5, 5]);
        assert_eq!(origin, [3, 5, 1, 4, 0, 2]);

        let mut sorted = keys;
        radix_sort(&mut sorted, RankStrategy::AtomicCounter);
        assert_eq!(sorted, [1, 2, 3, 3, 5, 5]);
    }

    #[test]
    fn histogram_drops_out_of_range_values() {
        let mut hist = [0u32; 4];
        histogram(&mut hist, &[0, 3, 3, 9, 1, 4, u32::MAX]);
        assert_eq!(hist, [1, 1, 0, 2]);
    }
}

use proptest::prelude::*;

use gpu_radix::host;
use gpu_radix::scan::scan_levels;
use gpu_radix::{RankStrategy, GROUP_WIDTH, RADIX};

proptest! {
    #[test]
    fn radix_sort_matches_std(keys in prop::collection::vec(any::<u32>(), 0..2000)) {
        let mut expected = keys.clone();
        expected.sort();
        for strategy in [RankStrategy::Ballot, RankStrategy::AtomicCounter] {
            let mut actual = keys.clone();
            host::radix_sort(&mut actual, strategy);
            prop_assert_eq!(&actual, &expected);
        }
    }

    #[test]
    fn pass_is_stable(digits in prop::collection::vec(0..16u32, 1..1500)) {
        // Digit in the low byte, position above it.
        let keys: Vec<u32> = digits.iter().enumerate().map(|(i, &d)| ((i as u32) << 8) | d).collect();
        let output = host::radix_pass(&keys, 0, RankStrategy::Ballot);
        let mut expected = keys.clone();
        expected.sort_by_key(|k| k & 0xff);
        prop_assert_eq!(output, expected);
    }

    #[test]
    fn scan_is_exclusive_prefix_sum(values in prop::collection::vec(any::<u32>(), 0..3000)) {
        let mut actual = values.clone();
        host::exclusive_scan(&mut actual);
        let mut running = 0u32;
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(actual[i], running);
            running = running.wrapping_add(v);
        }
    }

    #[test]
    fn rank_strategies_agree(digits in prop::collection::vec(0..RADIX, 0..=GROUP_WIDTH as usize)) {
        prop_assert_eq!(host::ballot_ranks(&digits), host::counter_ranks(&digits));
    }

    #[test]
    fn digit_histogram_counts_every_key(keys in prop::collection::vec(any::<u32>(), 0..2000), pass in 0..4u32) {
        let hist = host::digit_histogram(&keys, pass * 8);
        prop_assert_eq!(hist.iter().map(|&c| c as usize).sum::<usize>(), keys.len());
    }

    #[test]
    fn histogram_matches_naive_count(values in prop::collection::vec(0..40u32, 0..500), buckets in 0..32usize) {
        let mut actual = vec![0u32; buckets];
        host::histogram(&mut actual, &values);
        for (k, &count) in actual.iter().enumerate() {
            prop_assert_eq!(count as usize, values.iter().filter(|&&v| v as usize == k).count());
        }
    }

    #[test]
    fn scan_levels_end_at_one_group(len in 2..10_000_000usize) {
        let levels = scan_levels(len);
        prop_assert_eq!(levels[0], len);
        prop_assert!(levels.last().map_or(false, |&l| l <= GROUP_WIDTH as usize));
        for w in levels.windows(2) {
            prop_assert_eq!(w[1], w[0].div_ceil(GROUP_WIDTH as usize));
        }
    }
}

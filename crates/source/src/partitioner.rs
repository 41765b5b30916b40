//! Equal-width partitioning of a discovered key domain.

use crate::boundary::KeyDomain;
use tundra_common::{Error, KeyBounds, KeyRange, Result, Split};

/// Cuts `[min, max]` into `split_count` contiguous buckets whose sizes differ by at most one;
/// the first `(max - min + 1) % split_count` buckets take the extra key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePartitioner {
    split_count: usize,
}

impl RangePartitioner {
    pub fn new(split_count: usize) -> Result<Self> {
        if split_count == 0 {
            return Err(Error::InvalidConfig("split count must be at least 1".to_string()));
        }
        Ok(Self { split_count })
    }

    pub fn split_count(&self) -> usize {
        self.split_count
    }

    /// Produces the ordered ranges for `domain`.
    ///
    /// An empty domain gives one empty range and a single-key domain gives one range,
    /// whatever the split count. Otherwise exactly `split_count` ranges come back; when there
    /// are fewer keys than splits the trailing ranges are empty.
    pub fn partition(&self, domain: &KeyDomain) -> Result<Vec<KeyRange>> {
        let column = domain.key_column.as_str();
        let bounds = match domain.bounds {
            None => return Ok(vec![KeyRange::empty(column)]),
            Some(b) if b.lower() == b.upper() => return Ok(vec![KeyRange::from_bounds(column, b)]),
            Some(b) => b,
        };

        let n = self.split_count as u128;
        let base = bounds.width() / n;
        let remainder = bounds.width() % n;

        let mut ranges = Vec::with_capacity(self.split_count);
        let mut start = i128::from(bounds.lower());
        for i in 0..n {
            let size = base + u128::from(i < remainder);
            if size == 0 {
                ranges.push(KeyRange::empty(column));
                continue;
            }
            // size <= width <= 2^64, so the end stays inside the domain.
            let end = start + size as i128 - 1;
            ranges.push(KeyRange::from_bounds(column, checked_bounds(start, end)?));
            start = end + 1;
        }
        Ok(ranges)
    }

    /// Ranges tagged with positional ids, `<table>-<index>`.
    pub fn splits(&self, table: &str, domain: &KeyDomain) -> Result<Vec<Split>> {
        let splits = self
            .partition(domain)?
            .into_iter()
            .enumerate()
            .map(|(index, range)| Split::new(format!("{table}-{index}"), range))
            .collect();
        Ok(splits)
    }
}

fn checked_bounds(start: i128, end: i128) -> Result<KeyBounds> {
    let narrow = |v: i128| i64::try_from(v).map_err(|_| Error::protocol(format!("bucket bound {v} out of range")));
    KeyBounds::new(narrow(start)?, narrow(end)?)
        .ok_or_else(|| Error::protocol(format!("inverted bucket [{start}, {end}]")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn domain(min: i64, max: i64) -> KeyDomain {
        KeyDomain::new("id", KeyBounds::new(min, max))
    }

    fn bounds_of(ranges: &[KeyRange]) -> Vec<Option<(i64, i64)>> {
        ranges.iter().map(|r| r.bounds().map(|b| (b.lower(), b.upper()))).collect()
    }

    #[test]
    fn remainder_goes_to_the_earliest_buckets() {
        let ranges = RangePartitioner::new(4).unwrap().partition(&domain(0, 9)).unwrap();
        assert_eq!(
            bounds_of(&ranges),
            vec![Some((0, 2)), Some((3, 5)), Some((6, 7)), Some((8, 9))]
        );
    }

    #[test]
    fn single_key_collapses_to_one_split() {
        for n in [1, 2, 16] {
            let ranges = RangePartitioner::new(n).unwrap().partition(&domain(5, 5)).unwrap();
            assert_eq!(bounds_of(&ranges), vec![Some((5, 5))]);
        }
    }

    #[test]
    fn empty_domain_gives_one_empty_split() {
        let ranges = RangePartitioner::new(3).unwrap().partition(&KeyDomain::new("id", None)).unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].is_empty());
        assert_eq!(ranges[0].key_column(), "id");
    }

    #[test]
    fn more_splits_than_keys_keeps_the_split_count() {
        let ranges = RangePartitioner::new(5).unwrap().partition(&domain(10, 11)).unwrap();
        assert_eq!(bounds_of(&ranges), vec![Some((10, 10)), Some((11, 11)), None, None, None]);
    }

    #[test]
    fn full_i64_domain_does_not_overflow() {
        let ranges = RangePartitioner::new(3).unwrap().partition(&domain(i64::MIN, i64::MAX)).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].lower_bound(), Some(i64::MIN));
        assert_eq!(ranges[2].upper_bound(), Some(i64::MAX));
    }

    #[test]
    fn zero_split_count_is_a_config_error() {
        assert!(matches!(RangePartitioner::new(0), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn split_ids_are_positional_and_reproducible() {
        let partitioner = RangePartitioner::new(3).unwrap();
        let first = partitioner.splits("orders", &domain(1, 100)).unwrap();
        let second = partitioner.splits("orders", &domain(1, 100)).unwrap();
        assert_eq!(first, second);
        let ids: Vec<_> = first.iter().map(|s| s.split_id.as_str()).collect();
        assert_eq!(ids, vec!["orders-0", "orders-1", "orders-2"]);
    }

    proptest! {
        #[test]
        fn ranges_cover_the_domain_without_gaps(
            min in -1_000_000i64..1_000_000,
            len in 1i64..5_000,
            n in 1usize..64,
        ) {
            let max = min + len;
            let ranges = RangePartitioner::new(n).unwrap().partition(&domain(min, max)).unwrap();
            prop_assert_eq!(ranges.len(), n);

            let non_empty: Vec<KeyBounds> = ranges.iter().filter_map(|r| r.bounds()).collect();
            prop_assert_eq!(non_empty.first().map(|b| b.lower()), Some(min));
            prop_assert_eq!(non_empty.last().map(|b| b.upper()), Some(max));
            for pair in non_empty.windows(2) {
                prop_assert_eq!(pair[0].upper() + 1, pair[1].lower());
            }

            let sizes: Vec<u128> = ranges.iter().map(|r| r.bounds().map_or(0, |b| b.width())).collect();
            let largest = sizes.iter().copied().max().unwrap();
            let smallest = sizes.iter().copied().min().unwrap();
            prop_assert!(largest - smallest <= 1);
            prop_assert_eq!(sizes.iter().sum::<u128>(), (len + 1) as u128);
        }

        #[test]
        fn empty_ranges_only_trail(len in 1i64..20, n in 1usize..40) {
            let ranges = RangePartitioner::new(n).unwrap().partition(&domain(0, len)).unwrap();
            let first_empty = ranges.iter().position(KeyRange::is_empty).unwrap_or(ranges.len());
            prop_assert!(ranges[first_empty..].iter().all(KeyRange::is_empty));
        }
    }
}

//! Partitioning of batch writes into endpoint-sized chunks.

use std::ops::Range;

/// Half-open index range `[start, end)` into the caller's item list; one
/// physical request's worth of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub start: usize,
    pub end: usize,
}

impl Batch {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Consecutive ranges of at most `max` items covering `[0, len)`.
///
/// A `max` of zero is treated as one.
pub fn batches(len: usize, max: usize) -> impl Iterator<Item = Batch> {
    let max = max.max(1);
    (0..len).step_by(max).map(move |start| Batch {
        start,
        end: (start + max).min(len),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_batches() {
        assert_eq!(batches(0, 100).count(), 0);
    }

    #[test]
    fn last_batch_takes_the_remainder() {
        let all: Vec<Batch> = batches(250, 100).collect();
        assert_eq!(
            all,
            vec![
                Batch { start: 0, end: 100 },
                Batch { start: 100, end: 200 },
                Batch { start: 200, end: 250 },
            ]
        );
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let all: Vec<Batch> = batches(200, 100).collect();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|b| b.len() == 100));
    }

    #[test]
    fn ranges_cover_every_index_once_in_order() {
        for len in 0..60 {
            for max in 1..12 {
                let covered: Vec<usize> = batches(len, max).flat_map(|b| b.range()).collect();
                assert_eq!(covered, (0..len).collect::<Vec<_>>(), "len={len} max={max}");
                assert!(batches(len, max).all(|b| !b.is_empty() && b.len() <= max));
            }
        }
    }

    #[test]
    fn zero_max_degrades_to_single_items() {
        assert_eq!(batches(3, 0).count(), 3);
    }
}

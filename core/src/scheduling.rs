use std::ops::Range;

/// An iterator that splits `0..len` into contiguous, non-overlapping batches.
/// The remainder of the division is spread over the first batches, so that
/// two batches never differ by more than one element.
#[derive(Clone, Debug)]
pub struct BatchIterator {
    range_start: usize,
    batch_size: usize,
    remainder: usize,
    batch_number: usize,
    batches: usize,
}

impl BatchIterator {
    /// Creates a batch iterator with `parts` batches at most.
    /// Empty batches are never produced, so there are fewer batches than `parts` when `len < parts`.
    pub fn new(len: usize, parts: usize) -> BatchIterator {
        let batches = parts.min(len);

        if batches == 0 {
            return BatchIterator {
                range_start: 0,
                batch_size: 0,
                remainder: 0,
                batch_number: 0,
                batches: 0,
            };
        }

        BatchIterator {
            range_start: 0,
            batch_size: len / batches,
            remainder: len % batches,
            batch_number: 0,
            batches,
        }
    }

    /// Creates a batch iterator where each batch holds at least `desired_batch_size` elements.
    /// A small `len` still gives one batch.
    pub fn with_batch_size(len: usize, desired_batch_size: usize) -> BatchIterator {
        let batches = (len / desired_batch_size.max(1)).max(1);

        Self::new(len, batches)
    }
}

impl Iterator for BatchIterator {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch_number == self.batches {
            return None;
        }

        // add part of the remainder that should have made the last batch
        let batch_size = if self.batch_number < self.remainder {
            self.batch_size + 1
        } else {
            self.batch_size
        };

        let range_end = self.range_start + batch_size;
        let range = self.range_start..range_end;
        self.range_start = range_end;
        self.batch_number += 1;

        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (
            self.batches - self.batch_number,
            Some(self.batches - self.batch_number),
        )
    }
}

impl ExactSizeIterator for BatchIterator {}

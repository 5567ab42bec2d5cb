use std::ops::Range;

use tracing::debug;

use crate::{
    charset::Charset,
    error::{SecSuiteError, SecSuiteResult},
    scheduling::BatchIterator,
};

/// Returns the number of candidates of every length in `min_length..=max_length`
/// over a charset of `charset_size` characters, or `None` if it overflows a `u128`.
pub fn total_combinations(charset_size: usize, min_length: usize, max_length: usize) -> Option<u128> {
    (min_length..=max_length).try_fold(0u128, |total, length| {
        let length = u32::try_from(length).ok()?;
        (charset_size as u128)
            .checked_pow(length)
            .and_then(|space| total.checked_add(space))
    })
}

/// An exhaustive enumeration of every password of a length range over a charset.
#[derive(Clone, Debug)]
pub struct BruteForce {
    charset: Charset,
    min_length: usize,
    max_length: usize,
    total: u128,
}

impl BruteForce {
    /// Creates a new brute force search space.
    pub fn new(charset: Charset, min_length: usize, max_length: usize) -> SecSuiteResult<Self> {
        if min_length == 0 {
            return Err(SecSuiteError::Configuration(
                "the minimum length must be at least 1".to_owned(),
            ));
        }

        if min_length > max_length {
            return Err(SecSuiteError::LengthBounds {
                min: min_length,
                max: max_length,
            });
        }

        let total = total_combinations(charset.len(), min_length, max_length).ok_or_else(|| {
            let bits = (max_length as f64 * (charset.len() as f64).log2()).ceil();
            SecSuiteError::Space(bits as u32)
        })?;

        Ok(Self {
            charset,
            min_length,
            max_length,
            total,
        })
    }

    pub fn charset(&self) -> &Charset {
        &self.charset
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Returns the total number of candidates, without enumerating them.
    pub fn total_combinations(&self) -> u128 {
        self.total
    }

    /// Returns an iterator over the whole search space, in lexicographic order for each length.
    pub fn iter(&self) -> BruteForceShard {
        BruteForceShard::new(self, 0..self.charset.len())
    }

    /// Splits the search space into at most `workers` disjoint shards.
    /// Each shard owns a contiguous slice of the first character alphabet.
    pub fn shards(&self, workers: usize) -> Vec<BruteForceShard> {
        let shards: Vec<_> = BatchIterator::new(self.charset.len(), workers.max(1))
            .map(|first_chars| BruteForceShard::new(self, first_chars))
            .collect();

        debug!(
            shards = shards.len(),
            total = %self.total,
            "split the brute force space"
        );

        shards
    }
}

/// A disjoint part of a brute force search space.
/// It enumerates every candidate whose first character is in its slice of the charset.
#[derive(Clone, Debug)]
pub struct BruteForceShard {
    charset: Charset,
    first_chars: Range<usize>,
    max_length: usize,
    min_length: usize,
    /// Indices in the charset of the next candidate, `None` once exhausted.
    indices: Option<Vec<usize>>,
}

impl BruteForceShard {
    fn new(brute_force: &BruteForce, first_chars: Range<usize>) -> Self {
        let indices = (!first_chars.is_empty()).then(|| {
            let mut indices = vec![0; brute_force.min_length];
            indices[0] = first_chars.start;
            indices
        });

        Self {
            charset: brute_force.charset.clone(),
            first_chars,
            max_length: brute_force.max_length,
            min_length: brute_force.min_length,
            indices,
        }
    }

    /// Returns the number of candidates in this shard.
    pub fn total_combinations(&self) -> u128 {
        let suffixes = if self.min_length > 0 {
            total_combinations(self.charset.len(), self.min_length - 1, self.max_length - 1)
        } else {
            None
        };

        suffixes.map_or(0, |suffixes| suffixes * self.first_chars.len() as u128)
    }

    /// Moves the indices to the next candidate.
    fn advance(&mut self) {
        let Some(indices) = self.indices.as_mut() else {
            return;
        };

        for i in (1..indices.len()).rev() {
            if indices[i] + 1 < self.charset.len() {
                indices[i] += 1;
                return;
            }
            indices[i] = 0;
        }

        if indices[0] + 1 < self.first_chars.end {
            indices[0] += 1;
            return;
        }

        // every candidate of this length has been enumerated
        let length = indices.len() + 1;
        if length > self.max_length {
            self.indices = None;
        } else {
            indices.clear();
            indices.push(self.first_chars.start);
            indices.resize(length, 0);
        }
    }
}

impl Iterator for BruteForceShard {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let candidate = self
            .indices
            .as_ref()?
            .iter()
            .map(|&i| self.charset[i])
            .collect();

        self.advance();

        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use itertools::Itertools;

    use super::*;

    fn brute_force(chars: &str, min: usize, max: usize) -> BruteForce {
        BruteForce::new(Charset::new(chars).unwrap(), min, max).unwrap()
    }

    #[test]
    fn test_total_combinations() {
        assert_eq!(Some(4 + 16), total_combinations(4, 1, 2));
        assert_eq!(Some(256), total_combinations(4, 4, 4));
        assert_eq!(Some(62 + 62 * 62 + 62 * 62 * 62), total_combinations(62, 1, 3));
        assert_eq!(None, total_combinations(94, 1, 40));

        let brute_force = brute_force("abcde", 2, 3);
        assert_eq!(25 + 125, brute_force.total_combinations());
        assert_eq!(150, brute_force.iter().count());
    }

    #[test]
    fn test_lexicographic_order() {
        let candidates = brute_force("cba", 1, 2).iter().collect_vec();

        assert_eq!(
            vec!["a", "b", "c", "aa", "ab", "ac", "ba", "bb", "bc", "ca", "cb", "cc"],
            candidates
        );
    }

    #[test]
    fn test_shards_are_disjoint_and_complete() {
        let brute_force = brute_force("abcde", 1, 3);
        let expected: HashSet<String> = brute_force.iter().collect();

        for workers in 1..=7 {
            let shards = brute_force.shards(workers);
            assert_eq!(workers.min(5), shards.len());

            let shard_totals: u128 = shards.iter().map(|shard| shard.total_combinations()).sum();
            assert_eq!(brute_force.total_combinations(), shard_totals);

            let candidates = shards.into_iter().flatten().collect_vec();
            let unique: HashSet<String> = candidates.iter().cloned().collect();

            assert_eq!(candidates.len(), unique.len());
            assert_eq!(expected, unique);
        }
    }

    #[test]
    fn test_shard_first_chars() {
        let brute_force = brute_force("abcd", 2, 2);
        let shards = brute_force.shards(2);

        assert_eq!(
            vec!["aa", "ab", "ac", "ad", "ba", "bb", "bc", "bd"],
            shards[0].clone().collect_vec()
        );
        assert!(shards[1].clone().all(|candidate| candidate.starts_with(['c', 'd'])));
    }

    #[test]
    fn test_invalid_bounds() {
        let charset = Charset::new("ab").unwrap();

        assert!(matches!(
            BruteForce::new(charset.clone(), 3, 2),
            Err(SecSuiteError::LengthBounds { min: 3, max: 2 })
        ));
        assert!(matches!(
            BruteForce::new(charset, 0, 2),
            Err(SecSuiteError::Configuration(_))
        ));
        assert!(matches!(
            BruteForce::new(Charset::from_classes("luds").unwrap(), 1, 40),
            Err(SecSuiteError::Space(_))
        ));
    }
}

use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
    sync::Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{SecSuiteError, SecSuiteResult},
    persist,
    scheduling::BatchIterator,
    wordlist::WordlistReader,
    DEFAULT_MARKOV_CANDIDATES, DEFAULT_MARKOV_ORDER, DEFAULT_MARKOV_PASSWORD_LENGTH,
    MARKOV_RETRY_FACTOR,
};

/// A character-level Markov chain trained on a password corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkovModel {
    /// The number of characters of a context.
    order: usize,
    /// For each context, the number of times each character followed it.
    transition_table: BTreeMap<String, BTreeMap<char, u64>>,
    /// The number of times each context started a password.
    start_contexts: BTreeMap<String, u64>,
}

impl Default for MarkovModel {
    fn default() -> Self {
        Self {
            order: DEFAULT_MARKOV_ORDER,
            transition_table: BTreeMap::new(),
            start_contexts: BTreeMap::new(),
        }
    }
}

impl MarkovModel {
    /// Creates an empty model.
    pub fn new(order: usize) -> SecSuiteResult<Self> {
        if order == 0 {
            return Err(SecSuiteError::Configuration(
                "the order of a Markov model must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            order,
            ..Default::default()
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn transition_table(&self) -> &BTreeMap<String, BTreeMap<char, u64>> {
        &self.transition_table
    }

    pub fn start_contexts(&self) -> &BTreeMap<String, u64> {
        &self.start_contexts
    }

    /// Returns true if the model has seen at least one password.
    pub fn is_trained(&self) -> bool {
        !self.start_contexts.is_empty()
    }

    /// Trains the model on some passwords.
    /// Passwords are trimmed, and those shorter than the order of the model are skipped.
    /// Training stops after `max_samples` accepted passwords, and can be resumed with more data.
    /// Returns the number of accepted passwords.
    pub fn train<I>(&mut self, passwords: I, max_samples: usize) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut accepted = 0;

        for password in passwords {
            if accepted >= max_samples {
                break;
            }

            let chars: Vec<char> = password.as_ref().trim().chars().collect();
            if chars.len() < self.order {
                continue;
            }

            let start: String = chars[..self.order].iter().collect();
            *self.start_contexts.entry(start).or_default() += 1;

            for window in chars.windows(self.order + 1) {
                let context: String = window[..self.order].iter().collect();
                let next = window[self.order];
                *self
                    .transition_table
                    .entry(context)
                    .or_default()
                    .entry(next)
                    .or_default() += 1;
            }

            accepted += 1;
        }

        info!(
            accepted,
            contexts = self.transition_table.len(),
            start_contexts = self.start_contexts.len(),
            "trained the Markov model"
        );

        accepted
    }

    /// Trains the model on a newline-delimited file, streamed from disk.
    pub fn train_from_file(&mut self, path: &Path, max_samples: usize) -> SecSuiteResult<usize> {
        let mut error = None;
        let words = WordlistReader::open(path)?.map_while(|entry| match entry {
            Ok(entry) => Some(entry.word),
            Err(err) => {
                error = Some(err);
                None
            }
        });
        let accepted = self.train(words, max_samples);

        match error {
            Some(err) => Err(err.into()),
            None => Ok(accepted),
        }
    }

    /// Generates a password.
    /// A start context is picked according to its frequency, then characters are appended
    /// according to the frequencies of the current context, until `max_length` characters
    /// are reached or the context has no known successor.
    /// Returns an empty string if the model is not trained.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R, max_length: usize) -> String {
        let Some(start) = weighted_choice(&self.start_contexts, rng) else {
            return String::new();
        };

        let mut password = start.clone();
        let mut context = start.clone();
        let mut length = self.order;

        while length < max_length {
            let Some(next) = self
                .transition_table
                .get(&context)
                .and_then(|transitions| weighted_choice(transitions, rng))
            else {
                break;
            };

            password.push(*next);
            context.remove(0);
            context.push(*next);
            length += 1;
        }

        password
    }

    /// Generates up to `count` distinct passwords with a length in `min_length..=max_length`.
    /// Generation gives up after `MARKOV_RETRY_FACTOR * count` attempts, so fewer passwords
    /// may be returned.
    pub fn generate_unique<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        count: usize,
        min_length: usize,
        max_length: usize,
    ) -> Vec<String> {
        let mut seen = HashSet::with_capacity(count);
        let mut passwords = Vec::with_capacity(count);
        let max_attempts = count.saturating_mul(MARKOV_RETRY_FACTOR);
        let mut attempts = 0;

        while passwords.len() < count && attempts < max_attempts {
            attempts += 1;

            let password = self.generate(rng, max_length);
            let length = password.chars().count();

            if password.is_empty() || length < min_length || length > max_length {
                continue;
            }

            if seen.insert(password.clone()) {
                passwords.push(password);
            }
        }

        debug!(
            requested = count,
            generated = passwords.len(),
            attempts,
            "generated unique Markov passwords"
        );

        passwords
    }

    /// Stores this model to the given path.
    pub fn store(&self, path: &Path) -> SecSuiteResult<()> {
        persist::store(self, path)
    }

    /// Loads a model from the given path.
    pub fn load(path: &Path) -> SecSuiteResult<Self> {
        let model: Self = persist::load(path)?;

        if model.order == 0 {
            return Err(SecSuiteError::Deserialize);
        }

        Ok(model)
    }
}

/// Picks a key with a probability proportional to its count.
fn weighted_choice<'a, K, R: Rng + ?Sized>(
    counts: &'a BTreeMap<K, u64>,
    rng: &mut R,
) -> Option<&'a K> {
    let total: u64 = counts.values().sum();
    if total == 0 {
        return None;
    }

    let mut target = rng.gen_range(0..total);
    for (key, &count) in counts {
        if target < count {
            return Some(key);
        }
        target -= count;
    }

    None
}

/// Candidates generated from a trained Markov model.
#[derive(Clone, Debug)]
pub struct MarkovCandidates {
    model: Arc<MarkovModel>,
    max_password_length: usize,
    limit: u64,
    seed: Option<u64>,
}

impl MarkovCandidates {
    /// Creates a new Markov candidate source.
    /// Fails if the model is not trained.
    pub fn new(model: Arc<MarkovModel>) -> SecSuiteResult<Self> {
        if !model.is_trained() {
            return Err(SecSuiteError::Configuration(
                "the Markov model must be trained before generating candidates".to_owned(),
            ));
        }

        Ok(Self {
            model,
            max_password_length: DEFAULT_MARKOV_PASSWORD_LENGTH,
            limit: DEFAULT_MARKOV_CANDIDATES,
            seed: None,
        })
    }

    /// Sets the maximum length of a generated password.
    pub fn max_password_length(mut self, max_password_length: usize) -> Self {
        self.max_password_length = max_password_length;

        self
    }

    /// Sets the total number of candidates to generate.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;

        self
    }

    /// Makes the generation reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    pub fn model(&self) -> &MarkovModel {
        &self.model
    }

    pub fn total(&self) -> u64 {
        self.limit
    }

    /// Splits the candidates to generate between at most `workers` shards.
    /// Each shard owns its own random number generator.
    pub fn shards(&self, workers: usize) -> Vec<MarkovShard> {
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);

        BatchIterator::new(limit, workers.max(1))
            .enumerate()
            .map(|(i, range)| {
                let rng = match self.seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(i as u64)),
                    None => StdRng::from_entropy(),
                };

                MarkovShard {
                    model: self.model.clone(),
                    rng,
                    remaining: range.len() as u64,
                    max_password_length: self.max_password_length,
                }
            })
            .collect()
    }
}

/// A share of the candidates of a Markov source.
pub struct MarkovShard {
    model: Arc<MarkovModel>,
    rng: StdRng,
    remaining: u64,
    max_password_length: usize,
}

impl Iterator for MarkovShard {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        Some(self.model.generate(&mut self.rng, self.max_password_length))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

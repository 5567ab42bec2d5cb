use serde::{Deserialize, Serialize};

use crate::{
    charset::Charset,
    error::{SecSuiteError, SecSuiteResult},
    hash::HashFunction,
    DEFAULT_CHAIN_COUNT, DEFAULT_CHAIN_LENGTH, DEFAULT_CHARSET_CLASSES, DEFAULT_MAX_LENGTH,
};

/// A builder for a rainbow table context.
#[derive(Clone, Debug)]
pub struct RainbowTableCtxBuilder {
    hash_function: HashFunction,
    charset: Option<Charset>,
    chain_length: u64,
    num_chains: u64,
    max_length: usize,
    seed: Option<u64>,
}

impl Default for RainbowTableCtxBuilder {
    fn default() -> Self {
        Self {
            hash_function: HashFunction::Md5,
            charset: None,
            chain_length: DEFAULT_CHAIN_LENGTH,
            num_chains: DEFAULT_CHAIN_COUNT,
            max_length: DEFAULT_MAX_LENGTH,
            seed: None,
        }
    }
}

impl RainbowTableCtxBuilder {
    /// Creates a new RainbowTableCtxBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hash function of the context.
    /// Only unsalted hash functions can be used in a rainbow table.
    pub fn hash(mut self, hash_function: HashFunction) -> Self {
        self.hash_function = hash_function;

        self
    }

    /// Sets the charset of the context.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);

        self
    }

    /// Sets the length of the chain of the context.
    /// Increasing the chain length will reduce the memory used
    /// to store the table but increase the time taken to attack.
    pub fn chain_length(mut self, chain_length: u64) -> Self {
        self.chain_length = chain_length;

        self
    }

    /// Sets the number of chains to generate.
    pub fn num_chains(mut self, num_chains: u64) -> Self {
        self.num_chains = num_chains;

        self
    }

    /// Sets the length of the passwords of the table.
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;

        self
    }

    /// Sets the seed used to draw the startpoints, making the table reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);

        self
    }

    /// Builds a RainbowTableCtx with the specified parameters.
    pub fn build(self) -> SecSuiteResult<RainbowTableCtx> {
        if self.hash_function.is_salted() {
            return Err(SecSuiteError::UnsupportedHash(self.hash_function));
        }

        if self.chain_length == 0 {
            return Err(SecSuiteError::Configuration(
                "the chain length must be at least 1".to_owned(),
            ));
        }

        if self.num_chains == 0 {
            return Err(SecSuiteError::Configuration(
                "a rainbow table needs at least one chain".to_owned(),
            ));
        }

        if self.max_length == 0 {
            return Err(SecSuiteError::Configuration(
                "the password length must be at least 1".to_owned(),
            ));
        }

        let charset = match self.charset {
            Some(charset) => charset,
            None => Charset::from_classes(DEFAULT_CHARSET_CLASSES)?,
        };

        // make sure the search space fits in a u64, the reduction works on 64 bits
        let n = u32::try_from(self.max_length)
            .ok()
            .and_then(|length| (charset.len() as u64).checked_pow(length))
            .ok_or_else(|| {
                let bits = (self.max_length as f64 * (charset.len() as f64).log2()).ceil();
                SecSuiteError::Space(bits as u32)
            })?;

        Ok(RainbowTableCtx {
            hash_function: self.hash_function,
            charset,
            chain_length: self.chain_length,
            num_chains: self.num_chains,
            max_length: self.max_length,
            n,
            seed: self.seed,
        })
    }
}

/// Context used to store all parameters used to generate a rainbow table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RainbowTableCtx {
    /// The hash function used.
    pub hash_function: HashFunction,
    /// The charset used.
    pub charset: Charset,
    /// The number of reduce/hash steps of a chain.
    pub chain_length: u64,
    /// The number of startpoints to generate.
    pub num_chains: u64,
    /// The length of the passwords.
    pub max_length: usize,
    /// The size of the search space.
    pub n: u64,
    /// The seed used to draw the startpoints.
    pub seed: Option<u64>,
}

impl RainbowTableCtx {
    /// Returns true if the context satisfies the invariants checked by
    /// [`RainbowTableCtxBuilder::build`], which a deserialized context skipped.
    pub(crate) fn is_consistent(&self) -> bool {
        let sorted = self.charset.windows(2).all(|w| w[0] < w[1]);
        let n = u32::try_from(self.max_length)
            .ok()
            .and_then(|length| (self.charset.len() as u64).checked_pow(length));

        !self.hash_function.is_salted()
            && self.chain_length > 0
            && self.num_chains > 0
            && self.max_length > 0
            && !self.charset.is_empty()
            && sorted
            && n == Some(self.n)
    }
}

#[cfg(test)]
pub fn build_test_ctx() -> RainbowTableCtx {
    RainbowTableCtxBuilder::new()
        .hash(HashFunction::Sha256)
        .charset(Charset::new("abc").unwrap())
        .max_length(3)
        .chain_length(10)
        .num_chains(20)
        .seed(0)
        .build()
        .unwrap()
}

pub mod analysis;
pub mod bruteforce;
pub mod charset;
pub mod ctx;
pub mod dictionary;
pub mod error;
pub mod event;
pub mod hash;
pub mod markov;
mod persist;
pub mod rainbow_table;
pub mod reduce;
pub mod scheduling;
pub mod search;
pub mod source;
pub mod wordlist;

pub use analysis::PasswordAnalysis;
pub use bruteforce::{BruteForce, BruteForceShard};
pub use charset::Charset;
pub use ctx::{RainbowTableCtx, RainbowTableCtxBuilder};
pub use dictionary::Dictionary;
pub use error::{SecSuiteError, SecSuiteResult};
pub use event::{Event, EventHandle};
pub use hash::{Digest, HashFunction, Oracle, Target};
pub use markov::{MarkovCandidates, MarkovModel};
pub use rainbow_table::{RainbowChainWalk, RainbowTable};
pub use search::{CancellationToken, Coordinator, SearchReport, SearchResult};
pub use source::CandidateSource;

/// The default number of workers, when the available parallelism cannot be queried.
pub const DEFAULT_WORKERS: usize = 4;

/// The default chain length of a rainbow table.
pub const DEFAULT_CHAIN_LENGTH: u64 = 1_000;

/// The default number of chains of a rainbow table.
pub const DEFAULT_CHAIN_COUNT: u64 = 10_000;

/// The default maximum password length.
pub const DEFAULT_MAX_LENGTH: usize = 8;

/// The default minimum password length.
pub const DEFAULT_MIN_LENGTH: usize = 1;

/// The default charset classes (lowercase, uppercase and digits).
pub const DEFAULT_CHARSET_CLASSES: &str = "lud";

/// The default order of a Markov model.
pub const DEFAULT_MARKOV_ORDER: usize = 3;

/// The default number of lines used to train a Markov model.
pub const DEFAULT_MAX_TRAINING_SAMPLES: usize = 100_000;

/// The default number of candidates generated by a Markov source.
pub const DEFAULT_MARKOV_CANDIDATES: u64 = 100_000;

/// The default maximum length of a password generated by a Markov model.
pub const DEFAULT_MARKOV_PASSWORD_LENGTH: usize = 20;

/// Number of generation attempts allowed per requested unique Markov candidate.
pub const MARKOV_RETRY_FACTOR: usize = 20;

/// The default number of words in a dictionary batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Number of dictionary batches that can be queued per worker.
/// This bounds the memory used by a dictionary search.
pub const QUEUE_BATCHES_PER_WORKER: usize = 2;

/// Number of chains computed between two progress events when building a rainbow table.
pub const DEFAULT_BUILD_BATCH_SIZE: usize = 4096;

/// The default interval between two progress events during a search, in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

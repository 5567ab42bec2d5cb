use std::{io, path::PathBuf};

use thiserror::Error;

use crate::hash::HashFunction;

pub type SecSuiteResult<T> = std::result::Result<T, SecSuiteError>;

#[derive(Error, Debug)]
pub enum SecSuiteError {
    #[error("Unknown hash function \"{0}\", expected one of md5, sha1, sha256, sha512, bcrypt, scrypt, argon2")]
    UnknownHash(String),

    #[error("The {0} hash function is salted and cannot be used here")]
    UnsupportedHash(HashFunction),

    #[error("Unknown charset class '{0}', expected one of l, u, d, s")]
    CharsetClass(char),

    #[error("The charset is empty")]
    EmptyCharset,

    #[error("The minimum length ({min}) is greater than the maximum length ({max})")]
    LengthBounds { min: usize, max: usize },

    #[error("The search space is too large: it needs {0} bits")]
    Space(u32),

    #[error("Failed to hash the password: {0}")]
    Hash(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unable to access the file at {}", .path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("An I/O error occured while reading candidates")]
    Io(#[from] io::Error),

    #[error("Failed to serialize the data")]
    Serialize,

    #[error("Failed to deserialize the data. Is the file corrupted?")]
    Deserialize,

    #[error("The digest is not valid hexadecimal")]
    Digest,

    #[error("A worker thread panicked")]
    WorkerPanic,
}

use std::{fmt::Display, str::FromStr};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use digest::DynDigest;
use md5::Md5;
use rand::{rngs::OsRng, RngCore};
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use crate::error::{SecSuiteError, SecSuiteResult};

/// A raw digest.
pub type Digest = Vec<u8>;

/// The bcrypt cost used when hashing passwords.
pub const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// scrypt parameters (N = 2^14, r = 8, p = 1).
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SCRYPT_SALT_LENGTH: usize = 16;
const SCRYPT_OUTPUT_LENGTH: usize = 64;

/// All the supported hash functions.
#[derive(Copy, Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum HashFunction {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Bcrypt,
    Scrypt,
    Argon2,
}

impl HashFunction {
    pub const ALL: [HashFunction; 7] = [
        Self::Md5,
        Self::Sha1,
        Self::Sha256,
        Self::Sha512,
        Self::Bcrypt,
        Self::Scrypt,
        Self::Argon2,
    ];

    /// Returns the CPU implementation of this hash.
    /// Salted key derivation functions have none, as they cannot produce a deterministic digest.
    pub fn cpu(&self) -> Option<Box<dyn DynDigest>> {
        match self {
            Self::Md5 => Some(Box::new(Md5::default())),
            Self::Sha1 => Some(Box::new(Sha1::default())),
            Self::Sha256 => Some(Box::new(Sha256::default())),
            Self::Sha512 => Some(Box::new(Sha512::default())),
            Self::Bcrypt | Self::Scrypt | Self::Argon2 => None,
        }
    }

    /// Returns true if this hash function embeds a random salt in its output.
    pub fn is_salted(&self) -> bool {
        matches!(self, Self::Bcrypt | Self::Scrypt | Self::Argon2)
    }

    /// Computes the raw digest of some data, for unsalted hash functions only.
    pub fn digest(&self, data: &[u8]) -> Option<Digest> {
        let mut hasher = self.cpu()?;
        hasher.update(data);
        Some(hasher.finalize().into_vec())
    }

    /// Hashes a password into its textual representation:
    /// hexadecimal for the fast hashes, the modular crypt format for bcrypt and argon2,
    /// and `hexsalt$hexhash` for scrypt.
    pub fn hash(&self, password: &str) -> SecSuiteResult<String> {
        match self {
            Self::Bcrypt => bcrypt::hash(password, BCRYPT_COST)
                .map_err(|err| SecSuiteError::Hash(err.to_string())),
            Self::Scrypt => {
                let mut salt = [0; SCRYPT_SALT_LENGTH];
                OsRng.fill_bytes(&mut salt);
                let output = scrypt_digest(password.as_bytes(), &salt, SCRYPT_OUTPUT_LENGTH)?;

                Ok(format!("{}${}", hex::encode(salt), hex::encode(output)))
            }
            Self::Argon2 => {
                let salt = SaltString::generate(&mut OsRng);
                Argon2::default()
                    .hash_password(password.as_bytes(), &salt)
                    .map(|hash| hash.to_string())
                    .map_err(|err| SecSuiteError::Hash(err.to_string()))
            }
            fast => fast
                .digest(password.as_bytes())
                .map(hex::encode)
                .ok_or(SecSuiteError::UnsupportedHash(*fast)),
        }
    }

    /// Checks a candidate against a textual digest.
    /// A malformed digest never matches.
    pub fn verify(&self, candidate: &str, digest: &str) -> bool {
        let digest = digest.trim();

        match self {
            Self::Bcrypt => bcrypt::verify(candidate, digest).unwrap_or(false),
            Self::Scrypt => verify_scrypt(candidate, digest),
            Self::Argon2 => PasswordHash::new(digest).is_ok_and(|parsed| {
                Argon2::default()
                    .verify_password(candidate.as_bytes(), &parsed)
                    .is_ok()
            }),
            fast => match (fast.digest(candidate.as_bytes()), hex::decode(digest)) {
                (Some(computed), Ok(expected)) => computed == expected,
                _ => false,
            },
        }
    }

    /// Infers the hash function from the shape of a digest.
    /// Returns `None` when the digest is ambiguous or unknown.
    pub fn detect(digest: &str) -> Option<Self> {
        let digest = digest.trim();

        if ["$2a$", "$2b$", "$2y$"]
            .iter()
            .any(|prefix| digest.starts_with(prefix))
        {
            return Some(Self::Bcrypt);
        }

        if digest.starts_with("$argon2") {
            return Some(Self::Argon2);
        }

        if let Some((salt, hash)) = digest.split_once('$') {
            return (is_hex(salt) && is_hex(hash)).then_some(Self::Scrypt);
        }

        if !is_hex(digest) {
            return None;
        }

        match digest.len() {
            32 => Some(Self::Md5),
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            128 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// The lowercase name of the hash function.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Bcrypt => "bcrypt",
            Self::Scrypt => "scrypt",
            Self::Argon2 => "argon2",
        }
    }
}

impl Display for HashFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashFunction {
    type Err = SecSuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();

        Self::ALL
            .into_iter()
            .find(|hash_function| hash_function.name() == name)
            .ok_or_else(|| SecSuiteError::UnknownHash(s.to_owned()))
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn scrypt_digest(password: &[u8], salt: &[u8], len: usize) -> SecSuiteResult<Vec<u8>> {
    let params = ScryptParams::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P)
        .map_err(|err| SecSuiteError::Hash(err.to_string()))?;
    let mut output = vec![0; len];
    scrypt::scrypt(password, salt, &params, &mut output)
        .map_err(|err| SecSuiteError::Hash(err.to_string()))?;

    Ok(output)
}

fn verify_scrypt(candidate: &str, digest: &str) -> bool {
    let Some((salt, expected)) = digest.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }

    scrypt_digest(candidate.as_bytes(), &salt, expected.len())
        .is_ok_and(|computed| computed == expected)
}

/// Decides whether a candidate is the password being searched for.
pub trait Oracle: Sync {
    fn verify(&self, candidate: &str) -> bool;
}

impl<F> Oracle for F
where
    F: Fn(&str) -> bool + Sync,
{
    fn verify(&self, candidate: &str) -> bool {
        self(candidate)
    }
}

/// A digest to recover, along with the hash function that produced it.
#[derive(Clone, Debug)]
pub struct Target {
    digest: String,
    hash_function: HashFunction,
    /// The decoded digest, when the hash function is unsalted and the digest is valid hex.
    raw: Option<Digest>,
}

impl Target {
    /// Creates a new target.
    pub fn new(digest: &str, hash_function: HashFunction) -> Self {
        let digest = digest.trim().to_owned();
        let raw = if hash_function.is_salted() {
            None
        } else {
            hex::decode(&digest).ok()
        };

        Self {
            digest,
            hash_function,
            raw,
        }
    }

    /// Creates a new target, inferring the hash function from the digest.
    pub fn detect(digest: &str) -> SecSuiteResult<Self> {
        HashFunction::detect(digest)
            .map(|hash_function| Self::new(digest, hash_function))
            .ok_or_else(|| SecSuiteError::UnknownHash(digest.to_owned()))
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    /// The decoded digest, if any.
    pub fn raw_digest(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }
}

impl Oracle for Target {
    #[inline]
    fn verify(&self, candidate: &str) -> bool {
        match &self.raw {
            Some(raw) => self
                .hash_function
                .digest(candidate.as_bytes())
                .is_some_and(|computed| &computed == raw),
            None => self.hash_function.verify(candidate, &self.digest),
        }
    }
}

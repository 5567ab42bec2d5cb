use std::ops::Deref;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{SecSuiteError, SecSuiteResult};

pub(crate) const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub(crate) const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub(crate) const DIGITS: &str = "0123456789";
pub(crate) const SPECIAL: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;

/// A sorted set of characters, without duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Charset(Vec<char>);

impl Charset {
    /// Creates a charset from arbitrary characters.
    pub fn new(chars: &str) -> SecSuiteResult<Self> {
        let chars = chars.chars().sorted_unstable().dedup().collect_vec();

        if chars.is_empty() {
            return Err(SecSuiteError::EmptyCharset);
        }

        Ok(Self(chars))
    }

    /// Creates a charset from class letters:
    /// `l` for lowercase, `u` for uppercase, `d` for digits and `s` for special characters.
    pub fn from_classes(classes: &str) -> SecSuiteResult<Self> {
        let mut chars = String::new();

        for class in classes.chars() {
            let class_chars = match class {
                'l' => LOWERCASE,
                'u' => UPPERCASE,
                'd' => DIGITS,
                's' => SPECIAL,
                _ => return Err(SecSuiteError::CharsetClass(class)),
            };
            chars.push_str(class_chars);
        }

        Self::new(&chars)
    }

    /// Returns the position of a character in the charset.
    #[inline]
    pub fn position(&self, c: char) -> Option<usize> {
        self.0.binary_search(&c).ok()
    }
}

impl Deref for Charset {
    type Target = [char];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

use std::{collections::HashSet, path::Path};

use serde::Serialize;
use tracing::debug;

use crate::{
    charset::{DIGITS, LOWERCASE, SPECIAL, UPPERCASE},
    error::SecSuiteResult,
    wordlist::WordlistReader,
};

/// The maximum strength score of a password.
pub const MAX_SCORE: u8 = 100;

/// The strength of a password.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PasswordAnalysis {
    /// The number of characters of the password.
    pub length: usize,
    /// The size of the charset an attacker has to enumerate, from the character classes used.
    pub pool_size: usize,
    /// The brute force entropy, in bits.
    pub entropy: f64,
    /// The strength score, out of [`MAX_SCORE`].
    pub score: u8,
}

impl PasswordAnalysis {
    pub fn new(password: &str) -> Self {
        let length = password.chars().count();
        let pool_size = pool_size(password);

        Self {
            length,
            pool_size,
            entropy: entropy(password),
            score: strength_score(password),
        }
    }
}

/// Returns the total size of the character classes appearing in the password.
/// Characters outside of the lowercase, uppercase, digit and special classes don't count.
pub fn pool_size(password: &str) -> usize {
    [LOWERCASE, UPPERCASE, DIGITS, SPECIAL]
        .into_iter()
        .filter(|class| password.chars().any(|c| class.contains(c)))
        .map(|class| class.chars().count())
        .sum()
}

/// Returns `length * log2(pool_size)`, the number of bits needed to enumerate
/// every password of this length over the classes it uses.
pub fn entropy(password: &str) -> f64 {
    let pool_size = pool_size(password);

    if pool_size == 0 {
        return 0.;
    }

    password.chars().count() as f64 * (pool_size as f64).log2()
}

/// Scores a password from 0 to [`MAX_SCORE`], from its length, its variety of
/// character kinds and its proportion of distinct characters.
pub fn strength_score(password: &str) -> u8 {
    if password.is_empty() {
        return 0;
    }

    let length = password.chars().count();
    let length_score = match length {
        12.. => 25,
        8..=11 => 15,
        _ => 5,
    };

    let kinds = [
        password.chars().any(char::is_uppercase),
        password.chars().any(char::is_lowercase),
        password.chars().any(char::is_numeric),
        password.chars().any(|c| !c.is_alphanumeric()),
    ];
    let variety_score = match kinds.into_iter().filter(|&kind| kind).count() {
        4 => 40,
        3 => 25,
        2 => 15,
        _ => 5,
    };

    let unique = password.chars().collect::<HashSet<_>>().len();
    let spread = length as f64 * (unique as f64).sqrt();
    let spread_score = if spread > 50. {
        35
    } else if spread > 30. {
        25
    } else {
        10
    };

    (length_score + variety_score + spread_score).min(MAX_SCORE)
}

/// Analyzes every password of a wordlist, along with its line number.
/// Surrounding whitespace is trimmed and blank lines are skipped.
pub fn analyze_wordlist(path: &Path) -> SecSuiteResult<Vec<(u64, String, PasswordAnalysis)>> {
    let mut analyses = Vec::new();

    for entry in WordlistReader::open(path)? {
        let entry = entry?;
        let password = entry.word.trim();

        if password.is_empty() {
            continue;
        }

        analyses.push((entry.line, password.to_owned(), PasswordAnalysis::new(password)));
    }

    debug!(passwords = analyses.len(), "analyzed the wordlist");

    Ok(analyses)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn assert_close(expected: f64, actual: f64) {
        assert!((expected - actual).abs() < 1e-9, "{expected} != {actual}");
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(0, pool_size(""));
        assert_eq!(26, pool_size("abc"));
        assert_eq!(52, pool_size("aBc"));
        assert_eq!(62, pool_size("aB3"));
        assert_eq!(94, pool_size("aB3!"));
        assert_eq!(10, pool_size("1234"));
        assert_eq!(0, pool_size("éé"));
    }

    #[test]
    fn test_entropy() {
        assert_close(0., entropy(""));
        assert_close(3. * 26f64.log2(), entropy("abc"));
        assert_close(4. * 94f64.log2(), entropy("aA1!"));
        assert_close(6. * 10f64.log2(), entropy("123456"));

        // the same classes give the same pool, whatever the characters
        assert_close(entropy("aaaa"), entropy("wxyz"));
        assert!(entropy("abcdefgh") > entropy("abcd"));
    }

    #[test]
    fn test_strength_score() {
        assert_eq!(0, strength_score(""));
        // short, a single kind, low spread
        assert_eq!(20, strength_score("abc"));
        // acceptable length, two kinds, low spread
        assert_eq!(40, strength_score("password12"));
        // good length, two kinds, moderate spread
        assert_eq!(65, strength_score("abcdefghijk12"));
        assert_eq!(MAX_SCORE, strength_score("Tr0ub4dor&3xyz"));

        for password in ["a", "correct horse battery staple", "ÄÖÜ123", "!!!!!!!!!!!!!!"] {
            assert!(strength_score(password) <= MAX_SCORE);
        }
    }

    #[test]
    fn test_analysis() {
        let analysis = PasswordAnalysis::new("aB3!");

        assert_eq!(4, analysis.length);
        assert_eq!(94, analysis.pool_size);
        assert_close(entropy("aB3!"), analysis.entropy);
        assert_eq!(strength_score("aB3!"), analysis.score);
    }

    #[test]
    fn test_analyze_wordlist() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "abc").unwrap();
        writeln!(file, "   ").unwrap();
        writeln!(file, "  Tr0ub4dor&3xyz  ").unwrap();

        let analyses = analyze_wordlist(file.path()).unwrap();

        assert_eq!(2, analyses.len());
        assert_eq!((1, "abc".to_owned()), (analyses[0].0, analyses[0].1.clone()));
        assert_eq!(3, analyses[1].0);
        assert_eq!("Tr0ub4dor&3xyz", analyses[1].1);
        assert_eq!(MAX_SCORE, analyses[1].2.score);

        assert!(analyze_wordlist(Path::new("/nonexistent/wordlist.txt")).is_err());
    }
}

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use tracing::debug;

use crate::error::{SecSuiteError, SecSuiteResult};

/// A word read from a wordlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordlistEntry {
    /// The 1-based line number of the word, blank lines included.
    pub line: u64,
    /// The word, without its line terminator.
    pub word: String,
}

/// A streaming reader of newline-delimited words.
/// Blank lines are skipped, and lines that are not valid UTF-8 are decoded as Latin-1.
pub struct WordlistReader<R> {
    reader: R,
    buf: Vec<u8>,
    line: u64,
}

impl WordlistReader<BufReader<File>> {
    /// Opens a wordlist file.
    pub fn open(path: &Path) -> SecSuiteResult<Self> {
        let file = File::open(path).map_err(|source| SecSuiteError::Resource {
            path: path.to_owned(),
            source,
        })?;

        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> WordlistReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for WordlistReader<R> {
    type Item = io::Result<WordlistEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();

            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => (),
                Err(err) => return Some(Err(err)),
            }
            self.line += 1;

            if self.buf.last() == Some(&b'\n') {
                self.buf.pop();
            }
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }

            let word = decode(&self.buf, self.line);
            if word.trim().is_empty() {
                continue;
            }

            return Some(Ok(WordlistEntry {
                line: self.line,
                word,
            }));
        }
    }
}

fn decode(bytes: &[u8], line: u64) -> String {
    match std::str::from_utf8(bytes) {
        Ok(word) => word.to_owned(),
        Err(err) => {
            debug!(line, %err, "invalid UTF-8, decoding the line as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use itertools::Itertools;

    use super::*;

    fn read(input: &[u8]) -> Vec<WordlistEntry> {
        WordlistReader::new(Cursor::new(input.to_vec()))
            .map(|entry| entry.unwrap())
            .collect_vec()
    }

    #[test]
    fn test_skips_blank_lines() {
        let entries = read(b"hello\n\n   \npassword123\r\nabca");

        assert_eq!(
            vec![
                WordlistEntry {
                    line: 1,
                    word: "hello".to_owned()
                },
                WordlistEntry {
                    line: 4,
                    word: "password123".to_owned()
                },
                WordlistEntry {
                    line: 5,
                    word: "abca".to_owned()
                },
            ],
            entries
        );
    }

    #[test]
    fn test_latin1_fallback() {
        let entries = read(b"caf\xe9\nna\xefve\n");

        assert_eq!(
            vec!["café", "naïve"],
            entries.iter().map(|entry| entry.word.as_str()).collect_vec()
        );
    }

    #[test]
    fn test_keeps_inner_whitespace() {
        let entries = read(b" two words \n");
        assert_eq!(" two words ", entries[0].word);
    }

    #[test]
    fn test_empty_input() {
        assert!(read(b"").is_empty());
        assert!(read(b"\n\n\r\n").is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let result = WordlistReader::open(Path::new("/nonexistent/wordlist.txt"));
        assert!(matches!(result, Err(SecSuiteError::Resource { .. })));
    }
}

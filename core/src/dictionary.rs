use std::{
    fs::File,
    io::BufReader,
    mem,
    path::{Path, PathBuf},
};

use crossbeam_channel::Sender;
use tracing::debug;

use crate::{
    error::{SecSuiteError, SecSuiteResult},
    wordlist::{WordlistEntry, WordlistReader},
    DEFAULT_BATCH_SIZE,
};

/// A wordlist streamed from disk.
/// The file is never loaded at once: words are read in batches and handed to the workers
/// through a bounded queue.
#[derive(Clone, Debug)]
pub struct Dictionary {
    path: PathBuf,
    batch_size: usize,
}

impl Dictionary {
    /// Creates a new dictionary.
    /// Fails if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> SecSuiteResult<Self> {
        let path = path.as_ref().to_owned();

        File::open(&path).map_err(|source| SecSuiteError::Resource {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Sets the number of words sent to a worker at once.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);

        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a reader over the words of the dictionary.
    pub fn reader(&self) -> SecSuiteResult<WordlistReader<BufReader<File>>> {
        WordlistReader::open(&self.path)
    }

    /// Reads the dictionary and sends its words in batches.
    /// Stops early when `is_stopped` returns true at a batch boundary or when every receiver is gone.
    /// The channel is closed when the sender is dropped on return, which tells the consumers
    /// that the dictionary is exhausted.
    pub(crate) fn produce(
        &self,
        sender: Sender<Vec<WordlistEntry>>,
        is_stopped: impl Fn() -> bool,
    ) -> SecSuiteResult<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut batch_count = 0usize;

        for entry in self.reader()? {
            batch.push(entry?);

            if batch.len() < self.batch_size {
                continue;
            }

            if is_stopped() {
                debug!(batch_count, "dictionary producer stopped");
                return Ok(());
            }

            let full_batch = mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
            if sender.send(full_batch).is_err() {
                debug!(batch_count, "every dictionary consumer is gone");
                return Ok(());
            }
            batch_count += 1;
        }

        if !batch.is_empty() && !is_stopped() && sender.send(batch).is_ok() {
            batch_count += 1;
        }

        debug!(batch_count, path = %self.path.display(), "dictionary exhausted");
        Ok(())
    }
}

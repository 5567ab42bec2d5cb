use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{SecSuiteError, SecSuiteResult};

const BUFFER_CAPACITY: usize = 1024 * 1024 * 16;

/// Stores a value to the given path with bincode.
pub(crate) fn store<T: Serialize>(value: &T, path: &Path) -> SecSuiteResult<()> {
    let file = File::options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| SecSuiteError::Resource {
            path: path.to_owned(),
            source,
        })?;

    let mut buf_writer = BufWriter::with_capacity(BUFFER_CAPACITY, file);
    bincode::serialize_into(&mut buf_writer, value).map_err(|_| SecSuiteError::Serialize)?;
    buf_writer.flush()?;

    Ok(())
}

/// Loads a value stored with `store`.
pub(crate) fn load<T: DeserializeOwned>(path: &Path) -> SecSuiteResult<T> {
    let file = File::open(path).map_err(|source| SecSuiteError::Resource {
        path: path.to_owned(),
        source,
    })?;

    let buf_reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
    bincode::deserialize_from(buf_reader).map_err(|_| SecSuiteError::Deserialize)
}

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Debug,
    iter::Rev,
    ops::Range,
    path::Path,
    sync::Arc,
    thread,
};

use crossbeam_channel::{unbounded, Sender};
use digest::DynDigest;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    ctx::RainbowTableCtx,
    error::{SecSuiteError, SecSuiteResult},
    event::{Event, EventHandle},
    hash::Digest,
    persist,
    reduce::{counter_to_plaintext, plaintext_to_counter, reduce},
    scheduling::BatchIterator,
    DEFAULT_BUILD_BATCH_SIZE,
};

/// A rainbow table, mapping the endpoint digest of each chain to its startpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct RainbowTable {
    /// The chains of the table.
    chains: HashMap<Digest, String>,
    /// The context.
    ctx: RainbowTableCtx,
}

impl RainbowTable {
    /// Creates a new rainbow table on a background thread.
    /// Returns an handle to get events related to the generation and to get the generated table.
    pub fn new_nonblocking(ctx: RainbowTableCtx) -> EventHandle<Self> {
        let (sender, receiver) = unbounded();
        let thread_handle = thread::spawn(move || Self::new(ctx, Some(sender)));

        EventHandle {
            thread_handle,
            receiver,
        }
    }

    /// Creates a new rainbow table.
    pub fn new_blocking(ctx: RainbowTableCtx) -> SecSuiteResult<Self> {
        Self::new(ctx, None)
    }

    fn new(ctx: RainbowTableCtx, sender: Option<Sender<Event>>) -> SecSuiteResult<Self> {
        if ctx.hash_function.is_salted() {
            return Err(SecSuiteError::UnsupportedHash(ctx.hash_function));
        }

        info!(
            hash = %ctx.hash_function,
            chains = ctx.num_chains,
            chain_length = ctx.chain_length,
            "building a rainbow table"
        );

        let startpoints = Self::startpoints(&ctx);
        let mut chains = HashMap::with_capacity(startpoints.len());
        let mut collisions = 0u64;

        let batch_iter = BatchIterator::with_batch_size(startpoints.len(), DEFAULT_BUILD_BATCH_SIZE);
        let batch_count = batch_iter.len();

        for (batch_number, range) in batch_iter.enumerate() {
            if let Some(sender) = &sender {
                sender
                    .send(Event::Batch {
                        batch_number: batch_number + 1,
                        batch_count,
                    })
                    .ok();
            }

            let batch = &startpoints[range];
            let endpoints: Option<Vec<Digest>> = batch
                .par_iter()
                .map_init(
                    || ctx.hash_function.cpu(),
                    |hasher, startpoint| {
                        let hasher: &mut dyn DynDigest = hasher.as_deref_mut()?;
                        let digest = hash(hasher, startpoint);
                        Some(continue_chain(hasher, digest, 0..ctx.chain_length, &ctx))
                    },
                )
                .collect();
            let endpoints = endpoints.ok_or(SecSuiteError::UnsupportedHash(ctx.hash_function))?;

            // the first chain reaching an endpoint is kept
            for (startpoint, endpoint) in batch.iter().zip(endpoints) {
                match chains.entry(endpoint) {
                    Entry::Vacant(entry) => {
                        entry.insert(startpoint.clone());
                    }
                    Entry::Occupied(_) => collisions += 1,
                }
            }

            if let Some(sender) = &sender {
                let progress = (batch_number + 1) as f64 / batch_count as f64 * 100.;
                sender.send(Event::Progress(progress)).ok();
            }
        }

        debug!(collisions, "discarded the merging chains");
        info!(chains = chains.len(), "rainbow table built");

        chains.shrink_to_fit();
        Ok(Self { chains, ctx })
    }

    /// Draws the startpoints uniformly from the search space.
    fn startpoints(ctx: &RainbowTableCtx) -> Vec<String> {
        let mut rng = match ctx.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        (0..ctx.num_chains)
            .map(|_| counter_to_plaintext(rng.gen_range(0..ctx.n), ctx))
            .collect()
    }

    /// Returns the number of chains stored in the table.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Returns the context.
    pub fn ctx(&self) -> &RainbowTableCtx {
        &self.ctx
    }

    /// Returns an iterator over the (endpoint, startpoint) pairs of the table.
    /// The chains are not returned in a particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &String)> {
        self.chains.iter()
    }

    /// Searches the endpoints for a digest.
    /// Returns the startpoint of the chain if the digest is an endpoint.
    #[inline]
    pub fn search_endpoints(&self, digest: &[u8]) -> Option<&String> {
        self.chains.get(digest)
    }

    /// Returns the passwords of the chain starting at `startpoint`, startpoint included.
    pub fn chain(&self, startpoint: &str) -> SecSuiteResult<Vec<String>> {
        let mut hasher = self
            .ctx
            .hash_function
            .cpu()
            .ok_or(SecSuiteError::UnsupportedHash(self.ctx.hash_function))?;

        let mut password = startpoint.to_owned();
        let mut passwords = Vec::with_capacity(self.ctx.chain_length as usize + 1);

        for k in 0..self.ctx.chain_length {
            let digest = hash(&mut *hasher, &password);
            let next = reduce(&digest, k, &self.ctx);
            passwords.push(password);
            password = next;
        }
        passwords.push(password);

        Ok(passwords)
    }

    /// Searches for a password in a given column.
    /// The column is the position of the password in its chain, in `0..=chain_length`.
    #[inline]
    pub fn search_column(&self, column: u64, digest: &[u8]) -> Option<String> {
        let ctx = &self.ctx;
        let mut hasher = ctx.hash_function.cpu()?;

        // walk to the end of the chain, as if the digest was in this column
        let endpoint = continue_chain(
            &mut *hasher,
            digest.to_vec(),
            column..ctx.chain_length,
            ctx,
        );
        let startpoint = self.search_endpoints(&endpoint)?;

        // we found a matching endpoint, reconstruct the chain
        let mut chain_plaintext = startpoint.clone();
        for k in 0..=column {
            let chain_digest = hash(&mut *hasher, &chain_plaintext);

            // the digest was indeed present in the chain, we found a plaintext matching the digest
            if chain_digest == digest {
                return Some(chain_plaintext);
            }

            if k < column {
                chain_plaintext = reduce(&chain_digest, k, ctx);
            }
        }

        // false alarm
        None
    }

    /// Searches for a password that hashes to the given digest.
    pub fn search(&self, digest: &[u8]) -> Option<String> {
        // we use Range<usize> because RangeInclusive<u64> doesn't implement IndexedParallelIterator.
        (0..self.ctx.chain_length as usize + 1)
            .into_par_iter()
            .rev()
            .find_map_any(|column| self.search_column(column as u64, digest))
    }

    /// Searches for a password that hashes to the given hexadecimal digest.
    pub fn search_hex(&self, digest: &str) -> SecSuiteResult<Option<String>> {
        let digest = hex::decode(digest.trim()).map_err(|_| SecSuiteError::Digest)?;

        Ok(self.search(&digest))
    }

    /// Stores this rainbow table to the given path.
    pub fn store(&self, path: &Path) -> SecSuiteResult<()> {
        persist::store(self, path)
    }

    /// Loads a rainbow table from the given path.
    /// A table whose context or startpoints are outside of its search space is rejected.
    pub fn load(path: &Path) -> SecSuiteResult<Self> {
        let table: Self = persist::load(path)?;
        let ctx = &table.ctx;

        if !ctx.is_consistent() {
            return Err(SecSuiteError::Deserialize);
        }

        let digest_len = ctx.hash_function.cpu().map(|hasher| hasher.output_size());
        let valid_chains = table.chains.iter().all(|(endpoint, startpoint)| {
            Some(endpoint.len()) == digest_len && plaintext_to_counter(startpoint, ctx).is_some()
        });
        if !valid_chains {
            return Err(SecSuiteError::Deserialize);
        }

        Ok(table)
    }
}

impl Debug for RainbowTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_map();

        for (endpoint, startpoint) in self.chains.iter().take(10) {
            debug.entry(startpoint, &hex::encode(endpoint));
        }

        debug.finish()?;
        write!(f, " ({} chains, {:?})", self.chains.len(), self.ctx)
    }
}

#[inline]
fn hash(hasher: &mut dyn DynDigest, password: &str) -> Digest {
    hasher.update(password.as_bytes());
    hasher.finalize_reset().into_vec()
}

/// Continues a chain from the digest of the password in column `columns.start`
/// and returns the digest of the password in column `columns.end`.
#[inline]
fn continue_chain(
    hasher: &mut dyn DynDigest,
    mut digest: Digest,
    columns: Range<u64>,
    ctx: &RainbowTableCtx,
) -> Digest {
    for k in columns {
        let plaintext = reduce(&digest, k, ctx);
        digest = hash(hasher, &plaintext);
    }

    digest
}

/// The reverse lookup of a digest in a rainbow table, as a candidate source.
/// Every candidate produced has been confirmed by replaying its chain.
#[derive(Clone, Debug)]
pub struct RainbowChainWalk {
    table: Arc<RainbowTable>,
    target: Arc<[u8]>,
}

impl RainbowChainWalk {
    /// Creates a new chain walk for a raw digest.
    pub fn new(table: Arc<RainbowTable>, target: &[u8]) -> Self {
        Self {
            table,
            target: target.into(),
        }
    }

    /// Creates a new chain walk for an hexadecimal digest.
    pub fn from_hex(table: Arc<RainbowTable>, target: &str) -> SecSuiteResult<Self> {
        let target = hex::decode(target.trim()).map_err(|_| SecSuiteError::Digest)?;

        Ok(Self::new(table, &target))
    }

    pub fn table(&self) -> &RainbowTable {
        &self.table
    }

    /// Returns the number of columns to search.
    pub fn columns(&self) -> u64 {
        self.table.ctx.chain_length + 1
    }

    /// Splits the columns to search between at most `workers` shards.
    /// Each shard searches its columns from the end of the chains, where the walks are the shortest.
    pub fn shards(&self, workers: usize) -> Vec<RainbowChainShard> {
        let columns = usize::try_from(self.columns()).unwrap_or(usize::MAX);

        BatchIterator::new(columns, workers.max(1))
            .map(|range| RainbowChainShard {
                table: self.table.clone(),
                target: self.target.clone(),
                columns: (range.start as u64..range.end as u64).rev(),
            })
            .collect()
    }
}

/// A range of columns of a chain walk.
pub struct RainbowChainShard {
    table: Arc<RainbowTable>,
    target: Arc<[u8]>,
    columns: Rev<Range<u64>>,
}

impl Iterator for RainbowChainShard {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.columns
            .by_ref()
            .find_map(|column| self.table.search_column(column, &self.target))
    }
}

use crate::{
    bruteforce::BruteForce, dictionary::Dictionary, markov::MarkovCandidates,
    rainbow_table::RainbowChainWalk,
};

/// A disjoint part of a search space, owned by a single worker.
pub type Shard = Box<dyn Iterator<Item = String> + Send>;

/// How a candidate source is divided between the workers.
pub enum Partition<'a> {
    /// Independent shards, one worker each.
    Shards(Vec<Shard>),
    /// A stream shared by every worker through a bounded queue.
    Stream(&'a Dictionary),
}

/// All the supported candidate sources.
#[derive(Clone, Debug)]
pub enum CandidateSource {
    BruteForce(BruteForce),
    Dictionary(Dictionary),
    Markov(MarkovCandidates),
    RainbowChain(RainbowChainWalk),
}

impl CandidateSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BruteForce(_) => "brute force",
            Self::Dictionary(_) => "dictionary",
            Self::Markov(_) => "markov",
            Self::RainbowChain(_) => "rainbow chain",
        }
    }

    /// Returns the number of candidates, if it is known without enumerating them.
    pub fn total(&self) -> Option<u128> {
        match self {
            Self::BruteForce(brute_force) => Some(brute_force.total_combinations()),
            Self::Markov(markov) => Some(markov.total() as u128),
            Self::Dictionary(_) | Self::RainbowChain(_) => None,
        }
    }

    /// Divides the source between at most `workers` workers.
    pub fn partition(&self, workers: usize) -> Partition<'_> {
        match self {
            Self::BruteForce(brute_force) => Partition::Shards(boxed(brute_force.shards(workers))),
            Self::Markov(markov) => Partition::Shards(boxed(markov.shards(workers))),
            Self::RainbowChain(walk) => Partition::Shards(boxed(walk.shards(workers))),
            Self::Dictionary(dictionary) => Partition::Stream(dictionary),
        }
    }
}

fn boxed<I>(shards: Vec<I>) -> Vec<Shard>
where
    I: Iterator<Item = String> + Send + 'static,
{
    shards
        .into_iter()
        .map(|shard| Box::new(shard) as Shard)
        .collect()
}

impl From<BruteForce> for CandidateSource {
    fn from(brute_force: BruteForce) -> Self {
        Self::BruteForce(brute_force)
    }
}

impl From<Dictionary> for CandidateSource {
    fn from(dictionary: Dictionary) -> Self {
        Self::Dictionary(dictionary)
    }
}

impl From<MarkovCandidates> for CandidateSource {
    fn from(markov: MarkovCandidates) -> Self {
        Self::Markov(markov)
    }
}

impl From<RainbowChainWalk> for CandidateSource {
    fn from(walk: RainbowChainWalk) -> Self {
        Self::RainbowChain(walk)
    }
}

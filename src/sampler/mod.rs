//! Unbiased pair sampling.
//!
//! Pairs are drawn uniformly over all unordered pairs of a catalog, without
//! replacement inside a single draw. Production draws use the operating
//! system CSPRNG; every function has a `_with_rng` form for seeded tests.

use std::collections::HashSet;
use std::fmt;

use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;

/// An ordered pair of distinct catalog indices.
///
/// Slot order matters for judgments (which side was picked) but not for
/// uniqueness; compare pairs through [`IndexPair::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexPair {
    pub a: usize,
    pub b: usize,
}

/// Order-insensitive identity of a pair: `(min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub lo: usize,
    pub hi: usize,
}

impl IndexPair {
    pub fn new(a: usize, b: usize) -> Self {
        Self { a, b }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.a, self.b)
    }

    /// The same pair with the slots swapped.
    pub fn flipped(&self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }
}

impl PairKey {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            lo: x.min(y),
            hi: x.max(y),
        }
    }
}

impl fmt::Display for IndexPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.a, self.b)
    }
}

/// Number of unordered pairs over `n` items, `C(n, 2)`.
pub fn pair_count(n: usize) -> usize {
    n.saturating_mul(n.saturating_sub(1)) / 2
}

/// Draw `count` unique pairs of items using the OS random source.
pub fn generate_pairs<T: Clone>(items: &[T], count: usize) -> Result<Vec<(T, T)>, SamplerError> {
    generate_pairs_with_rng(items, count, &mut OsRng)
}

/// [`generate_pairs`] with a caller-supplied random source.
pub fn generate_pairs_with_rng<T, R>(
    items: &[T],
    count: usize,
    rng: &mut R,
) -> Result<Vec<(T, T)>, SamplerError>
where
    T: Clone,
    R: Rng + ?Sized,
{
    let pairs = generate_index_pairs_with_rng(items.len(), count, rng)?;
    Ok(pairs
        .into_iter()
        .map(|p| (items[p.a].clone(), items[p.b].clone()))
        .collect())
}

/// Draw `count` unique index pairs over `0..n` using the OS random source.
pub fn generate_index_pairs(n: usize, count: usize) -> Result<Vec<IndexPair>, SamplerError> {
    generate_index_pairs_with_rng(n, count, &mut OsRng)
}

/// [`generate_index_pairs`] with a caller-supplied random source.
pub fn generate_index_pairs_with_rng<R: Rng + ?Sized>(
    n: usize,
    count: usize,
    rng: &mut R,
) -> Result<Vec<IndexPair>, SamplerError> {
    generate_index_pairs_excluding(n, count, &HashSet::new(), rng)
}

/// Draw `count` unique index pairs over `0..n`, none of which collides with a
/// key in `exclude`.
///
/// Small requests use rejection sampling of two independent uniform indices.
/// Once the request covers more than half of the remaining pair space, the
/// remaining pairs are enumerated and sampled without replacement instead, so
/// the amount of work stays bounded while every pair keeps equal probability.
pub fn generate_index_pairs_excluding<R: Rng + ?Sized>(
    n: usize,
    count: usize,
    exclude: &HashSet<PairKey>,
    rng: &mut R,
) -> Result<Vec<IndexPair>, SamplerError> {
    if n < 2 {
        return Err(SamplerError::InsufficientItems { available: n });
    }

    let excluded = exclude.iter().filter(|k| k.lo != k.hi && k.hi < n).count();
    let available = pair_count(n) - excluded;
    if count > available {
        return Err(SamplerError::TooManyPairs {
            requested: count,
            available,
        });
    }

    if count.saturating_mul(2) <= available {
        Ok(rejection_sample(n, count, exclude, rng))
    } else {
        Ok(enumerate_sample(n, count, exclude, rng))
    }
}

fn rejection_sample<R: Rng + ?Sized>(
    n: usize,
    count: usize,
    exclude: &HashSet<PairKey>,
    rng: &mut R,
) -> Vec<IndexPair> {
    let mut seen = HashSet::with_capacity(count);
    let mut pairs = Vec::with_capacity(count);

    while pairs.len() < count {
        let pair = random_pair(n, rng);
        let key = pair.key();
        if exclude.contains(&key) || !seen.insert(key) {
            continue;
        }
        pairs.push(pair);
    }

    pairs
}

fn enumerate_sample<R: Rng + ?Sized>(
    n: usize,
    count: usize,
    exclude: &HashSet<PairKey>,
    rng: &mut R,
) -> Vec<IndexPair> {
    let candidates: Vec<PairKey> = (0..n)
        .flat_map(|lo| ((lo + 1)..n).map(move |hi| PairKey { lo, hi }))
        .filter(|key| !exclude.contains(key))
        .collect();

    rand::seq::index::sample(rng, candidates.len(), count)
        .into_iter()
        .map(|i| {
            let key = candidates[i];
            // Slot order is uniform on the rejection path; keep it that way here.
            if rng.gen_bool(0.5) {
                IndexPair::new(key.lo, key.hi)
            } else {
                IndexPair::new(key.hi, key.lo)
            }
        })
        .collect()
}

fn random_pair<R: Rng + ?Sized>(n: usize, rng: &mut R) -> IndexPair {
    let first = rng.gen_range(0..n);
    let mut second = rng.gen_range(0..n);
    while second == first {
        second = rng.gen_range(0..n);
    }
    IndexPair::new(first, second)
}

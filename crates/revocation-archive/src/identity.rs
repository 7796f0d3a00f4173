//! Pool of client identities used to vary outbound request fingerprints.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{ArchiveError, ArchiveResult, ClientIdentity};

/// A fixed, non-empty set of client identities.
///
/// Built once at startup and shared read-only (`Arc<IdentityPool>`) between
/// fetchers. [`pick`](Self::pick) and [`shuffled`](Self::shuffled) never
/// mutate the pool, so concurrent workers each get a private ordering.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    identities: Vec<ClientIdentity>,
}

impl IdentityPool {
    /// Build a pool, rejecting an empty set and blank tokens.
    pub fn new<I, S>(tokens: I) -> ArchiveResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identities: Vec<ClientIdentity> = tokens
            .into_iter()
            .filter_map(|t| {
                let token: String = t.into();
                (!token.trim().is_empty()).then(|| ClientIdentity::new(token))
            })
            .collect();

        if identities.is_empty() {
            return Err(ArchiveError::EmptyIdentityPool);
        }
        Ok(Self { identities })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientIdentity> {
        self.identities.iter()
    }

    /// One identity, uniformly at random.
    pub fn pick(&self) -> &ClientIdentity {
        self.pick_with(&mut rand::thread_rng())
    }

    pub fn pick_with<R: Rng + ?Sized>(&self, rng: &mut R) -> &ClientIdentity {
        // non-empty by construction
        &self.identities[rng.gen_range(0..self.identities.len())]
    }

    /// Reorder the pool in place.
    pub fn shuffle(&mut self) {
        self.identities.shuffle(&mut rand::thread_rng());
    }

    /// A private, randomly ordered copy of the pool.
    pub fn shuffled(&self) -> Vec<ClientIdentity> {
        self.shuffled_with(&mut rand::thread_rng())
    }

    pub fn shuffled_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<ClientIdentity> {
        let mut order = self.identities.clone();
        order.shuffle(rng);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn pool() -> IdentityPool {
        IdentityPool::new(["agent-a", "agent-b", "agent-c", "agent-d"]).unwrap()
    }

    #[test]
    fn test_empty_pool_fails_fast() {
        let err = IdentityPool::new(Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ArchiveError::EmptyIdentityPool));
    }

    #[test]
    fn test_blank_tokens_are_dropped() {
        let err = IdentityPool::new(["", "   "]).unwrap_err();
        assert!(matches!(err, ArchiveError::EmptyIdentityPool));

        let pool = IdentityPool::new(["", "agent-a"]).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pick_returns_member() {
        let pool = pool();
        let members: HashSet<_> = pool.iter().cloned().collect();
        for _ in 0..50 {
            assert!(members.contains(pool.pick()));
        }
    }

    #[test]
    fn test_pick_covers_pool() {
        let pool = pool();
        let mut rng = StdRng::seed_from_u64(7);
        let seen: HashSet<_> = (0..200).map(|_| pool.pick_with(&mut rng).clone()).collect();
        assert_eq!(seen.len(), pool.len());
    }

    #[test]
    fn test_shuffled_is_permutation_and_leaves_pool_alone() {
        let pool = pool();
        let before: Vec<_> = pool.iter().cloned().collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut order = pool.shuffled_with(&mut rng);
        assert_eq!(pool.iter().cloned().collect::<Vec<_>>(), before);

        order.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(order, before);
    }

    #[test]
    fn test_shuffle_in_place_keeps_members() {
        let mut pool = pool();
        pool.shuffle();
        assert_eq!(pool.len(), 4);
    }
}

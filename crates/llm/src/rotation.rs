//! Per-provider credential pools with rotation strategies.
//!
//! Counters are observability, not correctness: every selection increments
//! exactly one per-key counter, but no decision other than `least_used`
//! depends on them.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use config::RotationStrategy;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// The credential pools of all registered providers. Built once at startup,
/// read-only afterwards.
#[derive(Default)]
pub(crate) struct KeyRing {
    pools: HashMap<String, KeyPool>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: impl Into<String>, pool: KeyPool) {
        self.pools.insert(provider.into(), pool);
    }

    /// Select a credential for the given provider. `None` when the provider
    /// is unknown or its pool is empty.
    pub fn select(&self, provider: &str) -> Option<SecretString> {
        self.pools.get(provider)?.select()
    }

    /// Masked usage counters per provider, for the stats endpoint.
    pub fn stats(&self) -> BTreeMap<String, ProviderKeyStats> {
        self.pools
            .iter()
            .map(|(name, pool)| {
                (
                    name.clone(),
                    ProviderKeyStats {
                        strategy: pool.strategy.as_str(),
                        api_key_usage: pool.usage_counts(),
                    },
                )
            })
            .collect()
    }
}

/// Usage statistics for one provider's pool.
#[derive(Debug, Serialize)]
pub struct ProviderKeyStats {
    pub strategy: &'static str,
    pub api_key_usage: BTreeMap<String, u64>,
}

/// An ordered pool of opaque secrets with a selection strategy.
pub(crate) struct KeyPool {
    keys: Vec<SecretString>,
    strategy: RotationStrategy,
    cursor: AtomicU64,
    usage: Vec<AtomicU64>,
    // Serializes the least_used scan-and-increment so the spread between
    // counters never exceeds one.
    scan_lock: Mutex<()>,
}

impl KeyPool {
    pub fn new(keys: Vec<SecretString>, strategy: RotationStrategy) -> Self {
        let usage = keys.iter().map(|_| AtomicU64::new(0)).collect();

        Self {
            keys,
            strategy,
            cursor: AtomicU64::new(0),
            usage,
            scan_lock: Mutex::new(()),
        }
    }

    /// Pick the next credential according to the pool's strategy.
    pub fn select(&self) -> Option<SecretString> {
        if self.keys.is_empty() {
            return None;
        }

        let index = match self.strategy {
            RotationStrategy::RoundRobin => self.next_round_robin(),
            RotationStrategy::Random => self.next_random(),
            RotationStrategy::LeastUsed => self.next_least_used(),
        };

        Some(self.keys[index].clone())
    }

    fn next_round_robin(&self) -> usize {
        let cursor = self.cursor.fetch_add(1, Ordering::Relaxed);
        let index = (cursor % self.keys.len() as u64) as usize;
        self.usage[index].fetch_add(1, Ordering::Relaxed);
        index
    }

    fn next_random(&self) -> usize {
        let index = rand::thread_rng().gen_range(0..self.keys.len());
        self.usage[index].fetch_add(1, Ordering::Relaxed);
        index
    }

    fn next_least_used(&self) -> usize {
        let _guard = self.scan_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        // Ties break on the first key in pool order.
        let mut index = 0;
        let mut min_count = u64::MAX;

        for (i, counter) in self.usage.iter().enumerate() {
            let count = counter.load(Ordering::Relaxed);

            if count < min_count {
                min_count = count;
                index = i;
            }
        }

        self.usage[index].fetch_add(1, Ordering::Relaxed);
        index
    }

    fn usage_counts(&self) -> BTreeMap<String, u64> {
        self.keys
            .iter()
            .zip(&self.usage)
            .map(|(key, count)| (mask_key(key.expose_secret()), count.load(Ordering::Relaxed)))
            .collect()
    }

    #[cfg(test)]
    fn counts(&self) -> Vec<u64> {
        self.usage.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }
}

/// Mask a secret as `first4 + "****" + last4`, or `"****"` entirely when
/// the key is too short to keep anything.
pub(crate) fn mask_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }

    format!("{}****{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pool(count: usize, strategy: RotationStrategy) -> KeyPool {
        let keys = (0..count)
            .map(|i| SecretString::from(format!("sk-test-key-{i:04}")))
            .collect();

        KeyPool::new(keys, strategy)
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = KeyPool::new(Vec::new(), RotationStrategy::RoundRobin);
        assert!(pool.select().is_none());
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let pool = pool(3, RotationStrategy::RoundRobin);

        let picks: Vec<String> = (0..6)
            .map(|_| pool.select().unwrap().expose_secret().to_string())
            .collect();

        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        assert_eq!(picks[2], picks[5]);
        assert_eq!(picks[0], "sk-test-key-0000");
        assert_eq!(picks[1], "sk-test-key-0001");
        assert_eq!(picks[2], "sk-test-key-0002");
    }

    #[test]
    fn round_robin_is_exact_under_concurrency() {
        let pool = Arc::new(pool(3, RotationStrategy::RoundRobin));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..30 {
                        pool.select().unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // 300 selections over 3 keys: exactly 100 each.
        assert_eq!(pool.counts(), vec![100, 100, 100]);
    }

    #[test]
    fn least_used_spread_never_exceeds_one() {
        let pool = Arc::new(pool(4, RotationStrategy::LeastUsed));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        pool.select().unwrap();
                        let counts = pool.counts();
                        let max = counts.iter().max().unwrap();
                        let min = counts.iter().min().unwrap();
                        assert!(max - min <= 1, "spread exceeded one: {counts:?}");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // 200 selections over 4 keys: exactly 50 each.
        assert_eq!(pool.counts(), vec![50, 50, 50, 50]);
    }

    #[test]
    fn least_used_breaks_ties_on_first_key() {
        let pool = pool(3, RotationStrategy::LeastUsed);

        let first = pool.select().unwrap();
        assert_eq!(first.expose_secret(), "sk-test-key-0000");

        let second = pool.select().unwrap();
        assert_eq!(second.expose_secret(), "sk-test-key-0001");
    }

    #[test]
    fn random_selection_counts_every_pick() {
        let pool = pool(3, RotationStrategy::Random);

        for _ in 0..50 {
            pool.select().unwrap();
        }

        assert_eq!(pool.counts().iter().sum::<u64>(), 50);
    }

    #[test]
    fn stats_mask_the_keys() {
        let mut ring = KeyRing::new();
        ring.insert(
            "openai",
            KeyPool::new(
                vec![
                    SecretString::from("sk-proj-abcdef123456"),
                    SecretString::from("short"),
                ],
                RotationStrategy::RoundRobin,
            ),
        );

        ring.select("openai").unwrap();

        let stats = ring.stats();
        let provider = stats.get("openai").unwrap();

        assert_eq!(provider.strategy, "round_robin");
        assert!(provider.api_key_usage.contains_key("sk-p****3456"));
        assert!(provider.api_key_usage.contains_key("****"));
        assert_eq!(provider.api_key_usage["sk-p****3456"], 1);
    }

    #[test]
    fn unknown_provider_yields_nothing() {
        let ring = KeyRing::new();
        assert!(ring.select("nope").is_none());
    }
}

//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check capacity, eviction order and statistics
//! invariants of the cache store.

use std::collections::HashSet;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{json, Value};

use crate::cache::CacheStore;

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 100;
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);
const TEST_THRESHOLD: usize = 1000;

// == Strategies ==
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

fn valid_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[a-zA-Z0-9 ]{1,256}".prop_map(Value::String),
        any::<i64>().prop_map(|n| json!({ "score": n })),
        // Long, repetitive text crosses the compression threshold
        ("[a-z]{1,8}", 200usize..400).prop_map(|(word, n)| json!({ "text": word.repeat(n) })),
    ]
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (valid_key_strategy(), valid_value_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

fn unique(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Hits and misses reported by the store match what callers observed.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL, TEST_THRESHOLD);
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(&key, &value, None).unwrap();
                }
                CacheOp::Get { key } => match store.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Delete { key } => {
                    store.delete(&key);
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, store.len(), "Total entries mismatch");
    }

    // Stored values come back unchanged whether or not they were compressed.
    #[test]
    fn prop_value_survives_storage(key in valid_key_strategy(), value in valid_value_strategy()) {
        let mut store = CacheStore::new(TEST_MAX_SIZE, TEST_DEFAULT_TTL, TEST_THRESHOLD);
        store.set(&key, &value, None).unwrap();
        prop_assert_eq!(store.get(&key), Some(value));
    }

    // The number of entries never exceeds the configured maximum.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((valid_key_strategy(), valid_value_strategy()), 1..200)
    ) {
        let max_size = 50;
        let mut store = CacheStore::new(max_size, TEST_DEFAULT_TTL, TEST_THRESHOLD);

        for (key, value) in entries {
            store.set(&key, &value, None).unwrap();
            prop_assert!(store.len() <= max_size, "Cache size {} exceeds max {}", store.len(), max_size);
        }
    }

    // Under interleaved gets and sets, an insert into a full store evicts
    // exactly the entry whose last access is oldest.
    #[test]
    fn prop_eviction_picks_least_recently_accessed(
        keys in prop::collection::vec(valid_key_strategy(), 3..10),
        touches in prop::collection::vec(0usize..10, 0..20),
        new_key in valid_key_strategy(),
    ) {
        let keys = unique(keys);
        prop_assume!(keys.len() >= 3);
        prop_assume!(!keys.contains(&new_key));

        let mut store = CacheStore::new(keys.len(), TEST_DEFAULT_TTL, TEST_THRESHOLD);
        // Model of recency: front = least recently used
        let mut recency: Vec<String> = Vec::new();

        for key in &keys {
            store.set(key, &json!(key), None).unwrap();
            recency.push(key.clone());
        }
        for index in touches {
            let key = &keys[index % keys.len()];
            prop_assert!(store.get(key).is_some());
            recency.retain(|k| k != key);
            recency.push(key.clone());
        }

        let expected_victim = recency[0].clone();
        store.set(&new_key, &json!("new"), None).unwrap();

        prop_assert_eq!(store.len(), keys.len());
        prop_assert!(store.entry(&expected_victim).is_none(), "Expected '{}' to be evicted", expected_victim);
        for key in recency.iter().skip(1) {
            prop_assert!(store.entry(key).is_some(), "Key '{}' should survive", key);
        }
        prop_assert!(store.entry(&new_key).is_some());
    }

    // Overwriting an existing key in a full store evicts nothing.
    #[test]
    fn prop_overwrite_never_evicts(
        keys in prop::collection::vec(valid_key_strategy(), 2..8),
        pick in 0usize..8,
    ) {
        let keys = unique(keys);
        prop_assume!(keys.len() >= 2);

        let mut store = CacheStore::new(keys.len(), TEST_DEFAULT_TTL, TEST_THRESHOLD);
        for key in &keys {
            store.set(key, &json!(1), None).unwrap();
        }
        store.set(&keys[pick % keys.len()], &json!(2), None).unwrap();

        prop_assert_eq!(store.len(), keys.len());
        prop_assert_eq!(store.stats().evictions, 0);
    }
}

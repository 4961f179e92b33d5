//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check accounting, retention and invalidation properties
//! of the cache engine over arbitrary operation sequences.

use proptest::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{Cache, CacheConfig, CacheKey, GetOptions, SetOptions};
use crate::storage::MemoryStore;

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 100;

fn test_cache(max_size: usize) -> Cache {
    Cache::new(
        Arc::new(MemoryStore::new()),
        CacheConfig::new().with_max_size(max_size),
    )
}

// == Strategies ==
/// Generates namespace names
fn namespace_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["products", "orders", "alerts", "sales"]).prop_map(String::from)
}

/// Generates filter ids
fn id_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,12}".prop_map(|s| s)
}

/// Generates cached values
fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,64}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        prop::collection::vec(any::<i32>(), 0..8).prop_map(|v| serde_json::json!(v)),
        ("[a-z]{1,8}", any::<u16>())
            .prop_map(|(k, n)| Value::Object(std::iter::once((k, Value::from(n))).collect())),
    ]
}

fn key_strategy() -> impl Strategy<Value = CacheKey> {
    (namespace_strategy(), id_strategy())
        .prop_map(|(namespace, id)| CacheKey::select(namespace).with_filter("id", id))
}

/// A single cache operation
#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: CacheKey, value: Value },
    Get { key: CacheKey },
    Has { key: CacheKey },
    Delete { key: CacheKey },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Has { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // hits + misses equals the number of get/has calls issued
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let cache = test_cache(TEST_MAX_SIZE);
        let mut lookups: u64 = 0;
        let mut expected_hits: u64 = 0;

        tokio_test::block_on(async {
            for op in ops {
                match op {
                    CacheOp::Set { key, value } => {
                        cache.set(&key, &value, SetOptions::default()).await.unwrap();
                    }
                    CacheOp::Get { key } => {
                        lookups += 1;
                        let found = cache
                            .get::<Value>(&key, GetOptions::default())
                            .await
                            .unwrap()
                            .is_some();
                        if found {
                            expected_hits += 1;
                        }
                    }
                    CacheOp::Has { key } => {
                        lookups += 1;
                        if cache.has(&key).await.unwrap() {
                            expected_hits += 1;
                        }
                    }
                    CacheOp::Delete { key } => {
                        cache.delete(&key).await.unwrap();
                    }
                }
            }
        });

        let stats = cache.stats();
        prop_assert_eq!(stats.hits + stats.misses, lookups, "Lookup count mismatch");
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
    }

    // set then get returns a deeply equal value
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let cache = test_cache(TEST_MAX_SIZE);

        let retrieved = tokio_test::block_on(async {
            cache.set(&key, &value, SetOptions::default()).await.unwrap();
            cache.get::<Value>(&key, GetOptions::default()).await.unwrap()
        });

        let retrieved = retrieved.expect("value should be cached");
        prop_assert!(retrieved.from_cache);
        prop_assert_eq!(retrieved.data, value, "Round-trip value mismatch");
    }

    // invalidate removes exactly the keys containing the pattern
    #[test]
    fn prop_invalidate_by_substring(
        keys in prop::collection::vec(key_strategy(), 1..30),
        pattern in prop_oneof![
            namespace_strategy(),
            "[a-zA-Z0-9_]{1,3}".prop_map(|s| s),
        ]
    ) {
        let cache = test_cache(TEST_MAX_SIZE);

        let (before, after, removed) = tokio_test::block_on(async {
            for key in &keys {
                cache.set(key, &1, SetOptions::default()).await.unwrap();
            }
            let before: HashSet<String> = cache.get_keys().await.into_iter().collect();
            let removed = cache.invalidate(&pattern).await;
            let after: HashSet<String> = cache.get_keys().await.into_iter().collect();
            (before, after, removed)
        });

        let expected: HashSet<String> = before
            .iter()
            .filter(|k| !k.contains(pattern.as_str()))
            .cloned()
            .collect();
        prop_assert_eq!(removed, before.len() - expected.len());
        prop_assert_eq!(after, expected);
    }

    // After a burst over max_size and one optimize, the newest max_size remain
    #[test]
    fn prop_fifo_retention_after_settling(count in 1usize..60, max_size in 1usize..20) {
        let cache = test_cache(max_size);
        let keys: Vec<CacheKey> = (0..count)
            .map(|i| CacheKey::select("products").with_filter("seq", i as u64))
            .collect();

        let remaining: HashSet<String> = tokio_test::block_on(async {
            for key in &keys {
                cache.set(key, &1, SetOptions::default()).await.unwrap();
            }
            cache.optimize().await;
            cache.get_keys().await.into_iter().collect()
        });

        let expected: HashSet<String> = keys
            .iter()
            .skip(count.saturating_sub(max_size))
            .map(|k| k.generate_key().unwrap())
            .collect();
        prop_assert_eq!(remaining.len(), count.min(max_size));
        prop_assert_eq!(remaining, expected);
    }

    // Overwriting a key leaves one entry holding the newest value
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let cache = test_cache(TEST_MAX_SIZE);

        let (retrieved, len) = tokio_test::block_on(async {
            cache.set(&key, &value1, SetOptions::default()).await.unwrap();
            cache.set(&key, &value2, SetOptions::default()).await.unwrap();
            let got = cache.get::<Value>(&key, GetOptions::default()).await.unwrap();
            (got, cache.get_keys().await.len())
        });

        prop_assert_eq!(retrieved.map(|r| r.data), Some(value2));
        prop_assert_eq!(len, 1, "Should have exactly one entry after overwrite");
    }
}

//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the record store and facade against randomly
//! generated operation sequences.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::{
    select_to_save, CachedValue, EvictionPolicy, InvalidateOutcome, NearCacheStats, PutOutcome,
    RecordStore,
};
use crate::config::NearCacheConfig;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;

fn new_store(config: NearCacheConfig) -> RecordStore<String, String> {
    RecordStore::new(&config, Arc::new(NearCacheStats::new())).unwrap()
}

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,16}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,64}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, value: String },
    Get { key: String },
    Remove { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Put { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Remove { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Hit and miss counters match the lookups that happened, and the owned
    // entry count matches the store size.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..50)) {
        let stats = Arc::new(NearCacheStats::new());
        let config = NearCacheConfig::default().with_max_entries(TEST_MAX_ENTRIES);
        let store: RecordStore<String, String> = RecordStore::new(&config, stats.clone()).unwrap();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    store.put(key, CachedValue::Value(value), 0).unwrap();
                }
                CacheOp::Get { key } => match store.get(&key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                },
                CacheOp::Remove { key } => {
                    store.remove(&key);
                }
            }
        }

        let snapshot = stats.snapshot();
        prop_assert_eq!(snapshot.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(snapshot.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(snapshot.owned_entry_count as usize, store.size(), "Owned entries mismatch");
        prop_assert_eq!(snapshot.owned_entry_memory_cost as usize, store.memory_cost());
    }

    // The store behaves like a map for any put/get/remove sequence that
    // stays within its bounds.
    #[test]
    fn prop_matches_model_map(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let store = new_store(NearCacheConfig::default().with_max_entries(TEST_MAX_ENTRIES));
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                CacheOp::Put { key, value } => {
                    let outcome = store.put(key.clone(), CachedValue::Value(value.clone()), 0).unwrap();
                    let expected = if model.insert(key, value).is_some() {
                        PutOutcome::Replaced
                    } else {
                        PutOutcome::Inserted
                    };
                    prop_assert_eq!(outcome, expected);
                }
                CacheOp::Get { key } => {
                    let expected = model.get(&key).cloned().map(CachedValue::Value);
                    prop_assert_eq!(store.get(&key), expected);
                }
                CacheOp::Remove { key } => {
                    prop_assert_eq!(store.remove(&key), model.remove(&key).is_some());
                }
            }
        }
        prop_assert_eq!(store.size(), model.len());
    }

    // The binary in-memory format returns the same values as the object format.
    #[test]
    fn prop_binary_format_roundtrip(key in key_strategy(), value in value_strategy()) {
        let config = NearCacheConfig::default()
            .with_in_memory_format(crate::config::InMemoryFormat::Binary);
        let store = new_store(config);

        store.put(key.clone(), CachedValue::Value(value.clone()), 0).unwrap();

        prop_assert_eq!(store.get(&key), Some(CachedValue::Value(value)));
    }

    // The entry count never exceeds the configured maximum, whatever the
    // evicting policy.
    #[test]
    fn prop_capacity_enforcement(
        max_entries in 1usize..20,
        policy in prop_oneof![
            Just(EvictionPolicy::Lru),
            Just(EvictionPolicy::Lfu),
            Just(EvictionPolicy::Random),
        ],
        keys in prop::collection::vec(key_strategy(), 1..100)
    ) {
        let store = new_store(
            NearCacheConfig::default()
                .with_max_entries(max_entries)
                .with_eviction_policy(policy),
        );

        for key in keys {
            store.put(key, CachedValue::Value("v".to_string()), 0).unwrap();
            prop_assert!(
                store.size() <= max_entries,
                "Store size {} exceeds max {}", store.size(), max_entries
            );
        }
    }

    // Under LRU the least recently used key is the one evicted.
    #[test]
    fn prop_lru_eviction_order(
        keys in prop::collection::hash_set(key_strategy(), 3..15),
        extra in "[A-Z]{17,20}"
    ) {
        let keys: Vec<String> = keys.into_iter().collect();
        let store = new_store(
            NearCacheConfig::default()
                .with_max_entries(keys.len())
                .with_eviction_policy(EvictionPolicy::Lru),
        );

        for key in &keys {
            store.put(key.clone(), CachedValue::Value("v".to_string()), 0).unwrap();
        }
        // Touch every key but the first so that it is the oldest.
        for key in keys.iter().skip(1) {
            store.get(key);
        }

        store.put(extra.clone(), CachedValue::Value("v".to_string()), 0).unwrap();

        prop_assert!(!store.contains_key(&keys[0]), "LRU key should be evicted");
        prop_assert!(store.contains_key(&extra), "New key should be present");
        prop_assert_eq!(store.size(), keys.len());
    }

    // A put tagged with a sequence older than an observed invalidation is
    // rejected.
    #[test]
    fn prop_stale_put_rejected(
        key in key_strategy(),
        invalidation_seq in 2u64..1_000,
        offset in 1u64..1_000
    ) {
        let store = new_store(NearCacheConfig::default());
        let stale_seq = invalidation_seq.saturating_sub(offset).min(invalidation_seq - 1);

        prop_assert_eq!(store.invalidate(&key, invalidation_seq), InvalidateOutcome::Absent);
        prop_assert_eq!(
            store.put(key.clone(), CachedValue::Value("old".to_string()), stale_seq).unwrap(),
            PutOutcome::StaleRejected
        );
        prop_assert_eq!(store.get(&key), None);

        prop_assert_eq!(
            store.put(key.clone(), CachedValue::Value("new".to_string()), invalidation_seq).unwrap(),
            PutOutcome::Inserted
        );
        prop_assert_eq!(store.get(&key), Some(CachedValue::Value("new".to_string())));
    }

    // The selected value is always the last non-null candidate.
    #[test]
    fn prop_select_to_save_last_non_null(
        candidates in prop::collection::vec(prop::option::of(value_strategy()), 0..10),
        cache_nulls in any::<bool>()
    ) {
        let selected = select_to_save(&candidates, cache_nulls);
        let last = candidates.iter().rev().find_map(|c| c.clone());

        match last {
            Some(value) => {
                prop_assert_eq!(selected, Some(CachedValue::Value(value)));
            }
            None if cache_nulls && !candidates.is_empty() => {
                prop_assert_eq!(selected, Some(CachedValue::Null));
            }
            None => {
                prop_assert_eq!(selected, None);
            }
        }
    }

    // Every key handed out by a snapshot is live in the store.
    #[test]
    fn prop_key_snapshot_matches(keys in prop::collection::hash_set(key_strategy(), 0..50)) {
        let store = new_store(NearCacheConfig::default().with_max_entries(TEST_MAX_ENTRIES));
        for key in &keys {
            store.put(key.clone(), CachedValue::Value("v".to_string()), 0).unwrap();
        }

        let snapshot: HashSet<String> = store.keys().collect();
        prop_assert_eq!(snapshot, keys);
    }
}

// Threads working on disjoint key ranges never observe each other's values.
#[test]
fn prop_concurrent_disjoint_keys() {
    let store = Arc::new(new_store(
        NearCacheConfig::default().with_max_entries(10_000),
    ));

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("t{}_k{}", t, i);
                    let value = format!("t{}_v{}", t, i);
                    store.put(key.clone(), CachedValue::Value(value.clone()), 0).unwrap();
                    assert_eq!(store.get(&key), Some(CachedValue::Value(value)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.size(), 8 * 200);
}

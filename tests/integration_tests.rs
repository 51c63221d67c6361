use distreduce::{reducer, DistMap, DistMapBuilder, Error};

#[test]
fn test_initialization() {
    let map: DistMap<String, i32> = DistMap::new();
    assert_eq!(map.n_keys(), 0);
    assert!(map.is_empty());
    assert_eq!(map.rank(), 0);
    assert_eq!(map.n_ranks(), 1);
}

#[test]
fn test_set_and_get() {
    let map: DistMap<String, i32> = DistMap::new();
    map.async_set("aa".to_string(), 0);
    assert_eq!(map.get("aa"), 0);
    map.async_set("aa".to_string(), 1);
    assert_eq!(map.get_or("aa", 0), 1);
    map.async_set_with("aa".to_string(), 2, reducer::sum);
    assert_eq!(map.get("aa"), 3);

    let map2: DistMap<String, i32> = DistMap::new();
    map2.async_set_with("cc".to_string(), 3, reducer::sum);
    assert_eq!(map2.get("cc"), 3);
}

#[test]
fn test_keep_reducer() {
    let map: DistMap<u64, u64> = DistMap::new();
    map.async_set(1, 10);
    map.async_set_with(1, 20, reducer::keep);
    assert_eq!(map.get(&1), 10);
}

#[test]
fn test_missing_key_reads_default() {
    let map: DistMap<u64, i64> = DistMapBuilder::new().build_with_default(-7).unwrap();
    assert_eq!(map.get(&42), -7);
    assert_eq!(map.get_or(&42, 3), 3);
    assert_eq!(map.find(&42), None);
    assert!(!map.unset(&42));
}

#[test]
fn test_copy_is_faithful() {
    let map: DistMap<String, i32> = DistMap::new();
    map.async_set("aa".to_string(), 0);
    assert_eq!(map.get("aa"), 0);
    map.async_set("bb".to_string(), 1);
    assert_eq!(map.get("bb"), 1);

    let map2 = map.clone();
    assert_eq!(map2.get("aa"), 0);
    assert_eq!(map2.get("bb"), 1);
    assert_eq!(map2.n_keys(), 2);
}

#[test]
fn test_copy_isolation() {
    let map: DistMap<u64, u64> = DistMap::new();
    for i in 0..100 {
        map.async_set(i, i);
    }
    let copy = map.clone();

    map.async_set(0, 1000);
    map.unset(&1);
    assert_eq!(copy.get(&0), 0);
    assert!(copy.has(&1));

    copy.async_set(2, 2000);
    copy.async_set(500, 5);
    assert_eq!(map.get(&2), 2);
    assert!(!map.has(&500));

    copy.clear();
    assert_eq!(map.n_keys(), 99);
}

#[test]
fn test_reserve() {
    let map: DistMap<String, i32> = DistMap::new();
    map.reserve(100);
    assert!(map.n_buckets() >= 100);
    let n_buckets = map.n_buckets();
    map.reserve(50);
    assert_eq!(map.n_buckets(), n_buckets);
}

#[test]
fn test_reserve_preserves_contents() {
    let map: DistMap<String, i32> = DistMap::new();
    const N_KEYS: i32 = 200;
    for i in 0..N_KEYS {
        map.async_set(format!("key_{}", i), i);
    }
    map.reserve(100_000);
    assert!(map.n_buckets() >= 100_000);
    assert_eq!(map.n_keys(), N_KEYS as usize);
    for i in 0..N_KEYS {
        assert_eq!(map.get(&format!("key_{}", i)), i);
    }
}

#[test]
fn test_large_reserve() {
    let map: DistMap<String, i32> = DistMap::new();
    const LARGE_N_BUCKETS: usize = 1_000_000;
    map.reserve(LARGE_N_BUCKETS);
    assert!(map.n_buckets() >= LARGE_N_BUCKETS);
}

#[test]
fn test_get_and_set_load_factor() {
    let map: DistMap<i32, i32> = DistMap::new();
    const N_KEYS: i32 = 100;
    map.set_max_load_factor(0.5).unwrap();
    assert_eq!(map.max_load_factor(), 0.5);
    for i in 0..N_KEYS {
        map.async_set(i, i);
    }
    assert!(map.n_buckets() as f64 >= N_KEYS as f64 / 0.5);
    assert_eq!(map.set_max_load_factor(-1.0), Err(Error::InvalidLoadFactor));
}

#[test]
fn test_load_factor_invariant() {
    for load_factor in [0.1, 0.3, 0.5, 0.7, 0.9, 1.0] {
        let map: DistMap<u32, u32> = DistMapBuilder::new()
            .max_load_factor(load_factor)
            .unwrap()
            .build()
            .unwrap();
        for i in 0..2000u32 {
            map.async_set(i, i);
            if i % 3 == 0 {
                map.unset(&(i / 2));
            }
            assert!(map.n_keys() as f64 <= map.n_buckets() as f64 * load_factor);
        }
    }
}

#[test]
fn test_n_distinct_keys() {
    for n in [0usize, 1, 7, 8, 100, 5000] {
        let map: DistMap<usize, usize> = DistMap::new();
        for i in 0..n {
            map.async_set(i, i);
        }
        assert_eq!(map.n_keys(), n);
        assert!(map.n_buckets() >= n);
    }
}

#[test]
fn test_clear() {
    let map: DistMap<String, i32> = DistMap::new();
    map.async_set("aa".to_string(), 1);
    map.async_set("bbb".to_string(), 2);
    assert_eq!(map.n_keys(), 2);
    let n_buckets = map.n_buckets();
    map.clear();
    assert_eq!(map.n_keys(), 0);
    assert_eq!(map.n_buckets(), n_buckets);
    assert!(!map.has("aa"));
}

#[test]
fn test_clear_and_shrink() {
    let map: DistMap<i32, i32> = DistMap::new();
    const N_KEYS: i32 = 100;
    for i in 0..N_KEYS {
        map.async_set(i, i);
    }
    assert_eq!(map.n_keys(), N_KEYS as usize);
    assert!(map.n_buckets() as f64 >= N_KEYS as f64 * map.max_load_factor());
    map.clear_and_shrink();
    assert_eq!(map.n_keys(), 0);
    assert!((map.n_buckets() as f64) < N_KEYS as f64 * map.max_load_factor());
}

#[test]
fn test_iteration() {
    let map: DistMap<u32, u32> = DistMap::new();
    for i in 0..10 {
        map.async_set(i, i * i);
    }

    let mut entries: Vec<(u32, u32)> = map.iter_snapshot().collect();
    entries.sort();
    assert_eq!(entries, (0..10).map(|i| (i, i * i)).collect::<Vec<_>>());

    let mut sum = 0;
    map.for_each(|_, v| sum += v);
    assert_eq!(sum, (0..10).map(|i| i * i).sum::<u32>());
}

#[test]
fn test_snapshot_does_not_see_later_writes() {
    let map: DistMap<u32, u32> = DistMap::new();
    map.async_set(1, 1);
    let snapshot = map.iter_snapshot();
    map.async_set(2, 2);
    assert_eq!(snapshot.len(), 1);
}

#[test]
fn test_initial_buckets() {
    let map: DistMap<u32, u32> = DistMapBuilder::new().initial_buckets(300).build().unwrap();
    assert!(map.n_buckets() >= 300);
}

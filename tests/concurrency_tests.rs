use distreduce::{reducer, DistMap};
use std::sync::Arc;
use std::thread;

#[test]
fn test_parallel_set_and_rehash() {
    let map: Arc<DistMap<i32, i32>> = Arc::new(DistMap::new());
    let mut handles = vec![];

    // 10 threads, each inserting a disjoint slice of keys
    for thread_id in 0..10 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..100 {
                let key = thread_id * 100 + i;
                map.async_set(key, key);
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.n_keys(), 1000);
    assert!(map.n_buckets() >= 1000);
    for key in 0..1000 {
        assert_eq!(map.get(&key), key);
    }
}

#[test]
fn test_concurrent_sum_loses_no_updates() {
    let map: Arc<DistMap<String, u64>> = Arc::new(DistMap::new());
    let mut handles = vec![];

    // 8 threads each add 1 to 50 shared counters 200 times
    for _ in 0..8 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for round in 0..200 {
                for k in 0..50 {
                    map.async_set_with(format!("counter_{}", (k + round) % 50), 1, reducer::sum);
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.n_keys(), 50);
    for k in 0..50 {
        assert_eq!(map.get(&format!("counter_{}", k)), 8 * 200);
    }
}

#[test]
fn test_concurrent_reads_during_writes() {
    let map: Arc<DistMap<u64, u64>> = Arc::new(DistMap::new());
    for i in 0..100 {
        map.async_set(i, i);
    }

    let mut handles = vec![];

    // Writers grow the table while readers check the stable keys
    for thread_id in 0..4u64 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..5000 {
                map.async_set(1000 + thread_id * 5000 + i, i);
            }
        }));
    }
    for _ in 0..4 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                for i in 0..100 {
                    assert_eq!(map.get(&i), i);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.n_keys(), 100 + 4 * 5000);
}

#[test]
fn test_concurrent_mixed_operations() {
    let map: Arc<DistMap<String, usize>> = Arc::new(DistMap::new());
    let mut handles = vec![];

    for thread_id in 0..6 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                let key = format!("key_{}_{}", thread_id, i);
                map.async_set(key.clone(), i);
                if i % 2 == 0 {
                    assert!(map.unset(&key));
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(map.n_keys(), 6 * 250);
    for thread_id in 0..6 {
        for i in 0..500 {
            let key = format!("key_{}_{}", thread_id, i);
            assert_eq!(map.has(&key), i % 2 == 1);
        }
    }
}

//! One simple load test: concurrent inserts and removes, then verify state and introspection.

use distreduce::DistMap;
use std::sync::Arc;
use std::thread;

#[test]
fn test_under_load_then_introspect() {
    let map: Arc<DistMap<String, usize>> = Arc::new(DistMap::new());
    let mut handles = vec![];

    for t in 0..4 {
        let map = Arc::clone(&map);
        let handle = thread::spawn(move || {
            for i in 0..2000 {
                let key = format!("t{}_k{}", t, i);
                map.async_set(key, i);
            }
            for i in 0..2000 {
                let key = format!("t{}_k{}", t, i);
                assert!(map.unset(&key));
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(map.is_empty());
    assert_eq!(map.n_keys(), 0);
    let stats = map.stats();
    assert_eq!(stats.local_keys, 0);
    assert_eq!(stats.pending_writes.iter().sum::<usize>(), 0);

    // The emptied table is still usable.
    map.async_set("again".to_string(), 1);
    assert_eq!(map.get("again"), 1);
}

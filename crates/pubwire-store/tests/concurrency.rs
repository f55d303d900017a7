//! Multi-threaded tests for `IdentifierStore`.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use pubwire_store::IdentifierStore;

#[test]
fn test_concurrent_puts_receive_distinct_ids() {
    let store = Arc::new(IdentifierStore::new());
    let threads = 8;
    let per_thread = 500;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|n| store.put((t, n)))
                    .collect::<Vec<u64>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for handle in handles {
        let ids = handle.join().expect("writer thread");
        // Within one thread, later puts get larger ids.
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(all.insert(id), "id {id} handed out twice");
        }
    }

    assert_eq!(all.len(), threads * per_thread);
    assert_eq!(store.len(), threads * per_thread);
    assert_eq!(all.iter().copied().min(), Some(1));
    assert_eq!(all.iter().copied().max(), Some((threads * per_thread) as u64));
}

#[test]
fn test_readers_and_writers_run_together() {
    let store = Arc::new(IdentifierStore::new());
    for n in 0..100u64 {
        store.put(n);
    }

    thread::scope(|scope| {
        for _ in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for _ in 0..200 {
                    let mut count = 0;
                    store.for_each(|_, _| count += 1);
                    assert!(count >= 100);
                    let _ = store.get(1);
                }
            });
        }
        for _ in 0..2 {
            let store = &store;
            scope.spawn(move || {
                for n in 0..200u64 {
                    let id = store.put(n);
                    assert!(store.update(id, n + 1));
                }
            });
        }
    });

    assert_eq!(store.len(), 100 + 2 * 200);
}

#[test]
fn test_delete_from_many_threads_removes_each_id_once() {
    let store = Arc::new(IdentifierStore::new());
    let ids: Vec<u64> = (0..1000).map(|n| store.put(n)).collect();

    let removed: usize = thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let store = &store;
                let ids = &ids;
                scope.spawn(move || ids.iter().filter(|id| store.delete(**id)).count())
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).sum()
    });

    assert_eq!(removed, 1000, "each id is removed by exactly one thread");
    assert!(store.is_empty());
    assert_eq!(store.put(0), 1001);
}

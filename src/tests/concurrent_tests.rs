/// 并发测试模块
/// 测试单写入者与多读者并发：删除/插入抖动、扩容期间的可见性、写入者跨线程移动
use crate::{ConcHashTable, TableReader, TableReaders};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

const READERS: usize = 4;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Values carry their key in the high bits so a torn read is detectable.
fn encode(key: usize, round: usize) -> usize {
    (key << 32) | (round & 0xFFFF_FFFF) | 1
}

fn spawn_readers<F>(
    readers: &TableReaders<usize, usize>,
    stop: &Arc<AtomicBool>,
    body: F,
) -> Vec<thread::JoinHandle<usize>>
where
    F: Fn(&TableReader<usize, usize>) -> usize + Send + Sync + Clone + 'static,
{
    (0..READERS)
        .map(|_| {
            let readers = readers.clone();
            let stop = stop.clone();
            let body = body.clone();
            thread::spawn(move || {
                let view = readers.register();
                let mut lookups = 0;
                while !stop.load(Ordering::Acquire) {
                    lookups += body(&view);
                }
                lookups
            })
        })
        .collect()
}

/// 测试1: 写入者反复插入删除固定键集，读者从不看到错配的值
#[test]
fn test_readers_never_observe_torn_entries() {
    init_logging();
    let (mut table, readers) = ConcHashTable::<usize, usize>::new();
    let stop = Arc::new(AtomicBool::new(false));

    let handles = spawn_readers(&readers, &stop, |view| {
        let mut hits = 0;
        for key in 1..=64usize {
            if let Some((found, value)) = view.lookup(key) {
                assert_eq!(found, key);
                assert_eq!(value >> 32, key, "value {value:#x} belongs to another key");
                hits += 1;
            }
        }
        hits
    });

    for round in 1..=2_000usize {
        for key in 1..=64usize {
            if (key + round) % 3 == 0 {
                table.remove(key);
            } else {
                table.insert(key, encode(key, round));
            }
        }
    }

    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(table.capacity() <= 256, "churn grew to {}", table.capacity());
}

/// 测试2: 扩容期间，已发布的键对读者始终可见
#[test]
fn test_inserted_keys_stay_visible_across_resizes() {
    init_logging();
    let (mut table, readers) = ConcHashTable::<usize, usize>::new();
    let stop = Arc::new(AtomicBool::new(false));
    let high_water = Arc::new(AtomicUsize::new(0));

    let handles = {
        let high_water = high_water.clone();
        spawn_readers(&readers, &stop, move |view| {
            let published = high_water.load(Ordering::Acquire);
            let mut checked = 0;
            for key in (1..=published).rev().step_by(97) {
                assert_eq!(view.lookup_value(key), Some(key * 2), "key {key} vanished");
                checked += 1;
            }
            checked
        })
    };

    for key in 1..=20_000usize {
        table.insert(key, key * 2);
        high_water.store(key, Ordering::Release);
    }

    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(table.len(), 20_000);
    assert!(table.capacity().is_power_of_two());
}

/// 测试3: 写入者可以移动到专用线程
#[test]
fn test_writer_on_its_own_thread() {
    init_logging();
    let (mut table, readers) = ConcHashTable::<usize, usize>::new();
    let view = readers.register();

    let writer = thread::spawn(move || {
        for key in 1..=1_000usize {
            table.insert(key, key + 7);
        }
        for key in (1..=1_000usize).filter(|key| key % 2 == 0) {
            table.remove(key);
        }
        table
    });

    // Odd keys are never removed.
    while view.lookup(999).is_none() {
        thread::yield_now();
    }

    let table = writer.join().unwrap();
    for key in 1..=1_000usize {
        let expected = (key % 2 == 1).then_some(key + 7);
        assert_eq!(view.lookup_value(key), expected);
    }
    assert_eq!(table.len(), 500);
}

/// 测试4: 读者在写入者销毁表时安全退出
#[test]
fn test_destroy_while_readers_run() {
    init_logging();
    let (mut table, readers) = ConcHashTable::<usize, usize>::new();
    for key in 1..=100usize {
        table.insert(key, key);
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handles = spawn_readers(&readers, &stop, |view| {
        (1..=100usize)
            .filter(|key| view.lookup_value(*key) == Some(*key))
            .count()
    });

    for key in 101..=5_000usize {
        table.insert(key, key);
    }
    table.destroy();

    stop.store(true, Ordering::Release);
    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(total > 0);
    assert_eq!(readers.register().lookup(1), None);
}

/// 生命周期测试模块
/// 测试销毁回调、根注册/注销、写屏障、墓碑对象与旧代回收
use super::{RecordingCollector, tombstone_object_addr};
use crate::{ConcHashTable, RootCells, TableError, TrackingMode, UNTRACKED_TOMBSTONE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// 测试1: 销毁回调对每个条目恰好调用一次
#[test]
fn test_destroy_callbacks_run_once_per_entry() {
    let destroyed_keys = Arc::new(Mutex::new(Vec::new()));
    let destroyed_values = Arc::new(AtomicUsize::new(0));

    let (mut table, readers) = {
        let keys = destroyed_keys.clone();
        let values = destroyed_values.clone();
        ConcHashTable::<usize, usize>::builder()
            .key_destroy(move |key| keys.lock().unwrap().push(key))
            .value_destroy(move |_| {
                values.fetch_add(1, Ordering::SeqCst);
            })
            .build()
    };

    for key in 1..=50 {
        table.insert(key, key);
    }
    for key in 41..=50 {
        table.remove(key);
    }
    assert_eq!(destroyed_keys.lock().unwrap().len(), 10);
    assert_eq!(destroyed_values.load(Ordering::SeqCst), 10);

    // Duplicate insert of a live key does not destroy anything.
    table.insert(1, 2);
    assert_eq!(destroyed_values.load(Ordering::SeqCst), 10);

    table.destroy();
    drop(readers);

    let mut keys = destroyed_keys.lock().unwrap().clone();
    keys.sort_unstable();
    assert_eq!(keys, (1..=50).collect::<Vec<_>>());
    assert_eq!(destroyed_values.load(Ordering::SeqCst), 50);
}

/// 测试2: 没有回调时销毁也正常
#[test]
fn test_destroy_without_callbacks() {
    let (mut table, readers) = ConcHashTable::<usize, usize>::new();
    for key in 1..=100 {
        table.insert(key, key);
    }
    let early = readers.register();
    assert_eq!(early.lookup_value(100), Some(100));
    drop(table);

    // Read views outliving the writer find nothing, whenever they registered.
    let late = readers.register();
    for key in 1..=100 {
        assert_eq!(early.lookup(key), None);
        assert_eq!(late.lookup(key), None);
    }
}

/// 测试2b: 销毁回调运行后，读者不再看到对应条目
#[test]
fn test_destroyed_entries_unreachable_from_readers() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (mut table, readers) = {
        let destroyed = destroyed.clone();
        ConcHashTable::<usize, usize>::builder()
            .value_destroy(move |_| {
                destroyed.fetch_add(1, Ordering::SeqCst);
            })
            .build()
    };
    let reader = readers.register();

    table.insert(7, 70);
    assert_eq!(reader.lookup(7), Some((7, 70)));
    table.destroy();

    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(reader.lookup(7), None);
    assert_eq!(readers.register().lookup(7), None);
}

/// 测试3: 被追踪的数组在可达前注册为根，释放时注销
#[test]
fn test_roots_registered_and_deregistered() {
    let collector = RecordingCollector::default();
    let (mut table, readers) = ConcHashTable::<usize, usize>::builder()
        .tracking_mode(TrackingMode::BothAreReferences)
        .root_label("domain", "type cache")
        .collector(collector.clone())
        .auto_reclaim_threshold(None)
        .build();

    assert_eq!(collector.registered(), 2);
    {
        let roots = collector.record.roots.lock().unwrap();
        assert!(roots.values().any(|root| root.cells == RootCells::Keys));
        assert!(roots.values().any(|root| root.cells == RootCells::Values));
        for root in roots.values() {
            assert_eq!(root.byte_len, 32 * std::mem::size_of::<usize>());
            assert_eq!(root.label.source, "domain");
            assert_eq!(root.label.description, "type cache");
        }
    }

    for key in 1..=25 {
        table.insert(key, key);
    }
    // The grown generation is registered; the retired one stays registered
    // until it is reclaimed.
    assert_eq!(collector.registered(), 4);
    assert_eq!(collector.deregistered(), 0);
    assert_eq!(table.retired_generations(), 1);

    table.collect();
    assert_eq!(table.retired_generations(), 0);
    assert_eq!(collector.deregistered(), 2);
    assert_eq!(collector.live_roots(), 2);

    // Destruction releases the live generation even though read views remain.
    drop(table);
    assert_eq!(collector.live_roots(), 0);
    assert_eq!(collector.registered(), collector.deregistered());
    assert_eq!(readers.register().lookup(1), None);
    drop(readers);
    assert_eq!(collector.registered(), 4);
}

/// 测试4: 只追踪值时只注册值数组
#[test]
fn test_value_only_tracking_registers_values() {
    let collector = RecordingCollector::default();
    let (_table, _readers) = ConcHashTable::<usize, usize>::builder()
        .tracking_mode(TrackingMode::ValueIsReference)
        .collector(collector.clone())
        .build();

    assert_eq!(collector.registered(), 1);
    let roots = collector.record.roots.lock().unwrap();
    assert!(roots.values().all(|root| root.cells == RootCells::Values));
}

/// 测试5: 不追踪时不注册任何根，也不调用写屏障
#[test]
fn test_untracked_table_never_calls_collector() {
    let collector = RecordingCollector::default();
    let (mut table, readers) = ConcHashTable::<usize, usize>::builder()
        .collector(collector.clone())
        .build();

    for key in 1..=100 {
        table.insert(key, key);
    }
    table.remove(1);
    drop(table);
    drop(readers);

    assert_eq!(collector.registered(), 0);
    assert_eq!(collector.deregistered(), 0);
    assert_eq!(collector.barriers(), 0);
}

/// 测试6: 写屏障只对被追踪的单元调用
#[test]
fn test_write_barrier_per_tracked_store() {
    let keys = RecordingCollector::default();
    let (mut table, _r) = ConcHashTable::<usize, usize>::builder()
        .tracking_mode(TrackingMode::KeyIsReference)
        .collector(keys.clone())
        .build();
    table.insert(1, 10);
    assert_eq!(keys.barriers(), 1);
    // The tombstone object is a managed reference too.
    table.remove(1);
    assert_eq!(keys.barriers(), 2);

    let values = RecordingCollector::default();
    let (mut table, _r) = ConcHashTable::<usize, usize>::builder()
        .tracking_mode(TrackingMode::ValueIsReference)
        .collector(values.clone())
        .build();
    table.insert(1, 10);
    assert_eq!(values.barriers(), 1);
    // Nulling the value is not a reference store.
    table.remove(1);
    assert_eq!(values.barriers(), 1);

    let both = RecordingCollector::default();
    let (mut table, _r) = ConcHashTable::<usize, usize>::builder()
        .tracking_mode(TrackingMode::BothAreReferences)
        .collector(both.clone())
        .build();
    for key in 1..=25 {
        table.insert(key, key);
    }
    // 25 inserts, plus 24 rehashed entries on growth.
    assert_eq!(both.barriers(), 2 * 25 + 2 * 24);
}

/// 测试7: 追踪键时使用回收器提供的墓碑对象
#[test]
fn test_tracked_keys_use_collector_tombstone() {
    let (mut table, readers) = ConcHashTable::<usize, usize>::builder()
        .tracking_mode(TrackingMode::KeyIsReference)
        .collector(RecordingCollector::default())
        .build();
    let reader = readers.register();

    // The untracked marker is an ordinary key here.
    assert_eq!(table.try_insert(UNTRACKED_TOMBSTONE, 1), Ok(None));
    assert_eq!(reader.lookup_value(UNTRACKED_TOMBSTONE), Some(1));

    let marker = tombstone_object_addr();
    assert_eq!(
        table.try_insert(marker, 1),
        Err(TableError::ReservedKey { bits: marker })
    );

    table.remove(UNTRACKED_TOMBSTONE);
    assert_eq!(reader.lookup(UNTRACKED_TOMBSTONE), None);
    assert_eq!(reader.lookup(marker), None);
    assert_eq!(table.tombstone_count(), 1);
}

/// 测试8: 关闭自动回收时，旧代在显式回收前保留
#[test]
fn test_retired_generations_wait_for_collect() {
    let (mut table, readers) = ConcHashTable::<usize, usize>::builder()
        .initial_capacity(2)
        .auto_reclaim_threshold(None)
        .build();
    let reader = readers.register();

    for key in 1..=20 {
        table.insert(key, key);
    }
    // 2 -> 4 -> 8 -> 16 -> 32
    assert_eq!(table.capacity(), 32);
    assert_eq!(table.retired_generations(), 4);

    assert_eq!(reader.lookup_value(20), Some(20));
    table.collect();
    assert_eq!(table.retired_generations(), 0);
}

/// 测试9: 默认配置下旧代会被自动回收
#[test]
fn test_auto_reclaim_bounds_retired_generations() {
    let (mut table, _readers) = ConcHashTable::<usize, usize>::builder()
        .initial_capacity(2)
        .auto_reclaim_threshold(2)
        .build();

    for key in 1..=5000 {
        table.insert(key, key);
        assert!(table.retired_generations() <= 2);
    }
}

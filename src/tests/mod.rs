/// 单元测试
/// 覆盖表的基本操作、边界情况、生命周期、回收器与并发读取
use crate::collector::{Collector, RootDescriptor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

mod concurrent_tests;
mod lifecycle_tests;

/// 作为键被追踪时使用的墓碑对象
pub(crate) static TOMBSTONE_OBJECT: u64 = 0;

pub(crate) fn tombstone_object_addr() -> usize {
    &TOMBSTONE_OBJECT as *const u64 as usize
}

#[derive(Debug, Default)]
pub(crate) struct Record {
    pub(crate) roots: Mutex<HashMap<usize, RootDescriptor>>,
    pub(crate) registered: AtomicUsize,
    pub(crate) deregistered: AtomicUsize,
    pub(crate) barriers: AtomicUsize,
}

/// 记录所有根注册与写屏障调用的精确式回收器
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingCollector {
    pub(crate) record: Arc<Record>,
}

impl RecordingCollector {
    pub(crate) fn registered(&self) -> usize {
        self.record.registered.load(Ordering::SeqCst)
    }

    pub(crate) fn deregistered(&self) -> usize {
        self.record.deregistered.load(Ordering::SeqCst)
    }

    pub(crate) fn barriers(&self) -> usize {
        self.record.barriers.load(Ordering::SeqCst)
    }

    pub(crate) fn live_roots(&self) -> usize {
        self.record.roots.lock().unwrap().len()
    }
}

impl Collector for RecordingCollector {
    fn register_root(&self, root: RootDescriptor) {
        self.record.registered.fetch_add(1, Ordering::SeqCst);
        let previous = self.record.roots.lock().unwrap().insert(root.addr, root);
        assert!(previous.is_none(), "root registered twice");
    }

    fn deregister_root(&self, addr: usize) {
        self.record.deregistered.fetch_add(1, Ordering::SeqCst);
        let removed = self.record.roots.lock().unwrap().remove(&addr);
        assert!(removed.is_some(), "deregistered an unknown root");
    }

    fn write_barrier(&self, cell_addr: usize, value: usize) {
        assert_ne!(cell_addr, 0);
        assert_ne!(value, 0);
        self.record.barriers.fetch_add(1, Ordering::SeqCst);
    }

    fn key_tombstone(&self) -> usize {
        tombstone_object_addr()
    }
}

/// 析构时计数的对象
pub(crate) struct DropCounter(pub(crate) Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

use crate::sync::{Arc, AtomicUsize, Mutex};
use std::vec::Vec;

/// Default number of retired generations that triggers an automatic reclamation cycle.
/// 触发自动回收周期的已退休代数量默认值。
pub(crate) const AUTO_RECLAIM_THRESHOLD: usize = 8;

/// Default interval (in reclamation cycles) for pruning slots of dropped readers.
/// 清理已 drop 读者槽位的默认间隔（以回收周期计）。
pub(crate) const DEFAULT_CLEANUP_INTERVAL: usize = 16;

/// Marks a reader that is not inside a protected read.
/// 标记当前不在受保护读取中的读者。
pub(crate) const INACTIVE_EPOCH: usize = usize::MAX;

/// Per-reader announcement of the epoch it is currently reading under.
///
/// Cache-aligned so that readers announcing on every lookup do not false-share.
///
/// 每个读者公告其当前读取所处的纪元。
/// 缓存对齐，避免每次查找都公告的读者之间发生伪共享。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct ReaderSlot {
    pub(crate) active_epoch: AtomicUsize,
}

impl ReaderSlot {
    pub(crate) fn inactive() -> Self {
        Self {
            active_epoch: AtomicUsize::new(INACTIVE_EPOCH),
        }
    }
}

/// State shared between the reclaimer and every registered reader.
/// 回收器与所有已注册读者共享的状态。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct SharedState {
    /// Advanced only by the reclaimer.
    pub(crate) global_epoch: AtomicUsize,
    /// Lowest epoch announced by any reader at the last scan.
    pub(crate) min_active_epoch: AtomicUsize,
    pub(crate) readers: Mutex<Vec<Arc<ReaderSlot>>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            global_epoch: AtomicUsize::new(0),
            min_active_epoch: AtomicUsize::new(0),
            readers: Mutex::new(Vec::new()),
        }
    }
}

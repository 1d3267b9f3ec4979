use crate::reclaim::state::{INACTIVE_EPOCH, ReaderSlot, SharedState};
use crate::sync::{Arc, Cell, Ordering, fence, spin_hint};

/// One reader's registration in a reclamation domain.
///
/// Obtained through [`ReclaimDomain::register_reader`](crate::reclaim::ReclaimDomain::register_reader).
/// It is `!Sync` (the pin count lives in a `Cell`); keep one per thread.
///
/// 读者在回收域中的注册。它是 `!Sync` 的（pin 计数存放于 `Cell`），每个线程保留一个。
pub(crate) struct ReaderEpoch {
    slot: Arc<ReaderSlot>,
    shared: Arc<SharedState>,
    pin_count: Cell<usize>,
}

impl ReaderEpoch {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        let slot = Arc::new(ReaderSlot::inactive());
        shared.readers.lock().push(Arc::clone(&slot));

        ReaderEpoch {
            slot,
            shared,
            pin_count: Cell::new(0),
        }
    }

    /// Announce the current epoch and return a guard that keeps it announced.
    ///
    /// While any guard from this reader lives, nothing retired in the announced epoch
    /// or later is freed. Nested pins are counted; only the outermost one announces.
    ///
    /// 公告当前纪元并返回保持该公告的守卫。
    /// 守卫存活期间，在该纪元及之后退休的快照都不会被释放。嵌套 pin 会被计数。
    #[inline]
    pub(crate) fn pin(&self) -> PinGuard<'_> {
        let pin_count = self.pin_count.get();

        if pin_count == 0 {
            loop {
                let epoch = self.shared.global_epoch.load(Ordering::Acquire);
                self.slot.active_epoch.store(epoch, Ordering::Release);
                // Announcement must be globally visible before any protected load.
                fence(Ordering::SeqCst);

                let min_active = self.shared.min_active_epoch.load(Ordering::Acquire);
                if epoch >= min_active {
                    break;
                }
                spin_hint();
            }
        }

        self.pin_count.set(pin_count + 1);
        PinGuard { reader: self }
    }

    #[cfg(test)]
    pub(crate) fn is_pinned(&self) -> bool {
        self.pin_count.get() > 0
    }
}

impl std::fmt::Debug for ReaderEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderEpoch")
            .field("pin_count", &self.pin_count.get())
            .finish_non_exhaustive()
    }
}

/// Keeps its [`ReaderEpoch`] announced; dropping the last guard releases protection.
///
/// References loaded through [`ProtectedPtr::load`](crate::reclaim::ProtectedPtr::load)
/// borrow from the guard and cannot outlive it.
///
/// 保持其 `ReaderEpoch` 处于公告状态；最后一个守卫 drop 时释放保护。
#[must_use]
pub(crate) struct PinGuard<'a> {
    reader: &'a ReaderEpoch,
}

impl Clone for PinGuard<'_> {
    #[inline]
    fn clone(&self) -> Self {
        let pin_count = self.reader.pin_count.get();
        assert!(
            pin_count > 0,
            "BUG: cloning a PinGuard while its reader is unpinned"
        );
        self.reader.pin_count.set(pin_count + 1);

        PinGuard {
            reader: self.reader,
        }
    }
}

impl Drop for PinGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        let pin_count = self.reader.pin_count.get();
        assert!(
            pin_count > 0,
            "BUG: dropping a PinGuard while its reader is unpinned"
        );

        if pin_count == 1 {
            self.reader
                .slot
                .active_epoch
                .store(INACTIVE_EPOCH, Ordering::Release);
        }
        self.reader.pin_count.set(pin_count - 1);
    }
}

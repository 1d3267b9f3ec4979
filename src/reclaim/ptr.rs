use crate::reclaim::garbage::Reclaimer;
use crate::reclaim::reader::PinGuard;
use crate::sync::{AtomicPtr, Ordering};
use std::boxed::Box;

/// Atomically replaceable pointer to an immutable snapshot.
///
/// Readers load it under a [`PinGuard`]; the single writer replaces it through
/// [`store`](Self::store), which retires the previous snapshot into the writer's
/// [`Reclaimer`]. The pointer is never null.
///
/// 指向不可变快照的可原子替换指针。读者在 `PinGuard` 下读取；
/// 唯一写入者通过 `store` 替换，旧快照交给写入者的 `Reclaimer` 延迟释放。指针永不为空。
pub(crate) struct ProtectedPtr<T> {
    ptr: AtomicPtr<T>,
}

impl<T: Send + 'static> ProtectedPtr<T> {
    #[inline]
    pub(crate) fn new(data: T) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(data))),
        }
    }

    /// Protected read. The snapshot stays alive at least as long as `guard`.
    /// 受保护读取。快照至少与 `guard` 存活得一样久。
    #[inline]
    pub(crate) fn load<'g>(&self, _guard: &'g PinGuard<'_>) -> &'g T {
        let ptr = self.ptr.load(Ordering::Acquire);
        // SAFETY: never null, and the reclaimer does not free anything retired at or
        // after the epoch `_guard` announced.
        unsafe { &*ptr }
    }

    /// Writer-side read. Holding `&Reclaimer` excludes `store` on the same writer, so
    /// the snapshot cannot be retired while the borrow lives.
    ///
    /// 写入端读取。持有 `&Reclaimer` 排除了同一写入者的 `store`，借用期间快照不会被退休。
    #[inline]
    pub(crate) fn load_exclusive<'w>(&'w self, _writer: &'w Reclaimer) -> &'w T {
        let ptr = self.ptr.load(Ordering::Acquire);
        // SAFETY: only `store` retires snapshots and it requires `&mut Reclaimer`.
        unsafe { &*ptr }
    }

    /// Whether `candidate` is still the published snapshot.
    #[inline]
    pub(crate) fn is_current(&self, candidate: &T) -> bool {
        std::ptr::eq(self.ptr.load(Ordering::Acquire), candidate)
    }

    /// Publish `data` and retire the previous snapshot.
    ///
    /// The swap is release-ordered: a reader that observes the new pointer observes
    /// every write made to `data` before publication.
    ///
    /// 发布 `data` 并退休旧快照。交换具有 release 语义。
    #[inline]
    pub(crate) fn store(&self, data: T, reclaimer: &mut Reclaimer) {
        let new_ptr = Box::into_raw(Box::new(data));
        let old_ptr = self.ptr.swap(new_ptr, Ordering::AcqRel);

        if !old_ptr.is_null() {
            // SAFETY: `old_ptr` came from `Box::into_raw` and is no longer reachable
            // through this pointer.
            unsafe {
                reclaimer.retire(Box::from_raw(old_ptr));
            }
        }
    }
}

impl<T> std::fmt::Debug for ProtectedPtr<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ptr = self.ptr.load(Ordering::Relaxed);
        f.debug_tuple("ProtectedPtr").field(&ptr).finish()
    }
}

impl<T> Drop for ProtectedPtr<T> {
    /// No reader can hold a guard once the owner of this pointer is dropped, so the
    /// final snapshot is freed directly.
    #[inline]
    fn drop(&mut self) {
        let ptr = self.ptr.load(Ordering::Relaxed);
        if !ptr.is_null() {
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}

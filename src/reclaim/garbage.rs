use crate::reclaim::state::{INACTIVE_EPOCH, SharedState};
use crate::sync::{Arc, Ordering, fence, spin_hint};
use std::boxed::Box;
use std::collections::VecDeque;
use std::vec::Vec;

/// A snapshot unlinked from its shared pointer, waiting for readers to move on.
///
/// Holds the erased pointer together with the destructor of its concrete type, so
/// one bin can hold generations of any table.
///
/// 一个已从共享指针上摘下、等待读者离开的快照。
/// 保存类型擦除后的指针及其具体类型的析构函数。
struct Retired {
    ptr: *mut (),
    free: unsafe fn(*mut ()),
}

// SAFETY: `Retired::new` only accepts `T: Send`, and the pointer is owned exclusively
// by the bin until `free` runs exactly once.
unsafe impl Send for Retired {}

#[inline(always)]
unsafe fn free_boxed<T>(ptr: *mut ()) {
    unsafe {
        drop(Box::from_raw(ptr as *mut T));
    }
}

impl Retired {
    #[inline(always)]
    fn new<T: Send + 'static>(value: Box<T>) -> Self {
        Retired {
            ptr: Box::into_raw(value) as *mut (),
            free: free_boxed::<T>,
        }
    }
}

impl Drop for Retired {
    #[inline(always)]
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                (self.free)(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Retired snapshots bucketed by the epoch they were retired in.
/// 按退休纪元分桶的已退休快照。
pub(crate) struct RetireBin {
    /// `(epoch, bag)` in ascending epoch order.
    queue: VecDeque<(usize, Vec<Retired>)>,
    /// Emptied bags kept for reuse.
    pool: Vec<Vec<Retired>>,
    count: usize,
}

impl RetireBin {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            pool: Vec::new(),
            count: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    fn push(&mut self, node: Retired, epoch: usize) {
        match self.queue.back_mut() {
            Some((last_epoch, bag)) if *last_epoch == epoch => bag.push(node),
            _ => {
                let mut bag = self.pool.pop().unwrap_or_else(|| Vec::with_capacity(4));
                bag.push(node);
                self.queue.push_back((epoch, bag));
            }
        }
        self.count += 1;
    }

    /// Free every bag no pinned reader can still observe.
    ///
    /// Returns how many snapshots were freed.
    fn reclaim(&mut self, min_active_epoch: usize, current_epoch: usize) -> usize {
        fn recycle(mut bag: Vec<Retired>, pool: &mut Vec<Vec<Retired>>) {
            bag.clear();
            pool.push(bag);
        }

        let before = self.count;

        if min_active_epoch == current_epoch {
            for (_, bag) in self.queue.drain(..) {
                recycle(bag, &mut self.pool);
            }
        } else if min_active_epoch > 0 {
            let safe_epoch = min_active_epoch - 1;
            while let Some((epoch, _)) = self.queue.front() {
                if *epoch > safe_epoch {
                    break;
                }
                if let Some((_, bag)) = self.queue.pop_front() {
                    recycle(bag, &mut self.pool);
                }
            }
        }

        self.count = self.queue.iter().map(|(_, bag)| bag.len()).sum();
        before - self.count
    }
}

/// The writer side of a reclamation domain.
///
/// Exactly one `Reclaimer` exists per [`ReclaimDomain`](crate::reclaim::ReclaimDomain);
/// it is owned by the table's single mutator. Every snapshot replaced through
/// [`ProtectedPtr::store`](crate::reclaim::ProtectedPtr::store) lands here and is freed once
/// all readers that could have loaded it have released their pin.
///
/// 回收域的写入端。每个域恰好一个 `Reclaimer`，由表的唯一修改者持有。
/// 通过 `ProtectedPtr::store` 替换下来的快照都会进入这里，
/// 并在所有可能读到它的读者释放 pin 之后被释放。
pub(crate) struct Reclaimer {
    pub(crate) shared: Arc<SharedState>,
    pub(crate) bin: RetireBin,
    pub(crate) auto_reclaim_threshold: Option<usize>,
    pub(crate) cycles: usize,
    pub(crate) cleanup_interval: usize,
}

impl Reclaimer {
    /// Number of retired snapshots not yet freed.
    /// 尚未释放的已退休快照数量。
    #[inline]
    pub(crate) fn retired_count(&self) -> usize {
        self.bin.len()
    }

    /// Hand a snapshot over for deferred freeing.
    ///
    /// The snapshot's `Drop` runs only after every reader pinned at or before the
    /// current epoch has unpinned.
    #[inline]
    pub(crate) fn retire<T: Send + 'static>(&mut self, data: Box<T>) {
        let epoch = self.shared.global_epoch.load(Ordering::Relaxed);
        self.bin.push(Retired::new(data), epoch);
        log::trace!("retired snapshot in epoch {epoch}, {} pending", self.bin.len());

        if let Some(threshold) = self.auto_reclaim_threshold {
            if self.bin.len() > threshold {
                self.collect();
            }
        }
    }

    /// Run one reclamation cycle.
    ///
    /// 1. Advance the global epoch.
    /// 2. Scan readers for the lowest announced epoch.
    /// 3. Free bags retired strictly before that epoch (everything when no reader is pinned).
    ///
    /// 执行一个回收周期：推进全局纪元，扫描读者的最小公告纪元，释放更早纪元的快照。
    pub(crate) fn collect(&mut self) {
        let new_epoch = self.shared.global_epoch.fetch_add(1, Ordering::AcqRel) + 1;
        // Pairs with the fence in `ReaderEpoch::pin`: either we see the reader's
        // announcement or the reader sees the already swapped pointer.
        fence(Ordering::SeqCst);

        let mut min_active_epoch = new_epoch;
        self.cycles += 1;

        let prune = self.cleanup_interval > 0 && self.cycles % self.cleanup_interval == 0;
        let mut readers = self.shared.readers.lock();
        let mut dead = 0;

        for slot in readers.iter() {
            let epoch = slot.active_epoch.load(Ordering::Acquire);
            if epoch != INACTIVE_EPOCH {
                min_active_epoch = min_active_epoch.min(epoch);
            } else if prune && Arc::strong_count(slot) == 1 {
                dead += 1;
            }
        }

        if dead > 0 {
            readers.retain(|slot| Arc::strong_count(slot) > 1);
        }
        drop(readers);

        self.shared
            .min_active_epoch
            .store(min_active_epoch, Ordering::Release);
        let freed = self.bin.reclaim(min_active_epoch, new_epoch);
        if freed > 0 {
            log::trace!("freed {freed} retired snapshots at epoch {new_epoch}");
        }
    }

    /// Collect until nothing retired is left.
    ///
    /// Pins are only held for the duration of a single probe, so this spins for a
    /// bounded time.
    ///
    /// 反复回收直到没有已退休快照。pin 只在单次探测期间持有，因此自旋时间有界。
    pub(crate) fn synchronize(&mut self) {
        self.collect();
        while self.bin.len() > 0 {
            spin_hint();
            self.collect();
        }
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("retired", &self.bin.len())
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

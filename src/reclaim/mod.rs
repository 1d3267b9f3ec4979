//! Deferred reclamation of replaced table generations.
//!
//! A single-writer epoch scheme: readers announce the epoch they read under for the
//! duration of one protected read, the writer retires replaced snapshots tagged with
//! the epoch of their retirement and frees them once no announcement is that old.
//!
//! A `ProtectedPtr` must only ever be loaded under guards of, and stored through the
//! reclaimer of, one domain; the table pairs them when it is built and never
//! hands any of them out.
//!
//! 被替换的表代的延迟回收。单写入者纪元方案：读者在一次受保护读取期间公告其纪元，
//! 写入者按退休纪元标记被替换的快照，并在没有更旧的公告后释放它们。

mod garbage;
mod ptr;
mod reader;
mod state;

pub(crate) use garbage::Reclaimer;
pub(crate) use ptr::ProtectedPtr;
pub(crate) use reader::ReaderEpoch;

use crate::sync::Arc;
use garbage::RetireBin;
use state::{AUTO_RECLAIM_THRESHOLD, DEFAULT_CLEANUP_INTERVAL, SharedState};

/// Builder for a [`ReclaimDomain`].
#[derive(Debug, Clone)]
pub(crate) struct ReclaimDomainBuilder {
    auto_reclaim_threshold: Option<usize>,
    cleanup_interval: usize,
}

impl ReclaimDomainBuilder {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            auto_reclaim_threshold: Some(AUTO_RECLAIM_THRESHOLD),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Retired-snapshot count above which `retire` runs a reclamation cycle itself.
    /// `None` leaves reclamation to explicit [`Reclaimer::collect`] calls.
    ///
    /// Default: `Some(8)`
    ///
    /// 已退休快照数超过该阈值时 `retire` 会自行执行回收。`None` 表示仅显式回收。
    #[inline]
    pub(crate) fn auto_reclaim_threshold(mut self, threshold: impl Into<Option<usize>>) -> Self {
        self.auto_reclaim_threshold = threshold.into();
        self
    }

    /// Prune slots of dropped readers every `interval` cycles; `0` never prunes.
    ///
    /// Default: `16`
    #[inline]
    pub(crate) fn cleanup_interval(mut self, interval: usize) -> Self {
        self.cleanup_interval = interval;
        self
    }

    #[inline]
    pub(crate) fn build(self) -> (Reclaimer, ReclaimDomain) {
        let shared = Arc::new(SharedState::new());

        let reclaimer = Reclaimer {
            shared: shared.clone(),
            bin: RetireBin::new(),
            auto_reclaim_threshold: self.auto_reclaim_threshold,
            cycles: 0,
            cleanup_interval: self.cleanup_interval,
        };

        (reclaimer, ReclaimDomain { shared })
    }
}

impl Default for ReclaimDomainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader-side entry point of a reclamation domain.
///
/// `Clone + Send + Sync`; hand a clone to every thread that needs protected reads and
/// let each thread [`register_reader`](Self::register_reader) once.
///
/// 回收域的读者入口。可克隆并跨线程共享，每个线程注册一次。
#[derive(Clone, Debug)]
pub(crate) struct ReclaimDomain {
    shared: Arc<SharedState>,
}

impl ReclaimDomain {
    #[inline]
    pub(crate) fn builder() -> ReclaimDomainBuilder {
        ReclaimDomainBuilder::new()
    }

    #[inline]
    pub(crate) fn register_reader(&self) -> ReaderEpoch {
        ReaderEpoch::new(self.shared.clone())
    }
}

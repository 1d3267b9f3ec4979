use std::alloc::Layout;

use crate::sync::AtomicUsize;

/// Errors reported by the fallible table operations.
///
/// The panicking counterparts (`insert`, `remove`, `build`) treat every variant as
/// fatal: usage violations panic with the message below, allocation failure goes
/// through [`std::alloc::handle_alloc_error`].
///
/// 可失败表操作报告的错误。对应的会 panic 的接口将所有变体视为致命错误。
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("key must not be null")]
    NullKey,

    #[error("value must not be null")]
    NullValue,

    /// The key's word is the tombstone marker of this table and cannot be stored.
    #[error("key {bits:#x} collides with the tombstone marker")]
    ReservedKey { bits: usize },

    /// Raw tracking-mode bits outside `0..=3`.
    #[error("wrong type for gc hashtable: tracking mode bits {0:#04b}")]
    InvalidTrackingMode(u8),

    #[error("failed to allocate a generation of {capacity} slots")]
    AllocationFailed { capacity: usize },
}

impl TableError {
    /// Escalate to the fatal form used by the infallible API.
    #[cold]
    pub(crate) fn raise(self) -> ! {
        match self {
            TableError::AllocationFailed { capacity } => {
                let layout = Layout::array::<AtomicUsize>(capacity)
                    .unwrap_or_else(|_| Layout::new::<AtomicUsize>());
                std::alloc::handle_alloc_error(layout)
            }
            usage => panic!("{usage}"),
        }
    }
}

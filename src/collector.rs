//! Hooks into the host garbage collector.
//!
//! A table tells its [`Collector`] which of its cell arrays hold collector-managed
//! references (per [`TrackingMode`]), and reports every store into such a cell.
//! A conservative collector that scans all heap memory needs none of this;
//! [`NoopCollector`] is that discipline.
//!
//! 与宿主垃圾回收器的对接钩子。表根据 `TrackingMode` 告知回收器哪些单元数组保存了
//! 受管引用，并报告对这些单元的每一次写入。保守式回收器不需要这些，`NoopCollector` 即为此情形。

use std::convert::TryFrom;

use crate::error::TableError;

/// Key-cell marker for removed entries when keys are not collector-managed.
pub const UNTRACKED_TOMBSTONE: usize = usize::MAX;

/// Which cells of a table hold references the collector must see.
///
/// Fixed at construction. It decides which stores go through
/// [`Collector::write_barrier`], which arrays are registered as roots and which
/// tombstone marker removed keys get.
///
/// 表中哪些单元保存了回收器必须看到的引用。构造时确定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TrackingMode {
    #[default]
    None = 0,
    KeyIsReference = 1,
    ValueIsReference = 2,
    BothAreReferences = 3,
}

impl TrackingMode {
    #[inline]
    pub const fn tracks_keys(self) -> bool {
        (self as u8) & (TrackingMode::KeyIsReference as u8) != 0
    }

    #[inline]
    pub const fn tracks_values(self) -> bool {
        (self as u8) & (TrackingMode::ValueIsReference as u8) != 0
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TrackingMode {
    type Error = TableError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0 => Ok(TrackingMode::None),
            1 => Ok(TrackingMode::KeyIsReference),
            2 => Ok(TrackingMode::ValueIsReference),
            3 => Ok(TrackingMode::BothAreReferences),
            other => Err(TableError::InvalidTrackingMode(other)),
        }
    }
}

/// Where a registered root came from, for the collector's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootLabel {
    pub source: &'static str,
    pub description: &'static str,
}

impl Default for RootLabel {
    fn default() -> Self {
        RootLabel {
            source: "external",
            description: "concurrent hash table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootCells {
    Keys,
    Values,
}

/// One cell array handed to [`Collector::register_root`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootDescriptor {
    /// Address of the first cell.
    pub addr: usize,
    pub byte_len: usize,
    pub cells: RootCells,
    pub label: RootLabel,
}

/// Collector bridge injected into a table at construction.
///
/// Every method defaults to a no-op, which is correct for a conservative
/// collector. A precise collector overrides root registration and the barrier;
/// one that needs a heap object as the removed-key marker overrides
/// [`key_tombstone`](Self::key_tombstone).
///
/// 构造时注入表的回收器桥。所有方法默认为空操作，这对保守式回收器是正确的。
pub trait Collector: Send + Sync + 'static {
    /// Called for each tracked cell array before its generation becomes reachable.
    #[inline]
    fn register_root(&self, root: RootDescriptor) {
        let _ = root;
    }

    /// Called when a generation that registered the array at `addr` is freed.
    #[inline]
    fn deregister_root(&self, addr: usize) {
        let _ = addr;
    }

    /// Called right after `value` was stored into the tracked cell at `cell_addr`.
    #[inline]
    fn write_barrier(&self, cell_addr: usize, value: usize) {
        let _ = (cell_addr, value);
    }

    /// Marker written over removed keys when keys are tracked. Must be non-zero
    /// and must never be a live key.
    #[inline]
    fn key_tombstone(&self) -> usize {
        UNTRACKED_TOMBSTONE
    }
}

/// Collector bridge for hosts whose collector finds references on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollector;

impl Collector for NoopCollector {}

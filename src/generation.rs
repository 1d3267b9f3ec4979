use std::sync::Arc as StdArc;

use crate::collector::{
    Collector, RootCells, RootDescriptor, RootLabel, TrackingMode, UNTRACKED_TOMBSTONE,
};
use crate::error::TableError;
use crate::hash::Probe;
use crate::sync::{AtomicUsize, Ordering, fence};

const NULL: usize = 0;

/// Decoded state of one slot, read from its key cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotState {
    Empty,
    Tombstone,
    Occupied(usize),
}

/// Outcome of a concurrent probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Found { key: usize, value: usize },
    Absent,
    /// The matching key was seen with a null value: removal in flight.
    Retry,
}

/// Outcome of a writer-side probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Located {
    Occupied { index: usize, key: usize },
    Vacant { index: usize },
}

/// One immutable-capacity snapshot of the table's storage.
///
/// Within a generation a slot only ever moves `Empty -> Occupied -> Tombstone`;
/// tombstones are dropped when the next generation is built. A value cell is null
/// exactly when its slot is empty or a tombstone.
///
/// 表存储的一个容量固定的快照。同一代内槽位只会经历 空 -> 占用 -> 墓碑。
pub(crate) struct Generation<C: Collector> {
    keys: Box<[AtomicUsize]>,
    values: Box<[AtomicUsize]>,
    mode: TrackingMode,
    tombstone: usize,
    collector: StdArc<C>,
}

fn alloc_cells(capacity: usize) -> Result<Box<[AtomicUsize]>, TableError> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(capacity)
        .map_err(|_| TableError::AllocationFailed { capacity })?;
    cells.extend((0..capacity).map(|_| AtomicUsize::new(NULL)));
    Ok(cells.into_boxed_slice())
}

impl<C: Collector> Generation<C> {
    /// Allocate an empty generation and register its tracked arrays as roots.
    pub(crate) fn new(
        capacity: usize,
        mode: TrackingMode,
        collector: &StdArc<C>,
        label: RootLabel,
    ) -> Result<Self, TableError> {
        debug_assert!(capacity.is_power_of_two());
        let keys = alloc_cells(capacity)?;
        let values = alloc_cells(capacity)?;

        let tombstone = if mode.tracks_keys() {
            collector.key_tombstone()
        } else {
            UNTRACKED_TOMBSTONE
        };
        debug_assert_ne!(tombstone, NULL, "tombstone marker must not be null");

        let byte_len = capacity * std::mem::size_of::<AtomicUsize>();
        if mode.tracks_keys() {
            collector.register_root(RootDescriptor {
                addr: keys.as_ptr() as usize,
                byte_len,
                cells: RootCells::Keys,
                label,
            });
        }
        if mode.tracks_values() {
            collector.register_root(RootDescriptor {
                addr: values.as_ptr() as usize,
                byte_len,
                cells: RootCells::Values,
                label,
            });
        }

        Ok(Generation {
            keys,
            values,
            mode,
            tombstone,
            collector: StdArc::clone(collector),
        })
    }

    /// A generation with no slots and no roots, published when the table is
    /// destroyed so that late lookups find nothing.
    pub(crate) fn vacant(collector: &StdArc<C>) -> Self {
        Generation {
            keys: Vec::new().into_boxed_slice(),
            values: Vec::new().into_boxed_slice(),
            mode: TrackingMode::None,
            tombstone: UNTRACKED_TOMBSTONE,
            collector: StdArc::clone(collector),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub(crate) fn tombstone(&self) -> usize {
        self.tombstone
    }

    #[inline]
    fn decode(&self, key: usize) -> SlotState {
        if key == NULL {
            SlotState::Empty
        } else if key == self.tombstone {
            SlotState::Tombstone
        } else {
            SlotState::Occupied(key)
        }
    }

    #[inline]
    fn state(&self, index: usize) -> SlotState {
        self.decode(self.keys[index].load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> usize {
        self.values[index].load(Ordering::Relaxed)
    }

    #[inline]
    fn store_key(&self, index: usize, key: usize) {
        let cell = &self.keys[index];
        cell.store(key, Ordering::Relaxed);
        if self.mode.tracks_keys() {
            self.collector
                .write_barrier(cell as *const AtomicUsize as usize, key);
        }
    }

    #[inline]
    fn store_value(&self, index: usize, value: usize) {
        let cell = &self.values[index];
        cell.store(value, Ordering::Relaxed);
        if self.mode.tracks_values() && value != NULL {
            self.collector
                .write_barrier(cell as *const AtomicUsize as usize, value);
        }
    }

    /// Probe concurrently with the single writer.
    ///
    /// The key read is followed by an acquire fence before the value read; paired
    /// with the release fence in [`publish`](Self::publish), a visible key implies a
    /// visible value.
    pub(crate) fn find(&self, mixed: u32, mut matches: impl FnMut(usize) -> bool) -> Lookup {
        if self.capacity() == 0 {
            return Lookup::Absent;
        }
        let mut probe = Probe::start(mixed, self.capacity());

        for _ in 0..self.capacity() {
            match self.state(probe.index) {
                SlotState::Empty => return Lookup::Absent,
                SlotState::Occupied(key) if matches(key) => {
                    fence(Ordering::Acquire);
                    let value = self.values[probe.index].load(Ordering::Relaxed);
                    if value == NULL {
                        return Lookup::Retry;
                    }
                    return Lookup::Found { key, value };
                }
                SlotState::Occupied(_) | SlotState::Tombstone => probe.advance(),
            }
        }

        Lookup::Absent
    }

    /// Writer-side probe: the slot holding a matching key, else the empty slot that
    /// ends the chain. Tombstones are walked over, never claimed.
    pub(crate) fn locate(&self, mixed: u32, mut matches: impl FnMut(usize) -> bool) -> Located {
        let mut probe = Probe::start(mixed, self.capacity());

        loop {
            match self.state(probe.index) {
                SlotState::Empty => return Located::Vacant { index: probe.index },
                SlotState::Occupied(key) if matches(key) => {
                    return Located::Occupied {
                        index: probe.index,
                        key,
                    };
                }
                SlotState::Occupied(_) | SlotState::Tombstone => probe.advance(),
            }
        }
    }

    /// Fill an empty slot while readers may be probing: value, release fence, key.
    pub(crate) fn publish(&self, index: usize, key: usize, value: usize) {
        debug_assert_eq!(self.state(index), SlotState::Empty);
        self.store_value(index, value);
        fence(Ordering::Release);
        self.store_key(index, key);
    }

    /// Turn an occupied slot into a tombstone: null value, release fence, marker.
    ///
    /// A reader that already matched the old key then sees the null value and retries.
    pub(crate) fn bury(&self, index: usize) {
        self.values[index].store(NULL, Ordering::Relaxed);
        fence(Ordering::Release);
        self.store_key(index, self.tombstone);
    }

    /// Insert into a generation no reader can reach yet. No fences needed; the
    /// publishing pointer swap orders these stores.
    pub(crate) fn insert_local(&self, mixed: u32, key: usize, value: usize) {
        let mut probe = Probe::start(mixed, self.capacity());
        while self.state(probe.index) != SlotState::Empty {
            probe.advance();
        }
        self.store_key(probe.index, key);
        self.store_value(probe.index, value);
    }

    /// Live `(key, value)` words in slot order. Writer only.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.capacity()).filter_map(move |index| match self.state(index) {
            SlotState::Occupied(key) => Some((key, self.value(index))),
            SlotState::Empty | SlotState::Tombstone => None,
        })
    }

    #[cfg(test)]
    pub(crate) fn tombstone_count(&self) -> usize {
        (0..self.capacity())
            .filter(|&index| self.state(index) == SlotState::Tombstone)
            .count()
    }
}

impl<C: Collector> Drop for Generation<C> {
    /// Runs when the generation is reclaimed (or the table is destroyed), after the
    /// last reader that could see it has let go.
    fn drop(&mut self) {
        if self.mode.tracks_keys() {
            self.collector.deregister_root(self.keys.as_ptr() as usize);
        }
        if self.mode.tracks_values() {
            self.collector.deregister_root(self.values.as_ptr() as usize);
        }
    }
}

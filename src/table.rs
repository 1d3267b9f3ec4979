use std::marker::PhantomData;
use std::sync::Arc as StdArc;

use crate::collector::{Collector, NoopCollector, RootLabel, TrackingMode};
use crate::error::TableError;
use crate::generation::{Generation, Located};
use crate::hash::{
    GROWTH_FACTOR, INITIAL_CAPACITY, MIN_CAPACITY, direct_hash, mix_hash, resize_threshold,
};
use crate::reclaim::{ProtectedPtr, ReclaimDomain, ReclaimDomainBuilder, Reclaimer};
use crate::sync::Arc;
use crate::view::TableReaders;
use crate::word::Word;

type HashFn<K> = Box<dyn Fn(K) -> u32 + Send + Sync>;
type EqualFn<K> = Box<dyn Fn(K, K) -> bool + Send + Sync>;
type DestroyFn<T> = Box<dyn FnMut(T) + Send>;

/// Caller-supplied hashing and key comparison, shared by the writer and all readers.
pub(crate) struct KeyOps<K> {
    hash: HashFn<K>,
    /// `None` compares keys by identity (word equality).
    equal: Option<EqualFn<K>>,
}

impl<K: Word> KeyOps<K> {
    #[inline]
    pub(crate) fn mixed(&self, key: K) -> u32 {
        mix_hash((self.hash)(key))
    }

    /// Mixed hash of a key word taken from a generation.
    #[inline]
    fn mixed_word(&self, word: usize) -> u32 {
        // SAFETY: occupied key cells only ever hold words produced by `K::to_word`.
        self.mixed(unsafe { K::from_word(word) })
    }

    /// Predicate over occupied key words that matches `key`.
    #[inline]
    pub(crate) fn matcher(&self, key: K) -> impl Fn(usize) -> bool + '_ {
        let word = key.to_word();
        move |candidate| match &self.equal {
            None => candidate == word,
            // SAFETY: as in `mixed_word`.
            Some(equal) => equal(key, unsafe { K::from_word(candidate) }),
        }
    }
}

/// State reachable from both the writer and the reader views.
pub(crate) struct Shared<K, V, C: Collector> {
    pub(crate) current: ProtectedPtr<Generation<C>>,
    pub(crate) keys: KeyOps<K>,
    _values: PhantomData<fn() -> V>,
}

/// A single-writer, multi-reader hash table of pointer-sized keys and values.
///
/// Open addressing with linear probing over a power-of-two generation. Growth
/// replaces the whole generation: entries are rehashed into a fresh one, the fresh
/// one is published with one pointer swap and the old one is freed once no
/// concurrent reader can still be probing it.
///
/// This handle is the only mutator. It is neither `Clone` nor `Sync`, so every
/// `insert`/`remove` is exclusive by construction. Concurrent lookups go through
/// [`TableReaders`], handed out by [`build`](ConcHashTableBuilder::build) or
/// [`readers`](Self::readers).
///
/// ```
/// use conc_ghash::ConcHashTable;
///
/// let (mut table, readers) = ConcHashTable::<usize, usize>::builder().build();
/// assert_eq!(table.insert(1, 10), None);
///
/// let reader = readers.register();
/// assert_eq!(reader.lookup(1), Some((1, 10)));
/// assert_eq!(table.remove(1), Some(10));
/// assert_eq!(reader.lookup(1), None);
/// ```
///
/// 单写入者、多读者的哈希表，键和值均为指针大小。
/// 扩容时整体替换存储代：重新散列到新代，以一次指针交换发布，
/// 旧代在没有并发读者仍在探测时释放。此句柄是唯一的修改者。
pub struct ConcHashTable<K: Word, V: Word, C: Collector = NoopCollector> {
    shared: Arc<Shared<K, V, C>>,
    domain: ReclaimDomain,
    reclaimer: Reclaimer,
    collector: StdArc<C>,
    mode: TrackingMode,
    label: RootLabel,
    /// Marker written over removed keys; fixed for the table's lifetime.
    tombstone: usize,
    live: usize,
    tombstones: usize,
    /// Occupancy (live + tombstones) that triggers the next resize.
    threshold: usize,
    key_destroy: Option<DestroyFn<K>>,
    value_destroy: Option<DestroyFn<V>>,
}

impl<K: Word, V: Word> ConcHashTable<K, V> {
    /// Identity-compared table with the direct hash and no collector hooks.
    pub fn new() -> (Self, TableReaders<K, V>) {
        Self::builder().build()
    }

    pub fn builder() -> ConcHashTableBuilder<K, V> {
        ConcHashTableBuilder::new()
    }
}

impl<K: Word, V: Word, C: Collector> ConcHashTable<K, V, C> {
    #[inline]
    fn generation(&self) -> &Generation<C> {
        self.shared.current.load_exclusive(&self.reclaimer)
    }

    /// Insert `key -> value` if `key` is absent.
    ///
    /// Returns the value already stored under an equal key, leaving it untouched,
    /// or `None` when the entry was added.
    ///
    /// Removed slots are not reused until the next resize, so a resize can happen
    /// before the live count reaches 0.75 × capacity.
    ///
    /// # Errors
    ///
    /// [`TableError::NullKey`], [`TableError::NullValue`] and
    /// [`TableError::ReservedKey`] for usage violations,
    /// [`TableError::AllocationFailed`] when growing failed.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, TableError> {
        let key_word = key.to_word();
        let value_word = value.to_word();
        if key_word == 0 {
            return Err(TableError::NullKey);
        }
        if key_word == self.tombstone {
            return Err(TableError::ReservedKey { bits: key_word });
        }
        if value_word == 0 {
            return Err(TableError::NullValue);
        }

        let mixed = self.shared.keys.mixed(key);

        if self.live + self.tombstones >= self.threshold {
            self.resize()?;
        }

        let generation = self.shared.current.load_exclusive(&self.reclaimer);
        match generation.locate(mixed, self.shared.keys.matcher(key)) {
            Located::Occupied { index, .. } => {
                // SAFETY: occupied value cells hold words produced by `V::to_word`.
                Ok(Some(unsafe { V::from_word(generation.value(index)) }))
            }
            Located::Vacant { index } => {
                generation.publish(index, key_word, value_word);
                self.live += 1;
                Ok(None)
            }
        }
    }

    /// [`try_insert`](Self::try_insert), treating every error as fatal.
    ///
    /// # Panics
    ///
    /// On a null key or value, or a key equal to the tombstone marker.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.try_insert(key, value).unwrap_or_else(|err| err.raise())
    }

    /// Remove the entry for `key`, running the destroy callbacks on it.
    ///
    /// # Errors
    ///
    /// [`TableError::NullKey`] for a null key.
    pub fn try_remove(&mut self, key: K) -> Result<Option<V>, TableError> {
        if key.to_word() == 0 {
            return Err(TableError::NullKey);
        }

        let mixed = self.shared.keys.mixed(key);
        let generation = self.shared.current.load_exclusive(&self.reclaimer);

        let Located::Occupied { index, key: stored } =
            generation.locate(mixed, self.shared.keys.matcher(key))
        else {
            return Ok(None);
        };

        let value_word = generation.value(index);
        generation.bury(index);
        self.live -= 1;
        self.tombstones += 1;

        // SAFETY: both words were stored from a `K` and a `V`.
        let (stored, value) = unsafe { (K::from_word(stored), V::from_word(value_word)) };
        if let Some(destroy) = self.key_destroy.as_mut() {
            destroy(stored);
        }
        if let Some(destroy) = self.value_destroy.as_mut() {
            destroy(value);
        }
        Ok(Some(value))
    }

    /// # Panics
    ///
    /// On a null key.
    pub fn remove(&mut self, key: K) -> Option<V> {
        self.try_remove(key).unwrap_or_else(|err| err.raise())
    }

    /// Writer-side lookup. No protection is taken: the generation can only be
    /// replaced through `&mut self`.
    pub fn lookup(&self, key: K) -> Option<(K, V)> {
        if key.to_word() == 0 {
            return None;
        }
        let generation = self.generation();
        match generation.locate(self.shared.keys.mixed(key), self.shared.keys.matcher(key)) {
            // SAFETY: stored words came from a `K` and a `V`.
            Located::Occupied { index, key } => {
                Some(unsafe { (K::from_word(key), V::from_word(generation.value(index))) })
            }
            Located::Vacant { .. } => None,
        }
    }

    #[inline]
    pub fn lookup_value(&self, key: K) -> Option<V> {
        self.lookup(key).map(|(_, value)| value)
    }

    #[inline]
    pub fn contains_key(&self, key: K) -> bool {
        self.lookup(key).is_some()
    }

    /// Visit every live entry once, in slot order.
    pub fn for_each(&self, mut visit: impl FnMut(K, V)) {
        for (key, value) in self.generation().entries() {
            // SAFETY: stored words came from a `K` and a `V`.
            unsafe { visit(K::from_word(key), V::from_word(value)) };
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slot count of the current generation; always a power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.generation().capacity()
    }

    #[inline]
    pub fn tracking_mode(&self) -> TrackingMode {
        self.mode
    }

    /// Another factory for concurrent read views of this table.
    pub fn readers(&self) -> TableReaders<K, V, C> {
        TableReaders::new(self.shared.clone(), self.domain.clone())
    }

    /// Run a reclamation cycle for replaced generations.
    ///
    /// Reclamation stays internal to the table; the epoch machinery itself is not
    /// reachable from outside the crate:
    ///
    /// ```compile_fail
    /// use conc_ghash::reclaim::ReclaimDomain;
    /// ```
    #[inline]
    pub fn collect(&mut self) {
        self.reclaimer.collect();
    }

    /// Replaced generations still waiting for readers to move on.
    #[inline]
    pub fn retired_generations(&self) -> usize {
        self.reclaimer.retired_count()
    }

    /// Destroy the table: release every generation and its collector roots, then run
    /// the destroy callbacks on every live entry. Same as dropping it.
    ///
    /// Read views that are still around find nothing from here on.
    pub fn destroy(self) {
        drop(self);
    }

    /// Build the next generation, publish it and retire the current one.
    ///
    /// Doubles the capacity, unless most of the occupancy is tombstones, in which
    /// case the generation is rebuilt at its current size to purge them.
    fn resize(&mut self) -> Result<(), TableError> {
        let old = self.shared.current.load_exclusive(&self.reclaimer);
        let old_capacity = old.capacity();
        let new_capacity = if self.live * 2 < self.threshold {
            old_capacity
        } else {
            old_capacity
                .checked_mul(GROWTH_FACTOR)
                .ok_or(TableError::AllocationFailed {
                    capacity: usize::MAX,
                })?
        };

        let fresh = Generation::new(new_capacity, self.mode, &self.collector, self.label)?;
        for (key, value) in old.entries() {
            fresh.insert_local(self.shared.keys.mixed_word(key), key, value);
        }

        log::debug!(
            "replacing generation: capacity {old_capacity} -> {new_capacity}, {} live, {} tombstones purged",
            self.live,
            self.tombstones
        );

        self.shared.current.store(fresh, &mut self.reclaimer);
        self.threshold = resize_threshold(new_capacity);
        self.tombstones = 0;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tombstone_count(&self) -> usize {
        self.generation().tombstone_count()
    }
}

impl<K: Word, V: Word, C: Collector> Drop for ConcHashTable<K, V, C> {
    /// Unpublish every entry, free every generation, then run the destroy callbacks.
    ///
    /// Read views that outlive the table see an empty generation afterwards, so no
    /// lookup can return an entry whose callbacks have already run.
    fn drop(&mut self) {
        let entries: Vec<(usize, usize)> =
            if self.key_destroy.is_some() || self.value_destroy.is_some() {
                self.generation().entries().collect()
            } else {
                Vec::new()
            };

        self.shared
            .current
            .store(Generation::vacant(&self.collector), &mut self.reclaimer);
        // Frees the last real generation and deregisters its roots.
        self.reclaimer.synchronize();
        log::debug!("destroying table with {} live entries", self.live);

        for (key, value) in entries {
            // SAFETY: stored words came from a `K` and a `V`.
            let (key, value) = unsafe { (K::from_word(key), V::from_word(value)) };
            if let Some(destroy) = self.key_destroy.as_mut() {
                destroy(key);
            }
            if let Some(destroy) = self.value_destroy.as_mut() {
                destroy(value);
            }
        }
    }
}

impl<K: Word, V: Word, C: Collector> std::fmt::Debug for ConcHashTable<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcHashTable")
            .field("len", &self.live)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.capacity())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Configures and builds a [`ConcHashTable`].
///
/// ```
/// use conc_ghash::{ConcHashTable, TrackingMode};
///
/// let (table, _readers) = ConcHashTable::<usize, usize>::builder()
///     .hash_fn(|key| (key >> 3) as u32)
///     .equal_fn(|a, b| a == b)
///     .tracking_mode(TrackingMode::None)
///     .initial_capacity(64)
///     .build();
/// assert_eq!(table.capacity(), 64);
/// ```
pub struct ConcHashTableBuilder<K, V, C = NoopCollector> {
    hash: Option<HashFn<K>>,
    equal: Option<EqualFn<K>>,
    key_destroy: Option<DestroyFn<K>>,
    value_destroy: Option<DestroyFn<V>>,
    mode: TrackingMode,
    label: RootLabel,
    collector: C,
    initial_capacity: usize,
    reclaim: ReclaimDomainBuilder,
}

impl<K: Word, V: Word> ConcHashTableBuilder<K, V> {
    pub fn new() -> Self {
        ConcHashTableBuilder {
            hash: None,
            equal: None,
            key_destroy: None,
            value_destroy: None,
            mode: TrackingMode::None,
            label: RootLabel::default(),
            collector: NoopCollector,
            initial_capacity: INITIAL_CAPACITY,
            reclaim: ReclaimDomain::builder(),
        }
    }
}

impl<K: Word, V: Word> Default for ConcHashTableBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Word, V: Word, C: Collector> ConcHashTableBuilder<K, V, C> {
    /// Hash function for keys. Default: the key's word truncated to 32 bits.
    pub fn hash_fn(mut self, hash: impl Fn(K) -> u32 + Send + Sync + 'static) -> Self {
        self.hash = Some(Box::new(hash));
        self
    }

    /// Key equality. Without one, keys are compared by identity.
    pub fn equal_fn(mut self, equal: impl Fn(K, K) -> bool + Send + Sync + 'static) -> Self {
        self.equal = Some(Box::new(equal));
        self
    }

    /// Called with the stored key of every entry removed or still live at destruction.
    pub fn key_destroy(mut self, destroy: impl FnMut(K) + Send + 'static) -> Self {
        self.key_destroy = Some(Box::new(destroy));
        self
    }

    /// Called with the value of every entry removed or still live at destruction.
    pub fn value_destroy(mut self, destroy: impl FnMut(V) + Send + 'static) -> Self {
        self.value_destroy = Some(Box::new(destroy));
        self
    }

    pub fn tracking_mode(mut self, mode: TrackingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Label passed along with every root registration.
    pub fn root_label(mut self, source: &'static str, description: &'static str) -> Self {
        self.label = RootLabel {
            source,
            description,
        };
        self
    }

    /// Replace the collector bridge.
    pub fn collector<C2: Collector>(self, collector: C2) -> ConcHashTableBuilder<K, V, C2> {
        ConcHashTableBuilder {
            hash: self.hash,
            equal: self.equal,
            key_destroy: self.key_destroy,
            value_destroy: self.value_destroy,
            mode: self.mode,
            label: self.label,
            collector,
            initial_capacity: self.initial_capacity,
            reclaim: self.reclaim,
        }
    }

    /// Rounded up to a power of two, at least 2. Default: 32.
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Retired generations above which a resize reclaims on its own. `None` leaves
    /// reclamation to [`ConcHashTable::collect`] and to destruction.
    ///
    /// Default: `Some(8)`
    pub fn auto_reclaim_threshold(mut self, threshold: impl Into<Option<usize>>) -> Self {
        self.reclaim = self.reclaim.auto_reclaim_threshold(threshold);
        self
    }

    /// Prune registrations of dropped readers every `interval` reclamation cycles;
    /// `0` never prunes. Default: `16`
    pub fn cleanup_interval(mut self, interval: usize) -> Self {
        self.reclaim = self.reclaim.cleanup_interval(interval);
        self
    }

    /// # Errors
    ///
    /// [`TableError::AllocationFailed`] if the first generation cannot be allocated.
    pub fn try_build(self) -> Result<(ConcHashTable<K, V, C>, TableReaders<K, V, C>), TableError> {
        let capacity = self
            .initial_capacity
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or(TableError::AllocationFailed {
                capacity: self.initial_capacity,
            })?;

        let collector = StdArc::new(self.collector);
        let first = Generation::new(capacity, self.mode, &collector, self.label)?;
        let tombstone = first.tombstone();

        let keys = KeyOps {
            hash: self
                .hash
                .unwrap_or_else(|| Box::new(|key: K| direct_hash(key.to_word())) as HashFn<K>),
            equal: self.equal,
        };
        let shared = Arc::new(Shared {
            current: ProtectedPtr::new(first),
            keys,
            _values: PhantomData,
        });
        let (reclaimer, domain) = self.reclaim.build();

        let table = ConcHashTable {
            shared: shared.clone(),
            domain: domain.clone(),
            reclaimer,
            collector,
            mode: self.mode,
            label: self.label,
            tombstone,
            live: 0,
            tombstones: 0,
            threshold: resize_threshold(capacity),
            key_destroy: self.key_destroy,
            value_destroy: self.value_destroy,
        };
        Ok((table, TableReaders::new(shared, domain)))
    }

    /// # Panics
    ///
    /// Aborts through [`std::alloc::handle_alloc_error`] if the first generation
    /// cannot be allocated.
    pub fn build(self) -> (ConcHashTable<K, V, C>, TableReaders<K, V, C>) {
        self.try_build().unwrap_or_else(|err| err.raise())
    }
}

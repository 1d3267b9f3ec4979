use crate::collector::{Collector, NoopCollector};
use crate::generation::Lookup;
use crate::reclaim::{ReaderEpoch, ReclaimDomain};
use crate::sync::Arc;
use crate::table::Shared;
use crate::word::Word;

/// Factory for concurrent read views of one table.
///
/// `Clone + Send + Sync`: clone it into every reader thread, then call
/// [`register`](Self::register) once per thread.
///
/// 同一张表的并发只读视图工厂。克隆到每个读者线程，再在每个线程中调用一次 `register`。
pub struct TableReaders<K: Word, V: Word, C: Collector = NoopCollector> {
    shared: Arc<Shared<K, V, C>>,
    domain: ReclaimDomain,
}

impl<K: Word, V: Word, C: Collector> TableReaders<K, V, C> {
    pub(crate) fn new(shared: Arc<Shared<K, V, C>>, domain: ReclaimDomain) -> Self {
        TableReaders { shared, domain }
    }

    pub fn register(&self) -> TableReader<K, V, C> {
        TableReader {
            shared: self.shared.clone(),
            epoch: self.domain.register_reader(),
        }
    }
}

impl<K: Word, V: Word, C: Collector> Clone for TableReaders<K, V, C> {
    fn clone(&self) -> Self {
        TableReaders {
            shared: self.shared.clone(),
            domain: self.domain.clone(),
        }
    }
}

impl<K: Word, V: Word, C: Collector> std::fmt::Debug for TableReaders<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReaders").finish_non_exhaustive()
    }
}

/// A per-thread read view; lookups never block and never write the table.
///
/// `Send` but `!Sync`: move it into the thread that uses it.
///
/// 每线程的只读视图；查找从不阻塞，也从不写表。
pub struct TableReader<K: Word, V: Word, C: Collector = NoopCollector> {
    shared: Arc<Shared<K, V, C>>,
    epoch: ReaderEpoch,
}

impl<K: Word, V: Word, C: Collector> TableReader<K, V, C> {
    /// Find `key` and return the stored key with its value.
    ///
    /// Safe to run while the writer inserts, removes or resizes. Each attempt pins
    /// the current generation and probes it. The attempt is repeated when
    ///
    /// - the matching key is seen with a null value (removal in flight), or
    /// - the probe ends without a match but a newer generation was published in
    ///   the meantime (the key may have been inserted there).
    ///
    /// 查找 `key`，返回存储的键及其值。可与写入者的插入、删除、扩容并发执行。
    pub fn lookup(&self, key: K) -> Option<(K, V)> {
        if key.to_word() == 0 {
            return None;
        }
        let mixed = self.shared.keys.mixed(key);
        let matches = self.shared.keys.matcher(key);

        loop {
            let guard = self.epoch.pin();
            let generation = self.shared.current.load(&guard);

            match generation.find(mixed, &matches) {
                Lookup::Found { key, value } => {
                    // SAFETY: published cells hold words produced by `K` and `V`.
                    return Some(unsafe { (K::from_word(key), V::from_word(value)) });
                }
                Lookup::Retry => continue,
                Lookup::Absent => {
                    if self.shared.current.is_current(generation) {
                        return None;
                    }
                }
            }
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
}

impl<K: Word, V: Word, C: Collector> std::fmt::Debug for TableReader<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

//! A single-writer, multi-reader hash table for runtime metadata caches.
//!
//! [`ConcHashTable`] is an open-addressed table of pointer-sized keys and values
//! built for caches that are filled under one lock (or from one thread) and read
//! from everywhere:
//!
//! - **Lock-free reads.** A [`TableReader`] probes the current generation under an
//!   epoch pin and never blocks, even while the writer inserts, removes or grows.
//! - **Generation replacement.** Growth builds a new generation off to the side and
//!   publishes it with one pointer swap; the old one is freed by an epoch-based
//!   reclaimer once no reader can still be probing it.
//! - **Collector awareness.** A [`Collector`] bridge is told which cell arrays
//!   hold managed references ([`TrackingMode`]) and sees every store into them.
//!
//! ```
//! use conc_ghash::ConcHashTable;
//! use std::thread;
//!
//! let (mut table, readers) = ConcHashTable::<usize, usize>::new();
//! for key in 1..=100 {
//!     table.insert(key, key * 10);
//! }
//!
//! let reader = thread::spawn(move || {
//!     let view = readers.register();
//!     view.lookup_value(42)
//! });
//! table.remove(7);
//! assert_eq!(reader.join().unwrap(), Some(420));
//! ```
//!
//! 面向运行时元数据缓存的单写入者、多读者哈希表：无锁读取、整代替换扩容、感知垃圾回收器。

mod collector;
mod error;
mod generation;
mod hash;
mod reclaim;
mod sync;
mod table;
mod view;
mod word;

pub use collector::{
    Collector, NoopCollector, RootCells, RootDescriptor, RootLabel, TrackingMode,
    UNTRACKED_TOMBSTONE,
};
pub use error::TableError;
pub use hash::{direct_hash, mix_hash};
pub use table::{ConcHashTable, ConcHashTableBuilder};
pub use view::{TableReader, TableReaders};
pub use word::Word;

#[cfg(test)]
mod tests;

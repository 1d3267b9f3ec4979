use std::num::NonZeroUsize;

/// A pointer-sized reference that fits in one atomic table cell.
///
/// Word `0` is the null reference. Tables reject null keys and values, and reject a
/// key whose word equals the table's tombstone marker.
///
/// 可以放入一个原子单元的指针大小的引用。字 `0` 表示空引用。
pub trait Word: Copy + Send + Sync + 'static {
    fn to_word(self) -> usize;

    /// Rebuild a value from its word.
    ///
    /// # Safety
    ///
    /// `word` must have been returned by [`to_word`](Self::to_word) on a value of the
    /// same type that is still valid.
    unsafe fn from_word(word: usize) -> Self;
}

/// Every non-zero value is a valid key except `usize::MAX`, the tombstone marker of
/// untracked key arrays; inserting it fails with
/// [`TableError::ReservedKey`](crate::TableError::ReservedKey).
impl Word for usize {
    #[inline]
    fn to_word(self) -> usize {
        self
    }

    #[inline]
    unsafe fn from_word(word: usize) -> Self {
        word
    }
}

impl Word for NonZeroUsize {
    #[inline]
    fn to_word(self) -> usize {
        self.get()
    }

    #[inline]
    unsafe fn from_word(word: usize) -> Self {
        // SAFETY: produced by `to_word` on a `NonZeroUsize`.
        unsafe { NonZeroUsize::new_unchecked(word) }
    }
}

/// Runtime metadata is typically interned for the life of the process.
impl<T: Sync + 'static> Word for &'static T {
    #[inline]
    fn to_word(self) -> usize {
        self as *const T as usize
    }

    #[inline]
    unsafe fn from_word(word: usize) -> Self {
        // SAFETY: the word is the address of a `&'static T`.
        unsafe { &*(word as *const T) }
    }
}

//! Hash mixing and slot addressing.
//!
//! Power-of-two tables cluster badly on aligned inputs such as pointer-derived
//! hashes, so every caller hash goes through [`mix_hash`] before it is masked.

pub(crate) const INITIAL_CAPACITY: usize = 32;
pub(crate) const MIN_CAPACITY: usize = 2;
pub(crate) const LOAD_FACTOR: f32 = 0.75;
/// Must be a power of two.
pub(crate) const GROWTH_FACTOR: usize = 2;

/// Spread `hash` with two primes plus the hash itself.
///
/// Computed in signed 32-bit arithmetic with wraparound; the right shift is
/// arithmetic.
#[inline(always)]
pub fn mix_hash(hash: u32) -> u32 {
    let h = hash as i32;
    ((h.wrapping_mul(215_497) >> 16) ^ h.wrapping_mul(1_823_231).wrapping_add(h)) as u32
}

/// Hash of a word by its value, truncated to 32 bits.
#[inline]
pub fn direct_hash(word: usize) -> u32 {
    word as u32
}

/// Occupancy (live entries plus tombstones) at which a generation is replaced.
#[inline]
pub(crate) fn resize_threshold(capacity: usize) -> usize {
    (capacity as f32 * LOAD_FACTOR) as usize
}

/// Linear probe sequence over a power-of-two capacity.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Probe {
    pub(crate) index: usize,
    mask: usize,
}

impl Probe {
    #[inline]
    pub(crate) fn start(mixed: u32, capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two());
        let mask = capacity - 1;
        Probe {
            index: mixed as usize & mask,
            mask,
        }
    }

    #[inline]
    pub(crate) fn advance(&mut self) {
        self.index = (self.index + 1) & self.mask;
    }
}

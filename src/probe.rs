//! Probe geometry shared by the single-key tables.
//!
//! A table of `1 << bits` slots is addressed by multiplying a 32-bit key
//! hash with the golden-ratio constant and taking the top `bits` bits of the
//! product. The next `bits` bits, forced odd, become the probe step. An odd
//! step is coprime with a power-of-two size, so a probe sequence visits
//! every slot once before it repeats.

/// `2^32 / φ`, rounded to an odd value.
pub(crate) const GOLDEN_RATIO: u32 = 0x9e37_79b9;

/// Largest supported `bits`; keeps `shift` positive and slot indices in `u32`.
pub(crate) const MAX_BITS: u32 = 30;

/// Smallest supported `bits`. Four slots is the least size whose capacity
/// leaves an empty slot to terminate a probe.
pub(crate) const MIN_TABLE_BITS: u32 = 2;

/// One slot of an open-addressing table.
#[derive(Clone, Debug)]
pub(crate) enum Slot<T> {
    Empty,
    Tombstone,
    Occupied(T),
}

impl<T> Slot<T> {
    #[inline]
    pub(crate) fn as_occupied(&self) -> Option<&T> {
        match self {
            Slot::Occupied(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn as_occupied_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Occupied(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn into_occupied(self) -> Option<T> {
        match self {
            Slot::Occupied(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn is_tombstone(&self) -> bool {
        matches!(self, Slot::Tombstone)
    }
}

/// Allocate `len` empty slots.
pub(crate) fn empty_slots<T>(len: usize) -> Box<[Slot<T>]> {
    (0..len).map(|_| Slot::Empty).collect()
}

/// Size and growth threshold of a power-of-two table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Geometry {
    bits: u32,
}

impl Geometry {
    #[track_caller]
    pub(crate) fn with_bits(bits: u32) -> Self {
        assert!(
            (MIN_TABLE_BITS..=MAX_BITS).contains(&bits),
            "table size overflow: requested 2^bits slots outside supported range"
        );
        Self { bits }
    }

    /// Smallest geometry (not below `min_bits`) whose capacity holds `count` entries.
    pub(crate) fn for_count(count: usize, min_bits: u32) -> Self {
        let mut bits = min_bits;
        while Self::with_bits(bits).capacity() < count {
            bits += 1;
        }
        Self::with_bits(bits)
    }

    #[inline]
    pub(crate) fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        1usize << self.bits
    }

    /// Entries (live plus tombstones) allowed before the table must grow: 3/4 of the size.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        let size = self.size();
        size - size / 4
    }

    #[inline]
    pub(crate) fn doubled(&self) -> Self {
        Self::with_bits(self.bits + 1)
    }

    /// Start the probe sequence for `hash`.
    #[inline]
    pub(crate) fn probe(&self, hash: u32) -> Probe {
        let h = hash.wrapping_mul(GOLDEN_RATIO);
        let shift = 32 - self.bits;
        Probe {
            index: (h >> shift) as usize,
            step: ((h << self.bits) >> shift) as usize | 1,
            mask: self.size() - 1,
        }
    }
}

/// Endless double-hashing probe sequence; callers bound it with `take`.
#[derive(Clone, Debug)]
pub(crate) struct Probe {
    index: usize,
    step: usize,
    mask: usize,
}

impl Iterator for Probe {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let index = self.index;
        self.index = (self.index + self.step) & self.mask;
        Some(index)
    }
}

/// A bounded probe ran out without finding an empty slot. Only reachable
/// when the table's counts are wrong or `Hash`/`Eq` disagree with each other.
#[cold]
#[track_caller]
pub(crate) fn probe_overflow(probes: usize) -> ! {
    panic!("probe sequence exceeded {probes} slots: table invariant violated")
}

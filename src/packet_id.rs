//! Packet-identifier allocator.
//!
//! A fixed-size bitmap of `N` bits, one per possible in-flight message.
//! `acquire` returns the lowest clear bit's 1-based index (0 is the
//! protocol's sentinel "no packet identifier") and sets it; `release` clears
//! it. Both run under a single critical section, matching the single
//! fine-grained mutex spec.md §5 calls for.

use critical_section::Mutex;
use core::cell::RefCell;

/// Sentinel returned by [`PacketIdAllocator::acquire`] when the table is full.
pub const INVALID: u16 = 0;

struct Bitmap<const WORDS: usize> {
    words: [u32; WORDS],
    capacity: u16,
}

impl<const WORDS: usize> Bitmap<WORDS> {
    const fn new(capacity: u16) -> Self {
        Bitmap { words: [0u32; WORDS], capacity }
    }

    fn acquire(&mut self) -> u16 {
        for word_idx in 0..WORDS {
            let word = self.words[word_idx];
            if word == u32::MAX {
                continue;
            }
            for bit in 0..32u16 {
                let id = (word_idx as u16) * 32 + bit + 1;
                if id > self.capacity {
                    return INVALID;
                }
                if word & (1 << bit) == 0 {
                    self.words[word_idx] |= 1 << bit;
                    return id;
                }
            }
        }
        INVALID
    }

    fn release(&mut self, id: u16) {
        if id == INVALID || id > self.capacity {
            return;
        }
        let zero_based = (id - 1) as usize;
        let word_idx = zero_based / 32;
        let bit = zero_based % 32;
        self.words[word_idx] &= !(1 << bit);
    }

    fn is_set(&self, id: u16) -> bool {
        if id == INVALID || id > self.capacity {
            return false;
        }
        let zero_based = (id - 1) as usize;
        let word_idx = zero_based / 32;
        let bit = zero_based % 32;
        self.words[word_idx] & (1 << bit) != 0
    }
}

/// Allocates and releases 16-bit MQTT packet identifiers from a
/// fixed-capacity table sized for `MAX_IN_FLIGHT` concurrent messages.
///
/// `WORDS` must be `ceil(MAX_IN_FLIGHT / 32)`; this is a `const` arithmetic
/// the caller supplies because Rust's const generics cannot yet derive it
/// automatically from `MAX_IN_FLIGHT` alone.
pub struct PacketIdAllocator<const WORDS: usize> {
    bitmap: Mutex<RefCell<Bitmap<WORDS>>>,
}

impl<const WORDS: usize> PacketIdAllocator<WORDS> {
    /// Create an allocator with room for `max_in_flight` concurrent packet ids.
    pub const fn new(max_in_flight: u16) -> Self {
        PacketIdAllocator {
            bitmap: Mutex::new(RefCell::new(Bitmap::new(max_in_flight))),
        }
    }

    /// Allocate the lowest-numbered free packet id, or [`INVALID`] if the
    /// table is full.
    pub fn acquire(&self) -> u16 {
        critical_section::with(|cs| self.bitmap.borrow_ref_mut(cs).acquire())
    }

    /// Release a previously-acquired packet id. A no-op for [`INVALID`].
    pub fn release(&self, id: u16) {
        critical_section::with(|cs| self.bitmap.borrow_ref_mut(cs).release(id));
    }

    /// True iff `id` is currently allocated. Used by tests/invariant checks.
    pub fn is_allocated(&self, id: u16) -> bool {
        critical_section::with(|cs| self.bitmap.borrow_ref(cs).is_set(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_lowest_free_one_based() {
        let alloc: PacketIdAllocator<1> = PacketIdAllocator::new(8);
        assert_eq!(alloc.acquire(), 1);
        assert_eq!(alloc.acquire(), 2);
        alloc.release(1);
        assert_eq!(alloc.acquire(), 1);
    }

    #[test]
    fn acquire_fails_when_full() {
        let alloc: PacketIdAllocator<1> = PacketIdAllocator::new(3);
        assert_eq!(alloc.acquire(), 1);
        assert_eq!(alloc.acquire(), 2);
        assert_eq!(alloc.acquire(), 3);
        assert_eq!(alloc.acquire(), INVALID);
    }

    #[test]
    fn release_then_reacquire_round_trip() {
        let alloc: PacketIdAllocator<2> = PacketIdAllocator::new(40);
        let mut ids = heapless::Vec::<u16, 40>::new();
        for _ in 0..40 {
            ids.push(alloc.acquire()).unwrap();
        }
        assert_eq!(alloc.acquire(), INVALID);
        for &id in &ids {
            assert!(alloc.is_allocated(id));
            alloc.release(id);
            assert!(!alloc.is_allocated(id));
        }
        assert_eq!(alloc.acquire(), 1);
    }

    #[test]
    fn release_of_invalid_is_noop() {
        let alloc: PacketIdAllocator<1> = PacketIdAllocator::new(8);
        alloc.release(INVALID);
        assert_eq!(alloc.acquire(), 1);
    }
}

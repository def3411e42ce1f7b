/// Cursor over a fixed number of slots, advanced strictly modulo its capacity.
///
/// The cursor starts at slot 0 and every [`RingIndex::advance`] moves it one
/// slot forward before returning it, so the first advance yields slot 1.
#[derive(Debug, Clone)]
pub struct RingIndex {
    capacity: usize,
    cursor: usize,
}

impl RingIndex {
    /// Creates a ring of `capacity` slots. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            cursor: 0,
        }
    }

    /// Moves to the next slot and returns it.
    #[inline]
    pub fn advance(&mut self) -> usize {
        self.cursor = (self.cursor + 1) % self.capacity;
        self.cursor
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte offset of the current slot for a region of `stride`-sized slots.
    #[inline]
    pub fn offset(&self, stride: u64) -> u64 {
        self.cursor as u64 * stride
    }
}

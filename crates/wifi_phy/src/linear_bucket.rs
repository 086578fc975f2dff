/// Collects the subcarriers of one frame.
/// The capacity is set when the frame starts, and the allocation is kept between frames.
pub struct LinearBucket<T> {
    data: Vec<T>,
    length: usize,
}

impl<T> LinearBucket<T> {
    pub fn reset(&mut self) {
        self.length = 0;
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of items still missing before the frame is complete.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.length
    }

    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Items collected so far.
    pub fn iter(&self) -> &[T] {
        &self.data[..self.length]
    }
}

impl<T: Default + Copy> LinearBucket<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![T::default(); capacity],
            length: 0,
        }
    }

    /// Empties the bucket for a frame of `capacity` items.
    pub fn reset_with_capacity(&mut self, capacity: usize) {
        self.data.resize(capacity, T::default());
        self.length = 0;
    }

    /// Appends as much of `buf` as fits and returns how many items were taken.
    pub fn consume(&mut self, buf: &[T]) -> usize {
        let total_read = buf.len().min(self.remaining());
        let start = self.length;
        self.data[start..start+total_read].copy_from_slice(&buf[..total_read]);
        self.length += total_read;
        total_read
    }
}

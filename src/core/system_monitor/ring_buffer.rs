/// Fixed-capacity circular buffer for sparkline series.
///
/// Storage is allocated once in [`new`](Self::new); `append` never allocates
/// and overwrites the oldest value once the buffer is full. Not synchronized:
/// wrap it in a mutex to share it between threads.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Box<[Option<T>]>,
    /// Next slot to write.
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let slots = std::iter::repeat_with(|| None)
            .take(capacity.max(1))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn append(&mut self, value: T) {
        let capacity = self.slots.len();
        self.slots[self.head] = Some(value);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Values oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |offset| self.slots[(start + offset) % capacity].as_ref())
    }

    /// Most recently appended value.
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.slots.len();
        self.slots[(self.head + capacity - 1) % capacity].as_ref()
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the contents in chronological order.
    pub fn read(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

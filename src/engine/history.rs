//! Rolling log of visited symbols.
//!
//! Grows until it holds more than `capacity` entries, then resets to empty.

#[derive(Debug, Clone)]
pub struct ScanHistory {
    capacity: usize,
    entries: Vec<String>,
}

impl ScanHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Append a symbol; clear everything once the log exceeds capacity.
    pub fn push(&mut self, symbol: String) {
        self.entries.push(symbol);
        if self.entries.len() > self.capacity {
            self.entries.clear();
        }
    }

    /// Applies to the next push; current entries are kept.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

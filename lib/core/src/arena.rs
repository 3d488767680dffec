//! Per-task scoped memory.
//!
//! A [`Region`] is acquired when a partition task starts, bulk-reset between
//! rows whose transient bytes do not outlive the row, and dropped when the
//! task ends. Reset keeps the backing capacity, so steady-state row loops do
//! not allocate. Nothing borrowed from a region survives a reset.

#[derive(Debug, Default)]
pub struct Region {
    scratch: Vec<u8>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte buffer for encoding; emptied by [`Region::reset`].
    #[inline]
    pub fn scratch(&mut self) -> &mut Vec<u8> {
        &mut self.scratch
    }

    /// Empties the region, keeping its capacity.
    pub fn reset(&mut self) {
        self.scratch.clear();
    }
}

/// State owned by one partition task.
#[derive(Debug)]
pub struct TaskContext {
    partition_index: usize,
    region: Region,
}

impl TaskContext {
    pub fn new(partition_index: usize) -> Self {
        Self {
            partition_index,
            region: Region::new(),
        }
    }

    #[inline]
    pub fn partition_index(&self) -> usize {
        self.partition_index
    }

    #[inline]
    pub fn region(&mut self) -> &mut Region {
        &mut self.region
    }
}

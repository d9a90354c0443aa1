//! Bounded, thread-safe scratch buffer pools for hot encode/compress paths.
//!
//! Buffers larger than `max_buffer_size` are dropped on return instead of
//! being retained, so a single oversized request can't pin unbounded memory
//! in the pool.

use parking_lot::Mutex;

/// A pool of reusable `Vec<u8>` scratch buffers.
pub struct BytePool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max_buffer_size: usize,
    max_pooled: usize,
}

impl BytePool {
    pub fn new(max_buffer_size: usize, max_pooled: usize) -> Self {
        BytePool {
            buffers: Mutex::new(Vec::new()),
            max_buffer_size,
            max_pooled,
        }
    }

    /// Takes a buffer from the pool (cleared), or allocates a fresh one.
    pub fn take(&self) -> Vec<u8> {
        let mut buffers = self.buffers.lock();
        match buffers.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        }
    }

    /// Returns a buffer to the pool. Dropped instead of pooled if it exceeds
    /// `max_buffer_size` or the pool is already at capacity.
    pub fn give(&self, buf: Vec<u8>) {
        if buf.capacity() > self.max_buffer_size {
            return;
        }
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buf);
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A pool of reusable `Vec<u64>` scratch buffers, used for decompressed
/// adjacency lists and id batches.
pub struct U64Pool {
    buffers: Mutex<Vec<Vec<u64>>>,
    max_buffer_len: usize,
    max_pooled: usize,
}

impl U64Pool {
    pub fn new(max_buffer_len: usize, max_pooled: usize) -> Self {
        U64Pool {
            buffers: Mutex::new(Vec::new()),
            max_buffer_len,
            max_pooled,
        }
    }

    pub fn take(&self) -> Vec<u64> {
        let mut buffers = self.buffers.lock();
        match buffers.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => Vec::new(),
        }
    }

    pub fn give(&self, buf: Vec<u64>) {
        if buf.capacity() > self.max_buffer_len {
            return;
        }
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_pooled {
            buffers.push(buf);
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_pool_reuses_returned_buffers() {
        let pool = BytePool::new(1024, 4);
        let mut buf = pool.take();
        buf.extend_from_slice(b"hello");
        pool.give(buf);
        assert_eq!(pool.len(), 1);
        let reused = pool.take();
        assert!(reused.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn byte_pool_drops_oversized_buffers() {
        let pool = BytePool::new(4, 4);
        let buf = vec![0u8; 1024];
        pool.give(buf);
        assert!(pool.is_empty());
    }

    #[test]
    fn byte_pool_caps_retained_count() {
        let pool = BytePool::new(1024, 2);
        pool.give(Vec::new());
        pool.give(Vec::new());
        pool.give(Vec::new());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn u64_pool_reuses_returned_buffers() {
        let pool = U64Pool::new(256, 4);
        let mut buf = pool.take();
        buf.push(1);
        buf.push(2);
        pool.give(buf);
        let reused = pool.take();
        assert!(reused.is_empty());
    }
}

//! Free-list of byte buffers for response bodies

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Buffers larger than this are dropped instead of being kept for reuse
const MAX_RETAINED_CAPACITY: usize = 4 * 1024 * 1024;

/// Shared pool of reusable `Vec<u8>` buffers
#[derive(Clone, Debug)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
    max_buffers: usize,
}

impl BufferPool {
    /// Creates a pool that retains at most `max_buffers` idle buffers
    pub fn new(max_buffers: usize) -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::with_capacity(max_buffers))),
            max_buffers,
        }
    }

    /// Borrows an empty buffer; it goes back to the pool when dropped
    pub fn get(&self) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default();
        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    fn put(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_buffers {
                free.push(buf);
            }
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// A buffer borrowed from a `BufferPool`
#[derive(Debug)]
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_reused() {
        let pool = BufferPool::new(2);
        {
            let mut buf = pool.get();
            buf.extend_from_slice(b"hello");
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.get();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 5);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn test_pool_is_bounded() {
        let pool = BufferPool::new(1);
        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_large_buffers_are_not_retained() {
        let pool = BufferPool::new(1);
        {
            let mut buf = pool.get();
            buf.reserve(MAX_RETAINED_CAPACITY + 1);
        }
        assert_eq!(pool.idle(), 0);
    }
}

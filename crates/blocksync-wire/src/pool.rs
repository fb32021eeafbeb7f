//! Buffer pool for frame payloads.
//!
//! Payloads up to the wire cap are plausible, so every decode and encode
//! path borrows its scratch space from a bucketed pool instead of the
//! allocator. A checked-out buffer is owned by a [`PooledBuf`] guard and
//! flows back into its bucket when the guard drops, so the get/put pairing
//! holds on every exit path, including errors.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::block::MAX_BLOCK_SIZE;

/// Smallest bucket capacity (1 KiB)
const MIN_BUCKET: usize = 1 << 10;

/// Number of power-of-two buckets, 1 KiB through [`MAX_BLOCK_SIZE`]
const BUCKET_COUNT: usize = 15;

/// Buffers retained per bucket; beyond this, returned buffers are freed
const BUCKET_DEPTH: usize = 8;

/// Bucketed pool of byte buffers.
///
/// Requests larger than the largest bucket are allocated directly and not
/// retained on return.
pub struct BufferPool {
    buckets: Vec<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        for _ in 0..BUCKET_COUNT {
            buckets.push(Mutex::new(Vec::new()));
        }
        Self { buckets }
    }

    /// Check out an empty buffer with at least `capacity` bytes of room.
    pub fn get(self: &Arc<Self>, capacity: usize) -> PooledBuf {
        let bucket = bucket_index(capacity);
        let buf = match bucket {
            Some(i) => {
                let recycled = self.buckets[i].lock().pop();
                match recycled {
                    Some(mut buf) => {
                        buf.clear();
                        buf
                    }
                    None => Vec::with_capacity(bucket_capacity(i)),
                }
            }
            None => Vec::with_capacity(capacity),
        };
        PooledBuf {
            buf,
            bucket,
            pool: Arc::clone(self),
        }
    }

    fn put(&self, buf: Vec<u8>, bucket: usize) {
        let mut shelf = self.buckets[bucket].lock();
        if shelf.len() < BUCKET_DEPTH {
            shelf.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_capacity(index: usize) -> usize {
    MIN_BUCKET << index
}

fn bucket_index(capacity: usize) -> Option<usize> {
    if capacity > MAX_BLOCK_SIZE {
        return None;
    }
    let mut index = 0;
    while bucket_capacity(index) < capacity {
        index += 1;
    }
    Some(index)
}

/// An owned buffer on loan from a [`BufferPool`].
///
/// Dereferences to `Vec<u8>`; dropping it returns the buffer to its bucket.
pub struct PooledBuf {
    buf: Vec<u8>,
    bucket: Option<usize>,
    pool: Arc<BufferPool>,
}

impl std::ops::Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        if let Some(bucket) = self.bucket {
            let buf = std::mem::take(&mut self.buf);
            self.pool.put(buf, bucket);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_index_selection() {
        assert_eq!(bucket_index(0), Some(0));
        assert_eq!(bucket_index(1), Some(0));
        assert_eq!(bucket_index(MIN_BUCKET), Some(0));
        assert_eq!(bucket_index(MIN_BUCKET + 1), Some(1));
        assert_eq!(bucket_index(MAX_BLOCK_SIZE), Some(BUCKET_COUNT - 1));
        assert_eq!(bucket_index(MAX_BLOCK_SIZE + 1), None);
    }

    #[test]
    fn test_buffer_is_recycled() {
        let pool = Arc::new(BufferPool::new());
        let mut buf = pool.get(100);
        buf.extend_from_slice(b"hello");
        let ptr = buf.as_ptr();
        drop(buf);

        let again = pool.get(100);
        assert_eq!(again.as_ptr(), ptr);
        assert!(again.is_empty());
    }

    #[test]
    fn test_oversized_buffers_are_not_retained() {
        let pool = Arc::new(BufferPool::new());
        let big = pool.get(MAX_BLOCK_SIZE + 1);
        assert!(big.bucket.is_none());
        drop(big);
        for shelf in &pool.buckets {
            assert!(shelf.lock().is_empty());
        }
    }

    #[test]
    fn test_bucket_depth_is_bounded() {
        let pool = Arc::new(BufferPool::new());
        let bufs: Vec<_> = (0..BUCKET_DEPTH + 4).map(|_| pool.get(64)).collect();
        drop(bufs);
        assert_eq!(pool.buckets[0].lock().len(), BUCKET_DEPTH);
    }
}

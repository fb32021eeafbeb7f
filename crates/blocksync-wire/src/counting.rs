//! Counting stream adapters.
//!
//! The reader and writer halves of a connection are wrapped so that byte
//! totals and last-activity instants are observable from outside the I/O
//! tasks: `statistics()` reads the totals, the ping sender watches the last
//! write, and the receive watchdog watches the last read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Thread-safe view of one direction's byte total and last activity.
#[derive(Clone)]
pub struct ActivityHandle {
    total: Arc<AtomicU64>,
    last: Arc<Mutex<Instant>>,
}

impl ActivityHandle {
    fn new() -> Self {
        Self {
            total: Arc::new(AtomicU64::new(0)),
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Total bytes moved in this direction.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Instant of the most recent successful read or write.
    pub fn last(&self) -> Instant {
        *self.last.lock()
    }

    fn record(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
        *self.last.lock() = Instant::now();
    }
}

/// Reader half with byte accounting.
pub struct CountingReader<R> {
    inner: R,
    activity: ActivityHandle,
}

impl<R: AsyncRead + Unpin> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            activity: ActivityHandle::new(),
        }
    }

    pub fn activity(&self) -> ActivityHandle {
        self.activity.clone()
    }

    /// Read exactly `buf.len()` bytes, recording the activity.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.inner.read_exact(buf).await?;
        self.activity.record(buf.len() as u64);
        Ok(())
    }
}

/// Writer half with byte accounting.
pub struct CountingWriter<W> {
    inner: W,
    activity: ActivityHandle,
}

impl<W: AsyncWrite + Unpin> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            activity: ActivityHandle::new(),
        }
    }

    pub fn activity(&self) -> ActivityHandle {
        self.activity.clone()
    }

    /// Write the whole buffer and flush, recording the activity.
    pub async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(buf).await?;
        self.inner.flush().await?;
        self.activity.record(buf.len() as u64);
        Ok(())
    }
}

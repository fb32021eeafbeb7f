//! The model interface: callbacks from the engine into the host.
//!
//! The model is the application that consumes indexes and serves block
//! requests. The engine guarantees the callback order per connection:
//! `cluster_config` exactly once and first, then any number of the others,
//! then `closed` exactly once and last.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::device::DeviceId;
use crate::error::{ProtocolError, RequestError};
use crate::message::{ClusterConfig, FileDownloadProgressUpdate, FileInfo};

/// Host-side receiver of protocol events.
///
/// `request` may be slow; the engine calls it from a detached task so a
/// stalled model cannot block the multiplexed exchanges on the connection.
/// The other callbacks are invoked from the reader task directly.
#[async_trait]
pub trait Model: Send + Sync + 'static {
    /// An index was received from the peer device
    async fn index(&self, device: &DeviceId, folder: &str, files: Vec<FileInfo>);

    /// An index update was received from the peer device
    async fn index_update(&self, device: &DeviceId, folder: &str, files: Vec<FileInfo>);

    /// The peer requested a block of a file
    #[allow(clippy::too_many_arguments)]
    async fn request(
        &self,
        device: &DeviceId,
        folder: &str,
        name: &str,
        size: i32,
        offset: i64,
        hash: &[u8],
        weak_hash: u32,
        from_temporary: bool,
    ) -> Result<Box<dyn RequestResponse>, RequestError>;

    /// The peer announced its cluster configuration
    async fn cluster_config(&self, device: &DeviceId, config: ClusterConfig);

    /// The connection to the peer ended with the given error
    async fn closed(&self, device: &DeviceId, err: &ProtocolError);

    /// The peer reported download progress for files it is fetching
    async fn download_progress(
        &self,
        device: &DeviceId,
        folder: &str,
        updates: Vec<FileDownloadProgressUpdate>,
    );
}

/// A served block, handed from the model back to the engine.
///
/// The engine calls `close` exactly once, after the response frame has been
/// written to the transport. Until then the backing buffer must stay valid;
/// afterwards the model may reclaim or unpin it.
pub trait RequestResponse: Send + Sync {
    /// The block bytes. Cheap to call repeatedly.
    fn data(&self) -> Bytes;
    /// Release the backing buffer. Called once the bytes are on the wire.
    fn close(&self);
    /// Block until `close` has been called. Test synchronization aid.
    fn wait(&self);
}

/// Ready-made [`RequestResponse`] over an owned byte buffer.
pub struct BlockResponse {
    data: Bytes,
    closed: Mutex<bool>,
    cond: Condvar,
}

impl BlockResponse {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            closed: Mutex::new(false),
            cond: Condvar::new(),
        }
    }
}

impl RequestResponse for BlockResponse {
    fn data(&self) -> Bytes {
        self.data.clone()
    }

    fn close(&self) {
        let mut closed = self.closed.lock();
        *closed = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut closed = self.closed.lock();
        while !*closed {
            self.cond.wait(&mut closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_block_response_wait_unblocks_on_close() {
        let res = Arc::new(BlockResponse::new(vec![1u8, 2, 3]));
        assert_eq!(res.data(), Bytes::from_static(&[1, 2, 3]));

        let waiter = {
            let res = Arc::clone(&res);
            std::thread::spawn(move || res.wait())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        res.close();
        waiter.join().expect("Should join");
    }

    #[test]
    fn test_wait_after_close_returns_immediately() {
        let res = BlockResponse::new(Bytes::new());
        res.close();
        res.wait();
    }
}

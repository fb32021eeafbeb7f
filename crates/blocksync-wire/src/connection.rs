//! The per-peer connection engine.
//!
//! One `Connection` owns a duplex byte stream to a peer and multiplexes the
//! protocol over it with four long-lived tasks sharing a small set of
//! synchronized maps and channels:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Connection                                                  │
//! │  ├── reader task    frames in → state machine → dispatch     │
//! │  ├── writer task    send queue → frames out (FIFO)           │
//! │  ├── ping sender    keepalive when the write side idles      │
//! │  └── ping receiver  closes when the read side goes silent    │
//! │                                                              │
//! │  awaiting: request id → oneshot    (response correlation)    │
//! │  outbox:   mpsc of (message, completion)                     │
//! │  closed:   cancellation token      (one-shot close latch)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The send queue is the only serialization point for outbound frames; the
//! per-message completion signal it carries is what lets a block-serving
//! handler release its payload buffer only after transmission. Close runs
//! its body exactly once no matter how many tasks race into it: it fires
//! the latch, drains every pending request waiter, and notifies the model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::counting::{ActivityHandle, CountingReader, CountingWriter};
use crate::device::DeviceId;
use crate::error::{ErrorCode, ProtocolError, RequestError, Result};
use crate::frame::{FrameReader, FrameWriter, ReadOutcome};
use crate::message::{
    ClusterConfig, FileDownloadProgressUpdate, FileInfo, Index, IndexUpdate, Message, Ping,
    Request, Response,
};
use crate::model::Model;
use crate::pool::BufferPool;
use crate::validate::{check_file_info_consistency, check_filename};

pub use crate::frame::CompressionPolicy;

/// How often we make sure to have sent a message, by triggering pings if
/// necessary. The effective ping interval lands between half and all of
/// this.
pub const PING_SEND_INTERVAL: Duration = Duration::from_secs(90);

/// The longest we wait for any message from the peer before closing the
/// connection with a timeout.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// Per-connection tuning.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub compression: CompressionPolicy,
    pub ping_send_interval: Duration,
    pub receive_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            compression: CompressionPolicy::default(),
            ping_send_interval: PING_SEND_INTERVAL,
            receive_timeout: RECEIVE_TIMEOUT,
        }
    }
}

/// Byte totals for one connection at a point in time.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub at: DateTime<Utc>,
    pub in_bytes_total: u64,
    pub out_bytes_total: u64,
}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Ready,
}

struct AsyncResult {
    data: Bytes,
    err: Option<RequestError>,
}

struct AsyncMessage {
    msg: Message,
    /// Fires (or drops) once the writer is done with the message,
    /// successfully or not.
    done: Option<oneshot::Sender<()>>,
}

/// Handles taken by `start()` and moved into the I/O tasks.
struct Io {
    frames_in: FrameReader<BoxReader>,
    frames_out: FrameWriter<BoxWriter>,
    outbox_rx: mpsc::Receiver<AsyncMessage>,
}

/// A live protocol session with one peer over one duplex stream.
pub struct Connection {
    shared: Arc<Shared>,
    io: parking_lot::Mutex<Option<Io>>,
}

struct Shared {
    id: DeviceId,
    name: String,
    model: Arc<dyn Model>,

    awaiting: parking_lot::Mutex<HashMap<u32, oneshot::Sender<AsyncResult>>>,
    next_id: parking_lot::Mutex<u32>,

    /// Serializes index emissions so two producers cannot interleave their
    /// closed-check and enqueue. Held across the outbox send; the send
    /// itself observes the close latch, so this cannot deadlock after close.
    index_lock: tokio::sync::Mutex<()>,

    outbox: mpsc::Sender<AsyncMessage>,
    closed: CancellationToken,
    close_ran: AtomicBool,

    read_activity: ActivityHandle,
    write_activity: ActivityHandle,
    config: ConnectionConfig,
}

impl Connection {
    /// Wrap a verified duplex stream to `id` in a protocol session.
    ///
    /// Nothing happens until [`start`](Self::start) is called.
    pub fn new<R, W>(
        id: DeviceId,
        reader: R,
        writer: W,
        model: Arc<dyn Model>,
        name: impl Into<String>,
        config: ConnectionConfig,
    ) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pool = Arc::new(BufferPool::new());
        let counting_reader = CountingReader::new(Box::new(reader) as BoxReader);
        let counting_writer = CountingWriter::new(Box::new(writer) as BoxWriter);
        let read_activity = counting_reader.activity();
        let write_activity = counting_writer.activity();
        let (outbox_tx, outbox_rx) = mpsc::channel(1);

        let shared = Arc::new(Shared {
            id,
            name: name.into(),
            model,
            awaiting: parking_lot::Mutex::new(HashMap::new()),
            next_id: parking_lot::Mutex::new(0),
            index_lock: tokio::sync::Mutex::new(()),
            outbox: outbox_tx,
            closed: CancellationToken::new(),
            close_ran: AtomicBool::new(false),
            read_activity,
            write_activity,
            config,
        });
        let io = Io {
            frames_in: FrameReader::new(counting_reader, Arc::clone(&pool)),
            frames_out: FrameWriter::new(counting_writer, pool, config.compression),
            outbox_rx,
        };

        Self {
            shared,
            io: parking_lot::Mutex::new(Some(io)),
        }
    }

    /// Spawn the reader, writer and liveness tasks. Must be called exactly
    /// once after creating the connection.
    pub fn start(&self) {
        let Some(io) = self.io.lock().take() else {
            warn!(device = %self.shared.id, "start() called more than once, ignoring");
            return;
        };
        tokio::spawn(Shared::reader_loop(
            Arc::clone(&self.shared),
            io.frames_in,
        ));
        tokio::spawn(Shared::writer_loop(
            Arc::clone(&self.shared),
            io.frames_out,
            io.outbox_rx,
        ));
        tokio::spawn(Shared::ping_sender(Arc::clone(&self.shared)));
        tokio::spawn(Shared::ping_receiver(Arc::clone(&self.shared)));
    }

    pub fn id(&self) -> &DeviceId {
        &self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Send the full index of a folder to the peer.
    pub async fn index(&self, folder: &str, files: Vec<FileInfo>) -> Result<()> {
        self.shared
            .send_index(Message::Index(Index {
                folder: folder.to_string(),
                files,
            }))
            .await
    }

    /// Send an index delta for a folder to the peer.
    pub async fn index_update(&self, folder: &str, files: Vec<FileInfo>) -> Result<()> {
        self.shared
            .send_index(Message::IndexUpdate(IndexUpdate {
                folder: folder.to_string(),
                files,
            }))
            .await
    }

    /// Fetch a block from the peer, blocking until the matching response
    /// arrives or the connection closes.
    #[allow(clippy::too_many_arguments)]
    pub async fn request(
        &self,
        folder: &str,
        name: &str,
        offset: i64,
        size: i32,
        hash: Vec<u8>,
        weak_hash: u32,
        from_temporary: bool,
    ) -> Result<Bytes> {
        self.shared
            .request(folder, name, offset, size, hash, weak_hash, from_temporary)
            .await
    }

    /// Send our cluster configuration to the peer.
    pub async fn cluster_config(&self, config: ClusterConfig) {
        self.shared.send(Message::ClusterConfig(config), None).await;
    }

    /// Send progress updates for files we are currently downloading.
    pub async fn download_progress(
        &self,
        folder: &str,
        updates: Vec<FileDownloadProgressUpdate>,
    ) {
        self.shared
            .send(
                Message::DownloadProgress(crate::message::DownloadProgress {
                    folder: folder.to_string(),
                    updates,
                }),
                None,
            )
            .await;
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            at: Utc::now(),
            in_bytes_total: self.shared.read_activity.total(),
            out_bytes_total: self.shared.write_activity.total(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }
}

impl Shared {
    /// Enqueue a message for the writer. Returns false if the connection is
    /// (or becomes) closed instead; the completion signal, if any, is
    /// released either way.
    async fn send(&self, msg: Message, done: Option<oneshot::Sender<()>>) -> bool {
        tokio::select! {
            sent = self.outbox.send(AsyncMessage { msg, done }) => sent.is_ok(),
            _ = self.closed.cancelled() => false,
        }
    }

    async fn send_index(&self, msg: Message) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(ProtocolError::Closed);
        }
        let _serialized = self.index_lock.lock().await;
        if self.send(msg, None).await {
            Ok(())
        } else {
            Err(ProtocolError::Closed)
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn request(
        &self,
        folder: &str,
        name: &str,
        offset: i64,
        size: i32,
        hash: Vec<u8>,
        weak_hash: u32,
        from_temporary: bool,
    ) -> Result<Bytes> {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next = next.wrapping_add(1);
            id
        };

        let response = {
            let mut awaiting = self.awaiting.lock();
            if awaiting.contains_key(&id) {
                // The 32-bit counter wrapped onto a request that is still in
                // flight. That is a bug, not an overflow to paper over.
                panic!("request id {id} already in flight");
            }
            let (tx, rx) = oneshot::channel();
            awaiting.insert(id, tx);
            rx
        };

        let sent = self
            .send(
                Message::Request(Request {
                    id,
                    folder: folder.to_string(),
                    name: name.to_string(),
                    offset,
                    size,
                    hash,
                    weak_hash,
                    from_temporary,
                }),
                None,
            )
            .await;
        if !sent {
            return Err(ProtocolError::Closed);
        }

        match response.await {
            Ok(result) => match result.err {
                Some(err) => Err(ProtocolError::Request(err)),
                None => Ok(result.data),
            },
            // The waiter channel was dropped by close without a value.
            Err(_) => Err(ProtocolError::Closed),
        }
    }

    async fn reader_loop(self: Arc<Self>, mut frames: FrameReader<BoxReader>) {
        let err = self.run_reader(&mut frames).await;
        self.close(err).await;
    }

    async fn run_reader(
        self: &Arc<Self>,
        frames: &mut FrameReader<BoxReader>,
    ) -> ProtocolError {
        let mut state = State::Initial;
        loop {
            let outcome = tokio::select! {
                _ = self.closed.cancelled() => return ProtocolError::Closed,
                outcome = frames.read_message() => match outcome {
                    Ok(outcome) => outcome,
                    Err(err) => return err,
                },
            };
            let msg = match outcome {
                // Unknown message types are skipped, for future extensibility.
                ReadOutcome::Skipped => continue,
                ReadOutcome::Message(msg) => msg,
            };
            if let Err(err) = self.dispatch(&mut state, msg).await {
                return err;
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, state: &mut State, msg: Message) -> Result<()> {
        match msg {
            Message::ClusterConfig(config) => {
                debug!(device = %self.id, "read ClusterConfig message");
                if *state != State::Initial {
                    return Err(ProtocolError::Protocol(format!(
                        "cluster config message in state {state:?}"
                    )));
                }
                self.model.cluster_config(&self.id, config).await;
                *state = State::Ready;
            }

            Message::Index(index) => {
                debug!(device = %self.id, folder = %index.folder, files = index.files.len(), "read Index message");
                if *state != State::Ready {
                    return Err(ProtocolError::Protocol(format!(
                        "index message in state {state:?}"
                    )));
                }
                check_index(&index.files, "index")?;
                self.model.index(&self.id, &index.folder, index.files).await;
            }

            Message::IndexUpdate(update) => {
                debug!(device = %self.id, folder = %update.folder, files = update.files.len(), "read IndexUpdate message");
                if *state != State::Ready {
                    return Err(ProtocolError::Protocol(format!(
                        "index update message in state {state:?}"
                    )));
                }
                check_index(&update.files, "index update")?;
                self.model
                    .index_update(&self.id, &update.folder, update.files)
                    .await;
            }

            Message::Request(req) => {
                debug!(device = %self.id, id = req.id, name = %req.name, "read Request message");
                if *state != State::Ready {
                    return Err(ProtocolError::Protocol(format!(
                        "request message in state {state:?}"
                    )));
                }
                if let Err(err) = check_filename(&req.name) {
                    return Err(ProtocolError::Protocol(format!(
                        "request: {:?}: {err}",
                        req.name
                    )));
                }
                // The model may be slow; a detached handler keeps the reader
                // free to serve other multiplexed exchanges.
                let shared = Arc::clone(self);
                tokio::spawn(async move { shared.handle_request(req).await });
            }

            Message::Response(resp) => {
                trace!(device = %self.id, id = resp.id, "read Response message");
                if *state != State::Ready {
                    return Err(ProtocolError::Protocol(format!(
                        "response message in state {state:?}"
                    )));
                }
                self.handle_response(resp);
            }

            Message::DownloadProgress(progress) => {
                if *state != State::Ready {
                    return Err(ProtocolError::Protocol(format!(
                        "download progress message in state {state:?}"
                    )));
                }
                self.model
                    .download_progress(&self.id, &progress.folder, progress.updates)
                    .await;
            }

            Message::Ping(_) => {
                trace!(device = %self.id, "read Ping message");
                if *state != State::Ready {
                    return Err(ProtocolError::Protocol(format!(
                        "ping message in state {state:?}"
                    )));
                }
            }

            Message::Close(close) => {
                debug!(device = %self.id, reason = %close.reason, "read Close message");
                return Err(ProtocolError::Remote(close.reason));
            }
        }
        Ok(())
    }

    async fn handle_request(self: Arc<Self>, req: Request) {
        let served = self
            .model
            .request(
                &self.id,
                &req.folder,
                &req.name,
                req.size,
                req.offset,
                &req.hash,
                req.weak_hash,
                req.from_temporary,
            )
            .await;

        match served {
            Err(err) => {
                self.send(
                    Message::Response(Response {
                        id: req.id,
                        data: Bytes::new(),
                        code: err.code(),
                    }),
                    None,
                )
                .await;
            }
            Ok(block) => {
                let (done_tx, done_rx) = oneshot::channel();
                self.send(
                    Message::Response(Response {
                        id: req.id,
                        data: block.data(),
                        code: ErrorCode::NoError,
                    }),
                    Some(done_tx),
                )
                .await;
                // The model's buffer may only be reclaimed once the frame
                // has actually been written (or the write has failed).
                let _ = done_rx.await;
                block.close();
            }
        }
    }

    fn handle_response(&self, resp: Response) {
        let waiter = self.awaiting.lock().remove(&resp.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(AsyncResult {
                    data: resp.data,
                    err: resp.code.to_error(),
                });
            }
            // The original waiter may already have been released by close.
            None => debug!(device = %self.id, id = resp.id, "dropping response for unknown request id"),
        }
    }

    async fn writer_loop(
        self: Arc<Self>,
        mut frames: FrameWriter<BoxWriter>,
        mut outbox: mpsc::Receiver<AsyncMessage>,
    ) {
        loop {
            let item = tokio::select! {
                item = outbox.recv() => item,
                _ = self.closed.cancelled() => return,
            };
            let Some(AsyncMessage { msg, done }) = item else {
                return;
            };
            let result = frames.write_message(&msg).await;
            if let Some(done) = done {
                let _ = done.send(());
            }
            if let Err(err) = result {
                self.close(err).await;
                return;
            }
        }
    }

    /// Sends a ping when the write side has been idle for at least half the
    /// ping interval.
    async fn ping_sender(self: Arc<Self>) {
        let half = self.config.ping_send_interval / 2;
        let mut ticker = tokio::time::interval(half);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let idle = self.write_activity.last().elapsed();
                    if idle < half {
                        trace!(device = %self.id, ?idle, "ping skipped after write");
                        continue;
                    }
                    debug!(device = %self.id, ?idle, "sending ping");
                    self.send(Message::Ping(Ping), None).await;
                }
                _ = self.closed.cancelled() => return,
            }
        }
    }

    /// Closes the connection when nothing has been received for the full
    /// receive timeout. Any message counts, but we expect pings in the
    /// absence of other traffic.
    async fn ping_receiver(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.receive_timeout / 2);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let idle = self.read_activity.last().elapsed();
                    if idle > self.config.receive_timeout {
                        debug!(device = %self.id, ?idle, "receive timeout");
                        self.close(ProtocolError::Timeout).await;
                        return;
                    }
                    trace!(device = %self.id, ?idle, "last read within limits");
                }
                _ = self.closed.cancelled() => return,
            }
        }
    }

    /// Terminate the connection. Idempotent; the body runs exactly once.
    async fn close(&self, err: ProtocolError) {
        if self.close_ran.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(device = %self.id, name = %self.name, error = %err, "closing connection");

        self.closed.cancel();

        let drained: Vec<_> = {
            let mut awaiting = self.awaiting.lock();
            awaiting.drain().map(|(_, waiter)| waiter).collect()
        };
        // Dropping the senders wakes every pending request with "closed".
        drop(drained);

        self.model.closed(&self.id, &err).await;
    }
}

fn check_index(files: &[FileInfo], context: &str) -> Result<()> {
    for f in files {
        if let Err(err) = check_file_info_consistency(f) {
            return Err(ProtocolError::Protocol(format!(
                "{context}: {:?}: {err}",
                f.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.ping_send_interval, PING_SEND_INTERVAL);
        assert_eq!(config.receive_timeout, RECEIVE_TIMEOUT);
        assert_eq!(config.compression, CompressionPolicy::Metadata);
    }

    #[test]
    fn test_check_index_names_the_offender() {
        let bad = FileInfo {
            name: "x".to_string(),
            file_type: crate::message::FileType::Directory,
            size: 0,
            permissions: 0,
            modified: 0,
            deleted: false,
            invalid: false,
            no_permissions: false,
            version: crate::message::Vector::default(),
            sequence: 0,
            blocks: vec![crate::message::BlockInfo {
                offset: 0,
                size: 1,
                hash: vec![],
                weak_hash: 0,
            }],
            symlink_target: String::new(),
            local_flags: 0,
        };
        let err = check_index(&[bad], "index").expect_err("Should fail");
        let shown = format!("{err}");
        assert!(shown.contains("index"), "{shown}");
        assert!(shown.contains("\"x\""), "{shown}");
    }
}

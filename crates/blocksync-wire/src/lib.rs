//! Peer-to-peer synchronization wire protocol engine.
//!
//! This crate connects two devices over any bidirectional byte stream and
//! multiplexes a small set of control and data messages between them. It
//! owns framing, header and payload decoding, optional per-message LZ4
//! compression, request/response correlation, liveness supervision, and the
//! state machine that gates which messages are legal at which time.
//!
//! ## Overview
//!
//! ```text
//! bytes → FrameReader → typed Message → reader task ─┬→ model callback
//!                                                    └→ request table
//! model responses, local sends → send queue → writer task → FrameWriter → bytes
//! ```
//!
//! The first inbound message must be a [`ClusterConfig`]; everything else is
//! legal only afterwards. Any protocol, codec or transport error tears the
//! connection down through a one-shot close that wakes every in-flight
//! request exactly once and hands the error to [`Model::closed`].
//!
//! Transport establishment, identity verification, persistence and
//! reconnection are the host's business: the engine takes an already
//! verified stream and terminates on the first error.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use blocksync_wire::{Connection, ConnectionConfig, DeviceId};
//!
//! let (reader, writer) = establish_transport().await?;
//! let conn = Arc::new(Connection::new(
//!     DeviceId::from_bytes(peer_identity),
//!     reader,
//!     writer,
//!     Arc::new(model),
//!     "peer at 192.0.2.1",
//!     ConnectionConfig::default(),
//! ));
//! conn.start();
//!
//! conn.cluster_config(my_cluster_config).await;
//! let block = conn
//!     .request("photos", "2024/cat.jpg", 0, 131072, hash, 0, false)
//!     .await?;
//! ```

pub mod block;
mod compress;
pub mod connection;
pub mod counting;
pub mod device;
pub mod error;
pub mod frame;
pub mod message;
pub mod model;
pub mod pool;
pub mod validate;

// Re-exports
pub use block::{block_size, BLOCK_SIZES, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use connection::{
    Connection, ConnectionConfig, Statistics, PING_SEND_INTERVAL, RECEIVE_TIMEOUT,
};
pub use device::DeviceId;
pub use error::{ErrorCode, ProtocolError, RequestError, Result};
pub use frame::{CompressionPolicy, FrameReader, FrameWriter, ReadOutcome, MAX_MESSAGE_LEN};
pub use message::{
    BlockInfo, ClusterConfig, Close, Counter, DownloadProgress, FileDownloadProgressUpdate,
    FileInfo, FileType, Folder, FolderDevice, Index, IndexUpdate, Message, Ping, Request,
    Response, UpdateType, Vector, COMPRESSION_THRESHOLD,
};
pub use model::{BlockResponse, Model, RequestResponse};
pub use validate::{check_file_info_consistency, check_filename, ValidationError};

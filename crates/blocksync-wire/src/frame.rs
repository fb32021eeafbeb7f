//! Frame-level encoding and decoding.
//!
//! Every frame on the wire is two length-prefixed regions, all integers
//! big-endian:
//!
//! ```text
//! [u16 header length] [header] [u32 message length] [payload]
//! ```
//!
//! The header is an encoded [`Header`] carrying the payload's message type
//! and compression. The payload is the encoded typed message, optionally
//! LZ4-compressed (see [`crate::compress`]). Frames whose header names a
//! message type we do not know are read fully and skipped, so the type
//! space can grow without breaking older peers. Unknown compression values,
//! bad lengths and payload decode failures are fatal.

use std::sync::Arc;

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::compress::{lz4_compress, lz4_decompress};
use crate::counting::{CountingReader, CountingWriter};
use crate::error::{ProtocolError, Result};
use crate::message::{
    Compression, Header, Message, MessageType, WireMessage, COMPRESSION_THRESHOLD,
};
use crate::pool::BufferPool;

/// The largest payload allowed on the wire (500 MB).
pub const MAX_MESSAGE_LEN: usize = 500 * 1000 * 1000;

/// When outbound frames are compressed.
///
/// Receivers always honor the per-frame compression flag regardless of
/// their local policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// Never compress
    Never,
    /// Compress metadata messages above [`COMPRESSION_THRESHOLD`], but not
    /// Response payloads, which tend to be incompressible block data
    #[default]
    Metadata,
    /// Compress any message above [`COMPRESSION_THRESHOLD`]
    Always,
}

impl CompressionPolicy {
    pub(crate) fn should_compress(self, msg: &Message) -> bool {
        match self {
            CompressionPolicy::Never => false,
            CompressionPolicy::Always => msg.size() >= COMPRESSION_THRESHOLD,
            CompressionPolicy::Metadata => {
                !matches!(msg, Message::Response(_)) && msg.size() >= COMPRESSION_THRESHOLD
            }
        }
    }
}

/// One successfully read frame.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A known message, decoded
    Message(Message),
    /// A frame of unknown type, read fully and dropped
    Skipped,
}

/// Reads frames from the connection's counting reader.
pub struct FrameReader<R> {
    reader: CountingReader<R>,
    pool: Arc<BufferPool>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: CountingReader<R>, pool: Arc<BufferPool>) -> Self {
        Self { reader, pool }
    }

    /// Read one frame.
    pub async fn read_message(&mut self) -> Result<ReadOutcome> {
        let hdr = self.read_header().await?;

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).await?;
        let msg_len = i32::from_be_bytes(len_buf);
        if msg_len < 0 {
            return Err(ProtocolError::Protocol(format!(
                "negative message length {msg_len}"
            )));
        }
        let msg_len = msg_len as usize;
        if msg_len > MAX_MESSAGE_LEN {
            return Err(ProtocolError::Protocol(format!(
                "message length {msg_len} exceeds wire cap"
            )));
        }

        let mut buf = self.pool.get(msg_len);
        buf.resize(msg_len, 0);
        self.reader.read_exact(&mut buf).await?;

        let payload = match hdr.compression {
            Compression::None => buf,
            Compression::Lz4 => {
                let decompressed = lz4_decompress(&buf, &self.pool)?;
                drop(buf);
                decompressed
            }
        };

        let Some(msg_type) = MessageType::from_u8(hdr.msg_type) else {
            debug!(msg_type = hdr.msg_type, len = msg_len, "skipping frame of unknown type");
            return Ok(ReadOutcome::Skipped);
        };

        let mut slice: &[u8] = &payload;
        let msg = Message::decode(msg_type, &mut slice)?;
        if !slice.is_empty() {
            return Err(ProtocolError::Codec(format!(
                "{} bytes trailing after {msg_type:?} payload",
                slice.len()
            )));
        }
        trace!(?msg_type, len = msg_len, "read frame");
        Ok(ReadOutcome::Message(msg))
    }

    async fn read_header(&mut self) -> Result<Header> {
        let mut len_buf = [0u8; 2];
        self.reader.read_exact(&mut len_buf).await?;
        let hdr_len = i16::from_be_bytes(len_buf);
        if hdr_len < 0 {
            return Err(ProtocolError::Protocol(format!(
                "negative header length {hdr_len}"
            )));
        }

        let mut buf = self.pool.get(hdr_len as usize);
        buf.resize(hdr_len as usize, 0);
        self.reader.read_exact(&mut buf).await?;

        // Trailing header bytes are tolerated: a newer peer may extend the
        // header, and the two fields we understand come first.
        let mut slice: &[u8] = &buf;
        Header::decode(&mut slice)
    }
}

/// Writes frames to the connection's counting writer.
pub struct FrameWriter<W> {
    writer: CountingWriter<W>,
    pool: Arc<BufferPool>,
    compression: CompressionPolicy,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: CountingWriter<W>, pool: Arc<BufferPool>, compression: CompressionPolicy) -> Self {
        Self {
            writer,
            pool,
            compression,
        }
    }

    /// Encode and write one frame, compressing per policy.
    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        if self.compression.should_compress(msg) {
            self.write_compressed(msg).await
        } else {
            self.write_uncompressed(msg).await
        }
    }

    async fn write_uncompressed(&mut self, msg: &Message) -> Result<()> {
        let hdr = Header {
            msg_type: msg.msg_type() as u8,
            compression: Compression::None,
        };
        let size = msg.size();
        let total = 2 + hdr.size() + 4 + size;

        let mut buf = self.pool.get(total);
        buf.put_u16(hdr.size() as u16);
        hdr.encode_to(&mut buf);
        buf.put_u32(size as u32);
        msg.encode_to(&mut buf);
        debug_assert_eq!(buf.len(), total);

        self.writer.write_all(&buf).await?;
        trace!(msg_type = ?msg.msg_type(), total, payload = size, "wrote frame");
        Ok(())
    }

    async fn write_compressed(&mut self, msg: &Message) -> Result<()> {
        let size = msg.size();
        let mut plain = self.pool.get(size);
        msg.encode_to(&mut plain);

        let compressed = lz4_compress(&plain, &self.pool)?;
        drop(plain);
        let compressed_len = compressed.len();

        let hdr = Header {
            msg_type: msg.msg_type() as u8,
            compression: Compression::Lz4,
        };
        let total = 2 + hdr.size() + 4 + compressed_len;

        let mut buf = self.pool.get(total);
        buf.put_u16(hdr.size() as u16);
        hdr.encode_to(&mut buf);
        buf.put_u32(compressed_len as u32);
        buf.extend_from_slice(&compressed);
        drop(compressed);
        debug_assert_eq!(buf.len(), total);

        self.writer.write_all(&buf).await?;
        trace!(
            msg_type = ?msg.msg_type(),
            total,
            payload = compressed_len,
            uncompressed = size,
            "wrote compressed frame"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Close, Ping, Request, Response};
    use bytes::Bytes;
    use tokio::io::AsyncWriteExt;

    fn pool() -> Arc<BufferPool> {
        Arc::new(BufferPool::new())
    }

    fn pair(
        compression: CompressionPolicy,
    ) -> (
        FrameWriter<tokio::io::DuplexStream>,
        FrameReader<tokio::io::DuplexStream>,
    ) {
        let (near, far) = tokio::io::duplex(4 << 20);
        let writer = FrameWriter::new(CountingWriter::new(near), pool(), compression);
        let reader = FrameReader::new(CountingReader::new(far), pool());
        (writer, reader)
    }

    fn sample_request() -> Message {
        Message::Request(Request {
            id: 9,
            folder: "default".to_string(),
            name: "a/b.txt".to_string(),
            offset: 0,
            size: 1024,
            hash: vec![0x42; 32],
            weak_hash: 1,
            from_temporary: false,
        })
    }

    async fn round_trip(policy: CompressionPolicy, msg: Message) {
        let (mut writer, mut reader) = pair(policy);
        writer.write_message(&msg).await.expect("Should write");
        match reader.read_message().await.expect("Should read") {
            ReadOutcome::Message(decoded) => assert_eq!(decoded, msg),
            ReadOutcome::Skipped => panic!("frame should not be skipped"),
        }
    }

    fn all_variants() -> Vec<Message> {
        use crate::device::DeviceId;
        use crate::message::{
            BlockInfo, ClusterConfig, Counter, DownloadProgress, FileDownloadProgressUpdate,
            FileInfo, FileType, Folder, FolderDevice, Index, IndexUpdate, UpdateType, Vector,
        };

        let file = FileInfo {
            name: "docs/readme.md".to_string(),
            file_type: FileType::File,
            size: 4096,
            permissions: 0o644,
            modified: 1_700_000_000,
            deleted: false,
            invalid: false,
            no_permissions: false,
            version: Vector {
                counters: vec![Counter { id: 1, value: 3 }],
            },
            sequence: 11,
            blocks: vec![BlockInfo {
                offset: 0,
                size: 4096,
                hash: vec![0xcd; 32],
                weak_hash: 7,
            }],
            symlink_target: String::new(),
            local_flags: 0,
        };
        vec![
            Message::ClusterConfig(ClusterConfig {
                folders: vec![Folder {
                    id: "default".to_string(),
                    label: "Default".to_string(),
                    flags: 0,
                    devices: vec![FolderDevice {
                        id: DeviceId::from_bytes([9u8; 32]),
                        flags: 0,
                        max_sequence: 0,
                    }],
                }],
            }),
            Message::Index(Index {
                folder: "default".to_string(),
                files: vec![file.clone()],
            }),
            Message::IndexUpdate(IndexUpdate {
                folder: "default".to_string(),
                files: vec![file],
            }),
            sample_request(),
            Message::Response(Response {
                id: 9,
                data: Bytes::from(vec![0x42; 2048]),
                code: crate::error::ErrorCode::NoError,
            }),
            Message::DownloadProgress(DownloadProgress {
                folder: "default".to_string(),
                updates: vec![FileDownloadProgressUpdate {
                    update_type: UpdateType::Forget,
                    name: "docs/readme.md".to_string(),
                    version: Vector::default(),
                    block_indexes: vec![2, 3],
                }],
            }),
            Message::Ping(Ping),
            Message::Close(Close {
                reason: "bye".to_string(),
            }),
        ]
    }

    #[tokio::test]
    async fn test_round_trip_all_variants_uncompressed() {
        for msg in all_variants() {
            round_trip(CompressionPolicy::Never, msg).await;
        }
    }

    #[tokio::test]
    async fn test_round_trip_all_variants_compressed() {
        for msg in all_variants() {
            round_trip(CompressionPolicy::Always, msg).await;
        }
    }

    #[tokio::test]
    async fn test_round_trip_small_message_stays_uncompressed() {
        // Below the threshold even Always leaves the payload alone.
        round_trip(CompressionPolicy::Always, Message::Ping(Ping)).await;
    }

    #[tokio::test]
    async fn test_metadata_policy_skips_response_payloads() {
        let big = Message::Response(Response {
            id: 1,
            data: Bytes::from(vec![0u8; 4096]),
            code: crate::error::ErrorCode::NoError,
        });
        assert!(!CompressionPolicy::Metadata.should_compress(&big));
        assert!(CompressionPolicy::Always.should_compress(&big));
        round_trip(CompressionPolicy::Metadata, big).await;
    }

    #[tokio::test]
    async fn test_unknown_type_is_skipped_and_stream_continues() {
        let (mut writer, mut reader) = pair(CompressionPolicy::Never);
        writer
            .write_message(&Message::Close(Close {
                reason: "first".to_string(),
            }))
            .await
            .expect("Should write");

        // A frame with a type byte nobody knows, by hand: header length 2,
        // header {type: 200, compression: none}, three payload bytes.
        let raw = [0u8, 2, 200, 0, 0, 0, 0, 3, 1, 2, 3];
        writer.writer.write_all(&raw).await.expect("Should write raw");

        writer
            .write_message(&Message::Close(Close {
                reason: "second".to_string(),
            }))
            .await
            .expect("Should write");

        assert!(matches!(
            reader.read_message().await.expect("Should read"),
            ReadOutcome::Message(Message::Close(_))
        ));
        assert!(matches!(
            reader.read_message().await.expect("Should read"),
            ReadOutcome::Skipped
        ));
        assert!(matches!(
            reader.read_message().await.expect("Should read"),
            ReadOutcome::Message(Message::Close(_))
        ));
    }

    #[tokio::test]
    async fn test_negative_header_length_is_fatal() {
        let (mut writer, mut reader) = pair(CompressionPolicy::Never);
        writer
            .writer
            .write_all(&[0x80, 0x00])
            .await
            .expect("Should write raw");
        let err = reader.read_message().await;
        assert!(matches!(err, Err(ProtocolError::Protocol(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_negative_message_length_is_fatal() {
        let (mut writer, mut reader) = pair(CompressionPolicy::Never);
        writer
            .writer
            .write_all(&[0, 2, 6, 0, 0xff, 0xff, 0xff, 0xff])
            .await
            .expect("Should write raw");
        let err = reader.read_message().await;
        assert!(matches!(err, Err(ProtocolError::Protocol(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_oversize_message_length_is_fatal() {
        let (mut writer, mut reader) = pair(CompressionPolicy::Never);
        let mut raw = vec![0, 2, 6, 0];
        raw.extend_from_slice(&(MAX_MESSAGE_LEN as u32 + 1).to_be_bytes());
        writer.writer.write_all(&raw).await.expect("Should write raw");
        let err = reader.read_message().await;
        assert!(matches!(err, Err(ProtocolError::Protocol(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_unknown_compression_is_fatal() {
        let (mut writer, mut reader) = pair(CompressionPolicy::Never);
        writer
            .writer
            .write_all(&[0, 2, 6, 9])
            .await
            .expect("Should write raw");
        let err = reader.read_message().await;
        assert!(matches!(err, Err(ProtocolError::Protocol(_))), "{err:?}");
    }

    #[tokio::test]
    async fn test_garbage_payload_is_fatal() {
        let (mut writer, mut reader) = pair(CompressionPolicy::Never);
        // Claims to be a Close message but carries a bogus string length.
        let raw = [0u8, 2, 7, 0, 0, 0, 0, 4, 0xff, 0xff, 0xff, 0xff];
        writer.writer.write_all(&raw).await.expect("Should write raw");
        let err = reader.read_message().await;
        assert!(matches!(err, Err(ProtocolError::Codec(_))), "{err:?}");
    }
}

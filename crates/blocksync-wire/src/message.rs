//! Typed wire messages and their binary codec.
//!
//! All integers are big-endian. Strings and byte strings are length-prefixed
//! (`u32` length), repeated fields carry a `u32` element count, and bools
//! are a single byte. Every message implements [`WireMessage`]: an exact
//! [`size`](WireMessage::size), an append-style
//! [`encode_to`](WireMessage::encode_to), and a consuming
//! [`decode`](WireMessage::decode).
//!
//! The frame header is itself a tiny encoded message ([`Header`]) carrying
//! the payload's type and compression. Unknown message *types* survive
//! header decode so the frame can be skipped for forward compatibility;
//! unknown *compression* values fail decode and terminate the connection.

use bytes::{Buf, BufMut, Bytes};

use crate::device::DeviceId;
use crate::error::{ErrorCode, ProtocolError, Result};

/// Payloads at least this large are eligible for compression, when the
/// connection's policy allows it. Part of the wire configuration: both
/// sides of an interop test must agree on it only in the sense that either
/// side may compress, so the value is a local tuning knob fixed here.
pub const COMPRESSION_THRESHOLD: usize = 128;

// ClusterConfig folder flags
pub const FOLDER_READ_ONLY: u32 = 1 << 0;
pub const FOLDER_IGNORE_PERMS: u32 = 1 << 1;
pub const FOLDER_IGNORE_DELETE: u32 = 1 << 2;
pub const FOLDER_DISABLED_TEMP_INDEXES: u32 = 1 << 3;
pub const FOLDER_ALL: u32 = (1 << 4) - 1;

// ClusterConfig folder-device flags
pub const SHARE_TRUSTED: u32 = 1 << 0;
pub const SHARE_READ_ONLY: u32 = 1 << 1;
pub const INTRODUCER: u32 = 1 << 2;
pub const SHARE_BITS: u32 = 0x0000_00ff;

// Request flags
pub const FROM_TEMPORARY: u32 = 1 << 0;

// FileInfo local flags. Never sent on the wire; any of the invalid set
// forces the `invalid` bit on outgoing records.
pub const LOCAL_UNSUPPORTED: u32 = 1 << 0;
pub const LOCAL_IGNORED: u32 = 1 << 1;
pub const LOCAL_MUST_RESCAN: u32 = 1 << 2;
pub const LOCAL_RECEIVE_ONLY: u32 = 1 << 3;

/// Flags that force the invalid bit on outgoing records
pub const LOCAL_INVALID_FLAGS: u32 =
    LOCAL_UNSUPPORTED | LOCAL_IGNORED | LOCAL_MUST_RESCAN | LOCAL_RECEIVE_ONLY;

/// Flags that put a file in conflict with its successor, because our
/// picture of its on-disk state is not current
pub const LOCAL_CONFLICT_FLAGS: u32 = LOCAL_UNSUPPORTED | LOCAL_IGNORED | LOCAL_RECEIVE_ONLY;

/// Exact wire codec for one typed message.
pub trait WireMessage: Sized {
    /// Encoded length in bytes.
    fn size(&self) -> usize;
    /// Append the encoding to `buf`. Always writes exactly [`size`](Self::size) bytes.
    fn encode_to(&self, buf: &mut Vec<u8>);
    /// Decode from the front of `buf`, consuming what was read.
    fn decode(buf: &mut &[u8]) -> Result<Self>;
}

/// Numeric message types as they appear in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    ClusterConfig = 0,
    Index = 1,
    IndexUpdate = 2,
    Request = 3,
    Response = 4,
    DownloadProgress = 5,
    Ping = 6,
    Close = 7,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::ClusterConfig),
            1 => Some(Self::Index),
            2 => Some(Self::IndexUpdate),
            3 => Some(Self::Request),
            4 => Some(Self::Response),
            5 => Some(Self::DownloadProgress),
            6 => Some(Self::Ping),
            7 => Some(Self::Close),
            _ => None,
        }
    }
}

/// Per-frame compression marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Lz4 = 1,
}

/// Frame header: the message type of the payload and how it is compressed.
///
/// The type is kept as the raw wire byte so that frames of unknown type can
/// be skipped rather than failing decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: u8,
    pub compression: Compression,
}

impl WireMessage for Header {
    fn size(&self) -> usize {
        2
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.msg_type);
        buf.put_u8(self.compression as u8);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let msg_type = get_u8(buf)?;
        let compression = match get_u8(buf)? {
            0 => Compression::None,
            1 => Compression::Lz4,
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "unknown message compression {other}"
                )))
            }
        };
        Ok(Header {
            msg_type,
            compression,
        })
    }
}

/// Everything that can travel in a frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClusterConfig(ClusterConfig),
    Index(Index),
    IndexUpdate(IndexUpdate),
    Request(Request),
    Response(Response),
    DownloadProgress(DownloadProgress),
    Ping(Ping),
    Close(Close),
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::ClusterConfig(_) => MessageType::ClusterConfig,
            Message::Index(_) => MessageType::Index,
            Message::IndexUpdate(_) => MessageType::IndexUpdate,
            Message::Request(_) => MessageType::Request,
            Message::Response(_) => MessageType::Response,
            Message::DownloadProgress(_) => MessageType::DownloadProgress,
            Message::Ping(_) => MessageType::Ping,
            Message::Close(_) => MessageType::Close,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Message::ClusterConfig(m) => m.size(),
            Message::Index(m) => m.size(),
            Message::IndexUpdate(m) => m.size(),
            Message::Request(m) => m.size(),
            Message::Response(m) => m.size(),
            Message::DownloadProgress(m) => m.size(),
            Message::Ping(m) => m.size(),
            Message::Close(m) => m.size(),
        }
    }

    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        match self {
            Message::ClusterConfig(m) => m.encode_to(buf),
            Message::Index(m) => m.encode_to(buf),
            Message::IndexUpdate(m) => m.encode_to(buf),
            Message::Request(m) => m.encode_to(buf),
            Message::Response(m) => m.encode_to(buf),
            Message::DownloadProgress(m) => m.encode_to(buf),
            Message::Ping(m) => m.encode_to(buf),
            Message::Close(m) => m.encode_to(buf),
        }
    }

    pub fn decode(msg_type: MessageType, buf: &mut &[u8]) -> Result<Self> {
        Ok(match msg_type {
            MessageType::ClusterConfig => Message::ClusterConfig(ClusterConfig::decode(buf)?),
            MessageType::Index => Message::Index(Index::decode(buf)?),
            MessageType::IndexUpdate => Message::IndexUpdate(IndexUpdate::decode(buf)?),
            MessageType::Request => Message::Request(Request::decode(buf)?),
            MessageType::Response => Message::Response(Response::decode(buf)?),
            MessageType::DownloadProgress => {
                Message::DownloadProgress(DownloadProgress::decode(buf)?)
            }
            MessageType::Ping => Message::Ping(Ping::decode(buf)?),
            MessageType::Close => Message::Close(Close::decode(buf)?),
        })
    }
}

/// The peer's declared view of folders and devices, exchanged once at the
/// start of each connection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClusterConfig {
    pub folders: Vec<Folder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: String,
    pub label: String,
    pub flags: u32,
    pub devices: Vec<FolderDevice>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderDevice {
    pub id: DeviceId,
    pub flags: u32,
    pub max_sequence: i64,
}

/// Full index of a folder.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub folder: String,
    pub files: Vec<FileInfo>,
}

/// Delta against a previously sent index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexUpdate {
    pub folder: String,
    pub files: Vec<FileInfo>,
}

/// Demand for a byte range of a file, identified by content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u32,
    pub folder: String,
    pub name: String,
    pub offset: i64,
    pub size: i32,
    pub hash: Vec<u8>,
    pub weak_hash: u32,
    pub from_temporary: bool,
}

/// Answer to a [`Request`], correlated by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u32,
    pub data: Bytes,
    pub code: ErrorCode,
}

/// Progress updates for files the peer is currently downloading.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub folder: String,
    pub updates: Vec<FileDownloadProgressUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateType {
    Append = 0,
    Forget = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDownloadProgressUpdate {
    pub update_type: UpdateType,
    pub name: String,
    pub version: Vector,
    pub block_indexes: Vec<i32>,
}

/// Liveness probe. Carries nothing; receipt refreshes the peer's read clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ping;

/// Orderly termination, carrying a human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub struct Close {
    pub reason: String,
}

/// Kind of filesystem object a [`FileInfo`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    File = 0,
    Directory = 1,
    /// Deprecated on the wire; decodes for compatibility, encodes as [`FileType::Symlink`]
    SymlinkFile = 2,
    /// Deprecated on the wire; decodes for compatibility, encodes as [`FileType::Symlink`]
    SymlinkDirectory = 3,
    Symlink = 4,
}

impl FileType {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::File),
            1 => Some(Self::Directory),
            2 => Some(Self::SymlinkFile),
            3 => Some(Self::SymlinkDirectory),
            4 => Some(Self::Symlink),
            _ => None,
        }
    }

    fn wire_value(self) -> u8 {
        match self {
            FileType::SymlinkFile | FileType::SymlinkDirectory => FileType::Symlink as u8,
            other => other as u8,
        }
    }
}

/// Metadata record for one file, directory or symlink, plus its block list.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub file_type: FileType,
    pub size: i64,
    pub permissions: u32,
    pub modified: i64,
    pub deleted: bool,
    pub invalid: bool,
    pub no_permissions: bool,
    pub version: Vector,
    pub sequence: i64,
    pub blocks: Vec<BlockInfo>,
    pub symlink_target: String,
    /// Local-only state bits; never encoded. See [`LOCAL_INVALID_FLAGS`].
    pub local_flags: u32,
}

impl FileInfo {
    /// Whether the record is invalid, either by the wire bit or by local
    /// flags that map onto it.
    pub fn is_invalid(&self) -> bool {
        self.invalid || self.local_flags & LOCAL_INVALID_FLAGS != 0
    }

    /// Whether local state puts this file in conflict with its successor.
    pub fn should_conflict(&self) -> bool {
        self.local_flags & LOCAL_CONFLICT_FLAGS != 0
    }
}

/// One content block of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub offset: i64,
    pub size: i32,
    pub hash: Vec<u8>,
    pub weak_hash: u32,
}

/// Version vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Vector {
    pub counters: Vec<Counter>,
}

/// One device's clock in a [`Vector`]. The id is a [`DeviceId::short_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub id: u64,
    pub value: u64,
}

// Field primitives. Decode helpers check remaining length up front since the
// `Buf` getters panic on underflow.

fn truncated() -> ProtocolError {
    ProtocolError::Codec("unexpected end of message".to_string())
}

fn need(buf: &&[u8], n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(truncated());
    }
    Ok(())
}

fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

fn get_i32(buf: &mut &[u8]) -> Result<i32> {
    need(buf, 4)?;
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    need(buf, 8)?;
    Ok(buf.get_i64())
}

fn get_bool(buf: &mut &[u8]) -> Result<bool> {
    Ok(get_u8(buf)? != 0)
}

fn get_count(buf: &mut &[u8]) -> Result<usize> {
    let n = get_u32(buf)? as usize;
    // A count cannot exceed the bytes left; one byte per element minimum.
    if n > buf.remaining() {
        return Err(truncated());
    }
    Ok(n)
}

fn get_byte_slice<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let len = get_u32(buf)? as usize;
    need(buf, len)?;
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    let raw = get_byte_slice(buf)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| ProtocolError::Codec("string field is not valid UTF-8".to_string()))
}

fn get_bytes_vec(buf: &mut &[u8]) -> Result<Vec<u8>> {
    Ok(get_byte_slice(buf)?.to_vec())
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    buf.put_u32(b.len() as u32);
    buf.extend_from_slice(b);
}

fn str_size(s: &str) -> usize {
    4 + s.len()
}

fn bytes_size(b: &[u8]) -> usize {
    4 + b.len()
}

fn vec_size<T: WireMessage>(items: &[T]) -> usize {
    4 + items.iter().map(WireMessage::size).sum::<usize>()
}

fn put_vec<T: WireMessage>(buf: &mut Vec<u8>, items: &[T]) {
    buf.put_u32(items.len() as u32);
    for item in items {
        item.encode_to(buf);
    }
}

fn get_vec<T: WireMessage>(buf: &mut &[u8]) -> Result<Vec<T>> {
    let n = get_count(buf)?;
    let mut items = Vec::with_capacity(n);
    for _ in 0..n {
        items.push(T::decode(buf)?);
    }
    Ok(items)
}

impl WireMessage for ClusterConfig {
    fn size(&self) -> usize {
        vec_size(&self.folders)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_vec(buf, &self.folders);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            folders: get_vec(buf)?,
        })
    }
}

impl WireMessage for Folder {
    fn size(&self) -> usize {
        str_size(&self.id) + str_size(&self.label) + 4 + vec_size(&self.devices)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_string(buf, &self.id);
        put_string(buf, &self.label);
        buf.put_u32(self.flags);
        put_vec(buf, &self.devices);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            id: get_string(buf)?,
            label: get_string(buf)?,
            flags: get_u32(buf)?,
            devices: get_vec(buf)?,
        })
    }
}

impl WireMessage for FolderDevice {
    fn size(&self) -> usize {
        32 + 4 + 8
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.id.as_bytes());
        buf.put_u32(self.flags);
        buf.put_i64(self.max_sequence);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        need(buf, 32)?;
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&buf[..32]);
        buf.advance(32);
        Ok(Self {
            id: DeviceId::from_bytes(raw),
            flags: get_u32(buf)?,
            max_sequence: get_i64(buf)?,
        })
    }
}

impl WireMessage for Index {
    fn size(&self) -> usize {
        str_size(&self.folder) + vec_size(&self.files)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_string(buf, &self.folder);
        put_vec(buf, &self.files);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            folder: get_string(buf)?,
            files: get_vec(buf)?,
        })
    }
}

impl WireMessage for IndexUpdate {
    fn size(&self) -> usize {
        str_size(&self.folder) + vec_size(&self.files)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_string(buf, &self.folder);
        put_vec(buf, &self.files);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            folder: get_string(buf)?,
            files: get_vec(buf)?,
        })
    }
}

impl WireMessage for Request {
    fn size(&self) -> usize {
        4 + str_size(&self.folder) + str_size(&self.name) + 8 + 4 + bytes_size(&self.hash) + 4 + 4
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_u32(self.id);
        put_string(buf, &self.folder);
        put_string(buf, &self.name);
        buf.put_i64(self.offset);
        buf.put_i32(self.size);
        put_bytes(buf, &self.hash);
        buf.put_u32(self.weak_hash);
        let flags = if self.from_temporary { FROM_TEMPORARY } else { 0 };
        buf.put_u32(flags);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let id = get_u32(buf)?;
        let folder = get_string(buf)?;
        let name = get_string(buf)?;
        let offset = get_i64(buf)?;
        let size = get_i32(buf)?;
        let hash = get_bytes_vec(buf)?;
        let weak_hash = get_u32(buf)?;
        let flags = get_u32(buf)?;
        Ok(Self {
            id,
            folder,
            name,
            offset,
            size,
            hash,
            weak_hash,
            from_temporary: flags & FROM_TEMPORARY != 0,
        })
    }
}

impl WireMessage for Response {
    fn size(&self) -> usize {
        4 + bytes_size(&self.data) + 4
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_u32(self.id);
        put_bytes(buf, &self.data);
        buf.put_u32(self.code as u32);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let id = get_u32(buf)?;
        let data = Bytes::copy_from_slice(get_byte_slice(buf)?);
        let code = ErrorCode::from_u32(get_u32(buf)?);
        Ok(Self { id, data, code })
    }
}

impl WireMessage for DownloadProgress {
    fn size(&self) -> usize {
        str_size(&self.folder) + vec_size(&self.updates)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_string(buf, &self.folder);
        put_vec(buf, &self.updates);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            folder: get_string(buf)?,
            updates: get_vec(buf)?,
        })
    }
}

impl WireMessage for FileDownloadProgressUpdate {
    fn size(&self) -> usize {
        1 + str_size(&self.name) + self.version.size() + 4 + 4 * self.block_indexes.len()
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_u8(self.update_type as u8);
        put_string(buf, &self.name);
        self.version.encode_to(buf);
        buf.put_u32(self.block_indexes.len() as u32);
        for &index in &self.block_indexes {
            buf.put_i32(index);
        }
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let update_type = match get_u8(buf)? {
            0 => UpdateType::Append,
            1 => UpdateType::Forget,
            other => {
                return Err(ProtocolError::Codec(format!(
                    "unknown download progress update type {other}"
                )))
            }
        };
        let name = get_string(buf)?;
        let version = Vector::decode(buf)?;
        let n = get_count(buf)?;
        let mut block_indexes = Vec::with_capacity(n);
        for _ in 0..n {
            block_indexes.push(get_i32(buf)?);
        }
        Ok(Self {
            update_type,
            name,
            version,
            block_indexes,
        })
    }
}

impl WireMessage for Ping {
    fn size(&self) -> usize {
        0
    }

    fn encode_to(&self, _buf: &mut Vec<u8>) {}

    fn decode(_buf: &mut &[u8]) -> Result<Self> {
        Ok(Ping)
    }
}

impl WireMessage for Close {
    fn size(&self) -> usize {
        str_size(&self.reason)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_string(buf, &self.reason);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            reason: get_string(buf)?,
        })
    }
}

impl WireMessage for FileInfo {
    fn size(&self) -> usize {
        str_size(&self.name)
            + 1
            + 8
            + 4
            + 8
            + 1
            + 1
            + 1
            + self.version.size()
            + 8
            + str_size(&self.symlink_target)
            + vec_size(&self.blocks)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_string(buf, &self.name);
        buf.put_u8(self.file_type.wire_value());
        buf.put_i64(self.size);
        buf.put_u32(self.permissions);
        buf.put_i64(self.modified);
        buf.put_u8(self.deleted as u8);
        buf.put_u8(self.is_invalid() as u8);
        buf.put_u8(self.no_permissions as u8);
        self.version.encode_to(buf);
        buf.put_i64(self.sequence);
        put_string(buf, &self.symlink_target);
        put_vec(buf, &self.blocks);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        let name = get_string(buf)?;
        let file_type = FileType::from_u8(get_u8(buf)?)
            .ok_or_else(|| ProtocolError::Codec("unknown file type".to_string()))?;
        Ok(Self {
            name,
            file_type,
            size: get_i64(buf)?,
            permissions: get_u32(buf)?,
            modified: get_i64(buf)?,
            deleted: get_bool(buf)?,
            invalid: get_bool(buf)?,
            no_permissions: get_bool(buf)?,
            version: Vector::decode(buf)?,
            sequence: get_i64(buf)?,
            symlink_target: get_string(buf)?,
            blocks: get_vec(buf)?,
            local_flags: 0,
        })
    }
}

impl WireMessage for BlockInfo {
    fn size(&self) -> usize {
        8 + 4 + bytes_size(&self.hash) + 4
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_i64(self.offset);
        buf.put_i32(self.size);
        put_bytes(buf, &self.hash);
        buf.put_u32(self.weak_hash);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            offset: get_i64(buf)?,
            size: get_i32(buf)?,
            hash: get_bytes_vec(buf)?,
            weak_hash: get_u32(buf)?,
        })
    }
}

impl WireMessage for Vector {
    fn size(&self) -> usize {
        vec_size(&self.counters)
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        put_vec(buf, &self.counters);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            counters: get_vec(buf)?,
        })
    }
}

impl WireMessage for Counter {
    fn size(&self) -> usize {
        16
    }

    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.put_u64(self.id);
        buf.put_u64(self.value);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            id: get_u64(buf)?,
            value: get_u64(buf)?,
        })
    }
}

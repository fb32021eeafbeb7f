//! LZ4 payload compression.
//!
//! Compressed payloads carry a four-byte **big-endian** uncompressed-size
//! prefix followed by a raw LZ4 block. The prefix byte order is part of the
//! wire format, not a property of any particular LZ4 library; peers that
//! prefix little-endian sizes are rejected here by the size sanity checks.

use std::sync::Arc;

use crate::error::{ProtocolError, Result};
use crate::frame::MAX_MESSAGE_LEN;
use crate::pool::{BufferPool, PooledBuf};

/// Compress `src` into a prefixed LZ4 block.
pub(crate) fn lz4_compress(src: &[u8], pool: &Arc<BufferPool>) -> Result<PooledBuf> {
    let worst = lz4_flex::block::get_maximum_output_size(src.len());
    let mut out = pool.get(4 + worst);
    out.extend_from_slice(&(src.len() as u32).to_be_bytes());
    out.resize(4 + worst, 0);
    let written = lz4_flex::block::compress_into(src, &mut out[4..])
        .map_err(|e| ProtocolError::Codec(format!("compressing message: {e}")))?;
    out.truncate(4 + written);
    Ok(out)
}

/// Decompress a prefixed LZ4 block.
///
/// The advertised uncompressed size is bounded by [`MAX_MESSAGE_LEN`] and
/// must match the actual decoded length exactly.
pub(crate) fn lz4_decompress(src: &[u8], pool: &Arc<BufferPool>) -> Result<PooledBuf> {
    if src.len() < 4 {
        return Err(ProtocolError::Codec(
            "decompressing message: truncated size prefix".to_string(),
        ));
    }
    let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if size > MAX_MESSAGE_LEN {
        return Err(ProtocolError::Codec(format!(
            "decompressing message: implausible uncompressed size {size}"
        )));
    }
    let mut out = pool.get(size);
    out.resize(size, 0);
    let written = lz4_flex::block::decompress_into(&src[4..], &mut out)
        .map_err(|e| ProtocolError::Codec(format!("decompressing message: {e}")))?;
    if written != size {
        return Err(ProtocolError::Codec(format!(
            "decompressing message: size mismatch, prefix {size} actual {written}"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<BufferPool> {
        Arc::new(BufferPool::new())
    }

    #[test]
    fn test_round_trip() {
        let pool = pool();
        let src: Vec<u8> = (0..4096u32).map(|i| (i % 7) as u8).collect();
        let compressed = lz4_compress(&src, &pool).expect("Should compress");
        assert!(compressed.len() < src.len());
        let restored = lz4_decompress(&compressed, &pool).expect("Should decompress");
        assert_eq!(&restored[..], &src[..]);
    }

    #[test]
    fn test_size_prefix_is_big_endian() {
        let pool = pool();
        let src = vec![0u8; 300];
        let compressed = lz4_compress(&src, &pool).expect("Should compress");
        assert_eq!(&compressed[..4], &300u32.to_be_bytes());
    }

    #[test]
    fn test_little_endian_prefix_is_rejected() {
        let pool = pool();
        let src = vec![7u8; 300];
        let mut compressed = lz4_compress(&src, &pool)
            .expect("Should compress")
            .to_vec();
        // A non-conforming peer would have written the size little-endian.
        compressed[..4].copy_from_slice(&300u32.to_le_bytes());
        let err = lz4_decompress(&compressed, &pool);
        assert!(err.is_err());
    }

    #[test]
    fn test_truncated_prefix_is_rejected() {
        let pool = pool();
        assert!(lz4_decompress(&[0, 0], &pool).is_err());
    }

    #[test]
    fn test_empty_payload_round_trips() {
        let pool = pool();
        let compressed = lz4_compress(&[], &pool).expect("Should compress");
        let restored = lz4_decompress(&compressed, &pool).expect("Should decompress");
        assert!(restored.is_empty());
    }
}

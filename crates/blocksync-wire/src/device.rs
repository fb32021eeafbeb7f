//! Device identity.
//!
//! The engine treats device identity as opaque: the transport layer has
//! already verified it before a connection is handed to us.

/// Opaque 32-byte identity of a peer device.
///
/// The raw bytes are reachable only through [`from_bytes`](Self::from_bytes)
/// and [`as_bytes`](Self::as_bytes). Equality and hashing are over the raw
/// bytes. The `Display` form is a short base58 prefix, suitable for log
/// lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId([u8; 32]);

impl DeviceId {
    /// Create a DeviceId from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the DeviceId
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The first eight bytes as a big-endian integer.
    ///
    /// This is the id space used by version vector counters, where carrying
    /// the full identity per counter would be wasteful.
    pub fn short_id(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(prefix)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device_{}", bs58::encode(&self.0[..8]).into_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_is_big_endian_prefix() {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&[0, 0, 0, 0, 0, 0, 1, 2]);
        let id = DeviceId::from_bytes(bytes);
        assert_eq!(id.short_id(), 0x0102);
    }

    #[test]
    fn test_display_is_stable_and_prefixed() {
        let id = DeviceId::from_bytes([7u8; 32]);
        let shown = format!("{}", id);
        assert!(shown.starts_with("device_"));
        assert_eq!(shown, format!("{}", DeviceId::from_bytes([7u8; 32])));
    }
}

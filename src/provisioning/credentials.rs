//! Network credentials collected over BLE.
//!
//! Both fields are fixed-capacity byte buffers: the GATT attribute limits
//! bound what a peer can write, and anything longer is truncated rather than
//! rejected. The secret is zeroed whenever it is overwritten or dropped.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum network name length (IEEE 802.11 SSID).
pub const MAX_NETWORK_NAME_LEN: usize = 32;

/// Capacity of the network secret buffer (WPA2 passphrase).
pub const MAX_NETWORK_SECRET_LEN: usize = 64;

/// Fixed-capacity byte string, zero padded past `len`.
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct BoundedBytes<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> Default for BoundedBytes<N> {
    fn default() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
        }
    }
}

impl<const N: usize> BoundedBytes<N> {
    /// Replace the contents with at most `limit` bytes of `data`.
    ///
    /// The previous contents are zeroed first. Returns the number of bytes
    /// kept.
    pub fn assign(&mut self, data: &[u8], limit: usize) -> usize {
        self.zeroize();
        let kept = data.len().min(limit).min(N);
        self.bytes[..kept].copy_from_slice(&data[..kept]);
        self.len = kept;
        kept
    }

    /// Stored bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Stored bytes as UTF-8, if valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }

    /// Number of stored bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Credential pair plus the "written since last handoff" flags.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    network_name: BoundedBytes<MAX_NETWORK_NAME_LEN>,
    network_secret: BoundedBytes<MAX_NETWORK_SECRET_LEN>,
    name_set: bool,
    secret_set: bool,
}

impl Credentials {
    /// Build a complete pair directly, truncating to capacity.
    pub fn new(network_name: &[u8], network_secret: &[u8]) -> Self {
        let mut credentials = Self::default();
        credentials.set_network_name(network_name, MAX_NETWORK_NAME_LEN);
        credentials.set_network_secret(network_secret, MAX_NETWORK_SECRET_LEN);
        credentials
    }

    /// Record a network name write. Returns the number of bytes kept.
    pub fn set_network_name(&mut self, data: &[u8], limit: usize) -> usize {
        self.name_set = true;
        self.network_name.assign(data, limit)
    }

    /// Record a network secret write. Returns the number of bytes kept.
    pub fn set_network_secret(&mut self, data: &[u8], limit: usize) -> usize {
        self.secret_set = true;
        self.network_secret.assign(data, limit)
    }

    /// Network name bytes.
    pub fn network_name(&self) -> &[u8] {
        self.network_name.as_bytes()
    }

    /// Network name for logs and driver configuration.
    pub fn network_name_lossy(&self) -> String {
        String::from_utf8_lossy(self.network_name()).into_owned()
    }

    /// Network secret bytes.
    pub fn network_secret(&self) -> &[u8] {
        self.network_secret.as_bytes()
    }

    /// Check if this is an open network (empty secret).
    pub fn is_open(&self) -> bool {
        self.network_secret.is_empty()
    }

    /// Whether the name was written since the last handoff.
    pub fn name_set(&self) -> bool {
        self.name_set
    }

    /// Whether the secret was written since the last handoff.
    pub fn secret_set(&self) -> bool {
        self.secret_set
    }

    /// Both fields written since the last handoff.
    pub fn is_complete(&self) -> bool {
        self.name_set && self.secret_set
    }

    /// Clear the written flags after the pair has been handed off.
    /// Values are kept.
    pub fn mark_consumed(&mut self) {
        self.name_set = false;
        self.secret_set = false;
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("network_name", &self.network_name_lossy())
            .field("network_secret", &format_args!("<{} bytes>", self.network_secret.len()))
            .field("name_set", &self.name_set)
            .field("secret_set", &self.secret_set)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_pair() {
        let credentials = Credentials::new(b"home", b"secret123");
        assert_eq!(credentials.network_name(), b"home");
        assert_eq!(credentials.network_secret(), b"secret123");
        assert!(credentials.is_complete());
        assert!(!credentials.is_open());
    }

    #[test]
    fn test_name_truncated_to_capacity() {
        let mut credentials = Credentials::default();
        let long = [b'a'; 40];
        assert_eq!(credentials.set_network_name(&long, MAX_NETWORK_NAME_LEN), 32);
        assert_eq!(credentials.network_name().len(), 32);
    }

    #[test]
    fn test_limit_below_capacity() {
        let mut credentials = Credentials::default();
        let long = [b'p'; 70];
        assert_eq!(credentials.set_network_secret(&long, 63), 63);
        assert_eq!(credentials.network_secret(), &long[..63]);
    }

    #[test]
    fn test_shorter_write_clears_tail() {
        let mut field = BoundedBytes::<8>::default();
        field.assign(b"abcdefgh", 8);
        field.assign(b"xy", 8);
        assert_eq!(field.as_bytes(), b"xy");
        assert_eq!(field.bytes, [b'x', b'y', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_as_str_rejects_invalid_utf8() {
        let mut field = BoundedBytes::<4>::default();
        field.assign(&[0xff, 0xfe], 4);
        assert_eq!(field.as_str(), None);
        field.assign(b"ok", 4);
        assert_eq!(field.as_str(), Some("ok"));
    }

    #[test]
    fn test_mark_consumed_keeps_values() {
        let mut credentials = Credentials::new(b"home", b"secret123");
        credentials.mark_consumed();
        assert!(!credentials.name_set());
        assert!(!credentials.secret_set());
        assert_eq!(credentials.network_name(), b"home");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = Credentials::new(b"home", b"secret123");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("home"));
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("<9 bytes>"));
    }

    #[test]
    fn test_zeroize_clears_everything() {
        let mut credentials = Credentials::new(b"home", b"secret123");
        credentials.zeroize();
        assert!(credentials.network_name().is_empty());
        assert!(credentials.network_secret().is_empty());
        assert!(!credentials.is_complete());
    }
}

//! Streaming double-SHA-256 (SHA-256 of SHA-256), the hash that names
//! blocks and transactions and checksums network messages.

use sha2::{Digest, Sha256};
use std::io;

/// An `io::Write` instance that produces a SHA-256d digest of everything
/// written through it.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl Writer {
    /// Consume the writer and produce the double hash.
    pub fn finish(self) -> [u8; 32] {
        let result = Sha256::digest(&self.hash.finalize());
        let mut buffer = [0u8; 32];
        buffer[..].copy_from_slice(&result);
        buffer
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("sha256d::Writer").finish()
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The first four bytes of a SHA-256d digest, used as the message checksum
/// in the network frame header.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Checksum(pub [u8; 4]);

impl<'a> From<&'a [u8]> for Checksum {
    fn from(bytes: &'a [u8]) -> Self {
        let digest = Sha256::digest(&Sha256::digest(bytes));
        let mut checksum = [0u8; 4];
        checksum[..].copy_from_slice(&digest[0..4]);
        Self(checksum)
    }
}

impl std::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Checksum")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

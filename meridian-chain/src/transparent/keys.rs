//! Private keys and their wallet-import-format encoding.

use std::fmt;

use rand::RngCore;
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::{parameters::Network, serialization::SerializationError, transparent::Address};

/// WIF version bytes.
mod magics {
    pub const MAINNET: u8 = 0x80;
    pub const TESTNET: u8 = 0xEF;
    /// Suffix marking a key whose public key is stored compressed.
    pub const COMPRESSED: u8 = 0x01;
}

/// A secp256k1 private key, tagged with the network it spends on.
#[derive(Clone)]
pub struct PrivateKey {
    pub network: Network,
    pub secret: SecretKey,
    /// Whether addresses derive from the compressed public key encoding.
    pub compressed: bool,
}

impl PrivateKey {
    /// Generate a fresh random key from the OS entropy source.
    pub fn generate(network: Network) -> PrivateKey {
        let mut bytes = [0u8; 32];
        loop {
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            // Nearly every 32-byte string is a valid scalar; retry on the
            // negligible chance of zero or overflow.
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return PrivateKey {
                    network,
                    secret,
                    compressed: true,
                };
            }
        }
    }

    pub fn pub_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&Secp256k1::new(), &self.secret)
    }

    pub fn address(&self) -> Address {
        Address::from_pub_key(&self.pub_key(), self.network)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Never print key material.
        f.debug_struct("PrivateKey")
            .field("network", &self.network)
            .field("address", &self.address())
            .finish()
    }
}

impl fmt::Display for PrivateKey {
    /// Encodes as WIF: version ‖ secret(32) ‖ [compression flag],
    /// Base58Check.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = Vec::with_capacity(34);
        bytes.push(match self.network {
            Network::Mainnet => magics::MAINNET,
            Network::Testnet => magics::TESTNET,
        });
        bytes.extend_from_slice(&self.secret[..]);
        if self.compressed {
            bytes.push(magics::COMPRESSED);
        }
        f.write_str(&bs58::encode(&bytes).with_check().into_string())
    }
}

impl std::str::FromStr for PrivateKey {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|_| SerializationError::Parse("WIF decoding error"))?;

        let (network, rest) = match bytes.split_first() {
            Some((&magics::MAINNET, rest)) => (Network::Mainnet, rest),
            Some((&magics::TESTNET, rest)) => (Network::Testnet, rest),
            _ => return Err(SerializationError::Parse("bad WIF version byte")),
        };

        let (secret_bytes, compressed) = match rest.len() {
            32 => (rest, false),
            33 if rest[32] == magics::COMPRESSED => (&rest[..32], true),
            _ => return Err(SerializationError::Parse("bad WIF length")),
        };

        let secret = SecretKey::from_slice(secret_bytes)
            .map_err(|_| SerializationError::Parse("WIF secret out of range"))?;

        Ok(PrivateKey {
            network,
            secret,
            compressed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wif_round_trip() {
        meridian_test::init();

        for network in [Network::Mainnet, Network::Testnet] {
            let key = PrivateKey::generate(network);
            let parsed: PrivateKey = key.to_string().parse().unwrap();
            assert_eq!(parsed.network, key.network);
            assert_eq!(parsed.secret, key.secret);
            assert!(parsed.compressed);
            assert_eq!(parsed.address(), key.address());
        }
    }

    #[test]
    fn uncompressed_wif_has_no_suffix() {
        meridian_test::init();

        let mut key = PrivateKey::generate(Network::Mainnet);
        key.compressed = false;
        let parsed: PrivateKey = key.to_string().parse().unwrap();
        assert!(!parsed.compressed);
    }
}

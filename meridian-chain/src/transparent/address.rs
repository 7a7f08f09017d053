//! Meridian address types.

use std::{fmt, io};

use secp256k1::PublicKey;

use crate::{
    parameters::Network,
    primitives::hash160,
    serialization::{MeridianDeserialize, MeridianSerialize, SerializationError},
};

use super::Script;

/// Version bytes that identify the network and payload type of an address.
mod magics {
    pub mod p2pkh {
        pub const MAINNET: [u8; 1] = [30];
        pub const TESTNET: [u8; 1] = [65];
    }

    pub mod p2sh {
        pub const MAINNET: [u8; 1] = [50];
        pub const TESTNET: [u8; 1] = [66];
    }
}

/// A Meridian address.
///
/// A single version byte is prepended to a 20-byte payload hash; the result
/// is hashed with SHA-256d, the first four bytes of that digest are appended
/// as a checksum, and the whole thing is Base58 encoded.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub enum Address {
    /// Pay to the hash of a public key.
    PayToPublicKeyHash {
        /// Production or test network.
        network: Network,
        /// `HASH160` of an ECDSA key encoding.
        pub_key_hash: [u8; 20],
    },
    /// Pay to the hash of a redeem script.
    PayToScriptHash {
        /// Production or test network.
        network: Network,
        /// `HASH160` of the redeem script.
        script_hash: [u8; 20],
    },
}

impl Address {
    /// The address that pays to `pub_key` on `network`.
    pub fn from_pub_key(pub_key: &PublicKey, network: Network) -> Address {
        Address::PayToPublicKeyHash {
            network,
            pub_key_hash: hash160(&pub_key.serialize()),
        }
    }

    /// The address that pays to `redeem_script` on `network`.
    pub fn from_script(redeem_script: &Script, network: Network) -> Address {
        Address::PayToScriptHash {
            network,
            script_hash: hash160(redeem_script.as_bytes()),
        }
    }

    pub fn network(&self) -> Network {
        match *self {
            Address::PayToPublicKeyHash { network, .. } => network,
            Address::PayToScriptHash { network, .. } => network,
        }
    }

    /// The 20-byte payload hash.
    pub fn hash(&self) -> [u8; 20] {
        match *self {
            Address::PayToPublicKeyHash { pub_key_hash, .. } => pub_key_hash,
            Address::PayToScriptHash { script_hash, .. } => script_hash,
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut debug_struct = f.debug_struct("Address");

        match self {
            Address::PayToPublicKeyHash {
                network,
                pub_key_hash,
            } => debug_struct
                .field("network", network)
                .field("pub_key_hash", &hex::encode(pub_key_hash))
                .finish(),
            Address::PayToScriptHash {
                network,
                script_hash,
            } => debug_struct
                .field("network", network)
                .field("script_hash", &hex::encode(script_hash))
                .finish(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.mrd_serialize(&mut bytes);

        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = &bs58::decode(s).with_check(None).into_vec();

        match result {
            Ok(bytes) => Self::mrd_deserialize(&bytes[..]),
            Err(_) => Err(SerializationError::Parse("address decoding error")),
        }
    }
}

impl MeridianSerialize for Address {
    fn mrd_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Address::PayToPublicKeyHash {
                network,
                pub_key_hash,
            } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2pkh::MAINNET[..])?,
                    Network::Testnet => writer.write_all(&magics::p2pkh::TESTNET[..])?,
                }
                writer.write_all(pub_key_hash)?
            }
            Address::PayToScriptHash {
                network,
                script_hash,
            } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2sh::MAINNET[..])?,
                    Network::Testnet => writer.write_all(&magics::p2sh::TESTNET[..])?,
                }
                writer.write_all(script_hash)?
            }
        }

        Ok(())
    }
}

impl MeridianDeserialize for Address {
    fn mrd_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_bytes = [0; 1];
        reader.read_exact(&mut version_bytes)?;

        let mut hash_bytes = [0; 20];
        reader.read_exact(&mut hash_bytes)?;

        match version_bytes {
            magics::p2pkh::MAINNET => Ok(Address::PayToPublicKeyHash {
                network: Network::Mainnet,
                pub_key_hash: hash_bytes,
            }),
            magics::p2pkh::TESTNET => Ok(Address::PayToPublicKeyHash {
                network: Network::Testnet,
                pub_key_hash: hash_bytes,
            }),
            magics::p2sh::MAINNET => Ok(Address::PayToScriptHash {
                network: Network::Mainnet,
                script_hash: hash_bytes,
            }),
            magics::p2sh::TESTNET => Ok(Address::PayToScriptHash {
                network: Network::Testnet,
                script_hash: hash_bytes,
            }),
            _ => Err(SerializationError::Parse("bad address version byte")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Secp256k1, SecretKey};

    fn some_pub_key() -> PublicKey {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x42; 32]).expect("32 nonzero bytes");
        PublicKey::from_secret_key(&secp, &secret)
    }

    #[test]
    fn mainnet_addresses_start_with_d() {
        meridian_test::init();

        // Version byte 30 puts mainnet P2PKH addresses in the 'D' range of
        // the Base58 alphabet.
        let addr = Address::from_pub_key(&some_pub_key(), Network::Mainnet);
        assert!(addr.to_string().starts_with('D'), "{}", addr);
    }

    #[test]
    fn display_round_trip() {
        meridian_test::init();

        for network in [Network::Mainnet, Network::Testnet] {
            let addr = Address::from_pub_key(&some_pub_key(), network);
            let parsed: Address = addr.to_string().parse().unwrap();
            assert_eq!(parsed, addr);

            let script_addr = Address::from_script(&Script(vec![0x51]), network);
            let parsed: Address = script_addr.to_string().parse().unwrap();
            assert_eq!(parsed, script_addr);
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        meridian_test::init();

        let addr = Address::from_pub_key(&some_pub_key(), Network::Mainnet);
        let mut encoded = addr.to_string();
        // Flip the last character to break the checksum.
        let last = if encoded.ends_with('2') { '3' } else { '2' };
        encoded.pop();
        encoded.push(last);
        assert!(encoded.parse::<Address>().is_err());
    }
}

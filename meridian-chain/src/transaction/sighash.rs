//! Signature hashing.
//!
//! The digest an input signs commits to the whole transaction except the
//! other inputs' unlock scripts: a copy of the transaction is serialized
//! with every `script_sig` replaced by the empty script, except the input
//! being verified, which carries `script_code` instead. The 4-byte hash
//! type is appended and the result double-SHA-256 hashed.

use std::io::Write;

use thiserror::Error;

use crate::compactint::CompactInt;
use crate::serialization::{sha256d, MeridianSerialize};

use super::Transaction;

/// The only supported signature hash type.
pub const SIGHASH_ALL: u32 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SighashError {
    #[error("signature hash input index {index} out of bounds for {inputs} inputs")]
    IndexOutOfBounds { index: usize, inputs: usize },
}

impl Transaction {
    /// The digest signed by the input at `input_index`.
    ///
    /// For legacy pay-to-pubkey-hash spends, `script_code` is the
    /// `script_pubkey` of the output being spent (after any
    /// `OP_CODESEPARATOR` truncation and signature removal performed by the
    /// script interpreter).
    pub fn signature_hash(
        &self,
        input_index: usize,
        script_code: &[u8],
        hash_type: u32,
    ) -> Result<[u8; 32], SighashError> {
        if input_index >= self.inputs.len() {
            return Err(SighashError::IndexOutOfBounds {
                index: input_index,
                inputs: self.inputs.len(),
            });
        }

        let mut writer = sha256d::Writer::default();

        self.version
            .mrd_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        CompactInt::from(self.inputs.len())
            .mrd_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        for (i, input) in self.inputs.iter().enumerate() {
            input
                .previous_output
                .mrd_serialize(&mut writer)
                .expect("sha256d::Writer is infallible");
            // Only the signed input carries a script; the rest are emptied
            // so signatures don't depend on each other.
            if i == input_index {
                CompactInt::from(script_code.len())
                    .mrd_serialize(&mut writer)
                    .expect("sha256d::Writer is infallible");
                writer
                    .write_all(script_code)
                    .expect("sha256d::Writer is infallible");
            } else {
                CompactInt::from(0)
                    .mrd_serialize(&mut writer)
                    .expect("sha256d::Writer is infallible");
            }
            input
                .sequence
                .mrd_serialize(&mut writer)
                .expect("sha256d::Writer is infallible");
        }
        CompactInt::from(self.outputs.len())
            .mrd_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        for output in self.outputs.iter() {
            output
                .mrd_serialize(&mut writer)
                .expect("sha256d::Writer is infallible");
        }
        self.lock_time
            .mrd_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");
        hash_type
            .mrd_serialize(&mut writer)
            .expect("sha256d::Writer is infallible");

        Ok(writer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::transaction::{Hash, LockTime};
    use crate::transparent::{Input, OutPoint, Output, Script, SEQUENCE_FINAL};

    fn two_input_tx() -> Transaction {
        let input = |byte| Input {
            previous_output: OutPoint {
                hash: Hash([byte; 32]),
                index: 0,
            },
            script_sig: Script(vec![0xAB, 0xCD]),
            sequence: SEQUENCE_FINAL,
        };
        Transaction::new(
            1,
            vec![input(1), input(2)],
            vec![Output {
                value: Amount::from_units(10).unwrap(),
                script_pubkey: Script(vec![0x51]),
            }],
            LockTime(0),
        )
    }

    #[test]
    fn digest_ignores_other_inputs_scripts() {
        meridian_test::init();

        let script_code = [0x76, 0xA9];
        let base = two_input_tx();
        let mut modified = base.clone();
        modified.inputs[1].script_sig = Script(vec![0xFF; 20]);

        // The digest for input 0 replaces input 1's script with the empty
        // script, so changing it must not change the digest.
        assert_eq!(
            base.signature_hash(0, &script_code, SIGHASH_ALL).unwrap(),
            modified
                .signature_hash(0, &script_code, SIGHASH_ALL)
                .unwrap(),
        );
    }

    #[test]
    fn digest_depends_on_index_and_script_code() {
        meridian_test::init();

        let tx = two_input_tx();
        let a = tx.signature_hash(0, &[0x76], SIGHASH_ALL).unwrap();
        let b = tx.signature_hash(1, &[0x76], SIGHASH_ALL).unwrap();
        let c = tx.signature_hash(0, &[0x77], SIGHASH_ALL).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn out_of_bounds_index_is_an_error() {
        meridian_test::init();

        let tx = two_input_tx();
        assert_eq!(
            tx.signature_hash(2, &[], SIGHASH_ALL),
            Err(SighashError::IndexOutOfBounds {
                index: 2,
                inputs: 2
            })
        );
    }
}

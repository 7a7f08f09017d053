//! Standard script templates: recognition and construction.

use meridian_chain::transparent::Script;

use crate::interpreter::parse_op;
use crate::opcodes::*;

/// The largest payload a null-data output may carry.
pub const MAX_NULL_DATA_BYTES: usize = 80;

/// The standard shapes a lock script can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptTemplate {
    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    PayToPubkeyHash([u8; 20]),
    /// `OP_HASH160 <20 bytes> OP_EQUAL`
    PayToScriptHash([u8; 20]),
    /// `<pubkey> OP_CHECKSIG`
    PayToPubkey(Vec<u8>),
    /// `OP_M <pk…> OP_N OP_CHECKMULTISIG`
    Multisig { required: u8, keys: Vec<Vec<u8>> },
    /// `OP_RETURN <≤80 bytes>`
    NullData(Vec<u8>),
    /// Anything else.
    NonStandard,
}

impl ScriptTemplate {
    /// Classify a lock script against the standard templates.
    pub fn classify(script: &Script) -> ScriptTemplate {
        let code = script.as_bytes();

        // P2PKH: OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
        if code.len() == 25
            && code[0] == OP_DUP
            && code[1] == OP_HASH160
            && code[2] == 20
            && code[23] == OP_EQUALVERIFY
            && code[24] == OP_CHECKSIG
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&code[3..23]);
            return ScriptTemplate::PayToPubkeyHash(hash);
        }

        // P2SH: OP_HASH160 <20> OP_EQUAL
        if code.len() == 23 && code[0] == OP_HASH160 && code[1] == 20 && code[22] == OP_EQUAL {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&code[2..22]);
            return ScriptTemplate::PayToScriptHash(hash);
        }

        // P2PK: <33 or 65 byte pubkey> OP_CHECKSIG
        if (code.len() == 35 || code.len() == 67)
            && code[0] as usize == code.len() - 2
            && code[code.len() - 1] == OP_CHECKSIG
        {
            return ScriptTemplate::PayToPubkey(code[1..code.len() - 1].to_vec());
        }

        // Null data: OP_RETURN [<push>]
        if !code.is_empty() && code[0] == OP_RETURN {
            let payload = match code.len() {
                1 => Vec::new(),
                _ => match parse_op(code, 1) {
                    Ok((op, Some(data), next))
                        if op <= OP_PUSHDATA4
                            && next == code.len()
                            && data.len() <= MAX_NULL_DATA_BYTES =>
                    {
                        data.to_vec()
                    }
                    _ => return ScriptTemplate::NonStandard,
                },
            };
            return ScriptTemplate::NullData(payload);
        }

        // Multisig: OP_M <pk...> OP_N OP_CHECKMULTISIG
        if code.len() >= 4
            && (OP_1..=OP_16).contains(&code[0])
            && code[code.len() - 1] == OP_CHECKMULTISIG
            && (OP_1..=OP_16).contains(&code[code.len() - 2])
        {
            let required = code[0] - OP_1 + 1;
            let declared = code[code.len() - 2] - OP_1 + 1;
            let mut keys = Vec::new();
            let mut pc = 1;
            while pc < code.len() - 2 {
                match parse_op(code, pc) {
                    Ok((op, Some(data), next))
                        if (0x01..=0x4b).contains(&op) && next <= code.len() - 2 =>
                    {
                        keys.push(data.to_vec());
                        pc = next;
                    }
                    _ => return ScriptTemplate::NonStandard,
                }
            }
            if required <= declared && keys.len() == declared as usize {
                return ScriptTemplate::Multisig { required, keys };
            }
        }

        ScriptTemplate::NonStandard
    }

    /// The 20-byte destination hash, for templates that have one.
    pub fn destination(&self) -> Option<[u8; 20]> {
        match self {
            ScriptTemplate::PayToPubkeyHash(hash) => Some(*hash),
            ScriptTemplate::PayToScriptHash(hash) => Some(*hash),
            ScriptTemplate::PayToPubkey(key) => {
                Some(meridian_chain::primitives::hash160(key))
            }
            _ => None,
        }
    }
}

/// Build the canonical pay-to-pubkey-hash lock script.
pub fn pay_to_pubkey_hash(pub_key_hash: [u8; 20]) -> Script {
    let mut code = Vec::with_capacity(25);
    code.push(OP_DUP);
    code.push(OP_HASH160);
    code.push(20);
    code.extend_from_slice(&pub_key_hash);
    code.push(OP_EQUALVERIFY);
    code.push(OP_CHECKSIG);
    Script(code)
}

/// Build the canonical pay-to-script-hash lock script.
pub fn pay_to_script_hash(script_hash: [u8; 20]) -> Script {
    let mut code = Vec::with_capacity(23);
    code.push(OP_HASH160);
    code.push(20);
    code.extend_from_slice(&script_hash);
    code.push(OP_EQUAL);
    Script(code)
}

/// Build the pay-to-pubkey lock script.
pub fn pay_to_pubkey(pub_key: &[u8]) -> Script {
    let mut code = Vec::with_capacity(pub_key.len() + 2);
    code.push(pub_key.len() as u8);
    code.extend_from_slice(pub_key);
    code.push(OP_CHECKSIG);
    Script(code)
}

/// Build an M-of-N multisig lock script.
pub fn multisig(required: u8, keys: &[Vec<u8>]) -> Script {
    let mut code = Vec::new();
    code.push(OP_1 + required - 1);
    for key in keys {
        code.push(key.len() as u8);
        code.extend_from_slice(key);
    }
    code.push(OP_1 + keys.len() as u8 - 1);
    code.push(OP_CHECKMULTISIG);
    Script(code)
}

/// Build a provably unspendable data-carrier output script.
pub fn null_data(data: &[u8]) -> Script {
    let mut code = Vec::with_capacity(data.len() + 2);
    code.push(OP_RETURN);
    if data.len() < OP_PUSHDATA1 as usize {
        code.push(data.len() as u8);
    } else {
        code.push(OP_PUSHDATA1);
        code.push(data.len() as u8);
    }
    code.extend_from_slice(data);
    Script(code)
}

/// Count the signature operations in a script, using the legacy accounting:
/// each CHECKSIG counts 1, each CHECKMULTISIG counts the key maximum.
///
/// Malformed trailing pushes end the count early, matching how the
/// interpreter would never reach them.
pub fn sigop_count(script: &Script) -> u64 {
    let code = script.as_bytes();
    let mut count = 0u64;
    let mut pc = 0;
    while pc < code.len() {
        match parse_op(code, pc) {
            Ok((op, _, next)) => {
                match op {
                    OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                    OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                        count += crate::interpreter::MAX_MULTISIG_KEYS as u64
                    }
                    _ => {}
                }
                pc = next;
            }
            Err(_) => break,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::primitives::hash160;

    #[test]
    fn p2pkh_round_trip() {
        meridian_test::init();

        let hash = [0x11; 20];
        let script = pay_to_pubkey_hash(hash);
        assert_eq!(
            ScriptTemplate::classify(&script),
            ScriptTemplate::PayToPubkeyHash(hash)
        );
        assert_eq!(ScriptTemplate::classify(&script).destination(), Some(hash));
    }

    #[test]
    fn p2sh_round_trip() {
        meridian_test::init();

        let hash = [0x22; 20];
        let script = pay_to_script_hash(hash);
        assert_eq!(
            ScriptTemplate::classify(&script),
            ScriptTemplate::PayToScriptHash(hash)
        );
    }

    #[test]
    fn p2pk_round_trip() {
        meridian_test::init();

        let key = vec![0x02; 33];
        let script = pay_to_pubkey(&key);
        let template = ScriptTemplate::classify(&script);
        assert_eq!(template, ScriptTemplate::PayToPubkey(key.clone()));
        assert_eq!(template.destination(), Some(hash160(&key)));
    }

    #[test]
    fn multisig_round_trip() {
        meridian_test::init();

        let keys = vec![vec![0x02; 33], vec![0x03; 33]];
        let script = multisig(1, &keys);
        assert_eq!(
            ScriptTemplate::classify(&script),
            ScriptTemplate::Multisig { required: 1, keys }
        );
    }

    #[test]
    fn null_data_round_trip() {
        meridian_test::init();

        let script = null_data(b"proof of existence");
        assert_eq!(
            ScriptTemplate::classify(&script),
            ScriptTemplate::NullData(b"proof of existence".to_vec())
        );

        // Payloads above 80 bytes are not standard.
        let large = null_data(&[0u8; 81]);
        assert_eq!(ScriptTemplate::classify(&large), ScriptTemplate::NonStandard);
    }

    #[test]
    fn garbage_is_non_standard() {
        meridian_test::init();

        assert_eq!(
            ScriptTemplate::classify(&Script(vec![OP_NOP, OP_NOP])),
            ScriptTemplate::NonStandard
        );
        assert_eq!(
            ScriptTemplate::classify(&Script(vec![])),
            ScriptTemplate::NonStandard
        );
    }

    #[test]
    fn sigop_accounting() {
        meridian_test::init();

        assert_eq!(sigop_count(&pay_to_pubkey_hash([0; 20])), 1);
        let keys = vec![vec![0x02; 33], vec![0x03; 33]];
        assert_eq!(sigop_count(&multisig(2, &keys)), 20);
        assert_eq!(sigop_count(&Script(vec![OP_NOP])), 0);
    }
}

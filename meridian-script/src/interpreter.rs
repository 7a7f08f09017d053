//! Script evaluation.

use meridian_chain::primitives::{hash160, ripemd160, sha256, sha256d};
use meridian_chain::transaction::{Transaction, SIGHASH_ALL};
use secp256k1::{Message, PublicKey, Secp256k1, Signature, VerifyOnly};
use sha1::{Digest, Sha1};

use crate::error::ScriptError;
use crate::opcodes::*;

/// Scripts longer than this fail before evaluation.
pub const MAX_SCRIPT_BYTES: usize = 10_000;
/// A single push may carry at most this many bytes.
pub const MAX_PUSH_BYTES: usize = 520;
/// Main and alt stack combined may not exceed this depth.
pub const MAX_STACK_DEPTH: usize = 1_000;
/// Non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Keys per CHECKMULTISIG.
pub const MAX_MULTISIG_KEYS: usize = 20;

/// Verify that `script_sig` authorizes spending the output locked by
/// `script_pubkey`, in the context of `tx`'s input at `input_index`.
///
/// Evaluates `script_sig` to seed the stack, then `script_pubkey` against
/// it; success requires a non-empty stack with a truthy top element. For
/// pay-to-script-hash lock scripts, the redeem script (the last datum the
/// unlock script pushed) is then evaluated the same way.
pub fn verify_script(
    script_sig: &[u8],
    script_pubkey: &[u8],
    tx: &Transaction,
    input_index: usize,
) -> Result<(), ScriptError> {
    let mut interpreter = Interpreter::new(tx, input_index);

    let is_p2sh = is_pay_to_script_hash(script_pubkey);
    if is_p2sh && !is_push_only(script_sig)? {
        return Err(ScriptError::SigPushOnly);
    }

    interpreter.eval(script_sig)?;
    let sig_stack = if is_p2sh {
        interpreter.stack.clone()
    } else {
        Vec::new()
    };

    interpreter.eval(script_pubkey)?;
    if !interpreter.final_stack_is_true() {
        return Err(ScriptError::EvalFalse);
    }

    if is_p2sh {
        // Re-run with the unlock stack, treating its top element as the
        // real lock script.
        interpreter.stack = sig_stack;
        let redeem_script = interpreter.pop()?;
        interpreter.eval(&redeem_script)?;
        if !interpreter.final_stack_is_true() {
            return Err(ScriptError::EvalFalse);
        }
    }

    Ok(())
}

/// Recognizes the `OP_HASH160 <20 bytes> OP_EQUAL` lock script pattern.
pub(crate) fn is_pay_to_script_hash(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 20 && script[22] == OP_EQUAL
}

/// One parsed operation: the opcode, its immediate data (for pushes), and
/// the offset of the next operation.
pub(crate) fn parse_op(script: &[u8], pc: usize) -> Result<(u8, Option<&[u8]>, usize), ScriptError> {
    let op = script[pc];
    let (data_len, header_len) = match op {
        0x01..=0x4b => (op as usize, 1),
        OP_PUSHDATA1 => {
            let len = *script.get(pc + 1).ok_or(ScriptError::PushPastEnd)? as usize;
            (len, 2)
        }
        OP_PUSHDATA2 => {
            let bytes = script
                .get(pc + 1..pc + 3)
                .ok_or(ScriptError::PushPastEnd)?;
            (u16::from_le_bytes([bytes[0], bytes[1]]) as usize, 3)
        }
        OP_PUSHDATA4 => {
            let bytes = script
                .get(pc + 1..pc + 5)
                .ok_or(ScriptError::PushPastEnd)?;
            (
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
                5,
            )
        }
        _ => return Ok((op, None, pc + 1)),
    };

    let start = pc + header_len;
    let end = start.checked_add(data_len).ok_or(ScriptError::PushPastEnd)?;
    if end > script.len() {
        return Err(ScriptError::PushPastEnd);
    }
    Ok((op, Some(&script[start..end]), end))
}

fn is_push_only(script: &[u8]) -> Result<bool, ScriptError> {
    let mut pc = 0;
    while pc < script.len() {
        let (op, _, next) = parse_op(script, pc)?;
        if op > OP_16 {
            return Ok(false);
        }
        pc = next;
    }
    Ok(true)
}

/// Remove every push of exactly `data` from `code`, scanning at opcode
/// boundaries. Used to scrub signatures out of the script being signed.
fn find_and_delete(code: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(code.len());
    let mut pc = 0;
    while pc < code.len() {
        match parse_op(code, pc) {
            Ok((op, pushed, next)) => {
                let matches = (0x01..=0x4b).contains(&op) && pushed == Some(data);
                if !matches {
                    out.extend_from_slice(&code[pc..next]);
                }
                pc = next;
            }
            Err(_) => {
                // A malformed trailing push cannot contain the signature;
                // keep it verbatim.
                out.extend_from_slice(&code[pc..]);
                break;
            }
        }
    }
    out
}

/// Decode a numeric operand: little-endian, sign-magnitude in the top bit,
/// minimally encoded, at most four bytes.
fn decode_num(bytes: &[u8]) -> Result<i64, ScriptError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    if bytes.len() > 4 {
        return Err(ScriptError::NumberOverflow);
    }

    let last = bytes[bytes.len() - 1];
    if last & 0x7f == 0 {
        // The top byte carries only a sign (or nothing); it is redundant
        // unless the byte below needs its high bit as payload.
        if bytes.len() <= 1 || bytes[bytes.len() - 2] & 0x80 == 0 {
            return Err(ScriptError::NonMinimalNumber);
        }
    }

    let mut result: i64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        result |= (byte as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        let sign_bit = 0x80i64 << (8 * (bytes.len() - 1));
        result = -(result & !sign_bit);
    }
    Ok(result)
}

/// Encode a number in the minimal script form. Zero is the empty vector.
fn encode_num(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut out = Vec::new();
    while magnitude > 0 {
        out.push((magnitude & 0xff) as u8);
        magnitude >>= 8;
    }
    if out.last().copied().unwrap_or(0) & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = out.last_mut().expect("nonzero value has bytes");
        *last |= 0x80;
    }
    out
}

/// Truthiness: not empty, not all zeros, and not negative zero.
fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, &byte) in bytes.iter().enumerate() {
        if byte != 0 {
            // The sign bit alone in the top byte is negative zero.
            return !(i == bytes.len() - 1 && byte == 0x80);
        }
    }
    false
}

fn bool_vec(value: bool) -> Vec<u8> {
    if value {
        vec![1]
    } else {
        Vec::new()
    }
}

/// The owned evaluation state for one input verification.
pub struct Interpreter<'a> {
    tx: &'a Transaction,
    input_index: usize,
    stack: Vec<Vec<u8>>,
    alt_stack: Vec<Vec<u8>>,
    secp: Secp256k1<VerifyOnly>,
}

impl<'a> std::fmt::Debug for Interpreter<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("input_index", &self.input_index)
            .field("stack_depth", &self.stack.len())
            .finish()
    }
}

impl<'a> Interpreter<'a> {
    pub fn new(tx: &'a Transaction, input_index: usize) -> Interpreter<'a> {
        Interpreter {
            tx,
            input_index,
            stack: Vec::new(),
            alt_stack: Vec::new(),
            secp: Secp256k1::verification_only(),
        }
    }

    fn final_stack_is_true(&self) -> bool {
        self.stack.last().map_or(false, |top| cast_to_bool(top))
    }

    fn pop(&mut self) -> Result<Vec<u8>, ScriptError> {
        self.stack.pop().ok_or(ScriptError::StackUnderflow)
    }

    fn pop_num(&mut self) -> Result<i64, ScriptError> {
        decode_num(&self.pop()?)
    }

    fn peek(&self, depth_from_top: usize) -> Result<&Vec<u8>, ScriptError> {
        if depth_from_top >= self.stack.len() {
            return Err(ScriptError::StackUnderflow);
        }
        Ok(&self.stack[self.stack.len() - 1 - depth_from_top])
    }

    fn push(&mut self, value: Vec<u8>) {
        self.stack.push(value);
    }

    /// Evaluate one script against the current stack.
    pub fn eval(&mut self, script: &[u8]) -> Result<(), ScriptError> {
        if script.len() > MAX_SCRIPT_BYTES {
            return Err(ScriptError::ScriptTooLarge(MAX_SCRIPT_BYTES));
        }

        let mut exec_stack: Vec<bool> = Vec::new();
        let mut op_count: usize = 0;
        // `OP_CODESEPARATOR` truncates the start of the code that signature
        // hashing covers.
        let mut code_sep: usize = 0;
        let mut pc: usize = 0;

        while pc < script.len() {
            let (op, pushed, next) = parse_op(script, pc)?;
            let executing = exec_stack.iter().all(|branch| *branch);

            // Disabled opcodes poison the script even in untaken branches.
            if is_disabled(op) {
                return Err(ScriptError::DisabledOpcode(op));
            }

            if let Some(data) = pushed {
                if data.len() > MAX_PUSH_BYTES {
                    return Err(ScriptError::PushTooLarge(MAX_PUSH_BYTES));
                }
                if executing {
                    self.push(data.to_vec());
                }
            } else {
                if op > OP_16 {
                    op_count += 1;
                    if op_count > MAX_OPS_PER_SCRIPT {
                        return Err(ScriptError::TooManyOps(MAX_OPS_PER_SCRIPT));
                    }
                }

                match op {
                    // Conditionals run even in untaken branches so nesting
                    // stays balanced.
                    OP_IF | OP_NOTIF => {
                        let branch = if executing {
                            let condition = cast_to_bool(&self.pop()?);
                            if op == OP_IF {
                                condition
                            } else {
                                !condition
                            }
                        } else {
                            false
                        };
                        exec_stack.push(branch);
                    }
                    OP_ELSE => {
                        let branch = exec_stack
                            .last_mut()
                            .ok_or(ScriptError::UnbalancedConditional)?;
                        *branch = !*branch;
                    }
                    OP_ENDIF => {
                        exec_stack
                            .pop()
                            .ok_or(ScriptError::UnbalancedConditional)?;
                    }
                    _ if !executing => {}
                    _ => self.execute_op(op, script, code_sep, &mut op_count)?,
                }
            }

            if op == OP_CODESEPARATOR && executing {
                code_sep = next;
            }

            if self.stack.len() + self.alt_stack.len() > MAX_STACK_DEPTH {
                return Err(ScriptError::StackOverflow(MAX_STACK_DEPTH));
            }
            pc = next;
        }

        if !exec_stack.is_empty() {
            return Err(ScriptError::UnbalancedConditional);
        }
        Ok(())
    }

    fn execute_op(
        &mut self,
        op: u8,
        script: &[u8],
        code_sep: usize,
        op_count: &mut usize,
    ) -> Result<(), ScriptError> {
        match op {
            OP_0 => self.push(Vec::new()),
            OP_1NEGATE => self.push(encode_num(-1)),
            OP_1..=OP_16 => self.push(encode_num((op - OP_1 + 1) as i64)),

            OP_NOP | OP_NOP1..=OP_NOP10 => {}
            OP_VERIFY => {
                let top = self.pop()?;
                if !cast_to_bool(&top) {
                    return Err(ScriptError::VerifyFailed);
                }
            }
            OP_RETURN => return Err(ScriptError::OpReturn),

            OP_TOALTSTACK => {
                let top = self.pop()?;
                self.alt_stack.push(top);
            }
            OP_FROMALTSTACK => {
                let top = self
                    .alt_stack
                    .pop()
                    .ok_or(ScriptError::AltStackUnderflow)?;
                self.push(top);
            }
            OP_2DROP => {
                self.pop()?;
                self.pop()?;
            }
            OP_2DUP => {
                let (a, b) = (self.peek(1)?.clone(), self.peek(0)?.clone());
                self.push(a);
                self.push(b);
            }
            OP_3DUP => {
                let (a, b, c) = (
                    self.peek(2)?.clone(),
                    self.peek(1)?.clone(),
                    self.peek(0)?.clone(),
                );
                self.push(a);
                self.push(b);
                self.push(c);
            }
            OP_2OVER => {
                let (a, b) = (self.peek(3)?.clone(), self.peek(2)?.clone());
                self.push(a);
                self.push(b);
            }
            OP_2ROT => {
                // x1 x2 x3 x4 x5 x6 -> x3 x4 x5 x6 x1 x2
                if self.stack.len() < 6 {
                    return Err(ScriptError::StackUnderflow);
                }
                let len = self.stack.len();
                let moved: Vec<_> = self.stack.drain(len - 6..len - 4).collect();
                self.stack.extend(moved);
            }
            OP_2SWAP => {
                // x1 x2 x3 x4 -> x3 x4 x1 x2
                if self.stack.len() < 4 {
                    return Err(ScriptError::StackUnderflow);
                }
                let len = self.stack.len();
                let moved: Vec<_> = self.stack.drain(len - 4..len - 2).collect();
                self.stack.extend(moved);
            }
            OP_IFDUP => {
                let top = self.peek(0)?.clone();
                if cast_to_bool(&top) {
                    self.push(top);
                }
            }
            OP_DEPTH => {
                let depth = self.stack.len() as i64;
                self.push(encode_num(depth));
            }
            OP_DROP => {
                self.pop()?;
            }
            OP_DUP => {
                let top = self.peek(0)?.clone();
                self.push(top);
            }
            OP_NIP => {
                let top = self.pop()?;
                self.pop()?;
                self.push(top);
            }
            OP_OVER => {
                let second = self.peek(1)?.clone();
                self.push(second);
            }
            OP_PICK | OP_ROLL => {
                let depth = self.pop_num()?;
                if depth < 0 || depth as usize >= self.stack.len() {
                    return Err(ScriptError::StackUnderflow);
                }
                let index = self.stack.len() - 1 - depth as usize;
                let value = if op == OP_PICK {
                    self.stack[index].clone()
                } else {
                    self.stack.remove(index)
                };
                self.push(value);
            }
            OP_ROT => {
                // x1 x2 x3 -> x2 x3 x1
                if self.stack.len() < 3 {
                    return Err(ScriptError::StackUnderflow);
                }
                let value = self.stack.remove(self.stack.len() - 3);
                self.push(value);
            }
            OP_SWAP => {
                let (a, b) = (self.pop()?, self.pop()?);
                self.push(a);
                self.push(b);
            }
            OP_TUCK => {
                if self.stack.len() < 2 {
                    return Err(ScriptError::StackUnderflow);
                }
                let top = self.peek(0)?.clone();
                self.stack.insert(self.stack.len() - 2, top);
            }
            OP_SIZE => {
                let size = self.peek(0)?.len() as i64;
                self.push(encode_num(size));
            }

            OP_EQUAL | OP_EQUALVERIFY => {
                let (b, a) = (self.pop()?, self.pop()?);
                let equal = a == b;
                if op == OP_EQUAL {
                    self.push(bool_vec(equal));
                } else if !equal {
                    return Err(ScriptError::EqualVerifyFailed);
                }
            }

            OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                let value = self.pop_num()?;
                let result = match op {
                    OP_1ADD => value + 1,
                    OP_1SUB => value - 1,
                    OP_NEGATE => -value,
                    OP_ABS => value.abs(),
                    OP_NOT => (value == 0) as i64,
                    _ => (value != 0) as i64,
                };
                self.push(encode_num(result));
            }
            OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
            | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_GREATERTHAN | OP_LESSTHANOREQUAL
            | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                let b = self.pop_num()?;
                let a = self.pop_num()?;
                let result = match op {
                    OP_ADD => a + b,
                    OP_SUB => a - b,
                    OP_BOOLAND => (a != 0 && b != 0) as i64,
                    OP_BOOLOR => (a != 0 || b != 0) as i64,
                    OP_NUMEQUAL => (a == b) as i64,
                    OP_NUMEQUALVERIFY => {
                        if a != b {
                            return Err(ScriptError::NumEqualVerifyFailed);
                        }
                        return Ok(());
                    }
                    OP_NUMNOTEQUAL => (a != b) as i64,
                    OP_LESSTHAN => (a < b) as i64,
                    OP_GREATERTHAN => (a > b) as i64,
                    OP_LESSTHANOREQUAL => (a <= b) as i64,
                    OP_GREATERTHANOREQUAL => (a >= b) as i64,
                    OP_MIN => a.min(b),
                    _ => a.max(b),
                };
                self.push(encode_num(result));
            }
            OP_WITHIN => {
                let max = self.pop_num()?;
                let min = self.pop_num()?;
                let value = self.pop_num()?;
                self.push(bool_vec(min <= value && value < max));
            }

            OP_RIPEMD160 => {
                let value = self.pop()?;
                self.push(ripemd160(&value).to_vec());
            }
            OP_SHA1 => {
                let value = self.pop()?;
                self.push(Sha1::digest(&value).to_vec());
            }
            OP_SHA256 => {
                let value = self.pop()?;
                self.push(sha256(&value).to_vec());
            }
            OP_HASH160 => {
                let value = self.pop()?;
                self.push(hash160(&value).to_vec());
            }
            OP_HASH256 => {
                let value = self.pop()?;
                self.push(sha256d(&value).to_vec());
            }
            OP_CODESEPARATOR => {
                // Handled by the eval loop, which knows the next offset.
            }

            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                let pubkey = self.pop()?;
                let sig = self.pop()?;
                let script_code = find_and_delete(&script[code_sep..], &sig);
                let valid = self.check_signature(&sig, &pubkey, &script_code)?;
                if op == OP_CHECKSIG {
                    self.push(bool_vec(valid));
                } else if !valid {
                    return Err(ScriptError::CheckSigVerifyFailed);
                }
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                let key_count = self.pop_num()?;
                if key_count < 0 || key_count as usize > MAX_MULTISIG_KEYS {
                    return Err(ScriptError::BadMultisigKeyCount(key_count.max(0) as usize));
                }
                let key_count = key_count as usize;
                // Each key counts against the op budget.
                *op_count += key_count;
                if *op_count > MAX_OPS_PER_SCRIPT {
                    return Err(ScriptError::TooManyOps(MAX_OPS_PER_SCRIPT));
                }

                let mut keys = Vec::with_capacity(key_count);
                for _ in 0..key_count {
                    keys.push(self.pop()?);
                }
                keys.reverse();

                let sig_count = self.pop_num()?;
                if sig_count < 0 || sig_count as usize > key_count {
                    return Err(ScriptError::BadMultisigSigCount(sig_count.max(0) as usize));
                }
                let sig_count = sig_count as usize;

                let mut sigs = Vec::with_capacity(sig_count);
                for _ in 0..sig_count {
                    sigs.push(self.pop()?);
                }
                sigs.reverse();

                // The historical off-by-one: one extra element is consumed,
                // and it must be empty so it cannot be malleated.
                let dummy = self.pop()?;
                if !dummy.is_empty() {
                    return Err(ScriptError::NonEmptyMultisigDummy);
                }

                // Scrub every signature before hashing.
                let mut script_code = script[code_sep..].to_vec();
                for sig in sigs.iter() {
                    script_code = find_and_delete(&script_code, sig);
                }

                // Signatures must match keys in order, so each failed key
                // narrows the remaining window.
                let mut valid = true;
                let (mut sig_index, mut key_index) = (0, 0);
                while sig_index < sigs.len() {
                    if keys.len() - key_index < sigs.len() - sig_index {
                        valid = false;
                        break;
                    }
                    if self.check_signature(&sigs[sig_index], &keys[key_index], &script_code)? {
                        sig_index += 1;
                    }
                    key_index += 1;
                }

                if op == OP_CHECKMULTISIG {
                    self.push(bool_vec(valid));
                } else if !valid {
                    return Err(ScriptError::CheckMultiSigVerifyFailed);
                }
            }

            other => return Err(ScriptError::UnknownOpcode(other)),
        }
        Ok(())
    }

    /// Check one signature against one public key and the given signing
    /// code. Malformed signatures are hard errors; a well-formed signature
    /// that simply doesn't verify yields `false`.
    fn check_signature(
        &self,
        sig_bytes: &[u8],
        pubkey_bytes: &[u8],
        script_code: &[u8],
    ) -> Result<bool, ScriptError> {
        let (der, hash_type_byte) = match sig_bytes.split_last() {
            Some((last, der)) => (der, *last),
            None => return Ok(false),
        };

        let hash_type = hash_type_byte as u32;
        if hash_type != SIGHASH_ALL {
            return Err(ScriptError::UnsupportedSighashType(hash_type));
        }

        let signature = Signature::from_der(der).map_err(|_| ScriptError::NonDerSignature)?;
        let mut normalized = signature;
        normalized.normalize_s();
        if normalized != signature {
            return Err(ScriptError::HighS);
        }

        let digest = self
            .tx
            .signature_hash(self.input_index, script_code, hash_type)
            .map_err(|_| ScriptError::SighashIndex)?;
        let message = Message::from_slice(&digest).expect("digest is 32 bytes");

        let pubkey = match PublicKey::from_slice(pubkey_bytes) {
            Ok(pubkey) => pubkey,
            Err(_) => return Ok(false),
        };

        Ok(self.secp.verify(&message, &signature, &pubkey).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_chain::amount::Amount;
    use meridian_chain::transaction::{Hash, LockTime};
    use meridian_chain::transparent::{Input, OutPoint, Output, Script, SEQUENCE_FINAL};

    fn dummy_tx() -> Transaction {
        Transaction::new(
            1,
            vec![Input {
                previous_output: OutPoint {
                    hash: Hash([9; 32]),
                    index: 0,
                },
                script_sig: Script(vec![]),
                sequence: SEQUENCE_FINAL,
            }],
            vec![Output {
                value: Amount::from_units(1).unwrap(),
                script_pubkey: Script(vec![]),
            }],
            LockTime(0),
        )
    }

    fn run(script_sig: &[u8], script_pubkey: &[u8]) -> Result<(), ScriptError> {
        let tx = dummy_tx();
        verify_script(script_sig, script_pubkey, &tx, 0)
    }

    #[test]
    fn number_encoding_is_minimal_and_signed() {
        meridian_test::init();

        assert_eq!(encode_num(0), Vec::<u8>::new());
        assert_eq!(encode_num(1), vec![1]);
        assert_eq!(encode_num(-1), vec![0x81]);
        assert_eq!(encode_num(127), vec![0x7f]);
        assert_eq!(encode_num(128), vec![0x80, 0x00]);
        assert_eq!(encode_num(-128), vec![0x80, 0x80]);
        assert_eq!(encode_num(256), vec![0x00, 0x01]);

        for value in [0i64, 1, -1, 127, 128, -128, 255, 256, -32768, 0x7fffffff] {
            assert_eq!(decode_num(&encode_num(value)).unwrap(), value);
        }

        // Redundant zero padding is rejected.
        assert_eq!(decode_num(&[0x01, 0x00]), Err(ScriptError::NonMinimalNumber));
        // But a padding byte that protects a payload high bit is minimal.
        assert_eq!(decode_num(&[0x80, 0x00]).unwrap(), 128);
        // Operands wider than 4 bytes overflow.
        assert_eq!(
            decode_num(&[1, 2, 3, 4, 5]),
            Err(ScriptError::NumberOverflow)
        );
    }

    #[test]
    fn truthiness_of_negative_zero() {
        meridian_test::init();

        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0, 0]));
        assert!(!cast_to_bool(&[0, 0x80]));
        assert!(cast_to_bool(&[1]));
        assert!(cast_to_bool(&[0x80, 0]));
    }

    #[test]
    fn arithmetic_and_equality() {
        meridian_test::init();

        // 2 3 OP_ADD 5 OP_NUMEQUAL
        run(&[OP_1 + 1, OP_1 + 2], &[OP_ADD, OP_1 + 4, OP_NUMEQUAL]).unwrap();
        // 5 4 OP_SUB 1 OP_EQUAL
        run(&[OP_1 + 4, OP_1 + 3], &[OP_SUB, OP_1, OP_EQUAL]).unwrap();
        assert_eq!(
            run(&[OP_1, OP_1 + 1], &[OP_ADD, OP_1, OP_NUMEQUAL]),
            Err(ScriptError::EvalFalse)
        );
    }

    #[test]
    fn conditionals_follow_the_branch() {
        meridian_test::init();

        // 1 OP_IF 2 OP_ELSE 3 OP_ENDIF 2 OP_EQUAL
        run(
            &[OP_1],
            &[OP_IF, OP_1 + 1, OP_ELSE, OP_1 + 2, OP_ENDIF, OP_1 + 1, OP_EQUAL],
        )
        .unwrap();
        // 0 OP_IF 2 OP_ELSE 3 OP_ENDIF 3 OP_EQUAL
        run(
            &[OP_0],
            &[OP_IF, OP_1 + 1, OP_ELSE, OP_1 + 2, OP_ENDIF, OP_1 + 2, OP_EQUAL],
        )
        .unwrap();
        // Unterminated conditional fails.
        assert_eq!(
            run(&[OP_1], &[OP_IF, OP_1]),
            Err(ScriptError::UnbalancedConditional)
        );
    }

    #[test]
    fn op_return_always_fails() {
        meridian_test::init();

        assert_eq!(run(&[OP_1], &[OP_RETURN]), Err(ScriptError::OpReturn));
    }

    #[test]
    fn disabled_opcodes_fail_even_unexecuted() {
        meridian_test::init();

        assert_eq!(
            run(&[OP_1], &[OP_IF, OP_ENDIF, OP_0, OP_IF, OP_CAT, OP_ENDIF]),
            Err(ScriptError::DisabledOpcode(OP_CAT))
        );
    }

    #[test]
    fn pushdata_variants_push_the_same_bytes() {
        meridian_test::init();

        let direct = [3, 0xAA, 0xBB, 0xCC];

        // Push the same data twice (directly, then via a PUSHDATA form)
        // and require equality.
        let mut with_pushdata1 = direct.to_vec();
        with_pushdata1.extend_from_slice(&[OP_PUSHDATA1, 3, 0xAA, 0xBB, 0xCC]);
        run(&with_pushdata1, &[OP_EQUAL]).unwrap();

        let mut with_pushdata2 = direct.to_vec();
        with_pushdata2.extend_from_slice(&[OP_PUSHDATA2, 3, 0, 0xAA, 0xBB, 0xCC]);
        run(&with_pushdata2, &[OP_EQUAL]).unwrap();
    }

    #[test]
    fn oversized_push_is_rejected() {
        meridian_test::init();

        let mut script = vec![OP_PUSHDATA2];
        let len = (MAX_PUSH_BYTES + 1) as u16;
        script.extend_from_slice(&len.to_le_bytes());
        script.extend(std::iter::repeat(0u8).take(MAX_PUSH_BYTES + 1));
        assert_eq!(
            run(&script, &[OP_DROP, OP_1]),
            Err(ScriptError::PushTooLarge(MAX_PUSH_BYTES))
        );
    }

    #[test]
    fn alt_stack_round_trips() {
        meridian_test::init();

        // 7 OP_TOALTSTACK 1 OP_DROP OP_FROMALTSTACK 7 OP_EQUAL
        run(
            &[OP_1 + 6],
            &[
                OP_TOALTSTACK,
                OP_1,
                OP_DROP,
                OP_FROMALTSTACK,
                OP_1 + 6,
                OP_EQUAL,
            ],
        )
        .unwrap();
    }

    #[test]
    fn stack_manipulation_ops() {
        meridian_test::init();

        // 1 2 OP_SWAP => 2 1; top is 1
        run(&[OP_1, OP_1 + 1], &[OP_SWAP, OP_DROP, OP_1 + 1, OP_EQUAL]).unwrap();
        // DEPTH of empty unlock stack is 0
        run(&[], &[OP_DEPTH, OP_0, OP_EQUAL]).unwrap();
        // 1 2 3 OP_ROT => 2 3 1
        run(
            &[OP_1, OP_1 + 1, OP_1 + 2],
            &[OP_ROT, OP_1, OP_EQUAL, OP_VERIFY, OP_2DROP, OP_1],
        )
        .unwrap();
        // 4 1 OP_PICK duplicates the second-from-top
        run(
            &[OP_1 + 3, OP_1],
            &[OP_1, OP_PICK, OP_1 + 3, OP_EQUAL, OP_VERIFY, OP_2DROP, OP_1],
        )
        .unwrap();
    }

    #[test]
    fn find_and_delete_removes_exact_pushes() {
        meridian_test::init();

        let sig = vec![0xDE, 0xAD];
        // [push sig] OP_DUP [push sig]
        let mut code = vec![2, 0xDE, 0xAD, OP_DUP, 2, 0xDE, 0xAD];
        code = find_and_delete(&code, &sig);
        assert_eq!(code, vec![OP_DUP]);

        // A push of different data survives.
        let other = find_and_delete(&[2, 0xBE, 0xEF], &sig);
        assert_eq!(other, vec![2, 0xBE, 0xEF]);
    }
}

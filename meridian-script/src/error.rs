use thiserror::Error;

/// The reasons script verification can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script exceeds {0} bytes")]
    ScriptTooLarge(usize),
    #[error("push exceeds {0} bytes")]
    PushTooLarge(usize),
    #[error("more than {0} non-push operations")]
    TooManyOps(usize),
    #[error("stack depth exceeds {0}")]
    StackOverflow(usize),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("altstack underflow")]
    AltStackUnderflow,
    #[error("push ran past the end of the script")]
    PushPastEnd,
    #[error("OP_IF / OP_ENDIF nesting is unbalanced")]
    UnbalancedConditional,
    #[error("OP_VERIFY failed")]
    VerifyFailed,
    #[error("OP_EQUALVERIFY failed")]
    EqualVerifyFailed,
    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerifyFailed,
    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerifyFailed,
    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultiSigVerifyFailed,
    #[error("OP_RETURN executed")]
    OpReturn,
    #[error("disabled opcode 0x{0:02x}")]
    DisabledOpcode(u8),
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("numeric operand is not minimally encoded")]
    NonMinimalNumber,
    #[error("numeric operand exceeds 4 bytes")]
    NumberOverflow,
    #[error("signature is not strict DER")]
    NonDerSignature,
    #[error("signature has a high S component")]
    HighS,
    #[error("unsupported signature hash type {0}")]
    UnsupportedSighashType(u32),
    #[error("multisig key count {0} out of range")]
    BadMultisigKeyCount(usize),
    #[error("multisig signature count {0} out of range")]
    BadMultisigSigCount(usize),
    #[error("multisig dummy element must be empty")]
    NonEmptyMultisigDummy,
    #[error("unlock script contains non-push operations")]
    SigPushOnly,
    #[error("signature hashing failed: input index out of bounds")]
    SighashIndex,
    #[error("script evaluated to false or an empty stack")]
    EvalFalse,
}

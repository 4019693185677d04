use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Decoding(#[from] DecodingError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Input that cannot be represented in a 32-byte invite token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("invite code is {len} bytes, at most 32 fit in a token")]
    TooLong { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodingError {
    #[error("token payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("abi decoding failed: {0}")]
    Abi(String),

    #[error("value does not fit in {target}")]
    Overflow { target: &'static str },

    #[error("log does not match the {event} layout")]
    UnexpectedLayout { event: &'static str },
}

/// A state read or historical query against the chain source failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("source did not answer within {0:?}")]
    Timeout(Duration),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response from source: {0}")]
    InvalidResponse(String),
}

/// A write was refused by the wallet, the node or the contract.
///
/// Surfaced verbatim and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("transaction cancelled by the user")]
    UserCancelled,

    #[error("insufficient funds to cover value and gas")]
    InsufficientResources,

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

/// A write request that fails validation before it reaches the submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("entrance fee has not been loaded yet")]
    FeeNotLoaded,

    #[error("message is empty")]
    EmptyMessage,

    #[error("message is {len} characters, the limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("cannot use your own address as invite code")]
    SelfInvite,

    #[error("invite code is empty")]
    EmptyInviteCode,

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

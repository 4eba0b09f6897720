// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors that can occur while exchanging an authorization key or
//! operating the encrypted message codec.

use std::error::Error;
use std::fmt;

/// The error type for the deserialization of server messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeserializeError {
    /// The server's authorization key id did not match our own.
    BadAuthKey { got: i64, expected: i64 },

    /// The server's session id did not match our own.
    BadSessionId { got: i64, expected: i64 },

    /// The recomputed `msg_key` did not match the one on the wire.
    BadMessageKey,

    /// The server's message ID did not match our expectations.
    BadMessageId { got: i64 },

    /// The server's message length was not strictly positive.
    NegativeMessageLength { got: i32 },

    /// The server's message length was past the buffer.
    TooLongMessageLength { got: usize, max_length: usize },

    /// The received buffer is too small to contain a valid response
    /// message, or the response seemed valid at first but trying to
    /// deserialize it proved the buffer too small.
    MessageBufferTooSmall,

    /// The server responded with compressed data which we failed to
    /// decompress.
    DecompressionFailed,

    /// One of the response types had a constructor that did not match our
    /// expectations. The invalid ID is contained within this variant.
    UnexpectedConstructor { id: u32 },
}

impl Error for DeserializeError {}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BadAuthKey { got, expected } => {
                write!(f, "bad server auth key (got {}, expected {})", got, expected)
            }
            Self::BadSessionId { got, expected } => {
                write!(f, "bad server session id (got {}, expected {})", got, expected)
            }
            Self::BadMessageKey => write!(f, "recomputed message key did not match"),
            Self::BadMessageId { got } => write!(f, "bad server message id (got {})", got),
            Self::NegativeMessageLength { got } => {
                write!(f, "bad server message length (got {})", got)
            }
            Self::TooLongMessageLength { got, max_length } => write!(
                f,
                "bad server message length (got {}, when at most it should be {})",
                got, max_length
            ),
            Self::MessageBufferTooSmall => write!(
                f,
                "server responded with a payload too small to fit a valid message"
            ),
            Self::DecompressionFailed => write!(f, "failed to decompress server's data"),
            Self::UnexpectedConstructor { id } => write!(f, "unexpected constructor: {:08x}", id),
        }
    }
}

impl From<mtcore_tl::DeserializeError> for DeserializeError {
    fn from(error: mtcore_tl::DeserializeError) -> Self {
        match error {
            mtcore_tl::DeserializeError::UnexpectedEof => DeserializeError::MessageBufferTooSmall,
            mtcore_tl::DeserializeError::UnexpectedConstructor { id } => {
                DeserializeError::UnexpectedConstructor { id }
            }
        }
    }
}

impl From<mtcore_crypto::Error> for DeserializeError {
    fn from(error: mtcore_crypto::Error) -> Self {
        match error {
            mtcore_crypto::Error::InvalidBuffer => DeserializeError::MessageBufferTooSmall,
            // The precise ids aren't available at this layer; the security
            // failure itself is what matters to the caller (connection drop).
            mtcore_crypto::Error::AuthKeyMismatch => {
                DeserializeError::BadAuthKey { got: -1, expected: -1 }
            }
            mtcore_crypto::Error::MessageKeyMismatch => DeserializeError::BadMessageKey,
        }
    }
}

/// The outcome of a single request once its reply (or a notification
/// pertaining to it) has come back from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The server rejected the request outright.
    RpcError(RpcError),

    /// A `bad_msg_notification` was received for this request. The
    /// request should be retransmitted; the codec has already applied
    /// whatever local correction (time offset, sequence) the code calls
    /// for.
    BadMessage { code: i32 },

    /// The reply's body could not be decoded.
    Deserialize(DeserializeError),
}

impl Error for RequestError {}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RpcError(e) => write!(f, "{}", e),
            Self::BadMessage { code } => write!(f, "bad_msg_notification, code {}", code),
            Self::Deserialize(e) => write!(f, "{}", e),
        }
    }
}

impl From<DeserializeError> for RequestError {
    fn from(error: DeserializeError) -> Self {
        Self::Deserialize(error)
    }
}

impl From<mtcore_tl::DeserializeError> for RequestError {
    fn from(error: mtcore_tl::DeserializeError) -> Self {
        Self::Deserialize(error.into())
    }
}

/// The error type reported by the server when a request is misused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    /// A numerical value similar to HTTP status codes.
    pub code: i32,

    /// The ASCII error name, normally in screaming snake case, with any
    /// numeric suffix (e.g. `_31`) already stripped.
    pub name: String,

    /// If the error message contained an additional numeric value, it is
    /// captured here (e.g. `FLOOD_WAIT_31` yields `value = Some(31)`).
    pub value: Option<u32>,
}

impl Error for RpcError {}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.name)?;
        if let Some(value) = self.value {
            write!(f, " (value: {})", value)?;
        }
        Ok(())
    }
}

impl RpcError {
    pub fn from_parts(code: i32, error_message: &str) -> Self {
        if let Some(value) = error_message
            .split(|c: char| !c.is_ascii_digit())
            .find(|s| !s.is_empty())
        {
            let mut to_remove = String::with_capacity(1 + value.len());
            to_remove.push('_');
            to_remove.push_str(value);
            Self {
                code,
                name: error_message.replace(&to_remove, ""),
                value: Some(value.parse().expect("matched on digits")),
            }
        } else {
            Self {
                code,
                name: error_message.to_owned(),
                value: None,
            }
        }
    }
}

/// Represents an error that occurred during the generation of an
/// authorization key. Every variant is fatal; the caller must reconnect
/// and start a fresh exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The response data was invalid and did not match our expectations.
    InvalidResponse { error: mtcore_tl::DeserializeError },

    /// The server's nonce did not match ours.
    InvalidNonce { got: [u8; 16], expected: [u8; 16] },

    /// The server's PQ number was not of the expected size.
    InvalidPqSize { size: usize },

    /// None of the server fingerprints are known to us.
    UnknownFingerprints { fingerprints: Vec<i64> },

    /// The server failed to produce Diffie-Hellman parameters.
    DhParamsFail,

    /// The server's nonce changed during the key exchange.
    InvalidServerNonce { got: [u8; 16], expected: [u8; 16] },

    /// The server's `encrypted_answer` was not correctly padded.
    EncryptedResponseNotPadded { len: usize },

    /// The DH inner data could not be parsed.
    InvalidDhInnerData { error: mtcore_tl::DeserializeError },

    /// A Diffie-Hellman parameter (`g`, `g_a` or `g_b`) was out of range.
    GParameterOutOfRange,

    /// The server asked for the exchange to be retried. Retry semantics
    /// are underspecified upstream; this crate surfaces the retry nonce
    /// and does not loop (see `SPEC_FULL.md` §9).
    DhGenRetry { new_nonce_hash2: [u8; 16] },

    /// The generation of Diffie-Hellman parameters failed outright.
    DhGenFail,

    /// The plaintext answer hash did not match.
    InvalidAnswerHash { got: [u8; 20], expected: [u8; 20] },

    /// The new nonce hash returned by `dh_gen_ok` did not match.
    InvalidNewNonceHash { got: [u8; 16], expected: [u8; 16] },
}

impl Error for AuthenticationError {}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidResponse { error } => write!(f, "invalid server response: {}", error),
            Self::InvalidNonce { got, expected } => {
                write!(f, "invalid nonce: got {:?}, expected {:?}", got, expected)
            }
            Self::InvalidPqSize { size } => write!(f, "invalid pq size {}", size),
            Self::UnknownFingerprints { fingerprints } => {
                write!(f, "all server fingerprints are unknown: {:?}", fingerprints)
            }
            Self::DhParamsFail => write!(f, "the server failed to produce DH parameters"),
            Self::InvalidServerNonce { got, expected } => write!(
                f,
                "invalid server nonce: got {:?}, expected {:?}",
                got, expected
            ),
            Self::EncryptedResponseNotPadded { len } => write!(
                f,
                "the encrypted server response was {} bytes long, not correctly padded",
                len
            ),
            Self::InvalidDhInnerData { error } => {
                write!(f, "could not deserialize DH inner data: {}", error)
            }
            Self::GParameterOutOfRange => write!(f, "a DH parameter was out of the expected range"),
            Self::DhGenRetry { .. } => write!(f, "the server asked to retry the DH exchange"),
            Self::DhGenFail => write!(f, "the generation of DH parameters failed"),
            Self::InvalidAnswerHash { got, expected } => write!(
                f,
                "invalid answer hash: got {:?}, expected {:?}",
                got, expected
            ),
            Self::InvalidNewNonceHash { got, expected } => write!(
                f,
                "invalid new nonce hash: got {:?}, expected {:?}",
                got, expected
            ),
        }
    }
}

impl From<mtcore_tl::DeserializeError> for AuthenticationError {
    fn from(error: mtcore_tl::DeserializeError) -> Self {
        Self::InvalidResponse { error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_parsing_plain() {
        assert_eq!(
            RpcError::from_parts(400, "CHAT_INVALID"),
            RpcError {
                code: 400,
                name: "CHAT_INVALID".into(),
                value: None,
            }
        );
    }

    #[test]
    fn rpc_error_parsing_flood_wait() {
        assert_eq!(
            RpcError::from_parts(420, "FLOOD_WAIT_31"),
            RpcError {
                code: 420,
                name: "FLOOD_WAIT".into(),
                value: Some(31),
            }
        );
    }

    #[test]
    fn rpc_error_parsing_interdc() {
        assert_eq!(
            RpcError::from_parts(500, "INTERDC_2_CALL_ERROR"),
            RpcError {
                code: 500,
                name: "INTERDC_CALL_ERROR".into(),
                value: Some(2),
            }
        );
    }
}

// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::{fmt, io};

use mtcore_proto::errors::{AuthenticationError, DeserializeError, RequestError};
use mtcore_proto::transport;

/// This error occurs when reading from the network fails.
#[derive(Debug)]
pub enum ReadError {
    /// Standard I/O error.
    Io(io::Error),
    /// Error propagated from the underlying transport framing.
    Transport(transport::Error),
    /// Error propagated from attempting to deserialize a server message.
    Deserialize(DeserializeError),
}

impl std::error::Error for ReadError {}

impl Clone for ReadError {
    fn clone(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(
                e.raw_os_error()
                    .map(io::Error::from_raw_os_error)
                    .unwrap_or_else(|| io::Error::new(e.kind(), e.to_string())),
            ),
            Self::Transport(e) => Self::Transport(*e),
            Self::Deserialize(e) => Self::Deserialize(*e),
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "read error, IO failed: {err}"),
            Self::Transport(err) => write!(f, "read error, transport-level: {err}"),
            Self::Deserialize(err) => write!(f, "read error, bad response: {err}"),
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<transport::Error> for ReadError {
    fn from(error: transport::Error) -> Self {
        Self::Transport(error)
    }
}

impl From<DeserializeError> for ReadError {
    fn from(error: DeserializeError) -> Self {
        Self::Deserialize(error)
    }
}

/// The error type reported by the server when a request is misused,
/// widened with the constructor id of the request that caused it (the
/// core's `RequestError::RpcError` doesn't know which request it answers
/// until the sender's pending map resolves it).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    /// A numerical value similar to HTTP response status codes.
    pub code: i32,

    /// The ASCII error name, with any numeric suffix already stripped.
    pub name: String,

    /// If the error message contained an additional numeric value, it is
    /// captured here (e.g. `FLOOD_WAIT_31` yields `value = Some(31)`).
    pub value: Option<u32>,

    /// The constructor identifier of the request that triggered this
    /// error. Won't be present if the error was artificially constructed.
    pub caused_by: Option<u32>,
}

impl std::error::Error for RpcError {}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.name)?;
        if let Some(caused_by) = self.caused_by {
            write!(f, " caused by {:08x}", caused_by)?;
        }
        if let Some(value) = self.value {
            write!(f, " (value: {value})")?;
        }
        Ok(())
    }
}

impl From<mtcore_proto::errors::RpcError> for RpcError {
    fn from(error: mtcore_proto::errors::RpcError) -> Self {
        Self {
            code: error.code,
            name: error.name,
            value: error.value,
            caused_by: None,
        }
    }
}

impl RpcError {
    /// Matches on the name of the RPC error (case-sensitive).
    ///
    /// A single trailing or leading asterisk (`'*'`) is allowed, and will
    /// instead check if the error name starts (or ends with) the input.
    pub fn is(&self, rpc_error: &str) -> bool {
        if let Some(rpc_error) = rpc_error.strip_suffix('*') {
            self.name.starts_with(rpc_error)
        } else if let Some(rpc_error) = rpc_error.strip_prefix('*') {
            self.name.ends_with(rpc_error)
        } else {
            self.name == rpc_error
        }
    }

    /// Attaches the constructor id of the request that caused this error.
    pub fn with_caused_by(mut self, constructor_id: u32) -> Self {
        self.caused_by = Some(constructor_id);
        self
    }
}

/// This error occurs when a Remote Procedure call was unsuccessful.
#[derive(Debug)]
pub enum InvocationError {
    /// The request invocation failed because it was invalid or the server
    /// could not process it successfully. If the server is suffering from
    /// temporary issues, the request may be retried after some time.
    Rpc(RpcError),

    /// Standard I/O error when reading the response.
    ///
    /// Telegram may kill the connection at any moment, but it is generally
    /// valid to retry the request at least once, through a new connection.
    Io(io::Error),

    /// Error propagated from attempting to deserialize an invalid response.
    Deserialize(DeserializeError),

    /// Error propagated from the underlying transport framing.
    ///
    /// The most common variant is a bad status, which can occur when
    /// there's no valid authorization key (404) or too many connections
    /// have been made (429).
    Transport(transport::Error),

    /// The request was cancelled or dropped, and the results won't arrive.
    Dropped,

    /// The request was invoked in a datacenter that does not exist or is
    /// not known by the session.
    InvalidDc,

    /// The request caused the sender to connect to a new datacenter to be
    /// performed, but the authorization key generation process failed.
    Authentication(AuthenticationError),
}

impl Clone for InvocationError {
    fn clone(&self) -> Self {
        match self {
            Self::Rpc(e) => Self::Rpc(e.clone()),
            Self::Io(e) => Self::Io(
                e.raw_os_error()
                    .map(io::Error::from_raw_os_error)
                    .unwrap_or_else(|| io::Error::new(e.kind(), e.to_string())),
            ),
            Self::Deserialize(e) => Self::Deserialize(*e),
            Self::Transport(e) => Self::Transport(*e),
            Self::Dropped => Self::Dropped,
            Self::InvalidDc => Self::InvalidDc,
            Self::Authentication(e) => Self::Authentication(e.clone()),
        }
    }
}

impl std::error::Error for InvocationError {}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(err) => write!(f, "request error: {err}"),
            Self::Io(err) => write!(f, "request error: {err}"),
            Self::Deserialize(err) => write!(f, "request error: {err}"),
            Self::Transport(err) => write!(f, "request error: {err}"),
            Self::Dropped => write!(f, "request error: dropped (cancelled)"),
            Self::InvalidDc => write!(f, "request error: invalid dc"),
            Self::Authentication(err) => write!(f, "request error: {err}"),
        }
    }
}

impl From<ReadError> for InvocationError {
    fn from(error: ReadError) -> Self {
        match error {
            ReadError::Io(error) => Self::Io(error),
            ReadError::Transport(error) => Self::Transport(error),
            ReadError::Deserialize(error) => Self::Deserialize(error),
        }
    }
}

impl From<RequestError> for InvocationError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::RpcError(error) => Self::Rpc(RpcError::from(error)),
            // A `bad_msg_notification` the sender decided not to retry (or
            // couldn't, because the request had already been dropped from
            // the pending map). Surfacing it as `Dropped` matches how a
            // non-retryable bad_msg is handled in `Sender::process_bad_message`.
            RequestError::BadMessage { .. } => Self::Dropped,
            RequestError::Deserialize(error) => Self::Deserialize(error),
        }
    }
}

impl From<DeserializeError> for InvocationError {
    fn from(error: DeserializeError) -> Self {
        Self::Deserialize(error)
    }
}

impl From<transport::Error> for InvocationError {
    fn from(error: transport::Error) -> Self {
        Self::Transport(error)
    }
}

impl From<io::Error> for InvocationError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<AuthenticationError> for InvocationError {
    fn from(error: AuthenticationError) -> Self {
        Self::Authentication(error)
    }
}

impl InvocationError {
    /// Matches on the name of the RPC error (case-sensitive). If the
    /// error is not an RPC error, returns `false`.
    #[inline]
    pub fn is(&self, rpc_error: &str) -> bool {
        match self {
            Self::Rpc(rpc) => rpc.is(rpc_error),
            _ => false,
        }
    }
}

/// The outcome of a batch send where at least one request failed (§7).
/// Bundles every request's body, result and (if it failed) the failure,
/// in the original order, so a caller can tell which requests of the
/// batch actually went through.
#[derive(Debug)]
pub struct BulkSendError {
    pub requests: Vec<Vec<u8>>,
    pub results: Vec<Option<Vec<u8>>>,
    pub exceptions: Vec<Option<InvocationError>>,
}

impl std::error::Error for BulkSendError {}

impl fmt::Display for BulkSendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.exceptions.iter().filter(|e| e.is_some()).count();
        write!(
            f,
            "bulk send failed: {}/{} requests errored",
            failed,
            self.requests.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_name_matching() {
        let err = RpcError {
            code: 420,
            name: "FLOOD_WAIT".into(),
            value: Some(31),
            caused_by: None,
        };
        assert!(err.is("FLOOD_WAIT"));
        assert!(err.is("FLOOD_*"));
        assert!(err.is("*_WAIT"));
        assert!(!err.is("PHONE_CODE_INVALID"));
    }

    #[test]
    fn invocation_error_is_passthrough() {
        let err = InvocationError::Dropped;
        assert!(!err.is("FLOOD_WAIT"));
    }
}

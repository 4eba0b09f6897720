// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Implementation of the [Mobile Transport Protocol]. This layer is
//! responsible for turning zero or more outgoing requests into a single
//! framed message (plain or encrypted), and for turning a framed message
//! received from the server back into RPC results and updates.
//!
//! A distinction between plain and encrypted is made for simplicity (the
//! plain codec hardly requires any state) and to help prevent invalid
//! states (encrypted communication cannot be attempted without an
//! authorization key).
//!
//! [Mobile Transport Protocol]: https://core.telegram.org/mtproto/description

mod encrypted;
mod plain;

pub use encrypted::{Builder, Encrypted};
pub use plain::Plain;

use crate::errors::{DeserializeError, RequestError};
use crate::MsgId;

/// Everything a single received frame could have produced: zero or more
/// resolved RPC results, zero or more server-initiated updates, plus the
/// bookkeeping signals the sender needs to keep the pending-message map
/// and session state in sync (§4.3.3, §4.3.4).
#[derive(Default, Debug)]
pub struct Deserialization {
    pub rpc_results: Vec<(MsgId, Result<Vec<u8>, RequestError>)>,
    pub updates: Vec<Vec<u8>>,

    /// `msg_id`s the server has acknowledged receipt of, via either an
    /// explicit `msgs_ack` or (implicitly) an `rpc_result`. The sender
    /// uses this to collapse container entries out of the pending map.
    pub acks: Vec<i64>,

    /// Present if a `new_session_created` notification arrived. Every
    /// pending message with a `msg_id` below `first_msg_id` was lost and
    /// must be resent or failed by the caller.
    pub new_session: Option<NewSessionInfo>,
}

/// The payload of a `new_session_created` notification (§4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewSessionInfo {
    pub first_msg_id: i64,
    pub server_salt: i64,
}

/// The `msg_id` assigned to a single request, plus the `msg_id` of the
/// outer `msg_container` it was batched into, if any. When a request is
/// sent on its own, `container_msg_id == msg_id`.
///
/// The sender needs both: server notifications such as
/// `bad_msg_notification` are keyed by whatever top-level `msg_id` the
/// server actually saw on the wire, which is the container's id for a
/// batched request, not the request's own id (§4.3.2, design note on
/// pending-message map cycles).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsgIdPair {
    pub msg_id: MsgId,
    pub container_msg_id: MsgId,
}

/// A codec that turns requests into a single wire message and a wire
/// message back into results. Implementors own no I/O of their own; the
/// sender owns the transport and feeds bytes in both directions.
pub trait Mtp {
    /// Serializes `requests` (plus any pending acknowledgement) into a
    /// single outgoing message, batching them in a container when there
    /// is more than one. Returns the `msg_id`/`container_msg_id` pair
    /// assigned to each request, in the same order they were given.
    ///
    /// `output` is cleared and filled with the bytes ready to hand to a
    /// transport codec.
    fn serialize(&mut self, requests: &[Vec<u8>], output: &mut Vec<u8>) -> Vec<MsgIdPair>;

    /// Processes a single message payload received from the server
    /// (already stripped of its transport framing).
    fn deserialize(&mut self, payload: &[u8]) -> Result<Deserialization, DeserializeError>;
}

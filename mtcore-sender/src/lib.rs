// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! This library drives a single connection to one of Telegram's data
//! centers.
//!
//! The [`Sender`] is the base building block: it owns the socket, the
//! transport framing, and the MTP codec, and turns outgoing request
//! bodies into resolved replies or typed errors, batching whatever is
//! pending into a single container before it hits the wire. It also
//! takes care of the authorization-key exchange, keepalive pings,
//! flood-wait/slow-mode back-off, and transparent data-center migration.
//!
//! Pooling multiple connections (e.g. to download media from a
//! secondary data center while the main connection stays busy) is left
//! to the caller; this crate only manages one connection at a time.

#![deny(unsafe_code)]

mod configuration;
mod errors;
mod flood;
mod net;
mod reconnection;
mod sender;

pub use configuration::Configuration;
pub use errors::{BulkSendError, InvocationError, ReadError, RpcError};
pub use net::ServerAddr;
pub use reconnection::{FixedReconnect, NoReconnect, ReconnectionPolicy};
pub use sender::Sender;

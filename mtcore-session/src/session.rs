// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::io;

/// The trait a session implementation must satisfy.
///
/// The persistence contract is deliberately small: `(dc_id,
/// server_address, port, auth_key_bytes)`. Everything else a
/// connection needs (`session_id`, `sequence`, `time_offset`,
/// `last_msg_id`) is transient and is rebuilt fresh on every reconnect.
///
/// A `salt` accessor is included because caching the most recently
/// known server salt lets a reconnect skip the round trip a fresh
/// connection would otherwise spend discovering it via
/// `bad_server_salt`; it is optional, and implementations that don't
/// bother may always return `None`/no-op on `set_salt`.
pub trait Session {
    /// Save the data center a user is authorized against: its numeric
    /// id, the address last used to reach it, and the port.
    fn set_user_datacenter(&mut self, dc_id: i32, server_address: &str, port: u16);

    /// Save the authorization key data for a given data center.
    fn set_auth_key_data(&mut self, dc_id: i32, data: &[u8; 256]);

    /// Cache the most recently known server salt for a data center.
    /// Implementations may ignore this; it is purely an optimization.
    fn set_salt(&mut self, _dc_id: i32, _salt: i64) {}

    /// Return the data center a user is authorized against, if any:
    /// `(dc_id, server_address, port)`.
    fn get_user_datacenter(&self) -> Option<(i32, String, u16)>;

    /// Return the authorization key for a given data center, if any.
    fn get_auth_key_data(&self, dc_id: i32) -> Option<[u8; 256]>;

    /// Return the cached server salt for a data center, if any.
    fn get_salt(&self, _dc_id: i32) -> Option<i64> {
        None
    }

    /// Persist the data to its backing store, if any.
    fn save(&mut self) -> io::Result<()>;
}

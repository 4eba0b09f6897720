// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::collections::HashMap;
use std::io;

use crate::Session;

/// A session kept purely in memory; state is lost on process exit.
/// Useful for tests and short-lived scripts.
#[derive(Default)]
pub struct MemorySession {
    user_dc: Option<(i32, String, u16)>,
    auth_keys: HashMap<i32, [u8; 256]>,
    salts: HashMap<i32, i64>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Session for MemorySession {
    fn set_user_datacenter(&mut self, dc_id: i32, server_address: &str, port: u16) {
        self.user_dc = Some((dc_id, server_address.to_string(), port));
    }

    fn set_auth_key_data(&mut self, dc_id: i32, data: &[u8; 256]) {
        self.auth_keys.insert(dc_id, *data);
    }

    fn set_salt(&mut self, dc_id: i32, salt: i64) {
        self.salts.insert(dc_id, salt);
    }

    fn get_user_datacenter(&self) -> Option<(i32, String, u16)> {
        self.user_dc.clone()
    }

    fn get_auth_key_data(&self, dc_id: i32) -> Option<[u8; 256]> {
        self.auth_keys.get(&dc_id).copied()
    }

    fn get_salt(&self, dc_id: i32) -> Option<i64> {
        self.salts.get(&dc_id).copied()
    }

    fn save(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_datacenter_and_key() {
        let mut session = MemorySession::new();
        assert!(session.get_user_datacenter().is_none());

        session.set_user_datacenter(2, "149.154.167.51", 443);
        session.set_auth_key_data(2, &[7u8; 256]);
        session.set_salt(2, 123456789);

        assert_eq!(
            session.get_user_datacenter(),
            Some((2, "149.154.167.51".to_string(), 443))
        );
        assert_eq!(session.get_auth_key_data(2), Some([7u8; 256]));
        assert_eq!(session.get_salt(2), Some(123456789));
        assert_eq!(session.get_auth_key_data(3), None);
    }

    #[test]
    fn save_is_a_no_op() {
        let mut session = MemorySession::new();
        assert!(session.save().is_ok());
    }
}

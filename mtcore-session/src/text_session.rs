// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, Write};
use std::path::Path;

use crate::Session;

const CURRENT_VERSION: u32 = 1;

/// A session backed by a small versioned flat-file format: one field
/// per line, auth keys hex-encoded. Exercises the persistence contract
/// against a real backend without committing to a database engine.
pub struct TextSession {
    file: File,
    user_dc: Option<(i32, String, u16)>,
    auth_keys: HashMap<i32, [u8; 256]>,
    salts: HashMap<i32, i64>,
}

fn key_from_hex(hex: &str) -> Option<[u8; 256]> {
    let mut buffer = [0; 256];
    if hex.len() != buffer.len() * 2 {
        return None;
    }
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(buffer)
}

fn hex_from_key(key: &[u8; 256]) -> String {
    use std::fmt::Write as _;
    let mut buffer = String::with_capacity(key.len() * 2);
    for byte in key.iter() {
        write!(buffer, "{:02x}", byte).unwrap();
    }
    buffer
}

impl TextSession {
    /// Create a new, empty session backed by a freshly-created file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            user_dc: None,
            auth_keys: HashMap::new(),
            salts: HashMap::new(),
        })
    }

    /// Load a previously-saved session from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let bad_format = || io::Error::new(io::ErrorKind::InvalidData, "malformed session");

        let mut lines = BufReader::new(File::open(&path)?).lines();

        let version: u32 = lines
            .next()
            .ok_or_else(bad_format)??
            .parse()
            .map_err(|_| bad_format())?;
        if version != CURRENT_VERSION {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "unknown version"));
        }

        let user_dc = match (lines.next(), lines.next(), lines.next()) {
            (Some(Ok(id)), Some(Ok(addr)), Some(Ok(port)))
                if !id.is_empty() && !addr.is_empty() && !port.is_empty() =>
            {
                match (id.parse(), port.parse()) {
                    (Ok(id), Ok(port)) => Some((id, addr, port)),
                    _ => None,
                }
            }
            _ => None,
        };

        let mut auth_keys = HashMap::new();
        let mut salts = HashMap::new();
        for line in lines.by_ref() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, ' ');
            let dc_id: i32 = match parts.next().and_then(|s| s.parse().ok()) {
                Some(id) => id,
                None => continue,
            };
            if let Some(hex) = parts.next() {
                if let Some(key) = key_from_hex(hex) {
                    auth_keys.insert(dc_id, key);
                }
            }
            if let Some(salt) = parts.next().and_then(|s| s.parse().ok()) {
                salts.insert(dc_id, salt);
            }
        }

        Ok(Self {
            file: File::options().write(true).open(path)?,
            user_dc,
            auth_keys,
            salts,
        })
    }
}

impl Session for TextSession {
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
        self.file.seek(io::SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        writeln!(self.file, "{}", CURRENT_VERSION)?;

        if let Some((dc_id, addr, port)) = &self.user_dc {
            writeln!(self.file, "{}", dc_id)?;
            writeln!(self.file, "{}", addr)?;
            writeln!(self.file, "{}", port)?;
        } else {
            writeln!(self.file)?;
            writeln!(self.file)?;
            writeln!(self.file)?;
        }

        for (dc_id, key) in &self.auth_keys {
            match self.salts.get(dc_id) {
                Some(salt) => writeln!(self.file, "{} {} {}", dc_id, hex_from_key(key), salt)?,
                None => writeln!(self.file, "{} {}", dc_id, hex_from_key(key))?,
            }
        }

        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut path = temp_dir();
        path.push(format!("mtcore-session-test-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn save_and_load_round_trip() {
        let path = temp_path("roundtrip");
        {
            let mut session = TextSession::create(&path).unwrap();
            session.set_user_datacenter(2, "149.154.167.51", 443);
            session.set_auth_key_data(2, &[5u8; 256]);
            session.set_salt(2, 42);
            session.save().unwrap();
        }

        let loaded = TextSession::load(&path).unwrap();
        assert_eq!(
            loaded.get_user_datacenter(),
            Some((2, "149.154.167.51".to_string(), 443))
        );
        assert_eq!(loaded.get_auth_key_data(2), Some([5u8; 256]));
        assert_eq!(loaded.get_salt(2), Some(42));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_unknown_version() {
        let path = temp_path("badversion");
        std::fs::write(&path, "2\n\n\n\n").unwrap();
        assert!(TextSession::load(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}

// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Fixed address tables for Telegram's known data centers, used to
//! resolve a `dc_id` handed out during migration (§4.3.5) into an
//! address to connect to before a session has one cached.

const TEST: &[(i32, &str)] = &[
    (1, "149.154.175.10"),
    (2, "149.154.167.40"),
    (3, "149.154.175.117"),
];

const PROD: &[(i32, &str)] = &[
    (1, "149.154.175.53"),
    (2, "149.154.167.51"),
    (3, "149.154.175.100"),
    (4, "149.154.167.91"),
    (5, "91.108.56.130"),
    (203, "91.105.192.100"),
];

const TEST_IPV6: &[(i32, &str)] = &[
    (1, "2001:b28:f23d:f001::e"),
    (2, "2001:67c:4e8:f002::e"),
    (3, "2001:b28:f23d:f003::e"),
];

const PROD_IPV6: &[(i32, &str)] = &[
    (1, "2001:b28:f23d:f001::a"),
    (2, "2001:67c:4e8:f002::a"),
    (3, "2001:b28:f23d:f003::a"),
    (4, "2001:67c:4e8:f004::a"),
    (5, "2001:b28:f23f:f005::a"),
    (203, "2a0a:f280:0203:000a:5000:0000:0000:0100"),
];

const PROD_IPV6_MEDIA: &[(i32, &str)] = &[
    (2, "2001:067c:04e8:f002:0000:0000:0000:000b"),
    (4, "2001:067c:04e8:f004:0000:0000:0000:000b"),
];

/// Looks up the known address/port for a data center id without
/// needing a prior connection to discover it.
pub struct DataCenterExtractor;

impl DataCenterExtractor {
    fn table(test_mode: bool, ipv6: bool, media: bool) -> &'static [(i32, &'static str)] {
        match (test_mode, ipv6, media) {
            (true, true, _) => TEST_IPV6,
            (true, false, _) => TEST,
            (false, true, true) => PROD_IPV6_MEDIA,
            (false, true, false) => PROD_IPV6,
            (false, false, _) => PROD,
        }
    }

    /// Returns `(address, port)` for `dc_id`, or `None` if the id is
    /// unknown for the requested table (e.g. `media` has entries for
    /// only a handful of data centers).
    pub fn find(dc_id: i32, test_mode: bool, ipv6: bool, media: bool) -> Option<(String, u16)> {
        Self::table(test_mode, ipv6, media)
            .iter()
            .find(|&&(id, _)| id == dc_id)
            .map(|&(_, ip)| (ip.to_string(), if test_mode { 80 } else { 443 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prod_dc_resolves() {
        assert_eq!(
            DataCenterExtractor::find(2, false, false, false),
            Some(("149.154.167.51".to_string(), 443))
        );
    }

    #[test]
    fn known_test_dc_uses_port_80() {
        assert_eq!(
            DataCenterExtractor::find(2, true, false, false),
            Some(("149.154.167.40".to_string(), 80))
        );
    }

    #[test]
    fn media_table_is_a_subset() {
        assert!(DataCenterExtractor::find(1, false, true, true).is_none());
        assert!(DataCenterExtractor::find(2, false, true, true).is_some());
    }

    #[test]
    fn unknown_dc_is_none() {
        assert_eq!(DataCenterExtractor::find(999, false, false, false), None);
    }
}

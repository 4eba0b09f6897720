// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Flood-wait and slow-mode bookkeeping, tracked in two distinct maps so
//! that one kind of wait is never misread as the other (§4.3.6).
//!
//! Flood-wait is keyed by the constructor id of the request that
//! triggered it, which this crate can read off the first four bytes of
//! any request body without needing the caller's schema. Slow-mode is
//! keyed by chat id, which only the caller's schema knows how to extract
//! from a request; callers that want slow-mode tracking pass the chat id
//! alongside the request via [`crate::Sender::invoke_scoped`].

use std::collections::HashMap;
use web_time::{Duration, Instant};

#[derive(Default)]
pub struct FloodState {
    flood_wait: HashMap<u32, Instant>,
    slow_mode: HashMap<i64, Instant>,
}

impl FloodState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining wait for `constructor_id`, or `None` if it's clear to send.
    pub fn check_flood_wait(&self, constructor_id: u32) -> Option<Duration> {
        remaining(self.flood_wait.get(&constructor_id).copied())
    }

    pub fn record_flood_wait(&mut self, constructor_id: u32, wait: Duration) {
        self.flood_wait.insert(constructor_id, Instant::now() + wait);
    }

    /// Remaining wait for `chat_id`, or `None` if it's clear to send.
    pub fn check_slow_mode(&self, chat_id: i64) -> Option<Duration> {
        remaining(self.slow_mode.get(&chat_id).copied())
    }

    pub fn record_slow_mode(&mut self, chat_id: i64, wait: Duration) {
        self.slow_mode.insert(chat_id, Instant::now() + wait);
    }
}

fn remaining(wake_at: Option<Instant>) -> Option<Duration> {
    let wake_at = wake_at?;
    let now = Instant::now();
    if wake_at > now {
        Some(wake_at - now)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flood_and_slow_mode_are_independent() {
        let mut state = FloodState::new();
        state.record_flood_wait(0x1234_5678, Duration::from_secs(30));
        assert!(state.check_flood_wait(0x1234_5678).is_some());
        assert!(state.check_slow_mode(42).is_none());

        state.record_slow_mode(42, Duration::from_secs(10));
        assert!(state.check_slow_mode(42).is_some());
        // A wait recorded on chat 42 must not leak into some other chat,
        // nor into the unrelated constructor map.
        assert!(state.check_slow_mode(43).is_none());
        assert!(state.check_flood_wait(0x1234_5678).is_some());
    }

    #[test]
    fn expired_wait_reads_as_clear() {
        let mut state = FloodState::new();
        state.record_flood_wait(1, Duration::from_secs(0));
        assert!(state.check_flood_wait(1).is_none());
    }
}

// Copyright 2020 - developers of the `grammers` project.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
use std::ops::ControlFlow;
use std::time::Duration;

/// A pluggable reconnection handler.
///
/// Implement this trait to customize how the sender reacts to a dropped
/// connection. The default is [`NoReconnect`], which never retries; there
/// is also [`FixedReconnect`], which retries a fixed number of times with
/// a fixed delay.
///
/// `should_retry` returns a `ControlFlow<(), Duration>`: `Continue(delay)`
/// to wait `delay` and try again, or `Break(())` to give up.
pub trait ReconnectionPolicy: Send + Sync {
    /// `attempts` is the number of reconnection attempts already made.
    fn should_retry(&self, attempts: usize) -> ControlFlow<(), Duration>;
}

/// Never reconnects; the first dropped connection is final.
pub struct NoReconnect;

impl ReconnectionPolicy for NoReconnect {
    fn should_retry(&self, _: usize) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}

/// Retries a fixed number of times, waiting the same delay every time.
pub struct FixedReconnect {
    pub attempts: usize,
    pub delay: Duration,
}

impl ReconnectionPolicy for FixedReconnect {
    fn should_retry(&self, attempts: usize) -> ControlFlow<(), Duration> {
        if attempts <= self.attempts {
            ControlFlow::Continue(self.delay)
        } else {
            ControlFlow::Break(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_reconnect_always_breaks() {
        assert_eq!(NoReconnect.should_retry(0), ControlFlow::Break(()));
        assert_eq!(NoReconnect.should_retry(100), ControlFlow::Break(()));
    }

    #[test]
    fn fixed_reconnect_respects_attempt_budget() {
        let policy = FixedReconnect {
            attempts: 3,
            delay: Duration::from_secs(1),
        };
        assert_eq!(
            policy.should_retry(0),
            ControlFlow::Continue(Duration::from_secs(1))
        );
        assert_eq!(
            policy.should_retry(3),
            ControlFlow::Continue(Duration::from_secs(1))
        );
        assert_eq!(policy.should_retry(4), ControlFlow::Break(()));
    }
}

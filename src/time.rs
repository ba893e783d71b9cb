// SPDX-License-Identifier: MIT

//! Millisecond time on an arbitrary monotonic scale.
//!
//! The engine never reads a clock itself: every entry point takes the
//! current instant, cached by the caller once per loop tick so all
//! decisions within a tick agree. Tests drive the engine with whatever
//! instants they like.

/// Milliseconds on a monotonic scale. The origin is arbitrary (process
/// start for the real clock, 0 for tests).
pub type Time = i64;

/// A clock the I/O layer polls once per loop tick.
pub trait Clock {
    fn now(&self) -> Time;
}

/// Monotonic system clock, counting from its own creation.
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Time {
        self.origin.elapsed().as_millis() as Time
    }
}

/// Convert a peer-relative lifetime (ms remaining at origination) into a
/// local absolute deadline, given the node's origination instant on our
/// scale.
pub fn remote_rel_to_local_abs(origination: Time, ms: u32) -> Time {
    origination + Time::from(ms)
}

/// Convert a local absolute deadline into a lifetime relative to `now`,
/// saturating at the ends of the wire field.
pub fn local_abs_to_remote_rel(now: Time, deadline: Time) -> u32 {
    if deadline <= now {
        0
    } else {
        (deadline - now).min(Time::from(u32::MAX)) as u32
    }
}

/// The earlier of two optional deadlines.
pub fn tmin(a: Option<Time>, b: Option<Time>) -> Option<Time> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_conversions() {
        let origination = 10_000;
        let deadline = remote_rel_to_local_abs(origination, 3_600_000);
        assert_eq!(deadline, 3_610_000);
        assert_eq!(local_abs_to_remote_rel(10_000, deadline), 3_600_000);
        assert_eq!(local_abs_to_remote_rel(deadline + 1, deadline), 0);
    }

    #[test]
    fn tmin_ignores_none() {
        assert_eq!(tmin(None, Some(5)), Some(5));
        assert_eq!(tmin(Some(3), Some(5)), Some(3));
        assert_eq!(tmin(None, None), None);
    }
}

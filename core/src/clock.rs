//! Simulation clock: simulated park time, speed control, and opening hours.

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default simulated seconds per wall-clock second.
pub const DEFAULT_SPEED: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHours {
    pub open_hour:  u32,
    pub close_hour: u32,
}

impl OpeningHours {
    pub fn new(open_hour: u32, close_hour: u32) -> Self {
        Self { open_hour, close_hour }
    }

    /// Half-open interval `[open_hour, close_hour)`. An empty interval means
    /// the park never opens.
    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.open_hour && hour < self.close_hour
    }
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self { open_hour: 8, close_hour: 20 }
    }
}

/// Advances simulated time faster than wall time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    pub speed: u32,
}

impl SimClock {
    pub fn new(speed: u32) -> Self {
        Self { speed }
    }

    /// Simulated time after `wall` elapses at this clock's speed.
    pub fn advance(&self, now: DateTime<Utc>, wall: Duration) -> DateTime<Utc> {
        let millis = wall.as_millis() as i64 * i64::from(self.speed);
        now + ChronoDuration::milliseconds(millis)
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(DEFAULT_SPEED)
    }
}

/// Open when the operator flag is clear and the simulated hour is in range.
pub fn is_open(closed_flag: bool, hours: OpeningHours, now: DateTime<Utc>) -> bool {
    !closed_flag && hours.contains(now.hour())
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Logical timestamp attached to events and messages
///
/// Times come from a [`Clock`] and only order things created on the same
/// process. They carry no wall-clock meaning. On the wire a time is a
/// 16 digit big-endian hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "TimeRepr", into = "String")]
pub struct Time(u64);

impl Time {
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid logical time: {0:?}")]
pub struct ParseTimeError(String);

impl FromStr for Time {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 {
            return Err(ParseTimeError(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Time)
            .map_err(|_| ParseTimeError(s.to_string()))
    }
}

impl From<Time> for String {
    fn from(time: Time) -> Self {
        time.to_string()
    }
}

/// Accepted wire forms: the hex string we emit, or a bare tick count
#[derive(Deserialize)]
#[serde(untagged)]
enum TimeRepr {
    Hex(String),
    Ticks(u64),
}

impl TryFrom<TimeRepr> for Time {
    type Error = ParseTimeError;

    fn try_from(repr: TimeRepr) -> Result<Self, Self::Error> {
        match repr {
            TimeRepr::Hex(s) => s.parse(),
            TimeRepr::Ticks(ticks) => Ok(Time(ticks)),
        }
    }
}

/// Monotonic source of [`Time`] values
///
/// The first call to [`Clock::now`] returns tick 1.
#[derive(Debug, Default)]
pub struct Clock {
    ticks: AtomicU64,
}

impl Clock {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// The clock shared by every bus and client created in this process
    pub fn shared() -> Arc<Clock> {
        static PROCESS_CLOCK: OnceLock<Arc<Clock>> = OnceLock::new();
        PROCESS_CLOCK.get_or_init(|| Arc::new(Clock::new())).clone()
    }

    pub fn now(&self) -> Time {
        Time(self.ticks.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

//! A [`Duration`] newtype that parses and prints human-readable durations
//! (`"30s"`, `"5m"`, `"2h30m"`) instead of raw seconds, used everywhere a
//! definition file or CLI flag accepts a delay or timeout.

use std::{
    fmt::{Display, Formatter},
    ops::{Deref, DerefMut},
    str::FromStr,
    time::Duration as StdDuration,
};

use snafu::{ResultExt, Snafu};

mod serde_impl;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse {input:?} as a duration"))]
    Parse {
        source: humantime::DurationError,
        input: String,
    },
}

/// A wrapper around [`std::time::Duration`] that (de)serializes via
/// [`humantime`] instead of as a `{secs, nanos}` struct.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Duration(StdDuration);

impl Duration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(StdDuration::from_secs(secs))
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(StdDuration::from_millis(millis))
    }

    pub const fn zero() -> Self {
        Self(StdDuration::ZERO)
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn as_std(&self) -> StdDuration {
        self.0
    }
}

impl From<StdDuration> for Duration {
    fn from(duration: StdDuration) -> Self {
        Self(duration)
    }
}

impl From<Duration> for StdDuration {
    fn from(duration: Duration) -> Self {
        duration.0
    }
}

impl Deref for Duration {
    type Target = StdDuration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Duration {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromStr for Duration {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let duration = humantime::parse_duration(input).context(ParseSnafu {
            input: input.to_string(),
        })?;
        Ok(Self(duration))
    }
}

impl Display for Duration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_human_readable_durations() {
        assert_eq!(
            "30s".parse::<Duration>().unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            "2m".parse::<Duration>().unwrap(),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!("not a duration".parse::<Duration>().is_err());
    }

    #[test]
    fn roundtrips_through_display() {
        let duration = Duration::from_secs(90);
        let printed = duration.to_string();
        assert_eq!(printed.parse::<Duration>().unwrap(), duration);
    }
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MILLIS_PER_SECOND: u64 = 1_000;
const MILLIS_PER_MINUTE: u64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: u64 = 60 * MILLIS_PER_MINUTE;

/// A non-zero duration with millisecond precision.
///
/// Written as one or more numbers, each followed by a unit (`ms`, `s`, `m`
/// or `h`): `250ms`, `1m30s` or `1.5s`. Fractions below a millisecond are
/// truncated. A bare integer is read as seconds. Values round-trip through
/// their [`Display`](fmt::Display) form, which always uses the largest unit
/// that represents the value exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    millis: u64,
}

impl Interval {
    /// Builds an interval from a millisecond count.
    ///
    /// A zero count is clamped to one millisecond.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self { millis: 1 }
        } else {
            Self { millis }
        }
    }

    /// Builds an interval from a [`Duration`], truncating to milliseconds.
    #[must_use]
    pub fn from_duration(duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self::from_millis(millis)
    }

    /// Returns the interval as a [`Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.millis)
    }

    /// Returns the interval in whole milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.millis
    }
}

impl From<Interval> for Duration {
    fn from(interval: Interval) -> Self {
        interval.as_duration()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.millis;
        if millis % MILLIS_PER_HOUR == 0 {
            write!(formatter, "{}h", millis / MILLIS_PER_HOUR)
        } else if millis % MILLIS_PER_MINUTE == 0 {
            write!(formatter, "{}m", millis / MILLIS_PER_MINUTE)
        } else if millis % MILLIS_PER_SECOND == 0 {
            write!(formatter, "{}s", millis / MILLIS_PER_SECOND)
        } else {
            write!(formatter, "{millis}ms")
        }
    }
}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(IntervalParseError::Empty);
        }
        let out_of_range = || IntervalParseError::OutOfRange(input.to_string());
        let millis = if trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            let seconds: u64 = trimmed.parse().map_err(|_| out_of_range())?;
            seconds
                .checked_mul(MILLIS_PER_SECOND)
                .ok_or_else(out_of_range)?
        } else {
            let mut rest = trimmed;
            let mut total: u64 = 0;
            while !rest.is_empty() {
                let (millis, remainder) = parse_component(rest, input)?;
                total = total.checked_add(millis).ok_or_else(out_of_range)?;
                rest = remainder;
            }
            total
        };
        if millis == 0 {
            return Err(IntervalParseError::Zero(input.to_string()));
        }
        Ok(Self { millis })
    }
}

/// Longest fraction that can still change a millisecond count.
const MAX_FRACTION_DIGITS: usize = 10;

/// Parses one `<number><unit>` component from the front of `text`.
fn parse_component<'a>(text: &'a str, input: &str) -> Result<(u64, &'a str), IntervalParseError> {
    let is_numeric = |character: char| character.is_ascii_digit() || character == '.';
    let (number, tail) = text.split_at(text.find(|c: char| !is_numeric(c)).unwrap_or(text.len()));
    let (unit, remainder) = tail.split_at(tail.find(is_numeric).unwrap_or(tail.len()));

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if number.is_empty() {
        return Err(IntervalParseError::MissingValue(input.to_string()));
    }
    if fraction.contains('.') || (whole.is_empty() && fraction.is_empty()) {
        return Err(IntervalParseError::Invalid(input.to_string()));
    }
    let scale = match unit.trim() {
        "ms" => 1,
        "s" => MILLIS_PER_SECOND,
        "m" => MILLIS_PER_MINUTE,
        "h" => MILLIS_PER_HOUR,
        "" => return Err(IntervalParseError::MissingUnit(input.to_string())),
        other => return Err(IntervalParseError::UnknownUnit(other.to_string())),
    };

    let out_of_range = || IntervalParseError::OutOfRange(input.to_string());
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| out_of_range())?
    };
    let millis = whole
        .checked_mul(scale)
        .and_then(|millis| millis.checked_add(fraction_millis(fraction, scale)))
        .ok_or_else(out_of_range)?;
    Ok((millis, remainder))
}

/// Milliseconds contributed by the decimal `digits` of a value in `scale`
/// units, truncated.
fn fraction_millis(digits: &str, scale: u64) -> u64 {
    let digits = digits.get(..MAX_FRACTION_DIGITS).unwrap_or(digits);
    let Ok(numerator) = digits.parse::<u128>() else {
        return 0;
    };
    let exponent = u32::try_from(digits.len()).unwrap_or(u32::MAX);
    let denominator = 10_u128.pow(exponent);
    u64::try_from(numerator * u128::from(scale) / denominator).unwrap_or(u64::MAX)
}

impl TryFrom<String> for Interval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.to_string()
    }
}

/// Errors encountered while parsing an [`Interval`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntervalParseError {
    /// The input was blank.
    #[error("interval must not be empty")]
    Empty,
    /// The input had a unit but no number.
    #[error("interval '{0}' has no numeric value")]
    MissingValue(String),
    /// A component had a number but no unit.
    #[error("interval '{0}' has a value without a unit")]
    MissingUnit(String),
    /// A component's number was malformed.
    #[error("interval '{0}' is not a valid duration")]
    Invalid(String),
    /// The unit suffix was not recognised.
    #[error("unknown interval unit '{0}'; expected ms, s, m or h")]
    UnknownUnit(String),
    /// The value does not fit in 64-bit milliseconds.
    #[error("interval '{0}' is out of range")]
    OutOfRange(String),
    /// The value was zero.
    #[error("interval '{0}' must be greater than zero")]
    Zero(String),
}

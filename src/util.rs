//! Miscellaneous utility structs and functions.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::{SystemTime, UNIX_EPOCH};

/// An absolute timestamp in milliseconds since the UNIX epoch.
pub type Millis = i64;

/// Gets the current wall clock time.
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or(0)
}

/// A half-open interval `[min, max)` on the number line.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: PartialOrd> Interval<T> {
    /// Returns true if this interval overlaps with the other.
    /// Intervals which merely touch do not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value < self.max
    }

    /// Returns true if the interval is empty.
    pub fn is_empty(&self) -> bool {
        self.max <= self.min
    }
}

impl<T: std::ops::Sub<T, Output = T> + Copy> Interval<T> {
    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }
}

impl Interval<Millis> {
    /// Moves the interval so that it starts at `min`, preserving its length.
    /// The end saturates at the largest representable time.
    pub fn starting_at(&self, min: Millis) -> Self {
        Self {
            min,
            max: min.saturating_add(self.max.saturating_sub(self.min)),
        }
    }
}

impl<T: Ord + Copy> Interval<T> {
    /// Returns a copy of the interval whose end is no earlier than `max`.
    pub fn extended_to(&self, max: T) -> Self {
        Self {
            min: self.min,
            max: std::cmp::max(self.max, max),
        }
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}, {:?})", &self.min, &self.max)
    }
}

use crate::util::Millis;
use arrayvec::ArrayVec;
use log::debug;
use serde::{Deserialize, Serialize};

/// The number of proximity rangers: left, front and right.
pub const NUM_RANGERS: usize = 3;

/// The distances below which each ranger reports an obstacle, in mm.
pub const DEFAULT_THRESHOLDS_MM: [f64; NUM_RANGERS] = [1000.0, 2200.0, 1000.0];

/// Readings older than this are ignored, in ms.
pub const DEFAULT_MAX_READING_AGE: Millis = 500;

/// A set of proximity readings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeReadings {
    /// The measured distances in mm, ordered left to right.
    /// `None` where a ranger returned nothing.
    pub ranges_mm: ArrayVec<Option<f64>, NUM_RANGERS>,
    /// When the readings were taken.
    pub taken_at: Millis,
}

/// Decides, without help from the server, whether the vehicle may cross.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalFallback {
    /// Obstacle thresholds in mm, one per ranger.
    pub thresholds_mm: [f64; NUM_RANGERS],
    /// The maximum age of usable readings, in ms.
    pub max_reading_age: Millis,
}

impl RangeReadings {
    /// Creates readings from a full set of measurements.
    pub fn new(ranges_mm: [f64; NUM_RANGERS], taken_at: Millis) -> Self {
        Self {
            ranges_mm: ranges_mm.iter().map(|r| Some(*r)).collect(),
            taken_at,
        }
    }
}

impl LocalFallback {
    pub fn new(thresholds_mm: [f64; NUM_RANGERS]) -> Self {
        Self {
            thresholds_mm,
            max_reading_age: DEFAULT_MAX_READING_AGE,
        }
    }

    /// Returns true if the readings show the intersection is clear.
    /// Missing, incomplete or stale readings count as an obstacle.
    pub fn is_clear(&self, readings: Option<&RangeReadings>, now: Millis) -> bool {
        let readings = match readings {
            Some(readings) if now - readings.taken_at <= self.max_reading_age => readings,
            Some(_) => {
                debug!("Range readings are stale");
                return false;
            }
            None => return false,
        };
        self.thresholds_mm.iter().enumerate().all(|(idx, threshold)| {
            matches!(readings.ranges_mm.get(idx), Some(Some(range)) if range > threshold)
        })
    }
}

impl Default for LocalFallback {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLDS_MM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obstacles() {
        let fallback = LocalFallback::default();
        let clear = RangeReadings::new([1500.0, 3000.0, 1500.0], 100);
        assert!(fallback.is_clear(Some(&clear), 200));
        assert!(!fallback.is_clear(Some(&clear), 1000));
        assert!(!fallback.is_clear(None, 200));

        let blocked = RangeReadings::new([1500.0, 2000.0, 1500.0], 100);
        assert!(!fallback.is_clear(Some(&blocked), 200));

        let mut partial = clear.clone();
        partial.ranges_mm[2] = None;
        assert!(!fallback.is_clear(Some(&partial), 200));
        partial.ranges_mm.pop();
        assert!(!fallback.is_clear(Some(&partial), 200));
    }
}

use crate::util::Millis;

/// Distance from the point where the approach is detected to the entry line, in cm.
pub const APPROACH_DISTANCE_CM: f64 = 90.0;

/// The speed assumed when the vehicle does not report one, in cm/s.
pub const DEFAULT_SPEED_CM_S: f64 = 75.0;

/// The slowest speed used for estimates, in cm/s.
const MIN_SPEED_CM_S: f64 = 1.0;

/// Estimates when a vehicle will reach and clear the intersection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimator {
    /// Distance to the entry line when the vehicle starts its approach, in cm.
    pub approach_cm: f64,
    /// Width of the intersection, in cm.
    pub width_cm: f64,
    /// The vehicle's cruising speed, in cm/s.
    pub speed_cm_s: f64,
}

impl Estimator {
    pub fn new(width_cm: u32, speed_cm_s: f64) -> Self {
        Self {
            approach_cm: APPROACH_DISTANCE_CM,
            width_cm: width_cm as f64,
            speed_cm_s,
        }
    }

    fn speed(&self) -> f64 {
        self.speed_cm_s.max(MIN_SPEED_CM_S)
    }

    /// The time taken to travel to the entry line, in ms.
    pub fn approach_time(&self) -> f64 {
        1000.0 * self.approach_cm / self.speed()
    }

    /// The time taken to cross the intersection, in ms.
    pub fn crossing_time(&self) -> f64 {
        1000.0 * self.width_cm / self.speed()
    }

    /// The estimated times of arrival and clearance for an approach starting at `now`.
    /// The time of clearance is always after the time of arrival.
    pub fn estimate(&self, now: Millis) -> (Millis, Millis) {
        let eta = now + self.approach_time().round() as Millis;
        let etc = eta + (self.crossing_time().round() as Millis).max(1);
        (eta, etc)
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new(150, DEFAULT_SPEED_CM_S)
    }
}

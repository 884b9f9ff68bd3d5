//! The vehicle's motion layer and proximity sensors, as seen by the client.

use super::estimate::APPROACH_DISTANCE_CM;
use super::fallback::{RangeReadings, NUM_RANGERS};
use super::{Command, MotionEvent};
use crate::error::ClientError;
use crate::util::Millis;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

/// Drives the vehicle along its lane and reports where it is relative to the intersection.
pub trait MotionControl {
    /// Tells the vehicle to stop or go.
    fn command(&mut self, command: Command) -> Result<(), ClientError>;

    /// Advances to `now` and returns the events raised since the last call.
    fn poll_events(&mut self, now: Millis) -> SmallVec<[MotionEvent; 2]>;
}

/// Measures the distance to nearby obstacles.
pub trait ProximitySensor {
    /// The latest readings, if any are available.
    fn readings(&mut self, now: Millis) -> Option<RangeReadings>;
}

/// Distance travelled after the start of a lap before the approach begins, in cm.
const LEAD_CM: f64 = 100.0;

/// Distance travelled after leaving the intersection before the lap ends, in cm.
const TAIL_CM: f64 = 300.0;

/// Relative variation in speed from one update to the next.
const SPEED_NOISE: f64 = 0.05;

/// A vehicle driving laps of a looped lane that passes through the intersection once per lap.
#[derive(Clone, Debug)]
pub struct SimulatedLane {
    /// Position along the loop, in cm.
    pos_cm: f64,
    /// Cruising speed, in cm/s.
    speed_cm_s: f64,
    /// Where the approach event is raised.
    approach_cm: f64,
    /// Where the entry line is.
    entry_cm: f64,
    /// Where the exit line is.
    exit_cm: f64,
    /// The length of the loop.
    loop_cm: f64,
    /// Whether the vehicle is moving.
    moving: bool,
    /// When the position was last updated.
    updated_at: Option<Millis>,
    /// Completed laps.
    laps: usize,
    /// Probability that a ranger sees an obstacle on any one reading.
    obstacle_probability: f64,
    rng: StdRng,
}

impl SimulatedLane {
    /// Creates a lane through an intersection of the given width, with the vehicle
    /// stopped at the start of the loop.
    pub fn new(width_cm: u32, speed_cm_s: f64) -> Self {
        Self::with_rng(width_cm, speed_cm_s, StdRng::from_entropy())
    }

    /// As [new](Self::new), with a fixed random seed.
    pub fn seeded(width_cm: u32, speed_cm_s: f64, seed: u64) -> Self {
        Self::with_rng(width_cm, speed_cm_s, StdRng::seed_from_u64(seed))
    }

    fn with_rng(width_cm: u32, speed_cm_s: f64, rng: StdRng) -> Self {
        let approach_cm = LEAD_CM;
        let entry_cm = approach_cm + APPROACH_DISTANCE_CM;
        let exit_cm = entry_cm + width_cm as f64;
        Self {
            pos_cm: 0.0,
            speed_cm_s,
            approach_cm,
            entry_cm,
            exit_cm,
            loop_cm: exit_cm + TAIL_CM,
            moving: false,
            updated_at: None,
            laps: 0,
            obstacle_probability: 0.0,
            rng,
        }
    }

    /// Sets the probability that a ranger sees an obstacle.
    pub fn set_obstacle_probability(&mut self, probability: f64) {
        self.obstacle_probability = probability.clamp(0.0, 1.0);
    }

    /// The position along the loop, in cm.
    pub fn position(&self) -> f64 {
        self.pos_cm
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// The number of completed laps.
    pub fn laps(&self) -> usize {
        self.laps
    }

    /// Raises the events for every mark in `(from, to]`.
    fn passed_marks(&self, from: f64, to: f64, events: &mut SmallVec<[MotionEvent; 2]>) {
        let marks = [
            (self.approach_cm, MotionEvent::Approaching),
            (self.entry_cm, MotionEvent::Entering),
            (self.exit_cm, MotionEvent::Exiting),
        ];
        for (mark, event) in marks {
            if from < mark && mark <= to {
                events.push(event);
            }
        }
    }
}

impl MotionControl for SimulatedLane {
    fn command(&mut self, command: Command) -> Result<(), ClientError> {
        self.moving = command == Command::Go;
        Ok(())
    }

    fn poll_events(&mut self, now: Millis) -> SmallVec<[MotionEvent; 2]> {
        let mut events = SmallVec::new();
        let dt = match self.updated_at.replace(now) {
            Some(then) => (now - then).max(0) as f64 / 1000.0,
            None => 0.0,
        };
        if !self.moving || dt == 0.0 {
            return events;
        }

        let noise = self.rng.gen_range(1.0 - SPEED_NOISE..1.0 + SPEED_NOISE);
        let from = self.pos_cm;
        let to = from + self.speed_cm_s * noise * dt;
        if to >= self.loop_cm {
            self.passed_marks(from, self.loop_cm, &mut events);
            self.laps += 1;
            self.pos_cm = to - self.loop_cm;
            self.passed_marks(-1.0, self.pos_cm, &mut events);
        } else {
            self.passed_marks(from, to, &mut events);
            self.pos_cm = to;
        }
        events
    }
}

impl ProximitySensor for SimulatedLane {
    fn readings(&mut self, now: Millis) -> Option<RangeReadings> {
        let mut ranges = [0.0; NUM_RANGERS];
        for range in &mut ranges {
            *range = if self.rng.gen_bool(self.obstacle_probability) {
                self.rng.gen_range(100.0..800.0)
            } else {
                self.rng.gen_range(2500.0..5000.0)
            };
        }
        Some(RangeReadings::new(ranges, now))
    }
}

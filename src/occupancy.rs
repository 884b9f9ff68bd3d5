use crate::protocol::Grant;
use crate::request::{VehicleAddr, VehicleRequest};
use crate::topology::LaneSpec;
use crate::util::{Interval, Millis};
use serde::{Deserialize, Serialize};

/// A vehicle's claim on the intersection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancyRecord {
    /// The vehicle holding the claim.
    pub vehicle: VehicleAddr,
    /// The lanes the vehicle uses.
    pub lane: LaneSpec,
    /// The granted interval.
    pub window: Interval<Millis>,
    /// What the vehicle was told.
    pub grant: Grant,
    /// When access was granted.
    pub granted_at: Millis,
}

/// The vehicles currently inside, or scheduled to use, the intersection.
#[derive(Clone, Debug, Default)]
pub struct Occupancy {
    records: Vec<OccupancyRecord>,
}

impl OccupancyRecord {
    pub(crate) fn new(request: &VehicleRequest, grant: Grant, granted_at: Millis) -> Self {
        Self {
            vehicle: request.vehicle,
            lane: request.lane,
            window: request.window(),
            grant,
            granted_at,
        }
    }
}

impl Occupancy {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OccupancyRecord> {
        self.records.iter()
    }

    /// Returns true if the vehicle holds a claim.
    pub fn contains(&self, vehicle: &VehicleAddr) -> bool {
        self.get(vehicle).is_some()
    }

    pub fn get(&self, vehicle: &VehicleAddr) -> Option<&OccupancyRecord> {
        self.records.iter().find(|r| r.vehicle == *vehicle)
    }

    /// Adds a claim. A vehicle holds at most one claim; an existing one is replaced.
    pub(crate) fn insert(&mut self, record: OccupancyRecord) {
        self.remove(&record.vehicle);
        self.records.push(record);
    }

    /// Releases the vehicle's claim.
    pub(crate) fn remove(&mut self, vehicle: &VehicleAddr) -> Option<OccupancyRecord> {
        let idx = self.records.iter().position(|r| r.vehicle == *vehicle)?;
        Some(self.records.remove(idx))
    }

    /// Releases every claim whose interval ended before `cutoff`.
    pub(crate) fn remove_ended(&mut self, cutoff: Millis) -> Vec<OccupancyRecord> {
        let (ended, kept): (Vec<_>, Vec<_>) = self
            .records
            .drain(..)
            .partition(|r| r.window.max < cutoff);
        self.records = kept;
        ended
    }
}

use crate::error::EmptyQueueError;
use crate::request::{VehicleAddr, VehicleRequest};
use crate::util::Millis;
use crate::RequestKey;
use itertools::Itertools;
use log::{debug, warn};
use slotmap::SlotMap;
use std::collections::{BTreeSet, HashMap};

/// The pending requests, ordered by estimated time of arrival.
/// Ties are broken by the vehicle's address.
#[derive(Default, Debug)]
pub struct ReservationQueue {
    /// The pending requests.
    requests: SlotMap<RequestKey, VehicleRequest>,
    /// The order in which requests are considered.
    order: BTreeSet<(Millis, VehicleAddr)>,
    /// Looks up a request by vehicle.
    by_vehicle: HashMap<VehicleAddr, RequestKey>,
}

impl ReservationQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// The number of pending requests.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true if no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Adds a request to the queue.
    /// Returns false, leaving the queue unchanged, if the vehicle already has a pending request.
    pub fn enqueue(&mut self, mut request: VehicleRequest) -> bool {
        if self.contains(&request.vehicle) {
            warn!("{} already has a pending request, ignoring", request.vehicle);
            return false;
        }
        request.enqueued = true;
        let vehicle = request.vehicle;
        self.order.insert((request.eta(), vehicle));
        let key = self.requests.insert(request);
        self.by_vehicle.insert(vehicle, key);
        true
    }

    /// Gets the request with the earliest estimated time of arrival.
    pub fn peek_head(&self) -> Result<&VehicleRequest, EmptyQueueError> {
        self.order
            .iter()
            .next()
            .and_then(|(_, vehicle)| self.get(vehicle))
            .ok_or(EmptyQueueError)
    }

    /// Removes and returns the request with the earliest estimated time of arrival.
    pub fn dequeue_head(&mut self) -> Result<VehicleRequest, EmptyQueueError> {
        let vehicle = self
            .order
            .iter()
            .next()
            .map(|(_, vehicle)| *vehicle)
            .ok_or(EmptyQueueError)?;
        self.remove(&vehicle).ok_or(EmptyQueueError)
    }

    /// Returns true if the vehicle has a pending request.
    pub fn contains(&self, vehicle: &VehicleAddr) -> bool {
        self.by_vehicle.contains_key(vehicle)
    }

    /// Gets the vehicle's pending request.
    pub fn get(&self, vehicle: &VehicleAddr) -> Option<&VehicleRequest> {
        self.by_vehicle
            .get(vehicle)
            .and_then(|key| self.requests.get(*key))
    }

    /// Revises the estimated times of a pending request and moves it to its new place in the queue.
    /// Returns false if the vehicle has no pending request or the times are invalid.
    pub fn reschedule(&mut self, vehicle: &VehicleAddr, eta: Millis, etc: Millis) -> bool {
        if etc <= eta {
            return false;
        }
        let Some(request) = self
            .by_vehicle
            .get(vehicle)
            .and_then(|key| self.requests.get_mut(*key))
        else {
            return false;
        };
        self.order.remove(&(request.eta(), *vehicle));
        request.set_window(eta, etc);
        self.order.insert((eta, *vehicle));
        true
    }

    /// Records that the vehicle sent its request again.
    pub fn touch(&mut self, vehicle: &VehicleAddr, now: Millis) {
        if let Some(request) = self
            .by_vehicle
            .get(vehicle)
            .and_then(|key| self.requests.get_mut(*key))
        {
            request.last_seen = now;
        }
    }

    /// Removes the vehicle's pending request.
    pub fn remove(&mut self, vehicle: &VehicleAddr) -> Option<VehicleRequest> {
        let key = self.by_vehicle.remove(vehicle)?;
        let mut request = self.requests.remove(key)?;
        self.order.remove(&(request.eta(), *vehicle));
        request.enqueued = false;
        Some(request)
    }

    /// Removes every request not sent again since `cutoff`.
    pub fn remove_stale(&mut self, cutoff: Millis) -> Vec<VehicleRequest> {
        let stale = self
            .requests
            .values()
            .filter(|request| request.last_seen < cutoff)
            .map(|request| request.vehicle)
            .collect::<Vec<_>>();
        stale
            .iter()
            .filter_map(|vehicle| self.remove(vehicle))
            .collect()
    }

    /// Iterates over the pending requests in order.
    pub fn iter(&self) -> impl Iterator<Item = &VehicleRequest> + '_ {
        self.order
            .iter()
            .filter_map(move |(_, vehicle)| self.get(vehicle))
    }

    /// Logs the contents of the queue.
    pub(crate) fn log_contents(&self) {
        debug!(
            "Queue: {}",
            self.iter()
                .map(|r| format!("{}@{}", r.vehicle, r.eta()))
                .join(" - ")
        );
    }
}

//! Tests of the scheduler under the sequential policy.

mod common;

use auto_intersection::{Message, Outgoing, PolicyKind, StepOutcome};
use common::*;

/// Test that a second vehicle waits for the first to exit, whatever its estimates.
#[test]
fn one_vehicle_at_a_time() {
    let mut sched = scheduler(PolicyKind::Sequential);
    sched.handle_message(request(vehicle(2), 1000, 1200), 0);
    assert_eq!(
        sched.step(0),
        StepOutcome::Granted(Outgoing {
            to: vehicle(2),
            msg: Message::GrantAccess {
                sender: server_addr(),
            },
        })
    );
    assert_eq!(sched.policy().next_available_etc(), None);

    sched.handle_message(request_on(vehicle(3), lane(2, 0), 5000, 5200), 0);
    for now in [0, 1000, 6000, 60_000] {
        assert_eq!(sched.step(now), StepOutcome::Held(vehicle(3)));
        assert!(sched.occupancy().len() <= 1);
    }
    let queued = sched.queue().get(&vehicle(3)).unwrap();
    assert_eq!((queued.eta(), queued.etc()), (5000, 5200));

    sched.handle_message(exiting(vehicle(2)), 60_000);
    assert!(sched.occupancy().is_empty());
    match sched.step(60_000) {
        StepOutcome::Granted(out) => assert_eq!(out.to, vehicle(3)),
        other => panic!("expected a grant, got {:?}", other),
    }
    assert_eq!(sched.stats().exits, 1);
}

/// Test that a second exit notification from the same vehicle changes nothing.
#[test]
fn exit_is_idempotent() {
    let mut sched = scheduler(PolicyKind::Sequential);
    sched.handle_message(request(vehicle(2), 1000, 1200), 0);
    sched.step(0);
    sched.handle_message(request(vehicle(3), 1100, 1300), 0);

    assert_eq!(sched.handle_message(exiting(vehicle(2)), 1500), None);
    let exits = sched.stats().exits;
    let queued = sched.queue().len();
    let occupants = sched.occupancy().len();

    assert_eq!(sched.handle_message(exiting(vehicle(2)), 1600), None);
    assert_eq!(sched.stats().exits, exits);
    assert_eq!(sched.queue().len(), queued);
    assert_eq!(sched.occupancy().len(), occupants);
    assert_eq!(sched.stats().anomalies, 1);
}

/// Test that an exit from a vehicle that holds nothing is ignored.
#[test]
fn unexpected_exit_is_ignored() {
    let mut sched = scheduler(PolicyKind::Sequential);
    sched.handle_message(request(vehicle(2), 1000, 1200), 0);
    sched.step(0);

    sched.handle_message(exiting(vehicle(9)), 100);
    assert!(sched.occupancy().contains(&vehicle(2)));
    assert_eq!(sched.stats().anomalies, 1);
}

/// Test that a queued vehicle which exits without a grant gives up its place.
#[test]
fn exit_cancels_queued_request() {
    let mut sched = scheduler(PolicyKind::Sequential);
    sched.handle_message(request(vehicle(2), 1000, 1200), 0);
    sched.step(0);
    sched.handle_message(request(vehicle(3), 1100, 1300), 0);

    sched.handle_message(exiting(vehicle(3)), 2000);
    assert!(sched.queue().is_empty());
    assert!(sched.occupancy().contains(&vehicle(2)));
    assert_eq!(sched.stats().anomalies, 0);
}

/// Test that an occupant is never released for inactivity.
#[test]
fn occupant_does_not_expire() {
    let mut sched = scheduler(PolicyKind::Sequential).with_request_ttl(1000);
    sched.handle_message(request(vehicle(2), 1000, 1200), 0);
    sched.step(0);

    assert!(sched.expire(100_000).is_empty());
    assert!(sched.occupancy().contains(&vehicle(2)));
}

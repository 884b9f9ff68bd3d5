//! Tests of the scheduler under the parallel policy.

mod common;

use auto_intersection::{
    ConflictMode, Message, PolicyKind, Scheduler, StepOutcome, Topology,
};
use common::*;
use std::sync::Arc;

fn granted(outcome: StepOutcome) -> Message {
    match outcome {
        StepOutcome::Granted(out) => out.msg,
        other => panic!("expected a grant, got {:?}", other),
    }
}

/// Test that opposing straight movements cross together, and a crossing movement waits.
#[test]
fn compatible_lanes_share_the_intersection() {
    let mut sched = scheduler(PolicyKind::Parallel);
    sched.handle_message(request_on(vehicle(2), lane(0, 2), 1000, 1200), 0);
    sched.handle_message(request_on(vehicle(3), lane(2, 0), 1000, 1200), 0);
    sched.handle_message(request_on(vehicle(4), lane(1, 3), 1100, 1300), 0);

    let msg = granted(sched.step(0));
    assert_eq!(msg, Message::GrantAccess { sender: server_addr() });
    granted(sched.step(0));
    assert_eq!(sched.occupancy().len(), 2);

    assert_eq!(
        sched.step(0),
        StepOutcome::Delayed {
            vehicle: vehicle(4),
            eta: 1200,
            etc: 1400,
        }
    );
    assert_eq!(sched.step(0), StepOutcome::Held(vehicle(4)));

    // The remaining occupant is overdue, so the estimate moves with the clock.
    sched.handle_message(exiting(vehicle(2)), 1300);
    assert_eq!(
        sched.step(1300),
        StepOutcome::Delayed {
            vehicle: vehicle(4),
            eta: 1300,
            etc: 1500,
        }
    );
    sched.handle_message(exiting(vehicle(3)), 1350);
    granted(sched.step(1350));
    assert!(sched.occupancy().contains(&vehicle(4)));
}

/// Test that vehicles holding claims at the same time never use conflicting lanes.
#[test]
fn occupants_never_conflict() {
    let mut sched = scheduler(PolicyKind::Parallel);
    let lanes = [
        lane(0, 2),
        lane(0, 3),
        lane(1, 3),
        lane(2, 0),
        lane(2, 1),
        lane(3, 1),
        lane(1, 2),
        lane(3, 0),
    ];
    for (n, lane) in lanes.iter().enumerate() {
        let eta = 1000 + 50 * n as i64;
        sched.handle_message(request_on(vehicle(10 + n as u8), *lane, eta, eta + 200), 0);
    }

    let mut now = 0;
    let mut exited = 0;
    while exited < lanes.len() && now < 100_000 {
        sched.step(now);
        let records = sched.occupancy().iter().cloned().collect::<Vec<_>>();
        for a in &records {
            for b in &records {
                if a.vehicle != b.vehicle {
                    assert!(!sched.topology().conflicts(&a.lane, &b.lane));
                }
            }
        }
        // Whoever has been inside longest leaves.
        if let Some(first) = records.iter().min_by_key(|r| r.granted_at) {
            if now - first.granted_at >= 200 {
                sched.handle_message(exiting(first.vehicle), now);
                exited += 1;
            }
        }
        now += 50;
    }
    assert_eq!(exited, lanes.len());
    assert!(sched.queue().is_empty());
}

/// Test that a vehicle which stays past its estimate keeps blocking conflicting lanes.
#[test]
fn overdue_occupant_keeps_its_claim() {
    let mut sched = scheduler(PolicyKind::Parallel);
    sched.handle_message(request_on(vehicle(2), lane(0, 2), 1000, 1200), 0);
    granted(sched.step(0));

    sched.handle_message(request_on(vehicle(4), lane(1, 3), 4000, 4200), 5000);
    assert_eq!(
        sched.step(5000),
        StepOutcome::Delayed {
            vehicle: vehicle(4),
            eta: 5000,
            etc: 5200,
        }
    );
    assert_eq!(sched.step(5000), StepOutcome::Held(vehicle(4)));
    // While the occupant stays, the estimate keeps moving with the clock.
    assert_eq!(
        sched.step(5500),
        StepOutcome::Delayed {
            vehicle: vehicle(4),
            eta: 5500,
            etc: 5700,
        }
    );
    assert_eq!(sched.step(5500), StepOutcome::Held(vehicle(4)));
    assert!(sched.expire(20_000).contains(&vehicle(4)));
    assert!(sched.occupancy().contains(&vehicle(2)));
}

/// Test that with conservative lane conflicts vehicles cross one at a time.
#[test]
fn conservative_conflicts() {
    let topology = Topology::new(4, 2, 150, ConflictMode::Conservative).unwrap();
    let mut sched = Scheduler::new(Arc::new(topology), PolicyKind::Parallel, server_addr());
    sched.handle_message(request_on(vehicle(2), lane(0, 2), 1000, 1200), 0);
    sched.handle_message(request_on(vehicle(3), lane(2, 0), 1000, 1200), 0);

    granted(sched.step(0));
    assert!(matches!(sched.step(0), StepOutcome::Delayed { .. }));
    assert_eq!(sched.occupancy().len(), 1);
}

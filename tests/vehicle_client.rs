//! Tests of the vehicle client state machine.

mod common;

use assert_approx_eq::assert_approx_eq;
use auto_intersection::vehicle::estimate::Estimator;
use auto_intersection::vehicle::fallback::{LocalFallback, RangeReadings};
use auto_intersection::vehicle::motion::{MotionControl, ProximitySensor, SimulatedLane};
use auto_intersection::{
    Action, ClientError, ClientParams, ClientState, Command, Grant, Message, MotionEvent,
    VehicleClient,
};
use common::*;

fn client() -> VehicleClient {
    VehicleClient::new(
        vehicle(5),
        lane(0, 2),
        Estimator::new(150, 75.0),
        ClientParams::default(),
        LocalFallback::default(),
    )
}

fn clear(now: i64) -> RangeReadings {
    RangeReadings::new([3000.0, 3000.0, 3000.0], now)
}

fn sent_request(actions: &[Action]) -> bool {
    actions
        .iter()
        .any(|a| matches!(a, Action::Send(Message::RequestAccess { .. })))
}

/// Test that a vehicle which never hears from the server crosses on its own sensors.
#[test]
fn falls_back_when_no_grant_arrives() {
    let mut client = client();
    assert_eq!(client.start().as_slice(), &[Action::Motion(Command::Go)]);
    assert_eq!(client.state(), ClientState::FollowingLane);

    let actions = client.on_motion_event(MotionEvent::Approaching, 0).unwrap();
    assert!(sent_request(&actions));
    assert_eq!(client.state(), ClientState::AwaitingRemoteGrant);

    let mut retransmissions = 0;
    let mut now = 0;
    while client.state() == ClientState::AwaitingRemoteGrant {
        now += 100;
        let actions = client.tick(now, None);
        if sent_request(&actions) {
            retransmissions += 1;
        }
    }
    assert_eq!(now, 5000);
    assert_eq!(retransmissions, 4);
    assert_eq!(client.state(), ClientState::LocalFallback);
    assert!(client.is_halted());

    // An obstacle keeps the vehicle where it is.
    let blocked = RangeReadings::new([3000.0, 500.0, 3000.0], now);
    assert!(client.tick(now + 100, Some(&blocked)).is_empty());
    assert_eq!(client.state(), ClientState::LocalFallback);

    let actions = client.tick(now + 200, Some(&clear(now + 200)));
    assert_eq!(
        actions.as_slice(),
        &[
            Action::Motion(Command::Go),
            Action::FallbackFinished { success: true },
        ]
    );
    assert_eq!(client.state(), ClientState::FollowingLane);

    // Having crossed, the vehicle still reports its exit.
    assert!(client.on_motion_event(MotionEvent::Entering, now + 300).unwrap().is_empty());
    let actions = client.on_motion_event(MotionEvent::Exiting, now + 2300).unwrap();
    assert_eq!(
        actions.as_slice(),
        &[Action::Send(Message::Exiting { sender: vehicle(5) })]
    );
    assert_eq!(client.grant(), None);
}

/// Test that losing the server while waiting switches to local control at once.
#[test]
fn falls_back_when_server_unreachable() {
    let mut client = client();
    client.start();
    client.on_motion_event(MotionEvent::Approaching, 0).unwrap();
    let actions = client.on_server_unreachable(10);
    assert_eq!(actions.as_slice(), &[Action::Motion(Command::Stop)]);
    assert_eq!(client.state(), ClientState::LocalFallback);

    // Not waiting, so nothing happens.
    let mut idle = self::client();
    assert!(idle.on_server_unreachable(10).is_empty());
}

/// Test that a failure of the motion layer halts the client.
#[test]
fn motion_error_is_fatal() {
    let mut client = client();
    client.start();
    client.on_motion_event(MotionEvent::Approaching, 0).unwrap();

    let err = client
        .on_motion_event(MotionEvent::Error("line lost".to_string()), 100)
        .unwrap_err();
    assert!(matches!(err, ClientError::Motion(ref msg) if msg == "line lost"));
    assert_eq!(client.state(), ClientState::Idle);
    assert!(client.tick(10_000, None).is_empty());
    assert!(client.on_motion_event(MotionEvent::Approaching, 10_100).unwrap().is_empty());
}

/// Test that an immediate grant lets the vehicle cross without stopping.
#[test]
fn crosses_with_grant() {
    let mut client = client();
    client.start();
    let actions = client.on_motion_event(MotionEvent::Approaching, 0).unwrap();
    let (eta, etc) = match &actions[0] {
        Action::Send(Message::RequestAccess { eta, etc, sender, .. }) => {
            assert_eq!(*sender, vehicle(5));
            (*eta, *etc)
        }
        other => panic!("expected a request, got {:?}", other),
    };
    assert_eq!(eta, 1200);
    assert_eq!(etc, 3200);

    let grant = Message::GrantAccess { sender: server_addr() };
    assert!(client.on_message(&grant, 300).is_empty());
    assert_eq!(client.state(), ClientState::FollowingLane);
    assert_eq!(client.grant(), Some(Grant::Immediate));

    // Grants are not retransmitted.
    assert!(client.tick(2000, None).is_empty());
    assert!(client.on_motion_event(MotionEvent::Entering, 1200).unwrap().is_empty());
    let actions = client.on_motion_event(MotionEvent::Exiting, 3200).unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(client.grant(), None);
}

/// Test that a vehicle arriving before its reserved time waits at the entry line.
#[test]
fn waits_for_reservation() {
    let mut client = client();
    client.start();
    client.on_motion_event(MotionEvent::Approaching, 0).unwrap();
    let reservation = Message::ReservationTime {
        sender: server_addr(),
        confirmed_eta: 2000,
    };
    assert!(client.on_message(&reservation, 100).is_empty());

    let actions = client.on_motion_event(MotionEvent::Entering, 1200).unwrap();
    assert_eq!(actions.as_slice(), &[Action::Motion(Command::Stop)]);
    assert!(client.tick(1900, None).is_empty());
    assert_eq!(client.tick(2000, None).as_slice(), &[Action::Motion(Command::Go)]);
    assert!(!client.is_halted());
}

/// Test that a vehicle which reaches the intersection without a grant stops until it gets one.
#[test]
fn stops_without_grant() {
    let mut client = client();
    client.start();
    client.on_motion_event(MotionEvent::Approaching, 0).unwrap();

    let actions = client.on_motion_event(MotionEvent::Entering, 1200).unwrap();
    assert_eq!(actions.as_slice(), &[Action::Motion(Command::Stop)]);

    let grant = Message::GrantAccess { sender: server_addr() };
    assert_eq!(
        client.on_message(&grant, 1500).as_slice(),
        &[Action::Motion(Command::Go)]
    );
    // A repeated grant is ignored.
    assert!(client.on_message(&grant, 1600).is_empty());
}

/// Test that stopping the client abandons the approach.
#[test]
fn stop_cancels_approach() {
    let mut client = client();
    client.start();
    client.on_motion_event(MotionEvent::Approaching, 0).unwrap();
    client.on_server_unreachable(0);

    let actions = client.stop();
    assert_eq!(
        actions.as_slice(),
        &[
            Action::FallbackFinished { success: false },
            Action::Motion(Command::Stop),
        ]
    );
    assert_eq!(client.state(), ClientState::Idle);
    assert!(client.tick(10_000, Some(&clear(10_000))).is_empty());
}

/// Test the arrival and clearance estimates.
#[test]
fn estimates() {
    let estimator = Estimator::new(150, 75.0);
    assert_approx_eq!(estimator.approach_time(), 1200.0);
    assert_approx_eq!(estimator.crossing_time(), 2000.0);
    assert_eq!(estimator.estimate(10_000), (11_200, 13_200));

    let slow = Estimator::new(150, 0.0);
    let (eta, etc) = slow.estimate(0);
    assert!(etc > eta);
    assert_approx_eq!(slow.crossing_time(), 150_000.0);
}

/// Test that the simulated lane raises its events in order, once per lap.
#[test]
fn simulated_lane_events() {
    let mut lane = SimulatedLane::seeded(150, 75.0, 7);
    assert!(lane.poll_events(0).is_empty());
    assert!(lane.poll_events(100).is_empty());

    lane.command(Command::Go).unwrap();
    let mut events = vec![];
    let mut now = 100;
    while lane.laps() < 2 {
        now += 100;
        events.extend(lane.poll_events(now));
    }
    assert_eq!(
        events,
        vec![
            MotionEvent::Approaching,
            MotionEvent::Entering,
            MotionEvent::Exiting,
            MotionEvent::Approaching,
            MotionEvent::Entering,
            MotionEvent::Exiting,
        ]
    );

    lane.command(Command::Stop).unwrap();
    let pos = lane.position();
    lane.poll_events(now + 1000);
    assert_approx_eq!(lane.position(), pos);

    let readings = lane.readings(now).unwrap();
    assert!(LocalFallback::default().is_clear(Some(&readings), now));
    lane.set_obstacle_probability(1.0);
    let readings = lane.readings(now).unwrap();
    assert!(!LocalFallback::default().is_clear(Some(&readings), now));
}

//! Attraction lifecycle and money/space rules, driven through `Economy`.

use chrono::{DateTime, TimeZone, Utc};
use kubepark_core::{
    economy::{Economy, RegisterOutcome},
    error::ParkError,
    ledger::Ledger,
    snapshot::SnapshotFile,
    state::{LifecycleState, Mode, ParkState, STARTING_MONEY},
    store::ParkStore,
    wire::RegisterRequest,
};
use std::sync::Arc;

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn economy(mode: Mode) -> Economy {
    let ledger = Ledger::new(ParkState::new(mode, noon()), SnapshotFile::in_memory());
    let journal = ParkStore::for_volume(None).expect("journal");
    Economy::new(Arc::new(ledger), Arc::new(journal))
}

fn ride(url: &str, build_cost: f64, repair_cost: f64, size: f64) -> RegisterRequest {
    RegisterRequest {
        url: url.into(),
        build_cost,
        repair_cost,
        size,
    }
}

fn state_of(economy: &Economy, url: &str) -> LifecycleState {
    economy
        .ledger()
        .view(|s| s.attraction(url).map(|a| a.state))
        .expect("view")
        .expect("attraction")
}

#[test]
fn register_charges_build_cost_and_reserves_space() {
    let eco = economy(Mode::Easy);
    let outcome = eco.register(&ride("http://carousel", 20_000.0, 1_000.0, 10.0)).expect("register");
    assert_eq!(outcome, RegisterOutcome::Built);

    let s = eco.ledger().read().expect("read");
    assert_eq!(s.money, 80_000.0);
    assert_eq!(s.used_space, 10.0);
    let record = s.attraction("http://carousel").expect("record");
    assert_eq!(record.state, LifecycleState::PendingDeployment);
    assert!(record.is_pending_health_check());
}

#[test]
fn register_checks_funds_before_space() {
    let eco = economy(Mode::Hard);
    let err = eco.register(&ride("http://coaster", 200_000.0, 0.0, 25.0)).unwrap_err();
    assert!(matches!(err, ParkError::InsufficientFunds { .. }), "got {err:?}");

    let err = eco.register(&ride("http://coaster", 100.0, 0.0, 25.0)).unwrap_err();
    assert!(matches!(err, ParkError::InsufficientSpace { .. }), "got {err:?}");

    let s = eco.ledger().read().expect("read");
    assert_eq!(s.money, STARTING_MONEY);
    assert_eq!(s.used_space, 0.0);
    assert!(s.attractions.is_empty());
}

#[test]
fn reregistering_a_live_attraction_is_free() {
    let eco = economy(Mode::Easy);
    let req = ride("http://restroom", 10_000.0, 500.0, 1.0);
    eco.register(&req).expect("build");
    assert_eq!(eco.register(&req).expect("again"), RegisterOutcome::AlreadyRegistered);

    eco.mark_operational("http://restroom").expect("operational");
    assert_eq!(eco.register(&req).expect("again"), RegisterOutcome::AlreadyRegistered);

    let s = eco.ledger().read().expect("read");
    assert_eq!(s.money, 90_000.0);
    assert_eq!(s.used_space, 1.0);
}

#[test]
fn health_check_promotes_once() {
    let eco = economy(Mode::Easy);
    eco.register(&ride("http://carousel", 20_000.0, 1_000.0, 10.0)).expect("register");
    assert!(eco.mark_operational("http://carousel").expect("first"));
    assert!(!eco.mark_operational("http://carousel").expect("second"));
    assert_eq!(state_of(&eco, "http://carousel"), LifecycleState::Operational);
    // Promotion never reserves space again.
    assert_eq!(eco.ledger().read().expect("read").used_space, 10.0);
}

#[test]
fn break_then_repair_charges_repair_cost() {
    let eco = economy(Mode::Easy);
    let req = ride("http://carousel", 20_000.0, 1_000.0, 10.0);
    eco.register(&req).expect("register");
    eco.mark_operational("http://carousel").expect("operational");

    eco.mark_broken("http://carousel").expect("break");
    eco.mark_broken("http://carousel").expect("break twice is a no-op");
    assert_eq!(state_of(&eco, "http://carousel"), LifecycleState::Broken);
    assert_eq!(eco.ledger().read().expect("read").money, 80_000.0);

    assert_eq!(eco.register(&req).expect("repair"), RegisterOutcome::Repaired);
    assert_eq!(state_of(&eco, "http://carousel"), LifecycleState::Operational);
    assert_eq!(eco.ledger().read().expect("read").money, 79_000.0);
}

#[test]
fn repair_rejected_when_broke_stays_broken() {
    let eco = economy(Mode::Easy);
    let req = ride("http://carousel", 20_000.0, 1_000.0, 10.0);
    eco.register(&req).expect("register");
    eco.mark_operational("http://carousel").expect("operational");
    eco.mark_broken("http://carousel").expect("break");
    eco.apply_transaction(-80_000.0).expect("drain");

    let err = eco.register(&req).unwrap_err();
    assert!(matches!(err, ParkError::InsufficientFunds { .. }), "got {err:?}");
    assert_eq!(state_of(&eco, "http://carousel"), LifecycleState::Broken);
    assert_eq!(eco.ledger().read().expect("read").money, 0.0);

    eco.apply_transaction(5_000.0).expect("revenue");
    assert_eq!(eco.register(&req).expect("repair"), RegisterOutcome::Repaired);
    assert_eq!(eco.ledger().read().expect("read").money, 4_000.0);
}

#[test]
fn breaking_a_pending_attraction_is_invalid() {
    let eco = economy(Mode::Easy);
    eco.register(&ride("http://carousel", 20_000.0, 1_000.0, 10.0)).expect("register");
    let err = eco.mark_broken("http://carousel").unwrap_err();
    assert!(matches!(err, ParkError::InvalidTransition { .. }), "got {err:?}");
    assert!(matches!(
        eco.mark_broken("http://nowhere").unwrap_err(),
        ParkError::AttractionNotFound { .. }
    ));
}

#[test]
fn entrance_fee_is_collected_while_open() {
    let eco = economy(Mode::Easy);
    assert_eq!(eco.enter().expect("enter"), 10.0);
    let s = eco.ledger().read().expect("read");
    assert_eq!(s.money, STARTING_MONEY + 10.0);
    // Untracked guests hold no space.
    assert_eq!(s.used_space, 0.0);
}

#[test]
fn closed_park_turns_guests_away() {
    let eco = economy(Mode::Easy);
    eco.ledger()
        .mutate(|s| {
            s.closed = true;
            Ok(())
        })
        .expect("close");
    assert!(matches!(eco.enter().unwrap_err(), ParkError::ParkClosed));
    assert_eq!(eco.ledger().read().expect("read").money, STARTING_MONEY);
}

#[test]
fn full_park_turns_guests_away() {
    let eco = economy(Mode::Hard);
    eco.register(&ride("http://big", 1_000.0, 0.0, 10.0)).expect("fill the park");
    assert!(matches!(eco.enter().unwrap_err(), ParkError::CapacityExceeded));
}

#[test]
fn tracked_guests_reserve_and_release_space() {
    let eco = economy(Mode::Hard).with_guest_space_tracking(true);
    eco.enter().expect("first guest");
    eco.enter().expect("second guest");
    let used = eco.ledger().read().expect("read").used_space;
    assert!((used - 0.10).abs() < 1e-9, "used {used}");

    eco.leave().expect("leave");
    eco.leave().expect("leave");
    assert!(eco.ledger().read().expect("read").used_space.abs() < 1e-9);

    assert!(matches!(eco.leave().unwrap_err(), ParkError::SpaceUnderflow { .. }));
}

#[test]
fn remove_releases_footprint() {
    let eco = economy(Mode::Easy);
    eco.register(&ride("http://carousel", 20_000.0, 1_000.0, 10.0)).expect("register");
    let record = eco.remove("http://carousel").expect("remove");
    assert_eq!(record.footprint, 10.0);

    let s = eco.ledger().read().expect("read");
    assert_eq!(s.used_space, 0.0);
    assert!(s.attractions.is_empty());
    assert!(matches!(
        eco.remove("http://carousel").unwrap_err(),
        ParkError::AttractionNotFound { .. }
    ));
}

#[test]
fn transactions_reject_overdraw_and_garbage() {
    let eco = economy(Mode::Easy);
    assert_eq!(eco.apply_transaction(5.0).expect("revenue"), STARTING_MONEY + 5.0);
    assert!(matches!(
        eco.apply_transaction(-(STARTING_MONEY + 100.0)).unwrap_err(),
        ParkError::InsufficientFunds { .. }
    ));
    assert!(matches!(eco.apply_transaction(f64::INFINITY).unwrap_err(), ParkError::BadRequest(_)));
    assert_eq!(eco.ledger().read().expect("read").money, STARTING_MONEY + 5.0);
}

#[test]
fn journal_records_each_accepted_change() {
    let eco = economy(Mode::Easy);
    let req = ride("http://carousel", 20_000.0, 1_000.0, 10.0);
    eco.register(&req).expect("register");
    eco.register(&req).expect("idempotent");
    let _ = eco.register(&ride("http://huge", 1.0, 0.0, 10_000.0));
    eco.mark_operational("http://carousel").expect("operational");
    eco.enter().expect("enter");
    eco.apply_transaction(5.0).expect("pay");

    let journal = eco.journal();
    assert_eq!(journal.event_count_by_type("attraction_registered").expect("count"), 1);
    assert_eq!(journal.event_count_by_type("attraction_operational").expect("count"), 1);
    assert_eq!(journal.event_count_by_type("guest_admitted").expect("count"), 1);
    assert_eq!(journal.event_count_by_type("transaction_applied").expect("count"), 1);
    assert_eq!(journal.event_count().expect("count"), 4);
}

#[test]
fn listing_shows_only_operational() {
    let eco = economy(Mode::Easy);
    eco.register(&ride("http://a", 1.0, 1.0, 1.0)).expect("a");
    eco.register(&ride("http://b", 1.0, 1.0, 1.0)).expect("b");
    eco.register(&ride("http://c", 1.0, 1.0, 1.0)).expect("c");
    eco.mark_operational("http://b").expect("b up");
    eco.mark_operational("http://c").expect("c up");
    eco.mark_broken("http://c").expect("c down");

    let ids: Vec<_> = eco
        .operational_attractions()
        .expect("list")
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(ids, vec!["http://b".to_string()]);
}

#[test]
fn removing_in_any_order_survives_float_drift() {
    let eco = economy(Mode::Easy);
    eco.register(&ride("http://a", 1.0, 1.0, 0.2)).expect("a");
    eco.register(&ride("http://b", 1.0, 1.0, 3.85)).expect("b");

    eco.remove("http://a").expect("remove a");
    let record = eco.remove("http://b").expect("remove b");
    assert_eq!(record.footprint, 3.85);

    let s = eco.ledger().read().expect("read");
    assert_eq!(s.used_space, 0.0);
    assert!(s.attractions.is_empty());
}

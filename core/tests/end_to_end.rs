//! Park, attractions and guests talking over real sockets.

use kubepark_core::{
    attraction::Attraction,
    config::{AttractionConfig, GuestConfig, ParkConfig},
    discovery::{PeerSource, StaticPeers},
    economy::{Economy, RegisterOutcome},
    error::ParkError,
    guest::Guest,
    orchestrator::{InProcessOrchestrator, WorkloadOrchestrator},
    park::{local_guests, Park},
    park_api,
    rng::{RngStream, SimRng},
    state::{LifecycleState, STARTING_MONEY},
    wire::UseRequest,
};
use reqwest::StatusCode;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::oneshot};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    (listener, url)
}

fn shutdown_pair() -> (oneshot::Sender<()>, impl Future<Output = ()> + Send + 'static) {
    let (tx, rx) = oneshot::channel::<()>();
    (tx, async move {
        let _ = rx.await;
    })
}

fn no_peers() -> Arc<dyn PeerSource> {
    Arc::new(StaticPeers::new(Vec::new()))
}

fn idle_guests() -> Arc<dyn WorkloadOrchestrator> {
    Arc::new(InProcessOrchestrator::new(local_guests(GuestConfig::default_test())))
}

fn park_config(self_url: &str) -> ParkConfig {
    ParkConfig {
        self_url: self_url.into(),
        admission_chance: 0.0,
        ..ParkConfig::default_test()
    }
}

/// Serve only the park API, without a reconciler.
async fn api_only() -> (Arc<Economy>, String) {
    let (listener, url) = bind().await;
    let park = Park::start(park_config(&url), no_peers(), idle_guests())
        .await
        .expect("park");
    let economy = Arc::clone(park.economy());
    let app = park_api::router(Arc::clone(&economy));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (economy, url)
}

fn state_of(economy: &Economy, id: &str) -> Option<LifecycleState> {
    economy
        .ledger()
        .view(|s| s.attraction(id).ok().map(|a| a.state))
        .expect("view")
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..250 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn guest_rides_a_registered_attraction() {
    let (park_listener, park_url) = bind().await;
    let park = Park::start(park_config(&park_url), no_peers(), idle_guests())
        .await
        .expect("park");
    let economy = Arc::clone(park.economy());
    let (stop_park, park_shutdown) = shutdown_pair();
    let park_task = tokio::spawn(park.serve(park_listener, park_shutdown));

    let (ride_listener, ride_url) = bind().await;
    let attraction = Attraction::load(AttractionConfig {
        park_url: park_url.clone(),
        self_url: ride_url.clone(),
        ..AttractionConfig::default_test()
    })
    .expect("attraction");
    let (stop_ride, ride_shutdown) = shutdown_pair();
    let ride_task = tokio::spawn(attraction.serve(ride_listener, ride_shutdown));

    // Registered on startup, then promoted by the reconciler's health check.
    wait_for(|| state_of(&economy, &ride_url) == Some(LifecycleState::Operational)).await;

    let report = Guest::new(GuestConfig {
        park_url: park_url.clone(),
        leave_chance: 0.0,
        max_visits: Some(2),
        ..GuestConfig::default_test()
    })
    .expect("guest")
    .run()
    .await
    .expect("visit");

    assert!(report.entered);
    assert_eq!(report.visits, 2);
    assert_eq!(report.failed_visits, 0);
    assert_eq!(report.spent, 10.0);

    // Build cost out, entrance fee and two ride fees in.
    let money = economy.ledger().read().expect("read").money;
    assert_eq!(money, STARTING_MONEY - 20_000.0 + 10.0 + 2.0 * 5.0);

    let _ = stop_ride.send(());
    let _ = stop_park.send(());
    ride_task.await.expect("join").expect("attraction stopped cleanly");
    park_task.await.expect("join").expect("park stopped cleanly");
}

#[tokio::test]
async fn broken_attraction_pays_for_repair_once_after_restart() {
    let (economy, park_url) = api_only().await;
    let volume = tempfile::tempdir().expect("tempdir");
    let config = AttractionConfig {
        park_url,
        self_url: "http://carousel-1".into(),
        volume: Some(volume.path().to_path_buf()),
        break_chance: 1.0,
        ..AttractionConfig::default_test()
    };

    let attraction = Attraction::load(config.clone()).expect("load");
    assert_eq!(attraction.register().await.expect("register"), RegisterOutcome::Built);
    economy.mark_operational("http://carousel-1").expect("operational");

    let mut rng = SimRng::new(1, RngStream::Breakage);
    assert!(attraction.breakage_tick(&mut rng).await.expect("tick"));
    assert!(!attraction.breakage_tick(&mut rng).await.expect("already broken"));
    assert_eq!(state_of(&economy, "http://carousel-1"), Some(LifecycleState::Broken));
    assert!(matches!(
        attraction.ride(UseRequest::default()).await.unwrap_err(),
        ParkError::Unavailable(_)
    ));
    drop(attraction);

    let restarted = Attraction::load(config.clone()).expect("reload");
    assert!(restarted.is_broken());
    assert_eq!(restarted.register().await.expect("repair"), RegisterOutcome::Repaired);
    assert!(!restarted.is_broken());
    assert_eq!(state_of(&economy, "http://carousel-1"), Some(LifecycleState::Operational));
    drop(restarted);

    let again = Attraction::load(config).expect("reload");
    assert!(!again.is_broken());
    assert_eq!(again.register().await.expect("register"), RegisterOutcome::AlreadyRegistered);

    let money = economy.ledger().read().expect("read").money;
    assert_eq!(money, STARTING_MONEY - 20_000.0 - 1_000.0);
}

#[tokio::test]
async fn breakdown_the_park_missed_is_reported_on_startup() {
    let (economy, park_url) = api_only().await;
    let volume = tempfile::tempdir().expect("tempdir");
    let config = AttractionConfig {
        park_url,
        self_url: "http://restroom-1".into(),
        volume: Some(volume.path().to_path_buf()),
        ..AttractionConfig::default_test()
    };

    let attraction = Attraction::load(config.clone()).expect("load");
    attraction.register().await.expect("register");
    economy.mark_operational("http://restroom-1").expect("operational");
    // Broken locally, never reported.
    attraction.set_broken(true).expect("persist");
    drop(attraction);

    let restarted = Attraction::load(config).expect("reload");
    assert_eq!(restarted.register().await.expect("repair"), RegisterOutcome::Repaired);
    assert_eq!(state_of(&economy, "http://restroom-1"), Some(LifecycleState::Operational));
    assert_eq!(
        economy.ledger().read().expect("read").money,
        STARTING_MONEY - 20_000.0 - 1_000.0
    );
}

#[tokio::test]
async fn rides_check_the_wallet_and_pay_the_park() {
    let (economy, park_url) = api_only().await;
    let (listener, ride_url) = bind().await;
    let attraction = Attraction::load(AttractionConfig {
        park_url,
        self_url: ride_url.clone(),
        ..AttractionConfig::default_test()
    })
    .expect("attraction");
    attraction.register().await.expect("register");
    let app = Arc::clone(&attraction).router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let http = reqwest::Client::new();
    let use_url = format!("{ride_url}/use");
    let before = economy.ledger().read().expect("read").money;

    let resp = http
        .post(&use_url)
        .json(&UseRequest { guest_money: Some(1.0) })
        .send()
        .await
        .expect("send");
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

    let resp = http.post(&use_url).body("not json").send().await.expect("send");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(economy.ledger().read().expect("read").money, before);

    let resp = http.post(&use_url).send().await.expect("send");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(economy.ledger().read().expect("read").money, before + 5.0);

    attraction.set_broken(true).expect("break");
    let resp = http.post(&use_url).send().await.expect("send");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn guest_turned_away_from_closed_park_goes_home() {
    let (listener, park_url) = bind().await;
    let park = Park::start(
        ParkConfig { closed: true, ..park_config(&park_url) },
        no_peers(),
        idle_guests(),
    )
    .await
    .expect("park");
    let app = park_api::router(Arc::clone(park.economy()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let report = Guest::new(GuestConfig { park_url, ..GuestConfig::default_test() })
        .expect("guest")
        .run()
        .await
        .expect("visit");
    assert!(!report.entered);
    assert_eq!(report.visits, 0);
    assert_eq!(park.economy().ledger().read().expect("read").money, STARTING_MONEY);
}

#[tokio::test]
async fn second_park_refuses_to_start_next_to_the_first() {
    let (_economy, first_url) = api_only().await;
    let peers: Arc<dyn PeerSource> = Arc::new(StaticPeers::new(vec![first_url.clone()]));
    match Park::start(park_config("http://second"), peers, idle_guests()).await {
        Err(ParkError::DuplicateInstance { peer }) => assert_eq!(peer, first_url),
        Err(e) => panic!("expected DuplicateInstance, got {e}"),
        Ok(_) => panic!("second park started"),
    }
}

#[tokio::test]
async fn reconciler_sends_in_process_guests() {
    let (listener, park_url) = bind().await;
    let guests = local_guests(GuestConfig {
        leave_chance: 1.0,
        max_visits: Some(1),
        ..GuestConfig::default_test()
    });
    let park = Park::start(
        ParkConfig { admission_chance: 1.0, ..park_config(&park_url) },
        no_peers(),
        Arc::new(InProcessOrchestrator::new(guests)),
    )
    .await
    .expect("park");
    let economy = Arc::clone(park.economy());
    let (stop, shutdown) = shutdown_pair();
    let task = tokio::spawn(park.serve(listener, shutdown));

    wait_for(|| {
        economy
            .journal()
            .event_count_by_type("guest_admitted")
            .map(|n| n >= 3)
            .unwrap_or(false)
    })
    .await;
    assert!(economy.ledger().read().expect("read").money >= STARTING_MONEY + 30.0);

    let _ = stop.send(());
    task.await.expect("join").expect("park stopped cleanly");
}

//! Polling discovery against real local HTTP peers.

use axum::{http::StatusCode, routing::get, Json, Router};
use kubepark_core::{
    discovery::{Discovery, DiscoveryConfig, StaticPeers, ATTRACTION_STATUS_PATH, PARK_STATUS_PATH},
    error::ParkError,
    wire::AttractionStatus,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

fn status(fee: f64, is_broken: bool) -> Router {
    Router::new().route(
        ATTRACTION_STATUS_PATH,
        get(move || async move { Json(AttractionStatus { fee, size: 1.0, is_broken }) }),
    )
}

fn failing() -> Router {
    Router::new().route(ATTRACTION_STATUS_PATH, get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
}

fn garbage() -> Router {
    Router::new().route(ATTRACTION_STATUS_PATH, get(|| async { "definitely not json" }))
}

fn hanging() -> Router {
    Router::new().route(
        ATTRACTION_STATUS_PATH,
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            "late"
        }),
    )
}

fn discovery(peers: Vec<String>, config: DiscoveryConfig) -> Discovery {
    Discovery::new(Arc::new(StaticPeers::new(peers)), config).expect("discovery")
}

fn quick() -> DiscoveryConfig {
    DiscoveryConfig {
        probe_timeout: Duration::from_millis(300),
        deadline:      Duration::from_secs(5),
        concurrency:   4,
    }
}

#[tokio::test]
async fn catalog_keeps_only_healthy_answers() {
    let healthy = serve(status(5.0, false)).await;
    let broken = serve(status(2.0, true)).await;
    let failing = serve(failing()).await;
    let garbage = serve(garbage()).await;
    let hanging = serve(hanging()).await;
    // Nothing listens here.
    let refused = "http://127.0.0.1:1".to_string();

    let d = discovery(
        vec![healthy.clone(), broken, failing, garbage, hanging, refused],
        quick(),
    );
    let catalog = d.attraction_catalog().await.expect("catalog");

    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].url, healthy);
    assert_eq!(catalog[0].fee, 5.0);
}

#[tokio::test]
async fn silent_peer_is_excluded_within_probe_timeout() {
    let hanging = serve(hanging()).await;
    let d = discovery(vec![hanging], quick());

    let started = tokio::time::Instant::now();
    let found = d.probe_all::<AttractionStatus>(ATTRACTION_STATUS_PATH).await.expect("probe");
    assert!(found.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn aggregate_deadline_keeps_partial_results() {
    let healthy = serve(status(5.0, false)).await;
    let hanging = serve(hanging()).await;
    let d = discovery(
        vec![healthy.clone(), hanging],
        DiscoveryConfig {
            probe_timeout: Duration::from_secs(30),
            deadline:      Duration::from_millis(400),
            concurrency:   2,
        },
    );

    let found = d.probe_all::<AttractionStatus>(ATTRACTION_STATUS_PATH).await.expect("probe");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].endpoint, healthy);
}

#[tokio::test]
async fn second_park_refuses_to_start() {
    let park = serve(Router::new().route(PARK_STATUS_PATH, get(|| async { "{}" }))).await;
    let d = discovery(vec![park.clone()], quick());
    match d.ensure_singleton(PARK_STATUS_PATH).await {
        Err(ParkError::DuplicateInstance { peer }) => assert_eq!(peer, park),
        other => panic!("expected DuplicateInstance, got {other:?}"),
    }
}

#[tokio::test]
async fn unrelated_peers_do_not_block_startup() {
    let attraction = serve(status(5.0, false)).await;
    let d = discovery(vec![attraction, "http://127.0.0.1:1".into()], quick());
    d.ensure_singleton(PARK_STATUS_PATH).await.expect("no other park");
}

#[tokio::test]
async fn park_answering_plain_text_still_counts() {
    let park = serve(Router::new().route(PARK_STATUS_PATH, get(|| async { "OK" }))).await;
    let d = discovery(vec![park.clone()], quick());

    assert_eq!(d.answering_peers(PARK_STATUS_PATH).await.expect("answering peers"), vec![park.clone()]);
    match d.ensure_singleton(PARK_STATUS_PATH).await {
        Err(ParkError::DuplicateInstance { peer }) => assert_eq!(peer, park),
        other => panic!("expected DuplicateInstance, got {other:?}"),
    }
}

#[tokio::test]
async fn park_answering_an_error_is_not_a_duplicate() {
    let park = serve(
        Router::new().route(PARK_STATUS_PATH, get(|| async { StatusCode::SERVICE_UNAVAILABLE })),
    )
    .await;
    let d = discovery(vec![park], quick());
    d.ensure_singleton(PARK_STATUS_PATH).await.expect("no other park");
}

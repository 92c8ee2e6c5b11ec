//! End-to-end redirect flow over the in-memory campaign store.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use campaign_analytics::AnalyticsRecorder;
use campaign_api::rest::render_tracking_script;
use campaign_api::{build_router, AppState};
use campaign_core::config::AnalyticsConfig;
use campaign_core::types::{Campaign, EventType};
use campaign_store::InMemoryStore;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

fn state(store: Arc<InMemoryStore>) -> AppState {
    AppState {
        store: store.clone(),
        analytics: Arc::new(AnalyticsRecorder::new(store, &AnalyticsConfig::default())),
        tracking_script: render_tracking_script("http://localhost:8081").into(),
        node_id: "it-node".to_string(),
        start_time: Instant::now(),
    }
}

fn split_campaign() -> Campaign {
    serde_json::from_value(serde_json::json!({
        "ID": 3,
        "Name": "Split test",
        "Key": "split",
        "Params": "",
        "CyclesDone": 0,
        "Pages": [
            {"ID": 1, "Name": "A", "URL": "https://a.test/", "CycleHitsDone": 0, "CycleHitsTodo": 60},
            {"ID": 2, "Name": "B", "URL": "https://b.test/?v=2", "CycleHitsDone": 0, "CycleHitsTodo": 40}
        ]
    }))
    .unwrap()
}

async fn hit(store: &Arc<InMemoryStore>, uri: &str) -> (StatusCode, Option<String>) {
    let response = build_router(state(store.clone()))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_string());
    (response.status(), location)
}

#[tokio::test]
async fn test_full_cycle_follows_quotas_then_resets() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(&split_campaign()).unwrap();

    let mut served_a = 0;
    let mut served_b = 0;
    for i in 0..100 {
        let (status, location) = hit(&store, "/split").await;
        assert_eq!(status, StatusCode::FOUND);
        match location.as_deref() {
            Some("https://a.test/?intoid=1") => {
                // B has priority until its quota is used up.
                assert!(i >= 40, "A served before B was exhausted");
                served_a += 1;
            }
            Some("https://b.test/?v=2&intoid=2") => served_b += 1,
            other => panic!("unexpected redirect target {other:?}"),
        }
    }
    assert_eq!((served_a, served_b), (60, 40));

    let exhausted = store.get("split").unwrap().unwrap();
    assert_eq!(exhausted.cycles_done, 0);
    assert!(exhausted.pages.iter().all(|p| p.cycle_hits_done == p.cycle_hits_todo));

    // Request 101 reclaims the cycle and starts over with B.
    let (status, location) = hit(&store, "/split?src=news").await;
    assert_eq!(status, StatusCode::FOUND);
    assert_eq!(location.as_deref(), Some("https://b.test/?v=2&intoid=2&src=news"));

    let reset = store.get("split").unwrap().unwrap();
    assert_eq!(reset.cycles_done, 1);
    assert_eq!(reset.pages[0].cycle_hits_done, 0);
    assert_eq!(reset.pages[1].cycle_hits_done, 1);

    let events = store.queued_events().unwrap();
    assert_eq!(events.len(), 101);
    assert!(events.iter().all(|e| e.event_type == EventType::Hit));
    assert_eq!(events[100].params[0].name, "src");
}

#[tokio::test]
async fn test_view_callback_leaves_campaign_untouched() {
    let store = Arc::new(InMemoryStore::new());
    store.insert(&split_campaign()).unwrap();

    let response = build_router(state(store.clone()))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/campaign/view")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("intoid=2&v=2"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.get("split").unwrap().unwrap(), split_campaign());

    let events = store.queued_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::View);
    assert_eq!(events[0].page_id, 2);
}

mod common;

use std::collections::HashSet;

use common::TestApp;
use wanderplan::{
    error::AppError,
    models::{
        stop::{NewStop, Place},
        trip::Season,
    },
    services::itinerary::ItineraryService,
};

async fn trip_with_stops(app: &TestApp, names: &[&str]) -> (String, Vec<String>) {
    let trip = app
        .create_trip("Loop", "Bern, 46.95, 7.45", &[Season::Summer])
        .await;
    let mut ids = Vec::new();
    for (idx, name) in names.iter().enumerate() {
        let stop = app
            .state
            .itinerary
            .insert_stop(&trip.id, place(name, idx), None)
            .await
            .expect("insert stop");
        ids.push(stop.id);
    }
    (trip.id, ids)
}

fn place(name: &str, idx: usize) -> NewStop {
    NewStop::at(Place {
        name: name.to_string(),
        latitude: 46.0 + idx as f64 * 0.5,
        longitude: 7.0 + idx as f64 * 0.5,
    })
}

fn permutations(items: &[String]) -> Vec<Vec<String>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, head) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            out.push(tail);
        }
    }
    out
}

async fn assert_contiguous(itinerary: &ItineraryService, trip_id: &str, expected_ids: &HashSet<String>) {
    let stops = itinerary.stops(trip_id).await.expect("stops");
    let positions: Vec<i64> = stops.iter().map(|s| s.position).collect();
    let expected_positions: Vec<i64> = (0..stops.len() as i64).collect();
    assert_eq!(positions, expected_positions);
    let ids: HashSet<String> = stops.into_iter().map(|s| s.id).collect();
    assert_eq!(&ids, expected_ids);
}

#[tokio::test]
async fn every_permutation_reads_back_exactly() {
    let app = TestApp::new().await.expect("app");
    let (trip_id, ids) = trip_with_stops(&app, &["a", "b", "c", "d"]).await;

    for order in permutations(&ids) {
        let stops = app
            .state
            .itinerary
            .reorder(&trip_id, &order)
            .await
            .expect("reorder");
        let read: Vec<String> = stops.iter().map(|s| s.id.clone()).collect();
        assert_eq!(read, order);
        assert!(stops.iter().enumerate().all(|(i, s)| s.position == i as i64));
    }
}

#[tokio::test]
async fn failed_reorder_keeps_version_and_order() {
    let app = TestApp::new().await.expect("app");
    let (trip_id, ids) = trip_with_stops(&app, &["a", "b", "c"]).await;
    let before = app.state.itinerary.itinerary(&trip_id).await.expect("itinerary");

    let duplicated = vec![ids[0].clone(), ids[0].clone(), ids[1].clone()];
    let err = app
        .state
        .itinerary
        .reorder(&trip_id, &duplicated)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let after = app.state.itinerary.itinerary(&trip_id).await.expect("itinerary");
    assert_eq!(after.version, before.version);
    assert_eq!(after.stops, before.stops);
}

#[tokio::test]
async fn unknown_trip_is_not_found() {
    let app = TestApp::new().await.expect("app");
    let err = app
        .state
        .itinerary
        .reorder("missing", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reorders_never_corrupt_positions() {
    let app = TestApp::new().await.expect("app");
    let (trip_id, ids) = trip_with_stops(&app, &["a", "b", "c", "d", "e"]).await;
    let expected: HashSet<String> = ids.iter().cloned().collect();

    let mut handles = Vec::new();
    for order in permutations(&ids).into_iter().step_by(13).take(8) {
        let itinerary = app.state.itinerary.clone();
        let trip_id = trip_id.clone();
        handles.push(tokio::spawn(async move {
            itinerary.reorder(&trip_id, &order).await.map(|_| ())
        }));
    }

    for handle in handles {
        match handle.await.expect("task") {
            Ok(()) | Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected reorder failure: {other:?}"),
        }
    }

    assert_contiguous(&app.state.itinerary, &trip_id, &expected).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_and_removals_stay_contiguous() {
    let app = TestApp::new().await.expect("app");
    let (trip_id, ids) = trip_with_stops(&app, &["a", "b", "c"]).await;

    let mut inserts = Vec::new();
    for idx in 0..6 {
        let itinerary = app.state.itinerary.clone();
        let trip_id = trip_id.clone();
        inserts.push(tokio::spawn(async move {
            itinerary
                .insert_stop(&trip_id, place(&format!("extra-{idx}"), idx), Some(1))
                .await
        }));
    }
    let removal = {
        let itinerary = app.state.itinerary.clone();
        let trip_id = trip_id.clone();
        let victim = ids[1].clone();
        tokio::spawn(async move { itinerary.remove_stop(&trip_id, &victim).await })
    };

    let mut expected: HashSet<String> = ids.iter().cloned().collect();
    for handle in inserts {
        match handle.await.expect("task") {
            Ok(stop) => {
                expected.insert(stop.id);
            }
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected insert failure: {other:?}"),
        }
    }
    match removal.await.expect("task") {
        Ok(()) => {
            expected.remove(&ids[1]);
        }
        Err(AppError::Conflict(_)) => {}
        Err(other) => panic!("unexpected removal failure: {other:?}"),
    }

    assert_contiguous(&app.state.itinerary, &trip_id, &expected).await;
}

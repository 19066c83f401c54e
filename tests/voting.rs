mod common;

use chrono::Utc;
use common::TestApp;
use wanderplan::{
    error::AppError,
    models::{trip::Season, vote::VoteCategory},
    services::{planning::finalize_trip, voting::Ballot},
};

#[tokio::test]
async fn ballot_implies_the_only_destination() {
    let app = TestApp::new().await.expect("app");
    let trip = app
        .create_trip("Solo", "Lisbon, 38.72, -9.14", &[Season::Spring])
        .await;

    let votes = app
        .state
        .voting
        .submit_ballot(
            &trip.id,
            "rui",
            Ballot {
                duration: Some("Weekend".into()),
                date: Some("2026-04-18".into()),
                ..Ballot::default()
            },
        )
        .await
        .expect("ballot");

    assert_eq!(votes.len(), 3);
    let destination = votes
        .iter()
        .find(|v| v.category == VoteCategory::Destination)
        .expect("implied destination vote");
    assert_eq!(destination.value, "lisbon");
}

#[tokio::test]
async fn invalid_ballot_records_nothing() {
    let app = TestApp::new().await.expect("app");
    let trip = app
        .create_trip("Pair", "Lisbon, 38.72, -9.14\nPorto, 41.15, -8.61", &[Season::Spring])
        .await;

    let err = app
        .state
        .voting
        .submit_ballot(
            &trip.id,
            "rui",
            Ballot {
                destination: Some("porto".into()),
                date: Some("2026-08-01".into()),
                ..Ballot::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(app.state.voting.votes(&trip.id).await.expect("votes").is_empty());

    let empty = app
        .state
        .voting
        .submit_ballot(&trip.id, "rui", Ballot::default())
        .await
        .unwrap_err();
    assert!(matches!(empty, AppError::Validation(_)));
}

#[tokio::test]
async fn finalize_without_votes_uses_the_first_destination() {
    let app = TestApp::new().await.expect("app");
    let trip = app
        .create_trip("Pair", "Lisbon, 38.72, -9.14\nPorto, 41.15, -8.61", &[Season::Spring])
        .await;

    let finalized = finalize_trip(&app.state, &trip.id).await.expect("finalize");
    let seeded = finalized.seeded.expect("seeded stop");
    assert_eq!(seeded.place.name, "Lisbon");
    assert_eq!(seeded.position, 0);
    assert_eq!(seeded.arrival, None);

    // a second finalize leaves the planned itinerary alone
    let again = finalize_trip(&app.state, &trip.id).await.expect("finalize again");
    assert!(again.seeded.is_none());
    assert_eq!(app.state.itinerary.stops(&trip.id).await.expect("stops").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_vote_is_stored_once_closing_returns() {
    let app = TestApp::new().await.expect("app");

    for round in 0..10 {
        let trip = app
            .create_trip(&format!("Race {round}"), "Lisbon, 38.72, -9.14", &[Season::Spring])
            .await;

        let mut voters = Vec::new();
        for idx in 0..20 {
            let voting = app.state.voting.clone();
            let trip_id = trip.id.clone();
            voters.push(tokio::spawn(async move {
                voting
                    .record_vote(&trip_id, &format!("voter-{idx}"), "destination", "lisbon")
                    .await
            }));
        }
        let closer = {
            let trips = app.state.trips.clone();
            let trip_id = trip.id.clone();
            tokio::spawn(async move {
                trips.close_voting(&trip_id).await.expect("close voting");
                Utc::now()
            })
        };

        let closed_at = closer.await.expect("task");
        let mut accepted = 0;
        for handle in voters {
            match handle.await.expect("task") {
                Ok(vote) => {
                    assert!(
                        vote.submitted_at <= closed_at,
                        "vote at {} accepted after close at {closed_at}",
                        vote.submitted_at
                    );
                    accepted += 1;
                }
                Err(AppError::Validation(_)) | Err(AppError::Conflict(_)) => {}
                Err(other) => panic!("unexpected vote failure: {other:?}"),
            }
        }

        let stored = app.state.voting.votes(&trip.id).await.expect("votes");
        assert_eq!(stored.len(), accepted);

        let late = app
            .state
            .voting
            .record_vote(&trip.id, "latecomer", "destination", "lisbon")
            .await
            .unwrap_err();
        assert!(matches!(late, AppError::Validation(_)));
    }
}

//! Connection lifecycle integration tests: backoff sequencing, lifetime
//! retry budget, and teardown guarantees, all on virtual time.

use sommelier_client::services::{ConnectionState, StreamConnection, MAX_RETRIES};

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn retry_sequence_then_recovery() {
    // Transport fails 3 times then recovers before the 5th attempt.
    let transport = ScriptedTransport::new(vec![
        Script::ConnectError,
        Script::ConnectError,
        Script::ConnectError,
        Script::Stream(vec![Ok(heartbeat(None)), Ok(session_complete(80.0))]),
    ]);
    let (_connection, mut events, mut states) = StreamConnection::open(transport, "eval-1");

    assert_eq!(*states.borrow(), ConnectionState::Connecting);

    for attempt in 1..=3 {
        states
            .wait_for(|s| *s == ConnectionState::Retrying { attempt })
            .await
            .unwrap();
    }

    // No events lost or duplicated relative to a non-failing run
    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    assert_eq!(received.len(), 2);
    assert!(received[1].is_terminal());
    assert_eq!(*states.borrow(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn budget_is_per_lifetime_not_per_burst() {
    // Two bursts of failures: 3 while connecting, then a live stream that
    // drops, then 2 more failures. That spends the whole budget of 5, so
    // the final failure is permanent even though events flowed in between.
    let transport = ScriptedTransport::new(vec![
        Script::ConnectError,
        Script::ConnectError,
        Script::ConnectError,
        Script::StreamThenDrop(vec![Ok(heartbeat(None))]),
        Script::ConnectError,
        Script::ConnectError,
    ]);
    let (_connection, mut events, mut states) = StreamConnection::open(transport, "eval-1");

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    assert_eq!(received.len(), 1);

    states
        .wait_for(|s| *s == ConnectionState::Failed)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_state_is_distinct_from_session_error() {
    let failures: Vec<Script> = (0..=MAX_RETRIES).map(|_| Script::ConnectError).collect();
    let transport = ScriptedTransport::new(failures);
    let (_connection, mut events, mut states) = StreamConnection::open(transport, "eval-1");

    states
        .wait_for(|s| *s == ConnectionState::Failed)
        .await
        .unwrap();
    // Nothing was ever delivered; the pipeline itself reported no error
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn close_stops_backoff_and_delivery() {
    let transport = ScriptedTransport::new(vec![Script::ConnectError, Script::ConnectError]);
    let (connection, mut events, mut states) = StreamConnection::open(transport, "eval-1");

    connection.close();
    connection.close(); // idempotent

    states
        .wait_for(|s| *s == ConnectionState::Closed)
        .await
        .unwrap();
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn terminal_event_closes_the_connection() {
    let transport = ScriptedTransport::single(vec![session_error("pipeline crashed")]);
    let (connection, mut events, mut states) = StreamConnection::open(transport, "eval-1");

    let event = events.recv().await.unwrap();
    assert!(event.is_terminal());
    states
        .wait_for(|s| *s == ConnectionState::Closed)
        .await
        .unwrap();

    // Closing after a terminal state is a no-op, not an error
    connection.close();
    assert_eq!(connection.state(), ConnectionState::Closed);
}

//! End-to-end tests of the verification scenarios against a mock execution
//! node.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use execution_header::ExecutionBlockHeader;
use sync_verifier::engine_api::auth::{JwtKey, JWT_SECRET_LENGTH};
use sync_verifier::engine_api::{self, PayloadStatusV1, PayloadStatusV1Status};
use sync_verifier::fixtures::Fixtures;
use sync_verifier::node::{self, NodeHandle};
use sync_verifier::test_utils::{block_header, test_logger, MockExecutionNode};
use sync_verifier::wait::{SyncOutcome, SyncWaiter};
use sync_verifier::{
    source_peer_endpoint, verify_candidate_sync, verify_source_chain, Error,
};
use tempfile::TempDir;
use url::Url;

const EXPECTED_NUMBER: u64 = 100;

fn jwt_key() -> JwtKey {
    JwtKey::from_slice(&[0x73; JWT_SECRET_LENGTH]).unwrap()
}

fn fast_waiter() -> SyncWaiter {
    SyncWaiter {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
    }
}

/// Writes a complete fixture set whose expected head is `expected`.
fn write_fixture_set(dir: &Path, expected: &ExecutionBlockHeader) -> Fixtures {
    std::fs::write(dir.join("genesis.json"), "{}").unwrap();
    std::fs::write(dir.join("chain.rlp"), [0xc0]).unwrap();
    std::fs::write(
        dir.join("forkenv.json"),
        r#"{"HIVE_CANCUN_TIMESTAMP":"0"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("headblock.json"),
        serde_json::to_vec(expected).unwrap(),
    )
    .unwrap();
    std::fs::write(
        dir.join("headnewpayload.json"),
        format!(
            r#"{{"method":"engine_newPayloadV3","params":[{{"blockNumber":"0x64","blockHash":"{:?}"}},[],"0x0102"]}}"#,
            expected.hash()
        ),
    )
    .unwrap();
    std::fs::write(
        dir.join("headfcu.json"),
        format!(
            r#"{{"method":"engine_forkchoiceUpdatedV3","params":[{{"headBlockHash":"{:?}"}},null]}}"#,
            expected.hash()
        ),
    )
    .unwrap();
    Fixtures::new(dir)
}

#[tokio::test]
async fn source_verification_succeeds_and_is_idempotent() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(None).await;
    mock.script_heads([expected.clone()]);
    let source = NodeHandle::new("source", mock.rpc_url()).unwrap();

    // A pure query against an unchanged node gives the same verdict every
    // time.
    verify_source_chain(&source, &fixtures, &log).await.unwrap();
    verify_source_chain(&source, &fixtures, &log).await.unwrap();
}

#[tokio::test]
async fn source_verification_rejects_wrong_head() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(None).await;
    mock.script_heads([block_header(EXPECTED_NUMBER, 0xbb)]);
    let source = NodeHandle::new("source", mock.rpc_url()).unwrap();

    match verify_source_chain(&source, &fixtures, &log).await {
        Err(Error::WrongChainHead {
            number,
            hash,
            want_number,
            want_hash,
        }) => {
            assert_eq!(number, EXPECTED_NUMBER);
            assert_eq!(want_number, EXPECTED_NUMBER);
            assert_ne!(hash, want_hash);
        }
        other => panic!("expected WrongChainHead, got {:?}", other),
    }
}

#[tokio::test]
async fn candidate_syncs_after_trigger() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(Some(jwt_key())).await;
    mock.script_heads([
        block_header(0, 0x01),
        block_header(50, 0x02),
        expected.clone(),
    ]);
    let candidate = NodeHandle::new("geth", mock.rpc_url()).unwrap();

    let outcome = verify_candidate_sync(&candidate, jwt_key(), &fixtures, &fast_waiter(), &log)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced {
            number: EXPECTED_NUMBER,
            hash: expected.hash(),
        }
    );

    // Both recorded engine calls arrived, in order, with their parameter
    // blobs exactly as stored in the fixture.
    let calls = mock.engine_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].method, "engine_newPayloadV3");
    assert_eq!(calls[1].method, "engine_forkchoiceUpdatedV3");
    assert_eq!(
        calls[0].params,
        serde_json::json!([
            {"blockNumber": "0x64", "blockHash": format!("{:?}", expected.hash())},
            [],
            "0x0102"
        ])
    );
    assert_eq!(
        calls[1].params,
        serde_json::json!([
            {"headBlockHash": format!("{:?}", expected.hash())},
            null
        ])
    );
}

#[tokio::test]
async fn equal_height_fork_fails_immediately() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(Some(jwt_key())).await;
    mock.script_heads([block_header(EXPECTED_NUMBER, 0xbb)]);
    let candidate = NodeHandle::new("geth", mock.rpc_url()).unwrap();

    let waiter = fast_waiter();
    let start = Instant::now();
    let outcome = verify_candidate_sync(&candidate, jwt_key(), &fixtures, &waiter, &log)
        .await
        .unwrap();

    match outcome {
        SyncOutcome::HashMismatch { number, got, want } => {
            assert_eq!(number, EXPECTED_NUMBER);
            assert_ne!(got, want);
            assert_eq!(want, expected.hash());
        }
        other => panic!("expected HashMismatch, got {:?}", other),
    }
    // Definitive failure: no further polling, deadline time left over.
    assert_eq!(mock.head_query_count(), 1);
    assert!(start.elapsed() < waiter.timeout);
}

#[tokio::test]
async fn timeout_reports_last_observed_height() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(Some(jwt_key())).await;
    mock.script_heads([block_header(99, 0x63)]);
    let candidate = NodeHandle::new("geth", mock.rpc_url()).unwrap();

    let waiter = SyncWaiter {
        timeout: Duration::from_millis(250),
        poll_interval: Duration::from_millis(50),
    };
    let outcome = verify_candidate_sync(&candidate, jwt_key(), &fixtures, &waiter, &log)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::TimedOut {
            timeout: waiter.timeout,
            last_observed: 99,
        }
    );
}

#[tokio::test]
async fn head_query_failure_terminates_the_wait_loop() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let log = test_logger();

    // Nothing listens on port 1; the first poll fails and is not retried.
    let node = NodeHandle::new("broken", Url::parse("http://127.0.0.1:1/").unwrap()).unwrap();
    let err = fast_waiter()
        .wait_for_sync(&node, &expected, &log)
        .await
        .unwrap_err();
    assert!(matches!(err, node::Error::Rpc(_)));
}

#[tokio::test]
async fn rejected_auth_never_enters_the_wait_loop() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(Some(jwt_key())).await;
    mock.script_heads([expected.clone()]);
    let candidate = NodeHandle::new("geth", mock.rpc_url()).unwrap();

    let wrong_key = JwtKey::from_slice(&[0x42; JWT_SECRET_LENGTH]).unwrap();
    let err = verify_candidate_sync(&candidate, wrong_key, &fixtures, &fast_waiter(), &log)
        .await
        .unwrap_err();
    match err {
        Error::EngineCall(failed) => {
            assert_eq!(failed.method, "engine_newPayloadV3");
            assert!(matches!(failed.error, engine_api::Error::Auth(_)));
        }
        other => panic!("expected EngineCall, got {:?}", other),
    }
    assert_eq!(mock.head_query_count(), 0);
}

#[tokio::test]
async fn non_valid_trigger_status_defers_judgment_to_convergence() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let mock = MockExecutionNode::start(Some(jwt_key())).await;
    mock.set_new_payload_response(PayloadStatusV1 {
        status: PayloadStatusV1Status::Invalid,
        latest_valid_hash: None,
        validation_error: Some("mock rejection".to_string()),
    });
    mock.script_heads([expected.clone()]);
    let candidate = NodeHandle::new("geth", mock.rpc_url()).unwrap();

    // The response body is not judged at trigger time; the head still
    // converges, so the scenario passes.
    let outcome = verify_candidate_sync(&candidate, jwt_key(), &fixtures, &fast_waiter(), &log)
        .await
        .unwrap();
    assert!(outcome.is_synced());
}

#[tokio::test]
async fn peer_endpoint_resolution_retries_until_published() {
    let log = test_logger();
    let mock = Arc::new(MockExecutionNode::start(None).await);
    let source = NodeHandle::new("source", mock.rpc_url()).unwrap();

    // The direct accessor fails while nothing is published.
    assert!(matches!(
        source.peer_endpoint().await,
        Err(node::Error::EndpointUnavailable(_))
    ));

    // An empty enode is as useless as none.
    mock.set_enode("");
    assert!(matches!(
        source.peer_endpoint().await,
        Err(node::Error::EndpointUnavailable(_))
    ));

    let publisher = {
        let mock = mock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            mock.set_enode("enode://beef@10.0.0.1:30303");
        })
    };

    let enode = source_peer_endpoint(&source, &log).await.unwrap();
    assert_eq!(enode, "enode://beef@10.0.0.1:30303");
    publisher.await.unwrap();
}

#[tokio::test]
async fn candidate_scenarios_run_independently() {
    let expected = block_header(EXPECTED_NUMBER, 0xaa);
    let dir = TempDir::new().unwrap();
    let fixtures = write_fixture_set(dir.path(), &expected);
    let log = test_logger();

    let good = MockExecutionNode::start(Some(jwt_key())).await;
    good.script_heads([block_header(10, 0x01), expected.clone()]);
    let bad = MockExecutionNode::start(Some(jwt_key())).await;
    bad.script_heads([block_header(EXPECTED_NUMBER, 0xbb)]);

    let good_candidate = NodeHandle::new("geth", good.rpc_url()).unwrap();
    let bad_candidate = NodeHandle::new("besu", bad.rpc_url()).unwrap();

    // One candidate's failure does not disturb its sibling.
    let good_waiter = fast_waiter();
    let bad_waiter = fast_waiter();
    let (good_outcome, bad_outcome) = tokio::join!(
        verify_candidate_sync(&good_candidate, jwt_key(), &fixtures, &good_waiter, &log),
        verify_candidate_sync(&bad_candidate, jwt_key(), &fixtures, &bad_waiter, &log),
    );
    assert!(good_outcome.unwrap().is_synced());
    assert!(matches!(
        bad_outcome.unwrap(),
        SyncOutcome::HashMismatch { .. }
    ));
}

//! Delegated collection and cleanup through the worker fabric

mod common;

use artifact_collector::collaborators::FeatureFlag;
use artifact_collector::dispatch::{CompletionOutcome, TaskPurpose, TaskResponse};
use artifact_collector::source::{BuildDetails, SourceType};
use artifact_collector::store::{ArtifactStore, StreamStore};
use artifact_collector::CollectorConfig;
use common::{TestCollector, ACCOUNT_ID, CONNECTION_ID};
use std::collections::BTreeSet;
use std::sync::atomic::Ordering;

fn numbered(numbers: &[&str]) -> Vec<BuildDetails> {
    numbers.iter().map(|n| BuildDetails::with_number(*n)).collect()
}

fn stored_build_numbers(t: &TestCollector, stream_id: &str) -> BTreeSet<String> {
    t.store
        .list_artifacts(stream_id)
        .unwrap()
        .iter()
        .filter_map(|a| a.build_no().map(String::from))
        .collect()
}

#[tokio::test]
async fn test_delegated_collection_applies_response() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);
    t.connector.set_builds("docker-1", numbered(&["1"]));
    t.coordinator.collect_new_artifacts("docker-1").await.unwrap();

    let ticket = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .expect("task submitted");
    assert!(ticket.correlation_id.starts_with("cron-"));

    let submitted = t.worker.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].purpose, TaskPurpose::Collection);
    assert_eq!(submitted[0].account_id, ACCOUNT_ID);
    assert_eq!(
        submitted[0].parameters.saved_keys,
        Some(BTreeSet::from(["1".to_string()]))
    );

    // workers may echo known builds back; they must not be stored twice
    t.worker
        .respond(
            &ticket.correlation_id,
            TaskResponse::success(numbered(&["1", "2", "3"])),
        )
        .unwrap();
    assert_eq!(ticket.completion.await.unwrap(), CompletionOutcome::Collected(2));
    assert_eq!(
        stored_build_numbers(&t, "docker-1"),
        BTreeSet::from(["1".to_string(), "2".to_string(), "3".to_string()])
    );
    assert!(t.coordinator.dispatcher().registry().is_empty());
}

#[tokio::test]
async fn test_worker_failure_counts_against_stream() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);

    let ticket = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .expect("task submitted");
    t.worker
        .respond(&ticket.correlation_id, TaskResponse::failure("401 Unauthorized"))
        .unwrap();

    assert_eq!(ticket.completion.await.unwrap(), CompletionOutcome::Failed);
    assert_eq!(t.stream("docker-1").failed_cron_attempts, 1);
    assert_eq!(t.store.count_artifacts("docker-1").unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_submission_counts_against_stream() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);
    t.worker.reject.store(true, Ordering::SeqCst);

    let ticket = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap();

    assert!(ticket.is_none());
    assert_eq!(t.stream("docker-1").failed_cron_attempts, 1);
    assert!(t.coordinator.dispatcher().registry().is_empty());
}

#[tokio::test]
async fn test_pending_collection_is_not_submitted_again() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);

    let first = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .expect("task submitted");
    let second = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap();

    assert!(second.is_none());
    assert_eq!(t.worker.submitted().len(), 1);
    assert_eq!(t.stream("docker-1").failed_cron_attempts, 0);

    // cleanup is tracked separately from collection
    let stream = t.stream("docker-1");
    assert!(t
        .coordinator
        .cleanup_artifacts_async(&stream)
        .await
        .unwrap()
        .is_some());

    t.worker
        .respond(&first.correlation_id, TaskResponse::success(numbered(&["1"])))
        .unwrap();
    assert_eq!(first.completion.await.unwrap(), CompletionOutcome::Collected(1));
    assert!(t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_invalid_custom_script_counts_against_stream() {
    let t = TestCollector::new();
    let mut stream = t.new_stream("custom-1", SourceType::Custom);
    stream.connection_id = None;
    t.save(stream);

    let ticket = t
        .coordinator
        .collect_new_artifacts_async("custom-1", "cron")
        .await
        .unwrap();

    assert!(ticket.is_none());
    assert!(t.worker.submitted().is_empty());
    assert!(t.coordinator.dispatcher().registry().is_empty());
    assert_eq!(t.stream("custom-1").failed_cron_attempts, 1);
}

#[tokio::test]
async fn test_unanswered_task_expires() {
    let mut config = CollectorConfig::default();
    config.dispatch.completion_timeout_secs = 0;
    let t = TestCollector::with_config(config);
    t.add_stream("docker-1", SourceType::Docker);

    let ticket = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .expect("task submitted");

    assert_eq!(ticket.completion.await.unwrap(), CompletionOutcome::Expired);
    assert_eq!(t.stream("docker-1").failed_cron_attempts, 1);
    // a response arriving after expiry goes nowhere
    assert!(t
        .worker
        .respond(&ticket.correlation_id, TaskResponse::success(numbered(&["1"])))
        .is_err());
    assert_eq!(t.store.count_artifacts("docker-1").unwrap(), 0);
}

#[tokio::test]
async fn test_extended_queue_timeout_flag() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);
    t.flags
        .enable(FeatureFlag::ExtendedDelegateQueueTimeout, ACCOUNT_ID);

    t.coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .expect("task submitted");

    assert_eq!(t.worker.submitted()[0].queue_timeout_ms, 15_000);
}

#[tokio::test]
async fn test_cleanup_removes_builds_gone_from_source() {
    let t = TestCollector::new();
    let stream = t.add_stream("docker-1", SourceType::Docker);
    t.connector.set_builds("docker-1", numbered(&["1", "2", "3"]));
    t.coordinator.collect_new_artifacts("docker-1").await.unwrap();

    let ticket = t
        .coordinator
        .cleanup_artifacts_async(&stream)
        .await
        .unwrap()
        .expect("task submitted");
    assert!(ticket.correlation_id.starts_with("cleanup-"));
    let submitted = &t.worker.submitted()[0];
    assert_eq!(submitted.purpose, TaskPurpose::Cleanup);
    assert!(submitted.parameters.saved_keys.is_none());

    t.worker
        .respond(&ticket.correlation_id, TaskResponse::success(numbered(&["1", "3"])))
        .unwrap();

    assert_eq!(ticket.completion.await.unwrap(), CompletionOutcome::CleanedUp(1));
    assert_eq!(
        stored_build_numbers(&t, "docker-1"),
        BTreeSet::from(["1".to_string(), "3".to_string()])
    );
}

#[tokio::test]
async fn test_empty_cleanup_listing_keeps_artifacts() {
    let t = TestCollector::new();
    let stream = t.add_stream("docker-1", SourceType::Docker);
    t.connector.set_builds("docker-1", numbered(&["1", "2"]));
    t.coordinator.collect_new_artifacts("docker-1").await.unwrap();

    let ticket = t
        .coordinator
        .cleanup_artifacts_async(&stream)
        .await
        .unwrap()
        .expect("task submitted");
    t.worker
        .respond(&ticket.correlation_id, TaskResponse::success(Vec::new()))
        .unwrap();

    assert_eq!(ticket.completion.await.unwrap(), CompletionOutcome::CleanedUp(0));
    assert_eq!(t.store.count_artifacts("docker-1").unwrap(), 2);
}

#[tokio::test]
async fn test_cleanup_of_unsupported_source_is_a_noop() {
    let t = TestCollector::new();
    let stream = t.add_stream("jenkins-1", SourceType::Jenkins);

    assert!(t
        .coordinator
        .cleanup_artifacts_async(&stream)
        .await
        .unwrap()
        .is_none());
    assert!(t.worker.submitted().is_empty());
}

#[tokio::test]
async fn test_deleted_connection_skips_dispatch() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);
    t.connections.remove(CONNECTION_ID);

    let ticket = t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap();

    assert!(ticket.is_none());
    assert!(t.worker.submitted().is_empty());
    assert_eq!(t.stream("docker-1").failed_cron_attempts, 1);
    assert!(t.store.get_stream("docker-1").unwrap().is_some());
}

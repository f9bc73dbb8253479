//! Cron skip rules and the move to perpetual-task polling

mod common;

use artifact_collector::collaborators::{FeatureFlag, SourceConnection};
use artifact_collector::polling::{AttachOutcome, MigrationReport};
use artifact_collector::source::{BuildDetails, CollectionStatus, SourceType};
use artifact_collector::store::StreamStore;
use artifact_collector::CollectorConfig;
use common::{TestCollector, ACCOUNT_ID, CONNECTION_ID};
use std::sync::atomic::Ordering;

fn with_max_failures(max_failed_attempts: i64) -> TestCollector {
    let mut config = CollectorConfig::default();
    config.collection.max_failed_attempts = max_failed_attempts;
    TestCollector::with_config(config)
}

#[tokio::test]
async fn test_failing_stream_is_stopped_past_threshold() {
    let t = with_max_failures(2);
    t.flags
        .enable(FeatureFlag::ArtifactCollectionConfigurable, ACCOUNT_ID);
    t.add_stream("docker-1", SourceType::Docker);
    t.connector
        .set_builds("docker-1", vec![BuildDetails::with_number("1")]);
    for _ in 0..3 {
        t.store.increment_failed_attempts("docker-1").unwrap();
    }

    let created = t.coordinator.collect_new_artifacts("docker-1").await.unwrap();

    assert!(created.is_empty());
    assert_eq!(t.connector.calls(), 0);
    assert_eq!(t.stream("docker-1").collection_status, CollectionStatus::Stopped);

    assert!(t.coordinator.reset_stopped_collection("docker-1").unwrap());
    let stream = t.stream("docker-1");
    assert_eq!(stream.collection_status, CollectionStatus::Unstable);
    assert_eq!(stream.failed_cron_attempts, 0);
    assert_eq!(
        t.coordinator.collect_new_artifacts("docker-1").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_threshold_without_configurable_flag_only_skips() {
    let t = with_max_failures(0);
    t.add_stream("docker-1", SourceType::Docker);
    t.store.increment_failed_attempts("docker-1").unwrap();

    t.coordinator.collect_new_artifacts("docker-1").await.unwrap();

    assert_eq!(t.connector.calls(), 0);
    assert_eq!(t.stream("docker-1").collection_status, CollectionStatus::Unstable);
}

#[tokio::test]
async fn test_bound_stream_skips_collection_but_not_cleanup() {
    let t = TestCollector::new();
    t.flags
        .enable(FeatureFlag::ArtifactPerpetualTask, ACCOUNT_ID);
    t.add_stream("docker-1", SourceType::Docker);
    t.store.attach_perpetual_task("docker-1", "pt-1").unwrap();
    let stream = t.stream("docker-1");

    assert!(t
        .coordinator
        .collect_new_artifacts("docker-1")
        .await
        .unwrap()
        .is_empty());
    assert!(t
        .coordinator
        .collect_new_artifacts_async("docker-1", "cron")
        .await
        .unwrap()
        .is_none());
    assert_eq!(t.connector.calls(), 0);

    let ticket = t.coordinator.cleanup_artifacts_async(&stream).await.unwrap();
    assert!(ticket.is_some());
    assert_eq!(t.worker.submitted().len(), 1);
}

#[tokio::test]
async fn test_stale_task_is_removed_when_feature_is_off() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);
    t.store.attach_perpetual_task("docker-1", "pt-stale").unwrap();
    t.connector
        .set_builds("docker-1", vec![BuildDetails::with_number("1")]);

    let created = t.coordinator.collect_new_artifacts("docker-1").await.unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(t.perpetual_tasks.deleted(), vec!["pt-stale"]);
    assert!(t.stream("docker-1").perpetual_task_id.is_none());
}

#[tokio::test]
async fn test_unusable_streams_are_skipped() {
    let t = TestCollector::new();

    let mut parameterized = t.new_stream("param-1", SourceType::Docker);
    parameterized.parameterized = true;
    t.save(parameterized);

    let mut no_account = t.new_stream("orphan-1", SourceType::Docker);
    no_account.account_id = String::new();
    t.save(no_account);

    let mut failing = SourceConnection::new("conn-failing", ACCOUNT_ID);
    failing.connectivity_error = Some("connection refused".to_string());
    t.connections.put(failing);
    let mut unreachable = t.new_stream("unreachable-1", SourceType::Docker);
    unreachable.connection_id = Some("conn-failing".to_string());
    t.save(unreachable);

    for id in ["param-1", "orphan-1", "unreachable-1"] {
        assert!(t.coordinator.collect_new_artifacts(id).await.unwrap().is_empty());
        assert_eq!(t.stream(id).failed_cron_attempts, 0, "stream {}", id);
    }
    assert_eq!(t.connector.calls(), 0);
}

#[tokio::test]
async fn test_missing_connection_counts_as_failure() {
    let t = TestCollector::new();
    t.add_stream("docker-1", SourceType::Docker);
    t.connections.remove(CONNECTION_ID);

    assert!(t
        .coordinator
        .collect_new_artifacts("docker-1")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(t.stream("docker-1").failed_cron_attempts, 1);
    assert_eq!(t.connector.calls(), 0);
}

#[tokio::test]
async fn test_migration_binds_eligible_streams_once() {
    let t = TestCollector::new();
    t.flags
        .enable(FeatureFlag::ArtifactPerpetualTaskMigration, ACCOUNT_ID);
    t.flags
        .enable(FeatureFlag::ArtifactPerpetualTask, ACCOUNT_ID);
    t.add_stream("docker-1", SourceType::Docker);
    t.add_stream("docker-2", SourceType::Docker);
    let mut elsewhere = t.new_stream("docker-3", SourceType::Docker);
    elsewhere.account_id = "other-account".to_string();
    t.save(elsewhere);

    let report = t.migrator.run_pass().await.unwrap();
    assert_eq!(
        report,
        MigrationReport {
            attempted: 2,
            attached: 2,
            failed: 0
        }
    );
    assert!(t.stream("docker-1").has_perpetual_task());
    assert!(t.stream("docker-2").has_perpetual_task());
    assert!(!t.stream("docker-3").has_perpetual_task());

    assert_eq!(t.migrator.run_pass().await.unwrap().attempted, 0);
    assert_eq!(t.perpetual_tasks.created().len(), 2);
}

#[tokio::test]
async fn test_migration_without_eligible_accounts_does_nothing() {
    let t = TestCollector::new();
    t.flags
        .enable(FeatureFlag::ArtifactPerpetualTaskMigration, ACCOUNT_ID);
    t.add_stream("docker-1", SourceType::Docker);

    assert_eq!(t.migrator.run_pass().await.unwrap(), MigrationReport::default());
    assert!(t.perpetual_tasks.created().is_empty());
}

#[tokio::test]
async fn test_lost_attach_race_leaves_no_dangling_task() {
    let t = TestCollector::new();
    let stale = t.add_stream("docker-1", SourceType::Docker);
    t.store.attach_perpetual_task("docker-1", "pt-other").unwrap();

    let outcome = t.migrator.attach_perpetual_task(&stale).await;

    assert_eq!(outcome, AttachOutcome::RolledBack);
    assert_eq!(t.perpetual_tasks.deleted(), t.perpetual_tasks.created());
    assert_eq!(
        t.stream("docker-1").perpetual_task_id.as_deref(),
        Some("pt-other")
    );

    // once the other task is unbound the stream can be migrated again
    t.store
        .detach_perpetual_task("docker-1", "pt-other")
        .unwrap();
    let outcome = t.migrator.attach_perpetual_task(&t.stream("docker-1")).await;
    assert!(matches!(outcome, AttachOutcome::Attached(_)));
}

#[tokio::test]
async fn test_failed_create_keeps_cron_polling() {
    let t = TestCollector::new();
    let stream = t.add_stream("docker-1", SourceType::Docker);
    t.perpetual_tasks.fail_create.store(true, Ordering::SeqCst);

    assert_eq!(
        t.migrator.attach_perpetual_task(&stream).await,
        AttachOutcome::CreateFailed
    );
    assert!(!t.stream("docker-1").has_perpetual_task());
}

#[tokio::test]
async fn test_connection_change_resets_bound_streams() {
    let t = TestCollector::new();
    for id in ["docker-1", "docker-2", "docker-3"] {
        t.add_stream(id, SourceType::Docker);
    }
    t.store.attach_perpetual_task("docker-1", "pt-1").unwrap();
    t.store.attach_perpetual_task("docker-2", "pt-2").unwrap();
    t.perpetual_tasks.fail_reset_of("pt-1");

    let report = t
        .migrator
        .on_connection_changed(&SourceConnection::new(CONNECTION_ID, ACCOUNT_ID))
        .await
        .unwrap();

    assert_eq!(report.reset, 1);
    assert_eq!(report.failed, vec!["docker-1".to_string()]);
    let mut resets = t.perpetual_tasks.resets();
    resets.sort();
    assert_eq!(resets, vec!["pt-1", "pt-2"]);
}

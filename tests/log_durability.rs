//! Durable log across restarts
//!
//! Opens an on-disk sled log, leaves work un-acknowledged, reopens it and
//! checks the work is still there.

use std::sync::Arc;
use std::time::Duration;

use racewire::config::{LogConfig, RelayConfig};
use racewire::dispatch::{AgentRegistry, Dispatcher};
use racewire::stream::{topics, EntryId, ReadFrom, SledLog, StreamLog};
use racewire::types::RegistrationRequest;

const NO_BLOCK: Duration = Duration::from_millis(0);

#[tokio::test]
async fn unacked_entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig::default();

    let (first, second) = {
        let log = SledLog::open(dir.path(), &config).unwrap();
        log.ensure_group(topics::RESULTS, "broadcast").await.unwrap();
        let first = log.append(topics::RESULTS, b"first").await.unwrap();
        let second = log.append(topics::RESULTS, b"second").await.unwrap();

        let read = log
            .read_group(topics::RESULTS, "broadcast", "relay", ReadFrom::New, 10, NO_BLOCK)
            .await
            .unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(log.ack(topics::RESULTS, "broadcast", &[first]).await.unwrap(), 1);
        log.flush().unwrap();
        (first, second)
    };

    let log = SledLog::open(dir.path(), &config).unwrap();
    assert_eq!(log.topic_len(topics::RESULTS).await.unwrap(), 2);
    assert_eq!(log.pending_count(topics::RESULTS, "broadcast").unwrap(), 1);

    // Group already exists, so the cursor is kept.
    assert!(!log.ensure_group(topics::RESULTS, "broadcast").await.unwrap());
    let fresh = log
        .read_group(topics::RESULTS, "broadcast", "relay", ReadFrom::New, 10, NO_BLOCK)
        .await
        .unwrap();
    assert!(fresh.is_empty());

    let redelivered = log
        .read_group(
            topics::RESULTS,
            "broadcast",
            "relay",
            ReadFrom::Pending { after: EntryId(0) },
            10,
            NO_BLOCK,
        )
        .await
        .unwrap();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].id, second);
    assert_ne!(redelivered[0].id, first);
    assert_eq!(redelivered[0].payload, b"second");
    assert_eq!(redelivered[0].delivery_count, 2);
}

#[tokio::test]
async fn registrations_are_restored_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = RelayConfig::default();

    {
        let log: Arc<dyn StreamLog> = Arc::new(SledLog::open(dir.path(), &config.log).unwrap());
        let dispatcher = Dispatcher::new(
            Arc::new(AgentRegistry::new(Duration::from_secs(30))),
            log,
            config.dispatch.clone(),
        );
        dispatcher
            .register(RegistrationRequest {
                agent_id: "eda-pit-wall".to_string(),
                task_types: vec!["eda".to_string()],
                tracks: vec!["VIR".to_string()],
                capacity: 2,
            })
            .await
            .unwrap();
    }

    let log: Arc<dyn StreamLog> = Arc::new(SledLog::open(dir.path(), &config.log).unwrap());
    let registry = Arc::new(AgentRegistry::new(Duration::from_secs(30)));
    let dispatcher = Dispatcher::new(Arc::clone(&registry), log, config.dispatch.clone());
    assert_eq!(dispatcher.restore_registrations().await.unwrap(), 1);

    let restored = registry.get("eda-pit-wall").unwrap();
    assert_eq!(restored.load, 0);
    assert!(restored.tracks.contains("vir"));
}

#[tokio::test]
async fn reset_starts_from_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig::default();

    {
        let log = SledLog::open(dir.path(), &config).unwrap();
        log.append(topics::AGGREGATES, b"window").await.unwrap();
        log.flush().unwrap();
    }

    let log = SledLog::open(dir.path(), &config).unwrap();
    log.reset().unwrap();
    assert_eq!(log.topic_len(topics::AGGREGATES).await.unwrap(), 0);
}

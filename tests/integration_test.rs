//! Integration tests for the coordination protocol.
//!
//! These tests run several participants against one in-memory shared store
//! and verify id allocation, reload recovery, eviction of vanished
//! participants and mutual exclusion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tab_coordinator::{
    CoordinatorConfig, CoordinatorState, LeaseMutex, MemoryEphemeralStore, MemoryStore,
    Participant, Registry, RegistryStore, SharedStore, SystemClock,
};

type TestParticipant = Participant<MemoryStore, MemoryEphemeralStore>;

async fn start(
    store: &MemoryStore,
    ephemeral: &MemoryEphemeralStore,
    config: &CoordinatorConfig,
) -> TestParticipant {
    Participant::start(
        Arc::new(store.handle()),
        Arc::new(ephemeral.clone()),
        Arc::new(SystemClock),
        config.clone(),
    )
    .await
    .unwrap()
}

fn registry(store: &MemoryStore) -> Registry {
    RegistryStore::new(Arc::new(store.handle()), "tab_ids")
        .read()
        .unwrap()
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        heartbeat_interval_ms: 50,
        inactivity_threshold_ms: 200,
        max_retry_delay_ms: 20,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_participants_get_distinct_lowest_ids() {
    let store = MemoryStore::new();
    let config = CoordinatorConfig::default();

    let a = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let b = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let c = start(&store, &MemoryEphemeralStore::new(), &config).await;

    assert_eq!(a.assigned_id(), Some(1));
    assert_eq!(b.assigned_id(), Some(2));
    assert_eq!(c.assigned_id(), Some(3));
    assert_eq!(a.state(), CoordinatorState::Active);

    let ids = registry(&store);
    assert_eq!(ids.len(), 3);
    for participant in [&a, &b, &c] {
        let entry = ids.get(participant.key().as_str()).unwrap();
        assert_eq!(Some(entry.assigned_id), participant.assigned_id());
    }
    assert_eq!(store.get("mutexLock").unwrap(), None);
}

#[tokio::test]
async fn test_gap_left_by_departed_participant_is_reused() {
    let store = MemoryStore::new();
    let config = CoordinatorConfig::default();

    let a = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let b = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let c = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(b.assigned_id(), Some(2));

    b.stop().await.unwrap();
    assert_eq!(registry(&store).len(), 2);

    let d = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(d.assigned_id(), Some(2));
    assert_eq!(a.assigned_id(), Some(1));
    assert_eq!(c.assigned_id(), Some(3));
}

#[tokio::test]
async fn test_reinitialized_coordinator_recovers_its_id() {
    let store = MemoryStore::new();
    let config = CoordinatorConfig::default();
    let process_a = MemoryEphemeralStore::new();

    let first = start(&store, &process_a, &config).await;
    let other = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(first.assigned_id(), Some(1));
    assert_eq!(other.assigned_id(), Some(2));
    let first_key = first.key().clone();

    // Same process, new coordinator (a reload).
    first.stop().await.unwrap();
    let reloaded = start(&store, &process_a, &config).await;

    assert_ne!(reloaded.key(), &first_key);
    assert_eq!(reloaded.assigned_id(), Some(1));

    let ids = registry(&store);
    assert_eq!(ids.len(), 2);
    assert_eq!(ids.get(reloaded.key().as_str()).unwrap().assigned_id, 1);

    // A genuinely new process still gets the next free id.
    let newcomer = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(newcomer.assigned_id(), Some(3));
}

#[tokio::test]
async fn test_vanished_participant_is_evicted_and_its_id_reused() {
    let store = MemoryStore::new();
    let config = fast_config();

    let crashed = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let survivor = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(crashed.assigned_id(), Some(1));
    assert_eq!(survivor.assigned_id(), Some(2));
    let crashed_key = crashed.key().clone();

    // No leave: the entry is simply no longer refreshed.
    drop(crashed);
    tokio::time::sleep(Duration::from_millis(600)).await;

    let ids = registry(&store);
    assert!(!ids.contains_key(crashed_key.as_str()));
    assert!(ids.contains_key(survivor.key().as_str()));

    let replacement = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(replacement.assigned_id(), Some(1));
    assert_eq!(survivor.assigned_id(), Some(2));
}

#[tokio::test]
async fn test_heartbeat_keeps_live_participants_registered() {
    let store = MemoryStore::new();
    let config = fast_config();

    let a = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let b = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let before = registry(&store);

    // Several inactivity thresholds pass; heartbeats keep both alive.
    tokio::time::sleep(Duration::from_millis(700)).await;

    let after = registry(&store);
    assert_eq!(after.len(), 2);
    for participant in [&a, &b] {
        let key = participant.key().as_str();
        assert!(after.get(key).unwrap().last_heartbeat > before.get(key).unwrap().last_heartbeat);
        assert_eq!(after.get(key).unwrap().assigned_id, before.get(key).unwrap().assigned_id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exclusive_sections_do_not_overlap() {
    let store = MemoryStore::new();
    let config = CoordinatorConfig {
        lock_timeout_ms: 5_000,
        max_retry_delay_ms: 10,
        ..Default::default()
    };
    let holder = LeaseMutex::new(Arc::new(store.handle()), Arc::new(SystemClock), "holder", &config);
    let waiter = LeaseMutex::new(Arc::new(store.handle()), Arc::new(SystemClock), "waiter", &config);

    let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
    let holder_task = tokio::spawn(async move {
        holder
            .run_exclusive(|| {
                let started = Instant::now();
                let _ = entered_tx.send(());
                std::thread::sleep(Duration::from_millis(80));
                Ok((started, Instant::now()))
            })
            .await
            .unwrap()
    });

    entered_rx.await.unwrap();
    let waiter_started = waiter.run_exclusive(|| Ok(Instant::now())).await.unwrap();
    let (_, holder_finished) = holder_task.await.unwrap();

    assert!(waiter_started >= holder_finished);
}

#[tokio::test]
async fn test_running_participant_restores_entry_after_external_wipe() {
    let store = MemoryStore::new();
    // Default 5s heartbeat: only the change listener can restore the entry in time.
    let config = CoordinatorConfig::default();
    let participant = start(&store, &MemoryEphemeralStore::new(), &config).await;
    assert_eq!(participant.assigned_id(), Some(1));

    let intruder = store.handle();
    intruder.delete("tab_ids").unwrap();

    let restored = tokio::time::timeout(Duration::from_millis(500), async {
        loop {
            if registry(&store).contains_key(participant.key().as_str()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(restored.is_ok(), "entry was not restored by the change listener");

    let entry = *registry(&store).get(participant.key().as_str()).unwrap();
    assert_eq!(entry.assigned_id, 1);
    participant.stop().await.unwrap();
}

#[tokio::test]
async fn test_running_participant_reacts_to_shrunk_registry() {
    let store = MemoryStore::new();
    let config = CoordinatorConfig::default();
    let a = start(&store, &MemoryEphemeralStore::new(), &config).await;
    let b = start(&store, &MemoryEphemeralStore::new(), &config).await;

    // Someone rewrites the registry keeping only `b`.
    let mut shrunk = registry(&store);
    shrunk.remove(a.key().as_str());
    store.handle().set("tab_ids", &shrunk.encode().unwrap()).unwrap();

    let restored = tokio::time::timeout(Duration::from_millis(500), async {
        loop {
            let ids = registry(&store);
            if ids.contains_key(a.key().as_str()) && ids.contains_key(b.key().as_str()) {
                break ids;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("entry was not restored by the change listener");

    assert_eq!(restored.get(a.key().as_str()).unwrap().assigned_id, 1);
    assert_eq!(restored.get(b.key().as_str()).unwrap().assigned_id, 2);
}

//! Participants joining concurrently and disappearing without notice.
//!
//! This example showcases:
//! - Many participants starting at once on a multi-threaded runtime
//! - A participant that vanishes without leaving, and its eviction
//! - A reload that recovers its previous id from the ephemeral store
//!
//! Run with: cargo run --example concurrent_participants

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tab_coordinator::{
    CoordinatorConfig, MemoryEphemeralStore, MemoryStore, Participant, RegistryStore, SystemClock,
};

type DemoParticipant = Participant<MemoryStore, MemoryEphemeralStore>;

fn config() -> CoordinatorConfig {
    CoordinatorConfig {
        heartbeat_interval_ms: 200,
        inactivity_threshold_ms: 600,
        ..Default::default()
    }
}

async fn join(store: &MemoryStore, ephemeral: MemoryEphemeralStore) -> DemoParticipant {
    Participant::start(
        Arc::new(store.handle()),
        Arc::new(ephemeral),
        Arc::new(SystemClock),
        config(),
    )
    .await
    .expect("participant failed to start")
}

fn print_registry(store: &MemoryStore) {
    let registry = RegistryStore::new(Arc::new(store.handle()), config().registry_key)
        .read()
        .expect("registry unreadable");
    let ids: BTreeSet<_> = registry.iter().map(|(_, e)| e.assigned_id).collect();
    println!("  registry: {} entries, ids {:?}", registry.len(), ids);
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    println!("=== Concurrent Participants Example ===\n");

    let store = MemoryStore::new();

    println!("--- Concurrent Join ---");
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            join(&store, MemoryEphemeralStore::new()).await
        }));
    }
    let mut participants = Vec::new();
    for handle in handles {
        participants.push(handle.await.expect("join task panicked"));
    }
    println!("  8 participants joined in {:?}", start.elapsed());

    // Let change notifications settle.
    tokio::time::sleep(Duration::from_millis(300)).await;
    print_registry(&store);

    println!("\n--- Silent Disappearance ---");
    let vanished = participants.remove(0);
    println!("  participant {:?} vanishes without leaving", vanished.assigned_id());
    drop(vanished);
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    print_registry(&store);

    println!("\n--- Reload ---");
    let process = MemoryEphemeralStore::new();
    let before = join(&store, process.clone()).await;
    let previous = before.assigned_id();
    before.stop().await.expect("stop failed");
    let after = join(&store, process).await;
    println!("  id before reload {:?}, after reload {:?}", previous, after.assigned_id());

    participants.push(after);
    for participant in participants {
        participant.stop().await.expect("stop failed");
    }
    print_registry(&store);
}

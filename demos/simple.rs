//! Simple standalone example of identity coordination.
//!
//! Three participants share one in-memory store. Each gets the lowest free
//! id; when one leaves, the next newcomer fills the gap.
//!
//! Run with: cargo run --example simple

use std::sync::Arc;

use tab_coordinator::{
    CoordinatorConfig, MemoryEphemeralStore, MemoryStore, Participant, RegistryStore, SystemClock,
};

#[tokio::main]
async fn main() -> tab_coordinator::Result<()> {
    println!("=== Simple Coordination Example ===\n");

    let store = MemoryStore::new();
    let config = CoordinatorConfig::default();

    let mut participants = Vec::new();
    for name in ["alice", "bob", "carol"] {
        let participant = Participant::start(
            Arc::new(store.handle()),
            Arc::new(MemoryEphemeralStore::new()),
            Arc::new(SystemClock),
            config.clone(),
        )
        .await?;
        println!(
            "{name} joined as {} with id {:?}",
            participant.key(),
            participant.assigned_id()
        );
        participants.push(participant);
    }

    println!("\nbob leaves...");
    let bob = participants.remove(1);
    bob.stop().await?;

    let dave = Participant::start(
        Arc::new(store.handle()),
        Arc::new(MemoryEphemeralStore::new()),
        Arc::new(SystemClock),
        config.clone(),
    )
    .await?;
    println!("dave joined with id {:?} (bob's old id)", dave.assigned_id());

    let registry = RegistryStore::new(Arc::new(store.handle()), config.registry_key.clone()).read()?;
    println!("\n--- Registry ---");
    for (key, entry) in registry.iter() {
        println!("  {key} -> id {} (heartbeat at {})", entry.assigned_id, entry.last_heartbeat);
    }

    for participant in participants {
        participant.stop().await?;
    }
    dave.stop().await?;
    Ok(())
}

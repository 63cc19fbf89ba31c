//! `causerie-replay`: replays a JSON-lines event log through a conversation
//! controller, prints every emitted change as JSON, then the final timeline.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use causerie_client::replay::{parse_log, render_item};
use causerie_client::{init_tracing, spawn_conversation, MemorySource};
use causerie_shared::ConversationId;
use causerie_timeline::TimelineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .context("usage: causerie-replay <events.jsonl>")?;
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {path}"))?;
    let log = parse_log(&text).with_context(|| format!("Failed to parse {path}"))?;
    let roster = log.header.roster()?;
    let config = TimelineConfig::from_env();
    info!(events = log.events.len(), group = roster.is_group(), ?config, "Replaying event log");

    let (handle, mut changes, task) = spawn_conversation(
        ConversationId::new(),
        config,
        roster.clone(),
        Arc::new(MemorySource::default()),
    );

    let printer = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(change) = changes.recv().await {
            match serde_json::to_string(&change) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(?change, error = %e, "Failed to encode change"),
            }
            count += 1;
        }
        count
    });

    for event in log.events {
        handle.push(event).await?;
    }
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    task.await?;
    let count = printer.await?;

    println!();
    for item in &snapshot.items {
        println!("{}", render_item(item, &roster));
    }

    info!(changes = count, items = snapshot.items.len(), "Replay finished");
    Ok(())
}

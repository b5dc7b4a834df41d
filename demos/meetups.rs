//! Walk through the meetup workflows against the in-memory backend.
//!
//! Run with: `cargo run --example meetups`
//!
//! Set `RUST_LOG=meetup_sync=debug` to see every checkpoint.

use std::sync::Arc;

use chrono::{Duration, Utc};
use meetup_sync::{
    Credentials, ImageUpload, MeetupDraft, MeetupPatch, MemoryBackend, StateStore, SyncConfig,
    Workflows,
};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meetup_sync=info")),
        )
        .init();

    let backend = Arc::new(
        MemoryBackend::new()
            .with_url_base("https://cdn.example.com/meetups")
            .with_account("ada@example.com", "correct horse", "ada"),
    );
    let store = StateStore::new();
    let workflows = Workflows::builder(store.clone())
        .backend(backend.clone())
        .config(SyncConfig {
            request_timeout: Some(std::time::Duration::from_secs(5)),
            featured_count: 3,
            ..SyncConfig::default()
        })
        .build()?;
    let views = workflows.views();

    // Print a line for every snapshot the store publishes.
    let mut changes = store.changes();
    let watcher = tokio::spawn(async move {
        while let Some(snapshot) = changes.next().await {
            println!(
                "  [store] meetups={} user={} loading={}",
                snapshot.meetups.len(),
                snapshot.user.as_ref().map_or("-", |u| u.id.as_str()),
                snapshot.loading,
            );
        }
    });

    // A wrong password is reported through the error field.
    if let Err(e) = workflows
        .sign_in(&Credentials::new("ada@example.com", "wrong"))
        .await
    {
        println!("sign-in rejected: {e}");
    }
    let user = workflows
        .sign_in(&Credentials::new("ada@example.com", "correct horse"))
        .await?;
    println!("signed in as {}", user.id);

    for (offset, title) in [(3, "Rust night"), (1, "Async deep dive"), (7, "Embedded meetup")] {
        let meetup = workflows
            .create_meetup(MeetupDraft {
                title: title.into(),
                location: "Berlin".into(),
                description: "Talks, pizza, and hacking".into(),
                date: Utc::now() + Duration::days(offset),
                image: ImageUpload::new("cover.jpg", vec![0xFF, 0xD8, 0xFF]),
                creator_id: None,
            })
            .await?;
        println!("created {} -> {}", meetup.id, meetup.image_url.unwrap_or_default());
    }

    let first = views
        .featured_n(1)
        .into_iter()
        .next()
        .ok_or("no meetups were created")?;
    workflows
        .update_meetup(&first.id, MeetupPatch::title("Async deep dive (moved)"))
        .await?;
    workflows.register_for_meetup(&first.id).await?;

    // Reload everything from the backend and rebuild registrations.
    workflows.load_meetups().await?;
    workflows.refresh_profile().await?;

    println!("featured:");
    for meetup in views.featured() {
        let marker = if views.is_registered(&meetup.id) { "*" } else { " " };
        println!(" {marker} {} {} ({})", meetup.date, meetup.title, meetup.location);
    }

    workflows.unregister_from_meetup(&first.id).await?;
    workflows.sign_out().await?;
    assert!(views.current_user().is_none());
    println!("backend received {} calls", backend.calls().len());

    drop(workflows);
    drop(views);
    drop(store);
    watcher.await?;
    Ok(())
}

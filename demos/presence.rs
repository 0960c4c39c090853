//! Presence channel example
//!
//! Joins a presence channel and keeps a live view of who else is subscribed.
//!
//! ## Key Concepts:
//!
//! **Authorization**: presence channels are signed by your application server. Set
//! `PUSHER_AUTH_ENDPOINT` to an endpoint that answers `socket_id` + `channel_name` with
//! `{"auth": "...", "channel_data": "{\"user_id\": ...}"}`.
//!
//! **Members**: the initial set arrives with `pusher:subscription_succeeded`, after which
//! `pusher:member_added` and `pusher:member_removed` keep it current. `members()` always
//! returns the latest snapshot.

use pusher_channels_rs::{PusherChannel, PusherClient, PusherClientOptions};
use std::sync::Arc;

async fn display_members(channel: &Arc<PusherChannel>) {
    let Some(members) = channel.members().await else {
        return;
    };
    println!("📋 {} member(s) present", members.len());
    for member in members.values() {
        println!("   - {}: {:?}", member.id, member.info);
    }
    if let Some(me) = channel.me().await {
        println!("   (you are {})", me.id);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Use INFO level to reduce noise in output
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let app_key = std::env::var("PUSHER_APP_KEY").expect("PUSHER_APP_KEY must be set in .env");
    let auth_endpoint =
        std::env::var("PUSHER_AUTH_ENDPOINT").expect("PUSHER_AUTH_ENDPOINT must be set in .env");

    let client = PusherClient::new(PusherClientOptions {
        app_key,
        cluster: std::env::var("PUSHER_CLUSTER").ok(),
        auth_endpoint: Some(auth_endpoint),
        ..Default::default()
    })?;

    let channel = client.subscribe("presence-lobby").await?;

    let (changes_tx, mut changes_rx) = tokio::sync::mpsc::unbounded_channel();
    for event in [
        "pusher:subscription_succeeded",
        "pusher:member_added",
        "pusher:member_removed",
    ] {
        let changes_tx = changes_tx.clone();
        channel
            .bind(event, move |event| {
                let _ = changes_tx.send(event.name().to_string());
            })
            .await;
    }
    channel
        .bind("pusher:subscription_error", |event| {
            eprintln!("❌ Subscription failed: {:?}", event.data());
        })
        .await;

    client.connect().await;

    loop {
        tokio::select! {
            Some(change) = changes_rx.recv() => {
                println!("👥 {}", change);
                display_members(&channel).await;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.disconnect().await;
    Ok(())
}

//! Public channel example
//!
//! Subscribes to a public channel and prints every event on it, plus connection state
//! changes. Configure with `PUSHER_APP_KEY`, `PUSHER_CLUSTER` and `PUSHER_CHANNEL` in
//! the environment or a `.env` file.

use pusher_channels_rs::{PusherClient, PusherClientOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let app_key = std::env::var("PUSHER_APP_KEY").expect("PUSHER_APP_KEY must be set");
    let cluster = std::env::var("PUSHER_CLUSTER").ok();
    let channel_name = std::env::var("PUSHER_CHANNEL").unwrap_or_else(|_| "my-channel".into());

    // Create client
    let client = PusherClient::new(PusherClientOptions {
        app_key,
        cluster,
        ..Default::default()
    })?;

    client
        .bind_global("pusher:connection_state_changed", |event| {
            println!("🔌 Connection: {:?}", event.data());
        })
        .await;

    let channel = client.subscribe(&channel_name).await?;
    channel
        .bind_all(|event| {
            println!("📨 [{}] {:?}", event.name(), event.data());
        })
        .await;

    // Connect
    println!("Connecting to {}...", client.url());
    client.connect().await;

    // Keep connection alive
    tokio::signal::ctrl_c().await?;

    // Disconnect
    println!("Disconnecting...");
    client.disconnect().await;
    println!("Disconnected!");

    Ok(())
}

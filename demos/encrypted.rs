//! End-to-end encrypted channel example
//!
//! Subscribes to a `private-encrypted-` channel. The authorization endpoint must return a
//! `shared_secret` alongside the signature; payloads are decrypted before handlers see
//! them, and frames that fail to decrypt are reported as `pusher:decryption_error`.

use pusher_channels_rs::{PusherClient, PusherClientOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let app_key = std::env::var("PUSHER_APP_KEY").expect("PUSHER_APP_KEY must be set in .env");
    let auth_endpoint =
        std::env::var("PUSHER_AUTH_ENDPOINT").expect("PUSHER_AUTH_ENDPOINT must be set in .env");
    let mut options = PusherClientOptions {
        app_key,
        cluster: std::env::var("PUSHER_CLUSTER").ok(),
        auth_endpoint: Some(auth_endpoint),
        ..Default::default()
    };
    if let Ok(token) = std::env::var("PUSHER_AUTH_TOKEN") {
        options
            .auth_headers
            .push(("Authorization".to_string(), format!("Bearer {}", token)));
    }

    let client = PusherClient::new(options)?;

    client
        .bind_global("pusher:decryption_error", |event| {
            eprintln!("🔒 Could not decrypt: {:?}", event.data());
        })
        .await;

    let channel = client.subscribe("private-encrypted-vault").await?;
    channel
        .bind("secret", |event| {
            println!("🔓 secret: {:?}", event.parsed_data());
        })
        .await;

    client.connect().await;
    client
        .wait_for_state(
            pusher_channels_rs::ConnectionState::Connected,
            std::time::Duration::from_secs(10),
        )
        .await?;
    println!("Connected as {:?}", client.socket_id().await);

    tokio::signal::ctrl_c().await?;
    client.disconnect().await;
    Ok(())
}

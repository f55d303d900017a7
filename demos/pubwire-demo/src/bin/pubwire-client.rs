//! Example client: subscribes to two topics, announces itself, then leaves.

use std::time::Duration;

use clap::Parser;
use pubwire::prelude::*;

#[derive(Parser)]
#[command(name = "pubwire-client", about = "Run the example pubwire client")]
struct Args {
    /// Broker address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    url: String,

    /// Keep re-dialing until the broker is up.
    #[arg(long)]
    reconnect: bool,

    /// How long to listen for events before leaving, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    linger_ms: u64,
}

fn on_event(conn_id: ConnectionId, data: &[u8]) {
    // Data is opaque to pubwire; this demo sends UTF-8.
    println!("got event on [{conn_id}]: {}", String::from_utf8_lossy(data));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pubwire_demo::init_logging();

    let args = Args::parse();
    let config = ClientConfig::default()
        .with_url(args.url)
        .with_reconnect(args.reconnect);
    let client = Client::connect(config).await?;
    tracing::info!(conn_id = %client.id(), "client started");

    let tesla = match client.subscribe("tesla-events", on_event).await {
        Ok(sub) => Some(sub),
        Err(e) => {
            client
                .publish("example-client-events", b"Failed to subscribe to tesla events")
                .await?;
            tracing::warn!(error = %e, "tesla subscription failed");
            None
        }
    };
    let smartthings = match client.subscribe("smartthings-events", on_event).await {
        Ok(sub) => Some(sub),
        Err(e) => {
            client
                .publish(
                    "example-client-events",
                    b"Failed to subscribe to smartthings events",
                )
                .await?;
            tracing::warn!(error = %e, "smartthings subscription failed");
            None
        }
    };

    client
        .publish("example-client-events", b"Client successfully initialized")
        .await?;

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(args.linger_ms)) => {}
        _ = client.closed() => {
            tracing::info!("broker closed the connection");
            return Ok(());
        }
    }

    for sub in [tesla, smartthings].into_iter().flatten() {
        sub.unsubscribe().await?;
    }
    tracing::info!("unsubscribed from tesla and smartthings events");

    client.close().await?;
    client.closed().await;
    Ok(())
}

use std::sync::Arc;

use clap::Parser;

use fleetlink_core::{
    Anonymous, ChannelConfig, CredentialProvider, MessageType, NotifyConfig, StaticToken,
};
use fleetlink_realtime::Realtime;
use fleetlink_telemetry::{init_telemetry, TelemetryConfig};

/// Diagnostic tail for the portal's real-time channel: connects, subscribes
/// to every message type, and mirrors the live alert list.
#[derive(Parser)]
#[command(name = "fleetlink", version)]
struct Args {
    /// WebSocket endpoint of the live channel
    #[arg(long, default_value = "ws://127.0.0.1:9091/live")]
    endpoint: String,

    /// Bearer token used to authorize the channel
    #[arg(long)]
    token: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _telemetry = init_telemetry(&TelemetryConfig {
        json: args.json,
        ..Default::default()
    });

    let credentials: Arc<dyn CredentialProvider> = match &args.token {
        Some(token) => Arc::new(StaticToken::new(token.clone())),
        None => Arc::new(Anonymous),
    };

    let realtime = Realtime::new(
        ChannelConfig::new(&args.endpoint),
        NotifyConfig::default(),
        credentials,
    );

    // Log every envelope the backend pushes.
    let subscriptions: Vec<_> = [
        MessageType::Notification,
        MessageType::Update,
        MessageType::Alert,
        MessageType::Sync,
    ]
    .into_iter()
    .map(|kind| {
        realtime.subscribe(kind, move |envelope| {
            tracing::info!(
                kind = %envelope.kind,
                category = %envelope.category,
                message = %envelope.message,
                "envelope received"
            );
        })
    })
    .collect();

    // Mirror the alert list whenever it changes.
    let center = realtime.notifications().clone();
    let mut changes = center.changes();
    let alert_printer = tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let snapshot = center.snapshot();
            tracing::info!(alerts = snapshot.len(), "alert list changed");
            for alert in snapshot {
                tracing::info!(
                    id = %alert.id,
                    kind = %alert.kind,
                    sticky = !alert.auto_close,
                    "  {}",
                    alert.message
                );
            }
        }
    });

    realtime.connect().await?;
    tracing::info!(endpoint = %args.endpoint, "channel connected");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    alert_printer.abort();
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    realtime.shutdown().await;
    Ok(())
}

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use prize_wheel::{EventBus, SpinService};

mod config;
mod connection;
mod mcp_handler;
mod use_cases;

use connection::conn;
use mcp_handler::{MCPHandler, stdio};
use use_cases::{AdminUseCase, PaymentUseCase, RedemptionUseCase, WheelUseCase};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Spinning up the prize wheel.");

    let db_conn = conn(&config.database_url)?;
    let events = EventBus::default();
    let service = Arc::new(SpinService::with_events(db_conn, events.clone()));

    let mut subscription = events.subscribe();
    tracing::info!(subscribers = events.subscriber_count(), "event logging attached");
    tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(event = %json, "wheel event"),
                Err(e) => tracing::warn!("failed to encode event: {}", e),
            }
        }
    });

    if config.admin_token.is_none() {
        tracing::warn!("PRIZE_WHEEL_ADMIN_TOKEN is not set; admin tools are disabled");
    }

    let wheel_use_case = WheelUseCase::new(Arc::clone(&service));
    let redemption_use_case = RedemptionUseCase::new(Arc::clone(&service));
    let payment_use_case = PaymentUseCase::new(Arc::clone(&service), config.relay_url.as_deref());
    let admin_use_case = AdminUseCase::new(
        Arc::clone(&service),
        config.admin_token.clone(),
        config.report_path.clone(),
    );

    let handler = MCPHandler::new(
        Arc::new(wheel_use_case),
        Arc::new(redemption_use_case),
        Arc::new(payment_use_case),
        Arc::new(admin_use_case),
    );

    let (reader, writer) = stdio();

    handler.serve(reader, writer).await.inspect_err(|e| {
        tracing::error!("serving error: {:?}", e);
    })?;

    Ok(())
}

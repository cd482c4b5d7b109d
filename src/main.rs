use std::net::TcpListener;

use portal_auth::configuration::get_configuration;
use portal_auth::startup::{run, AppState};
use portal_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let state = if configuration.application.use_memory_store {
        tracing::warn!("Using in-memory stores; nothing will be persisted");
        AppState::in_memory(&configuration)
    } else {
        AppState::postgres(&configuration).await
    }
    .map_err(|e| {
        tracing::error!("Failed to build application state: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Startup error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, state)?.await
}

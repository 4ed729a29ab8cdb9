use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};
use ua_server::api::rest::{create_api_routes, SharedAppState};
use ua_server::config::settings::Settings;
use ua_server::demo_space::{self, DemoSpace};
use ua_server::logging::init_logging;
use ua_server::ServerContext;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- Load Configuration ---
    let config_path = Path::new("config.toml");
    let settings = match Settings::load(config_path) {
        Ok(s) => s,
        Err(e) => {
            init_logging("info");
            error!(
                "FATAL: Failed to load configuration from {:?}: {}",
                config_path, e
            );
            std::process::exit(1);
        }
    };
    init_logging(&settings.logging.level);
    info!(
        "{} starting (endpoint {})",
        settings.server.application_name, settings.server.endpoint_url
    );

    // --- Build the address space ---
    let server = Arc::new(ServerContext::new(settings.clone()));
    let demo = demo_space::build(&server)?;
    demo.run_initial_writes(&server)?;

    // --- Periodic Temperature update ---
    let update_server = Arc::clone(&server);
    let temperature = demo.temperature.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(1));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let seconds = Utc::now().timestamp_millis() as f64 / 1000.0;
            if let Err(e) = update_server
                .store
                .set_value_unchecked(&temperature, DemoSpace::temperature_at(seconds))
            {
                error!("Temperature update failed: {}", e);
                break;
            }
        }
    });

    // --- Start API Server ---
    let app = create_api_routes().with_state(SharedAppState::new(Arc::clone(&server)));
    let listener = tokio::net::TcpListener::bind(&settings.api.bind_address).await?;
    info!("API server listening on {}", settings.api.bind_address);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    server.shutdown();
    info!("Server stopped");
    Ok(())
}

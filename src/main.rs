/// Stepway: HTTP-native workflow orchestration engine
///
/// Main entry point for the Stepway server. Initializes configuration and
/// starts the HTTP server with workflow management, run control, and
/// completion event intake.

use stepway::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow management API at /api/workflows/*
/// - Run control at /api/runs/*, /api/runstate/*, /api/scalegroups/*
/// - Completion event intake at /api/events/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    start_server(config).await?;

    Ok(())
}

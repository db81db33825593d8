/// Main entry point for the Pulseflow server
///
/// Initializes configuration from the environment and starts the HTTP
/// server with workflow management, execution, scheduling and the live
/// event stream.

use pulseflow::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration comes from PULSEFLOW_* environment variables, with
    // localhost-friendly defaults.
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}

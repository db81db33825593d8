/// Configuration management for the Pulseflow engine
///
/// Handles server binding, database location, and scheduler parameters.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path (default: "data/pulseflow.db")
    pub path: String,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Shared secret required on the manual sweep endpoint; unset means the
    /// endpoint is open (local/dev deployments)
    pub sweep_secret: Option<String>,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("PULSEFLOW_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("PULSEFLOW_PORT")
                    .unwrap_or_else(|_| "3004".to_string())
                    .parse()
                    .unwrap_or(3004),
            },
            database: DatabaseConfig {
                path: std::env::var("PULSEFLOW_DB_PATH")
                    .unwrap_or_else(|_| "data/pulseflow.db".to_string()),
            },
            scheduler: SchedulerConfig {
                sweep_secret: std::env::var("PULSEFLOW_SWEEP_SECRET").ok(),
            },
        }
    }
}

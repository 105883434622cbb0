use std::time::Duration;

use clap::Parser;

/// Runtime configuration. Every flag can also be set from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "datadrive", version, about = "Serve BigQuery, Firestore and Cloud SQL reads as JSON")]
pub struct AppConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Upper bound for one request, backend I/O included.
    #[arg(long, env = "DATADRIVE_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Wrap single-document responses in a one-element array.
    #[arg(long, env = "DATADRIVE_ALWAYS_ARRAY")]
    pub always_array: bool,

    /// Rows or documents requested per backend page.
    #[arg(long, env = "DATADRIVE_PAGE_SIZE", default_value_t = 1000)]
    pub page_size: u32,

    /// Bearer token for the Google APIs; the metadata server is used when unset.
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    #[arg(long, env = "GCE_METADATA_HOST", default_value = "metadata.google.internal")]
    pub metadata_host: String,

    #[arg(
        long,
        env = "BIGQUERY_ENDPOINT",
        default_value = "https://bigquery.googleapis.com/bigquery/v2"
    )]
    pub bigquery_endpoint: String,

    #[arg(long, env = "FIRESTORE_ENDPOINT", default_value = "https://firestore.googleapis.com/v1")]
    pub firestore_endpoint: String,

    /// `host:port` of a Firestore emulator; overrides the endpoint.
    #[arg(long, env = "FIRESTORE_EMULATOR_HOST")]
    pub firestore_emulator_host: Option<String>,

    #[arg(long, env = "FIRESTORE_DATABASE", default_value = "(default)")]
    pub firestore_database: String,

    #[arg(long, env = "DATADRIVE_SQL_USER", default_value = "root")]
    pub sql_user: String,

    #[arg(long, env = "DATADRIVE_SQL_PASSWORD", hide_env_values = true)]
    pub sql_password: Option<String>,

    /// Directory with one unix socket per `project:instance`.
    #[arg(long, env = "DATADRIVE_SQL_SOCKET_DIR", default_value = "/cloudsql")]
    pub sql_socket_dir: String,

    /// Connect over TCP (e.g. to a local auth proxy) instead of a unix socket.
    #[arg(long, env = "DATADRIVE_SQL_HOST")]
    pub sql_host: Option<String>,

    #[arg(long, env = "DATADRIVE_SQL_PORT")]
    pub sql_port: Option<u16>,
}

impl AppConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

//! Client seams for the three store types and their implementations.

pub mod auth;
pub mod bigquery;
pub mod docstore;
pub mod firestore;
pub mod memory;
pub mod sql;
pub mod warehouse;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::AppConfig;
use crate::core::{DriveError, Result};
use auth::TokenSource;
use bigquery::BigQueryConnector;
use docstore::DocumentConnector;
use firestore::FirestoreConnector;
use sql::{CloudSqlConnector, CloudSqlSettings, SqlConnector};
use warehouse::WarehouseConnector;

/// The connector for each platform. Every dispatch asks one of these for a
/// brand-new client; nothing is pooled across requests.
#[derive(Clone)]
pub struct Backends {
    pub warehouse: Arc<dyn WarehouseConnector>,
    pub documents: Arc<dyn DocumentConnector>,
    pub sql: Arc<dyn SqlConnector>,
}

impl Backends {
    pub fn new(
        warehouse: Arc<dyn WarehouseConnector>,
        documents: Arc<dyn DocumentConnector>,
        sql: Arc<dyn SqlConnector>,
    ) -> Self {
        Self {
            warehouse,
            documents,
            sql,
        }
    }

    /// Google Cloud backends as described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("datadrive/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DriveError::unavailable(format!("cannot build http client: {e}")))?;

        let tokens = TokenSource::from_config(config.access_token.as_deref(), &config.metadata_host);

        let warehouse = BigQueryConnector::new(
            http.clone(),
            config.bigquery_endpoint.clone(),
            tokens.clone(),
            config.page_size,
        );

        let documents = match &config.firestore_emulator_host {
            Some(host) => FirestoreConnector::emulator(
                http,
                host,
                config.firestore_database.clone(),
                config.page_size,
            ),
            None => FirestoreConnector::new(
                http,
                config.firestore_endpoint.clone(),
                config.firestore_database.clone(),
                tokens,
                config.page_size,
            ),
        };

        let sql = CloudSqlConnector::new(CloudSqlSettings {
            user: config.sql_user.clone(),
            password: config.sql_password.clone().unwrap_or_default(),
            socket_dir: config.sql_socket_dir.clone(),
            host: config.sql_host.clone(),
            port: config.sql_port,
        });

        Ok(Self::new(Arc::new(warehouse), Arc::new(documents), Arc::new(sql)))
    }
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    message: String,
}

/// Pull `error.message` out of a Google API error body, falling back to the
/// raw body text.
pub(crate) fn google_error_message(body: &str) -> String {
    match serde_json::from_str::<GoogleErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

use serde::Deserialize;
use tracing::debug;

use crate::core::{DriveError, Result};

const EMULATOR_TOKEN: &str = "owner";

/// Where bearer tokens for the Google REST APIs come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A token supplied through configuration.
    Static(String),
    /// The instance metadata server of the host (Cloud Run, GCE, GKE).
    MetadataServer { host: String },
    /// Local emulators accept a fixed token.
    Emulator,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
}

impl TokenSource {
    pub fn from_config(access_token: Option<&str>, metadata_host: &str) -> Self {
        match access_token {
            Some(token) if !token.is_empty() => Self::Static(token.to_string()),
            _ => Self::MetadataServer {
                host: metadata_host.to_string(),
            },
        }
    }

    pub async fn access_token(&self, http: &reqwest::Client) -> Result<String> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Emulator => Ok(EMULATOR_TOKEN.to_string()),
            Self::MetadataServer { host } => {
                let url = format!(
                    "http://{host}/computeMetadata/v1/instance/service-accounts/default/token"
                );
                debug!(%url, "requesting access token from metadata server");

                let response = http
                    .get(&url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| DriveError::unavailable(format!("metadata server unreachable: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(DriveError::unavailable(format!(
                        "metadata server refused token request: {status}"
                    )));
                }

                let token: MetadataToken = response.json().await.map_err(|e| {
                    DriveError::unavailable(format!("invalid metadata token response: {e}"))
                })?;
                Ok(token.access_token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_token_wins_over_metadata_server() {
        match TokenSource::from_config(Some("abc"), "metadata.google.internal") {
            TokenSource::Static(token) => assert_eq!(token, "abc"),
            other => panic!("expected static token, got {other:?}"),
        }
    }

    #[test]
    fn empty_token_falls_back_to_metadata_server() {
        assert!(matches!(
            TokenSource::from_config(Some(""), "metadata.google.internal"),
            TokenSource::MetadataServer { .. }
        ));
    }

    #[tokio::test]
    async fn emulator_token_needs_no_network() {
        let token = TokenSource::Emulator
            .access_token(&reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(token, "owner");
    }
}

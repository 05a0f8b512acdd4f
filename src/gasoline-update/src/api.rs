//! Release endpoint client.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use gasoline_common::create_default_client;

use crate::{RELEASE_URL, UpdateError, UpdateResult};

/// Release information from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Version string (semver).
    pub version: String,
    /// Release timestamp.
    pub released_at: DateTime<Utc>,
    /// Brief release notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    /// URL to full changelog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<String>,
}

/// Client for the release distribution endpoint.
#[derive(Clone)]
pub struct ReleaseClient {
    client: Client,
    base_url: String,
}

impl ReleaseClient {
    /// Create a client against the default endpoint.
    pub fn new() -> Self {
        Self::with_url(RELEASE_URL.to_string())
    }

    /// Create a client with a custom endpoint (tests).
    pub fn with_url(base_url: String) -> Self {
        let client = create_default_client().unwrap_or_else(|_| Client::new());
        Self { client, base_url }
    }

    /// Fetch the latest published release.
    pub async fn get_latest(&self) -> UpdateResult<ReleaseInfo> {
        let url = format!("{}/v1/releases/latest", self.base_url);

        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| UpdateError::ConnectionFailed {
                    message: e.to_string(),
                })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(UpdateError::ServerError {
                status: status_code,
                message,
            });
        }

        let info: ReleaseInfo = response.json().await?;
        Ok(info)
    }
}

impl Default for ReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_info_roundtrip() {
        let json = r#"{"version":"1.2.0","released_at":"2026-06-01T00:00:00Z"}"#;
        let info: ReleaseInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.version, "1.2.0");
        assert!(info.release_notes.is_none());
    }
}

//! Transmission RPC backend.
//!
//! Speaks Transmission's JSON RPC over HTTP, including the
//! `X-Transmission-Session-Id` handshake (HTTP 409 carries a fresh id).

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{DownloadBackend, TransferStatus};
use crate::domain::Candidate;
use crate::{Error, Result};

const SESSION_HEADER: &str = "X-Transmission-Session-Id";

/// Transmission torrent status codes.
const TR_STATUS_STOPPED: i64 = 0;
const TR_STATUS_DOWNLOAD: i64 = 4;
const TR_STATUS_SEED_WAIT: i64 = 5;
const TR_STATUS_SEED: i64 = 6;

/// Transmission `error` value for local errors (disk, permissions).
const TR_ERROR_LOCAL: i64 = 3;

/// Transmission connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Base URL, e.g. `http://localhost:9091`.
    pub url: String,
    pub rpc_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9091".to_string(),
            rpc_path: "/transmission/rpc".to_string(),
            username: None,
            password: None,
        }
    }
}

impl TransmissionConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            self.rpc_path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct TorrentInfo {
    #[serde(rename = "hashString")]
    hash_string: String,
    #[serde(default)]
    status: i64,
    #[serde(rename = "percentDone", default)]
    percent_done: f64,
    #[serde(default)]
    error: i64,
    #[serde(rename = "errorString", default)]
    error_string: String,
    #[serde(rename = "isFinished", default)]
    is_finished: bool,
}

/// Map a Transmission torrent record onto a [`TransferStatus`].
fn map_torrent_status(
    status: i64,
    percent_done: f64,
    error: i64,
    is_finished: bool,
) -> TransferStatus {
    if error == TR_ERROR_LOCAL {
        return TransferStatus::Stopped;
    }
    if is_finished
        || percent_done >= 1.0
        || status == TR_STATUS_SEED_WAIT
        || status == TR_STATUS_SEED
    {
        return TransferStatus::Seeding;
    }
    match status {
        TR_STATUS_STOPPED => TransferStatus::Stopped,
        1..=TR_STATUS_DOWNLOAD => TransferStatus::Downloading,
        _ => TransferStatus::Unknown,
    }
}

/// Download backend backed by a Transmission daemon.
pub struct TransmissionBackend {
    config: TransmissionConfig,
    endpoint: String,
    client: Client,
    session_id: RwLock<Option<String>>,
}

impl TransmissionBackend {
    pub fn new(config: TransmissionConfig, client: Client) -> Self {
        let endpoint = config.endpoint();
        Self {
            config,
            endpoint,
            client,
            session_id: RwLock::new(None),
        }
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let mut request = self.client.post(&self.endpoint).json(body);
        if let Some(id) = self.session_id.read().clone() {
            request = request.header(SESSION_HEADER, id);
        }
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_deref());
        }
        Ok(request.send().await?)
    }

    /// Call an RPC method, refreshing the session id once if the daemon asks.
    async fn call(&self, method: &str, arguments: Value) -> Result<Value> {
        let body = json!({ "method": method, "arguments": arguments });

        let mut response = self.post(&body).await?;
        if response.status() == StatusCode::CONFLICT {
            let fresh = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| Error::backend("409 without a session id"))?;
            debug!("Refreshed Transmission session id");
            *self.session_id.write() = Some(fresh);
            response = self.post(&body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let rpc: RpcResponse = response.json().await?;
        if rpc.result != "success" {
            return Err(Error::backend(format!("{} failed: {}", method, rpc.result)));
        }
        Ok(rpc.arguments)
    }

    fn transfer_key<'a>(candidate: &'a Candidate, transfer_id: Option<&'a str>) -> &'a str {
        transfer_id.unwrap_or(&candidate.id)
    }
}

#[async_trait]
impl DownloadBackend for TransmissionBackend {
    fn name(&self) -> &'static str {
        "transmission"
    }

    async fn submit(&self, candidate: &Candidate) -> Result<String> {
        let mut arguments = json!({ "filename": candidate.link });
        if let Some(dir) = &candidate.temp_dir {
            arguments["download-dir"] = json!(dir.to_string_lossy());
        }

        let result = self.call("torrent-add", arguments).await?;
        if result.get("torrent-duplicate").is_some() {
            warn!(candidate = %candidate.name, "Transmission already has this torrent");
        }
        let added = result
            .get("torrent-added")
            .or_else(|| result.get("torrent-duplicate"))
            .ok_or_else(|| Error::backend("torrent-add returned no torrent"))?;

        added
            .get("hashString")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::backend("torrent-add returned no hashString"))
    }

    async fn remove(
        &self,
        candidate: &Candidate,
        transfer_id: Option<&str>,
        delete_data: bool,
    ) -> Result<()> {
        let key = Self::transfer_key(candidate, transfer_id);
        self.call(
            "torrent-remove",
            json!({ "ids": [key], "delete-local-data": delete_data }),
        )
        .await?;
        Ok(())
    }

    async fn status(&self, candidate: &Candidate, transfer_id: &str) -> Result<TransferStatus> {
        let result = self
            .call(
                "torrent-get",
                json!({
                    "ids": [transfer_id],
                    "fields": ["hashString", "status", "percentDone", "error", "errorString", "isFinished"],
                }),
            )
            .await?;

        let torrents: Vec<TorrentInfo> =
            serde_json::from_value(result.get("torrents").cloned().unwrap_or(Value::Null))
                .unwrap_or_default();
        let torrent = torrents
            .into_iter()
            .find(|t| t.hash_string.eq_ignore_ascii_case(transfer_id))
            .ok_or_else(|| {
                Error::backend(format!("transfer for {} no longer exists", candidate.name))
            })?;

        if torrent.error != 0 {
            debug!(
                candidate = %candidate.name,
                error = torrent.error,
                "Transmission reports: {}",
                torrent.error_string
            );
        }

        Ok(map_torrent_status(
            torrent.status,
            torrent.percent_done,
            torrent.error,
            torrent.is_finished,
        ))
    }

    async fn is_alive(&self) -> bool {
        match self.call("session-get", json!({ "fields": ["version"] })).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Transmission is not reachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(4, 0.5, 0, false, TransferStatus::Downloading)]
    #[case(3, 0.0, 0, false, TransferStatus::Downloading)]
    #[case(6, 1.0, 0, false, TransferStatus::Seeding)]
    #[case(5, 0.99, 0, false, TransferStatus::Seeding)]
    #[case(0, 1.0, 0, true, TransferStatus::Seeding)]
    #[case(0, 0.4, 0, false, TransferStatus::Stopped)]
    #[case(4, 0.4, 3, false, TransferStatus::Stopped)]
    #[case(4, 0.4, 2, false, TransferStatus::Downloading)]
    #[case(9, 0.4, 0, false, TransferStatus::Unknown)]
    fn test_map_torrent_status(
        #[case] status: i64,
        #[case] percent_done: f64,
        #[case] error: i64,
        #[case] is_finished: bool,
        #[case] expected: TransferStatus,
    ) {
        assert_eq!(
            map_torrent_status(status, percent_done, error, is_finished),
            expected
        );
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let config = TransmissionConfig {
            url: "http://nas:9091/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "http://nas:9091/transmission/rpc");
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_not_alive() {
        let backend = TransmissionBackend::new(
            TransmissionConfig {
                url: "http://127.0.0.1:1".to_string(),
                ..Default::default()
            },
            Client::new(),
        );
        assert!(!backend.is_alive().await);
    }
}

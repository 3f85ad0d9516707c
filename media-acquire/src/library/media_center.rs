//! Media-center library refresh triggers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{Error, Result};

/// A media server whose library should be rescanned after a publish.
#[async_trait]
pub trait MediaCenter: Send + Sync {
    fn name(&self) -> &str;

    async fn refresh(&self) -> Result<()>;
}

/// Media-center configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaCenterConfig {
    Jellyfin { url: String, api_key: String },
    Plex { url: String, token: String },
}

impl MediaCenterConfig {
    pub fn build(&self, client: Client) -> Arc<dyn MediaCenter> {
        match self {
            Self::Jellyfin { url, api_key } => Arc::new(JellyfinMediaCenter {
                url: url.trim_end_matches('/').to_string(),
                api_key: api_key.clone(),
                client,
            }),
            Self::Plex { url, token } => Arc::new(PlexMediaCenter {
                url: url.trim_end_matches('/').to_string(),
                token: token.clone(),
                client,
            }),
        }
    }
}

async fn check(name: &str, response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(Error::Other(format!(
            "{} refresh failed: {} - {}",
            name, status, body
        )))
    }
}

/// Jellyfin (and Emby) `POST /Library/Refresh`.
pub struct JellyfinMediaCenter {
    url: String,
    api_key: String,
    client: Client,
}

#[async_trait]
impl MediaCenter for JellyfinMediaCenter {
    fn name(&self) -> &str {
        "jellyfin"
    }

    async fn refresh(&self) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/Library/Refresh", self.url))
            .header("X-Emby-Token", &self.api_key)
            .send()
            .await?;
        check(self.name(), response).await
    }
}

/// Plex `GET /library/sections/all/refresh`.
pub struct PlexMediaCenter {
    url: String,
    token: String,
    client: Client,
}

#[async_trait]
impl MediaCenter for PlexMediaCenter {
    fn name(&self) -> &str {
        "plex"
    }

    async fn refresh(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/library/sections/all/refresh", self.url))
            .header("X-Plex-Token", &self.token)
            .send()
            .await?;
        check(self.name(), response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let json = r#"[
            {"type": "jellyfin", "url": "http://jf:8096/", "api_key": "k"},
            {"type": "plex", "url": "http://plex:32400", "token": "t"}
        ]"#;
        let configs: Vec<MediaCenterConfig> = serde_json::from_str(json).unwrap();
        let names: Vec<String> = configs
            .iter()
            .map(|c| c.build(Client::new()).name().to_string())
            .collect();
        assert_eq!(names, vec!["jellyfin", "plex"]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let center = MediaCenterConfig::Plex {
            url: "http://127.0.0.1:1".into(),
            token: "t".into(),
        }
        .build(Client::new());
        assert!(center.refresh().await.is_err());
    }
}

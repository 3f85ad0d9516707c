//! Candidate discovery.
//!
//! Searching and ranking torrent sources happens outside this service. The
//! acquisition core consumes an already-ranked list through
//! [`CandidateSource`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::domain::{Candidate, MediaItem, MediaKind};
use crate::{Error, Result};

/// Source of ranked candidates for a media item.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Ranked candidates, best first. An empty list means nothing was found.
    async fn discover(&self, item: &MediaItem) -> Result<Vec<Candidate>>;

    async fn is_healthy(&self) -> bool;
}

/// Discovery service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Base URL of the discovery service.
    pub url: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8085".to_string(),
        }
    }
}

/// Discovery over HTTP.
///
/// `GET {url}/candidates?kind=...` returns a JSON array of candidates in
/// ranking order; `GET {url}/health` answers 2xx when the service is usable.
pub struct HttpCandidateSource {
    base: Url,
    client: Client,
}

impl HttpCandidateSource {
    pub fn new(config: &DiscoveryConfig, client: Client) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid discovery url '{}': {}", config.url, e)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::discovery(format!("invalid endpoint {}: {}", path, e)))
    }

    fn candidates_url(&self, item: &MediaItem) -> Result<Url> {
        let mut url = self.endpoint("candidates")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("item_id", &item.id);
            match &item.kind {
                MediaKind::Episode(info) => {
                    query
                        .append_pair("kind", "episode")
                        .append_pair("show", &info.show_title)
                        .append_pair("season", &info.season.to_string())
                        .append_pair("episode", &info.episode.to_string());
                }
                MediaKind::Movie(info) => {
                    query
                        .append_pair("kind", "movie")
                        .append_pair("title", &info.title);
                    if let Some(year) = info.year {
                        query.append_pair("year", &year.to_string());
                    }
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn discover(&self, item: &MediaItem) -> Result<Vec<Candidate>> {
        let url = self.candidates_url(item)?;
        debug!(item_id = %item.id, %url, "Discovering candidates");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::discovery(format!(
                "discovery returned HTTP {} for {}",
                status, item.id
            )));
        }
        Ok(response.json::<Vec<Candidate>>().await?)
    }

    async fn is_healthy(&self) -> bool {
        let Ok(url) = self.endpoint("health") else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Discovery health check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Discovery service is not reachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(url: &str) -> HttpCandidateSource {
        HttpCandidateSource::new(
            &DiscoveryConfig {
                url: url.to_string(),
            },
            Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_episode_query() {
        let item = MediaItem::episode("ep-1", "The Bear", 2, 6);
        let url = source("http://search.local/api").candidates_url(&item).unwrap();

        assert_eq!(url.path(), "/api/candidates");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("kind".into(), "episode".into())));
        assert!(pairs.contains(&("show".into(), "The Bear".into())));
        assert!(pairs.contains(&("season".into(), "2".into())));
    }

    #[test]
    fn test_movie_query_without_year() {
        let item = MediaItem::movie("mv-1", "Heat", None);
        let url = source("http://search.local/").candidates_url(&item).unwrap();

        assert_eq!(url.path(), "/candidates");
        assert!(!url.query_pairs().any(|(k, _)| k == "year"));
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let result = HttpCandidateSource::new(
            &DiscoveryConfig {
                url: "not a url".into(),
            },
            Client::new(),
        );
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}

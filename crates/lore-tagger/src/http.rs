//! HTTP client for the tagger sidecar.
//!
//! The tagger accepts `POST {TAGGER_URL}` with `{note_id, text, user_id}` and
//! answers with a JSON array of proposed mentions. Any transport failure,
//! non-2xx status, or unparseable body is reported as [`Error::Tagger`].
//!
//! # Configuration
//!
//! - `TAGGER_URL`: endpoint (default: `http://localhost:5001/tag`)
//! - `TAGGER_TIMEOUT_SECS`: request timeout (default: 30)
//! - `TAGGER_ENABLED`: set to `false` to disable tagging entirely

use std::time::{Duration, Instant};

use async_trait::async_trait;
use lore_core::{defaults, Error, ProposedMention, Result, TagRequest, Tagger};
use serde::Deserialize;
use tracing::{debug, warn};

/// Connection settings for [`HttpTagger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggerConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            url: defaults::TAGGER_URL.to_string(),
            timeout_secs: defaults::TAGGER_TIMEOUT_SECS,
        }
    }
}

impl TaggerConfig {
    /// Read the configuration from the process environment.
    ///
    /// Returns `None` when tagging is disabled.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let enabled = get(defaults::ENV_TAGGER_ENABLED)
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
            .unwrap_or(true);
        if !enabled {
            return Ok(None);
        }

        let url = get(defaults::ENV_TAGGER_URL).unwrap_or_else(|| defaults::TAGGER_URL.to_string());
        if url.trim().is_empty() {
            return Ok(None);
        }

        let timeout_secs = match get(defaults::ENV_TAGGER_TIMEOUT_SECS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got {:?}",
                    defaults::ENV_TAGGER_TIMEOUT_SECS,
                    raw
                ))
            })?,
            None => defaults::TAGGER_TIMEOUT_SECS,
        };

        Ok(Some(Self {
            url: url.trim().to_string(),
            timeout_secs,
        }))
    }

    /// Health endpoint on the same host as the tagging endpoint.
    fn health_url(&self) -> Option<reqwest::Url> {
        reqwest::Url::parse(&self.url).ok()?.join("/health").ok()
    }
}

/// Health check response from the tagger.
#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

/// Tagger reached over HTTP.
pub struct HttpTagger {
    config: TaggerConfig,
    client: reqwest::Client,
}

impl HttpTagger {
    pub fn new(config: TaggerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build tagger client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create from environment variables.
    /// Returns `None` if tagging is disabled.
    pub fn from_env() -> Result<Option<Self>> {
        TaggerConfig::from_env()?.map(Self::new).transpose()
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }
}

#[async_trait]
impl Tagger for HttpTagger {
    async fn tag(&self, req: &TagRequest) -> Result<Vec<ProposedMention>> {
        let start = Instant::now();

        let response = self
            .client
            .post(&self.config.url)
            .json(req)
            .send()
            .await
            .map_err(|e| Error::Tagger(format!("Tagger request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "tagger",
                component = "http",
                op = "tag",
                note_id = req.note_id,
                status = status.as_u16(),
                "Tagger returned an error status"
            );
            return Err(Error::Tagger(format!(
                "Tagger returned {}: {}",
                status, body
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Tagger(format!("Failed to read tagger response: {}", e)))?;
        let proposals: Vec<ProposedMention> = serde_json::from_str(&body)
            .map_err(|e| Error::Tagger(format!("Malformed tagger response: {}", e)))?;

        debug!(
            subsystem = "tagger",
            component = "http",
            op = "tag",
            note_id = req.note_id,
            proposal_count = proposals.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tagger responded"
        );
        Ok(proposals)
    }

    async fn health_check(&self) -> Result<bool> {
        let Some(url) = self.config.health_url() else {
            return Ok(false);
        };
        match self
            .client
            .get(url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => Ok(resp
                .json::<HealthResponse>()
                .await
                .map(|h| h.status == "healthy" || h.status == "ok")
                .unwrap_or(false)),
            _ => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = TaggerConfig::from_vars(vars(&[])).unwrap().unwrap();
        assert_eq!(config, TaggerConfig::default());
        assert_eq!(config.url, "http://localhost:5001/tag");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_config_overrides() {
        let config = TaggerConfig::from_vars(vars(&[
            ("TAGGER_URL", " http://tagger:9000/tag "),
            ("TAGGER_TIMEOUT_SECS", "5"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.url, "http://tagger:9000/tag");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_config_disabled() {
        for value in ["false", "0", "OFF", "no"] {
            let config = TaggerConfig::from_vars(vars(&[("TAGGER_ENABLED", value)])).unwrap();
            assert!(config.is_none(), "{} should disable tagging", value);
        }
        let config = TaggerConfig::from_vars(vars(&[("TAGGER_URL", "")])).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_config_rejects_bad_timeout() {
        let err = TaggerConfig::from_vars(vars(&[("TAGGER_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_health_url_replaces_path() {
        let config = TaggerConfig {
            url: "http://tagger:9000/api/tag".to_string(),
            timeout_secs: 1,
        };
        assert_eq!(
            config.health_url().unwrap().as_str(),
            "http://tagger:9000/health"
        );
    }

    #[test]
    fn test_tag_request_serialization() {
        let req = TagRequest {
            note_id: 7,
            text: "Aria met Bree".to_string(),
            user_id: 3,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["note_id"], 7);
        assert_eq!(json["text"], "Aria met Bree");
        assert_eq!(json["user_id"], 3);
    }
}

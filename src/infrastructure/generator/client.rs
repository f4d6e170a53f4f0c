use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use super::CwlSource;
use crate::domain::{DomainError, Technique};

/// HTTP client for the CWL generator service
#[derive(Debug, Clone)]
pub struct GeneratorClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GeneratorClient {
    /// Every request is bounded by `timeout`
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, DomainError> {
        let raw = base_url.as_ref();
        let base_url = Url::parse(raw).map_err(|e| {
            DomainError::configuration(format!("Invalid generator URL '{}': {}", raw, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DomainError::configuration(format!(
                "Generator URL '{}' cannot carry a path",
                raw
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                DomainError::configuration(format!("Failed to build generator client: {}", e))
            })?;

        Ok(Self { client, base_url })
    }

    /// Technique endpoint with every segment percent-encoded
    fn url<I>(&self, technique: Technique, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(technique.slug()).extend(segments);
        }
        url
    }

    async fn get_text(&self, url: Url) -> Result<String, DomainError> {
        debug!(url = %url, "Requesting CWL from generator");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                DomainError::timeout(format!("Generator request timed out ({})", url))
            } else {
                DomainError::upstream(format!("Generator request failed ({}): {}", url, e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::upstream(format!(
                "Generator returned HTTP {} ({}): {}",
                status, url, body
            )));
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                DomainError::timeout(format!("Generator response timed out ({})", url))
            } else {
                DomainError::upstream(format!("Failed to read generator response ({}): {}", url, e))
            }
        })
    }
}

#[async_trait]
impl CwlSource for GeneratorClient {
    async fn step_cwl(&self, technique: Technique, index: usize) -> Result<String, DomainError> {
        let index = index.to_string();
        self.get_text(self.url(technique, ["getStepCwl", index.as_str()]))
            .await
    }

    async fn main_cwl(&self, technique: Technique) -> Result<String, DomainError> {
        self.get_text(self.url(technique, ["getMainCwl"])).await
    }

    async fn main_yml(
        &self,
        technique: Technique,
        datasets: &[String],
    ) -> Result<String, DomainError> {
        let segments =
            std::iter::once("generateMainYml").chain(datasets.iter().map(String::as_str));
        self.get_text(self.url(technique, segments)).await
    }
}

//! One-shot backend provisioning: recreates the index mappings on the
//! search backend. Failures here are fatal to the setup step only.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::error::{PicdexerError, Result};
use crate::index::{PICTURE_INDEX, SYNC_ON_DATE_INDEX};

const PICDEXER_MAPPING: &str = include_str!("picdexer_mapping.json");
const SYNC_ON_DATE_MAPPING: &str = include_str!("sync_on_date_mapping.json");
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Manages the search backend's index mappings.
#[derive(Debug)]
pub struct Setup {
    es_url: Url,
    client: reqwest::Client,
}

impl Setup {
    pub fn new(es_url: &str) -> Result<Self> {
        let es_url = Url::parse(es_url)?;
        let client = reqwest::Client::builder()
            .timeout(SETUP_TIMEOUT)
            .build()?;
        Ok(Self { es_url, client })
    }

    /// Provisions both indices, replacing any pre-existing mapping.
    pub async fn setup_elasticsearch(&self) -> Result<()> {
        info!("Pushing Elasticsearch mappings...");
        self.setup_index(PICTURE_INDEX, PICDEXER_MAPPING).await?;
        self.setup_index(SYNC_ON_DATE_INDEX, SYNC_ON_DATE_MAPPING)
            .await?;
        Ok(())
    }

    async fn setup_index(&self, index: &str, mapping: &str) -> Result<()> {
        if self.mapping_exists(index).await? {
            info!("Elasticsearch {index} mapping already exists, deleting...");
            self.delete_mapping(index).await?;
        }
        self.put_mapping(index, mapping).await?;
        Ok(())
    }

    fn index_url(&self, index: &str) -> Result<Url> {
        let mut url = self.es_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PicdexerError::Config(format!("invalid elasticsearch url ({})", self.es_url))
            })?
            .pop_if_empty()
            .push(index);
        Ok(url)
    }

    async fn mapping_exists(&self, index: &str) -> Result<bool> {
        let status = self.simple_query(Method::GET, index).await?;
        match status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(PicdexerError::UnexpectedStatus(other.as_u16())),
        }
    }

    async fn delete_mapping(&self, index: &str) -> Result<()> {
        let status = self.simple_query(Method::DELETE, index).await?;
        if status != StatusCode::OK {
            return Err(PicdexerError::UnexpectedStatus(status.as_u16()));
        }
        Ok(())
    }

    async fn simple_query(&self, method: Method, index: &str) -> Result<StatusCode> {
        let resp = self
            .client
            .request(method, self.index_url(index)?)
            .send()
            .await?;
        let status = resp.status();
        debug!("Response body: {}", resp.text().await.unwrap_or_default());
        Ok(status)
    }

    async fn put_mapping(&self, index: &str, mapping: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.index_url(index)?)
            .header(CONTENT_TYPE, "application/json")
            .body(mapping.to_string())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PicdexerError::UnexpectedStatus(resp.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_url_appends_the_index() {
        let setup = Setup::new("http://localhost:9200").expect("setup");
        assert_eq!(
            setup.index_url("picdexer").expect("url").as_str(),
            "http://localhost:9200/picdexer"
        );
    }

    #[test]
    fn embedded_mappings_are_valid_json() {
        for raw in [PICDEXER_MAPPING, SYNC_ON_DATE_MAPPING] {
            let parsed: serde_json::Value = serde_json::from_str(raw).expect("mapping json");
            assert!(parsed["mappings"]["properties"].is_object());
        }
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(Setup::new("not a url").is_err());
    }
}

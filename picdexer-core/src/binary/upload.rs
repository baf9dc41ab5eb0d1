use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use url::Url;

use crate::error::{PicdexerError, Result};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Uploads one binary under its content-addressed key.
#[async_trait]
pub trait BinaryPusher: Send + Sync {
    async fn push(&self, bin: &Path, key: &str) -> Result<()>;
}

/// Multipart upload to `<base>/key/<id>`; the blob store answers
/// `204 No Content` on success.
#[derive(Debug)]
pub struct HttpBinaryPusher {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpBinaryPusher {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        Ok(Self { base_url, client })
    }

    fn upload_url(&self, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PicdexerError::Config(format!("invalid binary url ({})", self.base_url))
            })?
            .pop_if_empty()
            .push("key")
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl BinaryPusher for HttpBinaryPusher {
    async fn push(&self, bin: &Path, key: &str) -> Result<()> {
        let content = tokio::fs::read(bin).await?;
        let form = Form::new().part("file", Part::bytes(content).file_name(key.to_string()));

        let resp = self
            .client
            .post(self.upload_url(key)?)
            .multipart(form)
            .send()
            .await?;

        if resp.status() != StatusCode::NO_CONTENT {
            return Err(PicdexerError::UnexpectedStatus(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Discards binaries; used by the simulate mode.
#[derive(Debug, Default)]
pub struct NopPusher;

#[async_trait]
impl BinaryPusher for NopPusher {
    async fn push(&self, _bin: &Path, _key: &str) -> Result<()> {
        Ok(())
    }
}

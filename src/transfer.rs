use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::ShelfError;

pub trait ArtifactTransport: Send + Sync {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), ShelfError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    max_retries: usize,
}

impl HttpTransport {
    pub fn new(timeout: Duration, max_retries: usize) -> Result<Self, ShelfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("arxiv-shelf/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ShelfError::TransferHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ShelfError::TransferHttp(err.to_string()))?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, ShelfError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "download failed".to_string());
        Err(ShelfError::TransferStatus { status, message })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, ShelfError> {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(ShelfError::TransferHttp(err.to_string()));
                }
            }
        }
    }
}

impl ArtifactTransport for HttpTransport {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), ShelfError> {
        let response = self.send_with_retries(url)?;
        let mut response = Self::handle_status(response)?;

        let parent = destination
            .parent()
            .ok_or_else(|| ShelfError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent).map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".arxiv-shelf-part")
            .tempfile_in(parent)
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut temp)
            .map_err(|err| ShelfError::TransferHttp(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

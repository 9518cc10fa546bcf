use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::PreprintRecord;
use crate::error::ShelfError;

const SESSION_HEADER: &str = "X-Session-Id";

#[derive(Debug, Clone, Deserialize)]
pub struct Bookmark {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookmarkPage {
    #[serde(rename = "maxPage", default)]
    pub max_page: u32,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBookmark {
    pub url: String,
    pub create_archive: bool,
    pub public: u8,
    pub tags: Vec<String>,
    pub title: String,
    pub excerpt: String,
}

impl NewBookmark {
    pub fn from_record(record: &PreprintRecord) -> Self {
        Self {
            url: record.identity().abs_url(),
            create_archive: true,
            public: 1,
            tags: Vec::new(),
            title: record.title().to_string(),
            excerpt: record.summary().to_string(),
        }
    }
}

pub trait BookmarkClient: Send + Sync {
    fn list_page(&self, page: u32) -> Result<BookmarkPage, ShelfError>;
    fn create(&self, bookmark: &NewBookmark) -> Result<(), ShelfError>;
}

pub struct ShioriHttpClient {
    client: Client,
    address: String,
    session: String,
}

impl ShioriHttpClient {
    pub fn login(
        address: &str,
        user: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ShelfError> {
        let client = build_client(timeout)?;
        let address = address.trim_end_matches('/').to_string();
        let response = client
            .post(format!("{address}/api/v1/auth/login"))
            .json(&json!({
                "username": user,
                "password": password,
                "remember": true,
                "owner": true,
            }))
            .send()
            .map_err(|err| ShelfError::BookmarkHttp(err.to_string()))?;
        let body: Value = Self::handle_status(response)?
            .json()
            .map_err(|err| ShelfError::BookmarkAuth(err.to_string()))?;
        let session = body
            .get("message")
            .and_then(|message| message.get("session"))
            .and_then(|value| value.as_str())
            .ok_or_else(|| ShelfError::BookmarkAuth("response has no session id".to_string()))?
            .to_string();
        tracing::debug!("logged in to {address} as {user}");
        Ok(Self {
            client,
            address,
            session,
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
            .unwrap_or_else(|_| "bookmark request failed".to_string());
        Err(ShelfError::BookmarkStatus { status, message })
    }
}

impl BookmarkClient for ShioriHttpClient {
    fn list_page(&self, page: u32) -> Result<BookmarkPage, ShelfError> {
        let page = page.to_string();
        let response = self
            .client
            .get(format!("{}/api/bookmarks", self.address))
            .query(&[
                ("keyword", ""),
                ("tags", ""),
                ("exclude", ""),
                ("page", page.as_str()),
            ])
            .header(SESSION_HEADER, &self.session)
            .send()
            .map_err(|err| ShelfError::BookmarkHttp(err.to_string()))?;
        Self::handle_status(response)?
            .json()
            .map_err(|err| ShelfError::BookmarkHttp(err.to_string()))
    }

    fn create(&self, bookmark: &NewBookmark) -> Result<(), ShelfError> {
        let response = self
            .client
            .post(format!("{}/api/bookmarks", self.address))
            .header(SESSION_HEADER, &self.session)
            .json(bookmark)
            .send()
            .map_err(|err| ShelfError::BookmarkHttp(err.to_string()))?;
        Self::handle_status(response)?;
        Ok(())
    }
}

fn build_client(timeout: Duration) -> Result<Client, ShelfError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("arxiv-shelf/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| ShelfError::BookmarkHttp(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|err| ShelfError::BookmarkHttp(err.to_string()))
}

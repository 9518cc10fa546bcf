use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{PaperIdentity, PreprintRecord};
use crate::error::ShelfError;

pub const ARXIV_API_BASE: &str = "https://export.arxiv.org";

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub entry_id: String,
    pub authors: Vec<String>,
    pub title: String,
    pub summary: String,
    pub pdf_url: Option<String>,
    pub published: String,
}

impl CatalogEntry {
    pub fn into_record(self) -> Result<PreprintRecord, ShelfError> {
        let identity = PaperIdentity::parse(&self.entry_id)?;
        let published = DateTime::parse_from_rfc3339(self.published.trim())
            .map(|value| value.with_timezone(&Utc))
            .map_err(|err| ShelfError::InvalidRecord {
                id: identity.to_string(),
                message: format!("bad publication date {:?}: {err}", self.published),
            })?;
        let url = self
            .pdf_url
            .unwrap_or_else(|| format!("https://arxiv.org/pdf/{identity}"));
        PreprintRecord::new(
            identity,
            self.authors,
            &self.title,
            &url,
            &self.summary,
            published,
        )
    }
}

pub trait CatalogClient: Send + Sync {
    fn lookup(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ShelfError>;
}

pub struct ArxivHttpClient {
    client: Client,
    base_url: String,
    max_retries: usize,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivHttpClient {
    pub fn new(timeout: Duration, max_retries: usize) -> Result<Self, ShelfError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("arxiv-shelf/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ShelfError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| ShelfError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: ARXIV_API_BASE.to_string(),
            max_retries,
            request_delay: Duration::from_secs(3),
            last_request: Mutex::new(None),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    fn query_url(&self) -> String {
        format!("{}/api/query", self.base_url)
    }

    // arXiv asks clients to leave a few seconds between calls.
    fn wait_turn(&self) {
        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                thread::sleep(self.request_delay - elapsed);
            }
        }
        *last = Some(Instant::now());
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
            .unwrap_or_else(|_| "arXiv request failed".to_string());
        Err(ShelfError::CatalogStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, ShelfError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            self.wait_turn();
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && crate::transfer::is_retryable_status(status) {
                        tracing::debug!("arXiv returned {status}, retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && crate::transfer::is_retryable_error(&err) {
                        tracing::debug!("arXiv request failed ({err}), retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(ShelfError::CatalogHttp(err.to_string()));
                }
            }
        }
    }
}

impl CatalogClient for ArxivHttpClient {
    fn lookup(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ShelfError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.query_url();
        let id_list = ids.join(",");
        let max_results = ids.len().to_string();
        let response = self.send_with_retries(|| {
            self.client
                .get(&url)
                .query(&[("id_list", id_list.as_str()), ("max_results", max_results.as_str())])
        })?;
        let body = Self::handle_status(response)?
            .text()
            .map_err(|err| ShelfError::CatalogHttp(err.to_string()))?;
        parse_feed(&body)
    }
}

#[derive(Default)]
struct EntryBuilder {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryBuilder {
    fn finish(self) -> CatalogEntry {
        CatalogEntry {
            entry_id: self.id,
            authors: self.authors,
            title: self.title,
            summary: self.summary,
            pdf_url: self.pdf_url,
            published: self.published,
        }
    }
}

pub fn parse_feed(xml: &str) -> Result<Vec<CatalogEntry>, ShelfError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<EntryBuilder> = None;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                match e.local_name().as_ref() {
                    b"entry" => current = Some(EntryBuilder::default()),
                    b"author" => in_author = true,
                    b"link" => {
                        if let Some(entry) = current.as_mut() {
                            take_pdf_link(&e, entry);
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link"
                    && let Some(entry) = current.as_mut()
                {
                    take_pdf_link(&e, entry);
                }
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|err| ShelfError::CatalogParse(err.to_string()))?;
                text.push_str(&value);
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(t.as_ref()));
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        entries.push(entry.finish());
                    }
                } else if name.as_ref() == b"author" {
                    in_author = false;
                } else if let Some(entry) = current.as_mut() {
                    let value = text.trim().to_string();
                    match name.as_ref() {
                        b"id" => entry.id = value,
                        b"title" => entry.title = value,
                        b"summary" => entry.summary = value,
                        b"published" => entry.published = value,
                        b"name" if in_author && !value.is_empty() => entry.authors.push(value),
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(ShelfError::CatalogParse(format!(
                    "XML error at position {}: {err}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    Ok(entries)
}

fn take_pdf_link(e: &BytesStart<'_>, entry: &mut EntryBuilder) {
    let mut href = None;
    let mut is_pdf = false;
    for attr in e.attributes().flatten() {
        let value = String::from_utf8_lossy(attr.value.as_ref()).to_string();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"title" if value == "pdf" => is_pdf = true,
            _ => {}
        }
    }
    if is_pdf && let Some(href) = href {
        entry.pdf_url = Some(href);
    }
}

pub fn into_records(entries: Vec<CatalogEntry>) -> Vec<PreprintRecord> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let entry_id = entry.entry_id.clone();
            match entry.into_record() {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::debug!("dropping catalog entry {entry_id}: {err}");
                    None
                }
            }
        })
        .collect()
}

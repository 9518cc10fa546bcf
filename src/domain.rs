use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ParseFailure, ShelfError};

static IDENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"(?i)(?P<id>[0-9]{4}\.[0-9]{5})(?:v(?P<ver>[0-9]+))?").unwrap()
    });

static CATALOG_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:.*arxiv\.org/(?:abs|pdf)/)?(?P<id>[0-9]{4}\.[0-9]{5})(?:v(?P<ver>[0-9]+))?(?:\.pdf)?/?$",
    )
    .unwrap()
});

static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*[\r\n]+\s*").unwrap());

/// Equality and hashing only look at the paper id; see
/// [`PaperIdentity::same_version`] when the version matters.
#[derive(Debug, Clone)]
pub struct PaperIdentity {
    paper_id: String,
    version: Option<u32>,
}

impl PaperIdentity {
    pub fn parse(input: &str) -> Result<Self, ShelfError> {
        let mut found: Option<(String, Option<String>)> = None;
        for caps in IDENTITY_RE.captures_iter(input) {
            let id = caps["id"].to_string();
            let ver = caps.name("ver").map(|m| m.as_str().to_string());
            match &found {
                Some((prev, _)) if *prev != id => {
                    return Err(ShelfError::InvalidIdentity {
                        input: input.to_string(),
                        reason: ParseFailure::Ambiguous,
                    });
                }
                Some((_, Some(_))) if ver.is_none() => {}
                _ => found = Some((id, ver)),
            }
        }

        let (paper_id, version) = found.ok_or_else(|| not_an_identity(input))?;
        Ok(Self {
            paper_id,
            version: parse_version(input, version.as_deref())?,
        })
    }

    pub fn from_catalog_link(url: &str) -> Result<Self, ShelfError> {
        let caps = CATALOG_LINK_RE
            .captures(url.trim())
            .ok_or_else(|| not_an_identity(url))?;
        Ok(Self {
            paper_id: caps["id"].to_string(),
            version: parse_version(url, caps.name("ver").map(|m| m.as_str()))?,
        })
    }

    pub fn locate(input: &str) -> Option<(Self, usize)> {
        IDENTITY_RE.captures_iter(input).find_map(|caps| {
            let whole = caps.get(0)?;
            let version = parse_version(input, caps.name("ver").map(|m| m.as_str())).ok()?;
            Some((
                Self {
                    paper_id: caps["id"].to_string(),
                    version,
                },
                whole.end(),
            ))
        })
    }

    pub fn new(paper_id: &str, version: Option<u32>) -> Result<Self, ShelfError> {
        let parsed = Self::parse(paper_id)?;
        if parsed.paper_id != paper_id || parsed.version.is_some() {
            return Err(not_an_identity(paper_id));
        }
        if version == Some(0) {
            return Err(not_an_identity(&format!("{paper_id}v0")));
        }
        Ok(Self {
            paper_id: parsed.paper_id,
            version,
        })
    }

    pub fn paper_id(&self) -> &str {
        &self.paper_id
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    pub fn same_version(&self, other: &PaperIdentity) -> bool {
        self.paper_id == other.paper_id && self.version == other.version
    }

    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.paper_id)
    }
}

impl PartialEq for PaperIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.paper_id == other.paper_id
    }
}

impl Eq for PaperIdentity {}

impl Hash for PaperIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.paper_id.hash(state);
    }
}

impl fmt::Display for PaperIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}v{}", self.paper_id, version),
            None => write!(f, "{}", self.paper_id),
        }
    }
}

impl FromStr for PaperIdentity {
    type Err = ShelfError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

fn not_an_identity(input: &str) -> ShelfError {
    ShelfError::InvalidIdentity {
        input: input.to_string(),
        reason: ParseFailure::NotAnIdentity,
    }
}

fn parse_version(input: &str, raw: Option<&str>) -> Result<Option<u32>, ShelfError> {
    match raw {
        None => Ok(None),
        Some(raw) => match raw.parse::<u32>() {
            Ok(version) if version > 0 => Ok(Some(version)),
            _ => Err(not_an_identity(input)),
        },
    }
}

pub fn collect_identities<'a, I>(inputs: I) -> Vec<PaperIdentity>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    inputs
        .into_iter()
        .filter_map(|input| match PaperIdentity::parse(input) {
            Ok(identity) => Some(identity),
            Err(err) => {
                tracing::debug!("skipping input: {err}");
                None
            }
        })
        .filter(|identity| seen.insert(identity.paper_id().to_string()))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord", into = "StoredRecord")]
pub struct PreprintRecord {
    identity: PaperIdentity,
    authors: Vec<String>,
    title: String,
    url: String,
    summary: String,
    published: DateTime<Utc>,
}

impl PreprintRecord {
    pub fn new(
        identity: PaperIdentity,
        authors: Vec<String>,
        title: &str,
        url: &str,
        summary: &str,
        published: DateTime<Utc>,
    ) -> Result<Self, ShelfError> {
        let authors = authors
            .into_iter()
            .map(|author| author.trim().to_string())
            .filter(|author| !author.is_empty())
            .collect::<Vec<_>>();
        if authors.is_empty() {
            return Err(ShelfError::InvalidRecord {
                id: identity.to_string(),
                message: "record has no authors".to_string(),
            });
        }
        Ok(Self {
            identity,
            authors,
            title: join_lines(title),
            url: url.trim().to_string(),
            summary: join_lines(summary),
            published,
        })
    }

    pub fn identity(&self) -> &PaperIdentity {
        &self.identity
    }

    pub fn paper_id(&self) -> &str {
        self.identity.paper_id()
    }

    pub fn version(&self) -> Option<u32> {
        self.identity.version()
    }

    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn published(&self) -> DateTime<Utc> {
        self.published
    }
}

impl PartialEq for PreprintRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity.same_version(&other.identity)
            && self.authors == other.authors
            && self.title == other.title
            && self.url == other.url
            && self.summary == other.summary
            && self.published == other.published
    }
}

pub fn join_lines(value: &str) -> String {
    LINE_BREAK_RE.replace_all(value.trim(), " ").into_owned()
}

// Field names are the on-disk format of existing stores.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    aid: String,
    authors: Vec<String>,
    title: String,
    url: String,
    summary: String,
    published: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
}

impl TryFrom<StoredRecord> for PreprintRecord {
    type Error = ShelfError;

    fn try_from(value: StoredRecord) -> Result<Self, Self::Error> {
        let identity = PaperIdentity::new(&value.aid, value.version)?;
        PreprintRecord::new(
            identity,
            value.authors,
            &value.title,
            &value.url,
            &value.summary,
            value.published,
        )
    }
}

impl From<PreprintRecord> for StoredRecord {
    fn from(value: PreprintRecord) -> Self {
        Self {
            aid: value.identity.paper_id,
            authors: value.authors,
            title: value.title,
            url: value.url,
            summary: value.summary,
            published: value.published,
            version: value.identity.version,
        }
    }
}

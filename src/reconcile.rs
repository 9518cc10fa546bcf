use std::collections::{HashMap, HashSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::codec;
use crate::domain::PreprintRecord;
use crate::error::ShelfError;

pub const DEFAULT_TITLE_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    #[default]
    Strict,
    LegacyFuzzy { threshold: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    pub path: Utf8PathBuf,
    pub stem: String,
}

impl LocalArtifact {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Option<Self> {
        let path = path.into();
        let stem = path.file_stem()?.to_string();
        Some(Self { path, stem })
    }
}

pub fn scan_artifacts(dir: &Utf8Path, extension: &str) -> Result<Vec<LocalArtifact>, ShelfError> {
    if !dir.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| ShelfError::Filesystem(format!("read {dir}: {err}")))?;
    let mut artifacts = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(path) else {
            tracing::debug!("skipping non-UTF-8 file name in {dir}");
            continue;
        };
        let matches_ext = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches_ext && let Some(artifact) = LocalArtifact::new(path) {
            artifacts.push(artifact);
        }
    }
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DownloadDecision {
    Skip {
        #[serde(serialize_with = "serialize_id")]
        record: PreprintRecord,
        artifact: Utf8PathBuf,
    },
    Fetch {
        #[serde(serialize_with = "serialize_id")]
        record: PreprintRecord,
    },
    Supersede {
        #[serde(serialize_with = "serialize_id")]
        record: PreprintRecord,
        stale: Utf8PathBuf,
    },
}

impl DownloadDecision {
    pub fn record(&self) -> &PreprintRecord {
        match self {
            DownloadDecision::Skip { record, .. }
            | DownloadDecision::Fetch { record }
            | DownloadDecision::Supersede { record, .. } => record,
        }
    }

    pub fn needs_transfer(&self) -> bool {
        !matches!(self, DownloadDecision::Skip { .. })
    }
}

fn serialize_id<S: serde::Serializer>(record: &PreprintRecord, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(record.identity())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadPlan {
    pub decisions: Vec<DownloadDecision>,
}

impl DownloadPlan {
    pub fn skipped(&self) -> usize {
        self.decisions.iter().filter(|d| !d.needs_transfer()).count()
    }

    pub fn to_transfer(&self) -> impl Iterator<Item = &DownloadDecision> {
        self.decisions.iter().filter(|d| d.needs_transfer())
    }
}

pub fn plan<'a, I>(records: I, artifacts: &[LocalArtifact], policy: ReconcilePolicy) -> DownloadPlan
where
    I: IntoIterator<Item = &'a PreprintRecord>,
{
    let decisions = match policy {
        ReconcilePolicy::Strict => plan_strict(records, artifacts),
        ReconcilePolicy::LegacyFuzzy { threshold } => plan_fuzzy(records, artifacts, threshold),
    };
    DownloadPlan { decisions }
}

fn plan_strict<'a, I>(records: I, artifacts: &[LocalArtifact]) -> Vec<DownloadDecision>
where
    I: IntoIterator<Item = &'a PreprintRecord>,
{
    let mut on_disk: HashMap<String, Vec<(Option<u32>, &Utf8PathBuf)>> = HashMap::new();
    for artifact in artifacts {
        if let Some(identity) = codec::decode(&artifact.stem) {
            on_disk
                .entry(identity.paper_id().to_string())
                .or_default()
                .push((identity.version(), &artifact.path));
        }
    }

    records
        .into_iter()
        .map(|record| {
            let present = on_disk.get(record.paper_id()).and_then(|found| {
                found
                    .iter()
                    .find(|(version, _)| *version == record.version())
                    .map(|(_, path)| (*path).clone())
            });
            match present {
                Some(artifact) => DownloadDecision::Skip {
                    record: record.clone(),
                    artifact,
                },
                None => DownloadDecision::Fetch {
                    record: record.clone(),
                },
            }
        })
        .collect()
}

fn plan_fuzzy<'a, I>(
    records: I,
    artifacts: &[LocalArtifact],
    threshold: usize,
) -> Vec<DownloadDecision>
where
    I: IntoIterator<Item = &'a PreprintRecord>,
{
    let decisions = records
        .into_iter()
        .map(|record| decide_fuzzy(record, artifacts, threshold))
        .collect::<Vec<_>>();

    // A file may only be removed when no other decision relies on it.
    let kept = decisions
        .iter()
        .filter_map(|decision| match decision {
            DownloadDecision::Skip { artifact, .. } => Some(artifact.clone()),
            _ => None,
        })
        .collect::<HashSet<_>>();
    let mut claimed = HashSet::new();
    decisions
        .into_iter()
        .map(|decision| match decision {
            DownloadDecision::Supersede { record, stale }
                if kept.contains(&stale) || !claimed.insert(stale.clone()) =>
            {
                tracing::debug!("{stale} is claimed by another paper, not replacing it");
                DownloadDecision::Fetch { record }
            }
            other => other,
        })
        .collect()
}

fn decide_fuzzy(
    record: &PreprintRecord,
    artifacts: &[LocalArtifact],
    threshold: usize,
) -> DownloadDecision {
    let title = codec::sanitize_title(record.title());
    let titled = format!("{} {}", codec::abbreviate_authors(record.authors()), title);

    for artifact in artifacts {
        let other_paper = codec::decode(&artifact.stem)
            .is_some_and(|identity| identity.paper_id() != record.paper_id());
        if other_paper {
            continue;
        }
        let (on_disk_version, fragment) = codec::legacy_fragment(&artifact.stem);
        let distance =
            strsim::levenshtein(fragment, &title).min(strsim::levenshtein(fragment, &titled));
        if distance >= threshold {
            continue;
        }
        return match record.version() {
            Some(version) if on_disk_version != Some(version) => DownloadDecision::Supersede {
                record: record.clone(),
                stale: artifact.path.clone(),
            },
            _ => DownloadDecision::Skip {
                record: record.clone(),
                artifact: artifact.path.clone(),
            },
        };
    }

    DownloadDecision::Fetch {
        record: record.clone(),
    }
}

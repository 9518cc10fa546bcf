use std::collections::HashMap;
use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;

use crate::domain::{PaperIdentity, PreprintRecord};
use crate::error::ShelfError;

pub const DEFAULT_STORE_FILE: &str = "arxiv_db.json";

#[derive(Debug, Clone)]
pub struct PreprintStore {
    path: Utf8PathBuf,
    records: HashMap<String, PreprintRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    pub replaced: usize,
}

impl PreprintStore {
    pub fn default_path() -> Result<Utf8PathBuf, ShelfError> {
        ProjectDirs::from("", "", "arxiv-shelf")
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join(DEFAULT_STORE_FILE)).ok()
            })
            .ok_or_else(|| ShelfError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn empty(path: impl Into<Utf8PathBuf>) -> Result<Self, ShelfError> {
        let path = path.into();
        ensure_json(&path)?;
        Ok(Self {
            path,
            records: HashMap::new(),
        })
    }

    pub fn load(path: impl Into<Utf8PathBuf>) -> Result<Self, ShelfError> {
        let mut store = Self::empty(path)?;
        if !store.path.as_std_path().exists() {
            tracing::info!("no store at {}, starting empty", store.path);
            return Ok(store);
        }

        let content = fs::read(store.path.as_std_path()).map_err(|err| ShelfError::StoreLoad {
            path: store.path.clone().into(),
            message: err.to_string(),
        })?;
        let records: Vec<PreprintRecord> =
            serde_json::from_slice(&content).map_err(|err| ShelfError::StoreLoad {
                path: store.path.clone().into(),
                message: err.to_string(),
            })?;
        for record in records {
            store.records.insert(record.paper_id().to_string(), record);
        }
        tracing::info!("{} entries loaded from {}", store.len(), store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, paper_id: &str) -> bool {
        self.records.contains_key(paper_id)
    }

    pub fn get(&self, paper_id: &str) -> Option<&PreprintRecord> {
        self.records.get(paper_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sorted().into_iter().map(|r| r.paper_id().to_string()).collect()
    }

    /// Upserts by paper id. The incoming record always wins, even when its
    /// version is older than the stored one.
    pub fn merge<I>(&mut self, records: I) -> MergeStats
    where
        I: IntoIterator<Item = PreprintRecord>,
    {
        let mut stats = MergeStats::default();
        for record in records {
            match self.records.insert(record.paper_id().to_string(), record) {
                Some(_) => stats.replaced += 1,
                None => stats.inserted += 1,
            }
        }
        stats
    }

    pub fn missing_from(&self, identities: &[PaperIdentity]) -> Vec<PaperIdentity> {
        identities
            .iter()
            .filter(|identity| !self.contains(identity.paper_id()))
            .cloned()
            .collect()
    }

    pub fn sorted(&self) -> Vec<&PreprintRecord> {
        let mut records = self.records.values().collect::<Vec<_>>();
        records.sort_by(|a, b| {
            a.published()
                .cmp(&b.published())
                .then_with(|| a.paper_id().cmp(b.paper_id()))
        });
        records
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ShelfError> {
        serde_json::to_vec_pretty(&self.sorted())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))
    }

    pub fn save(&self) -> Result<(), ShelfError> {
        self.save_to(&self.path)
    }

    pub fn save_to(&self, destination: &Utf8Path) -> Result<(), ShelfError> {
        ensure_json(destination)?;
        let parent = destination
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;

        let content = self.to_json()?;
        let mut temp = tempfile::Builder::new()
            .prefix(".arxiv-shelf-store")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        temp.write_all(&content)
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        temp.persist(destination.as_std_path())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        tracing::info!("store saved: {} preprints in {}", self.len(), destination);
        Ok(())
    }
}

fn ensure_json(path: &Utf8Path) -> Result<(), ShelfError> {
    if path.extension() != Some("json") {
        return Err(ShelfError::StoreFormat(path.as_std_path().to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(id: &str, day: u32) -> PreprintRecord {
        PreprintRecord::new(
            id.parse().unwrap(),
            vec!["Jane Public".to_string()],
            "Title",
            "https://arxiv.org/pdf/x",
            "Summary",
            Utc.with_ymd_and_hms(2023, 1, day, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_json_path() {
        let err = PreprintStore::empty("db.pickle").unwrap_err();
        assert_matches!(err, ShelfError::StoreFormat(_));
    }

    #[test]
    fn merge_replaces_by_paper_id() {
        let mut store = PreprintStore::empty("db.json").unwrap();
        let stats = store.merge([record("2301.00001v1", 2), record("2301.00002", 1)]);
        assert_eq!(stats, MergeStats { inserted: 2, replaced: 0 });

        let stats = store.merge([record("2301.00001v2", 3)]);
        assert_eq!(stats, MergeStats { inserted: 0, replaced: 1 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("2301.00001").unwrap().version(), Some(2));
    }

    #[test]
    fn sorted_by_publication_date() {
        let mut store = PreprintStore::empty("db.json").unwrap();
        store.merge([record("2301.00003", 9), record("2301.00001", 4), record("2301.00002", 1)]);
        assert_eq!(store.ids(), vec!["2301.00002", "2301.00001", "2301.00003"]);
    }
}

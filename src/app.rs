use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::{BatchReport, BatchSize, chunks};
use crate::bookmarks::{BookmarkClient, NewBookmark};
use crate::catalog::{self, CatalogClient};
use crate::codec;
use crate::domain::{PaperIdentity, PreprintRecord, collect_identities};
use crate::error::ShelfError;
use crate::reconcile::{self, DownloadDecision, ReconcilePolicy};
use crate::store::PreprintStore;
use crate::transfer::ArtifactTransport;

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub received: usize,
    pub rejected: usize,
    pub already_known: usize,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub lookup: BatchReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookmarkSyncResult {
    pub pages: u32,
    pub added: Vec<String>,
    pub lookup: BatchReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUpload {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub uploaded: usize,
    pub failed: Vec<FailedUpload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedTransfer {
    pub id: String,
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub directory: Utf8PathBuf,
    pub planned: usize,
    pub skipped: usize,
    pub downloaded: Vec<String>,
    pub removed: Vec<Utf8PathBuf>,
    pub failed: Vec<FailedTransfer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub store_path: Utf8PathBuf,
    pub entries: usize,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub directory: Utf8PathBuf,
    pub articles: Option<Vec<String>>,
    pub policy: ReconcilePolicy,
    pub check_existing: bool,
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

pub struct App<C: CatalogClient, T: ArtifactTransport> {
    store: PreprintStore,
    catalog: C,
    transport: T,
    batch_size: BatchSize,
}

impl<C: CatalogClient, T: ArtifactTransport> App<C, T> {
    pub fn new(store: PreprintStore, catalog: C, transport: T, batch_size: BatchSize) -> Self {
        Self {
            store,
            catalog,
            transport,
            batch_size,
        }
    }

    pub fn store(&self) -> &PreprintStore {
        &self.store
    }

    pub fn into_store(self) -> PreprintStore {
        self.store
    }

    pub fn ingest(
        &mut self,
        inputs: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, ShelfError> {
        let identities = collect_identities(inputs.iter().map(String::as_str));
        let rejected = inputs
            .iter()
            .filter(|input| PaperIdentity::parse(input).is_err())
            .count();
        let missing = self.store.missing_from(&identities);
        let already_known = identities.len() - missing.len();
        emit(
            sink,
            format!(
                "phase=Resolve; {} new, {already_known} already known, {rejected} rejected",
                missing.len()
            ),
        );

        let mut result = IngestResult {
            received: inputs.len(),
            rejected,
            already_known,
            added: Vec::new(),
            updated: Vec::new(),
            lookup: BatchReport::default(),
        };
        if missing.is_empty() {
            tracing::info!("nothing to add");
            return Ok(result);
        }

        let (records, report) = self.fetch_batches(&missing, sink)?;
        result.added = self.merge_and_save(records, &mut result.updated)?;
        result.lookup = report;
        Ok(result)
    }

    pub fn ingest_links(
        &mut self,
        urls: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, ShelfError> {
        let ids = urls
            .iter()
            .filter_map(|url| PaperIdentity::from_catalog_link(url).ok())
            .map(|identity| identity.paper_id().to_string())
            .collect::<Vec<_>>();
        let mut result = self.ingest(&ids, sink)?;
        result.received = urls.len();
        result.rejected += urls.len() - ids.len();
        Ok(result)
    }

    pub fn update(&mut self, sink: &dyn ProgressSink) -> Result<IngestResult, ShelfError> {
        let ids = self
            .store
            .ids()
            .iter()
            .map(|id| PaperIdentity::parse(id))
            .collect::<Result<Vec<_>, _>>()?;
        let mut result = IngestResult {
            received: ids.len(),
            rejected: 0,
            already_known: 0,
            added: Vec::new(),
            updated: Vec::new(),
            lookup: BatchReport::default(),
        };
        if ids.is_empty() {
            tracing::info!("store is empty, nothing to update");
            return Ok(result);
        }

        let (records, report) = self.fetch_batches(&ids, sink)?;
        result.added = self.merge_and_save(records, &mut result.updated)?;
        result.lookup = report;
        Ok(result)
    }

    /// Walks every bookmark page and adds the arXiv papers found there. The
    /// store is saved after each page, so an interrupted run keeps the pages
    /// already processed.
    pub fn sync_bookmarks<B: BookmarkClient>(
        &mut self,
        bookmarks: &B,
        sink: &dyn ProgressSink,
    ) -> Result<BookmarkSyncResult, ShelfError> {
        let mut result = BookmarkSyncResult {
            pages: 0,
            added: Vec::new(),
            lookup: BatchReport::default(),
        };
        let mut seen = HashSet::new();
        let mut page_number = 1u32;
        let mut page = bookmarks.list_page(page_number)?;
        result.pages = page.max_page;

        loop {
            emit(
                sink,
                format!("phase=Scan; bookmark page {page_number}/{}", result.pages),
            );
            let identities =
                collect_identities(page.bookmarks.iter().map(|bookmark| bookmark.url.as_str()));
            let fresh = self
                .store
                .missing_from(&identities)
                .into_iter()
                .filter(|identity| seen.insert(identity.paper_id().to_string()))
                .collect::<Vec<_>>();

            if !fresh.is_empty() {
                let (records, report) = self.fetch_batches(&fresh, sink)?;
                let mut updated = Vec::new();
                result.added.extend(self.merge_and_save(records, &mut updated)?);
                result.lookup.absorb(report);
            }

            if page_number >= result.pages {
                break;
            }
            page_number += 1;
            page = bookmarks.list_page(page_number)?;
        }

        Ok(result)
    }

    pub fn upload_bookmarks<B: BookmarkClient>(
        &self,
        bookmarks: &B,
        sink: &dyn ProgressSink,
    ) -> UploadResult {
        let records = self.store.sorted();
        let total = records.len();
        let mut result = UploadResult {
            uploaded: 0,
            failed: Vec::new(),
        };
        for (index, record) in records.into_iter().enumerate() {
            emit(
                sink,
                format!("phase=Upload; {}/{total} {}", index + 1, record.paper_id()),
            );
            match bookmarks.create(&NewBookmark::from_record(record)) {
                Ok(()) => result.uploaded += 1,
                Err(err) => {
                    tracing::warn!("bookmark for {} failed: {err}", record.paper_id());
                    result.failed.push(FailedUpload {
                        id: record.paper_id().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        result
    }

    pub fn download(
        &mut self,
        request: DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, ShelfError> {
        let selected = match &request.articles {
            Some(articles) => {
                self.ingest(articles, sink)?;
                let wanted = collect_identities(articles.iter().map(String::as_str));
                Some(
                    wanted
                        .into_iter()
                        .map(|identity| identity.paper_id().to_string())
                        .collect::<HashSet<_>>(),
                )
            }
            None => None,
        };

        fs::create_dir_all(request.directory.as_std_path())
            .map_err(|err| ShelfError::Filesystem(format!("create {}: {err}", request.directory)))?;
        let artifacts = if request.check_existing {
            reconcile::scan_artifacts(&request.directory, &request.extension)?
        } else {
            Vec::new()
        };
        emit(
            sink,
            format!("phase=Plan; {} artifacts on disk", artifacts.len()),
        );

        let records = self
            .store
            .sorted()
            .into_iter()
            .filter(|record| {
                selected
                    .as_ref()
                    .is_none_or(|ids| ids.contains(record.paper_id()))
            })
            .collect::<Vec<_>>();
        let plan = reconcile::plan(records, &artifacts, request.policy);

        let mut result = DownloadResult {
            directory: request.directory.clone(),
            planned: plan.decisions.len(),
            skipped: plan.skipped(),
            downloaded: Vec::new(),
            removed: Vec::new(),
            failed: Vec::new(),
        };
        let pending = plan.to_transfer().collect::<Vec<_>>();
        let total = pending.len();
        tracing::info!("{total} to download, {} already present", result.skipped);

        for (index, decision) in pending.into_iter().enumerate() {
            let record = decision.record();
            let file_name = codec::file_name(record, &request.extension);
            let destination = request.directory.join(&file_name);
            emit(
                sink,
                format!("phase=Download; {}/{total} {}", index + 1, record.identity()),
            );

            if let Err(err) = self
                .transport
                .fetch(record.url(), destination.as_std_path())
            {
                tracing::warn!("download of {} failed: {err}", record.identity());
                result.failed.push(FailedTransfer {
                    id: record.identity().to_string(),
                    file_name,
                    reason: err.to_string(),
                });
                continue;
            }
            result.downloaded.push(record.identity().to_string());

            if let DownloadDecision::Supersede { stale, .. } = decision
                && *stale != destination
            {
                match fs::remove_file(stale.as_std_path()) {
                    Ok(()) => {
                        tracing::info!("removed superseded {stale}");
                        result.removed.push(stale.clone());
                    }
                    Err(err) => tracing::warn!("could not remove {stale}: {err}"),
                }
            }
        }

        Ok(result)
    }

    pub fn info(&self) -> InfoResult {
        let sorted = self.store.sorted();
        InfoResult {
            store_path: self.store.path().to_path_buf(),
            entries: sorted.len(),
            earliest: sorted.first().map(|record| record.published()),
            latest: sorted.last().map(|record| record.published()),
        }
    }

    fn fetch_batches(
        &self,
        identities: &[PaperIdentity],
        sink: &dyn ProgressSink,
    ) -> Result<(Vec<PreprintRecord>, BatchReport), ShelfError> {
        let total = identities.len();
        let mut records = Vec::new();
        let mut report = BatchReport::default();

        for chunk in chunks(identities.iter().cloned(), self.batch_size) {
            let ids = chunk
                .iter()
                .map(|identity| identity.paper_id().to_string())
                .collect::<Vec<_>>();
            let start = std::time::Instant::now();
            let found = catalog::into_records(self.catalog.lookup(&ids)?);
            let batch = BatchReport::account(&chunk, &found);
            report.absorb(batch);
            sink.event(ProgressEvent {
                message: format!("phase=Lookup; {}/{total} returned", report.returned),
                elapsed: Some(start.elapsed()),
            });
            records.extend(found);
        }

        if !report.missing.is_empty() {
            tracing::warn!(
                "{} ids not returned by arXiv: {}",
                report.missing.len(),
                report.missing.join(", ")
            );
        }
        tracing::info!("{} preprints' metadata obtained", records.len());
        Ok((records, report))
    }

    fn merge_and_save(
        &mut self,
        records: Vec<PreprintRecord>,
        updated: &mut Vec<String>,
    ) -> Result<Vec<String>, ShelfError> {
        let mut added = Vec::new();
        for record in &records {
            let id = record.paper_id().to_string();
            if self.store.contains(&id) {
                updated.push(id);
            } else if !added.contains(&id) {
                added.push(id);
            }
        }
        let stats = self.store.merge(records);
        tracing::debug!("merged {} new, {} replaced", stats.inserted, stats.replaced);
        self.store.save()?;
        Ok(added)
    }
}

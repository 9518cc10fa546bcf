use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use arxiv_shelf::app::{App, DownloadRequest};
use arxiv_shelf::batch::BatchSize;
use arxiv_shelf::bookmarks::{Bookmark, BookmarkClient, BookmarkPage, NewBookmark};
use arxiv_shelf::catalog::{CatalogClient, CatalogEntry};
use arxiv_shelf::codec;
use arxiv_shelf::error::ShelfError;
use arxiv_shelf::output::JsonOutput;
use arxiv_shelf::reconcile::{DEFAULT_TITLE_THRESHOLD, ReconcilePolicy};
use arxiv_shelf::store::PreprintStore;
use arxiv_shelf::transfer::ArtifactTransport;

type CallLog = Arc<Mutex<Vec<Vec<String>>>>;

/// Answers every id with version 2, except ids listed in `unknown`.
#[derive(Default)]
struct MockCatalog {
    unknown: HashSet<String>,
    calls: CallLog,
}

impl CatalogClient for MockCatalog {
    fn lookup(&self, ids: &[String]) -> Result<Vec<CatalogEntry>, ShelfError> {
        self.calls.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .filter(|id| !self.unknown.contains(*id))
            .map(|id| CatalogEntry {
                entry_id: format!("http://arxiv.org/abs/{id}v2"),
                authors: vec!["Jane Q. Public".to_string()],
                title: format!("Title of {id}"),
                summary: "Summary".to_string(),
                pdf_url: Some(format!("http://arxiv.org/pdf/{id}v2")),
                published: "2023-01-29T18:00:00Z".to_string(),
            })
            .collect())
    }
}

/// Writes the url into the destination, failing for urls in `broken`.
#[derive(Default)]
struct MockTransport {
    broken: HashSet<String>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl ArtifactTransport for MockTransport {
    fn fetch(&self, url: &str, destination: &Path) -> Result<(), ShelfError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if self.broken.contains(url) {
            return Err(ShelfError::TransferStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        std::fs::write(destination, url).map_err(|err| ShelfError::Filesystem(err.to_string()))
    }
}

/// Five pages of two arXiv bookmarks plus one unrelated link each. `extra`
/// adds a bookmark to one page.
#[derive(Default)]
struct MockBookmarks {
    fail_on: Option<u32>,
    extra: Vec<(u32, String)>,
    created: Mutex<Vec<NewBookmark>>,
}

fn page_ids(page: u32) -> Vec<String> {
    (0..2).map(|n| format!("2301.{:05}", page * 10 + n)).collect()
}

impl BookmarkClient for MockBookmarks {
    fn list_page(&self, page: u32) -> Result<BookmarkPage, ShelfError> {
        if self.fail_on == Some(page) {
            return Err(ShelfError::BookmarkHttp("connection reset".to_string()));
        }
        let mut bookmarks = page_ids(page)
            .into_iter()
            .map(|id| Bookmark {
                url: format!("https://arxiv.org/abs/{id}"),
                title: String::new(),
            })
            .collect::<Vec<_>>();
        for (_, url) in self.extra.iter().filter(|(on, _)| *on == page) {
            bookmarks.push(Bookmark {
                url: url.clone(),
                title: String::new(),
            });
        }
        bookmarks.push(Bookmark {
            url: "https://example.com/blog".to_string(),
            title: "not a paper".to_string(),
        });
        Ok(BookmarkPage {
            max_page: 5,
            bookmarks,
        })
    }

    fn create(&self, bookmark: &NewBookmark) -> Result<(), ShelfError> {
        if bookmark.url.ends_with("00011") {
            return Err(ShelfError::BookmarkStatus {
                status: 500,
                message: "boom".to_string(),
            });
        }
        self.created.lock().unwrap().push(bookmark.clone());
        Ok(())
    }
}

fn store_path(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("arxiv_db.json")).unwrap()
}

fn app_with(
    path: &Utf8PathBuf,
    catalog: MockCatalog,
    transport: MockTransport,
) -> App<MockCatalog, MockTransport> {
    let store = PreprintStore::load(path.clone()).unwrap();
    App::new(store, catalog, transport, BatchSize::default())
}

#[test]
fn ingest_batches_and_skips_known_ids() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let inputs = (0..23).map(|n| format!("2301.{n:05}")).collect::<Vec<_>>();

    let calls = CallLog::default();
    let catalog = MockCatalog {
        calls: calls.clone(),
        ..MockCatalog::default()
    };
    let mut app = app_with(&path, catalog, MockTransport::default());
    let result = app.ingest(&inputs, &JsonOutput).unwrap();
    assert_eq!(result.added.len(), 23);
    let sizes = calls
        .lock()
        .unwrap()
        .iter()
        .map(Vec::len)
        .collect::<Vec<_>>();
    assert_eq!(sizes, vec![10, 10, 3]);

    let calls = CallLog::default();
    let catalog = MockCatalog {
        calls: calls.clone(),
        ..MockCatalog::default()
    };
    let mut again = app_with(&path, catalog, MockTransport::default());
    let result = again.ingest(&inputs, &JsonOutput).unwrap();
    assert_eq!(result.already_known, 23);
    assert!(result.added.is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn ingest_lists_ids_the_catalog_did_not_return() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let catalog = MockCatalog {
        unknown: HashSet::from(["2301.00002".to_string()]),
        ..MockCatalog::default()
    };
    let mut app = app_with(&path, catalog, MockTransport::default());

    let inputs = vec![
        "2301.00001".to_string(),
        "2301.00002".to_string(),
        "https://example.com".to_string(),
    ];
    let result = app.ingest(&inputs, &JsonOutput).unwrap();
    assert_eq!(result.added, vec!["2301.00001"]);
    assert_eq!(result.rejected, 1);
    assert_eq!(result.lookup.missing, vec!["2301.00002"]);
    assert_eq!(PreprintStore::load(path).unwrap().len(), 1);
}

#[test]
fn pocket_links_must_be_canonical() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app_with(
        &store_path(&temp),
        MockCatalog::default(),
        MockTransport::default(),
    );
    let urls = vec![
        "https://arxiv.org/abs/2301.00001".to_string(),
        "https://arxiv.org/pdf/2301.00002v3.pdf".to_string(),
        "https://blog.example.com/notes-on-2301.00003".to_string(),
    ];
    let result = app.ingest_links(&urls, &JsonOutput).unwrap();
    assert_eq!(result.added, vec!["2301.00001", "2301.00002"]);
    assert_eq!(result.rejected, 1);
}

#[test]
fn update_refreshes_every_record() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let mut app = app_with(&path, MockCatalog::default(), MockTransport::default());
    app.ingest(&["2301.00001".to_string()], &JsonOutput).unwrap();

    let result = app.update(&JsonOutput).unwrap();
    assert_eq!(result.updated, vec!["2301.00001"]);
    assert!(result.added.is_empty());
}

#[test]
fn interrupted_bookmark_sync_keeps_finished_pages() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let mut app = app_with(&path, MockCatalog::default(), MockTransport::default());
    let bookmarks = MockBookmarks {
        fail_on: Some(3),
        ..MockBookmarks::default()
    };

    let err = app.sync_bookmarks(&bookmarks, &JsonOutput).unwrap_err();
    assert_matches!(err, ShelfError::BookmarkHttp(_));

    let saved = PreprintStore::load(path).unwrap();
    let mut expected = page_ids(1);
    expected.extend(page_ids(2));
    assert_eq!(saved.ids(), expected);
}

#[test]
fn bookmark_sync_walks_every_page() {
    let temp = tempfile::tempdir().unwrap();
    let calls = CallLog::default();
    let catalog = MockCatalog {
        calls: calls.clone(),
        ..MockCatalog::default()
    };
    let mut app = app_with(&store_path(&temp), catalog, MockTransport::default());

    let result = app
        .sync_bookmarks(&MockBookmarks::default(), &JsonOutput)
        .unwrap();
    assert_eq!(result.pages, 5);
    assert_eq!(result.added.len(), 10);
    assert_eq!(calls.lock().unwrap().len(), 5);
}

#[test]
fn bookmark_sync_asks_for_an_unknown_id_once() {
    let temp = tempfile::tempdir().unwrap();
    let calls = CallLog::default();
    let catalog = MockCatalog {
        unknown: HashSet::from(["2301.99999".to_string()]),
        calls: calls.clone(),
    };
    let mut app = app_with(&store_path(&temp), catalog, MockTransport::default());
    let bookmarks = MockBookmarks {
        extra: vec![
            (1, "https://arxiv.org/abs/2301.99999".to_string()),
            (3, "https://arxiv.org/pdf/2301.99999v2".to_string()),
        ],
        ..MockBookmarks::default()
    };

    let result = app.sync_bookmarks(&bookmarks, &JsonOutput).unwrap();
    assert_eq!(result.added.len(), 10);
    assert_eq!(result.lookup.missing, vec!["2301.99999"]);
    let requests = calls
        .lock()
        .unwrap()
        .iter()
        .flatten()
        .filter(|id| id.as_str() == "2301.99999")
        .count();
    assert_eq!(requests, 1);
}

#[test]
fn upload_collects_failures() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app_with(
        &store_path(&temp),
        MockCatalog::default(),
        MockTransport::default(),
    );
    app.ingest(&page_ids(1), &JsonOutput).unwrap();

    let bookmarks = MockBookmarks::default();
    let result = app.upload_bookmarks(&bookmarks, &JsonOutput);
    assert_eq!(result.uploaded, 1);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].id, "2301.00011");
    let created = bookmarks.created.lock().unwrap();
    assert_eq!(created[0].url, "https://arxiv.org/abs/2301.00010");
}

#[test]
fn download_skips_present_and_reports_failures() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("papers")).unwrap();

    let mut seed = app_with(&path, MockCatalog::default(), MockTransport::default());
    seed.ingest(
        &["2301.00001".to_string(), "2301.00002".to_string(), "2301.00003".to_string()],
        &JsonOutput,
    )
    .unwrap();
    let present = codec::file_name(seed.store().get("2301.00001").unwrap(), "pdf");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(&present), b"%PDF").unwrap();

    let fetched = Arc::new(Mutex::new(Vec::new()));
    let transport = MockTransport {
        broken: HashSet::from(["http://arxiv.org/pdf/2301.00003v2".to_string()]),
        fetched: fetched.clone(),
    };
    let mut app = app_with(&path, MockCatalog::default(), transport);
    let request = DownloadRequest {
        directory: dir.clone(),
        articles: None,
        policy: ReconcilePolicy::Strict,
        check_existing: true,
        extension: "pdf".to_string(),
    };
    let result = app.download(request, &JsonOutput).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.downloaded, vec!["2301.00002v2"]);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].id, "2301.00003v2");
    assert_eq!(fetched.lock().unwrap().len(), 2);
    assert_eq!(app.store().len(), 3);
}

#[test]
fn legacy_download_replaces_stale_version() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("papers")).unwrap();
    std::fs::create_dir_all(&dir).unwrap();
    let stale = dir.join("2301.00001v1 Title of 2301.00001.pdf");
    std::fs::write(&stale, b"%PDF").unwrap();

    let mut app = app_with(&path, MockCatalog::default(), MockTransport::default());
    let request = DownloadRequest {
        directory: dir.clone(),
        articles: Some(vec!["2301.00001".to_string()]),
        policy: ReconcilePolicy::LegacyFuzzy {
            threshold: DEFAULT_TITLE_THRESHOLD,
        },
        check_existing: true,
        extension: "pdf".to_string(),
    };
    let result = app.download(request, &JsonOutput).unwrap();

    assert_eq!(result.downloaded, vec!["2301.00001v2"]);
    assert_eq!(result.removed, vec![stale.clone()]);
    assert!(!stale.exists());
    let fresh = codec::file_name(app.store().get("2301.00001").unwrap(), "pdf");
    assert!(dir.join(fresh).exists());
}

#[test]
fn failed_supersede_keeps_stale_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("papers")).unwrap();
    std::fs::create_dir_all(&dir).unwrap();
    let stale = dir.join("2301.00001v1 Title of 2301.00001.pdf");
    std::fs::write(&stale, b"%PDF").unwrap();

    let transport = MockTransport {
        broken: HashSet::from(["http://arxiv.org/pdf/2301.00001v2".to_string()]),
        ..MockTransport::default()
    };
    let mut app = app_with(&path, MockCatalog::default(), transport);
    let request = DownloadRequest {
        directory: dir,
        articles: Some(vec!["2301.00001".to_string()]),
        policy: ReconcilePolicy::LegacyFuzzy {
            threshold: DEFAULT_TITLE_THRESHOLD,
        },
        check_existing: true,
        extension: "pdf".to_string(),
    };
    let result = app.download(request, &JsonOutput).unwrap();

    assert_eq!(result.failed.len(), 1);
    assert!(result.removed.is_empty());
    assert!(stale.exists());
}

#[test]
fn info_reports_range() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let mut app = app_with(&path, MockCatalog::default(), MockTransport::default());
    assert_eq!(app.info().entries, 0);
    assert!(app.info().earliest.is_none());

    app.ingest(&["2301.00001".to_string()], &JsonOutput).unwrap();
    let info = app.info();
    assert_eq!(info.entries, 1);
    assert_eq!(info.store_path, path);
    assert_eq!(info.earliest, info.latest);
}

#[test]
fn legacy_download_keeps_a_similar_papers_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = store_path(&temp);
    let dir = Utf8PathBuf::from_path_buf(temp.path().join("papers")).unwrap();

    let mut app = app_with(&path, MockCatalog::default(), MockTransport::default());
    app.ingest(
        &["2301.00001".to_string(), "2301.00002".to_string()],
        &JsonOutput,
    )
    .unwrap();
    let present = dir.join(codec::file_name(app.store().get("2301.00001").unwrap(), "pdf"));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(&present, b"%PDF").unwrap();

    let request = DownloadRequest {
        directory: dir,
        articles: None,
        policy: ReconcilePolicy::LegacyFuzzy {
            threshold: DEFAULT_TITLE_THRESHOLD,
        },
        check_existing: true,
        extension: "pdf".to_string(),
    };
    let result = app.download(request, &JsonOutput).unwrap();

    assert_eq!(result.skipped, 1);
    assert_eq!(result.downloaded, vec!["2301.00002v2"]);
    assert!(result.removed.is_empty());
    assert!(present.exists());
}

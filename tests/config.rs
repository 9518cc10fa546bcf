use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use arxiv_shelf::config::{Config, ConfigLoader, Overrides};
use arxiv_shelf::error::ShelfError;

fn write_config(temp: &tempfile::TempDir, body: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(temp.path().join("arxiv-shelf.json")).unwrap();
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn file_values_are_used() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(
        &temp,
        r#"{
            "store_path": "/data/papers/arxiv_db.json",
            "batch_size": 25,
            "download_dir": "/data/papers/pdf",
            "legacy_title_threshold": 3,
            "bookmarks": { "address": "http://localhost:8080", "user": "reader" }
        }"#,
    );

    let resolved = ConfigLoader::resolve(Some(path.as_str()), Overrides::default()).unwrap();
    assert_eq!(resolved.store_path, "/data/papers/arxiv_db.json");
    assert_eq!(resolved.batch_size.get(), 25);
    assert_eq!(
        resolved.download_dir.as_ref().map(|dir| dir.as_str()),
        Some("/data/papers/pdf")
    );
    assert_eq!(resolved.legacy_title_threshold, 3);
    assert_eq!(resolved.max_retries, 3);
    assert_eq!(resolved.bookmarks.user.as_deref(), Some("reader"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(missing.to_str(), Overrides::default()).unwrap_err();
    assert_matches!(err, ShelfError::ConfigRead(_));
}

#[test]
fn unknown_fields_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_config(&temp, r#"{ "batchsize": 5 }"#);
    let err = ConfigLoader::resolve(Some(path.as_str()), Overrides::default()).unwrap_err();
    assert_matches!(err, ShelfError::ConfigParse(_));
}

#[test]
fn store_must_be_json() {
    let config = Config {
        store_path: Some("papers.db".into()),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config, Overrides::default()).unwrap_err();
    assert_matches!(err, ShelfError::StoreFormat(_));
}

#[test]
fn zero_timeout_is_invalid() {
    let config = Config {
        store_path: Some("db.json".into()),
        request_timeout_secs: Some(0),
        ..Config::default()
    };
    let err = ConfigLoader::resolve_config(config, Overrides::default()).unwrap_err();
    assert_matches!(err, ShelfError::InvalidConfig(_));
}

use std::fs;

use camino::Utf8Path;
use serde_pickle::{DeOptions, HashableValue, Value};

use crate::error::ShelfError;

pub fn read_separated(path: &Utf8Path, sep: &str) -> Result<Vec<String>, ShelfError> {
    let text = fs::read_to_string(path.as_std_path()).map_err(|err| import_error(path, err))?;
    Ok(text
        .split(sep)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn read_pocket_csv(path: &Utf8Path) -> Result<Vec<String>, ShelfError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_std_path())
        .map_err(|err| import_error(path, err))?;
    let headers = reader.headers().map_err(|err| import_error(path, err))?;
    let url_column = headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case("url"))
        .ok_or_else(|| ShelfError::Import {
            path: path.as_std_path().to_path_buf(),
            message: "no url column".to_string(),
        })?;

    let mut urls = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|err| import_error(path, err))?;
        if let Some(url) = row.get(url_column) {
            urls.push(url.trim().to_string());
        }
    }
    Ok(urls)
}

pub fn read_legacy_pickle(path: &Utf8Path) -> Result<Vec<String>, ShelfError> {
    let bytes = fs::read(path.as_std_path()).map_err(|err| import_error(path, err))?;
    let value = serde_pickle::value_from_slice(&bytes, DeOptions::new())
        .map_err(|err| import_error(path, err))?;

    let ids = match value {
        Value::Dict(map) => map.into_keys().filter_map(hashable_text).collect(),
        Value::Set(items) | Value::FrozenSet(items) => {
            items.into_iter().filter_map(hashable_text).collect()
        }
        Value::List(items) | Value::Tuple(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => {
            return Err(ShelfError::Import {
                path: path.as_std_path().to_path_buf(),
                message: "expected a dict, list or set of ids".to_string(),
            });
        }
    };
    Ok(ids)
}

fn hashable_text(value: HashableValue) -> Option<String> {
    match value {
        HashableValue::String(text) => Some(text),
        HashableValue::Bytes(bytes) => String::from_utf8(bytes).ok(),
        _ => None,
    }
}

fn import_error(path: &Utf8Path, err: impl std::fmt::Display) -> ShelfError {
    ShelfError::Import {
        path: path.as_std_path().to_path_buf(),
        message: err.to_string(),
    }
}

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no arXiv identifier found")]
    NotAnIdentity,
    #[error("more than one arXiv identifier found")]
    Ambiguous,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ShelfError {
    #[error("invalid arXiv identifier {input:?}: {reason}")]
    InvalidIdentity { input: String, reason: ParseFailure },

    #[error("invalid record {id}: {message}")]
    InvalidRecord { id: String, message: String },

    #[error("failed to load store at {path}: {message}")]
    #[diagnostic(help("the store file is corrupt; fix or move it away before retrying"))]
    StoreLoad { path: PathBuf, message: String },

    #[error("store must be a .json file: {0}")]
    StoreFormat(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("arXiv request failed: {0}")]
    CatalogHttp(String),

    #[error("arXiv returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("failed to parse arXiv response: {0}")]
    CatalogParse(String),

    #[error("bookmark request failed: {0}")]
    BookmarkHttp(String),

    #[error("bookmark server returned status {status}: {message}")]
    BookmarkStatus { status: u16, message: String },

    #[error("bookmark login failed: {0}")]
    BookmarkAuth(String),

    #[error("download failed: {0}")]
    TransferHttp(String),

    #[error("download returned status {status}: {message}")]
    TransferStatus { status: u16, message: String },

    #[error("failed to import {path}: {message}")]
    Import { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

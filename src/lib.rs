pub mod app;
pub mod batch;
pub mod bookmarks;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod importers;
pub mod output;
pub mod reconcile;
pub mod store;
pub mod transfer;

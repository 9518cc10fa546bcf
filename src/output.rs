use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    BookmarkSyncResult, DownloadResult, InfoResult, IngestResult, ProgressEvent, ProgressSink,
    UploadResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_ingest(result: &IngestResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sync(result: &BookmarkSyncResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_upload(result: &UploadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => tracing::info!("{}", event.message),
        }
    }
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub fn print_ingest_summary(result: &IngestResult) {
    println!("{CYAN}arxiv-shelf summary{RESET}");
    println!("{GREEN}added: {}{RESET}", result.added.len());
    if !result.updated.is_empty() {
        println!("{GREEN}refreshed: {}{RESET}", result.updated.len());
    }
    if result.already_known > 0 {
        println!("already in store: {}", result.already_known);
    }
    if result.rejected > 0 {
        println!("{YELLOW}not an arXiv id: {}{RESET}", result.rejected);
    }
    if !result.lookup.missing.is_empty() {
        println!(
            "{YELLOW}not returned by arXiv: {}{RESET}",
            result.lookup.missing.join(", ")
        );
    }
}

pub fn print_sync_summary(result: &BookmarkSyncResult) {
    println!("{CYAN}bookmark pages scanned: {}{RESET}", result.pages);
    println!("{GREEN}added: {}{RESET}", result.added.len());
    if !result.lookup.missing.is_empty() {
        println!(
            "{YELLOW}not returned by arXiv: {}{RESET}",
            result.lookup.missing.join(", ")
        );
    }
}

pub fn print_upload_summary(result: &UploadResult) {
    println!("{GREEN}uploaded bookmarks: {}{RESET}", result.uploaded);
    for failed in &result.failed {
        println!("{RED}failed {}: {}{RESET}", failed.id, failed.reason);
    }
}

pub fn print_download_summary(result: &DownloadResult) {
    println!("{CYAN}{}{RESET}", result.directory);
    println!(
        "{GREEN}downloaded: {} of {} (already present: {}){RESET}",
        result.downloaded.len(),
        result.planned - result.skipped,
        result.skipped
    );
    for removed in &result.removed {
        println!("{YELLOW}removed old version {removed}{RESET}");
    }
    if !result.failed.is_empty() {
        println!("{RED}failed downloads:{RESET}");
        for failed in &result.failed {
            println!("{RED}  {} ({}): {}{RESET}", failed.id, failed.file_name, failed.reason);
        }
    }
}

pub fn print_info_summary(result: &InfoResult) {
    println!("{CYAN}store: {}{RESET}", result.store_path);
    println!("entries: {}", result.entries);
    if let (Some(earliest), Some(latest)) = (result.earliest, result.latest) {
        println!(
            "published: {} .. {}",
            earliest.format("%Y-%m-%d"),
            latest.format("%Y-%m-%d")
        );
    }
}

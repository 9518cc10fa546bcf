use crate::domain::{PaperIdentity, PreprintRecord};

const MAX_LISTED_AUTHORS: usize = 3;

pub fn encode(record: &PreprintRecord) -> String {
    format!(
        "[{}] {} {}",
        record.identity(),
        abbreviate_authors(record.authors()),
        sanitize_title(record.title())
    )
}

pub fn file_name(record: &PreprintRecord, extension: &str) -> String {
    format!("{}.{}", encode(record), extension)
}

pub fn decode(stem: &str) -> Option<PaperIdentity> {
    let stem = stem.trim();
    match stem.strip_prefix('[') {
        Some(rest) => {
            let (segment, _) = rest.split_once(']')?;
            PaperIdentity::parse(segment).ok()
        }
        // Names saved straight from arxiv.org, e.g. `2301.12345v2`.
        None => PaperIdentity::parse(stem).ok(),
    }
}

pub fn abbreviate_authors(authors: &[String]) -> String {
    let mut parts = authors
        .iter()
        .take(MAX_LISTED_AUTHORS)
        .filter_map(|author| abbreviate_author(author))
        .collect::<Vec<_>>();
    if authors.len() > MAX_LISTED_AUTHORS {
        parts.push("etc.".to_string());
    }
    parts.join(", ")
}

fn abbreviate_author(author: &str) -> Option<String> {
    let tokens = author.split_whitespace().collect::<Vec<_>>();
    let first = tokens.first()?;
    let last = tokens.last()?;
    let initial = first.chars().next()?.to_uppercase().collect::<String>();
    Some(format!("{}, {}.", capitalize(last), initial))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(head) => head
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

pub fn sanitize_title(title: &str) -> String {
    let cleaned = title
        .replace(':', ".")
        .replace(['\t', '/'], " ")
        .replace(['\n', '\r'], "");
    match cleaned.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => cleaned,
    }
}

/// Splits a pre-canonical filename into the version token found after the
/// paper id and the free text that follows it. Names without any id are
/// returned whole.
pub fn legacy_fragment(stem: &str) -> (Option<u32>, &str) {
    match PaperIdentity::locate(stem) {
        Some((identity, end)) => {
            let rest = stem[end..].trim_start_matches([']', ')', ' ', '_', '-', '\t']);
            (identity.version(), rest.trim_end())
        }
        None => (None, stem.trim()),
    }
}

use std::num::NonZeroUsize;

use serde::Serialize;

use crate::domain::{PaperIdentity, PreprintRecord};
use crate::error::ShelfError;

pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(NonZeroUsize);

impl BatchSize {
    pub fn new(size: usize) -> Result<Self, ShelfError> {
        NonZeroUsize::new(size)
            .map(Self)
            .ok_or_else(|| ShelfError::InvalidConfig("batch size must be positive".to_string()))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

pub struct Chunks<I> {
    inner: I,
    size: usize,
}

impl<I: Iterator> Iterator for Chunks<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.inner.by_ref().take(self.size).collect::<Vec<_>>();
        (!chunk.is_empty()).then_some(chunk)
    }
}

pub fn chunks<I: IntoIterator>(items: I, size: BatchSize) -> Chunks<I::IntoIter> {
    Chunks {
        inner: items.into_iter(),
        size: size.get(),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub requested: usize,
    pub returned: usize,
    pub missing: Vec<String>,
}

impl BatchReport {
    pub fn account(requested: &[PaperIdentity], records: &[PreprintRecord]) -> Self {
        let missing = requested
            .iter()
            .filter(|id| !records.iter().any(|r| r.paper_id() == id.paper_id()))
            .map(|id| id.paper_id().to_string())
            .collect();
        Self {
            requested: requested.len(),
            returned: records.len(),
            missing,
        }
    }

    pub fn absorb(&mut self, other: BatchReport) {
        self.requested += other.requested;
        self.returned += other.returned;
        self.missing.extend(other.missing);
    }
}

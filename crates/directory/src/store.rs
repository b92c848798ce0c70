use std::sync::Arc;

use shared::domain::{Lawyer, LawyerId};
use tokio::sync::watch;
use tracing::debug;

use crate::{
    engine,
    query::{DirectoryQuery, FilterPatch, LawyerFilters, SortDirection, SortKey, SortOrder},
};

/// Snapshot published to subscribers after every mutation.
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    /// Incremented on every recompute.
    pub revision: u64,
    pub lawyers: Arc<Vec<Lawyer>>,
}

/// Owns the lawyer collection plus the last applied query, and keeps the
/// visible set in sync with both.
pub struct DirectoryStore {
    lawyers: Vec<Lawyer>,
    query: DirectoryQuery,
    visible: VisibleSet,
    publisher: watch::Sender<VisibleSet>,
}

impl Default for DirectoryStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DirectoryStore {
    pub fn new(lawyers: Vec<Lawyer>) -> Self {
        let (publisher, _) = watch::channel(VisibleSet::default());
        let mut store = Self {
            lawyers,
            query: DirectoryQuery::default(),
            visible: VisibleSet::default(),
            publisher,
        };
        store.recompute();
        store
    }

    pub fn subscribe(&self) -> watch::Receiver<VisibleSet> {
        self.publisher.subscribe()
    }

    pub fn all(&self) -> &[Lawyer] {
        &self.lawyers
    }

    pub fn visible(&self) -> &[Lawyer] {
        &self.visible.lawyers
    }

    pub fn revision(&self) -> u64 {
        self.visible.revision
    }

    pub fn filters(&self) -> &LawyerFilters {
        &self.query.filters
    }

    pub fn sort(&self) -> SortOrder {
        self.query.sort
    }

    pub fn search(&self) -> &str {
        &self.query.search
    }

    pub fn query(&self) -> &DirectoryQuery {
        &self.query
    }

    pub fn find(&self, id: LawyerId) -> Option<&Lawyer> {
        self.lawyers.iter().find(|lawyer| lawyer.id == id)
    }

    pub fn set_collection(&mut self, lawyers: Vec<Lawyer>) {
        self.lawyers = lawyers;
        self.recompute();
    }

    pub fn set_filters(&mut self, patch: FilterPatch) {
        self.query.filters.merge(patch);
        self.recompute();
    }

    pub fn reset_filters(&mut self) {
        self.query.filters = LawyerFilters::default();
        self.recompute();
    }

    pub fn set_sort(&mut self, key: SortKey, direction: SortDirection) {
        self.query.sort = SortOrder { key, direction };
        self.recompute();
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.query.search = text.into();
        self.recompute();
    }

    fn recompute(&mut self) {
        let lawyers = engine::apply(&self.lawyers, &self.query);
        self.visible = VisibleSet {
            revision: self.visible.revision + 1,
            lawyers: Arc::new(lawyers),
        };
        debug!(
            revision = self.visible.revision,
            total = self.lawyers.len(),
            visible = self.visible.lawyers.len(),
            "directory view recomputed"
        );
        self.publisher.send_replace(self.visible.clone());
    }
}

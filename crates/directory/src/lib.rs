//! In-memory lawyer directory: query model, filter/sort engine and the store
//! that keeps the visible set current.

pub mod engine;
pub mod fixtures;
pub mod query;
pub mod store;

pub use query::{
    DirectoryQuery, FilterPatch, LawyerFilters, SortDirection, SortKey, SortOrder, ValueRange,
};
pub use store::{DirectoryStore, VisibleSet};

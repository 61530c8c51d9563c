//! Persistence and outbound HTTP for medmon.

pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod pg;
pub mod store;

pub const CRATE_NAME: &str = "medmon-storage";

pub use http::{
    BackoffPolicy, FetchError, FetchedResponse, HttpClientConfig, HttpFetcher, PageFetcher,
    DEFAULT_USER_AGENT,
};
#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;
pub use pg::{Database, DatabaseConfig, PgMediaStore};
pub use store::{InsertOutcome, MediaStore, SqlValue, StoreError, StoreResult, UpsertSpec};

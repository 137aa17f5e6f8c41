//! docshelf - docset registry and search index
//!
//! Discovers, downloads, installs, indexes and searches offline
//! documentation bundles ("docsets").
//!
//! ```text
//! Feed (JSON/YAML/Dash XML)
//!     │  fetch_feed
//!     ▼
//! Registry::install ──► download ──► extract ──► index ──► activate
//!                                                             │
//!                                              catalog snapshot (ArcSwap)
//!                                                             │
//!                                                             ▼
//!                                                       SearchEngine
//! ```

pub mod archive;
pub mod catalog;
pub mod config;
pub mod docset;
pub mod error;
pub mod feed;
pub mod registry;
pub mod search;

pub use catalog::{Catalog, SharedCatalog};
pub use config::{Config, FeedSource, Settings};
pub use docset::{BundleLayout, Docset, DocsetIndex, DocsetMetadata, SymbolCategory, SymbolEntry};
pub use error::{DocsetError, ErrorKind, Result};
pub use feed::{FeedEntry, Fetcher, HttpFetcher};
pub use registry::{
    Activity, DocsetState, InstallJob, JobKind, JobPhase, JobProgress, LocalStorage, Registry,
    StorageBackend,
};
pub use search::{SearchEngine, SearchOptions, SearchQuery, SearchResult};

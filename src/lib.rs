//! stac-crawler: a concurrent crawler for STAC catalogs
//!
//! This crate walks trees of [STAC](https://stacspec.org/) resources --
//! catalogs, collections, and items -- published either as static JSON files
//! (on disk or behind a plain HTTP server) or by a dynamic STAC / OGC API
//! endpoint. A caller-supplied [`Visitor`] is invoked once per discovered
//! resource; traversal is driven by the links in each document and runs on a
//! bounded pool of concurrent workers.
//!
//! Resources are kept as untyped JSON maps throughout: the STAC extension
//! ecosystem is too open-ended for a closed set of structs, so the
//! [`Resource`] view exposes tolerant accessors instead.

pub mod crawler;
pub mod locator;
pub mod resource;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error("cannot crawl file {location} in non-file mode")]
    FileModeViolation { location: String },

    #[error("cannot crawl URL {location} in file mode")]
    UrlModeViolation { location: String },

    #[error("unexpected response for {location}: {status}")]
    UnexpectedStatus { location: String, status: u16 },

    #[error("request for {location} failed: {source}")]
    Http {
        location: String,
        source: reqwest::Error,
    },

    #[error("failed to read file {location}: {source}")]
    Read {
        location: String,
        source: std::io::Error,
    },

    #[error("failed to parse {location}: {source}")]
    Decode {
        location: String,
        source: serde_json::Error,
    },

    #[error("missing self link for {kind} {index} in {location}")]
    MissingSelfLink {
        kind: String,
        index: usize,
        location: String,
    },

    #[error("missing items link for collection {index} in {location}")]
    MissingItemsLink { index: usize, location: String },

    #[error("expected {expected} at index {index}, got {actual}")]
    UnexpectedResourceType {
        expected: &'static str,
        actual: String,
        index: usize,
    },

    #[error("failed to resolve working directory: {0}")]
    WorkingDir(#[source] std::io::Error),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("crawl cancelled")]
    Cancelled,

    /// Sentinel returned by a visitor to prune the subtree below the current
    /// resource without stopping the crawl.
    #[error("stop recursion")]
    StopRecursion,

    #[error("{0}")]
    Visitor(String),
}

/// Locator-specific errors
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("expected absolute path, got {0}")]
    ExpectedAbsolutePath(String),

    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),

    #[error("failed to parse {input}: {source}")]
    Parse {
        input: String,
        source: url::ParseError,
    },

    #[error("cannot convert {0} to a file path")]
    InvalidFileUrl(String),

    #[error("missing url")]
    MissingUrl,

    #[error("file flag mismatch for {0}")]
    FileFlagMismatch(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for locator operations
pub type LocatorResult<T> = std::result::Result<T, LocatorError>;

// Re-export commonly used types
pub use crawler::{
    crawl, Crawler, CrawlerOptions, ErrorHandler, Filter, MemoryQueue, ResourceInfo, Task,
    TaskHandler, TaskKind, TaskQueue, Visitor,
};
pub use locator::Locator;
pub use resource::{Asset, Link, Links, Resource, ResourceType};

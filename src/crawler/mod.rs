//! Crawler module for STAC resource traversal
//!
//! This module contains the core crawling machinery:
//! - Resource loading with mode checks and HTTP retry logic
//! - Serializable tasks and the pluggable work queue
//! - The traversal engine dispatching visitor callbacks

mod coordinator;
mod loader;
pub mod queue;

pub use coordinator::{
    crawl, Crawler, CrawlerOptions, ErrorHandler, Filter, ResourceInfo, Visitor,
};
pub use queue::{MemoryQueue, Task, TaskHandler, TaskKind, TaskQueue};

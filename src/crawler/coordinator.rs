//! Crawl coordination
//!
//! The [`Crawler`] consumes tasks from the queue, loads each resource, hands
//! it to the visitor, and derives follow-up tasks from the resource's links.
//! Four task kinds cover the territory: plain resources for static trees,
//! and collections/children/features pages for STAC API endpoints.
//!
//! Link rules for a `resource` task are a priority cascade; the first rule
//! that applies stops the rest:
//!
//! 1. API root with conformance classes and a `data` link -> one
//!    `collections` task.
//! 2. API root with conformance classes and a `children` link -> one
//!    `children` task.
//! 3. Collection with an `items` link -> one `features` task (with a
//!    pagination hint appended).
//! 4. Otherwise, every JSON-ish `item`/`child` link -> a `resource` task.

use std::sync::Arc;
use std::thread;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::crawler::loader::Loader;
use crate::crawler::queue::{MemoryQueue, Task, TaskHandler, TaskKind, TaskQueue};
use crate::locator::{clean_path, Locator};
use crate::resource::links::{
    any_json, application_json, geo_json, no_media_type, LinkMatcher,
};
use crate::resource::{ChildrenPage, CollectionsPage, FeaturesPage, Resource, ResourceType};
use crate::{CrawlError, LocatorError, Result};

/// Accepted media types for generic JSON links, in priority order.
const JSON_LINK_TYPES: &[LinkMatcher] = &[application_json, any_json, no_media_type];

/// Accepted media types for item-bearing links, in priority order.
const ITEM_LINK_TYPES: &[LinkMatcher] = &[geo_json, application_json, any_json, no_media_type];

/// Pagination hint appended to `items` links.
const ITEMS_PAGE_LIMIT: &str = "250";

/// Context handed to the visitor alongside each resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    /// The URL or file path of the resource.
    pub location: String,

    /// The URL or file path of the initial resource the crawl started from.
    pub entry: String,
}

/// Called once for each resource during crawling.
///
/// Visitors run on arbitrary worker tasks and must be safe for concurrent
/// invocation. Returning [`CrawlError::StopRecursion`] prunes the subtree
/// below the current resource; any other error is routed through the crawl's
/// error handler.
pub trait Visitor: Send + Sync {
    fn visit(&self, resource: &Resource, info: &ResourceInfo) -> Result<()>;
}

impl<F> Visitor for F
where
    F: Fn(&Resource, &ResourceInfo) -> Result<()> + Send + Sync,
{
    fn visit(&self, resource: &Resource, info: &ResourceInfo) -> Result<()> {
        self(resource, info)
    }
}

/// Limits which resources are crawled, by location string.
pub type Filter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Per-error policy hook.
///
/// Called with every error the crawl produces. Returning `Ok(())` swallows
/// the error and lets the crawl continue, skipping the affected subtree;
/// returning an error aborts the whole crawl. The default propagates
/// unchanged, making failures fail-fast.
pub type ErrorHandler = Arc<dyn Fn(CrawlError) -> Result<()> + Send + Sync>;

/// Options for creating a crawler.
#[derive(Clone, Default)]
pub struct CrawlerOptions {
    /// Number of resources to visit concurrently. Defaults to the available
    /// parallelism.
    pub concurrency: Option<usize>,

    /// Optional predicate over the URL or absolute path of a resource before
    /// it is crawled. Returning false skips the resource entirely: it is
    /// neither read nor visited.
    pub filter: Option<Filter>,

    /// Optional error policy; see [`ErrorHandler`].
    pub error_handler: Option<ErrorHandler>,

    /// Optional queue for crawling tasks. When a crawl runs across multiple
    /// processes, provide a queue shared between them; by default an
    /// in-memory queue is used.
    pub queue: Option<Arc<dyn TaskQueue>>,

    /// HTTP client for URL crawls. A shared default client is used when
    /// unset.
    pub client: Option<reqwest::Client>,

    /// Cancellation signal honored at every suspension point.
    pub cancel: Option<CancellationToken>,
}

/// Crawls STAC resources.
pub struct Crawler {
    queue: Arc<dyn TaskQueue>,
}

struct Engine {
    visitor: Arc<dyn Visitor>,
    filter: Option<Filter>,
    error_handler: ErrorHandler,
    loader: Loader,
}

impl Crawler {
    /// Creates a crawler.
    ///
    /// The visitor is called for each resource added and for every further
    /// resource linked from it.
    pub fn new<V: Visitor + 'static>(visitor: V, options: CrawlerOptions) -> Self {
        let concurrency = options
            .concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()));
        let cancel = options.cancel.unwrap_or_default();
        let queue: Arc<dyn TaskQueue> = options
            .queue
            .unwrap_or_else(|| Arc::new(MemoryQueue::new(cancel, concurrency)));

        let engine = Arc::new(Engine {
            visitor: Arc::new(visitor),
            filter: options.filter,
            error_handler: options
                .error_handler
                .unwrap_or_else(|| Arc::new(|error| Err(error))),
            loader: Loader::new(options.client),
        });

        let handler: TaskHandler = Arc::new(move |task| {
            let engine = Arc::clone(&engine);
            async move { engine.execute(task).await }.boxed()
        });
        queue.handle(handler);

        Self { queue }
    }

    /// Adds a resource entry to crawl.
    ///
    /// The entry can be a file path or a URL; relative paths are resolved
    /// against the working directory. The entry's mode (file vs URL) fixes
    /// the mode for everything reached from it.
    pub async fn add(&self, entry: &str) -> Result<()> {
        let location = match Locator::new(entry) {
            Ok(location) => location,
            // A bare relative path: anchor it in the working directory and
            // clean it like any other relative reference.
            Err(LocatorError::ExpectedAbsolutePath(_)) => {
                let cwd = std::env::current_dir().map_err(CrawlError::WorkingDir)?;
                Locator::from_path(clean_path(&cwd.join(entry)))
            }
            Err(error) => return Err(error.into()),
        };

        self.queue
            .add(vec![Task::new(
                location.clone(),
                location,
                TaskKind::Resource,
            )])
            .await
    }

    /// Waits for the crawl to finish.
    pub async fn wait(&self) -> Result<()> {
        self.queue.wait().await
    }
}

/// Calls the visitor for each resource reachable from `entry`.
///
/// Shorthand for [`Crawler::new`], [`Crawler::add`], and [`Crawler::wait`]
/// when a single entry is all there is.
pub async fn crawl<V: Visitor + 'static>(
    entry: &str,
    visitor: V,
    options: CrawlerOptions,
) -> Result<()> {
    let crawler = Crawler::new(visitor, options);
    crawler.add(entry).await?;
    crawler.wait().await
}

impl Engine {
    async fn execute(&self, task: Task) -> Result<Vec<Task>> {
        if let Some(filter) = &self.filter {
            if !filter(&task.resource().to_string()) {
                tracing::trace!(resource = %task.resource(), "skipped by filter");
                return Ok(Vec::new());
            }
        }

        match task.kind() {
            TaskKind::Resource => self.crawl_resource(&task).await,
            TaskKind::Collections => self.crawl_collections(&task).await,
            TaskKind::Children => self.crawl_children(&task).await,
            TaskKind::Features => self.crawl_features(&task).await,
        }
    }

    /// Routes an error through the caller's policy. `Ok(())` means the error
    /// was swallowed and the current unit of work should be skipped.
    fn check(&self, error: CrawlError) -> Result<()> {
        (self.error_handler)(error)
    }

    fn info(&self, task: &Task, location: &Locator) -> ResourceInfo {
        ResourceInfo {
            entry: task.entry().to_string(),
            location: location.to_string(),
        }
    }

    async fn crawl_resource(&self, task: &Task) -> Result<Vec<Task>> {
        let resource: Resource = match self.loader.load(task.entry(), task.resource()).await {
            Ok(resource) => resource,
            Err(error) => {
                self.check(error)?;
                return Ok(Vec::new());
            }
        };

        let info = self.info(task, task.resource());
        if let Err(error) = self.visitor.visit(&resource, &info) {
            if matches!(error, CrawlError::StopRecursion) {
                return Ok(Vec::new());
            }
            self.check(error)?;
        }

        let links = resource.links();
        let is_api_root = resource.resource_type() == Some(ResourceType::Catalog)
            && resource.conforms_to().len() > 1;

        // STAC API root implementing OGC API - Features.
        if is_api_root {
            if let Some(link) = links.rel("data", JSON_LINK_TYPES) {
                return match task.resource().resolve(&link.href) {
                    Ok(location) => Ok(vec![task.follow(location, TaskKind::Collections)]),
                    Err(error) => {
                        self.check(error.into())?;
                        Ok(Vec::new())
                    }
                };
            }
        }

        // STAC API root implementing STAC API - Children.
        if is_api_root {
            if let Some(link) = links.rel("children", JSON_LINK_TYPES) {
                return match task.resource().resolve(&link.href) {
                    Ok(location) => Ok(vec![task.follow(location, TaskKind::Children)]),
                    Err(error) => {
                        self.check(error.into())?;
                        Ok(Vec::new())
                    }
                };
            }
        }

        // Shortcut for a collection's `items` link.
        if resource.resource_type() == Some(ResourceType::Collection) {
            if let Some(link) = links.rel("items", ITEM_LINK_TYPES) {
                return match task.resource().resolve(&link.href) {
                    Ok(mut location) => {
                        location.set_query_param("limit", ITEMS_PAGE_LIMIT);
                        Ok(vec![task.follow(location, TaskKind::Features)])
                    }
                    Err(error) => {
                        self.check(error.into())?;
                        Ok(Vec::new())
                    }
                };
            }
        }

        // Static traversal: follow item and child links.
        let mut tasks = Vec::new();
        for link in &links {
            if link.rel != "item" && link.rel != "child" {
                continue;
            }
            if !(application_json(link) || any_json(link) || no_media_type(link)) {
                continue;
            }
            match task.resource().resolve(&link.href) {
                Ok(location) => tasks.push(task.follow(location, TaskKind::Resource)),
                Err(error) => self.check(error.into())?,
            }
        }
        Ok(tasks)
    }

    async fn crawl_collections(&self, task: &Task) -> Result<Vec<Task>> {
        let page: CollectionsPage = match self.loader.load(task.entry(), task.resource()).await {
            Ok(page) => page,
            Err(error) => {
                self.check(error)?;
                return Ok(Vec::new());
            }
        };

        let mut tasks = Vec::new();
        for (index, collection) in page.collections.iter().enumerate() {
            if collection.resource_type() != Some(ResourceType::Collection) {
                self.check(CrawlError::UnexpectedResourceType {
                    expected: "collection",
                    actual: type_label(collection),
                    index,
                })?;
                continue;
            }
            let links = collection.links();

            let Some(self_link) = links.rel("self", JSON_LINK_TYPES) else {
                self.check(missing_self_link("collection", index, task))?;
                continue;
            };
            let location = match task.resource().resolve(&self_link.href) {
                Ok(location) => location,
                Err(error) => {
                    self.check(error.into())?;
                    continue;
                }
            };

            let info = self.info(task, &location);
            if let Err(error) = self.visitor.visit(collection, &info) {
                if matches!(error, CrawlError::StopRecursion) {
                    continue;
                }
                self.check(error)?;
            }

            let Some(items_link) = links.rel("items", ITEM_LINK_TYPES) else {
                self.check(CrawlError::MissingItemsLink {
                    index,
                    location: task.resource().to_string(),
                })?;
                continue;
            };
            match task.resource().resolve(&items_link.href) {
                Ok(mut items_location) => {
                    items_location.set_query_param("limit", ITEMS_PAGE_LIMIT);
                    tasks.push(task.follow(items_location, TaskKind::Features));
                }
                Err(error) => {
                    self.check(error.into())?;
                    continue;
                }
            }
        }

        self.follow_next_page(task, &page.links, TaskKind::Collections, &mut tasks)?;
        Ok(tasks)
    }

    async fn crawl_children(&self, task: &Task) -> Result<Vec<Task>> {
        let page: ChildrenPage = match self.loader.load(task.entry(), task.resource()).await {
            Ok(page) => page,
            Err(error) => {
                self.check(error)?;
                return Ok(Vec::new());
            }
        };

        let mut tasks = Vec::new();
        for (index, child) in page.children.iter().enumerate() {
            let child_type = child.resource_type();
            if child_type != Some(ResourceType::Catalog)
                && child_type != Some(ResourceType::Collection)
            {
                self.check(CrawlError::UnexpectedResourceType {
                    expected: "catalog or collection",
                    actual: type_label(child),
                    index,
                })?;
                continue;
            }

            let child_links = child.links();
            let Some(self_link) = child_links.rel("self", JSON_LINK_TYPES) else {
                self.check(missing_self_link(&type_label(child), index, task))?;
                continue;
            };
            match task.resource().resolve(&self_link.href) {
                Ok(location) => tasks.push(task.follow(location, TaskKind::Resource)),
                Err(error) => {
                    self.check(error.into())?;
                    continue;
                }
            }
        }

        self.follow_next_page(task, &page.links, TaskKind::Children, &mut tasks)?;
        Ok(tasks)
    }

    async fn crawl_features(&self, task: &Task) -> Result<Vec<Task>> {
        let page: FeaturesPage = match self.loader.load(task.entry(), task.resource()).await {
            Ok(page) => page,
            Err(error) => {
                self.check(error)?;
                return Ok(Vec::new());
            }
        };

        for (index, feature) in page.features.iter().enumerate() {
            if feature.resource_type() != Some(ResourceType::Item) {
                self.check(CrawlError::UnexpectedResourceType {
                    expected: "item",
                    actual: type_label(feature),
                    index,
                })?;
                continue;
            }

            let feature_links = feature.links();
            let Some(self_link) = feature_links.rel("self", ITEM_LINK_TYPES) else {
                self.check(missing_self_link("item", index, task))?;
                continue;
            };
            let location = match task.resource().resolve(&self_link.href) {
                Ok(location) => location,
                Err(error) => {
                    self.check(error.into())?;
                    continue;
                }
            };

            let info = self.info(task, &location);
            if let Err(error) = self.visitor.visit(feature, &info) {
                if matches!(error, CrawlError::StopRecursion) {
                    continue;
                }
                self.check(error)?;
            }
        }

        let mut tasks = Vec::new();
        self.follow_next_page(task, &page.links, TaskKind::Features, &mut tasks)?;
        Ok(tasks)
    }

    /// Queues the page's `next` link, if present, as another task of the
    /// same kind.
    fn follow_next_page(
        &self,
        task: &Task,
        links: &crate::resource::Links,
        kind: TaskKind,
        tasks: &mut Vec<Task>,
    ) -> Result<()> {
        let Some(next) = links.rel("next", JSON_LINK_TYPES) else {
            return Ok(());
        };
        match task.resource().resolve(&next.href) {
            Ok(location) => {
                tasks.push(task.follow(location, kind));
                Ok(())
            }
            Err(error) => self.check(error.into()),
        }
    }
}

fn missing_self_link(kind: &str, index: usize, task: &Task) -> CrawlError {
    CrawlError::MissingSelfLink {
        kind: kind.to_string(),
        index,
        location: task.resource().to_string(),
    }
}

fn type_label(resource: &Resource) -> String {
    resource
        .resource_type()
        .map_or_else(|| "unknown".to_string(), |t| t.to_string())
}

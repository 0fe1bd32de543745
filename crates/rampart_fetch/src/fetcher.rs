//! Concurrent per-resource-type fetching.
//!
//! A [`Fetcher`] fans out one worker per registered resource type.
//! Workers share a [`FetchCache`] and report through a results channel
//! sized to the worker count, so sends never block. The aggregator is
//! the sole writer of the merged [`Graph`]; worker errors are
//! aggregated and partial results are never dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tokio::sync::mpsc;

use crate::cache::FetchCache;
use crate::error::FetchError;
use crate::graph::{Graph, Resource};

/// Cancellation handle forwarded to every fetch function.
///
/// Fetch functions are responsible for observing cancellation; the
/// fetcher itself always awaits dispatched workers.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    cancelled: Arc<AtomicBool>,
}

impl FetchContext {
    /// Create a live context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What one worker produced.
#[derive(Debug)]
pub struct FetchResult {
    /// Resource type the worker was fetching.
    pub resource_type: String,
    /// Fetched resources; empty on failure.
    pub resources: Vec<Resource>,
    /// Opaque provider payload, published to the cache.
    pub objects: Option<Json>,
    /// The worker's failure, if any.
    pub err: Option<FetchError>,
}

/// What a fetch function yields: resources plus an opaque payload.
pub type FetchOutput = Result<(Vec<Resource>, Option<Json>), FetchError>;

/// Boxed future returned by a fetch function.
pub type FetchFuture = Pin<Box<dyn Future<Output = FetchOutput> + Send>>;

/// A user-supplied fetch function for one resource type.
pub type FetchFn = Arc<dyn Fn(FetchContext, Arc<FetchCache>) -> FetchFuture + Send + Sync>;

/// Registered fetch functions, keyed by resource type.
pub type FetchFuncs = IndexMap<String, FetchFn>;

/// Wrap an async closure as a [`FetchFn`].
pub fn fetch_fn<F, Fut>(f: F) -> FetchFn
where
    F: Fn(FetchContext, Arc<FetchCache>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchOutput> + Send + 'static,
{
    Arc::new(move |ctx: FetchContext, cache: Arc<FetchCache>| {
        let fut: FetchFuture = Box::pin(f(ctx, cache));
        fut
    })
}

/// Fans out fetch functions and merges their results into a graph.
pub struct Fetcher {
    funcs: FetchFuncs,
    cache: Arc<FetchCache>,
}

impl Fetcher {
    /// Create a fetcher over the registered fetch functions.
    #[must_use]
    pub fn new(funcs: FetchFuncs) -> Self {
        Self {
            funcs,
            cache: Arc::new(FetchCache::new()),
        }
    }

    /// Registered resource types, in registration order.
    #[must_use]
    pub fn resource_types(&self) -> Vec<&str> {
        self.funcs.keys().map(String::as_str).collect()
    }

    /// The cache shared by all fetch functions.
    #[must_use]
    pub fn cache(&self) -> Arc<FetchCache> {
        Arc::clone(&self.cache)
    }

    /// Fetch every registered resource type concurrently.
    ///
    /// Always returns the merged graph, even when some workers failed;
    /// the second element aggregates every worker error.
    pub async fn fetch(&self, ctx: &FetchContext) -> (Graph, Option<FetchError>) {
        let worker_count = self.funcs.len();
        let (tx, mut rx) = mpsc::channel::<FetchResult>(worker_count.max(1));

        let mut workers = Vec::with_capacity(worker_count);
        for (resource_type, func) in &self.funcs {
            let tx = tx.clone();
            let ctx = ctx.clone();
            let cache = Arc::clone(&self.cache);
            let resource_type = resource_type.clone();
            let func = Arc::clone(func);
            workers.push(tokio::spawn(async move {
                tracing::debug!(resource_type = %resource_type, "fetch worker dispatched");
                let result = fetch_resource(ctx, resource_type, Some(func), cache).await;
                // Channel capacity equals the worker count, so this
                // never blocks; the receiver may already be gone.
                let _ = tx.send(result).await;
            }));
        }
        drop(tx);

        let mut graph = Graph::new();
        let mut errors = Vec::new();
        while let Some(result) = rx.recv().await {
            tracing::debug!(
                resource_type = %result.resource_type,
                resources = result.resources.len(),
                failed = result.err.is_some(),
                "fetch result merged"
            );
            if let Some(err) = result.err {
                errors.push(err);
            }
            graph.add_resources(result.resources);
        }

        for worker in workers {
            let _ = worker.await;
        }

        (graph, FetchError::aggregate(errors))
    }

    /// Fetch a single resource type synchronously.
    ///
    /// The graph is always returned, empty on failure; an unregistered
    /// type yields a [`FetchError::NoFetchFunc`] error.
    pub async fn fetch_by_type(
        &self,
        ctx: &FetchContext,
        resource_type: &str,
    ) -> (Graph, Option<FetchError>) {
        let func = self.funcs.get(resource_type).cloned();
        let result = fetch_resource(
            ctx.clone(),
            resource_type.to_string(),
            func,
            Arc::clone(&self.cache),
        )
        .await;

        let mut graph = Graph::new();
        if let Some(err) = result.err {
            return (graph, Some(err));
        }
        graph.add_resources(result.resources);
        (graph, None)
    }
}

/// Run one fetch, then unconditionally publish the opaque payload
/// under `<type>_objects`.
async fn fetch_resource(
    ctx: FetchContext,
    resource_type: String,
    func: Option<FetchFn>,
    cache: Arc<FetchCache>,
) -> FetchResult {
    let (resources, objects, err) = match func {
        Some(func) => match func(ctx, Arc::clone(&cache)).await {
            Ok((resources, objects)) => (resources, objects, None),
            Err(e) => (Vec::new(), None, Some(e)),
        },
        None => (
            Vec::new(),
            None,
            Some(FetchError::NoFetchFunc(resource_type.clone())),
        ),
    };

    cache.store(
        &format!("{}_objects", resource_type),
        objects.clone().unwrap_or(Json::Null),
    );

    FetchResult {
        resource_type,
        resources,
        objects,
        err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instances() -> Vec<Resource> {
        vec![
            Resource::new("instance", "inst_1"),
            Resource::new("instance", "inst_2"),
        ]
    }

    fn subnets() -> Vec<Resource> {
        vec![
            Resource::new("subnet", "sub_1"),
            Resource::new("subnet", "sub_2"),
        ]
    }

    fn sample_fetcher() -> Fetcher {
        let mut funcs = FetchFuncs::new();
        funcs.insert(
            "instance".to_string(),
            fetch_fn(|_, _| async { Ok((instances(), None)) }),
        );
        funcs.insert(
            "subnet".to_string(),
            fetch_fn(|_, _| async { Ok((subnets(), None)) }),
        );
        Fetcher::new(funcs)
    }

    #[tokio::test]
    async fn test_fetch_all() {
        let (graph, err) = sample_fetcher().fetch(&FetchContext::new()).await;

        assert!(err.is_none());
        assert!(graph.find_one("instance", "inst_1").is_some());
        assert!(graph.find_one("instance", "inst_2").is_some());
        assert!(graph.find_one("subnet", "sub_1").is_some());
        assert!(graph.find_one("subnet", "sub_2").is_some());
    }

    #[tokio::test]
    async fn test_fetch_by_type() {
        let fetcher = sample_fetcher();
        let (graph, err) = fetcher
            .fetch_by_type(&FetchContext::new(), "instance")
            .await;

        assert!(err.is_none());
        assert!(graph.find("subnet").is_empty());
        assert_eq!(graph.find("instance").len(), 2);
        assert!(graph.find_one("instance", "inst_1").is_some());
        assert!(graph.find_one("instance", "inst_2").is_some());
    }

    #[tokio::test]
    async fn test_fetch_unexisting_type() {
        let fetcher = sample_fetcher();
        let (graph, err) = fetcher
            .fetch_by_type(&FetchContext::new(), "unexisting")
            .await;

        let err = err.unwrap();
        assert!(err
            .to_string()
            .contains("no fetch func defined for resource type 'unexisting'"));
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_when_func_returns_nothing() {
        let mut funcs = FetchFuncs::new();
        funcs.insert(
            "nils".to_string(),
            fetch_fn(|_, _| async { Ok((Vec::new(), None)) }),
        );
        let fetcher = Fetcher::new(funcs);

        let (graph, err) = fetcher.fetch_by_type(&FetchContext::new(), "nils").await;
        assert!(err.is_none());
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_when_func_returns_error() {
        let mut funcs = FetchFuncs::new();
        funcs.insert(
            "errors".to_string(),
            fetch_fn(|_, _| async { Err(FetchError::fetch("fetch func error")) }),
        );
        let fetcher = Fetcher::new(funcs);

        let (graph, err) = fetcher.fetch_by_type(&FetchContext::new(), "errors").await;
        assert!(err.unwrap().to_string().contains("fetch func error"));
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_aggregates_errors_but_keeps_partial_graph() {
        let mut funcs = FetchFuncs::new();
        funcs.insert(
            "instance".to_string(),
            fetch_fn(|_, _| async { Ok((instances(), None)) }),
        );
        funcs.insert(
            "subnet".to_string(),
            fetch_fn(|_, _| async { Err(FetchError::fetch("subnet api down")) }),
        );
        let fetcher = Fetcher::new(funcs);

        let (graph, err) = fetcher.fetch(&FetchContext::new()).await;

        assert_eq!(graph.find("instance").len(), 2);
        assert!(err.unwrap().to_string().contains("subnet api down"));
    }

    #[tokio::test]
    async fn test_objects_payload_published_to_cache() {
        let mut funcs = FetchFuncs::new();
        funcs.insert(
            "instance".to_string(),
            fetch_fn(|_, _| async { Ok((instances(), Some(json!({"token": "abc"})))) }),
        );
        funcs.insert(
            "errors".to_string(),
            fetch_fn(|_, _| async { Err(FetchError::fetch("down")) }),
        );
        let fetcher = Fetcher::new(funcs);

        let (_, _) = fetcher.fetch(&FetchContext::new()).await;

        let cache = fetcher.cache();
        assert_eq!(
            cache.get("instance_objects"),
            Some(Ok(json!({"token": "abc"})))
        );
        assert_eq!(cache.get("errors_objects"), Some(Ok(Json::Null)));
    }

    #[tokio::test]
    async fn test_fetch_funcs_share_the_cache() {
        // Both workers memoize under the same key; whichever loader
        // runs first wins and the other observes the same value.
        let quota_fetch = |seed: i64| {
            fetch_fn(move |_, cache| async move {
                let quota = cache
                    .get_or_load("account_quota", || async move { Ok(json!(seed)) })
                    .await?;
                let ty = if seed == 20 { "instance" } else { "subnet" };
                let res = Resource::new(ty, format!("{}_1", ty)).with_property("quota", quota);
                Ok((vec![res], None))
            })
        };
        let mut funcs = FetchFuncs::new();
        funcs.insert("instance".to_string(), quota_fetch(20));
        funcs.insert("subnet".to_string(), quota_fetch(99));
        let fetcher = Fetcher::new(funcs);

        let (graph, err) = fetcher.fetch(&FetchContext::new()).await;
        assert!(err.is_none());

        let instance_quota = &graph.find_one("instance", "instance_1").unwrap().properties["quota"];
        let subnet_quota = &graph.find_one("subnet", "subnet_1").unwrap().properties["quota"];
        assert_eq!(instance_quota, subnet_quota);
        assert!(*instance_quota == json!(20) || *instance_quota == json!(99));
    }

    #[tokio::test]
    async fn test_context_cancellation_observed_by_fetch_funcs() {
        let mut funcs = FetchFuncs::new();
        funcs.insert(
            "instance".to_string(),
            fetch_fn(|ctx, _| async move {
                if ctx.is_cancelled() {
                    return Err(FetchError::fetch("cancelled"));
                }
                Ok((instances(), None))
            }),
        );
        let fetcher = Fetcher::new(funcs);

        let ctx = FetchContext::new();
        ctx.cancel();
        let (graph, err) = fetcher.fetch(&ctx).await;

        assert!(graph.is_empty());
        assert!(err.unwrap().to_string().contains("cancelled"));
    }
}

//! RAMPART Fetcher
//!
//! Concurrent per-resource-type retrieval of cloud resources. Fetch
//! functions fan out as parallel workers sharing a one-shot
//! [`FetchCache`]; their results merge into a [`Graph`] that is
//! returned even when some workers fail.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod graph;

pub use cache::FetchCache;
pub use error::FetchError;
pub use fetcher::{
    fetch_fn, FetchContext, FetchFn, FetchFuncs, FetchFuture, FetchOutput, FetchResult, Fetcher,
};
pub use graph::{Graph, Resource};

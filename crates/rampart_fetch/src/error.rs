//! Fetch error types.

/// Joined messages for aggregated errors.
fn join_errors(errors: &[FetchError]) -> String {
    let parts: Vec<String> = errors.iter().map(ToString::to_string).collect();
    parts.join("; ")
}

/// Why fetching failed, in whole or in part.
///
/// Errors are `Clone` so they can live in cache slots and be observed
/// by every caller that coalesced on the same load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// No fetch function registered for the resource type.
    #[error("no fetch func defined for resource type '{0}'")]
    NoFetchFunc(String),

    /// A fetch function failed.
    #[error("{0}")]
    Fetch(String),

    /// Per-resource-type errors collected by a bulk fetch.
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<FetchError>),
}

impl FetchError {
    /// A fetch-function failure.
    #[must_use]
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    /// Aggregate worker errors; `None` when there are none.
    #[must_use]
    pub fn aggregate(errors: Vec<FetchError>) -> Option<FetchError> {
        if errors.is_empty() {
            None
        } else {
            Some(Self::Aggregate(errors))
        }
    }
}

//! Ordered asset fallback.
//!
//! Model assets may be unreachable from one host and available from
//! another.  [`try_sources`] walks an ordered [`AssetSource`] list, bounds
//! every attempt with a timeout and only fails once the list is exhausted,
//! reporting the last underlying cause.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use depthsense_types::SensorError;
use tracing::{debug, info, warn};

use crate::model::{AssetSource, ModelError, ModelLoader};

/// Run `attempt` against each source in order until one succeeds.
///
/// # Errors
///
/// Returns [`SensorError::InitializationFailed`] with the last cause when
/// every source failed or timed out, or when `sources` is empty.
pub async fn try_sources<T, F, Fut>(
    what: &str,
    sources: &[AssetSource],
    per_attempt: Duration,
    mut attempt: F,
) -> Result<T, SensorError>
where
    F: FnMut(AssetSource) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut last_error: Option<ModelError> = None;

    for source in sources {
        debug!(asset = what, source = %source.name, uri = %source.uri, "trying asset source");
        match tokio::time::timeout(per_attempt, attempt(source.clone())).await {
            Ok(Ok(value)) => {
                info!(asset = what, source = %source.name, "asset loaded");
                return Ok(value);
            }
            Ok(Err(e)) => {
                warn!(asset = what, source = %source.name, error = %e, "asset source failed");
                last_error = Some(e);
            }
            Err(_) => {
                warn!(asset = what, source = %source.name, timeout = ?per_attempt, "asset source timed out");
                last_error = Some(ModelError::Timeout(per_attempt));
            }
        }
    }

    Err(match last_error {
        Some(e) => SensorError::init(what, e),
        None => SensorError::init(what, "no asset sources configured"),
    })
}

/// Load a model through `loader`, falling back across `sources`.
pub async fn load_model<M: ?Sized + Send + Sync>(
    what: &str,
    loader: &dyn ModelLoader<M>,
    sources: &[AssetSource],
    per_attempt: Duration,
) -> Result<Arc<M>, SensorError> {
    try_sources(what, sources, per_attempt, |source| async move { loader.load(&source).await }).await
}

/// `Ok` as soon as one source answers a probe.
pub async fn probe_sources<M: ?Sized + Send + Sync>(
    what: &str,
    loader: &dyn ModelLoader<M>,
    sources: &[AssetSource],
    per_attempt: Duration,
) -> Result<(), SensorError> {
    try_sources(what, sources, per_attempt, |source| async move { loader.probe(&source).await }).await
}

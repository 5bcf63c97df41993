use thiserror::Error;

use crate::appeal::AppealFetchError;
use crate::resolver::ResolveError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
/// Failures surfaced by lifecycle actions to the event boundary.
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("thread resolution failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("failed to fetch ban appeal details: {0}")]
    AppealFetch(#[from] AppealFetchError),
    #[error("ban appeal signal received but no appeal source is configured")]
    MissingAppealSource,
}

//! Handler traits.

use crate::error::HandlerError;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

/// Handler invoked for every message delivered on its channel.
///
/// The payload is the decoded JSON document exactly as it was published.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one delivery.
    async fn handle(&self, payload: Value) -> Result<(), HandlerError>;
}

/// Handler backed by an async closure. Build one with [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, payload: Value) -> Result<(), HandlerError> {
        (self.f)(payload).await
    }
}

/// Wrap an async closure as an [`EventHandler`].
///
/// ```rust
/// use fanout_core::{handler_fn, HandlerError};
///
/// let handler = handler_fn(|payload| async move {
///     tracing::info!(%payload, "contact created");
///     Ok::<(), HandlerError>(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

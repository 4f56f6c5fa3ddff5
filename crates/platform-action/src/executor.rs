//! Executor contract for action bodies.
//!
//! Every action carries an [`ActionExecutor`]. Bodies are thin wrappers over
//! backend calls; they may fail, and must always produce a result when they
//! succeed.

use async_trait::async_trait;
use platform_core::types::ActionContext;
use std::future::Future;
use std::sync::Arc;

use crate::error::ActionError;
use crate::types::{ActionResult, Params};

/// The body of an action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        params: Params,
        context: ActionContext,
    ) -> Result<ActionResult, ActionError>;
}

/// Adapter turning an async closure into an [`ActionExecutor`].
struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ActionExecutor for FnExecutor<F>
where
    F: Fn(Params, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResult, ActionError>> + Send + 'static,
{
    async fn execute(
        &self,
        params: Params,
        context: ActionContext,
    ) -> Result<ActionResult, ActionError> {
        (self.0)(params, context).await
    }
}

/// Wrap an async closure as a shareable executor.
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn ActionExecutor>
where
    F: Fn(Params, ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResult, ActionError>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

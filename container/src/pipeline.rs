use std::error::Error as StdError;
use std::future::Future;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// One startup step. Receives the pipeline's cancellation token.
pub type Action = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Wraps an async closure into an [`Action`].
pub fn action<F, Fut, E>(f: F) -> Action
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Box::new(move |token| Box::pin(async move { f(token).await.map_err(Into::into) }))
}

/// The token was cancelled before the pipeline completed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("startup cancelled")]
pub struct Cancelled;

/// The first failing startup action.
#[derive(Debug, Error)]
#[error("run failed: {source}")]
pub struct RunError {
    index: usize,
    #[source]
    source: BoxError,
}

impl RunError {
    /// Position of the failing action in the list.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    pub fn is_cancelled(&self) -> bool {
        self.downcast_ref::<Cancelled>().is_some()
    }
}

/// Runs `actions` one after the other, stopping at the first failure.
///
/// Cancelling `shutdown` aborts the action in progress and fails the run with
/// [`Cancelled`] as its cause. Actions after the failing one never run.
pub async fn run(shutdown: &CancellationToken, actions: Vec<Action>) -> Result<(), RunError> {
    for (index, action) in actions.into_iter().enumerate() {
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(BoxError::from(Cancelled)),
            result = action(shutdown.clone()) => result,
        };

        if let Err(source) = result {
            return Err(RunError { index, source });
        }
    }
    Ok(())
}

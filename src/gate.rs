use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::LoadError;

type LoadFuture<S> = Pin<Box<dyn Future<Output = Result<S, LoadError>>>>;
type Loader<S> = Box<dyn Fn() -> LoadFuture<S>>;

/// Acquires the conversion service at most once. Concurrent callers share a
/// single load and a failed load is remembered, not retried.
pub struct LibraryGate<S> {
    loader: Option<Loader<S>>,
    cell: OnceCell<Result<Arc<S>, LoadError>>,
}

impl<S: 'static> LibraryGate<S> {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = Result<S, LoadError>> + 'static,
    {
        Self {
            loader: Some(Box::new(move || Box::pin(loader()))),
            cell: OnceCell::new(),
        }
    }

    /// A gate around a service that is already loaded.
    pub fn ready(service: S) -> Self {
        Self {
            loader: None,
            cell: OnceCell::new_with(Some(Ok(Arc::new(service)))),
        }
    }

    /// # Errors
    ///
    /// Returns the (memoized) [`LoadError`] if the service could not be loaded.
    pub async fn acquire(&self) -> Result<Arc<S>, LoadError> {
        self.cell
            .get_or_init(|| async {
                let Some(loader) = &self.loader else {
                    return Err(LoadError::new("no loader configured"));
                };
                match loader().await {
                    Ok(service) => {
                        info!("conversion service loaded");
                        Ok(Arc::new(service))
                    }
                    Err(err) => {
                        warn!(error = %err, "conversion service failed to load");
                        Err(err)
                    }
                }
            })
            .await
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.cell.get(), Some(Ok(_)))
    }
}

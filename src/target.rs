//! The operation under load
//!
//! A [`Target`] is an opaque, zero-argument unit of work. The generator never looks
//! inside it: each call either resolves `Ok(())`, resolves with an error, or panics,
//! and every one of those is turned into an outcome record.
//!
//! ```rust
//! use stampede::target::{from_fn, from_blocking_fn};
//! use std::time::Duration;
//!
//! // Async operation
//! let http_like = from_fn(|| async {
//!     tokio::time::sleep(Duration::from_millis(5)).await;
//!     Ok(())
//! });
//!
//! // Synchronous operation, executed on the blocking pool
//! let cpu_bound = from_blocking_fn(|| {
//!     let _sum: u64 = (0..10_000u64).sum();
//!     Ok(())
//! });
//! # let _ = (http_like, cpu_bound);
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A caller-supplied operation to drive under load
#[async_trait]
pub trait Target: Send + Sync + 'static {
    /// Perform one unit of work
    async fn call(&self) -> anyhow::Result<()>;
}

/// Adapter for async closures, see [`from_fn`]
pub struct FnTarget<F> {
    operation: F,
}

#[async_trait]
impl<F, Fut> Target for FnTarget<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self) -> anyhow::Result<()> {
        (self.operation)().await
    }
}

/// Adapter for synchronous closures, see [`from_blocking_fn`]
pub struct BlockingTarget<F> {
    operation: Arc<F>,
}

#[async_trait]
impl<F> Target for BlockingTarget<F>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn call(&self) -> anyhow::Result<()> {
        let operation = Arc::clone(&self.operation);
        match tokio::task::spawn_blocking(move || operation()).await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error) => Err(anyhow::anyhow!(join_error)),
        }
    }
}

/// Wrap an async closure as a shareable target
pub fn from_fn<F, Fut>(operation: F) -> Arc<dyn Target>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnTarget { operation })
}

/// Wrap a synchronous closure as a shareable target
pub fn from_blocking_fn<F>(operation: F) -> Arc<dyn Target>
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(BlockingTarget {
        operation: Arc::new(operation),
    })
}

//! Runtime seam for launching admitted work.

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Abstraction for spawning task execution on a runtime.
///
/// The pool never creates threads; it hands admitted units to the host's
/// executor through this trait.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

//! Runtime hook for the background receive mode.

use std::future::Future;

use tracing::Span;

#[cfg(feature = "rt-tokio")]
pub mod tokio;

/// Spawns the tasks the client runs in the background.
///
/// [`AdsClient::start`](crate::AdsClient::start) is the only caller: it hands
/// the receive loop to the runtime and reports the loop's result over a
/// channel, so the runtime never needs to return a join handle.
pub trait Runtime: Send + Sync + Clone + 'static {
    /// Run `task` to completion in the background. Events the task emits
    /// belong to `span`.
    fn spawn<F>(&self, span: Span, task: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

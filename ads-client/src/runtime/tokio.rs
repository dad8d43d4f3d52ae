//! `tokio` based runtime implementation.

use std::future::Future;

use tracing::{Instrument, Span};

use crate::runtime::Runtime;

/// Spawns onto the ambient tokio runtime, so it must be used from within one.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioRuntime;

impl Runtime for TokioRuntime {
    fn spawn<F>(&self, span: Span, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(task.instrument(span));
    }
}

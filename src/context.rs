//! Execution context passed through every context-aware driver call.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::error::Error;

/// Where spans started under a context are attached.
#[derive(Debug, Clone)]
enum Parent {
    /// A span the context keeps alive. A disabled span makes new spans roots.
    Span(Span),
    /// Whatever span is current when the new span is created.
    Current,
}

/// Carries the parent span, a cancellation signal and an optional deadline.
///
/// Cloning is cheap; clones share the cancellation token.
#[derive(Debug, Clone)]
pub struct Context {
    parent: Parent,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::current()
    }
}

impl Context {
    /// A context with no parent span that is never cancelled.
    pub fn background() -> Self {
        Self {
            parent: Parent::Span(Span::none()),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context whose parent is the caller's current `tracing` span.
    pub fn current() -> Self {
        Self::background().with_parent(Span::current())
    }

    pub fn with_parent(mut self, span: Span) -> Self {
        self.parent = Parent::Span(span);
        self
    }

    /// Replace the cancellation token. Cancelling `token` cancels this context.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Derive a context that is also done after `timeout`.
    ///
    /// An earlier existing deadline is kept.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.min(deadline)));
        self
    }

    /// Same cancellation and deadline, parenting new spans under whatever
    /// span is current when they are created.
    ///
    /// Holds no span handle, so a callee keeping the returned context does
    /// not keep the caller's span open.
    pub fn scoped(&self) -> Self {
        Self {
            parent: Parent::Current,
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }

    /// The parent span for operations started under this context.
    pub fn span(&self) -> Span {
        match &self.parent {
            Parent::Span(span) => span.clone(),
            Parent::Current => Span::current(),
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why the context is done, if it is.
    pub fn err(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            Some(Error::Canceled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.cancel.cancelled().await,
        }
    }
}

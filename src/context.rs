//! Per-operation context: trace id, deadline and cancellation.
//!
//! Every store call runs through [`OperationContext::run`], which races the
//! backend future against the deadline and the shared cancellation signal.
//! When either fires first the backend future is dropped and the caller sees
//! an [`Interrupted`] reason.

use std::{future::Future, sync::Arc, time::Duration};
use tokio::{sync::watch, time::Instant};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    DeadlineExceeded,
    Cancelled,
}

impl Interrupted {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "deadline exceeded",
            Self::Cancelled => "operation cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationContext {
    trace_id: Ulid,
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationContext {
    /// Fresh context with a new trace id, no deadline and no cancellation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: Ulid::new(),
            deadline: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_trace_id(mut self, trace_id: Ulid) -> Self {
        self.trace_id = trace_id;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn trace_id(&self) -> Ulid {
        self.trace_id
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Drive `operation` unless the deadline passes or cancellation fires first.
    ///
    /// # Errors
    /// Returns the reason the operation was abandoned.
    pub async fn run<F: Future>(&self, operation: F) -> Result<F::Output, Interrupted> {
        if self.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(Interrupted::DeadlineExceeded);
        }

        let mut cancel = self.cancel.clone();

        tokio::select! {
            biased;
            () = wait_for_cancel(cancel.as_mut()) => Err(Interrupted::Cancelled),
            () = wait_for_deadline(self.deadline) => Err(Interrupted::DeadlineExceeded),
            output = operation => Ok(output),
        }
    }
}

/// Resolves once the signal flips to `true`; never resolves without a signal
/// or after the sender is gone.
async fn wait_for_cancel(cancel: Option<&mut watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };
    if !cancelled(rx).await {
        std::future::pending::<()>().await;
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Wait for cancellation. Returns `false` if every sender was dropped first.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) -> bool {
    rx.wait_for(|cancelled| *cancelled).await.is_ok()
}

/// Shared cancellation signal for background tasks and in-flight operations.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

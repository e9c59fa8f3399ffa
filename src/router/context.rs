//! Per-request context: identity, cancellation and deadline

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use super::errors::{RouterError, RouterResult};
use crate::observability::{log_event, Event};
use crate::vschema::VSchema;

/// Carried through one `execute`/`stream_execute` call.
///
/// Cloning shares the cancellation signal.
#[derive(Debug, Clone)]
pub struct QueryContext {
    request_id: Uuid,
    cancelled: watch::Receiver<bool>,
    deadline: Option<Instant>,
    /// Snapshot the request was planned with; lookups plan against it too
    vschema: Option<Arc<VSchema>>,
}

/// Cancels every clone of the context it was created with
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl QueryContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self {
            request_id: Uuid::new_v4(),
            cancelled: rx,
            deadline: None,
            vschema: None,
        }
    }

    pub fn with_cancel() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let ctx = Self {
            request_id: Uuid::new_v4(),
            cancelled: rx,
            deadline: None,
            vschema: None,
        };
        (ctx, CancelHandle { tx })
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn vschema(&self) -> Option<&Arc<VSchema>> {
        self.vschema.as_ref()
    }

    /// A clone sharing identity and cancellation, pinned to `vschema`
    pub(crate) fn with_vschema(&self, vschema: Arc<VSchema>) -> Self {
        Self {
            vschema: Some(vschema),
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Runs `fut` until it finishes, the context is cancelled or the
    /// deadline passes. In the latter cases `fut` is dropped.
    pub async fn guard<T, F>(&self, fut: F) -> RouterResult<T>
    where
        F: Future<Output = RouterResult<T>>,
    {
        let mut cancelled = self.cancelled.clone();
        let deadline = self.deadline;

        let result = tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancelled) => Err(RouterError::Cancelled),
            _ = wait_deadline(deadline) => Err(RouterError::DeadlineExceeded),
            result = fut => result,
        };
        if matches!(result, Err(RouterError::Cancelled | RouterError::DeadlineExceeded)) {
            log_event(
                Event::QueryCancelled,
                &[("request_id", &self.request_id.to_string())],
            );
        }
        result
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    // a dropped handle can no longer cancel
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let ctx = QueryContext::background();
        let value = ctx.guard(async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_guard_stops_on_cancel() {
        let (ctx, handle) = QueryContext::with_cancel();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.guard(async {
                    std::future::pending::<()>().await;
                    Ok(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(RouterError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_guard_rejects_already_cancelled() {
        let (ctx, handle) = QueryContext::with_cancel();
        handle.cancel();
        let result = ctx.guard(async { Ok(1) }).await;
        assert!(matches!(result, Err(RouterError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_stops_at_deadline() {
        let ctx = QueryContext::background().with_timeout(Duration::from_millis(20));
        let result: RouterResult<()> = ctx
            .guard(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RouterError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (ctx, handle) = QueryContext::with_cancel();
        drop(handle);
        assert_eq!(ctx.guard(async { Ok(2) }).await.unwrap(), 2);
    }

    #[test]
    fn test_pinned_context_keeps_identity() {
        let (ctx, handle) = QueryContext::with_cancel();
        assert!(ctx.vschema().is_none());
        let pinned = ctx.with_vschema(Arc::new(VSchema::default()));
        assert!(pinned.vschema().is_some());
        assert_eq!(pinned.request_id(), ctx.request_id());
        handle.cancel();
        assert!(pinned.is_cancelled());
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(
            QueryContext::background().request_id(),
            QueryContext::background().request_id()
        );
    }
}

//! Context implementation for request-scoped data and cancellation
//!
//! The gRPC service holds one root context for the life of the plugin;
//! StopProvider cancels it and every context derived from it follows.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time;

type Values = Arc<RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>>;

/// Context carries request-scoped values like cancellation signals, timeouts, and metadata
/// Pass this as first parameter to all async trait methods
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    deadline: Option<Instant>,
    values: Values,
    done: watch::Receiver<bool>,
    done_tx: watch::Sender<bool>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done_rx) = watch::channel(false);

        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                values: Arc::new(RwLock::new(HashMap::new())),
                done: done_rx,
                done_tx,
            }),
        }
    }

    /// Derive a context that is cancelled when the timeout elapses or when
    /// this context is cancelled, whichever comes first.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(Instant::now() + timeout),
            None => Instant::now() + timeout,
        };
        self.derive(Some(deadline))
    }

    /// Derive a context that can be cancelled on its own without touching
    /// this one.
    pub fn child(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let (done_tx, done_rx) = watch::channel(self.is_cancelled());
        let mut parent = self.done();
        let tx = done_tx.clone();

        tokio::spawn(async move {
            let parent_cancelled = async {
                if parent.wait_for(|done| *done).await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let expired = async {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline.into()).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = parent_cancelled => {}
                _ = expired => {}
                // every receiver dropped: the derived context is gone
                _ = tx.closed() => return,
            }
            let _ = tx.send(true);
        });

        Self {
            inner: Arc::new(ContextInner {
                deadline,
                values: self.inner.values.clone(),
                done: done_rx,
                done_tx,
            }),
        }
    }

    pub async fn with_value<T: Send + Sync + 'static>(self, key: &str, value: T) -> Self {
        let mut values = self.inner.values.write().await;
        values.insert(key.to_string(), Arc::new(value));
        drop(values);
        self
    }

    pub async fn get_value<T>(&self, key: &str) -> Option<T>
    where
        T: Send + Sync + Clone + 'static,
    {
        let values = self.inner.values.read().await;
        values.get(key).and_then(|v| v.downcast_ref::<T>()).cloned()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.done.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns a channel that flips to true when work done on behalf of this
    /// context should be cancelled
    pub fn done(&self) -> watch::Receiver<bool> {
        self.inner.done.clone()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        let mut done = self.done();
        if done.wait_for(|done| *done).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn cancel(&self) {
        let _ = self.inner.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn context_stores_and_retrieves_values() {
        let ctx = Context::new();
        let ctx = ctx.with_value("api_key", "secret123".to_string()).await;

        let value: Option<String> = ctx.get_value("api_key").await;
        assert_eq!(value, Some("secret123".to_string()));

        let wrong_type: Option<u32> = ctx.get_value("api_key").await;
        assert!(wrong_type.is_none());
    }

    #[tokio::test]
    async fn context_timeout_cancels() {
        let ctx = Context::new().with_timeout(Duration::from_millis(100));

        assert!(!ctx.is_cancelled());

        sleep(Duration::from_millis(150)).await;

        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn context_manual_cancel() {
        let ctx = Context::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn parent_cancel_reaches_children() {
        let root = Context::new();
        let child = root.child();
        let timed = root.clone().with_timeout(Duration::from_secs(60));

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(1), timed.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_alone() {
        let root = Context::new();
        let child = root.child();
        child.cancel();

        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn derived_contexts_share_values() {
        let root = Context::new().with_value("region", "eu".to_string()).await;
        let child = root.child();
        assert_eq!(
            child.get_value::<String>("region").await,
            Some("eu".to_string())
        );
    }

    #[tokio::test]
    async fn context_deadline() {
        let ctx = Context::new();
        assert!(ctx.deadline().is_none());

        let ctx_with_timeout = ctx.with_timeout(Duration::from_secs(1));
        assert!(ctx_with_timeout.deadline().is_some());
    }
}

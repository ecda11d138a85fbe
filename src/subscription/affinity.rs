//! Single-threaded delivery contexts.
//!
//! An `AffinityContext` is a serial executor: one tokio task draining a
//! queue of jobs in submission order. Jobs never overlap, so anything that
//! only runs on the context is observably sequential. The worker task runs
//! inside a task-local scope carrying the context id, which lets code ask
//! "am I on this context right now?" and lets subscriptions assert it.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct ContextInner {
    id: Uuid,
    name: String,
    sender: mpsc::UnboundedSender<Job>,
}

#[derive(Clone)]
struct ContextTag {
    id: Uuid,
    context: Weak<ContextInner>,
}

tokio::task_local! {
    static CURRENT: ContextTag;
}

/// The context has shut down and no longer accepts jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Affinity context is closed")]
pub struct ContextClosed;

/// Handle to a serial execution context. Cheap to clone; clones share the
/// same worker. The worker stops once every handle has been dropped and the
/// queue is empty.
#[derive(Clone)]
pub struct AffinityContext {
    inner: Arc<ContextInner>,
}

impl AffinityContext {
    /// Start a new context on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(name: impl Into<String>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let inner = Arc::new(ContextInner {
            id: Uuid::new_v4(),
            name: name.into(),
            sender,
        });
        let tag = ContextTag {
            id: inner.id,
            context: Arc::downgrade(&inner),
        };
        let id = inner.id;
        let name = inner.name.clone();

        tokio::spawn(CURRENT.scope(tag, async move {
            debug!(context = %name, %id, "Affinity context started");
            while let Some(job) = receiver.recv().await {
                job();
            }
            debug!(context = %name, %id, "Affinity context stopped");
        }));

        Self { inner }
    }

    /// The context the caller is running on, if any.
    pub fn current() -> Option<Self> {
        CURRENT
            .try_with(|tag| tag.context.upgrade())
            .ok()
            .flatten()
            .map(|inner| Self { inner })
    }

    /// The context the caller is running on, or a freshly spawned one.
    pub fn current_or_spawn(name: impl Into<String>) -> Self {
        Self::current().unwrap_or_else(|| Self::spawn(name))
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the caller is running on this context.
    pub fn is_current(&self) -> bool {
        CURRENT
            .try_with(|tag| tag.id == self.inner.id)
            .unwrap_or(false)
    }

    /// Assert the caller is running on this context.
    ///
    /// # Panics
    ///
    /// Panics when called from anywhere else.
    #[track_caller]
    pub fn check(&self) {
        if !self.is_current() {
            let actual = CURRENT.try_with(|tag| tag.id.to_string()).ok();
            panic!(
                "affinity violation: expected context '{}' ({}), running on {}",
                self.inner.name,
                self.inner.id,
                actual.as_deref().unwrap_or("no affinity context"),
            );
        }
    }

    /// Queue a job behind everything already submitted.
    pub fn execute<F>(&self, job: F) -> Result<(), ContextClosed>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.sender.send(Box::new(job)).map_err(|_| {
            warn!(context = %self.inner.name, "Job submitted to a stopped affinity context");
            ContextClosed
        })
    }

    /// Run a closure on the context and wait for its result.
    ///
    /// Must not be awaited from the context itself: the job would queue
    /// behind the awaiting caller.
    pub fn run<F, T>(&self, f: F) -> impl Future<Output = Result<T, ContextClosed>> + Send + 'static
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let submitted = self.execute(move || {
            let _ = tx.send(f());
        });
        async move {
            submitted?;
            rx.await.map_err(|_| ContextClosed)
        }
    }
}

impl PartialEq for AffinityContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for AffinityContext {}

impl fmt::Debug for AffinityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AffinityContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let context = AffinityContext::spawn("ordered");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = seen.clone();
            context.execute(move || seen.lock().unwrap().push(i)).unwrap();
        }
        context.run(|| ()).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_current_inside_and_outside() {
        let context = AffinityContext::spawn("ctx");
        assert!(AffinityContext::current().is_none());
        assert!(!context.is_current());

        let inside = context.clone();
        let (found, is_current) = context
            .run(move || (AffinityContext::current(), inside.is_current()))
            .await
            .unwrap();

        assert_eq!(found, Some(context));
        assert!(is_current);
    }

    #[tokio::test]
    async fn test_contexts_are_distinct() {
        let a = AffinityContext::spawn("a");
        let b = AffinityContext::spawn("b");
        assert_ne!(a, b);

        let b_clone = b.clone();
        let on_b = a.run(move || b_clone.is_current()).await.unwrap();
        assert!(!on_b);
    }

    #[tokio::test]
    async fn test_check_passes_on_context() {
        let context = AffinityContext::spawn("checked");
        let inner = context.clone();
        context.run(move || inner.check()).await.unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "affinity violation")]
    async fn test_check_panics_off_context() {
        let context = AffinityContext::spawn("checked");
        context.check();
    }
}

//! Deferred side effects tied to a persistence commit
//!
//! Work registered with [`UnitOfWork::on_commit`] only runs once the caller
//! reports a successful commit, so a worker never observes a row that is not
//! durable yet.

use futures::future::BoxFuture;
use std::future::Future;

type CommitHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
pub struct UnitOfWork {
    hooks: Vec<CommitHook>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `hook` to run after commit.
    pub fn on_commit<F, Fut>(&mut self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.push(Box::new(move || Box::pin(hook())));
    }

    /// Number of hooks waiting for commit
    pub fn pending(&self) -> usize {
        self.hooks.len()
    }

    /// Run every registered hook once, in registration order.
    pub async fn commit(mut self) -> usize {
        let hooks = std::mem::take(&mut self.hooks);
        let count = hooks.len();
        for hook in hooks {
            hook().await;
        }
        if count > 0 {
            tracing::debug!(hook_count = count, "Post-commit hooks completed");
        }
        count
    }

    /// Drop every registered hook without running it.
    pub fn rollback(mut self) {
        self.discard("rollback");
    }

    fn discard(&mut self, reason: &str) {
        if !self.hooks.is_empty() {
            tracing::debug!(
                hook_count = self.hooks.len(),
                reason,
                "Discarding post-commit hooks"
            );
            self.hooks.clear();
        }
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.discard("dropped without commit");
    }
}

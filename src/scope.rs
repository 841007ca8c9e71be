//! Explicit ownership of subscriptions and background tasks.
//!
//! Everything a component starts is registered in a [`Scope`]; ending the
//! scope aborts the tasks and runs the registered disposers in reverse
//! order. Ending twice is a no-op, and a scope ends itself on drop.

use tokio::task::{AbortHandle, JoinHandle};

#[derive(Default)]
pub struct Scope {
    disposers: Vec<Box<dyn FnOnce() + Send>>,
    tasks: Vec<AbortHandle>,
    ended: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action. Disposers run in reverse registration
    /// order when the scope ends.
    pub fn defer(&mut self, f: impl FnOnce() + Send + 'static) {
        if self.ended {
            log::warn!(target: "Scope", "defer() on an ended scope; running disposer now");
            f();
            return;
        }
        self.disposers.push(Box::new(f));
    }

    /// Tie an already-spawned task to this scope.
    pub fn adopt<T>(&mut self, handle: &JoinHandle<T>) {
        if self.ended {
            handle.abort();
            return;
        }
        self.tasks.push(handle.abort_handle());
    }

    /// Spawn a task that is aborted when the scope ends.
    pub fn spawn<F>(&mut self, future: F)
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.adopt(&handle);
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Abort all adopted tasks and run disposers in reverse order.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        while let Some(dispose) = self.disposers.pop() {
            dispose();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("disposers", &self.disposers.len())
            .field("tasks", &self.tasks.len())
            .field("ended", &self.ended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn disposers_run_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scope = Scope::new();
        for i in 0..3 {
            let order = order.clone();
            scope.defer(move || order.lock().unwrap().push(i));
        }
        scope.end();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn ending_twice_runs_disposers_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scope = Scope::new();
        let c = count.clone();
        scope.defer(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        scope.end();
        scope.end();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scope.is_ended());
    }

    #[test]
    fn drop_ends_the_scope() {
        let fired = Arc::new(AtomicBool::new(false));
        {
            let mut scope = Scope::new();
            let fired = fired.clone();
            scope.defer(move || fired.store(true, Ordering::SeqCst));
        }
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn ending_aborts_spawned_tasks() {
        let fired = Arc::new(AtomicBool::new(false));
        let mut scope = Scope::new();
        let flag = fired.clone();
        scope.spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            flag.store(true, Ordering::SeqCst);
        });
        scope.end();
        tokio::time::advance(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn defer_after_end_runs_immediately() {
        let fired = Arc::new(AtomicBool::new(false));
        let mut scope = Scope::new();
        scope.end();
        let flag = fired.clone();
        scope.defer(move || flag.store(true, Ordering::SeqCst));
        assert!(fired.load(Ordering::SeqCst));
    }
}

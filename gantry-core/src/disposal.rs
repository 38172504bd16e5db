//! Deterministic disposal.
//!
//! Every scope owns a [`DisposalScope`]: disposables registered during
//! activation are released in reverse registration order when the scope is
//! disposed. Registration is thread-safe; `dispose` is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

type Disposer = Box<dyn FnOnce() + Send>;

pub struct DisposalScope {
    items: Mutex<Vec<Disposer>>,
    disposed: AtomicBool,
}

impl DisposalScope {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register a disposer to run when this scope is disposed.
    ///
    /// Registering against an already-disposed scope runs the disposer
    /// immediately, keeping release deterministic.
    pub fn add_disposable(&self, disposer: impl FnOnce() + Send + 'static) {
        if self.disposed.load(Ordering::Acquire) {
            disposer();
            return;
        }
        self.items.lock().push(Box::new(disposer));
    }

    /// Release all registered disposables in LIFO order.
    ///
    /// Subsequent calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut items = std::mem::take(&mut *self.items.lock());
        while let Some(disposer) = items.pop() {
            disposer();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Number of pending disposables.
    pub fn pending(&self) -> usize {
        self.items.lock().len()
    }
}

impl Default for DisposalScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DisposalScope {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DisposalScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalScope")
            .field("pending", &self.pending())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

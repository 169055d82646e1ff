use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Latch connecting signal handlers to the thread that acts on them.
///
/// The handler side calls [`ShutdownToken::request`], which only flips a
/// flag and wakes waiters; a dedicated thread blocks in
/// [`ShutdownToken::wait`] and does the actual teardown. Clones share the
/// same latch.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    requested: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags the shutdown and wakes every waiter. Idempotent.
    pub fn request(&self) {
        let mut requested = self.inner.requested.lock();
        *requested = true;
        self.inner.cond.notify_all();
    }

    /// Blocks until a shutdown has been requested.
    pub fn wait(&self) {
        let mut requested = self.inner.requested.lock();
        while !*requested {
            self.inner.cond.wait(&mut requested);
        }
    }

    pub fn requested(&self) -> bool {
        *self.inner.requested.lock()
    }
}

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Version stamp handed out at the start of a view transition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NavigationToken(u64);

impl NavigationToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Invalidates async view loads that finish after the user has navigated on.
///
/// Call `start_navigation()` synchronously before issuing any load for a
/// transition, then check the token after every await. A stale token means the
/// result must be dropped without touching state; the request itself is not
/// cancelled.
#[derive(Debug, Default)]
pub struct NavigationGuard {
    counter: AtomicU64,
}

impl NavigationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_navigation(&self) -> NavigationToken {
        NavigationToken(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_navigation_valid(&self, token: NavigationToken) -> bool {
        self.counter.load(Ordering::SeqCst) == token.0
    }

    pub fn current(&self) -> NavigationToken {
        NavigationToken(self.counter.load(Ordering::SeqCst))
    }

    /// Await `load` and hand back its output only if `token` is still current
    pub async fn guarded<F>(&self, token: NavigationToken, load: F) -> Option<F::Output>
    where
        F: Future,
    {
        let output = load.await;
        if self.is_navigation_valid(token) {
            Some(output)
        } else {
            tracing::debug!(
                token = token.0,
                current = self.counter.load(Ordering::SeqCst),
                "Discarding stale navigation result"
            );
            None
        }
    }

    pub fn reset(&self) {
        self.counter.store(0, Ordering::SeqCst);
    }
}

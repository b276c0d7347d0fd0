// src/subscription.rs
//! Last-request-wins guard for a view that re-fetches as its inputs change
//! (coin id, period, search term). Results of superseded requests are dropped.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one request issued through a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct Subscription {
    generation: AtomicU64,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new request id; every earlier id becomes outdated.
    pub fn begin(&self) -> RequestId {
        RequestId(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, id: RequestId) -> bool {
        self.generation.load(Ordering::Acquire) == id.0
    }

    /// Run `fut` under a fresh id. `None` when another request began meanwhile.
    ///
    /// The id is taken when `run` is called, not when the returned future is
    /// first polled, so call order decides which request is the latest.
    pub fn run<'a, F, T>(&'a self, fut: F) -> impl Future<Output = Option<T>> + 'a
    where
        F: Future<Output = T> + 'a,
        T: 'a,
    {
        let id = self.begin();
        async move {
            let out = fut.await;
            if self.is_current(id) {
                Some(out)
            } else {
                tracing::debug!(request = id.get(), "dropping superseded result");
                None
            }
        }
    }
}

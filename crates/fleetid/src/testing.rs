//! Fakes shared by unit tests.

use core::time::Duration;
use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::{
    TimeSource,
    backend::{BackendError, BackendResult, CoordinationBackend, KeyValue, LeaseId},
};

/// A settable wall clock. Clones share the same reading.
#[derive(Clone, Debug)]
pub struct MockClock {
    millis: Arc<AtomicU64>,
}

impl MockClock {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::Relaxed);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::Relaxed);
    }
}

impl TimeSource for MockClock {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    GetPrefix,
    Put,
    GrantLease,
    KeepAlive,
    ServerTime,
}

const OPS: usize = 6;

/// Counts calls per operation before delegating to `inner`. Clones share the
/// counters.
pub struct CountingBackend<B> {
    inner: Arc<B>,
    counts: Arc<[AtomicUsize; OPS]>,
}

impl<B> Clone for CountingBackend<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            counts: Arc::clone(&self.counts),
        }
    }
}

impl<B: CoordinationBackend> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner: Arc::new(inner),
            counts: Arc::new(Default::default()),
        }
    }

    pub fn count(&self, op: Op) -> usize {
        self.counts[op as usize].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    fn hit(&self, op: Op) {
        self.counts[op as usize].fetch_add(1, Ordering::Relaxed);
    }
}

impl<B: CoordinationBackend> CoordinationBackend for CountingBackend<B> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>> {
        self.hit(Op::Get);
        self.inner.get(key)
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BackendResult<Vec<KeyValue>>> {
        self.hit(Op::GetPrefix);
        self.inner.get_prefix(prefix)
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        lease: Option<LeaseId>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        self.hit(Op::Put);
        self.inner.put(key, value, lease)
    }

    fn grant_lease(&self, ttl: Duration) -> BoxFuture<'_, BackendResult<LeaseId>> {
        self.hit(Op::GrantLease);
        self.inner.grant_lease(ttl)
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, BackendResult<Duration>> {
        self.hit(Op::KeepAlive);
        self.inner.keep_alive(lease)
    }

    fn server_time(&self) -> BoxFuture<'_, BackendResult<u64>> {
        self.hit(Op::ServerTime);
        self.inner.server_time()
    }
}

#[derive(Copy, Clone, Debug)]
enum Failure {
    Error,
    Hang,
}

/// Fails one operation and delegates the rest to `inner`.
///
/// By default every call to the chosen operation fails. [`Self::after`] lets
/// the first `n` calls through; [`Self::times`] fails only the first `n`.
pub struct FailingBackend<B> {
    inner: B,
    op: Op,
    failure: Failure,
    pass_first: usize,
    fail_first: Option<usize>,
    calls: AtomicUsize,
}

impl<B: CoordinationBackend> FailingBackend<B> {
    pub fn new(inner: B, op: Op) -> Self {
        Self {
            inner,
            op,
            failure: Failure::Error,
            pass_first: 0,
            fail_first: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Calls to `op` never complete.
    pub fn hanging(inner: B, op: Op) -> Self {
        Self {
            failure: Failure::Hang,
            ..Self::new(inner, op)
        }
    }

    pub fn after(mut self, n: usize) -> Self {
        self.pass_first = n;
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.fail_first = Some(n);
        self
    }

    fn intercept<'a, T: Send + 'a>(
        &'a self,
        op: Op,
        call: impl FnOnce() -> BoxFuture<'a, BackendResult<T>>,
    ) -> BoxFuture<'a, BackendResult<T>> {
        if op != self.op {
            return call();
        }
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let fails = n >= self.pass_first
            && self
                .fail_first
                .is_none_or(|limit| n < self.pass_first + limit);
        if !fails {
            return call();
        }
        match self.failure {
            Failure::Error => {
                futures::future::ready(Err(BackendError::Transport("injected failure".into())))
                    .boxed()
            }
            Failure::Hang => futures::future::pending().boxed(),
        }
    }
}

impl<B: CoordinationBackend> CoordinationBackend for FailingBackend<B> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, BackendResult<Option<String>>> {
        self.intercept(Op::Get, || self.inner.get(key))
    }

    fn get_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, BackendResult<Vec<KeyValue>>> {
        self.intercept(Op::GetPrefix, || self.inner.get_prefix(prefix))
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
        lease: Option<LeaseId>,
    ) -> BoxFuture<'a, BackendResult<()>> {
        self.intercept(Op::Put, || self.inner.put(key, value, lease))
    }

    fn grant_lease(&self, ttl: Duration) -> BoxFuture<'_, BackendResult<LeaseId>> {
        self.intercept(Op::GrantLease, || self.inner.grant_lease(ttl))
    }

    fn keep_alive(&self, lease: LeaseId) -> BoxFuture<'_, BackendResult<Duration>> {
        self.intercept(Op::KeepAlive, || self.inner.keep_alive(lease))
    }

    fn server_time(&self) -> BoxFuture<'_, BackendResult<u64>> {
        self.intercept(Op::ServerTime, || self.inner.server_time())
    }
}

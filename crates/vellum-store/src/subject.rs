//! Replay-latest subjects.
//!
//! A [`ReplaySubject`] remembers the last value pushed into it and hands it
//! to every new subscriber synchronously, before any later value. Delivery
//! is synchronous fan-out in registration order.
//!
//! # Invariants
//!
//! 1. A subscriber sees the latest value first, then every later `next`.
//! 2. Observers are called without the subject lock held, so an observer may
//!    push into the same (or another) subject.
//! 3. Dropping a [`Subscription`] removes its observer before the next push.
//! 4. A deferred latest value is computed at most once, on the first read.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;
type Thunk<T> = Arc<dyn Fn() -> T + Send + Sync>;

enum Latest<T> {
    Ready(T),
    /// Computed on first read; see [`ReplaySubject::next_deferred`].
    Deferred(Thunk<T>),
}

impl<T: Clone> Clone for Latest<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Ready(value) => Self::Ready(value.clone()),
            Self::Deferred(thunk) => Self::Deferred(Arc::clone(thunk)),
        }
    }
}

struct Inner<T> {
    latest: Latest<T>,
    observers: Vec<(u64, Observer<T>)>,
    next_id: u64,
}

/// A subject that replays its latest value to new subscribers.
///
/// Cloning yields another handle to the same subject.
pub struct ReplaySubject<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ReplaySubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplaySubject")
            .field("observers", &lock(&self.inner).observers.len())
            .finish()
    }
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    // Observers never run under the lock, so poisoning can only come from a
    // panic inside a plain field update.
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + Sync + 'static> ReplaySubject<T> {
    /// A subject whose latest value starts as `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                latest: Latest::Ready(initial),
                observers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Record `value` as the latest value and deliver it to every observer.
    pub fn next(&self, value: T) {
        let observers = {
            let mut inner = lock(&self.inner);
            inner.latest = Latest::Ready(value.clone());
            snapshot_observers(&inner)
        };
        for observer in observers {
            observer(&value);
        }
    }

    /// Record a latest value that is only computed when someone reads it.
    ///
    /// With no observers attached nothing is computed now; the first
    /// subscriber (or [`value`](Self::value) call) runs `compute`. If
    /// observers are attached the value is computed immediately and
    /// delivered as with [`next`](Self::next).
    pub fn next_deferred(&self, compute: impl Fn() -> T + Send + Sync + 'static) {
        {
            let mut inner = lock(&self.inner);
            if inner.observers.is_empty() {
                inner.latest = Latest::Deferred(Arc::new(compute));
                return;
            }
        }
        self.next(compute());
    }

    /// The latest value, computing a deferred one if needed.
    pub fn value(&self) -> T {
        let latest = lock(&self.inner).latest.clone();
        self.resolve(latest)
    }

    /// Attach `observer`. It is called with the latest value before this
    /// returns, then with every later value until the subscription drops.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let observer: Observer<T> = Arc::new(observer);
        let (id, latest) = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.observers.push((id, Arc::clone(&observer)));
            (id, inner.latest.clone())
        };

        let current = self.resolve(latest);
        observer(&current);

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).observers.retain(|(observer_id, _)| *observer_id != id);
            }
        })
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    /// Read-only view of this subject.
    pub fn as_observable(&self) -> Observable<T> {
        Observable {
            subject: self.clone(),
        }
    }

    fn resolve(&self, latest: Latest<T>) -> T {
        match latest {
            Latest::Ready(value) => value,
            Latest::Deferred(thunk) => {
                let value = thunk();
                let mut inner = lock(&self.inner);
                // Only cache if no newer value arrived while computing.
                let unchanged = matches!(
                    &inner.latest,
                    Latest::Deferred(current) if Arc::ptr_eq(current, &thunk)
                );
                if unchanged {
                    inner.latest = Latest::Ready(value.clone());
                }
                value
            }
        }
    }
}

fn snapshot_observers<T>(inner: &Inner<T>) -> Vec<Observer<T>> {
    inner
        .observers
        .iter()
        .map(|(_, observer)| Arc::clone(observer))
        .collect()
}

// ── read side ────────────────────────────────────────────────────────

/// The subscribe-only side of a [`ReplaySubject`].
pub struct Observable<T> {
    subject: ReplaySubject<T>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Observable").field(&self.subject).finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// See [`ReplaySubject::subscribe`].
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.subject.subscribe(observer)
    }

    /// See [`ReplaySubject::value`].
    pub fn value(&self) -> T {
        self.subject.value()
    }

    pub fn observer_count(&self) -> usize {
        self.subject.observer_count()
    }
}

// ── subscription ─────────────────────────────────────────────────────

/// RAII guard that detaches an observer when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    fn new(release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Detach the observer now.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Keep the observer attached for the lifetime of the subject.
    pub fn detach(mut self) {
        self.release = None;
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

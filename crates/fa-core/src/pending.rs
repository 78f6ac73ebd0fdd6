//! Single-assignment completions for values that are not available yet.
//!
//! A [`Promise`] is the producing half and a [`Pending`] the consuming half of
//! one completion. Consumers may block ([`Pending::wait`]), chain a
//! continuation ([`Pending::then`], [`Pending::on_complete`]) or `.await` it.
//! Continuations registered after completion run inline on the caller's
//! thread; otherwise they run on the thread that fulfils the promise.
//!
//! The consuming methods move the result out when they hold the last
//! [`Pending`] handle and clone it only while other handles can still observe
//! it. A value sent through a completion keeps its buffers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::error::CoreError;

static NEXT_PENDING_ID: AtomicU64 = AtomicU64::new(1);

type Continuation<T> = Box<dyn FnOnce(Result<T, CoreError>) + Send>;

enum Slot<T> {
    Waiting {
        continuations: Vec<Continuation<T>>,
        waker: Option<Waker>,
    },
    Ready(Result<T, CoreError>),
    /// The result was moved to its only consumer.
    Delivered,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    completed: Condvar,
    /// Live [`Pending`] handles; the promise is not counted.
    handles: AtomicUsize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn complete<T: Clone>(shared: &Shared<T>, result: Result<T, CoreError>) {
    let (continuations, waker, undelivered) = {
        let mut slot = shared.lock();
        let (continuations, waker) = match &mut *slot {
            Slot::Waiting {
                continuations,
                waker,
            } => (std::mem::take(continuations), waker.take()),
            Slot::Ready(_) | Slot::Delivered => return,
        };
        let undelivered = if continuations.is_empty() {
            *slot = Slot::Ready(result);
            None
        } else {
            *slot = if shared.handles.load(Ordering::Acquire) > 0 {
                Slot::Ready(result.clone())
            } else {
                Slot::Delivered
            };
            Some(result)
        };
        (continuations, waker, undelivered)
    };
    shared.completed.notify_all();
    if let Some(waker) = waker {
        waker.wake();
    }
    if let Some(result) = undelivered {
        deliver(continuations, result);
    }
}

/// Hand `result` to every continuation; the last one receives it by move.
fn deliver<T: Clone>(mut continuations: Vec<Continuation<T>>, result: Result<T, CoreError>) {
    let last = continuations.pop();
    for continuation in continuations {
        continuation(result.clone());
    }
    if let Some(last) = last {
        last(result);
    }
}

fn already_delivered<T>() -> Result<T, CoreError> {
    Err(CoreError::invalid_state("completion was already consumed"))
}

/// Consuming half of a completion.
pub struct Pending<T> {
    id: u64,
    shared: Arc<Shared<T>>,
}

/// Producing half of a completion. Dropping it unfulfilled resolves the
/// paired [`Pending`] with [`CoreError::BrokenPromise`].
pub struct Promise<T: Clone + Send + 'static> {
    id: u64,
    shared: Option<Arc<Shared<T>>>,
}

impl<T: Clone + Send + 'static> Promise<T> {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fulfill(mut self, result: Result<T, CoreError>) {
        if let Some(shared) = self.shared.take() {
            complete(&shared, result);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            complete(
                &shared,
                Err(CoreError::BrokenPromise {
                    pending_id: self.id,
                }),
            );
        }
    }
}

struct JoinState<T: Clone + Send + 'static> {
    slots: Vec<Option<T>>,
    remaining: usize,
    promise: Option<Promise<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Pending<T> {
    #[must_use]
    pub fn channel() -> (Promise<T>, Self) {
        let id = NEXT_PENDING_ID.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared {
            slot: Mutex::new(Slot::Waiting {
                continuations: Vec::new(),
                waker: None,
            }),
            completed: Condvar::new(),
            handles: AtomicUsize::new(1),
        });
        (
            Promise {
                id,
                shared: Some(Arc::clone(&shared)),
            },
            Self { id, shared },
        )
    }

    /// An already-completed pending value.
    #[must_use]
    pub fn ready(result: Result<T, CoreError>) -> Self {
        let (promise, pending) = Self::channel();
        promise.fulfill(result);
        pending
    }

    #[must_use]
    pub fn value(value: T) -> Self {
        Self::ready(Ok(value))
    }

    #[must_use]
    pub fn failed(error: CoreError) -> Self {
        Self::ready(Err(error))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !matches!(&*self.shared.lock(), Slot::Waiting { .. })
    }

    /// A copy of the result if the completion already happened. Leaves the
    /// result in place for the other handles.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<T, CoreError>> {
        match &*self.shared.lock() {
            Slot::Ready(result) => Some(result.clone()),
            Slot::Delivered => Some(already_delivered()),
            Slot::Waiting { .. } => None,
        }
    }

    /// Take the result out of a completed slot. Moves it when this is the
    /// last handle, otherwise clones it.
    fn claim(&self, slot: &mut Slot<T>) -> Option<Result<T, CoreError>> {
        if matches!(slot, Slot::Ready(_)) && self.shared.handles.load(Ordering::Acquire) == 1 {
            if let Slot::Ready(result) = std::mem::replace(slot, Slot::Delivered) {
                return Some(result);
            }
        }
        match slot {
            Slot::Waiting { .. } => None,
            Slot::Ready(result) => Some(result.clone()),
            Slot::Delivered => Some(already_delivered()),
        }
    }

    /// Block the calling thread until the completion happens.
    pub fn wait(self) -> Result<T, CoreError> {
        let mut slot = self.shared.lock();
        loop {
            if let Some(result) = self.claim(&mut *slot) {
                return result;
            }
            slot = self
                .shared
                .completed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Result<T, CoreError>) + Send + 'static,
    {
        let result = {
            let mut slot = self.shared.lock();
            match self.claim(&mut *slot) {
                Some(result) => result,
                None => {
                    if let Slot::Waiting { continuations, .. } = &mut *slot {
                        continuations.push(Box::new(f));
                    }
                    return;
                }
            }
        };
        f(result);
    }

    /// Chain a continuation; resolved inline when `self` is already complete.
    pub fn then<U, F>(self, f: F) -> Pending<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T, CoreError>) -> Result<U, CoreError> + Send + 'static,
    {
        let (promise, pending) = Pending::channel();
        self.on_complete(move |result| promise.fulfill(f(result)));
        pending
    }

    /// Chain on success only; an error passes through untouched.
    pub fn and_then<U, F>(self, f: F) -> Pending<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<U, CoreError> + Send + 'static,
    {
        self.then(move |result| result.and_then(f))
    }

    /// Chain a continuation that itself produces a pending value.
    pub fn flat_then<U, F>(self, f: F) -> Pending<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Result<T, CoreError>) -> Pending<U> + Send + 'static,
    {
        let (promise, pending) = Pending::channel();
        self.on_complete(move |result| {
            f(result).on_complete(move |next| promise.fulfill(next));
        });
        pending
    }

    /// Complete once every input completed, preserving input order. The first
    /// error observed completes the join with that error.
    #[must_use]
    pub fn join_all(items: Vec<Pending<T>>) -> Pending<Vec<T>> {
        if items.is_empty() {
            return Pending::value(Vec::new());
        }
        let (promise, pending) = Pending::channel();
        let state = Arc::new(Mutex::new(JoinState {
            slots: vec![None; items.len()],
            remaining: items.len(),
            promise: Some(promise),
        }));
        for (index, item) in items.into_iter().enumerate() {
            let state = Arc::clone(&state);
            item.on_complete(move |result| {
                let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                match result {
                    Ok(value) => {
                        guard.slots[index] = Some(value);
                        guard.remaining -= 1;
                        if guard.remaining > 0 {
                            return;
                        }
                        let Some(promise) = guard.promise.take() else {
                            return;
                        };
                        let values = guard
                            .slots
                            .iter_mut()
                            .map(Option::take)
                            .collect::<Option<Vec<_>>>();
                        drop(guard);
                        promise.fulfill(values.ok_or_else(|| {
                            CoreError::invalid_state("join completed with an empty slot")
                        }));
                    }
                    Err(err) => {
                        let promise = guard.promise.take();
                        drop(guard);
                        if let Some(promise) = promise {
                            promise.fulfill(Err(err));
                        }
                    }
                }
            });
        }
        pending
    }
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        self.shared.handles.fetch_add(1, Ordering::AcqRel);
        Self {
            id: self.id,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        self.shared.handles.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ready = !matches!(&*self.shared.lock(), Slot::Waiting { .. });
        f.debug_struct("Pending")
            .field("id", &self.id)
            .field("ready", &ready)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Future for Pending<T> {
    type Output = Result<T, CoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.lock();
        if let Some(result) = self.claim(&mut *slot) {
            return Poll::Ready(result);
        }
        if let Slot::Waiting { waker, .. } = &mut *slot {
            *waker = Some(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::Pending;
    use crate::error::CoreError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll, Waker};
    use std::thread;

    #[test]
    fn ready_value_resolves_inline() {
        let pending = Pending::value(5_i64);
        assert!(pending.is_ready());
        assert_eq!(pending.try_get(), Some(Ok(5)));
        let doubled = pending.and_then(|v| Ok(v * 2));
        assert!(doubled.is_ready());
        assert_eq!(doubled.wait(), Ok(10));
    }

    #[test]
    fn continuation_runs_on_fulfilment() {
        let (promise, pending) = Pending::<i64>::channel();
        let chained = pending.and_then(|v| Ok(v + 1));
        assert!(!chained.is_ready());
        promise.fulfill(Ok(41));
        assert_eq!(chained.wait(), Ok(42));
    }

    #[test]
    fn errors_pass_through_chains_unchanged() {
        let err = CoreError::bad_parameter("sum", "axes must be unique");
        let pending = Pending::<i64>::failed(err.clone());
        let chained = pending.and_then(|v| Ok(v + 1)).and_then(|v| Ok(v * 3));
        assert_eq!(chained.wait(), Err(err));
    }

    #[test]
    fn wait_blocks_until_another_thread_fulfils() {
        let (promise, pending) = Pending::<i64>::channel();
        let worker = thread::spawn(move || promise.fulfill(Ok(7)));
        assert_eq!(pending.wait(), Ok(7));
        worker.join().expect("worker thread should not panic");
    }

    #[test]
    fn dropped_promise_breaks_the_pending_value() {
        let (promise, pending) = Pending::<i64>::channel();
        let id = promise.id();
        drop(promise);
        assert_eq!(pending.wait(), Err(CoreError::BrokenPromise { pending_id: id }));
    }

    #[test]
    fn join_all_preserves_order() {
        let (first_promise, first) = Pending::<i64>::channel();
        let second = Pending::value(2);
        let joined = Pending::join_all(vec![first, second]);
        assert!(!joined.is_ready());
        first_promise.fulfill(Ok(1));
        assert_eq!(joined.wait(), Ok(vec![1, 2]));
    }

    #[test]
    fn join_all_fails_with_the_first_error() {
        let err = CoreError::invalid_state("boom");
        let joined = Pending::join_all(vec![Pending::value(1_i64), Pending::failed(err.clone())]);
        assert_eq!(joined.wait(), Err(err));
    }

    #[test]
    fn flat_then_flattens_nested_completions() {
        let (promise, inner) = Pending::<i64>::channel();
        let outer = Pending::value(3_i64).flat_then(move |_| inner);
        assert!(!outer.is_ready());
        promise.fulfill(Ok(9));
        assert_eq!(outer.wait(), Ok(9));
    }

    #[test]
    fn on_complete_observes_the_result_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (promise, pending) = Pending::<i64>::channel();
        let sink = Arc::clone(&seen);
        pending.on_complete(move |result| sink.lock().expect("lock").push(result));
        promise.fulfill(Ok(1));
        assert_eq!(*seen.lock().expect("lock"), vec![Ok(1)]);
    }

    /// Counts how often it is cloned.
    #[derive(Debug)]
    struct Counted(Arc<AtomicUsize>);

    impl Clone for Counted {
        fn clone(&self) -> Self {
            self.0.fetch_add(1, Ordering::SeqCst);
            Self(Arc::clone(&self.0))
        }
    }

    #[test]
    fn a_single_consumer_receives_the_result_by_move() {
        let clones = Arc::new(AtomicUsize::new(0));
        let ready = Pending::value(Counted(Arc::clone(&clones)))
            .and_then(Ok)
            .wait()
            .expect("ready");
        assert_eq!(clones.load(Ordering::SeqCst), 0);
        drop(ready);

        let (promise, pending) = Pending::channel();
        let chained = Pending::join_all(vec![pending]).and_then(Ok);
        promise.fulfill(Ok(Counted(Arc::clone(&clones))));
        assert_eq!(chained.wait().expect("joined").len(), 1);
        assert_eq!(clones.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn other_handles_still_observe_the_result() {
        let clones = Arc::new(AtomicUsize::new(0));
        let first = Pending::value(Counted(Arc::clone(&clones)));
        let second = first.clone();
        assert!(first.wait().is_ok());
        assert_eq!(clones.load(Ordering::SeqCst), 1);
        assert!(second.is_ready());
        assert!(second.wait().is_ok());
        assert_eq!(clones.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pending_is_pollable_as_a_future() {
        let (promise, mut pending) = Pending::<i64>::channel();
        let mut cx = Context::from_waker(Waker::noop());
        assert_eq!(Pin::new(&mut pending).poll(&mut cx), Poll::Pending);
        promise.fulfill(Ok(3));
        assert_eq!(Pin::new(&mut pending).poll(&mut cx), Poll::Ready(Ok(3)));
    }
}

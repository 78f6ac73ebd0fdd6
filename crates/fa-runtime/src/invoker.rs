//! The invocation capability the Force protocol resolves remote handles with.

use fa_core::{CoreError, Locality, Pending, PendingValue, RemoteHandle, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crate::context::EvalContext;

/// Runs the computation behind a [`RemoteHandle`].
///
/// Errors raised by the target must come back through the returned pending
/// value unchanged.
pub trait Invoker: Send + Sync {
    fn invoke(&self, handle: &RemoteHandle, args: Vec<Value>, ctx: &EvalContext) -> PendingValue;
}

pub type Target = Arc<dyn Fn(&[Value], &EvalContext) -> Result<Value, CoreError> + Send + Sync>;

/// Named targets invoked on the caller's thread.
#[derive(Default, Clone)]
pub struct LocalInvoker {
    targets: BTreeMap<String, Target>,
}

impl LocalInvoker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, target: F) -> Result<(), CoreError>
    where
        F: Fn(&[Value], &EvalContext) -> Result<Value, CoreError> + Send + Sync + 'static,
    {
        if self.targets.contains_key(name) {
            return Err(CoreError::bad_parameter(
                "register",
                format!("target {name:?} is already registered"),
            ));
        }
        self.targets.insert(name.to_owned(), Arc::new(target));
        Ok(())
    }

    /// A handle for a registered target.
    pub fn handle(&self, name: &str) -> Result<RemoteHandle, CoreError> {
        self.lookup(name)?;
        Ok(RemoteHandle::local(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str) -> Result<&Target, CoreError> {
        self.targets.get(name).ok_or_else(|| {
            CoreError::bad_parameter(
                "invoke",
                format!(
                    "unknown target {name:?}; registered: [{}]",
                    self.names().collect::<Vec<_>>().join(", ")
                ),
            )
        })
    }

    fn call(&self, handle: &RemoteHandle, args: &[Value], ctx: &EvalContext) -> Result<Value, CoreError> {
        let target = self.lookup(handle.name())?;
        target(args, ctx)
    }
}

impl fmt::Debug for LocalInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalInvoker")
            .field("targets", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl Invoker for LocalInvoker {
    fn invoke(&self, handle: &RemoteHandle, args: Vec<Value>, ctx: &EvalContext) -> PendingValue {
        Pending::ready(self.call(handle, &args, ctx))
    }
}

/// Runs every call on its own worker thread and completes through a promise,
/// standing in for a target that lives on another locality.
#[derive(Debug)]
pub struct ThreadInvoker {
    targets: Arc<LocalInvoker>,
    locality: u32,
    dispatched: AtomicU64,
}

impl ThreadInvoker {
    #[must_use]
    pub fn new(targets: LocalInvoker, locality: u32) -> Self {
        Self {
            targets: Arc::new(targets),
            locality,
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn handle(&self, name: &str) -> Result<RemoteHandle, CoreError> {
        self.targets.lookup(name)?;
        Ok(RemoteHandle::new(name, Locality::Remote(self.locality)))
    }

    /// Calls handed to a worker so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}

impl Invoker for ThreadInvoker {
    fn invoke(&self, handle: &RemoteHandle, args: Vec<Value>, ctx: &EvalContext) -> PendingValue {
        let (promise, pending) = Pending::channel();
        let targets = Arc::clone(&self.targets);
        let target_handle = handle.clone();
        let worker_ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name(format!("fa-invoke-{}", handle.name()))
            .spawn(move || promise.fulfill(targets.call(&target_handle, &args, &worker_ctx)));
        match spawned {
            Ok(_) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                pending
            }
            Err(err) => Pending::failed(CoreError::invalid_state(format!(
                "could not start a worker for {handle}: {err}"
            ))),
        }
    }
}

use fa_core::CoreError;
use fa_ledger::{EvalLedger, EventKind, EventRecord};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::{EngineConfig, ForcePath};

/// Per-evaluation state handed to invokers and primitives.
///
/// Cloning is cheap; clones share the configuration and the ledger.
#[derive(Debug, Clone)]
pub struct EvalContext {
    primitive: Arc<str>,
    config: Arc<EngineConfig>,
    ledger: Arc<Mutex<EvalLedger>>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EvalContext {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let ledger = EvalLedger::with_capacity(config.ledger_capacity);
        Self {
            primitive: Arc::from("eval"),
            config: Arc::new(config),
            ledger: Arc::new(Mutex::new(ledger)),
        }
    }

    /// The same context, attributed to another primitive.
    #[must_use]
    pub fn with_primitive(&self, primitive: &str) -> Self {
        Self {
            primitive: Arc::from(primitive),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn primitive(&self) -> &str {
        &self.primitive
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn force_path(&self) -> ForcePath {
        self.config.force_path
    }

    fn lock(&self) -> MutexGuard<'_, EvalLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_event(&self, record: EventRecord) {
        if self.config.ledger_enabled {
            self.lock().append(record);
        }
    }

    pub fn record(&self, kind: EventKind, detail: impl Into<String>) {
        self.record_event(EventRecord::new(self.primitive(), kind, detail));
    }

    pub fn record_failure(&self, error: &CoreError) {
        self.record_event(EventRecord::failure(self.primitive(), error));
    }

    /// Run `f` against the shared ledger.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&EvalLedger) -> R) -> R {
        f(&self.lock())
    }

    #[must_use]
    pub fn ledger_snapshot(&self) -> EvalLedger {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::EvalContext;
    use crate::config::EngineConfig;
    use fa_core::CoreError;
    use fa_ledger::EventKind;

    #[test]
    fn clones_share_one_ledger() {
        let ctx = EvalContext::default();
        let sum = ctx.with_primitive("sum");
        sum.record(EventKind::Force, "immediate");
        ctx.record(EventKind::Reduce, "full");
        assert_eq!(ctx.with_ledger(|ledger| ledger.len()), 2);
        let first = ctx.ledger_snapshot().entries().next().cloned().expect("entry");
        assert_eq!(first.primitive, "sum");
    }

    #[test]
    fn disabled_ledger_records_nothing() {
        let ctx = EvalContext::new(EngineConfig {
            ledger_enabled: false,
            ..EngineConfig::default()
        });
        ctx.record_failure(&CoreError::invalid_state("x"));
        assert!(ctx.ledger_snapshot().is_empty());
    }

    #[test]
    fn capacity_comes_from_the_config() {
        let ctx = EvalContext::new(EngineConfig {
            ledger_capacity: 3,
            ..EngineConfig::default()
        });
        assert_eq!(ctx.with_ledger(|ledger| ledger.capacity()), 3);
    }
}

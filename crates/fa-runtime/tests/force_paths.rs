use fa_core::{CoreError, ErrorKind, Pending, Value};
use fa_ledger::EventKind;
use fa_runtime::{
    EngineConfig, EvalContext, ForcePath, LocalInvoker, ThreadInvoker, force, literal_operand,
    numeric_operand_sync,
};
use std::thread;

fn doubling_targets() -> LocalInvoker {
    let mut targets = LocalInvoker::new();
    targets
        .register("double", |args, _| {
            let values = args
                .iter()
                .map(|arg| fa_core::extract::extract_scalar_integer_value(arg, "double"))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::vector_i64(values.into_iter().map(|v| v * 2).collect()))
        })
        .expect("fresh name");
    targets
        .register("nested", |_, _| {
            Ok(Value::list(vec![
                Value::scalar_i64(1),
                Value::pending(Pending::value(Value::scalar_i64(2))),
            ]))
        })
        .expect("fresh name");
    targets
}

fn context(json: &str) -> EvalContext {
    EvalContext::new(EngineConfig::from_json(json).expect("valid config"))
}

#[test]
fn configured_paths_resolve_remote_calls_identically() {
    let invoker = ThreadInvoker::new(doubling_targets(), 7);
    let args = vec![Value::scalar_i64(4), Value::scalar_i64(-1)];

    let mut results = Vec::new();
    for json in [r#"{"force_path":"inline"}"#, r#"{"force_path":"scheduled"}"#] {
        let ctx = context(json);
        let handle = invoker.handle("double").expect("registered");
        let pending = force(Value::remote(handle), args.clone(), &invoker, &ctx);
        if ctx.force_path() == ForcePath::Inline {
            assert!(pending.is_ready());
        }
        results.push(pending.wait().expect("invocation succeeds"));
        assert_eq!(ctx.ledger_snapshot().entries_of(EventKind::Invoke).count(), 1);
    }
    assert_eq!(results[0], Value::vector_i64(vec![8, -2]));
    assert_eq!(results[0], results[1]);
    assert_eq!(invoker.dispatched(), 2);
}

#[test]
fn continuations_run_when_another_thread_fulfils() {
    let ctx = context(r#"{"force_path":"scheduled"}"#);
    let (promise, pending) = Pending::<Value>::channel();
    let invoker = LocalInvoker::new();
    let chained = force(Value::pending(pending), Vec::new(), &invoker, &ctx);
    assert!(!chained.is_ready());

    let worker = thread::spawn(move || promise.fulfill(Ok(Value::scalar_f64(1.5))));
    assert_eq!(chained.wait(), Ok(Value::scalar_f64(1.5)));
    worker.join().expect("worker finished");
}

#[test]
fn literal_force_flattens_pending_leaves_from_a_worker() {
    let invoker = ThreadInvoker::new(doubling_targets(), 1);
    let ctx = EvalContext::default();
    let handle = invoker.handle("nested").expect("registered");
    let literal = literal_operand(Value::remote(handle), Vec::new(), &invoker, &ctx)
        .wait()
        .expect("all leaves resolve");
    assert_eq!(
        literal,
        Value::list(vec![Value::scalar_i64(1), Value::scalar_i64(2)])
    );
}

#[test]
fn argument_errors_come_back_as_bad_parameters() {
    let invoker = doubling_targets();
    let ctx = EvalContext::default().with_primitive("double");
    let handle = invoker.handle("double").expect("registered");
    let err: CoreError = numeric_operand_sync(
        Value::remote(handle),
        vec![Value::string("four")],
        &invoker,
        &ctx,
    )
    .expect_err("string argument");
    assert_eq!(err.kind(), ErrorKind::BadParameter);
    assert_eq!(ctx.ledger_snapshot().entries_of(EventKind::Failure).count(), 1);
}

//! The Force protocol: turning operands that may be remote handles or pending
//! computations into immediate data.
//!
//! | operand               | asynchronous form                  | `_sync` form        |
//! |-----------------------|------------------------------------|---------------------|
//! | data                  | returned as is                     | returned as is      |
//! | remote handle         | invoked, the invoker's pending     | invoked and awaited |
//! | pending, complete     | resolved inline                    | resolved inline     |
//! | pending, in flight    | chained on completion              | awaited             |
//!
//! Errors from an invocation travel through the pending value untouched.

use fa_core::extract::{
    extract_boolean_value, extract_integer_value, extract_numeric_value,
    extract_scalar_integer_value,
};
use fa_core::{ArrayStorage, CoreError, Pending, PendingValue, RemoteHandle, Value, ValueKind};
use fa_ledger::{EventKind, EventRecord};

use crate::config::ForcePath;
use crate::context::EvalContext;
use crate::invoker::Invoker;

fn note(ctx: &EvalContext, how: &'static str, operand: &str) {
    ctx.record_event(
        EventRecord::new(ctx.primitive(), EventKind::Force, how).with_field("operand", operand),
    );
}

fn note_invoke(ctx: &EvalContext, handle: &RemoteHandle, argc: usize) {
    ctx.record_event(
        EventRecord::new(ctx.primitive(), EventKind::Invoke, handle.to_string())
            .with_field("args", argc),
    );
}

/// Resolve `value` without blocking.
///
/// Data is wrapped in an already-complete pending value and keeps its buffers;
/// an owning array stays owning.
pub fn value_operand(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> PendingValue {
    let Value { kind, annotation } = value;
    match kind {
        ValueKind::Remote(handle) => {
            note_invoke(ctx, &handle, args.len());
            invoker.invoke(&handle, args, ctx)
        }
        ValueKind::Pending(pending) => {
            if pending.is_ready() {
                note(ctx, "inline", "pending computation");
            } else {
                note(ctx, "chained", "pending computation");
            }
            pending
        }
        kind => {
            note(ctx, "immediate", kind.type_name());
            Pending::value(Value { kind, annotation })
        }
    }
}

/// Resolve `value`, blocking until any invocation or pending computation
/// completes.
pub fn value_operand_sync(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<Value, CoreError> {
    let result = if value.is_unresolved() {
        value_operand(value, args, invoker, ctx).wait()
    } else {
        note(ctx, "immediate", value.type_name());
        Ok(value)
    };
    if let Err(err) = &result {
        ctx.record_failure(err);
    }
    result
}

/// Like [`value_operand`] but leaves `value` intact; data comes back as an
/// alias of the operand's buffers.
pub fn value_operand_ref(
    value: &Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> PendingValue {
    if value.is_unresolved() {
        value_operand(value.clone(), args, invoker, ctx)
    } else {
        note(ctx, "immediate", value.type_name());
        Pending::value(value.make_ref())
    }
}

/// Resolve and then demote every list or dict leaf to data.
///
/// Pending leaves are awaited. A leaf that is still a remote handle after
/// resolution fails with a type mismatch; it is never invoked.
pub fn literal_operand(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> PendingValue {
    let ctx = ctx.clone();
    value_operand(value, args, invoker, &ctx).flat_then(move |result| match result {
        Ok(resolved) => demote(resolved, &ctx),
        Err(err) => Pending::failed(err),
    })
}

pub fn literal_operand_sync(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<Value, CoreError> {
    literal_operand(value, args, invoker, ctx).wait()
}

fn demote(value: Value, ctx: &EvalContext) -> PendingValue {
    let Value { kind, annotation } = value;
    match kind {
        ValueKind::Remote(_) => {
            let err = CoreError::type_mismatch(ctx.primitive(), "literal data", "remote handle");
            ctx.record_failure(&err);
            Pending::failed(err)
        }
        ValueKind::Pending(pending) => {
            let ctx = ctx.clone();
            pending.flat_then(move |result| match result {
                Ok(resolved) => demote(resolved, &ctx),
                Err(err) => Pending::failed(err),
            })
        }
        ValueKind::List(items) => {
            let parts = items.into_iter().map(|item| demote(item, ctx)).collect();
            Pending::join_all(parts).and_then(move |values| {
                Ok(Value {
                    kind: ValueKind::List(values),
                    annotation,
                })
            })
        }
        ValueKind::Dict(entries) => {
            let (keys, items): (Vec<String>, Vec<Value>) = entries.into_iter().unzip();
            let parts = items.into_iter().map(|item| demote(item, ctx)).collect();
            Pending::join_all(parts).and_then(move |values| {
                Ok(Value {
                    kind: ValueKind::Dict(keys.into_iter().zip(values).collect()),
                    annotation,
                })
            })
        }
        kind => Pending::value(Value { kind, annotation }),
    }
}

/// Resolve along the path the configuration selects.
///
/// [`ForcePath::Inline`] blocks and returns a completed pending value,
/// [`ForcePath::Scheduled`] chains. Both produce the same result.
pub fn force(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> PendingValue {
    match ctx.force_path() {
        ForcePath::Inline => Pending::ready(value_operand_sync(value, args, invoker, ctx)),
        ForcePath::Scheduled => value_operand(value, args, invoker, ctx),
    }
}

/// Resolve a whole argument list, preserving order.
pub fn force_operands(
    values: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Pending<Vec<Value>> {
    let parts = values
        .into_iter()
        .map(|value| force(value, Vec::new(), invoker, ctx))
        .collect();
    Pending::join_all(parts)
}

pub fn force_operands_sync(
    values: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<Vec<Value>, CoreError> {
    values
        .into_iter()
        .map(|value| value_operand_sync(value, Vec::new(), invoker, ctx))
        .collect()
}

pub fn numeric_operand(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Pending<ArrayStorage<f64>> {
    let name = ctx.primitive().to_owned();
    value_operand(value, args, invoker, ctx).and_then(move |v| extract_numeric_value(v, &name))
}

pub fn integer_operand(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Pending<ArrayStorage<i64>> {
    let name = ctx.primitive().to_owned();
    value_operand(value, args, invoker, ctx).and_then(move |v| extract_integer_value(v, &name))
}

pub fn boolean_operand(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Pending<ArrayStorage<bool>> {
    let name = ctx.primitive().to_owned();
    value_operand(value, args, invoker, ctx).and_then(move |v| extract_boolean_value(v, &name))
}

pub fn scalar_integer_operand(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Pending<i64> {
    let name = ctx.primitive().to_owned();
    value_operand(value, args, invoker, ctx)
        .and_then(move |v| extract_scalar_integer_value(&v, &name))
}

pub fn numeric_operand_sync(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<ArrayStorage<f64>, CoreError> {
    extract_numeric_value(value_operand_sync(value, args, invoker, ctx)?, ctx.primitive())
}

pub fn integer_operand_sync(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<ArrayStorage<i64>, CoreError> {
    extract_integer_value(value_operand_sync(value, args, invoker, ctx)?, ctx.primitive())
}

pub fn boolean_operand_sync(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<ArrayStorage<bool>, CoreError> {
    extract_boolean_value(value_operand_sync(value, args, invoker, ctx)?, ctx.primitive())
}

pub fn scalar_integer_operand_sync(
    value: Value,
    args: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<i64, CoreError> {
    extract_scalar_integer_value(&value_operand_sync(value, args, invoker, ctx)?, ctx.primitive())
}

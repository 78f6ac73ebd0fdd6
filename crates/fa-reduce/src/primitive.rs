//! The statistics primitives: argument parsing, dtype dispatch, and the
//! forcing entry points that tie reduction to the evaluation runtime.

use fa_core::extract::{
    extract_boolean_value_strict, extract_integer_list, extract_integer_value_strict,
    extract_numeric_value_strict, extract_scalar, extract_scalar_boolean_value,
    extract_string_value,
};
use fa_core::{ArrayStorage, CoreError, DType, Element, PendingValue, Value, ValueKind};
use fa_ledger::{EventKind, EventRecord};
use fa_runtime::{EvalContext, Invoker, force_operands, force_operands_sync};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::axes::AxisSpec;
use crate::engine::{ReduceParams, ReductionMode, reduce};
use crate::ops::{All, Any, Max, Mean, Min, Prod, ReduceOp, Sum};
use crate::promotion::result_dtype;

/// Operand positions after the reduced array: `axis`, `keepdims`, `initial`,
/// `dtype`.
const MAX_OPERANDS: usize = 5;

/// Everything about a reduction call except the operand itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReduceArgs {
    pub axes: AxisSpec,
    pub keepdims: bool,
    pub initial: Option<Value>,
    pub dtype: Option<DType>,
}

impl ReduceArgs {
    #[must_use]
    pub fn over(axes: AxisSpec) -> Self {
        Self {
            axes,
            ..Self::default()
        }
    }
}

fn supplied(operand: Option<Value>) -> Option<Value> {
    operand.filter(|value| !value.is_nil())
}

/// Split `[operand, axis?, keepdims?, initial?, dtype?]` into the operand and
/// its arguments. A missing or nil argument takes its default.
pub fn parse_reduce_args(
    name: &str,
    operands: Vec<Value>,
) -> Result<(Value, ReduceArgs), CoreError> {
    if operands.len() > MAX_OPERANDS {
        return Err(CoreError::bad_parameter(
            name,
            format!(
                "expected at most {MAX_OPERANDS} operands, got {}",
                operands.len()
            ),
        ));
    }
    let mut operands = operands.into_iter();
    let operand = operands
        .next()
        .ok_or_else(|| CoreError::bad_parameter(name, "expected an operand to reduce"))?;

    let axes = match supplied(operands.next()) {
        None => AxisSpec::All,
        Some(axis) => AxisSpec::Axes(SmallVec::from_vec(extract_integer_list(&axis, name)?)),
    };
    let keepdims = match supplied(operands.next()) {
        None => false,
        Some(flag) => extract_scalar_boolean_value(&flag, name)?,
    };
    let initial = supplied(operands.next());
    let dtype = match supplied(operands.next()) {
        None => None,
        Some(dtype) => {
            let dtype = extract_string_value(&dtype, name)?;
            Some(DType::from_name(&dtype).ok_or_else(|| {
                CoreError::bad_parameter(name, format!("unknown dtype {dtype:?}"))
            })?)
        }
    };

    Ok((
        operand,
        ReduceArgs {
            axes,
            keepdims,
            initial,
            dtype,
        },
    ))
}

struct Outcome {
    kind: ValueKind,
    mode: ReductionMode,
    in_place: bool,
}

fn seed<R: Element>(initial: &Value, name: &str) -> Result<R, CoreError> {
    if initial.dtype().is_none() {
        return Err(CoreError::bad_parameter(
            name,
            format!(
                "initial value must be a numeric scalar, got {}",
                initial.type_name()
            ),
        ));
    }
    extract_scalar::<R>(initial, name)
}

fn run<Op, T, R>(op: &Op, input: ArrayStorage<T>, args: &ReduceArgs) -> Result<Outcome, CoreError>
where
    Op: ReduceOp,
    T: Element,
    R: Element,
{
    let initial = args
        .initial
        .as_ref()
        .map(|initial| seed::<R>(initial, op.name()))
        .transpose()?;
    let params = ReduceParams {
        axes: args.axes.clone(),
        keepdims: args.keepdims,
        initial,
    };
    let reduction = reduce(op, input, &params)?;
    Ok(Outcome {
        kind: R::wrap(reduction.result),
        mode: reduction.mode,
        in_place: reduction.in_place,
    })
}

fn dispatch_result<Op, T>(
    op: &Op,
    input: ArrayStorage<T>,
    result: DType,
    args: &ReduceArgs,
) -> Result<Outcome, CoreError>
where
    Op: ReduceOp,
    T: Element,
{
    match result {
        DType::Bool => run::<Op, T, bool>(op, input, args),
        DType::I64 => run::<Op, T, i64>(op, input, args),
        DType::F64 => run::<Op, T, f64>(op, input, args),
    }
}

fn reduce_resolved<Op: ReduceOp>(
    op: &Op,
    operand: Value,
    args: &ReduceArgs,
    ctx: &EvalContext,
) -> Result<Value, CoreError> {
    let name = op.name();
    let Some(input) = operand.dtype() else {
        return Err(CoreError::type_mismatch(
            name,
            "numeric array",
            operand.type_name(),
        ));
    };
    let output = result_dtype(input, |dtype| op.result_dtype(dtype), args.dtype);
    let annotation = operand.annotation.clone();

    let outcome = match input {
        DType::Bool => {
            dispatch_result(op, extract_boolean_value_strict(operand, name)?, output, args)
        }
        DType::I64 => {
            dispatch_result(op, extract_integer_value_strict(operand, name)?, output, args)
        }
        DType::F64 => {
            dispatch_result(op, extract_numeric_value_strict(operand, name)?, output, args)
        }
    }?;

    ctx.record_event(
        EventRecord::new(ctx.primitive(), EventKind::Reduce, outcome.mode.as_str())
            .with_field("input_dtype", input)
            .with_field("result_dtype", output)
            .with_field("in_place", outcome.in_place),
    );
    Ok(Value {
        kind: outcome.kind,
        annotation,
    })
}

/// Reduce an already resolved operand with `op`.
///
/// The element type comes from the operator's promotion rule unless
/// `args.dtype` overrides it. The operand's annotation carries over to the
/// result.
pub fn reduce_value<Op: ReduceOp>(
    op: &Op,
    operand: Value,
    args: &ReduceArgs,
    ctx: &EvalContext,
) -> Result<Value, CoreError> {
    let result = reduce_resolved(op, operand, args, ctx);
    if let Err(err) = &result {
        ctx.record_failure(err);
    }
    result
}

/// The statistics primitives exposed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistics {
    Sum,
    Prod,
    Mean,
    Amax,
    Amin,
    Any,
    All,
}

impl Statistics {
    pub const ALL: [Self; 7] = [
        Self::Sum,
        Self::Prod,
        Self::Mean,
        Self::Amax,
        Self::Amin,
        Self::Any,
        Self::All,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => Sum.name(),
            Self::Prod => Prod.name(),
            Self::Mean => Mean.name(),
            Self::Amax => Max.name(),
            Self::Amin => Min.name(),
            Self::Any => Any.name(),
            Self::All => All.name(),
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stat| stat.name() == name)
    }

    pub fn apply(
        self,
        operand: Value,
        args: &ReduceArgs,
        ctx: &EvalContext,
    ) -> Result<Value, CoreError> {
        match self {
            Self::Sum => reduce_value(&Sum, operand, args, ctx),
            Self::Prod => reduce_value(&Prod, operand, args, ctx),
            Self::Mean => reduce_value(&Mean, operand, args, ctx),
            Self::Amax => reduce_value(&Max, operand, args, ctx),
            Self::Amin => reduce_value(&Min, operand, args, ctx),
            Self::Any => reduce_value(&Any, operand, args, ctx),
            Self::All => reduce_value(&All, operand, args, ctx),
        }
    }
}

fn evaluate(stat: Statistics, operands: Vec<Value>, ctx: &EvalContext) -> Result<Value, CoreError> {
    match parse_reduce_args(stat.name(), operands) {
        Ok((operand, args)) => stat.apply(operand, &args, ctx),
        Err(err) => {
            ctx.record_failure(&err);
            Err(err)
        }
    }
}

/// Force every operand, then reduce. Remote and pending operands are resolved
/// along the configured force path, so the call never blocks on the scheduled
/// path.
pub fn eval_statistics(
    stat: Statistics,
    operands: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> PendingValue {
    let ctx = ctx.with_primitive(stat.name());
    force_operands(operands, invoker, &ctx).and_then(move |resolved| evaluate(stat, resolved, &ctx))
}

pub fn eval_statistics_sync(
    stat: Statistics,
    operands: Vec<Value>,
    invoker: &dyn Invoker,
    ctx: &EvalContext,
) -> Result<Value, CoreError> {
    let ctx = ctx.with_primitive(stat.name());
    let resolved = force_operands_sync(operands, invoker, &ctx)?;
    evaluate(stat, resolved, &ctx)
}

#[cfg(test)]
mod tests {
    use super::{
        ReduceArgs, Statistics, eval_statistics, eval_statistics_sync, parse_reduce_args,
        reduce_value,
    };
    use crate::axes::AxisSpec;
    use crate::ops::{Mean, Sum};
    use fa_core::{Annotation, ArrayStorage, DType, ErrorKind, Value};
    use fa_ledger::EventKind;
    use fa_runtime::{EngineConfig, EvalContext, ForcePath, LocalInvoker, ThreadInvoker};

    fn matrix() -> Value {
        ArrayStorage::matrix(vec![vec![1_i64, 2], vec![3, 4]])
            .expect("rectangular")
            .into()
    }

    fn targets() -> LocalInvoker {
        let mut targets = LocalInvoker::new();
        targets
            .register("matrix", |_, _| Ok(matrix()))
            .expect("fresh name");
        targets
    }

    #[test]
    fn nil_arguments_take_defaults() {
        let (operand, args) =
            parse_reduce_args("sum", vec![matrix(), Value::nil(), Value::nil()]).expect("parsed");
        assert_eq!(operand, matrix());
        assert_eq!(args, ReduceArgs::default());
    }

    #[test]
    fn arguments_are_read_by_position() {
        let (_, args) = parse_reduce_args(
            "sum",
            vec![
                matrix(),
                Value::vector_i64(vec![-1]),
                Value::scalar_bool(true),
                Value::scalar_i64(5),
                Value::string("double"),
            ],
        )
        .expect("parsed");
        assert_eq!(args.axes, AxisSpec::single(-1));
        assert!(args.keepdims);
        assert_eq!(args.initial, Some(Value::scalar_i64(5)));
        assert_eq!(args.dtype, Some(DType::F64));
    }

    #[test]
    fn malformed_arguments_are_bad_parameters() {
        let operands = vec![
            matrix(),
            Value::nil(),
            Value::nil(),
            Value::nil(),
            Value::string("complex"),
        ];
        let unknown = parse_reduce_args("sum", operands).expect_err("unknown dtype");
        assert_eq!(unknown.kind(), ErrorKind::BadParameter);
        assert!(parse_reduce_args("sum", Vec::new()).is_err());
        assert!(parse_reduce_args("sum", vec![Value::nil(); 6]).is_err());
        let flag = parse_reduce_args("sum", vec![matrix(), Value::nil(), Value::vector_i64(vec![1])]);
        assert!(flag.expect_err("keepdims must be a scalar").is_bad_parameter());
    }

    #[test]
    fn reduction_keeps_annotation_and_logs_mode() {
        let ctx = EvalContext::default().with_primitive("sum");
        let operand = matrix().with_annotation(Annotation::new("layout").with_entry("tile", "2"));
        let result = reduce_value(&Sum, operand, &ReduceArgs::over(AxisSpec::single(0)), &ctx)
            .expect("reduced");
        assert_eq!(result, Value::vector_i64(vec![4, 6]));
        assert_eq!(result.annotation().and_then(|a| a.get("tile")), Some("2"));

        let ledger = ctx.ledger_snapshot();
        let entry = ledger.entries_of(EventKind::Reduce).last().expect("reduce event");
        assert_eq!(entry.detail, "columns");
        assert_eq!(entry.field("in_place"), Some("true"));
    }

    #[test]
    fn dtype_override_and_promotion() {
        let ctx = EvalContext::default();
        let mean = reduce_value(&Mean, matrix(), &ReduceArgs::default(), &ctx).expect("mean");
        assert_eq!(mean, Value::scalar_f64(2.5));

        let args = ReduceArgs {
            dtype: Some(DType::I64),
            ..ReduceArgs::default()
        };
        let truncated = reduce_value(&Mean, matrix(), &args, &ctx).expect("mean as int64");
        assert_eq!(truncated, Value::scalar_i64(2));

        let flags = Value::from(ArrayStorage::vector(vec![true, true, false]));
        let count = reduce_value(&Sum, flags, &ReduceArgs::default(), &ctx).expect("count");
        assert_eq!(count, Value::scalar_i64(2));
    }

    #[test]
    fn seeds_must_be_rank_zero_numbers() {
        let ctx = EvalContext::default();
        let args = ReduceArgs {
            initial: Some(Value::scalar_f64(0.5)),
            ..ReduceArgs::default()
        };
        let seeded = reduce_value(&Sum, matrix(), &args, &ctx).expect("seeded");
        assert_eq!(seeded, Value::scalar_i64(10));

        for bad in [Value::vector_i64(vec![1]), Value::string("zero")] {
            let args = ReduceArgs {
                initial: Some(bad),
                ..ReduceArgs::default()
            };
            let err = reduce_value(&Sum, matrix(), &args, &ctx).expect_err("bad seed");
            assert_eq!(err.kind(), ErrorKind::BadParameter);
        }
        assert_eq!(ctx.ledger_snapshot().entries_of(EventKind::Failure).count(), 2);
    }

    #[test]
    fn non_numeric_operands_are_rejected() {
        let ctx = EvalContext::default();
        let err = reduce_value(&Sum, Value::string("abc"), &ReduceArgs::default(), &ctx)
            .expect_err("string operand");
        assert!(err.is_bad_parameter());
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn statistics_names_round_trip() {
        for stat in Statistics::ALL {
            assert_eq!(Statistics::from_name(stat.name()), Some(stat));
        }
        assert_eq!(Statistics::from_name("median"), None);
    }

    #[test]
    fn remote_operands_resolve_on_both_paths() {
        let local = targets();
        let remote = ThreadInvoker::new(targets(), 3);
        let operands = |handle| vec![Value::remote(handle), Value::scalar_i64(1)];

        let inline = eval_statistics_sync(
            Statistics::Sum,
            operands(local.handle("matrix").expect("registered")),
            &local,
            &EvalContext::default(),
        )
        .expect("inline");

        let scheduled_ctx = EvalContext::new(EngineConfig {
            force_path: ForcePath::Scheduled,
            ..EngineConfig::default()
        });
        let scheduled = eval_statistics(
            Statistics::Sum,
            operands(remote.handle("matrix").expect("registered")),
            &remote,
            &scheduled_ctx,
        )
        .wait()
        .expect("scheduled");

        assert_eq!(inline, Value::vector_i64(vec![3, 7]));
        assert_eq!(inline, scheduled);
        assert_eq!(remote.dispatched(), 1);
    }
}

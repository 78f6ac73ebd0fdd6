//! The standard reduction operators.

use fa_core::{DType, Element};

use crate::promotion::{accumulate_dtype, logical_dtype, mean_dtype, same_dtype};

/// The pluggable behaviour behind one reduction.
///
/// For every output cell the engine starts from `identity` (or a caller seed),
/// folds each input element in with `combine`, then applies `finalize` with
/// the number of elements folded.
pub trait ReduceOp {
    fn name(&self) -> &'static str;

    /// Element type the operator produces for a given input type.
    fn result_dtype(&self, input: DType) -> DType;

    fn identity<R: Element>(&self) -> R;

    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R;

    fn finalize<R: Element>(&self, acc: R, _count: usize) -> R {
        acc
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl ReduceOp for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }
    fn result_dtype(&self, input: DType) -> DType {
        accumulate_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::zero()
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        acc.add(element.cast())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Prod;

impl ReduceOp for Prod {
    fn name(&self) -> &'static str {
        "prod"
    }
    fn result_dtype(&self, input: DType) -> DType {
        accumulate_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::one()
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        acc.mul(element.cast())
    }
}

/// Arithmetic mean. Empty reductions of doubles yield NaN.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl ReduceOp for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }
    fn result_dtype(&self, input: DType) -> DType {
        mean_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::zero()
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        acc.add(element.cast())
    }
    fn finalize<R: Element>(&self, acc: R, count: usize) -> R {
        acc.div_count(count)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl ReduceOp for Max {
    fn name(&self) -> &'static str {
        "amax"
    }
    fn result_dtype(&self, input: DType) -> DType {
        same_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::lowest()
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        acc.max_of(element.cast())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl ReduceOp for Min {
    fn name(&self) -> &'static str {
        "amin"
    }
    fn result_dtype(&self, input: DType) -> DType {
        same_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::highest()
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        acc.min_of(element.cast())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Any;

impl ReduceOp for Any {
    fn name(&self) -> &'static str {
        "any"
    }
    fn result_dtype(&self, input: DType) -> DType {
        logical_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::from_bool(false)
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        R::from_bool(acc.to_bool() || element.to_bool())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct All;

impl ReduceOp for All {
    fn name(&self) -> &'static str {
        "all"
    }
    fn result_dtype(&self, input: DType) -> DType {
        logical_dtype(input)
    }
    fn identity<R: Element>(&self) -> R {
        R::from_bool(true)
    }
    fn combine<E: Element, R: Element>(&self, element: E, acc: R) -> R {
        R::from_bool(acc.to_bool() && element.to_bool())
    }
}

#[cfg(test)]
mod tests {
    use super::{All, Any, Max, Mean, Min, Prod, ReduceOp, Sum};
    use fa_core::DType;

    fn fold<Op: ReduceOp>(op: &Op, values: &[i64]) -> i64 {
        let acc = values
            .iter()
            .fold(op.identity::<i64>(), |acc, &v| op.combine(v, acc));
        op.finalize(acc, values.len())
    }

    #[test]
    fn integer_folds_match_their_definitions() {
        let values = [3, -1, 4, 1, 5];
        assert_eq!(fold(&Sum, &values), 12);
        assert_eq!(fold(&Prod, &values), -60);
        assert_eq!(fold(&Max, &values), 5);
        assert_eq!(fold(&Min, &values), -1);
        assert_eq!(fold(&Mean, &values), 2);
    }

    #[test]
    fn identities_are_neutral_on_empty_input() {
        assert_eq!(fold(&Sum, &[]), 0);
        assert_eq!(fold(&Prod, &[]), 1);
        assert_eq!(fold(&Max, &[]), i64::MIN);
        assert_eq!(fold(&Min, &[]), i64::MAX);
        assert!(Mean.finalize(Mean.identity::<f64>(), 0).is_nan());
    }

    #[test]
    fn logical_reductions_test_for_non_zero() {
        assert!(Any.combine(2.5_f64, Any.identity::<bool>()));
        assert!(!All.combine(0_i64, All.identity::<bool>()));
        assert!(All.identity::<bool>());
        assert_eq!(Any.result_dtype(DType::F64), DType::Bool);
    }

    #[test]
    fn result_dtypes_follow_the_promotion_rules() {
        assert_eq!(Sum.result_dtype(DType::Bool), DType::I64);
        assert_eq!(Mean.result_dtype(DType::I64), DType::F64);
        assert_eq!(Max.result_dtype(DType::Bool), DType::Bool);
        assert_eq!(Prod.name(), "prod");
    }
}

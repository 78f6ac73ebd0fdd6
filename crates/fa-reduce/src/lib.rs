#![forbid(unsafe_code)]

//! Axis reduction over [`fa_core::ArrayStorage`] and the statistics
//! primitives built on it.

pub mod axes;
pub mod engine;
pub mod ops;
pub mod primitive;
pub mod promotion;

pub use axes::{AxisList, AxisSpec, normalize_axes, reduced_shape};
pub use engine::{ReduceParams, Reduction, ReductionMode, ReductionPlan, reduce};
pub use ops::{All, Any, Max, Mean, Min, Prod, ReduceOp, Sum};
pub use primitive::{
    ReduceArgs, Statistics, eval_statistics, eval_statistics_sync, parse_reduce_args,
    reduce_value,
};

//! The generic axis-reduction engine.
//!
//! Every reduction runs the same strided kernel: the kept axes are walked in
//! row-major order, and for each output cell the orthogonal sub-array over the
//! reduced axes is folded in row-major order straight out of the input buffer.
//! Nothing is flattened or transposed first, so a slice-wise reduction of a
//! rank-3 or rank-4 operand costs no extra copy, and the visitation order is
//! the same on every run.
//!
//! When the input is owning and the result element type equals the input
//! element type, results are written back into the input buffer. Output cell
//! `o` only reads input offsets `>= o`, and a cell is written after all of its
//! reads, so the rewrite never clobbers a value still to be read.

use fa_core::{ArrayStorage, CoreError, Element, Shape};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::axes::{AxisList, AxisSpec, normalize_axes, reduced_shape};
use crate::ops::ReduceOp;

/// How a reduction was carried out, derived from rank and axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionMode {
    /// No axes: the operator is applied pointwise against the seed.
    Elementwise,
    /// Every axis is reduced to a single value.
    Full,
    /// Rank 2, axis 1: one value per row.
    Rows,
    /// Rank 2, axis 0: one value per column.
    Columns,
    /// Rank 3 or 4 with some axes kept: each slice over the reduced axes is
    /// folded independently.
    SliceWise,
}

impl ReductionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elementwise => "elementwise",
            Self::Full => "full",
            Self::Rows => "rows",
            Self::Columns => "columns",
            Self::SliceWise => "slice_wise",
        }
    }

    fn classify(rank: usize, axes: &[usize]) -> Self {
        match (rank, axes) {
            (rank, axes) if axes.len() == rank => Self::Full,
            (_, []) => Self::Elementwise,
            (2, [0]) => Self::Columns,
            (2, _) => Self::Rows,
            _ => Self::SliceWise,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReduceParams<R> {
    pub axes: AxisSpec,
    pub keepdims: bool,
    /// Overrides the operator's identity as the starting accumulator.
    pub initial: Option<R>,
}

impl<R> Default for ReduceParams<R> {
    fn default() -> Self {
        Self {
            axes: AxisSpec::All,
            keepdims: false,
            initial: None,
        }
    }
}

impl<R> ReduceParams<R> {
    #[must_use]
    pub fn over(axes: AxisSpec) -> Self {
        Self {
            axes,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn keepdims(mut self, keepdims: bool) -> Self {
        self.keepdims = keepdims;
        self
    }

    #[must_use]
    pub fn initial(mut self, initial: R) -> Self {
        self.initial = Some(initial);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<R: Element> {
    pub result: ArrayStorage<R>,
    pub mode: ReductionMode,
    /// The input buffer was reused for the result.
    pub in_place: bool,
}

/// Geometry of one reduction, independent of element types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionPlan {
    pub axes: AxisList,
    pub out_shape: Shape,
    pub mode: ReductionMode,
    kept_dims: SmallVec<[usize; 4]>,
    kept_strides: SmallVec<[usize; 4]>,
    /// Offsets of one reduced sub-array relative to its first element, in
    /// row-major order.
    reduced_offsets: Vec<usize>,
    out_len: usize,
}

impl ReductionPlan {
    pub fn new(
        shape: &Shape,
        spec: &AxisSpec,
        keepdims: bool,
        name: &str,
    ) -> Result<Self, CoreError> {
        let rank = shape.rank();
        let axes = normalize_axes(spec, rank, name)?;
        let out_shape = reduced_shape(shape, &axes, keepdims)?;
        let strides = shape.strides();
        let dims = shape.dims();

        let mut kept_dims = SmallVec::new();
        let mut kept_strides = SmallVec::new();
        let mut reduced_dims: SmallVec<[usize; 4]> = SmallVec::new();
        let mut reduced_strides: SmallVec<[usize; 4]> = SmallVec::new();
        for axis in 0..rank {
            if axes.contains(&axis) {
                reduced_dims.push(dims[axis]);
                reduced_strides.push(strides[axis]);
            } else {
                kept_dims.push(dims[axis]);
                kept_strides.push(strides[axis]);
            }
        }

        let mut reduced_offsets = Vec::new();
        for_each_offset(&reduced_dims, &reduced_strides, |offset| {
            reduced_offsets.push(offset);
        });
        let out_len = kept_dims.iter().product();

        Ok(Self {
            mode: ReductionMode::classify(rank, &axes),
            axes,
            out_shape,
            kept_dims,
            kept_strides,
            reduced_offsets,
            out_len,
        })
    }

    /// Elements folded into each output cell.
    #[must_use]
    pub fn count(&self) -> usize {
        self.reduced_offsets.len()
    }

    #[must_use]
    pub fn out_len(&self) -> usize {
        self.out_len
    }

    fn cell<Op, T, R>(&self, op: &Op, data: &[T], base: usize, seed: R) -> Result<R, CoreError>
    where
        Op: ReduceOp,
        T: Element,
        R: Element,
    {
        let mut acc = seed;
        for &offset in &self.reduced_offsets {
            let element = data.get(base + offset).copied().ok_or_else(|| {
                CoreError::invalid_state(format!(
                    "reduction read offset {} past a buffer of {}",
                    base + offset,
                    data.len()
                ))
            })?;
            acc = op.combine(element, acc);
        }
        Ok(op.finalize(acc, self.count()))
    }

    /// First input offset of every output cell, in output order.
    fn bases(&self) -> Vec<usize> {
        let mut bases = Vec::with_capacity(self.out_len);
        for_each_offset(&self.kept_dims, &self.kept_strides, |offset| bases.push(offset));
        bases
    }

    fn run_allocating<Op, T, R>(&self, op: &Op, data: &[T], seed: R) -> Result<Vec<R>, CoreError>
    where
        Op: ReduceOp,
        T: Element,
        R: Element,
    {
        self.bases()
            .into_iter()
            .map(|base| self.cell(op, data, base, seed))
            .collect()
    }

    fn run_in_place<Op, R>(&self, op: &Op, buffer: &mut Vec<R>, seed: R) -> Result<(), CoreError>
    where
        Op: ReduceOp,
        R: Element,
    {
        for (out, base) in self.bases().into_iter().enumerate() {
            debug_assert!(base >= out);
            let value = self.cell(op, buffer.as_slice(), base, seed)?;
            buffer[out] = value;
        }
        buffer.truncate(self.out_len);
        Ok(())
    }
}

/// Visit every row-major offset of the box `dims` laid out with `strides`.
/// An empty `dims` visits the single offset 0; any zero extent visits nothing.
fn for_each_offset(dims: &[usize], strides: &[usize], mut visit: impl FnMut(usize)) {
    if dims.contains(&0) {
        return;
    }
    let mut index: SmallVec<[usize; 4]> = SmallVec::from_elem(0, dims.len());
    let mut offset = 0;
    loop {
        visit(offset);
        let mut axis = dims.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            offset += strides[axis];
            if index[axis] < dims[axis] {
                break;
            }
            offset -= strides[axis] * dims[axis];
            index[axis] = 0;
        }
    }
}

/// Reduce `input` with `op` into elements of type `R`.
///
/// The input buffer is reused when `T` and `R` are the same element type and
/// the input holds its buffer exclusively; otherwise a fresh owning buffer is
/// allocated. Either way the values are identical.
pub fn reduce<Op, T, R>(
    op: &Op,
    input: ArrayStorage<T>,
    params: &ReduceParams<R>,
) -> Result<Reduction<R>, CoreError>
where
    Op: ReduceOp,
    T: Element,
    R: Element,
{
    let plan = ReductionPlan::new(input.shape(), &params.axes, params.keepdims, op.name())?;
    let seed = params.initial.unwrap_or_else(|| op.identity());

    if T::DTYPE == R::DTYPE {
        return match R::unwrap(T::wrap(input)) {
            Ok(same) => reduce_same(op, &plan, same, seed),
            Err(kind) => Err(CoreError::invalid_state(format!(
                "{} element type could not be reused as {}",
                kind.type_name(),
                R::DTYPE
            ))),
        };
    }

    let data = input.with_elements(|data| plan.run_allocating(op, data, seed))?;
    Ok(Reduction {
        result: ArrayStorage::from_vec(plan.out_shape.clone(), data)?,
        mode: plan.mode,
        in_place: false,
    })
}

fn reduce_same<Op, R>(
    op: &Op,
    plan: &ReductionPlan,
    mut input: ArrayStorage<R>,
    seed: R,
) -> Result<Reduction<R>, CoreError>
where
    Op: ReduceOp,
    R: Element,
{
    let reused = match input.exclusive_buffer_mut() {
        Some(buffer) if plan.out_len <= buffer.len() => {
            plan.run_in_place(op, buffer, seed)?;
            true
        }
        _ => false,
    };
    if reused {
        return Ok(Reduction {
            result: input.into_shape(plan.out_shape.clone())?,
            mode: plan.mode,
            in_place: true,
        });
    }

    let data = input.with_elements(|data| plan.run_allocating(op, data, seed))?;
    Ok(Reduction {
        result: ArrayStorage::from_vec(plan.out_shape.clone(), data)?,
        mode: plan.mode,
        in_place: false,
    })
}

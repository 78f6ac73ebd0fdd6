//! Axis specifications and their normalization against an operand rank.

use fa_core::{CoreError, MAX_RANK, Shape};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub type AxisList = SmallVec<[usize; MAX_RANK]>;

/// Which axes a reduction collapses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AxisSpec {
    /// Every axis; the operand collapses to one value.
    #[default]
    All,
    /// The listed axes, negative indices counting from the end. An empty list
    /// selects the elementwise mode.
    Axes(SmallVec<[i64; MAX_RANK]>),
}

impl AxisSpec {
    #[must_use]
    pub fn none() -> Self {
        Self::Axes(SmallVec::new())
    }

    #[must_use]
    pub fn single(axis: i64) -> Self {
        Self::Axes(SmallVec::from_slice(&[axis]))
    }

    #[must_use]
    pub fn from_slice(axes: &[i64]) -> Self {
        Self::Axes(SmallVec::from_slice(axes))
    }
}

/// Normalize `spec` for an operand of `rank`: negative axes become
/// `rank + axis`, every axis must land in `0..rank`, no axis may repeat.
/// The result is sorted ascending.
pub fn normalize_axes(spec: &AxisSpec, rank: usize, name: &str) -> Result<AxisList, CoreError> {
    let axes = match spec {
        AxisSpec::All => return Ok((0..rank).collect()),
        AxisSpec::Axes(axes) => axes,
    };
    if axes.len() > rank {
        return Err(CoreError::bad_parameter(
            name,
            format!("{} axes supplied for a rank-{rank} operand", axes.len()),
        ));
    }
    let signed_rank = i64::try_from(rank)
        .map_err(|_| CoreError::invalid_state(format!("rank {rank} does not fit in i64")))?;
    let mut normalized = AxisList::new();
    for &axis in axes {
        let resolved = if axis < 0 { signed_rank + axis } else { axis };
        if !(0..signed_rank).contains(&resolved) {
            return Err(CoreError::bad_parameter(
                name,
                format!("axis {axis} is out of range for rank {rank}"),
            ));
        }
        let resolved = usize::try_from(resolved)
            .map_err(|_| CoreError::invalid_state(format!("axis {resolved} is negative")))?;
        if normalized.contains(&resolved) {
            return Err(CoreError::bad_parameter(name, "axes must be unique"));
        }
        normalized.push(resolved);
    }
    normalized.sort_unstable();
    Ok(normalized)
}

/// Shape left after reducing `axes` (sorted, normalized) out of `shape`.
pub fn reduced_shape(shape: &Shape, axes: &[usize], keepdims: bool) -> Result<Shape, CoreError> {
    let dims: Vec<usize> = shape
        .dims()
        .iter()
        .enumerate()
        .filter_map(|(axis, &extent)| match (axes.contains(&axis), keepdims) {
            (false, _) => Some(extent),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect();
    Shape::new(&dims)
}

#[cfg(test)]
mod tests {
    use super::{AxisSpec, normalize_axes, reduced_shape};
    use fa_core::{ErrorKind, Shape};

    #[test]
    fn negative_axes_count_from_the_end() {
        for rank in 1..=4_usize {
            for axis in 0..rank {
                let negative = axis as i64 - rank as i64;
                assert_eq!(
                    normalize_axes(&AxisSpec::single(negative), rank, "sum"),
                    normalize_axes(&AxisSpec::single(axis as i64), rank, "sum"),
                );
            }
        }
    }

    #[test]
    fn duplicate_axes_are_rejected() {
        let err = normalize_axes(&AxisSpec::from_slice(&[1, 1]), 3, "sum").expect_err("dup");
        assert_eq!(err.kind(), ErrorKind::BadParameter);
        assert!(err.to_string().contains("axes must be unique"));
        let err = normalize_axes(&AxisSpec::from_slice(&[2, -1]), 3, "sum").expect_err("alias");
        assert!(err.to_string().contains("axes must be unique"));
    }

    #[test]
    fn out_of_range_and_excess_axes_are_rejected() {
        assert!(normalize_axes(&AxisSpec::single(2), 2, "sum").is_err());
        assert!(normalize_axes(&AxisSpec::single(-3), 2, "sum").is_err());
        assert!(normalize_axes(&AxisSpec::from_slice(&[0, 1, 2]), 2, "sum").is_err());
        assert!(normalize_axes(&AxisSpec::single(0), 0, "sum").is_err());
    }

    #[test]
    fn all_and_none_cover_the_extremes() {
        assert_eq!(
            normalize_axes(&AxisSpec::All, 3, "sum").expect("all").as_slice(),
            &[0, 1, 2]
        );
        assert!(normalize_axes(&AxisSpec::none(), 3, "sum").expect("none").is_empty());
        assert_eq!(
            normalize_axes(&AxisSpec::from_slice(&[-1, 0]), 3, "sum")
                .expect("sorted")
                .as_slice(),
            &[0, 2]
        );
    }

    #[test]
    fn keepdims_retains_unit_extents() {
        let shape = Shape::new(&[2, 3, 4]).expect("rank 3");
        assert_eq!(reduced_shape(&shape, &[1], true).expect("kept").dims(), &[2, 1, 4]);
        assert_eq!(reduced_shape(&shape, &[0, 2], false).expect("dropped").dims(), &[3]);
        assert_eq!(reduced_shape(&shape, &[0, 1, 2], false).expect("scalar").rank(), 0);
    }
}

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::CoreError;

/// Highest rank an array value may have (0 = scalar ... 4 = quaternary).
pub const MAX_RANK: usize = 4;

pub type Dims = SmallVec<[usize; MAX_RANK]>;

/// Per-axis extents of a row-major array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub dims: Dims,
}

impl Shape {
    #[must_use]
    pub fn scalar() -> Self {
        Self {
            dims: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn vector(len: usize) -> Self {
        Self {
            dims: SmallVec::from_slice(&[len]),
        }
    }

    #[must_use]
    pub fn matrix(rows: usize, columns: usize) -> Self {
        Self {
            dims: SmallVec::from_slice(&[rows, columns]),
        }
    }

    /// Build a shape, rejecting ranks above [`MAX_RANK`].
    pub fn new(dims: &[usize]) -> Result<Self, CoreError> {
        if dims.len() > MAX_RANK {
            return Err(CoreError::RankOverflow {
                rank: dims.len(),
                max_rank: MAX_RANK,
            });
        }
        Ok(Self {
            dims: SmallVec::from_slice(dims),
        })
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn element_count(&self) -> Result<usize, CoreError> {
        self.dims
            .iter()
            .try_fold(1_usize, |acc, dim| acc.checked_mul(*dim))
            .ok_or_else(|| CoreError::invalid_state(format!("shape {:?} overflows", self.dims)))
    }

    /// Row-major strides in elements.
    #[must_use]
    pub fn strides(&self) -> Dims {
        let mut strides: Dims = SmallVec::from_elem(1, self.dims.len());
        for axis in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.dims[axis + 1];
        }
        strides
    }

    /// Flat row-major offset of a multi-index, bounds checked.
    pub fn flat_index(&self, index: &[usize]) -> Result<usize, CoreError> {
        if index.len() != self.dims.len()
            || index.iter().zip(self.dims.iter()).any(|(idx, dim)| idx >= dim)
        {
            return Err(CoreError::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.dims.to_vec(),
            });
        }
        Ok(index
            .iter()
            .zip(self.strides().iter())
            .map(|(idx, stride)| idx * stride)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::Shape;

    #[test]
    fn strides_are_row_major() {
        let shape = Shape::new(&[2, 3, 4]).expect("rank 3 is allowed");
        assert_eq!(shape.strides().as_slice(), &[12, 4, 1]);
        assert_eq!(shape.flat_index(&[1, 2, 3]), Ok(23));
    }

    #[test]
    fn rank_above_four_is_rejected() {
        assert!(Shape::new(&[1, 1, 1, 1, 1]).is_err());
    }

    #[test]
    fn scalar_has_one_element() {
        assert_eq!(Shape::scalar().element_count(), Ok(1));
        assert_eq!(Shape::matrix(0, 5).element_count(), Ok(0));
    }

    #[test]
    fn out_of_bounds_multi_index_is_rejected() {
        let shape = Shape::matrix(2, 2);
        assert!(shape.flat_index(&[2, 0]).is_err());
        assert!(shape.flat_index(&[0]).is_err());
    }
}

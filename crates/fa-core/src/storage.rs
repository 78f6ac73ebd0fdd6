//! Dense rank-0..4 array storage with owning and view kinds.
//!
//! Every storage holds its elements behind a shared buffer. An *owning*
//! storage is the designated holder of that buffer; a *view* (created with
//! [`ArrayStorage::make_ref`]) aliases the buffer of another storage without
//! copying it. Writes through a view are visible through the owner and vice
//! versa. The buffer is kept alive for as long as any holder exists, so a view
//! can never dangle, but reading a view while its owner is being rewritten is
//! still the evaluator's responsibility to prevent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dtype::Element;
use crate::error::CoreError;
use crate::shape::{MAX_RANK, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Owning,
    View,
}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

pub struct ArrayStorage<T: Element> {
    shape: Shape,
    buffer: Arc<RwLock<Vec<T>>>,
    /// Assigned once per allocation and shared by every view of it.
    id: u64,
    kind: StorageKind,
}

impl<T: Element> ArrayStorage<T> {
    /// Wrap a row-major element buffer. The storage is owning.
    pub fn from_vec(shape: Shape, data: Vec<T>) -> Result<Self, CoreError> {
        if shape.rank() > MAX_RANK {
            return Err(CoreError::RankOverflow {
                rank: shape.rank(),
                max_rank: MAX_RANK,
            });
        }
        let expected = shape.element_count()?;
        if expected != data.len() {
            return Err(CoreError::ElementCountMismatch {
                shape: shape.dims.to_vec(),
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::owning(shape, data))
    }

    fn owning(shape: Shape, data: Vec<T>) -> Self {
        Self {
            shape,
            buffer: Arc::new(RwLock::new(data)),
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            kind: StorageKind::Owning,
        }
    }

    #[must_use]
    pub fn scalar(value: T) -> Self {
        Self::owning(Shape::scalar(), vec![value])
    }

    #[must_use]
    pub fn vector(values: Vec<T>) -> Self {
        Self::owning(Shape::vector(values.len()), values)
    }

    pub fn matrix(rows: Vec<Vec<T>>) -> Result<Self, CoreError> {
        let (dims, data) = flatten_rows(rows, 1)?;
        Self::from_vec(Shape::new(&dims)?, data)
    }

    pub fn tensor3(pages: Vec<Vec<Vec<T>>>) -> Result<Self, CoreError> {
        let (dims, data) = flatten_pages(pages, 1)?;
        Self::from_vec(Shape::new(&dims)?, data)
    }

    pub fn tensor4(quats: Vec<Vec<Vec<Vec<T>>>>) -> Result<Self, CoreError> {
        let outer = quats.len();
        let mut inner: Option<[usize; 3]> = None;
        let mut data = Vec::new();
        for quat in quats {
            let (dims, flat) = flatten_pages(quat, 2)?;
            match inner {
                None => inner = Some(dims),
                Some(expected) if expected != dims => {
                    return Err(ragged(2, &expected, &dims));
                }
                Some(_) => {}
            }
            data.extend(flat);
        }
        let [pages, rows, columns] = inner.unwrap_or([0, 0, 0]);
        Self::from_vec(Shape::new(&[outer, pages, rows, columns])?, data)
    }

    pub fn filled(shape: Shape, value: T) -> Result<Self, CoreError> {
        let count = shape.element_count()?;
        Self::from_vec(shape, vec![value; count])
    }

    pub fn zeros(shape: Shape) -> Result<Self, CoreError> {
        Self::filled(shape, T::zero())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.buffer.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    /// Number of elements described by the shape.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shape.dims.iter().product()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    #[must_use]
    pub fn is_ref(&self) -> bool {
        self.kind == StorageKind::View
    }

    /// Owning storage whose buffer has no other holder.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.kind == StorageKind::Owning
            && Arc::strong_count(&self.buffer) == 1
            && Arc::weak_count(&self.buffer) == 0
    }

    /// Identity of the underlying buffer; equal ids mean aliasing.
    ///
    /// Ids are never reused, so an id taken before a buffer is freed cannot
    /// match a later allocation.
    #[must_use]
    pub fn buffer_id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn aliases(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// A view over the same buffer. Never allocates.
    #[must_use]
    pub fn make_ref(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            buffer: Arc::clone(&self.buffer),
            id: self.id,
            kind: StorageKind::View,
        }
    }

    /// A fresh owning buffer with the same contents, whatever the current kind.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self::owning(self.shape.clone(), self.read().clone())
    }

    pub fn get_flat(&self, index: usize) -> Result<T, CoreError> {
        self.read()
            .get(index)
            .copied()
            .ok_or_else(|| CoreError::IndexOutOfBounds {
                index: vec![index],
                shape: self.shape.dims.to_vec(),
            })
    }

    pub fn get(&self, index: &[usize]) -> Result<T, CoreError> {
        let flat = self.shape.flat_index(index)?;
        self.get_flat(flat)
    }

    pub fn set_flat(&mut self, index: usize, value: T) -> Result<(), CoreError> {
        let mut guard = self.write();
        let len = guard.len();
        match guard.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CoreError::IndexOutOfBounds {
                index: vec![index],
                shape: vec![len],
            }),
        }
    }

    pub fn set(&mut self, index: &[usize], value: T) -> Result<(), CoreError> {
        let flat = self.shape.flat_index(index)?;
        self.set_flat(flat, value)
    }

    pub fn fill(&mut self, value: T) {
        self.write().iter_mut().for_each(|slot| *slot = value);
    }

    /// Run `f` over the row-major element slice without copying.
    pub fn with_elements<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.read())
    }

    pub fn with_elements_mut<R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> R {
        f(&mut self.write())
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.read().clone()
    }

    /// Row-major iteration without copying. The buffer stays read-locked
    /// until the iterator is dropped, so writes through another handle wait.
    #[must_use]
    pub fn iter(&self) -> Elements<'_, T> {
        Elements {
            guard: self.read(),
            next: 0,
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        if !self.is_exclusive() {
            return self.to_vec();
        }
        match Arc::try_unwrap(self.buffer) {
            Ok(lock) => lock.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared.read().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }

    /// Convert every element, always into a fresh owning buffer.
    #[must_use]
    pub fn cast<U: Element>(&self) -> ArrayStorage<U> {
        self.map(|value| value.cast::<U>())
    }

    #[must_use]
    pub fn map<U: Element>(&self, f: impl Fn(T) -> U) -> ArrayStorage<U> {
        let data = self.read().iter().copied().map(f).collect();
        ArrayStorage::owning(self.shape.clone(), data)
    }

    /// Reinterpret the buffer under another shape with the same element count.
    /// Keeps the storage kind and the buffer identity.
    pub fn into_shape(self, shape: Shape) -> Result<Self, CoreError> {
        let actual = self.read().len();
        let expected = shape.element_count()?;
        if shape.rank() > MAX_RANK {
            return Err(CoreError::RankOverflow {
                rank: shape.rank(),
                max_rank: MAX_RANK,
            });
        }
        if expected != actual {
            return Err(CoreError::ElementCountMismatch {
                shape: shape.dims.to_vec(),
                expected,
                actual,
            });
        }
        Ok(Self { shape, ..self })
    }

    /// Direct access to the buffer when this storage holds it exclusively.
    ///
    /// Returns `None` for views and for owning storage that still has live
    /// views, so callers can never mutate a buffer somebody else observes.
    pub fn exclusive_buffer_mut(&mut self) -> Option<&mut Vec<T>> {
        if self.kind != StorageKind::Owning {
            return None;
        }
        Arc::get_mut(&mut self.buffer)
            .map(|lock| lock.get_mut().unwrap_or_else(PoisonError::into_inner))
    }

    fn expect_rank(&self, rank: usize) -> Result<(), CoreError> {
        if self.rank() == rank {
            Ok(())
        } else {
            Err(CoreError::RankMismatch {
                expected: rank,
                actual: self.rank(),
            })
        }
    }

    pub fn scalar_value(&self) -> Result<T, CoreError> {
        self.expect_rank(0)?;
        self.get_flat(0)
    }

    pub fn vector_values(&self) -> Result<Vec<T>, CoreError> {
        self.expect_rank(1)?;
        Ok(self.to_vec())
    }

    pub fn matrix_dims(&self) -> Result<[usize; 2], CoreError> {
        self.expect_rank(2)?;
        Ok([self.dims()[0], self.dims()[1]])
    }

    pub fn tensor3_dims(&self) -> Result<[usize; 3], CoreError> {
        self.expect_rank(3)?;
        Ok([self.dims()[0], self.dims()[1], self.dims()[2]])
    }

    pub fn tensor4_dims(&self) -> Result<[usize; 4], CoreError> {
        self.expect_rank(4)?;
        Ok([self.dims()[0], self.dims()[1], self.dims()[2], self.dims()[3]])
    }
}

/// Iterator returned by [`ArrayStorage::iter`].
pub struct Elements<'a, T> {
    guard: RwLockReadGuard<'a, Vec<T>>,
    next: usize,
}

impl<T: Copy> Iterator for Elements<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let value = self.guard.get(self.next).copied()?;
        self.next += 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.guard.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl<T: Copy> ExactSizeIterator for Elements<'_, T> {}

impl<T: Element> Clone for ArrayStorage<T> {
    /// Owning storage clones into a new owner; a view clones into another view.
    fn clone(&self) -> Self {
        match self.kind {
            StorageKind::Owning => self.copy(),
            StorageKind::View => self.make_ref(),
        }
    }
}

impl<T: Element> PartialEq for ArrayStorage<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.shape != other.shape {
            return false;
        }
        if self.aliases(other) {
            return true;
        }
        *self.read() == *other.read()
    }
}

impl<T: Element> fmt::Debug for ArrayStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayStorage")
            .field("dtype", &T::DTYPE)
            .field("kind", &self.kind)
            .field("shape", &self.shape.dims)
            .field("elements", &*self.read())
            .finish()
    }
}

fn ragged(depth: usize, expected: &[usize], actual: &[usize]) -> CoreError {
    let level = expected
        .iter()
        .zip(actual.iter())
        .position(|(e, a)| e != a)
        .unwrap_or(0);
    CoreError::RaggedLiteral {
        depth: depth + level,
        expected: expected[level],
        actual: actual[level],
    }
}

fn flatten_rows<T>(rows: Vec<Vec<T>>, depth: usize) -> Result<([usize; 2], Vec<T>), CoreError> {
    let outer = rows.len();
    let columns = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(outer * columns);
    for row in rows {
        if row.len() != columns {
            return Err(CoreError::RaggedLiteral {
                depth,
                expected: columns,
                actual: row.len(),
            });
        }
        data.extend(row);
    }
    Ok(([outer, columns], data))
}

fn flatten_pages<T>(
    pages: Vec<Vec<Vec<T>>>,
    depth: usize,
) -> Result<([usize; 3], Vec<T>), CoreError> {
    let outer = pages.len();
    let mut inner: Option<[usize; 2]> = None;
    let mut data = Vec::new();
    for page in pages {
        let (dims, flat) = flatten_rows(page, depth + 1)?;
        match inner {
            None => inner = Some(dims),
            Some(expected) if expected != dims => {
                return Err(ragged(depth, &expected, &dims));
            }
            Some(_) => {}
        }
        data.extend(flat);
    }
    let [rows, columns] = inner.unwrap_or([0, 0]);
    Ok(([outer, rows, columns], data))
}

#[cfg(test)]
mod tests {
    use super::{ArrayStorage, StorageKind};
    use crate::error::{CoreError, ErrorKind};
    use crate::shape::Shape;

    #[test]
    fn ref_then_write_is_visible_on_owner() {
        let owner = ArrayStorage::vector(vec![1_i64, 2, 3]);
        let mut alias = owner.make_ref();
        assert!(alias.is_ref());
        assert!(!owner.is_ref());
        alias.set_flat(1, 20).expect("in bounds");
        assert_eq!(owner.to_vec(), vec![1, 20, 3]);
        assert_eq!(owner.buffer_id(), alias.buffer_id());
    }

    #[test]
    fn copy_then_write_is_not_visible_on_owner() {
        let owner = ArrayStorage::vector(vec![1.0_f64, 2.0]);
        let view = owner.make_ref();
        let mut copied = view.copy();
        assert_eq!(copied.kind(), StorageKind::Owning);
        copied.set_flat(0, 9.0).expect("in bounds");
        assert_eq!(owner.to_vec(), vec![1.0, 2.0]);
        assert!(!copied.aliases(&owner));
    }

    #[test]
    fn ref_of_a_view_aliases_the_same_target() {
        let owner = ArrayStorage::vector(vec![true, false]);
        let first = owner.make_ref();
        let second = first.make_ref();
        assert!(second.aliases(&owner));
        assert_eq!(second.kind(), StorageKind::View);
    }

    #[test]
    fn exclusivity_tracks_live_views() {
        let mut owner = ArrayStorage::vector(vec![1_i64]);
        assert!(owner.is_exclusive());
        let view = owner.make_ref();
        assert!(!owner.is_exclusive());
        assert!(owner.exclusive_buffer_mut().is_none());
        drop(view);
        assert!(owner.exclusive_buffer_mut().is_some());
    }

    #[test]
    fn clone_follows_storage_kind() {
        let owner = ArrayStorage::vector(vec![1_i64, 2]);
        let cloned = owner.clone();
        assert!(!cloned.aliases(&owner));
        let view = owner.make_ref();
        assert!(view.clone().aliases(&owner));
    }

    #[test]
    fn nested_literals_build_row_major_storage() {
        let matrix = ArrayStorage::matrix(vec![vec![1_i64, 2], vec![3, 4]]).expect("rectangular");
        assert_eq!(matrix.dims(), &[2, 2]);
        assert_eq!(matrix.get(&[1, 0]), Ok(3));

        let cube = ArrayStorage::tensor3(vec![
            vec![vec![1_i64, 2], vec![3, 4]],
            vec![vec![5, 6], vec![7, 8]],
        ])
        .expect("rectangular");
        assert_eq!(cube.dims(), &[2, 2, 2]);
        assert_eq!(cube.get(&[1, 0, 1]), Ok(6));
        assert_eq!(cube.to_vec(), (1..=8).collect::<Vec<_>>());

        let quat = ArrayStorage::tensor4(vec![vec![vec![vec![0.5_f64; 3]; 2]; 1]; 2])
            .expect("rectangular");
        assert_eq!(quat.dims(), &[2, 1, 2, 3]);
    }

    #[test]
    fn ragged_literals_are_rejected() {
        let err = ArrayStorage::matrix(vec![vec![1_i64, 2], vec![3]]).expect_err("ragged");
        assert_eq!(
            err,
            CoreError::RaggedLiteral {
                depth: 1,
                expected: 2,
                actual: 1
            }
        );
        let err = ArrayStorage::tensor3(vec![vec![vec![1_i64]], vec![vec![1], vec![2]]])
            .expect_err("ragged pages");
        assert_eq!(err.kind(), ErrorKind::BadParameter);
    }

    #[test]
    fn rank_specific_access_signals_invalid_state() {
        let vector = ArrayStorage::vector(vec![1_i64, 2]);
        let err = vector.matrix_dims().expect_err("vector is not a matrix");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(ArrayStorage::vector(vec![4_i64]).scalar_value().is_err());
        assert_eq!(ArrayStorage::scalar(4_i64).scalar_value(), Ok(4));
    }

    #[test]
    fn fill_and_element_count_checks() {
        let storage = ArrayStorage::filled(Shape::matrix(2, 3), 7_i64).expect("valid shape");
        assert_eq!(storage.len(), 6);
        assert!(storage.iter().all(|value| value == 7));
        assert!(ArrayStorage::from_vec(Shape::vector(3), vec![1_i64]).is_err());
    }

    #[test]
    fn buffer_ids_are_not_reused_after_a_drop() {
        let first = ArrayStorage::vector(vec![1_i64, 2, 3]);
        let id = first.buffer_id();
        let second = first.copy();
        drop(first);
        let third = second.copy();
        assert_ne!(second.buffer_id(), id);
        assert_ne!(third.buffer_id(), id);
        assert_ne!(third.buffer_id(), second.buffer_id());
        assert_eq!(third.make_ref().buffer_id(), third.buffer_id());
    }

    #[test]
    fn iteration_reads_through_a_view_without_copying() {
        let owner = ArrayStorage::vector(vec![3_i64, 1, 2]);
        let view = owner.make_ref();
        let elements = view.iter();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements.collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(view.iter().sum::<i64>(), 6);
    }

    #[test]
    fn into_shape_keeps_buffer_identity() {
        let storage = ArrayStorage::vector(vec![1_i64, 2, 3, 4]);
        let id = storage.buffer_id();
        let reshaped = storage.into_shape(Shape::matrix(2, 2)).expect("same count");
        assert_eq!(reshaped.buffer_id(), id);
        assert_eq!(reshaped.get(&[1, 1]), Ok(4));
    }
}

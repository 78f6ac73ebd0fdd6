//! Narrowing a [`Value`] to the kind, element type or rank a primitive needs.
//!
//! Every extractor takes the invoking primitive's name so failures can say who
//! rejected which alternative. Unresolved values (remote handles and pending
//! computations) are never accepted here; they have to be forced first.
//!
//! Non-strict array extractors follow the `bool -> int64 -> double` lattice in
//! both directions: widening is exact, narrowing truncates toward zero
//! (`double -> int64`) or tests for non-zero (`-> bool`). The `_strict` forms
//! demand the exact element type.

use std::collections::BTreeMap;

use crate::dtype::{DType, Element};
use crate::error::CoreError;
use crate::storage::ArrayStorage;
use crate::value::{Value, ValueKind, expected_array};

fn ensure_resolved(value: &Value, name: &str) -> Result<(), CoreError> {
    if value.is_unresolved() {
        Err(CoreError::type_mismatch(name, "data", value.type_name()))
    } else {
        Ok(())
    }
}

/// Return a value that already holds data, unchanged.
pub fn extract_value(value: Value, name: &str) -> Result<Value, CoreError> {
    ensure_resolved(&value, name)?;
    Ok(value)
}

/// An independent copy of a value that already holds data.
pub fn extract_copy_value(value: &Value, name: &str) -> Result<Value, CoreError> {
    ensure_resolved(value, name)?;
    Ok(value.copy())
}

/// An aliasing reference to a value that already holds data.
pub fn extract_ref_value(value: &Value, name: &str) -> Result<Value, CoreError> {
    ensure_resolved(value, name)?;
    Ok(value.make_ref())
}

/// Like [`extract_value`] but also rejects unresolved leaves nested in lists
/// and dicts.
pub fn extract_literal_value(value: Value, name: &str) -> Result<Value, CoreError> {
    ensure_literal(&value, name)?;
    Ok(value)
}

fn ensure_literal(value: &Value, name: &str) -> Result<(), CoreError> {
    match &value.kind {
        ValueKind::List(values) => values.iter().try_for_each(|item| ensure_literal(item, name)),
        ValueKind::Dict(entries) => entries
            .values()
            .try_for_each(|item| ensure_literal(item, name)),
        _ => ensure_resolved(value, name),
    }
}

fn numeric_mismatch(value: &Value, name: &str) -> CoreError {
    CoreError::type_mismatch(name, "numeric array", value.type_name())
}

/// Take the array out of `value`, converting the element type if needed.
///
/// When the element type already matches, the storage is moved out as is, so
/// an owning input stays owning.
pub fn extract_array<T: Element>(value: Value, name: &str) -> Result<ArrayStorage<T>, CoreError> {
    match T::unwrap(value.kind) {
        Ok(same) => Ok(same),
        Err(ValueKind::Bool(storage)) => Ok(storage.cast()),
        Err(ValueKind::Int(storage)) => Ok(storage.cast()),
        Err(ValueKind::Float(storage)) => Ok(storage.cast()),
        Err(kind) => Err(CoreError::type_mismatch(
            name,
            "numeric array",
            kind.type_name(),
        )),
    }
}

/// Borrowing variant of [`extract_array`]: aliases the buffer when the element
/// type matches, otherwise returns a converted owning copy.
pub fn extract_array_ref<T: Element>(value: &Value, name: &str) -> Result<ArrayStorage<T>, CoreError> {
    if let Some(storage) = T::peek(&value.kind) {
        return Ok(storage.make_ref());
    }
    match &value.kind {
        ValueKind::Bool(storage) => Ok(storage.cast()),
        ValueKind::Int(storage) => Ok(storage.cast()),
        ValueKind::Float(storage) => Ok(storage.cast()),
        _ => Err(numeric_mismatch(value, name)),
    }
}

/// Take the array out of `value`, requiring the exact element type.
pub fn extract_array_strict<T: Element>(
    value: Value,
    name: &str,
) -> Result<ArrayStorage<T>, CoreError> {
    value.into_array::<T>(name)
}

fn require_scalar<T: Element>(storage: &ArrayStorage<T>, name: &str) -> Result<T, CoreError> {
    if storage.rank() != 0 {
        return Err(CoreError::bad_parameter(
            name,
            format!("expected a rank-0 scalar, got rank {}", storage.rank()),
        ));
    }
    storage.get_flat(0)
}

/// The single element of a rank-0 array, coerced to `T`.
///
/// Rank gates this, not element count: a one-element vector is rejected.
pub fn extract_scalar<T: Element>(value: &Value, name: &str) -> Result<T, CoreError> {
    match &value.kind {
        ValueKind::Bool(storage) => require_scalar(storage, name).map(|element| element.cast::<T>()),
        ValueKind::Int(storage) => require_scalar(storage, name).map(|element| element.cast::<T>()),
        ValueKind::Float(storage) => require_scalar(storage, name).map(|element| element.cast::<T>()),
        _ => Err(numeric_mismatch(value, name)),
    }
}

pub fn extract_scalar_strict<T: Element>(value: &Value, name: &str) -> Result<T, CoreError> {
    require_scalar(value.array::<T>(name)?, name)
}

pub fn extract_numeric_value(value: Value, name: &str) -> Result<ArrayStorage<f64>, CoreError> {
    extract_array(value, name)
}

pub fn extract_integer_value(value: Value, name: &str) -> Result<ArrayStorage<i64>, CoreError> {
    extract_array(value, name)
}

pub fn extract_boolean_value(value: Value, name: &str) -> Result<ArrayStorage<bool>, CoreError> {
    extract_array(value, name)
}

pub fn extract_numeric_value_strict(
    value: Value,
    name: &str,
) -> Result<ArrayStorage<f64>, CoreError> {
    extract_array_strict(value, name)
}

pub fn extract_integer_value_strict(
    value: Value,
    name: &str,
) -> Result<ArrayStorage<i64>, CoreError> {
    extract_array_strict(value, name)
}

pub fn extract_boolean_value_strict(
    value: Value,
    name: &str,
) -> Result<ArrayStorage<bool>, CoreError> {
    extract_array_strict(value, name)
}

pub fn extract_scalar_numeric_value(value: &Value, name: &str) -> Result<f64, CoreError> {
    extract_scalar(value, name)
}

pub fn extract_scalar_integer_value(value: &Value, name: &str) -> Result<i64, CoreError> {
    extract_scalar(value, name)
}

pub fn extract_scalar_boolean_value(value: &Value, name: &str) -> Result<bool, CoreError> {
    extract_scalar(value, name)
}

pub fn extract_string_value(value: &Value, name: &str) -> Result<String, CoreError> {
    value.as_str(name).map(str::to_owned)
}

pub fn extract_list_value(value: Value, name: &str) -> Result<Vec<Value>, CoreError> {
    match value.kind {
        ValueKind::List(values) => Ok(values),
        kind => Err(CoreError::type_mismatch(name, "list", kind.type_name())),
    }
}

pub fn extract_dict_value(value: Value, name: &str) -> Result<BTreeMap<String, Value>, CoreError> {
    match value.kind {
        ValueKind::Dict(entries) => Ok(entries),
        kind => Err(CoreError::type_mismatch(name, "dict", kind.type_name())),
    }
}

/// Integers from an int64 scalar, an int64 vector, or a list of int64
/// scalars. Used for axis arguments.
pub fn extract_integer_list(value: &Value, name: &str) -> Result<Vec<i64>, CoreError> {
    match &value.kind {
        ValueKind::Int(storage) => match storage.rank() {
            0 | 1 => Ok(storage.to_vec()),
            rank => Err(CoreError::bad_parameter(
                name,
                format!("expected an integer scalar or vector, got rank {rank}"),
            )),
        },
        ValueKind::List(values) => values
            .iter()
            .map(|item| extract_scalar_strict::<i64>(item, name))
            .collect(),
        _ => Err(CoreError::type_mismatch(
            name,
            expected_array(DType::I64),
            value.type_name(),
        )),
    }
}

#[must_use]
pub fn is_numeric_operand(value: &Value) -> bool {
    value.dtype().is_some()
}

/// Join of the element types of every operand.
pub fn common_dtype(values: &[Value], name: &str) -> Result<DType, CoreError> {
    let mut dtypes = values.iter().map(|value| {
        value
            .dtype()
            .ok_or_else(|| numeric_mismatch(value, name))
    });
    let first = dtypes
        .next()
        .ok_or_else(|| CoreError::bad_parameter(name, "expected at least one operand"))??;
    dtypes.try_fold(first, |acc, dtype| Ok(acc.promote(dtype?)))
}

//! The dynamically typed value primitives consume and produce.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dtype::{DType, Element};
use crate::error::CoreError;
use crate::pending::Pending;
use crate::storage::ArrayStorage;

pub type PendingValue = Pending<Value>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Where the target behind a [`RemoteHandle`] lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    Local,
    Remote(u32),
}

/// Opaque reference to a computation that an invoker can run.
///
/// Handles compare by identity; two handles with the same name are still
/// different targets.
#[derive(Debug, Clone)]
pub struct RemoteHandle {
    id: u64,
    name: String,
    locality: Locality,
}

impl RemoteHandle {
    pub fn new(name: impl Into<String>, locality: Locality) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            locality,
        }
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, Locality::Local)
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn locality(&self) -> Locality {
        self.locality
    }
}

impl PartialEq for RemoteHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RemoteHandle {}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.locality {
            Locality::Local => write!(f, "{}#{}", self.name, self.id),
            Locality::Remote(locality) => write!(f, "{}#{}@{locality}", self.name, self.id),
        }
    }
}

/// Out-of-band metadata such as distribution or layout tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub name: String,
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// The closed set of alternatives a [`Value`] may hold.
///
/// Alternatives are listed in index order; [`ValueKind::index`] returns the
/// position.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Nil,
    Bool(ArrayStorage<bool>),
    Int(ArrayStorage<i64>),
    Str(String),
    Float(ArrayStorage<f64>),
    Remote(RemoteHandle),
    Pending(PendingValue),
    List(Vec<Value>),
    Dict(BTreeMap<String, Value>),
}

impl ValueKind {
    pub const COUNT: usize = 9;

    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Nil => 0,
            Self::Bool(_) => 1,
            Self::Int(_) => 2,
            Self::Str(_) => 3,
            Self::Float(_) => 4,
            Self::Remote(_) => 5,
            Self::Pending(_) => 6,
            Self::List(_) => 7,
            Self::Dict(_) => 8,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool array",
            Self::Int(_) => "int64 array",
            Self::Str(_) => "string",
            Self::Float(_) => "double array",
            Self::Remote(_) => "remote handle",
            Self::Pending(_) => "pending computation",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }
}

/// A dynamically typed value with an optional annotation.
///
/// The annotation never takes part in equality.
#[derive(Debug, Clone)]
pub struct Value {
    pub kind: ValueKind,
    pub annotation: Option<Annotation>,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::nil()
    }
}

impl From<ValueKind> for Value {
    fn from(kind: ValueKind) -> Self {
        Self::new(kind)
    }
}

impl<T: Element> From<ArrayStorage<T>> for Value {
    fn from(storage: ArrayStorage<T>) -> Self {
        Self::new(T::wrap(storage))
    }
}

impl Value {
    #[must_use]
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            annotation: None,
        }
    }

    #[must_use]
    pub fn nil() -> Self {
        Self::new(ValueKind::Nil)
    }

    #[must_use]
    pub fn scalar_bool(value: bool) -> Self {
        ArrayStorage::scalar(value).into()
    }

    #[must_use]
    pub fn scalar_i64(value: i64) -> Self {
        ArrayStorage::scalar(value).into()
    }

    #[must_use]
    pub fn scalar_f64(value: f64) -> Self {
        ArrayStorage::scalar(value).into()
    }

    #[must_use]
    pub fn vector_i64(values: Vec<i64>) -> Self {
        ArrayStorage::vector(values).into()
    }

    #[must_use]
    pub fn vector_f64(values: Vec<f64>) -> Self {
        ArrayStorage::vector(values).into()
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::Str(value.into()))
    }

    #[must_use]
    pub fn list(values: Vec<Value>) -> Self {
        Self::new(ValueKind::List(values))
    }

    #[must_use]
    pub fn dict(entries: BTreeMap<String, Value>) -> Self {
        Self::new(ValueKind::Dict(entries))
    }

    #[must_use]
    pub fn remote(handle: RemoteHandle) -> Self {
        Self::new(ValueKind::Remote(handle))
    }

    #[must_use]
    pub fn pending(pending: PendingValue) -> Self {
        Self::new(ValueKind::Pending(pending))
    }

    #[must_use]
    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    #[must_use]
    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.kind.index()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self.kind, ValueKind::Nil)
    }

    /// Holds a remote handle or a pending computation.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self.kind, ValueKind::Remote(_) | ValueKind::Pending(_))
    }

    /// Element type of an array alternative.
    #[must_use]
    pub fn dtype(&self) -> Option<DType> {
        match &self.kind {
            ValueKind::Bool(_) => Some(DType::Bool),
            ValueKind::Int(_) => Some(DType::I64),
            ValueKind::Float(_) => Some(DType::F64),
            _ => None,
        }
    }

    #[must_use]
    pub fn rank(&self) -> Option<usize> {
        match &self.kind {
            ValueKind::Bool(storage) => Some(storage.rank()),
            ValueKind::Int(storage) => Some(storage.rank()),
            ValueKind::Float(storage) => Some(storage.rank()),
            _ => None,
        }
    }

    fn mismatch(&self, primitive: &str, expected: &'static str) -> CoreError {
        CoreError::type_mismatch(primitive, expected, self.type_name())
    }

    pub fn array<T: Element>(&self, primitive: &str) -> Result<&ArrayStorage<T>, CoreError> {
        T::peek(&self.kind).ok_or_else(|| self.mismatch(primitive, expected_array(T::DTYPE)))
    }

    pub fn into_array<T: Element>(self, primitive: &str) -> Result<ArrayStorage<T>, CoreError> {
        T::unwrap(self.kind).map_err(|kind| {
            CoreError::type_mismatch(primitive, expected_array(T::DTYPE), kind.type_name())
        })
    }

    pub fn as_str(&self, primitive: &str) -> Result<&str, CoreError> {
        match &self.kind {
            ValueKind::Str(value) => Ok(value),
            _ => Err(self.mismatch(primitive, "string")),
        }
    }

    pub fn as_list(&self, primitive: &str) -> Result<&[Value], CoreError> {
        match &self.kind {
            ValueKind::List(values) => Ok(values),
            _ => Err(self.mismatch(primitive, "list")),
        }
    }

    pub fn as_dict(&self, primitive: &str) -> Result<&BTreeMap<String, Value>, CoreError> {
        match &self.kind {
            ValueKind::Dict(entries) => Ok(entries),
            _ => Err(self.mismatch(primitive, "dict")),
        }
    }

    pub fn as_remote(&self, primitive: &str) -> Result<&RemoteHandle, CoreError> {
        match &self.kind {
            ValueKind::Remote(handle) => Ok(handle),
            _ => Err(self.mismatch(primitive, "remote handle")),
        }
    }

    pub fn as_pending(&self, primitive: &str) -> Result<&PendingValue, CoreError> {
        match &self.kind {
            ValueKind::Pending(pending) => Ok(pending),
            _ => Err(self.mismatch(primitive, "pending computation")),
        }
    }

    /// A value aliasing every array buffer reachable from `self`.
    #[must_use]
    pub fn make_ref(&self) -> Self {
        let kind = match &self.kind {
            ValueKind::Bool(storage) => ValueKind::Bool(storage.make_ref()),
            ValueKind::Int(storage) => ValueKind::Int(storage.make_ref()),
            ValueKind::Float(storage) => ValueKind::Float(storage.make_ref()),
            ValueKind::List(values) => ValueKind::List(values.iter().map(Self::make_ref).collect()),
            ValueKind::Dict(entries) => ValueKind::Dict(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.make_ref()))
                    .collect(),
            ),
            other => other.clone(),
        };
        Self {
            kind,
            annotation: self.annotation.clone(),
        }
    }

    /// A value whose array buffers are all freshly owned.
    #[must_use]
    pub fn copy(&self) -> Self {
        let kind = match &self.kind {
            ValueKind::Bool(storage) => ValueKind::Bool(storage.copy()),
            ValueKind::Int(storage) => ValueKind::Int(storage.copy()),
            ValueKind::Float(storage) => ValueKind::Float(storage.copy()),
            ValueKind::List(values) => ValueKind::List(values.iter().map(Self::copy).collect()),
            ValueKind::Dict(entries) => ValueKind::Dict(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.copy()))
                    .collect(),
            ),
            other => other.clone(),
        };
        Self {
            kind,
            annotation: self.annotation.clone(),
        }
    }
}

#[must_use]
pub fn expected_array(dtype: DType) -> &'static str {
    match dtype {
        DType::Bool => "bool array",
        DType::I64 => "int64 array",
        DType::F64 => "double array",
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Nil => f.write_str("nil"),
            ValueKind::Bool(storage) => write!(f, "bool{:?}{:?}", storage.dims(), storage.to_vec()),
            ValueKind::Int(storage) => write!(f, "int64{:?}{:?}", storage.dims(), storage.to_vec()),
            ValueKind::Float(storage) => {
                write!(f, "double{:?}{:?}", storage.dims(), storage.to_vec())
            }
            ValueKind::Str(value) => write!(f, "{value:?}"),
            ValueKind::Remote(handle) => write!(f, "remote({handle})"),
            ValueKind::Pending(pending) => write!(f, "pending(p{})", pending.id()),
            ValueKind::List(values) => {
                f.write_str("[")?;
                for (position, value) in values.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            ValueKind::Dict(entries) => {
                f.write_str("{")?;
                for (position, (key, value)) in entries.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

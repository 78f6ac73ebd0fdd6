//! Byte layout:
//!
//! ```text
//! envelope := "FAV1" version:u8 value
//! value    := tag:u8 annotation body
//! annotation := 0 | 1 len:u64 json-bytes
//! array    := dtype:u8 rank:u8 dim:u64{rank} element{product(dims)}
//! string   := len:u64 utf8-bytes
//! list     := count:u64 value{count}
//! dict     := count:u64 (string value){count}
//! ```
//!
//! Integers are little-endian, doubles are their IEEE bits, booleans one byte.
//! The value tag is [`fa_core::ValueKind::index`].

use fa_core::{Annotation, ArrayStorage, DType, Element, Shape, Value, ValueKind};
use std::collections::BTreeMap;

use crate::error::SerializeError;

pub const MAGIC: &[u8; 4] = b"FAV1";
pub const VERSION: u8 = 1;
/// Nesting limit for lists and dicts when decoding.
pub const MAX_DEPTH: usize = 64;

const TAG_NIL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LIST: u8 = 7;
const TAG_DICT: u8 = 8;

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, text: &str) {
    put_len(out, text.len());
    out.extend_from_slice(text.as_bytes());
}

fn put_element<T: Element>(out: &mut Vec<u8>, element: T) {
    match T::DTYPE {
        DType::Bool => out.push(u8::from(element.to_bool())),
        DType::I64 => out.extend_from_slice(&element.to_i64().to_le_bytes()),
        DType::F64 => out.extend_from_slice(&element.to_f64().to_bits().to_le_bytes()),
    }
}

pub(crate) fn put_storage<T: Element>(out: &mut Vec<u8>, storage: &ArrayStorage<T>) {
    out.push(T::DTYPE.tag());
    out.push(storage.rank() as u8);
    for &extent in storage.dims() {
        put_len(out, extent);
    }
    out.reserve(storage.len() * T::DTYPE.size_bytes());
    storage.with_elements(|elements| {
        for &element in elements {
            put_element(out, element);
        }
    });
}

fn put_annotation(out: &mut Vec<u8>, annotation: Option<&Annotation>) -> Result<(), SerializeError> {
    match annotation {
        None => out.push(0),
        Some(annotation) => {
            let json = serde_json::to_string(annotation)
                .map_err(|err| SerializeError::Annotation(err.to_string()))?;
            out.push(1);
            put_str(out, &json);
        }
    }
    Ok(())
}

pub(crate) fn put_value(out: &mut Vec<u8>, value: &Value) -> Result<(), SerializeError> {
    if value.is_unresolved() {
        return Err(SerializeError::Unresolved {
            kind: value.type_name(),
        });
    }
    out.push(value.index() as u8);
    put_annotation(out, value.annotation())?;
    match &value.kind {
        ValueKind::Nil | ValueKind::Remote(_) | ValueKind::Pending(_) => {}
        ValueKind::Bool(storage) => put_storage(out, storage),
        ValueKind::Int(storage) => put_storage(out, storage),
        ValueKind::Float(storage) => put_storage(out, storage),
        ValueKind::Str(text) => put_str(out, text),
        ValueKind::List(items) => {
            put_len(out, items.len());
            for item in items {
                put_value(out, item)?;
            }
        }
        ValueKind::Dict(entries) => {
            put_len(out, entries.len());
            for (key, item) in entries {
                put_str(out, key);
                put_value(out, item)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn put_header(out: &mut Vec<u8>) {
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
}

/// Cursor over an encoded buffer.
pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], SerializeError> {
        if count > self.remaining() {
            return Err(SerializeError::Truncated {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], SerializeError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, SerializeError> {
        Ok(self.array::<1>()?[0])
    }

    fn length(&mut self) -> Result<usize, SerializeError> {
        let raw = u64::from_le_bytes(self.array()?);
        usize::try_from(raw).map_err(|_| SerializeError::LengthOverflow(raw))
    }

    fn string(&mut self) -> Result<String, SerializeError> {
        let len = self.length()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializeError::InvalidUtf8)
    }

    pub(crate) fn header(&mut self) -> Result<(), SerializeError> {
        if self.take(MAGIC.len())? != MAGIC {
            return Err(SerializeError::BadMagic);
        }
        match self.byte()? {
            VERSION => Ok(()),
            other => Err(SerializeError::UnsupportedVersion(other)),
        }
    }

    pub(crate) fn finish(&self) -> Result<(), SerializeError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(SerializeError::TrailingBytes(extra)),
        }
    }

    fn element<T: Element>(&mut self) -> Result<T, SerializeError> {
        Ok(match T::DTYPE {
            DType::Bool => match self.byte()? {
                0 => T::from_bool(false),
                1 => T::from_bool(true),
                other => return Err(SerializeError::InvalidBool(other)),
            },
            DType::I64 => T::from_i64(i64::from_le_bytes(self.array()?)),
            DType::F64 => T::from_f64(f64::from_bits(u64::from_le_bytes(self.array()?))),
        })
    }

    pub(crate) fn storage<T: Element>(&mut self) -> Result<ArrayStorage<T>, SerializeError> {
        let tag = self.byte()?;
        let dtype = DType::from_tag(tag).ok_or(SerializeError::UnknownDType(tag))?;
        if dtype != T::DTYPE {
            return Err(SerializeError::DTypeMismatch {
                expected: T::DTYPE,
                actual: dtype,
            });
        }
        let rank = usize::from(self.byte()?);
        let dims = (0..rank)
            .map(|_| self.length())
            .collect::<Result<Vec<_>, _>>()?;
        let shape = Shape::new(&dims).map_err(SerializeError::Shape)?;
        let count = shape.element_count().map_err(SerializeError::Shape)?;
        let needed = count.saturating_mul(dtype.size_bytes());
        if needed > self.remaining() {
            return Err(SerializeError::Truncated {
                needed,
                remaining: self.remaining(),
            });
        }
        let data = (0..count)
            .map(|_| self.element::<T>())
            .collect::<Result<Vec<_>, _>>()?;
        ArrayStorage::from_vec(shape, data).map_err(SerializeError::Shape)
    }

    fn annotation(&mut self) -> Result<Option<Annotation>, SerializeError> {
        match self.byte()? {
            0 => Ok(None),
            1 => {
                let json = self.string()?;
                serde_json::from_str(&json)
                    .map(Some)
                    .map_err(|err| SerializeError::Annotation(err.to_string()))
            }
            other => Err(SerializeError::InvalidBool(other)),
        }
    }

    pub(crate) fn value(&mut self, depth: usize) -> Result<Value, SerializeError> {
        if depth > MAX_DEPTH {
            return Err(SerializeError::TooDeep(MAX_DEPTH));
        }
        let tag = self.byte()?;
        let annotation = self.annotation()?;
        let kind = match tag {
            TAG_NIL => ValueKind::Nil,
            TAG_BOOL => ValueKind::Bool(self.storage()?),
            TAG_INT => ValueKind::Int(self.storage()?),
            TAG_FLOAT => ValueKind::Float(self.storage()?),
            TAG_STR => ValueKind::Str(self.string()?),
            TAG_LIST => {
                let count = self.length()?;
                let mut items = Vec::with_capacity(count.min(self.remaining()));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                ValueKind::List(items)
            }
            TAG_DICT => {
                let count = self.length()?;
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key = self.string()?;
                    entries.insert(key, self.value(depth + 1)?);
                }
                ValueKind::Dict(entries)
            }
            other => return Err(SerializeError::UnknownTag(other)),
        };
        Ok(Value { kind, annotation })
    }
}

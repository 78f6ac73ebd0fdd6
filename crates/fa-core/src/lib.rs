#![forbid(unsafe_code)]

//! Array storage, the dynamic [`Value`] and the extraction protocol.

#[cfg(test)]
pub mod proptest_strategies;

pub mod dtype;
pub mod error;
pub mod extract;
pub mod pending;
pub mod shape;
pub mod storage;
pub mod value;

pub use dtype::{DType, Element};
pub use error::{CoreError, ErrorKind};
pub use pending::{Pending, Promise};
pub use shape::{Dims, MAX_RANK, Shape};
pub use storage::{ArrayStorage, Elements, StorageKind};
pub use value::{Annotation, Locality, PendingValue, RemoteHandle, Value, ValueKind};

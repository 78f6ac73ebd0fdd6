use proptest::prelude::*;

use crate::dtype::DType;
use crate::shape::{MAX_RANK, Shape};
use crate::storage::ArrayStorage;
use crate::value::Value;

pub fn arb_dtype() -> impl Strategy<Value = DType> {
    prop::sample::select(DType::ALL.to_vec())
}

pub fn arb_shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(0_usize..4, 0..=MAX_RANK).prop_map(|dims| Shape {
        dims: dims.into_iter().collect(),
    })
}

fn element_count(shape: &Shape) -> usize {
    shape.dims.iter().product()
}

pub fn arb_i64_storage() -> impl Strategy<Value = ArrayStorage<i64>> {
    arb_shape().prop_flat_map(|shape| {
        let count = element_count(&shape);
        prop::collection::vec(-1_000_i64..1_000, count).prop_map(move |data| {
            ArrayStorage::from_vec(shape.clone(), data)
                .expect("strategy builds consistent element counts")
        })
    })
}

pub fn arb_f64_storage() -> impl Strategy<Value = ArrayStorage<f64>> {
    arb_shape().prop_flat_map(|shape| {
        let count = element_count(&shape);
        prop::collection::vec(-1.0e3_f64..1.0e3, count).prop_map(move |data| {
            ArrayStorage::from_vec(shape.clone(), data)
                .expect("strategy builds consistent element counts")
        })
    })
}

pub fn arb_bool_storage() -> impl Strategy<Value = ArrayStorage<bool>> {
    arb_shape().prop_flat_map(|shape| {
        let count = element_count(&shape);
        prop::collection::vec(any::<bool>(), count).prop_map(move |data| {
            ArrayStorage::from_vec(shape.clone(), data)
                .expect("strategy builds consistent element counts")
        })
    })
}

/// Array-holding values of every element type.
pub fn arb_array_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        arb_bool_storage().prop_map(Value::from),
        arb_i64_storage().prop_map(Value::from),
        arb_f64_storage().prop_map(Value::from),
    ]
}

/// Resolved values, nesting lists and dicts up to a small depth.
pub fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::nil()),
        "[a-z]{0,6}".prop_map(Value::string),
        arb_array_value(),
    ];
    leaf.prop_recursive(2, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::list),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..3).prop_map(Value::dict),
        ]
    })
}

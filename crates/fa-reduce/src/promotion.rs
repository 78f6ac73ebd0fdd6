use fa_core::DType;

/// Accumulating reductions (`sum`, `prod`) never accumulate in `bool`.
#[must_use]
pub fn accumulate_dtype(input: DType) -> DType {
    match input {
        DType::Bool => DType::I64,
        other => other,
    }
}

/// Averages are always computed in double precision.
#[must_use]
pub fn mean_dtype(_input: DType) -> DType {
    DType::F64
}

/// Ordering reductions keep the input type.
#[must_use]
pub fn same_dtype(input: DType) -> DType {
    input
}

/// Logical reductions always produce booleans.
#[must_use]
pub fn logical_dtype(_input: DType) -> DType {
    DType::Bool
}

/// The dtype a reduction produces: an explicit override wins, otherwise the
/// operator's rule applied to the input.
#[must_use]
pub fn result_dtype(
    input: DType,
    rule: impl FnOnce(DType) -> DType,
    requested: Option<DType>,
) -> DType {
    requested.unwrap_or_else(|| rule(input))
}

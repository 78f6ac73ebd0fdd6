#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod force;
pub mod invoker;

pub use config::{ConfigError, EngineConfig, ForcePath};
pub use context::EvalContext;
pub use force::{
    boolean_operand, boolean_operand_sync, force, force_operands, force_operands_sync,
    integer_operand, integer_operand_sync, literal_operand, literal_operand_sync, numeric_operand,
    numeric_operand_sync, scalar_integer_operand, scalar_integer_operand_sync, value_operand,
    value_operand_ref, value_operand_sync,
};
pub use invoker::{Invoker, LocalInvoker, Target, ThreadInvoker};

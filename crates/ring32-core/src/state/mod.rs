//! Architectural CPU state model primitives.

/// `flags` word layout table and codec.
pub mod flags;
/// Architectural register file types and storage model.
pub mod registers;
mod run_state;

pub use flags::{BitRange, FlagField, FlagLayout, FlagLayoutError, FlagSet, FlagsCodec};
pub use registers::{
    FloatRegister, IntRegister, RegisterFile, RegisterId, FLOAT_REGISTER_COUNT,
    INT_REGISTER_COUNT, REGISTER_COUNT,
};
pub use run_state::RunState;

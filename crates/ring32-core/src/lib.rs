//! Reference emulator core for the ring32 machine: a 32-bit CPU with
//! two-level paging, a System and a User ring, and eight maskable interrupt
//! lines.
//!
//! The host owns a [`Machine`] and a [`memory::PhysicalMemory`] and drives
//! them with an [`ExecutionEngine`], one instruction per
//! [`ExecutionEngine::step`].

/// Physical memory backing store, access kinds and rings.
pub mod memory;
pub use memory::{AccessKind, FlatMemory, PhysicalMemory, Ring, DEFAULT_PHYSICAL_BYTES};

/// Architectural register file and `flags` codec.
pub mod state;
pub use state::{
    FlagLayout, FlagLayoutError, FlagSet, FlagsCodec, FloatRegister, IntRegister, RegisterFile,
    RegisterId, RunState, REGISTER_COUNT,
};

/// Fault taxonomy.
pub mod fault;
pub use fault::{FaultClass, FaultCode};

/// Two-level address translation.
pub mod mmu;
pub use mmu::{
    translate, MmuFault, PagePermissions, PageTableEntry, PermissionPolicy, TableLevel,
    TranslationContext,
};

/// Interrupt lines, fault triggers and the entry hook.
pub mod interrupt;
pub use interrupt::{
    FaultInterruptIds, HostEntry, InterruptController, InterruptEntry, InterruptError,
    InterruptSource, LineState,
};

/// Decoded operation model.
pub mod operation;
pub use operation::{Condition, FloatBinaryOp, IntBinaryOp, Operation, ResultCategory};

/// Reference byte encoding tables.
pub mod encoding;

/// Decoder seam and reference decoder.
pub mod decoder;
pub use decoder::{DecodeError, InstructionDecoder, ReferenceDecoder};

/// Instruction execution pipeline.
pub mod execute;
pub use execute::{commit_execution, execute_operation, ExecuteState, ExecutionEngine, FlagsUpdate};

/// Host-facing configuration, machine aggregate and step outcomes.
pub mod api;
pub use api::{ConfigError, Machine, MachineConfig, RunBoundary, RunOutcome, StepOutcome};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;

//! Public host-facing API contracts for embedding the emulator core.

use thiserror::Error;

use crate::interrupt::{FaultInterruptIds, InterruptController, InterruptError, InterruptSource};
use crate::memory::{Ring, DEFAULT_PHYSICAL_BYTES};
use crate::mmu::PermissionPolicy;
use crate::state::{FlagLayout, FlagLayoutError, FlagsCodec, RegisterFile, RunState};
use crate::{DecodeError, FaultCode};

/// Default initial stack pointer: the top of [`crate::memory::FlatMemory`]'s
/// default image.
#[allow(clippy::cast_possible_truncation)]
pub const DEFAULT_RESET_STACK_POINTER: u32 = DEFAULT_PHYSICAL_BYTES as u32;

/// Top-level immutable configuration for a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MachineConfig {
    /// Bit positions of the `flags` fields.
    pub flag_layout: FlagLayout,
    /// Whether the system ring honours page permissions.
    pub permission_policy: PermissionPolicy,
    /// Last-Interrupt ids written for faults.
    pub fault_ids: FaultInterruptIds,
    /// PC after reset.
    pub reset_pc: u32,
    /// SP and stack base after reset.
    pub reset_stack_pointer: u32,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            flag_layout: FlagLayout::CANONICAL,
            permission_policy: PermissionPolicy::Enforced,
            fault_ids: FaultInterruptIds::default(),
            reset_pc: 0,
            reset_stack_pointer: DEFAULT_RESET_STACK_POINTER,
        }
    }
}

/// Rejection reasons for a [`MachineConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// The flag layout is malformed.
    #[error(transparent)]
    Layout(#[from] FlagLayoutError),
    /// A fault id does not fit the 3-bit `LLL` field.
    #[error("Last-Interrupt id {id} for {fault:?} does not fit in 3 bits")]
    FaultIdOutOfRange {
        /// Fault whose id is invalid.
        fault: FaultCode,
        /// Configured id.
        id: u8,
    },
}

impl MachineConfig {
    /// Checks every field a deserialized config could get wrong.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a malformed layout or an oversized
    /// fault id.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.flag_layout.validate()?;
        let ids = &self.fault_ids;
        for (fault, id) in [
            (FaultCode::PageFault, ids.page_fault),
            (FaultCode::ProtectionFault, ids.protection_fault),
            (FaultCode::PrivilegeFault, ids.privilege_fault),
        ] {
            if id > 7 {
                return Err(ConfigError::FaultIdOutOfRange { fault, id });
            }
        }
        Ok(())
    }

    /// Codec for the configured layout.
    #[must_use]
    pub const fn codec(&self) -> FlagsCodec {
        FlagsCodec::new(self.flag_layout)
    }
}

/// Architectural machine state stepped by [`crate::ExecutionEngine`].
///
/// Physical memory lives outside the machine and is passed to every step.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Machine {
    /// Register file.
    pub registers: RegisterFile,
    /// Interrupt line state.
    pub interrupts: InterruptController,
    /// Fetch state.
    pub run_state: RunState,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(&MachineConfig::default())
    }
}

impl Machine {
    /// Machine in its reset state.
    #[must_use]
    pub fn new(config: &MachineConfig) -> Self {
        let mut machine = Self {
            registers: RegisterFile::default(),
            interrupts: InterruptController::new(config.fault_ids),
            run_state: RunState::Running,
        };
        machine.reset(config);
        machine
    }

    /// Restores reset defaults: zeroed registers, system ring, translation
    /// off, every line masked and idle.
    pub fn reset(&mut self, config: &MachineConfig) {
        self.registers.reset();
        self.registers.set_pc(config.reset_pc);
        self.registers.set_sp(config.reset_stack_pointer);
        self.registers.set_bp(config.reset_stack_pointer);
        self.interrupts = InterruptController::new(config.fault_ids);
        self.run_state = RunState::Running;
    }

    /// Raises maskable line `line`.
    ///
    /// # Errors
    ///
    /// Returns [`InterruptError::LineOutOfRange`] for `line >= 8`.
    pub fn raise_interrupt(&mut self, line: u8) -> Result<(), InterruptError> {
        self.interrupts.raise(line)
    }

    /// Current ring as seen through `codec`.
    #[must_use]
    pub fn ring(&self, codec: &FlagsCodec) -> Ring {
        Ring::from_user_flag(codec.decode(self.registers.flags()).user_ring)
    }
}

/// Output status from one instruction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StepOutcome {
    /// An operation retired and no source fired.
    Retired,
    /// The machine is halted and no source fired.
    Halted,
    /// A source fired at the checkpoint.
    Interrupted {
        /// Source that fired.
        source: InterruptSource,
    },
    /// The decoder rejected the bytes at `pc`. Nothing changed.
    InvalidOpcode {
        /// Address of the rejected instruction.
        pc: u32,
        /// Decoder diagnosis.
        error: DecodeError,
    },
}

/// Run-loop stop condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunBoundary {
    /// Stop once a step reports [`StepOutcome::Halted`].
    Halted,
    /// Stop on any interrupt.
    Interrupt,
    /// Stop on a fault-sourced interrupt.
    Fault,
    /// Only stop at the step limit.
    StepLimit,
}

impl RunBoundary {
    /// Returns `true` when `outcome` ends a run. An invalid opcode always
    /// does, since retrying it cannot make progress.
    #[must_use]
    pub const fn stops_at(self, outcome: &StepOutcome) -> bool {
        match outcome {
            StepOutcome::InvalidOpcode { .. } => true,
            StepOutcome::Halted => matches!(self, Self::Halted),
            StepOutcome::Interrupted { source } => match self {
                Self::Interrupt => true,
                Self::Fault => matches!(source, InterruptSource::Fault(_)),
                Self::Halted | Self::StepLimit => false,
            },
            StepOutcome::Retired => false,
        }
    }
}

/// Aggregated outcome from running multiple steps until a selected boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunOutcome {
    /// Number of steps taken during this run call.
    pub steps: u64,
    /// Last step-level status, `None` when no step ran.
    pub final_step: Option<StepOutcome>,
}

//! Instruction execution pipeline.
//!
//! Every step runs Fetch, Decode, Execute, Retire and then the interrupt
//! checkpoint:
//! 1. Fetch the opcode byte and its operands through the MMU
//! 2. Decode through the configured [`InstructionDecoder`]
//! 3. Check the ring, then compute every effect into an [`ExecuteState`]
//! 4. Commit the effects and update flags by result category
//! 5. Latch the interrupt lines and service at most one source
//!
//! Faults are precise: a faulting instruction commits nothing and PC keeps
//! pointing at it.

#![allow(
    clippy::too_many_lines,
    clippy::module_name_repetitions,
    clippy::missing_const_for_fn,
    clippy::cast_possible_truncation,
    unknown_lints
)]

mod flags;
mod helpers;

pub use flags::FlagsUpdate;
pub use helpers::{float_binary, float_to_u32, int_binary, u32_to_float, DataPort, IntResult};

use tracing::{debug, trace};

use crate::api::{ConfigError, MachineConfig, RunBoundary, RunOutcome, StepOutcome};
use crate::decoder::{InstructionDecoder, ReferenceDecoder};
use crate::interrupt::{HostEntry, InterruptEntry};
use crate::memory::{AccessKind, PhysicalMemory, Ring};
use crate::mmu::{MmuFault, TranslationContext};
use crate::operation::{Operation, ResultCategory};
use crate::state::{FlagSet, FlagsCodec, FloatRegister, IntRegister, RegisterFile, RegisterId, RunState};
use crate::{DecodeError, FaultCode, Machine};

/// Largest instruction length the fetch stage accepts from a decoder.
pub const MAX_FETCH_BYTES: usize = 16;

/// A translated word store waiting for retire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    /// Physical address of each byte.
    pub phys: [u32; 4],
    /// Little-endian bytes to store.
    pub bytes: [u8; 4],
}

/// Effects of one operation, computed before anything is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteState {
    /// PC after retire, unless a register write targets `x13`.
    pub next_pc: u32,
    /// Register writes, applied in order after PC.
    pub register_writes: [Option<(RegisterId, u32)>; 2],
    /// Memory store, if any.
    pub memory_write: Option<PendingWrite>,
    /// Flag group the result updates.
    pub category: ResultCategory,
    /// Result checked against the flags of `category`. Float results carry
    /// their raw bits in `value`.
    pub result: IntResult,
    /// Control-flag change of a [`ResultCategory::NoFlags`] operation.
    pub flags_update: FlagsUpdate,
    /// Whether the machine halts at retire.
    pub halt: bool,
}

impl ExecuteState {
    /// Effects of an operation that only falls through to `next_pc`.
    #[must_use]
    pub const fn new(next_pc: u32) -> Self {
        Self {
            next_pc,
            register_writes: [None; 2],
            memory_write: None,
            category: ResultCategory::NoFlags,
            result: IntResult {
                value: 0,
                carry: false,
                overflow: false,
            },
            flags_update: FlagsUpdate::None,
            halt: false,
        }
    }

    /// Flag update applied at retire, chosen by [`Self::category`].
    #[must_use]
    pub const fn retired_flags(&self) -> FlagsUpdate {
        match self.category {
            ResultCategory::Integer => FlagsUpdate::Integer {
                value: self.result.value,
                carry: self.result.carry,
                overflow: self.result.overflow,
            },
            ResultCategory::Float => FlagsUpdate::Float {
                bits: self.result.value,
            },
            ResultCategory::NoFlags => self.flags_update,
        }
    }

    fn write_register(&mut self, id: RegisterId, value: u32) {
        if let Some(slot) = self.register_writes.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some((id, value));
        }
    }

    fn int_result(&mut self, dst: IntRegister, result: IntResult) {
        self.write_register(dst.into(), result.value);
        self.result = result;
    }

    fn plain_int(&mut self, dst: IntRegister, value: u32) {
        self.int_result(
            dst,
            IntResult {
                value,
                carry: false,
                overflow: false,
            },
        );
    }

    fn float_result(&mut self, dst: FloatRegister, bits: u32) {
        self.write_register(dst.into(), bits);
        self.result = IntResult {
            value: bits,
            carry: false,
            overflow: false,
        };
    }
}

fn data_fault(fault: MmuFault) -> FaultCode {
    trace!(vaddr = fault.vaddr(), %fault, "data access faulted");
    fault.fault_code()
}

fn store(
    exec: &mut ExecuteState,
    port: &mut DataPort<'_>,
    vaddr: u32,
    value: u32,
) -> Result<(), FaultCode> {
    let phys = port
        .translate_word(vaddr, AccessKind::Write)
        .map_err(data_fault)?;
    exec.memory_write = Some(PendingWrite {
        phys,
        bytes: value.to_le_bytes(),
    });
    Ok(())
}

fn push(
    exec: &mut ExecuteState,
    registers: &RegisterFile,
    port: &mut DataPort<'_>,
    value: u32,
) -> Result<(), FaultCode> {
    let sp = registers.sp().wrapping_sub(4);
    store(exec, port, sp, value)?;
    exec.write_register(IntRegister::SP.into(), sp);
    Ok(())
}

/// Computes the effects of `op` without committing any of them.
///
/// `flags` is the decoded `flags` word at the start of the instruction and
/// `next_pc` its fall-through address.
///
/// # Errors
///
/// Returns [`FaultCode::PrivilegeFault`] for a privileged operation in the
/// user ring, or the page/protection fault of the first data access the MMU
/// rejects.
pub fn execute_operation(
    op: &Operation,
    registers: &RegisterFile,
    flags: &FlagSet,
    next_pc: u32,
    port: &mut DataPort<'_>,
) -> Result<ExecuteState, FaultCode> {
    if op.requires_system_ring() && flags.user_ring {
        return Err(FaultCode::PrivilegeFault);
    }

    let mut exec = ExecuteState::new(next_pc);
    exec.category = op.result_category();
    match *op {
        Operation::ClearCarry => exec.flags_update = FlagsUpdate::Carry(false),
        Operation::SetCarry => exec.flags_update = FlagsUpdate::Carry(true),
        Operation::Nop => {}
        Operation::Halt => exec.halt = true,
        Operation::SetMemoryMap { enabled } => exec.flags_update = FlagsUpdate::MemoryMap(enabled),
        Operation::SetRing(ring) => exec.flags_update = FlagsUpdate::Ring(ring),
        Operation::Return => {
            let sp = registers.sp();
            exec.next_pc = port.read_word(sp).map_err(data_fault)?;
            exec.write_register(IntRegister::SP.into(), sp.wrapping_add(4));
        }
        Operation::LoadIntImmediate { dst, value } => exec.plain_int(dst, value),
        Operation::LoadFloatImmediate { dst, bits } => exec.float_result(dst, bits),
        Operation::LoadIntAbsolute { dst, addr } => {
            let value = port.read_word(addr).map_err(data_fault)?;
            exec.plain_int(dst, value);
        }
        Operation::LoadFloatAbsolute { dst, addr } => {
            let bits = port.read_word(addr).map_err(data_fault)?;
            exec.float_result(dst, bits);
        }
        Operation::IntBinary { op, dst, src } => {
            let result = int_binary(op, registers.x(dst), registers.x(src), flags.carry);
            exec.int_result(dst, result);
        }
        Operation::FloatBinary { op, dst, src } => {
            let value = float_binary(op, registers.f(dst), registers.f(src));
            exec.float_result(dst, value.to_bits());
        }
        Operation::MoveInt { dst, src } => exec.plain_int(dst, registers.x(src)),
        Operation::MoveFloat { dst, src } => exec.float_result(dst, registers.f_bits(src)),
        Operation::IntFromFloat { dst, src } => {
            exec.plain_int(dst, float_to_u32(registers.f(src)));
        }
        Operation::FloatFromInt { dst, src } => {
            exec.float_result(dst, u32_to_float(registers.x(src)).to_bits());
        }
        Operation::TransmuteIntFromFloat { dst, src } => {
            exec.plain_int(dst, registers.f_bits(src));
        }
        Operation::TransmuteFloatFromInt { dst, src } => {
            exec.float_result(dst, registers.x(src));
        }
        Operation::LoadIntIndirect { dst, addr } => {
            let value = port.read_word(registers.x(addr)).map_err(data_fault)?;
            exec.plain_int(dst, value);
        }
        Operation::LoadFloatIndirect { dst, addr } => {
            let bits = port.read_word(registers.x(addr)).map_err(data_fault)?;
            exec.float_result(dst, bits);
        }
        Operation::StoreIntIndirect { addr, src } => {
            store(&mut exec, port, registers.x(addr), registers.x(src))?;
        }
        Operation::StoreFloatIndirect { addr, src } => {
            store(&mut exec, port, registers.x(addr), registers.f_bits(src))?;
        }
        Operation::StoreIntAbsolute { addr, src } => {
            store(&mut exec, port, addr, registers.x(src))?;
        }
        Operation::StoreFloatAbsolute { addr, src } => {
            store(&mut exec, port, addr, registers.f_bits(src))?;
        }
        Operation::WriteMask { src } => {
            let mask = registers.x(src);
            exec.write_register(RegisterId::Mask, mask);
            exec.flags_update = FlagsUpdate::InterruptMirror(mask.to_le_bytes()[0]);
        }
        Operation::WriteMemmap { src } => {
            exec.write_register(RegisterId::Memmap, registers.x(src));
        }
        Operation::ReadMask { dst } => exec.write_register(dst.into(), registers.mask()),
        Operation::ReadMemmap { dst } => exec.write_register(dst.into(), registers.memmap()),
        Operation::Push { src } => push(&mut exec, registers, port, registers.x(src))?,
        Operation::Pop { dst } => {
            let sp = registers.sp();
            let value = port.read_word(sp).map_err(data_fault)?;
            exec.write_register(IntRegister::SP.into(), sp.wrapping_add(4));
            exec.write_register(dst.into(), value);
        }
        Operation::JumpRegister { target } => exec.next_pc = registers.x(target),
        Operation::CallRegister { target } => {
            push(&mut exec, registers, port, next_pc)?;
            exec.next_pc = registers.x(target);
        }
        Operation::Branch { condition, target } => {
            if condition.holds(flags) {
                exec.next_pc = target;
            }
        }
        Operation::Call { target } => {
            push(&mut exec, registers, port, next_pc)?;
            exec.next_pc = target;
        }
    }

    Ok(exec)
}

/// Applies the effects computed by [`execute_operation`].
///
/// PC is written first, so a register write to `x13` acts as a jump. Flags
/// are re-encoded only when the update changes them.
pub fn commit_execution(
    registers: &mut RegisterFile,
    codec: &FlagsCodec,
    exec: &ExecuteState,
    memory: &mut dyn PhysicalMemory,
) {
    registers.set_pc(exec.next_pc);

    for &(id, value) in exec.register_writes.iter().flatten() {
        registers.write(id, value);
    }

    if let Some(write) = exec.memory_write {
        for (addr, byte) in write.phys.into_iter().zip(write.bytes) {
            memory.write_bytes(addr, &[byte]);
        }
    }

    let update = exec.retired_flags();
    if update != FlagsUpdate::None {
        let mut flags = codec.decode(registers.flags());
        update.apply(&mut flags);
        registers.set_flags(codec.encode(&flags));
    }
}

enum FetchError {
    Fault(MmuFault),
    Invalid(DecodeError),
}

/// Steps a [`Machine`] against a physical memory.
///
/// The decoder and the interrupt entry convention are pluggable; the
/// defaults decode the reference encoding and leave vectoring to the host.
#[derive(Debug, Clone)]
pub struct ExecutionEngine<D = ReferenceDecoder, E = HostEntry> {
    config: MachineConfig,
    codec: FlagsCodec,
    decoder: D,
    entry: E,
}

impl ExecutionEngine {
    /// Engine with the reference decoder and [`HostEntry`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `config` does not validate.
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, ReferenceDecoder, HostEntry)
    }
}

impl<D: InstructionDecoder, E: InterruptEntry> ExecutionEngine<D, E> {
    /// Engine with a custom decoder and entry convention.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `config` does not validate.
    pub fn with_parts(config: MachineConfig, decoder: D, entry: E) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            codec: config.codec(),
            config,
            decoder,
            entry,
        })
    }

    /// Configuration this engine was built with.
    #[must_use]
    pub const fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Codec for the configured flag layout.
    #[must_use]
    pub const fn codec(&self) -> &FlagsCodec {
        &self.codec
    }

    /// Instruction decoder.
    #[must_use]
    pub const fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Interrupt entry convention.
    #[must_use]
    pub const fn entry(&self) -> &E {
        &self.entry
    }

    /// Mutable access to the interrupt entry convention.
    pub fn entry_mut(&mut self) -> &mut E {
        &mut self.entry
    }

    /// Runs one instruction cycle followed by the interrupt checkpoint.
    ///
    /// A halted machine skips straight to the checkpoint. A decode failure
    /// returns [`StepOutcome::InvalidOpcode`] before the checkpoint with the
    /// machine untouched.
    pub fn step(&mut self, machine: &mut Machine, memory: &mut dyn PhysicalMemory) -> StepOutcome {
        if !machine.run_state.is_halted() {
            if let Err(error) = self.cycle(machine, memory) {
                let pc = machine.registers.pc();
                debug!(pc, %error, "invalid opcode");
                return StepOutcome::InvalidOpcode { pc, error };
            }
        }
        self.checkpoint(machine, memory)
    }

    /// Steps until `boundary` is reached or `max_steps` steps have run.
    pub fn run(
        &mut self,
        machine: &mut Machine,
        memory: &mut dyn PhysicalMemory,
        boundary: RunBoundary,
        max_steps: u64,
    ) -> RunOutcome {
        let mut outcome = RunOutcome {
            steps: 0,
            final_step: None,
        };
        while outcome.steps < max_steps {
            let step = self.step(machine, memory);
            outcome.steps += 1;
            outcome.final_step = Some(step);
            if boundary.stops_at(&step) {
                break;
            }
        }
        outcome
    }

    fn translation_context(&self, registers: &RegisterFile, flags: &FlagSet) -> TranslationContext {
        TranslationContext {
            ring: Ring::from_user_flag(flags.user_ring),
            memmap: registers.memmap(),
            enabled: flags.memory_map,
            policy: self.config.permission_policy,
        }
    }

    fn cycle(
        &self,
        machine: &mut Machine,
        memory: &mut dyn PhysicalMemory,
    ) -> Result<(), DecodeError> {
        let flags = self.codec.decode(machine.registers.flags());
        let pc = machine.registers.pc();
        let mut port = DataPort::new(self.translation_context(&machine.registers, &flags), memory);

        let mut raw = [0_u8; MAX_FETCH_BYTES];
        let len = match self.fetch(pc, &mut port, &mut raw) {
            Ok(len) => len,
            Err(FetchError::Fault(fault)) => {
                trace!(vaddr = fault.vaddr(), %fault, "fetch faulted");
                record_fault(machine, fault.fault_code(), pc);
                return Ok(());
            }
            Err(FetchError::Invalid(error)) => return Err(error),
        };

        let operation = self.decoder.decode(&raw[..len])?;
        let next_pc = pc.wrapping_add(len as u32);

        match execute_operation(&operation, &machine.registers, &flags, next_pc, &mut port) {
            Ok(exec) => {
                trace!(pc, %operation, "retire");
                commit_execution(&mut machine.registers, &self.codec, &exec, memory);
                if exec.halt {
                    debug!(pc, "halted");
                    machine.run_state = RunState::Halted;
                }
            }
            Err(fault) => record_fault(machine, fault, pc),
        }
        Ok(())
    }

    fn fetch(
        &self,
        pc: u32,
        port: &mut DataPort<'_>,
        raw: &mut [u8; MAX_FETCH_BYTES],
    ) -> Result<usize, FetchError> {
        let opcode = port
            .read_byte(pc, AccessKind::Execute)
            .map_err(FetchError::Fault)?;
        let len = self
            .decoder
            .instruction_len(opcode)
            .map_err(FetchError::Invalid)?;
        if len == 0 || len > MAX_FETCH_BYTES {
            return Err(FetchError::Invalid(DecodeError::LengthOutOfRange { opcode, len }));
        }

        raw[0] = opcode;
        for (offset, byte) in (1_u32..).zip(raw[1..len].iter_mut()) {
            *byte = port
                .read_byte(pc.wrapping_add(offset), AccessKind::Execute)
                .map_err(FetchError::Fault)?;
        }
        Ok(len)
    }

    fn gate(&self, registers: &RegisterFile, flags: &FlagSet) -> u8 {
        let mask = registers.mask().to_le_bytes()[0];
        if self.codec.layout().mirrors_mask() {
            mask & flags.interrupt_mirror
        } else {
            mask
        }
    }

    fn checkpoint(&mut self, machine: &mut Machine, memory: &mut dyn PhysicalMemory) -> StepOutcome {
        let mut flags = self.codec.decode(machine.registers.flags());
        machine
            .interrupts
            .latch(self.gate(&machine.registers, &flags));

        let Some(source) = machine.interrupts.service_next(&mut flags) else {
            return if machine.run_state.is_halted() {
                StepOutcome::Halted
            } else {
                StepOutcome::Retired
            };
        };

        machine.registers.set_flags(self.codec.encode(&flags));
        machine.run_state = RunState::Running;
        debug!(?source, pc = machine.registers.pc(), "interrupt dispatched");
        self.entry.enter(machine, memory, source);
        StepOutcome::Interrupted { source }
    }
}

fn record_fault(machine: &mut Machine, fault: FaultCode, pc: u32) {
    debug!(pc, %fault, class = ?fault.class(), "fault");
    if let Err(error) = machine.interrupts.raise_fault(fault) {
        debug!(%error, "fault not delivered");
    }
}

//! End-to-end guest programs driven through the public engine API.

#![allow(clippy::pedantic, clippy::nursery, clippy::too_many_lines)]

use proptest as _;
use ring32_core::{
    Condition, DecodeError, ExecutionEngine, FaultCode, FlagsCodec, FlatMemory, FloatBinaryOp,
    FloatRegister, HostEntry, InstructionDecoder, IntBinaryOp, IntRegister, InterruptEntry,
    InterruptSource, Machine, MachineConfig, Operation, PagePermissions, PageTableEntry,
    PhysicalMemory, ReferenceDecoder, Ring, RunBoundary, RunOutcome, RunState, StepOutcome,
};
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;
use tracing as _;

const STACK_TOP: u32 = 0x1_0000;
const ROOT: u32 = 0x2_0000;
const SECOND: u32 = 0x2_0400;
const USER_CODE: u32 = 0x1_0000;
const HANDLER: u32 = 0x80;

fn config() -> MachineConfig {
    MachineConfig {
        reset_stack_pointer: STACK_TOP,
        ..MachineConfig::default()
    }
}

fn assemble(ops: &[Operation]) -> Vec<u8> {
    ops.iter().flat_map(ReferenceDecoder::encode).collect()
}

fn boot(ops: &[Operation]) -> (ExecutionEngine, Machine, FlatMemory) {
    let engine = ExecutionEngine::new(config()).expect("valid config");
    let machine = Machine::new(&config());
    let mut memory = FlatMemory::new(0x4_0000);
    memory.load(0, &assemble(ops));
    (engine, machine, memory)
}

#[test]
fn counting_loop_sums_one_to_ten() {
    let (mut engine, mut machine, mut memory) = boot(&[
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: 10 },
        Operation::LoadIntImmediate { dst: IntRegister::X2, value: 0 },
        Operation::LoadIntImmediate { dst: IntRegister::X3, value: 1 },
        Operation::ClearCarry,
        Operation::IntBinary { op: IntBinaryOp::Add, dst: IntRegister::X2, src: IntRegister::X1 },
        Operation::SetCarry,
        Operation::IntBinary { op: IntBinaryOp::Sub, dst: IntRegister::X1, src: IntRegister::X3 },
        Operation::Branch { condition: Condition::NotZero, target: 15 },
        Operation::Halt,
    ]);

    let outcome = engine.run(&mut machine, &mut memory, RunBoundary::Halted, 1_000);

    assert_eq!(outcome.final_step, Some(StepOutcome::Halted));
    assert_eq!(outcome.steps, 3 + 10 * 5 + 1);
    assert_eq!(machine.registers.x(IntRegister::X2), 55);
    assert_eq!(machine.registers.x(IntRegister::X1), 0);
    assert_eq!(machine.registers.pc(), 27);
}

#[test]
fn float_pipeline_converts_both_ways() {
    let (mut engine, mut machine, mut memory) = boot(&[
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: 7 },
        Operation::FloatFromInt { dst: FloatRegister::F1, src: IntRegister::X1 },
        Operation::LoadFloatImmediate { dst: FloatRegister::F2, bits: 0.5_f32.to_bits() },
        Operation::FloatBinary { op: FloatBinaryOp::Mul, dst: FloatRegister::F1, src: FloatRegister::F2 },
        Operation::IntFromFloat { dst: IntRegister::X2, src: FloatRegister::F1 },
        Operation::TransmuteIntFromFloat { dst: IntRegister::X3, src: FloatRegister::F1 },
        Operation::Halt,
    ]);

    engine.run(&mut machine, &mut memory, RunBoundary::Halted, 100);

    assert_eq!(machine.registers.f_bits(FloatRegister::F1), 3.5_f32.to_bits());
    assert_eq!(machine.registers.x(IntRegister::X2), 3);
    assert_eq!(machine.registers.x(IntRegister::X3), 3.5_f32.to_bits());
    let flags = FlagsCodec::default().decode(machine.registers.flags());
    assert!(!flags.nan && !flags.infinite);
}

#[rstest]
#[case(IntBinaryOp::Div, 7, 0, 0)]
#[case(IntBinaryOp::Mod, 7, 0, 0)]
#[case(IntBinaryOp::Div, 7, 2, 3)]
#[case(IntBinaryOp::Mod, 7, 2, 1)]
#[case(IntBinaryOp::Mul, 0x8000_0000, 2, 0)]
#[case(IntBinaryOp::Xor, 0xF0F0, 0xFFFF, 0x0F0F)]
fn integer_operations_write_destination(
    #[case] op: IntBinaryOp,
    #[case] a: u32,
    #[case] b: u32,
    #[case] expected: u32,
) {
    let (mut engine, mut machine, mut memory) = boot(&[
        Operation::LoadIntImmediate { dst: IntRegister::X4, value: a },
        Operation::LoadIntImmediate { dst: IntRegister::X5, value: b },
        Operation::IntBinary { op, dst: IntRegister::X4, src: IntRegister::X5 },
    ]);
    engine.run(&mut machine, &mut memory, RunBoundary::StepLimit, 3);

    assert_eq!(machine.registers.x(IntRegister::X4), expected);
    let flags = FlagsCodec::default().decode(machine.registers.flags());
    assert_eq!(flags.zero, expected == 0);
}

#[test]
fn memory_round_trip_through_indirect_and_absolute_forms() {
    let (mut engine, mut machine, mut memory) = boot(&[
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: 0x3000 },
        Operation::LoadIntImmediate { dst: IntRegister::X2, value: 0xDEAD_BEEF },
        Operation::StoreIntIndirect { addr: IntRegister::X1, src: IntRegister::X2 },
        Operation::LoadIntAbsolute { dst: IntRegister::X3, addr: 0x3000 },
        Operation::LoadFloatIndirect { dst: FloatRegister::F0, addr: IntRegister::X1 },
        Operation::StoreFloatAbsolute { addr: 0x3004, src: FloatRegister::F0 },
        Operation::Halt,
    ]);

    engine.run(&mut machine, &mut memory, RunBoundary::Halted, 100);

    assert_eq!(memory.as_slice()[0x3000..0x3004], [0xEF, 0xBE, 0xAD, 0xDE]);
    assert_eq!(machine.registers.x(IntRegister::X3), 0xDEAD_BEEF);
    assert_eq!(machine.registers.f_bits(FloatRegister::F0), 0xDEAD_BEEF);
    assert_eq!(memory.read_u32(0x3004), 0xDEAD_BEEF);
}

#[test]
fn control_registers_are_readable() {
    let (mut engine, mut machine, mut memory) = boot(&[
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: 0b1010 },
        Operation::WriteMask { src: IntRegister::X1 },
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: ROOT },
        Operation::WriteMemmap { src: IntRegister::X1 },
        Operation::ReadMask { dst: IntRegister::X2 },
        Operation::ReadMemmap { dst: IntRegister::X3 },
    ]);
    engine.run(&mut machine, &mut memory, RunBoundary::StepLimit, 6);

    assert_eq!(machine.registers.x(IntRegister::X2), 0b1010);
    assert_eq!(machine.registers.x(IntRegister::X3), ROOT);
}

/// Vectors every source to [`HANDLER`] in the system ring and records the
/// interrupted PC in `x12`.
struct KernelEntry {
    codec: FlagsCodec,
    entered: Vec<InterruptSource>,
}

impl InterruptEntry for KernelEntry {
    fn enter(
        &mut self,
        machine: &mut Machine,
        _memory: &mut dyn PhysicalMemory,
        source: InterruptSource,
    ) {
        let mut flags = self.codec.decode(machine.registers.flags());
        flags.user_ring = false;
        machine.registers.set_flags(self.codec.encode(&flags));
        machine.registers.set_x(IntRegister::X12, machine.registers.pc());
        machine.registers.set_pc(HANDLER);
        self.entered.push(source);
    }
}

#[test]
fn user_program_trapping_into_kernel_handler() {
    let kernel = assemble(&[
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: ROOT },
        Operation::WriteMemmap { src: IntRegister::X1 },
        Operation::SetMemoryMap { enabled: true },
        Operation::LoadIntImmediate { dst: IntRegister::X2, value: USER_CODE },
        Operation::SetRing(Ring::User),
        Operation::JumpRegister { target: IntRegister::X2 },
    ]);
    let user = assemble(&[
        Operation::LoadIntImmediate { dst: IntRegister::X3, value: 5 },
        Operation::WriteMask { src: IntRegister::X3 },
    ]);

    let mut memory = FlatMemory::new(0x4_0000);
    memory.load(0, &kernel);
    memory.load(HANDLER, &assemble(&[Operation::Halt]));
    memory.load(USER_CODE, &user);
    memory.write_u32(ROOT, SECOND);
    memory.write_u32(SECOND, PageTableEntry::mapped(0, PagePermissions::ALL).raw());
    memory.write_u32(SECOND + 4, PageTableEntry::mapped(1, PagePermissions::READ_EXECUTE).raw());

    let entry = KernelEntry {
        codec: FlagsCodec::default(),
        entered: Vec::new(),
    };
    let mut engine =
        ExecutionEngine::with_parts(config(), ReferenceDecoder, entry).expect("valid config");
    let mut machine = Machine::new(&config());

    let outcome = engine.run(&mut machine, &mut memory, RunBoundary::Halted, 100);

    assert_eq!(
        outcome,
        RunOutcome { steps: 9, final_step: Some(StepOutcome::Halted) }
    );
    assert_eq!(
        engine.entry().entered,
        [InterruptSource::Fault(FaultCode::PrivilegeFault)]
    );
    assert_eq!(machine.registers.x(IntRegister::X12), USER_CODE + 5);
    assert_eq!(machine.registers.mask(), 0);
    let flags = FlagsCodec::default().decode(machine.registers.flags());
    assert!(!flags.user_ring && flags.memory_map);
    assert_eq!(flags.last_interrupt, 2);
    assert_eq!(machine.run_state, RunState::Halted);
}

#[test]
fn reset_restores_boot_state_and_keeps_memory() {
    let (mut engine, mut machine, mut memory) = boot(&[
        Operation::LoadIntImmediate { dst: IntRegister::X1, value: 1 },
        Operation::StoreIntAbsolute { addr: 0x2000, src: IntRegister::X1 },
        Operation::Halt,
    ]);
    engine.run(&mut machine, &mut memory, RunBoundary::Halted, 10);
    assert_eq!(machine.run_state, RunState::Halted);

    machine.reset(&config());

    assert_eq!(machine, Machine::new(&config()));
    assert_eq!(machine.registers.sp(), STACK_TOP);
    assert_eq!(memory.read_u32(0x2000), 1);
    assert_eq!(engine.step(&mut machine, &mut memory), StepOutcome::Retired);
}

/// One-byte toy encoding: `0x00` nop, `0x01` halt.
struct TinyDecoder;

impl InstructionDecoder for TinyDecoder {
    fn instruction_len(&self, opcode: u8) -> Result<usize, DecodeError> {
        match opcode {
            0x00 | 0x01 => Ok(1),
            _ => Err(DecodeError::UnknownOpcode { opcode }),
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<Operation, DecodeError> {
        match raw.first() {
            Some(0x00) => Ok(Operation::Nop),
            Some(0x01) => Ok(Operation::Halt),
            Some(&opcode) => Err(DecodeError::UnknownOpcode { opcode }),
            None => Err(DecodeError::Truncated { expected: 1, actual: 0 }),
        }
    }
}

#[test]
fn engine_accepts_a_custom_decoder() {
    let mut engine =
        ExecutionEngine::with_parts(config(), TinyDecoder, HostEntry).expect("valid config");
    let mut machine = Machine::new(&config());
    let mut memory = FlatMemory::new(0x100);
    memory.load(0, &[0x00, 0x00, 0x01]);

    let outcome = engine.run(&mut machine, &mut memory, RunBoundary::Halted, 10);
    assert_eq!(outcome, RunOutcome { steps: 3, final_step: Some(StepOutcome::Halted) });

    memory.load(3, &[0x02]);
    machine.run_state = RunState::Running;
    assert_eq!(
        engine.step(&mut machine, &mut memory),
        StepOutcome::InvalidOpcode { pc: 3, error: DecodeError::UnknownOpcode { opcode: 0x02 } }
    );
}

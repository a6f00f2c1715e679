#![no_main]

use libfuzzer_sys::fuzz_target;
use ring32_core::{
    translate, AccessKind, ExecutionEngine, FlatMemory, InstructionDecoder, Machine,
    MachineConfig, PermissionPolicy, PhysicalMemory, ReferenceDecoder, Ring, RunBoundary,
    TranslationContext,
};

const IMAGE_BYTES: usize = 0x2_0000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let _ = ReferenceDecoder.decode(data);

    let flags = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let memmap = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) % IMAGE_BYTES as u32;
    let program = &data[8..];

    let config = MachineConfig {
        reset_stack_pointer: IMAGE_BYTES as u32,
        ..MachineConfig::default()
    };
    let Ok(mut engine) = ExecutionEngine::new(config) else {
        return;
    };
    let mut machine = Machine::new(&config);
    let mut memory = FlatMemory::new(IMAGE_BYTES);
    memory.load(0, program);
    memory.load(memmap, program);
    machine.registers.set_flags(flags);
    machine.registers.set_memmap(memmap);
    machine.registers.set_mask(u32::from(data[0]));
    let _ = machine.raise_interrupt(data[1] & 0x7);

    let _ = engine.run(&mut machine, &mut memory, RunBoundary::StepLimit, 64);

    let ctx = TranslationContext {
        ring: Ring::from_user_flag(flags & 1 != 0),
        memmap,
        enabled: true,
        policy: PermissionPolicy::Enforced,
    };
    for vaddr in program.chunks_exact(4).take(8) {
        let vaddr = u32::from_le_bytes([vaddr[0], vaddr[1], vaddr[2], vaddr[3]]);
        if let Ok(phys) = translate(vaddr, AccessKind::Read, &ctx, &mut memory) {
            let _ = memory.read_u32(phys);
        }
    }
});

//! Arithmetic kernels and translated data access for instruction execution.

use crate::memory::{AccessKind, PhysicalMemory};
use crate::mmu::{translate, MmuFault, TranslationContext};
use crate::operation::{FloatBinaryOp, IntBinaryOp};

/// Integer ALU result before it is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntResult {
    /// Result value.
    pub value: u32,
    /// New `C`.
    pub carry: bool,
    /// New `V`.
    pub overflow: bool,
}

impl IntResult {
    const fn plain(value: u32) -> Self {
        Self {
            value,
            carry: false,
            overflow: false,
        }
    }
}

/// Evaluates `a op b` with the incoming carry flag.
#[must_use]
pub fn int_binary(op: IntBinaryOp, a: u32, b: u32, carry_in: bool) -> IntResult {
    match op {
        IntBinaryOp::Add => add_with_carry(a, b, carry_in),
        IntBinaryOp::Sub => add_with_carry(a, !b, carry_in),
        IntBinaryOp::Mul => {
            let wide = u64::from(a) * u64::from(b);
            IntResult {
                value: a.wrapping_mul(b),
                carry: wide > u64::from(u32::MAX),
                overflow: i32_bits(a).checked_mul(i32_bits(b)).is_none(),
            }
        }
        IntBinaryOp::Div => IntResult::plain(a.checked_div(b).unwrap_or(0)),
        IntBinaryOp::Mod => IntResult::plain(a.checked_rem(b).unwrap_or(0)),
        IntBinaryOp::Shl => shift_left(a, b, carry_in),
        IntBinaryOp::Shr => shift_right(a, b, carry_in),
        IntBinaryOp::And => IntResult::plain(a & b),
        IntBinaryOp::Or => IntResult::plain(a | b),
        IntBinaryOp::Xor => IntResult::plain(a ^ b),
    }
}

fn add_with_carry(a: u32, b: u32, carry_in: bool) -> IntResult {
    let wide = u64::from(a) + u64::from(b) + u64::from(carry_in);
    #[allow(clippy::cast_possible_truncation)]
    let value = wide as u32;
    IntResult {
        value,
        carry: wide > u64::from(u32::MAX),
        overflow: (a ^ value) & (b ^ value) & 0x8000_0000 != 0,
    }
}

fn shift_left(a: u32, amount: u32, carry_in: bool) -> IntResult {
    match amount {
        0 => IntResult::plain(a),
        1..=31 => IntResult {
            value: (a << amount) | u32::from(carry_in),
            carry: (a >> (32 - amount)) & 1 != 0,
            overflow: false,
        },
        _ => IntResult::plain(0),
    }
}

// The carry enters at bit 31, not bit 0. Amounts of 0 and >= 32 clear C
// rather than keeping the incoming carry.
fn shift_right(a: u32, amount: u32, carry_in: bool) -> IntResult {
    match amount {
        0 => IntResult::plain(a),
        1..=31 => IntResult {
            value: (a >> amount) | (u32::from(carry_in) << 31),
            carry: (a >> (amount - 1)) & 1 != 0,
            overflow: false,
        },
        _ => IntResult::plain(0),
    }
}

const fn i32_bits(value: u32) -> i32 {
    i32::from_ne_bytes(value.to_ne_bytes())
}

/// Evaluates an IEEE-754 single-precision operation.
#[must_use]
pub fn float_binary(op: FloatBinaryOp, a: f32, b: f32) -> f32 {
    match op {
        FloatBinaryOp::Add => a + b,
        FloatBinaryOp::Sub => a - b,
        FloatBinaryOp::Mul => a * b,
        FloatBinaryOp::Div => a / b,
    }
}

/// Numeric float-to-unsigned conversion: saturating, NaN maps to zero.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn float_to_u32(value: f32) -> u32 {
    value as u32
}

/// Numeric unsigned-to-float conversion, rounding to nearest.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn u32_to_float(value: u32) -> f32 {
    value as f32
}

/// Translated view of memory for one instruction.
///
/// Every byte is translated on its own so a word straddling two pages
/// checks both.
pub struct DataPort<'a> {
    ctx: TranslationContext,
    memory: &'a mut dyn PhysicalMemory,
}

impl<'a> DataPort<'a> {
    /// Port translating through `ctx`.
    pub fn new(ctx: TranslationContext, memory: &'a mut dyn PhysicalMemory) -> Self {
        Self { ctx, memory }
    }

    /// Reads one byte, checking the permission `access` requires.
    ///
    /// # Errors
    ///
    /// Returns the [`MmuFault`] raised by translation.
    pub fn read_byte(&mut self, vaddr: u32, access: AccessKind) -> Result<u8, MmuFault> {
        let phys = translate(vaddr, access, &self.ctx, &mut *self.memory)?;
        let mut byte = 0;
        self.memory.read_bytes(phys, std::slice::from_mut(&mut byte));
        Ok(byte)
    }

    /// Physical addresses of the four bytes at `vaddr`.
    ///
    /// # Errors
    ///
    /// Returns the first [`MmuFault`] hit.
    pub fn translate_word(&mut self, vaddr: u32, access: AccessKind) -> Result<[u32; 4], MmuFault> {
        let mut phys = [0; 4];
        for (offset, slot) in (0_u32..).zip(phys.iter_mut()) {
            *slot = translate(vaddr.wrapping_add(offset), access, &self.ctx, &mut *self.memory)?;
        }
        Ok(phys)
    }

    /// Reads a little-endian word.
    ///
    /// # Errors
    ///
    /// Returns the first [`MmuFault`] hit; nothing is read in that case.
    pub fn read_word(&mut self, vaddr: u32) -> Result<u32, MmuFault> {
        let phys = self.translate_word(vaddr, AccessKind::Read)?;
        let mut bytes = [0_u8; 4];
        for (byte, addr) in bytes.iter_mut().zip(phys) {
            self.memory.read_bytes(addr, std::slice::from_mut(byte));
        }
        Ok(u32::from_le_bytes(bytes))
    }
}

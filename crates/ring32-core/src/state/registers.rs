/// Number of integer registers (`x0..x15`).
pub const INT_REGISTER_COUNT: usize = 16;
/// Number of floating-point registers (`f0..f15`).
pub const FLOAT_REGISTER_COUNT: usize = 16;
/// Total number of architectural storage slots held by the register file:
/// the integer and float banks plus `flags`, `mask` and `memmap`, each
/// counted as its own slot.
pub const REGISTER_COUNT: usize = INT_REGISTER_COUNT + FLOAT_REGISTER_COUNT + 3;

const FLAGS_SLOT: usize = INT_REGISTER_COUNT + FLOAT_REGISTER_COUNT;
const MASK_SLOT: usize = FLAGS_SLOT + 1;
const MEMMAP_SLOT: usize = FLAGS_SLOT + 2;

/// Integer register identifier.
///
/// `X13` doubles as the program counter, `X14` as the stack base pointer and
/// `X15` as the stack pointer. Their special meaning lives entirely in the
/// execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum IntRegister {
    X0 = 0,
    X1 = 1,
    X2 = 2,
    X3 = 3,
    X4 = 4,
    X5 = 5,
    X6 = 6,
    X7 = 7,
    X8 = 8,
    X9 = 9,
    X10 = 10,
    X11 = 11,
    X12 = 12,
    X13 = 13,
    X14 = 14,
    X15 = 15,
}

impl IntRegister {
    /// Program counter alias.
    pub const PC: Self = Self::X13;
    /// Stack base pointer alias.
    pub const BP: Self = Self::X14;
    /// Stack pointer alias.
    pub const SP: Self = Self::X15;

    /// Ordered list of all integer registers.
    pub const ALL: [Self; INT_REGISTER_COUNT] = [
        Self::X0,
        Self::X1,
        Self::X2,
        Self::X3,
        Self::X4,
        Self::X5,
        Self::X6,
        Self::X7,
        Self::X8,
        Self::X9,
        Self::X10,
        Self::X11,
        Self::X12,
        Self::X13,
        Self::X14,
        Self::X15,
    ];

    /// Returns the array index for this register (`0..=15`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a 4-bit register field.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Option<Self> {
        if (bits as usize) < INT_REGISTER_COUNT {
            Some(Self::ALL[bits as usize])
        } else {
            None
        }
    }
}

/// Floating-point register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FloatRegister {
    F0 = 0,
    F1 = 1,
    F2 = 2,
    F3 = 3,
    F4 = 4,
    F5 = 5,
    F6 = 6,
    F7 = 7,
    F8 = 8,
    F9 = 9,
    F10 = 10,
    F11 = 11,
    F12 = 12,
    F13 = 13,
    F14 = 14,
    F15 = 15,
}

impl FloatRegister {
    /// Ordered list of all floating-point registers.
    pub const ALL: [Self; FLOAT_REGISTER_COUNT] = [
        Self::F0,
        Self::F1,
        Self::F2,
        Self::F3,
        Self::F4,
        Self::F5,
        Self::F6,
        Self::F7,
        Self::F8,
        Self::F9,
        Self::F10,
        Self::F11,
        Self::F12,
        Self::F13,
        Self::F14,
        Self::F15,
    ];

    /// Returns the array index for this register (`0..=15`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decodes a 4-bit register field.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Option<Self> {
        if (bits as usize) < FLOAT_REGISTER_COUNT {
            Some(Self::ALL[bits as usize])
        } else {
            None
        }
    }
}

/// Identifier for any architectural register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RegisterId {
    /// Integer register `x0..x15`.
    Int(IntRegister),
    /// Floating-point register `f0..f15`, stored as raw IEEE-754 bits.
    Float(FloatRegister),
    /// Packed status word.
    Flags,
    /// Interrupt mask register.
    Mask,
    /// Physical address of the first-level page table.
    Memmap,
}

impl RegisterId {
    /// Returns the storage slot for this register (`0..REGISTER_COUNT`).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Int(reg) => reg.index(),
            Self::Float(reg) => INT_REGISTER_COUNT + reg.index(),
            Self::Flags => FLAGS_SLOT,
            Self::Mask => MASK_SLOT,
            Self::Memmap => MEMMAP_SLOT,
        }
    }

    /// Maps a storage slot back to its register identifier.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0..=15 => match IntRegister::from_u4(index as u8) {
                Some(reg) => Some(Self::Int(reg)),
                None => None,
            },
            16..=31 => match FloatRegister::from_u4((index - INT_REGISTER_COUNT) as u8) {
                Some(reg) => Some(Self::Float(reg)),
                None => None,
            },
            FLAGS_SLOT => Some(Self::Flags),
            MASK_SLOT => Some(Self::Mask),
            MEMMAP_SLOT => Some(Self::Memmap),
            _ => None,
        }
    }

    /// Iterates every register identifier in storage order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..REGISTER_COUNT).filter_map(Self::from_index)
    }
}

impl From<IntRegister> for RegisterId {
    fn from(reg: IntRegister) -> Self {
        Self::Int(reg)
    }
}

impl From<FloatRegister> for RegisterId {
    fn from(reg: FloatRegister) -> Self {
        Self::Float(reg)
    }
}

/// Architectural register file.
///
/// Every slot stores a raw 32-bit pattern. Special-purpose registers are held
/// exactly like general ones; there is no hidden state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    ints: [u32; INT_REGISTER_COUNT],
    floats: [u32; FLOAT_REGISTER_COUNT],
    flags: u32,
    mask: u32,
    memmap: u32,
}

impl RegisterFile {
    /// Reads any register as its raw bit pattern.
    #[must_use]
    pub const fn read(&self, id: RegisterId) -> u32 {
        match id {
            RegisterId::Int(reg) => self.ints[reg.index()],
            RegisterId::Float(reg) => self.floats[reg.index()],
            RegisterId::Flags => self.flags,
            RegisterId::Mask => self.mask,
            RegisterId::Memmap => self.memmap,
        }
    }

    /// Writes any register with a raw bit pattern.
    pub const fn write(&mut self, id: RegisterId, value: u32) {
        match id {
            RegisterId::Int(reg) => self.ints[reg.index()] = value,
            RegisterId::Float(reg) => self.floats[reg.index()] = value,
            RegisterId::Flags => self.flags = value,
            RegisterId::Mask => self.mask = value,
            RegisterId::Memmap => self.memmap = value,
        }
    }

    /// Reads an integer register.
    #[must_use]
    pub const fn x(&self, reg: IntRegister) -> u32 {
        self.ints[reg.index()]
    }

    /// Writes an integer register.
    pub const fn set_x(&mut self, reg: IntRegister, value: u32) {
        self.ints[reg.index()] = value;
    }

    /// Reads a floating-point register as an `f32`.
    #[must_use]
    pub fn f(&self, reg: FloatRegister) -> f32 {
        f32::from_bits(self.f_bits(reg))
    }

    /// Writes a floating-point register from an `f32`.
    pub fn set_f(&mut self, reg: FloatRegister, value: f32) {
        self.set_f_bits(reg, value.to_bits());
    }

    /// Reads the raw bit pattern of a floating-point register.
    #[must_use]
    pub const fn f_bits(&self, reg: FloatRegister) -> u32 {
        self.floats[reg.index()]
    }

    /// Writes the raw bit pattern of a floating-point register.
    pub const fn set_f_bits(&mut self, reg: FloatRegister, bits: u32) {
        self.floats[reg.index()] = bits;
    }

    /// Reads the program counter (`x13`).
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.x(IntRegister::PC)
    }

    /// Writes the program counter (`x13`).
    pub const fn set_pc(&mut self, value: u32) {
        self.set_x(IntRegister::PC, value);
    }

    /// Reads the stack pointer (`x15`).
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.x(IntRegister::SP)
    }

    /// Writes the stack pointer (`x15`).
    pub const fn set_sp(&mut self, value: u32) {
        self.set_x(IntRegister::SP, value);
    }

    /// Reads the stack base pointer (`x14`).
    #[must_use]
    pub const fn bp(&self) -> u32 {
        self.x(IntRegister::BP)
    }

    /// Writes the stack base pointer (`x14`).
    pub const fn set_bp(&mut self, value: u32) {
        self.set_x(IntRegister::BP, value);
    }

    /// Reads the raw `flags` word.
    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    /// Writes the raw `flags` word.
    pub const fn set_flags(&mut self, value: u32) {
        self.flags = value;
    }

    /// Reads the `mask` register.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// Writes the `mask` register.
    pub const fn set_mask(&mut self, value: u32) {
        self.mask = value;
    }

    /// Reads the `memmap` register.
    #[must_use]
    pub const fn memmap(&self) -> u32 {
        self.memmap
    }

    /// Writes the `memmap` register.
    pub const fn set_memmap(&mut self, value: u32) {
        self.memmap = value;
    }

    /// Clears every register to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FloatRegister, IntRegister, RegisterFile, RegisterId, FLOAT_REGISTER_COUNT,
        INT_REGISTER_COUNT, REGISTER_COUNT,
    };
    use proptest::prelude::*;

    #[test]
    fn register_count_and_decode_match_architecture() {
        assert_eq!(INT_REGISTER_COUNT, 16);
        assert_eq!(FLOAT_REGISTER_COUNT, 16);
        assert_eq!(REGISTER_COUNT, 35);
        assert_eq!(RegisterId::all().count(), REGISTER_COUNT);

        for bits in 0_u8..16 {
            let reg = IntRegister::from_u4(bits).expect("valid 4-bit register encoding");
            assert_eq!(reg.index(), usize::from(bits));
            let reg = FloatRegister::from_u4(bits).expect("valid 4-bit register encoding");
            assert_eq!(reg.index(), usize::from(bits));
        }

        assert!(IntRegister::from_u4(16).is_none());
        assert!(FloatRegister::from_u4(16).is_none());
        assert!(RegisterId::from_index(REGISTER_COUNT).is_none());
    }

    #[test]
    fn register_ids_map_to_unique_slots() {
        for (slot, id) in RegisterId::all().enumerate() {
            assert_eq!(id.index(), slot);
            assert_eq!(RegisterId::from_index(slot), Some(id));
        }
    }

    #[test]
    fn special_register_aliases_share_storage_with_general_registers() {
        let mut regs = RegisterFile::default();

        regs.set_pc(0x0001_0000);
        regs.set_bp(0x00FF_0000);
        regs.set_sp(0x00FE_FFF0);

        assert_eq!(regs.x(IntRegister::X13), 0x0001_0000);
        assert_eq!(regs.x(IntRegister::X14), 0x00FF_0000);
        assert_eq!(regs.x(IntRegister::X15), 0x00FE_FFF0);
        assert_eq!(regs.read(RegisterId::Int(IntRegister::X13)), 0x0001_0000);
    }

    #[test]
    fn float_registers_keep_raw_bit_patterns() {
        let mut regs = RegisterFile::default();
        let quiet_nan_with_payload = 0x7FC0_1234;

        regs.set_f_bits(FloatRegister::F3, quiet_nan_with_payload);
        assert_eq!(regs.f_bits(FloatRegister::F3), quiet_nan_with_payload);
        assert!(regs.f(FloatRegister::F3).is_nan());

        regs.set_f(FloatRegister::F4, -1.5);
        assert_eq!(regs.read(RegisterId::Float(FloatRegister::F4)), (-1.5_f32).to_bits());
    }

    #[test]
    fn reset_clears_every_slot() {
        let mut regs = RegisterFile::default();
        for id in RegisterId::all() {
            regs.write(id, u32::MAX);
        }

        regs.reset();

        assert!(RegisterId::all().all(|id| regs.read(id) == 0));
    }

    proptest! {
        #[test]
        fn write_then_read_round_trips_for_every_register(slot in 0..REGISTER_COUNT, value in any::<u32>()) {
            let id = RegisterId::from_index(slot).expect("slot in range");
            let mut regs = RegisterFile::default();
            regs.write(id, value);
            prop_assert_eq!(regs.read(id), value);

            for other in RegisterId::all().filter(|other| *other != id) {
                prop_assert_eq!(regs.read(other), 0);
            }
        }
    }
}

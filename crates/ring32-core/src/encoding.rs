//! Reference byte encoding tables.
//!
//! The first byte of every instruction selects its class through the top two
//! bits (`11` is split again by bits 5..4). Operands follow in little-endian
//! order.

/// Instruction classes selected by the leading bits of the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeClass {
    /// `00xxxxxx`: no operands.
    Implied,
    /// `01ttrrrr`: one register plus a 32-bit word.
    RegisterWord,
    /// `10xxxxxx`: a register-pair byte `aaaabbbb`.
    RegisterPair,
    /// `1100cccc`: condition plus a 32-bit absolute target.
    Branch,
    /// `1101rrrr`: integer register plus a 32-bit absolute address.
    StoreIntAbsolute,
    /// `1110rrrr`: float register plus a 32-bit absolute address.
    StoreFloatAbsolute,
    /// `1111xxxx`: unassigned.
    Reserved,
}

impl OpcodeClass {
    /// Classifies an opcode byte.
    #[must_use]
    pub const fn of(opcode: u8) -> Self {
        match opcode >> 6 {
            0b00 => Self::Implied,
            0b01 => Self::RegisterWord,
            0b10 => Self::RegisterPair,
            _ => match (opcode >> 4) & 0b11 {
                0b00 => Self::Branch,
                0b01 => Self::StoreIntAbsolute,
                0b10 => Self::StoreFloatAbsolute,
                _ => Self::Reserved,
            },
        }
    }

    /// Number of operand bytes following the opcode byte.
    #[must_use]
    pub const fn operand_bytes(self) -> Option<usize> {
        match self {
            Self::Implied => Some(0),
            Self::RegisterPair => Some(1),
            Self::RegisterWord
            | Self::Branch
            | Self::StoreIntAbsolute
            | Self::StoreFloatAbsolute => Some(4),
            Self::Reserved => None,
        }
    }
}

/// Assigned `00xxxxxx` opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ImpliedEncoding {
    ClearCarry,
    SetCarry,
    Nop,
    Halt,
    MemoryMapOff,
    MemoryMapOn,
    EnterSystemRing,
    EnterUserRing,
    Return,
}

/// Implied-operand table; the index is the low six opcode bits.
pub const IMPLIED_ENCODING_TABLE: &[ImpliedEncoding] = &[
    ImpliedEncoding::ClearCarry,
    ImpliedEncoding::SetCarry,
    ImpliedEncoding::Nop,
    ImpliedEncoding::Halt,
    ImpliedEncoding::MemoryMapOff,
    ImpliedEncoding::MemoryMapOn,
    ImpliedEncoding::EnterSystemRing,
    ImpliedEncoding::EnterUserRing,
    ImpliedEncoding::Return,
];

/// `tt` field of `01ttrrrr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RegisterWordEncoding {
    LoadIntImmediate,
    LoadFloatImmediate,
    LoadIntAbsolute,
    LoadFloatAbsolute,
}

impl RegisterWordEncoding {
    /// Decodes bits 5..4 of the opcode byte.
    #[must_use]
    pub const fn from_opcode(opcode: u8) -> Self {
        match (opcode >> 4) & 0b11 {
            0b00 => Self::LoadIntImmediate,
            0b01 => Self::LoadFloatImmediate,
            0b10 => Self::LoadIntAbsolute,
            _ => Self::LoadFloatAbsolute,
        }
    }
}

/// Assigned `10xxxxxx` opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PairEncoding {
    IntAdd,
    IntSub,
    IntMul,
    IntDiv,
    IntMod,
    FloatAdd,
    FloatSub,
    FloatMul,
    FloatDiv,
    ShiftLeft,
    ShiftRight,
    And,
    Or,
    Xor,
    MoveInt,
    MoveFloat,
    IntFromFloat,
    FloatFromInt,
    TransmuteIntFromFloat,
    TransmuteFloatFromInt,
    LoadIntIndirect,
    LoadFloatIndirect,
    StoreIntIndirect,
    StoreFloatIndirect,
    WriteMask,
    WriteMemmap,
    ReadMask,
    ReadMemmap,
    Push,
    Pop,
    JumpRegister,
    CallRegister,
}

/// Register-pair table; the index is the low six opcode bits.
///
/// Any index past the end is illegal by definition.
pub const PAIR_ENCODING_TABLE: &[PairEncoding] = &[
    PairEncoding::IntAdd,
    PairEncoding::IntSub,
    PairEncoding::IntMul,
    PairEncoding::IntDiv,
    PairEncoding::IntMod,
    PairEncoding::FloatAdd,
    PairEncoding::FloatSub,
    PairEncoding::FloatMul,
    PairEncoding::FloatDiv,
    PairEncoding::ShiftLeft,
    PairEncoding::ShiftRight,
    PairEncoding::And,
    PairEncoding::Or,
    PairEncoding::Xor,
    PairEncoding::MoveInt,
    PairEncoding::MoveFloat,
    PairEncoding::IntFromFloat,
    PairEncoding::FloatFromInt,
    PairEncoding::TransmuteIntFromFloat,
    PairEncoding::TransmuteFloatFromInt,
    PairEncoding::LoadIntIndirect,
    PairEncoding::LoadFloatIndirect,
    PairEncoding::StoreIntIndirect,
    PairEncoding::StoreFloatIndirect,
    PairEncoding::WriteMask,
    PairEncoding::WriteMemmap,
    PairEncoding::ReadMask,
    PairEncoding::ReadMemmap,
    PairEncoding::Push,
    PairEncoding::Pop,
    PairEncoding::JumpRegister,
    PairEncoding::CallRegister,
];

/// Condition nibble of `1100cccc` that means "call" instead of a branch.
pub const CALL_ABSOLUTE_CONDITION: u8 = 0x9;

/// Returns the implied-operand encoding for an opcode byte, if assigned.
#[must_use]
pub fn classify_implied(opcode: u8) -> Option<ImpliedEncoding> {
    if OpcodeClass::of(opcode) != OpcodeClass::Implied {
        return None;
    }
    IMPLIED_ENCODING_TABLE
        .get(usize::from(opcode & 0x3F))
        .copied()
}

/// Returns the register-pair encoding for an opcode byte, if assigned.
#[must_use]
pub fn classify_pair(opcode: u8) -> Option<PairEncoding> {
    if OpcodeClass::of(opcode) != OpcodeClass::RegisterPair {
        return None;
    }
    PAIR_ENCODING_TABLE.get(usize::from(opcode & 0x3F)).copied()
}

/// Returns `true` when `opcode` is assigned in the reference encoding.
#[must_use]
pub fn is_assigned_opcode(opcode: u8) -> bool {
    match OpcodeClass::of(opcode) {
        OpcodeClass::Implied => classify_implied(opcode).is_some(),
        OpcodeClass::RegisterPair => classify_pair(opcode).is_some(),
        OpcodeClass::Branch => (opcode & 0x0F) <= CALL_ABSOLUTE_CONDITION,
        OpcodeClass::RegisterWord
        | OpcodeClass::StoreIntAbsolute
        | OpcodeClass::StoreFloatAbsolute => true,
        OpcodeClass::Reserved => false,
    }
}

/// Splits a register-pair byte `aaaabbbb` into `(a, b)`.
#[must_use]
pub const fn split_register_pair(byte: u8) -> (u8, u8) {
    (byte >> 4, byte & 0x0F)
}

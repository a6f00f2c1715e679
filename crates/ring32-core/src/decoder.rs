//! Instruction decoding seam and the reference decoder.
//!
//! The execution engine only talks to [`InstructionDecoder`]. The reference
//! decoder implements the byte encoding described in [`crate::encoding`];
//! hosts with a different opcode table supply their own implementation.

use thiserror::Error;

use crate::encoding::{
    classify_implied, classify_pair, split_register_pair, ImpliedEncoding, OpcodeClass,
    PairEncoding, RegisterWordEncoding, CALL_ABSOLUTE_CONDITION,
};
use crate::memory::Ring;
use crate::operation::{Condition, FloatBinaryOp, IntBinaryOp, Operation};
use crate::state::{FloatRegister, IntRegister};

/// Decoder rejection reasons. Reported to the host as an invalid opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DecodeError {
    /// The opcode byte is not assigned.
    #[error("unknown opcode {opcode:#04x}")]
    UnknownOpcode {
        /// Offending opcode byte.
        opcode: u8,
    },
    /// Fewer bytes than the opcode requires were supplied.
    #[error("instruction needs {expected} bytes, got {actual}")]
    Truncated {
        /// Length the opcode requires.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
    /// The decoder reported a length the fetch stage cannot honour.
    #[error("opcode {opcode:#04x} reports unsupported length {len}")]
    LengthOutOfRange {
        /// Opcode byte.
        opcode: u8,
        /// Reported length.
        len: usize,
    },
}

/// Maps raw instruction bytes to an [`Operation`].
pub trait InstructionDecoder {
    /// Total instruction length, opcode byte included, for `opcode`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownOpcode`] when the length is undefined.
    fn instruction_len(&self, opcode: u8) -> Result<usize, DecodeError>;

    /// Decodes a complete instruction starting with its opcode byte.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the bytes do not form an operation.
    fn decode(&self, raw: &[u8]) -> Result<Operation, DecodeError>;
}

impl<T: InstructionDecoder + ?Sized> InstructionDecoder for &T {
    fn instruction_len(&self, opcode: u8) -> Result<usize, DecodeError> {
        (**self).instruction_len(opcode)
    }

    fn decode(&self, raw: &[u8]) -> Result<Operation, DecodeError> {
        (**self).decode(raw)
    }
}

/// Decoder for the reference byte encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReferenceDecoder;

/// Longest instruction in the reference encoding.
pub const MAX_INSTRUCTION_BYTES: usize = 5;

impl InstructionDecoder for ReferenceDecoder {
    fn instruction_len(&self, opcode: u8) -> Result<usize, DecodeError> {
        OpcodeClass::of(opcode)
            .operand_bytes()
            .map(|operands| operands + 1)
            .ok_or(DecodeError::UnknownOpcode { opcode })
    }

    fn decode(&self, raw: &[u8]) -> Result<Operation, DecodeError> {
        let Some(&opcode) = raw.first() else {
            return Err(DecodeError::Truncated {
                expected: 1,
                actual: 0,
            });
        };
        let expected = self.instruction_len(opcode)?;
        if raw.len() < expected {
            return Err(DecodeError::Truncated {
                expected,
                actual: raw.len(),
            });
        }
        let unknown = DecodeError::UnknownOpcode { opcode };

        match OpcodeClass::of(opcode) {
            OpcodeClass::Implied => classify_implied(opcode)
                .map(decode_implied)
                .ok_or(unknown),
            OpcodeClass::RegisterWord => {
                let reg = opcode & 0x0F;
                let word = operand_word(raw);
                Ok(match RegisterWordEncoding::from_opcode(opcode) {
                    RegisterWordEncoding::LoadIntImmediate => Operation::LoadIntImmediate {
                        dst: int(reg),
                        value: word,
                    },
                    RegisterWordEncoding::LoadFloatImmediate => Operation::LoadFloatImmediate {
                        dst: float(reg),
                        bits: word,
                    },
                    RegisterWordEncoding::LoadIntAbsolute => Operation::LoadIntAbsolute {
                        dst: int(reg),
                        addr: word,
                    },
                    RegisterWordEncoding::LoadFloatAbsolute => Operation::LoadFloatAbsolute {
                        dst: float(reg),
                        addr: word,
                    },
                })
            }
            OpcodeClass::RegisterPair => {
                let encoding = classify_pair(opcode).ok_or(unknown)?;
                let (a, b) = split_register_pair(raw[1]);
                Ok(decode_pair(encoding, a, b))
            }
            OpcodeClass::Branch => {
                let target = operand_word(raw);
                let code = opcode & 0x0F;
                if code == CALL_ABSOLUTE_CONDITION {
                    return Ok(Operation::Call { target });
                }
                condition_from_u4(code)
                    .map(|condition| Operation::Branch { condition, target })
                    .ok_or(unknown)
            }
            OpcodeClass::StoreIntAbsolute => Ok(Operation::StoreIntAbsolute {
                addr: operand_word(raw),
                src: int(opcode & 0x0F),
            }),
            OpcodeClass::StoreFloatAbsolute => Ok(Operation::StoreFloatAbsolute {
                addr: operand_word(raw),
                src: float(opcode & 0x0F),
            }),
            OpcodeClass::Reserved => Err(unknown),
        }
    }
}

impl ReferenceDecoder {
    /// Encodes `op` in the reference byte encoding.
    #[must_use]
    pub fn encode(op: &Operation) -> Vec<u8> {
        let implied = |index: u8| vec![index];
        let word = |opcode: u8, value: u32| {
            let mut bytes = vec![opcode];
            bytes.extend_from_slice(&value.to_le_bytes());
            bytes
        };
        let pair = |encoding: PairEncoding, a: usize, b: usize| {
            let index = pair_index(encoding);
            #[allow(clippy::cast_possible_truncation)]
            let regs = ((a as u8) << 4) | (b as u8 & 0x0F);
            vec![0x80 | index, regs]
        };
        #[allow(clippy::cast_possible_truncation)]
        let r = |index: usize| index as u8;

        match *op {
            Operation::ClearCarry => implied(0x00),
            Operation::SetCarry => implied(0x01),
            Operation::Nop => implied(0x02),
            Operation::Halt => implied(0x03),
            Operation::SetMemoryMap { enabled } => implied(if enabled { 0x05 } else { 0x04 }),
            Operation::SetRing(Ring::System) => implied(0x06),
            Operation::SetRing(Ring::User) => implied(0x07),
            Operation::Return => implied(0x08),
            Operation::LoadIntImmediate { dst, value } => word(0x40 | r(dst.index()), value),
            Operation::LoadFloatImmediate { dst, bits } => word(0x50 | r(dst.index()), bits),
            Operation::LoadIntAbsolute { dst, addr } => word(0x60 | r(dst.index()), addr),
            Operation::LoadFloatAbsolute { dst, addr } => word(0x70 | r(dst.index()), addr),
            Operation::IntBinary { op, dst, src } => {
                let encoding = match op {
                    IntBinaryOp::Add => PairEncoding::IntAdd,
                    IntBinaryOp::Sub => PairEncoding::IntSub,
                    IntBinaryOp::Mul => PairEncoding::IntMul,
                    IntBinaryOp::Div => PairEncoding::IntDiv,
                    IntBinaryOp::Mod => PairEncoding::IntMod,
                    IntBinaryOp::Shl => PairEncoding::ShiftLeft,
                    IntBinaryOp::Shr => PairEncoding::ShiftRight,
                    IntBinaryOp::And => PairEncoding::And,
                    IntBinaryOp::Or => PairEncoding::Or,
                    IntBinaryOp::Xor => PairEncoding::Xor,
                };
                pair(encoding, dst.index(), src.index())
            }
            Operation::FloatBinary { op, dst, src } => {
                let encoding = match op {
                    FloatBinaryOp::Add => PairEncoding::FloatAdd,
                    FloatBinaryOp::Sub => PairEncoding::FloatSub,
                    FloatBinaryOp::Mul => PairEncoding::FloatMul,
                    FloatBinaryOp::Div => PairEncoding::FloatDiv,
                };
                pair(encoding, dst.index(), src.index())
            }
            Operation::MoveInt { dst, src } => pair(PairEncoding::MoveInt, dst.index(), src.index()),
            Operation::MoveFloat { dst, src } => {
                pair(PairEncoding::MoveFloat, dst.index(), src.index())
            }
            Operation::IntFromFloat { dst, src } => {
                pair(PairEncoding::IntFromFloat, dst.index(), src.index())
            }
            Operation::FloatFromInt { dst, src } => {
                pair(PairEncoding::FloatFromInt, dst.index(), src.index())
            }
            Operation::TransmuteIntFromFloat { dst, src } => {
                pair(PairEncoding::TransmuteIntFromFloat, dst.index(), src.index())
            }
            Operation::TransmuteFloatFromInt { dst, src } => {
                pair(PairEncoding::TransmuteFloatFromInt, dst.index(), src.index())
            }
            Operation::LoadIntIndirect { dst, addr } => {
                pair(PairEncoding::LoadIntIndirect, dst.index(), addr.index())
            }
            Operation::LoadFloatIndirect { dst, addr } => {
                pair(PairEncoding::LoadFloatIndirect, dst.index(), addr.index())
            }
            Operation::StoreIntIndirect { addr, src } => {
                pair(PairEncoding::StoreIntIndirect, addr.index(), src.index())
            }
            Operation::StoreFloatIndirect { addr, src } => {
                pair(PairEncoding::StoreFloatIndirect, addr.index(), src.index())
            }
            Operation::WriteMask { src } => pair(PairEncoding::WriteMask, src.index(), 0),
            Operation::WriteMemmap { src } => pair(PairEncoding::WriteMemmap, src.index(), 0),
            Operation::ReadMask { dst } => pair(PairEncoding::ReadMask, dst.index(), 0),
            Operation::ReadMemmap { dst } => pair(PairEncoding::ReadMemmap, dst.index(), 0),
            Operation::Push { src } => pair(PairEncoding::Push, src.index(), 0),
            Operation::Pop { dst } => pair(PairEncoding::Pop, dst.index(), 0),
            Operation::JumpRegister { target } => {
                pair(PairEncoding::JumpRegister, target.index(), 0)
            }
            Operation::CallRegister { target } => {
                pair(PairEncoding::CallRegister, target.index(), 0)
            }
            Operation::Branch { condition, target } => {
                word(0xC0 | condition_to_u4(condition), target)
            }
            Operation::Call { target } => word(0xC0 | CALL_ABSOLUTE_CONDITION, target),
            Operation::StoreIntAbsolute { addr, src } => word(0xD0 | r(src.index()), addr),
            Operation::StoreFloatAbsolute { addr, src } => word(0xE0 | r(src.index()), addr),
        }
    }
}

fn pair_index(encoding: PairEncoding) -> u8 {
    crate::encoding::PAIR_ENCODING_TABLE
        .iter()
        .position(|entry| *entry == encoding)
        .and_then(|index| u8::try_from(index).ok())
        .unwrap_or(0)
}

fn operand_word(raw: &[u8]) -> u32 {
    u32::from_le_bytes([raw[1], raw[2], raw[3], raw[4]])
}

const fn int(bits: u8) -> IntRegister {
    IntRegister::ALL[(bits & 0x0F) as usize]
}

const fn float(bits: u8) -> FloatRegister {
    FloatRegister::ALL[(bits & 0x0F) as usize]
}

const fn condition_from_u4(code: u8) -> Option<Condition> {
    match code {
        0x0 => Some(Condition::Always),
        0x1 => Some(Condition::Zero),
        0x2 => Some(Condition::NotZero),
        0x3 => Some(Condition::Carry),
        0x4 => Some(Condition::NotCarry),
        0x5 => Some(Condition::Negative),
        0x6 => Some(Condition::NotNegative),
        0x7 => Some(Condition::Overflow),
        0x8 => Some(Condition::NotOverflow),
        _ => None,
    }
}

const fn condition_to_u4(condition: Condition) -> u8 {
    match condition {
        Condition::Always => 0x0,
        Condition::Zero => 0x1,
        Condition::NotZero => 0x2,
        Condition::Carry => 0x3,
        Condition::NotCarry => 0x4,
        Condition::Negative => 0x5,
        Condition::NotNegative => 0x6,
        Condition::Overflow => 0x7,
        Condition::NotOverflow => 0x8,
    }
}

const fn decode_implied(encoding: ImpliedEncoding) -> Operation {
    match encoding {
        ImpliedEncoding::ClearCarry => Operation::ClearCarry,
        ImpliedEncoding::SetCarry => Operation::SetCarry,
        ImpliedEncoding::Nop => Operation::Nop,
        ImpliedEncoding::Halt => Operation::Halt,
        ImpliedEncoding::MemoryMapOff => Operation::SetMemoryMap { enabled: false },
        ImpliedEncoding::MemoryMapOn => Operation::SetMemoryMap { enabled: true },
        ImpliedEncoding::EnterSystemRing => Operation::SetRing(Ring::System),
        ImpliedEncoding::EnterUserRing => Operation::SetRing(Ring::User),
        ImpliedEncoding::Return => Operation::Return,
    }
}

fn decode_pair(encoding: PairEncoding, a: u8, b: u8) -> Operation {
    let int_binary = |op| Operation::IntBinary {
        op,
        dst: int(a),
        src: int(b),
    };
    let float_binary = |op| Operation::FloatBinary {
        op,
        dst: float(a),
        src: float(b),
    };
    match encoding {
        PairEncoding::IntAdd => int_binary(IntBinaryOp::Add),
        PairEncoding::IntSub => int_binary(IntBinaryOp::Sub),
        PairEncoding::IntMul => int_binary(IntBinaryOp::Mul),
        PairEncoding::IntDiv => int_binary(IntBinaryOp::Div),
        PairEncoding::IntMod => int_binary(IntBinaryOp::Mod),
        PairEncoding::FloatAdd => float_binary(FloatBinaryOp::Add),
        PairEncoding::FloatSub => float_binary(FloatBinaryOp::Sub),
        PairEncoding::FloatMul => float_binary(FloatBinaryOp::Mul),
        PairEncoding::FloatDiv => float_binary(FloatBinaryOp::Div),
        PairEncoding::ShiftLeft => int_binary(IntBinaryOp::Shl),
        PairEncoding::ShiftRight => int_binary(IntBinaryOp::Shr),
        PairEncoding::And => int_binary(IntBinaryOp::And),
        PairEncoding::Or => int_binary(IntBinaryOp::Or),
        PairEncoding::Xor => int_binary(IntBinaryOp::Xor),
        PairEncoding::MoveInt => Operation::MoveInt {
            dst: int(a),
            src: int(b),
        },
        PairEncoding::MoveFloat => Operation::MoveFloat {
            dst: float(a),
            src: float(b),
        },
        PairEncoding::IntFromFloat => Operation::IntFromFloat {
            dst: int(a),
            src: float(b),
        },
        PairEncoding::FloatFromInt => Operation::FloatFromInt {
            dst: float(a),
            src: int(b),
        },
        PairEncoding::TransmuteIntFromFloat => Operation::TransmuteIntFromFloat {
            dst: int(a),
            src: float(b),
        },
        PairEncoding::TransmuteFloatFromInt => Operation::TransmuteFloatFromInt {
            dst: float(a),
            src: int(b),
        },
        PairEncoding::LoadIntIndirect => Operation::LoadIntIndirect {
            dst: int(a),
            addr: int(b),
        },
        PairEncoding::LoadFloatIndirect => Operation::LoadFloatIndirect {
            dst: float(a),
            addr: int(b),
        },
        PairEncoding::StoreIntIndirect => Operation::StoreIntIndirect {
            addr: int(a),
            src: int(b),
        },
        PairEncoding::StoreFloatIndirect => Operation::StoreFloatIndirect {
            addr: int(a),
            src: float(b),
        },
        PairEncoding::WriteMask => Operation::WriteMask { src: int(a) },
        PairEncoding::WriteMemmap => Operation::WriteMemmap { src: int(a) },
        PairEncoding::ReadMask => Operation::ReadMask { dst: int(a) },
        PairEncoding::ReadMemmap => Operation::ReadMemmap { dst: int(a) },
        PairEncoding::Push => Operation::Push { src: int(a) },
        PairEncoding::Pop => Operation::Pop { dst: int(a) },
        PairEncoding::JumpRegister => Operation::JumpRegister { target: int(a) },
        PairEncoding::CallRegister => Operation::CallRegister { target: int(a) },
    }
}

#[cfg(test)]
mod tests {
    use super::{DecodeError, InstructionDecoder, ReferenceDecoder, MAX_INSTRUCTION_BYTES};
    use crate::encoding::is_assigned_opcode;
    use crate::memory::Ring;
    use crate::operation::{Condition, FloatBinaryOp, IntBinaryOp, Operation};
    use crate::state::{FloatRegister, IntRegister};
    use rstest::rstest;

    #[rstest]
    #[case(&[0x00], Operation::ClearCarry)]
    #[case(&[0x03], Operation::Halt)]
    #[case(&[0x05], Operation::SetMemoryMap { enabled: true })]
    #[case(&[0x07], Operation::SetRing(Ring::User))]
    #[case(&[0x08], Operation::Return)]
    #[case(&[0x43, 0x78, 0x56, 0x34, 0x12], Operation::LoadIntImmediate { dst: IntRegister::X3, value: 0x1234_5678 })]
    #[case(&[0x5F, 0x00, 0x00, 0x80, 0x3F], Operation::LoadFloatImmediate { dst: FloatRegister::F15, bits: 0x3F80_0000 })]
    #[case(&[0x80, 0x12], Operation::IntBinary { op: IntBinaryOp::Add, dst: IntRegister::X1, src: IntRegister::X2 })]
    #[case(&[0x88, 0x45], Operation::FloatBinary { op: FloatBinaryOp::Div, dst: FloatRegister::F4, src: FloatRegister::F5 })]
    #[case(&[0x96, 0xF1], Operation::StoreIntIndirect { addr: IntRegister::X15, src: IntRegister::X1 })]
    #[case(&[0x9C, 0x70], Operation::Push { src: IntRegister::X7 })]
    #[case(&[0xC2, 0x00, 0x10, 0x00, 0x00], Operation::Branch { condition: Condition::NotZero, target: 0x1000 })]
    #[case(&[0xC9, 0x00, 0x20, 0x00, 0x00], Operation::Call { target: 0x2000 })]
    #[case(&[0xD4, 0xEF, 0xBE, 0xAD, 0xDE], Operation::StoreIntAbsolute { addr: 0xDEAD_BEEF, src: IntRegister::X4 })]
    #[case(&[0xE2, 0x04, 0x00, 0x00, 0x00], Operation::StoreFloatAbsolute { addr: 4, src: FloatRegister::F2 })]
    fn decodes_reference_encodings(#[case] raw: &[u8], #[case] expected: Operation) {
        assert_eq!(ReferenceDecoder.decode(raw), Ok(expected));
        assert_eq!(ReferenceDecoder::encode(&expected), raw);
    }

    #[rstest]
    #[case(0x09)]
    #[case(0x3F)]
    #[case(0xA0)]
    #[case(0xBF)]
    #[case(0xCA)]
    #[case(0xCF)]
    #[case(0xF0)]
    #[case(0xFF)]
    fn unassigned_opcodes_are_rejected(#[case] opcode: u8) {
        let raw = [opcode, 0, 0, 0, 0];
        assert_eq!(
            ReferenceDecoder.decode(&raw),
            Err(DecodeError::UnknownOpcode { opcode })
        );
    }

    #[test]
    fn short_input_is_truncated() {
        assert_eq!(
            ReferenceDecoder.decode(&[0x40, 0x01]),
            Err(DecodeError::Truncated {
                expected: 5,
                actual: 2
            })
        );
        assert_eq!(
            ReferenceDecoder.decode(&[]),
            Err(DecodeError::Truncated {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn every_opcode_byte_agrees_with_assignment_table() {
        for opcode in 0_u8..=0xFF {
            let mut raw = [0_u8; MAX_INSTRUCTION_BYTES];
            raw[0] = opcode;
            let decoded = ReferenceDecoder.decode(&raw);
            assert_eq!(
                decoded.is_ok(),
                is_assigned_opcode(opcode),
                "opcode {opcode:#04x}"
            );
            if let Ok(len) = ReferenceDecoder.instruction_len(opcode) {
                assert!(len <= MAX_INSTRUCTION_BYTES);
            }
        }
    }

    #[test]
    fn every_decoded_operation_reencodes_to_its_bytes() {
        for opcode in 0_u8..=0xFF {
            let Ok(len) = ReferenceDecoder.instruction_len(opcode) else {
                continue;
            };
            let mut raw = vec![opcode, 0x3C, 0x00, 0x01, 0x02];
            raw.truncate(len);
            if let Ok(op) = ReferenceDecoder.decode(&raw) {
                let canonical = ReferenceDecoder::encode(&op);
                assert_eq!(ReferenceDecoder.decode(&canonical), Ok(op));
            }
        }
    }
}

//! Decoded operation model shared by every decoder and the execution engine.

use std::fmt;

use crate::memory::Ring;
use crate::state::{FlagSet, FloatRegister, IntRegister};

/// Which flag group an operation's result updates at retire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResultCategory {
    /// Writes `Z,V,C,N,P`.
    Integer,
    /// Writes `A,F`.
    Float,
    /// Leaves the arithmetic flags alone.
    NoFlags,
}

/// Two-operand integer ALU operation (`dst = dst op src`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum IntBinaryOp {
    /// `dst + src + C`.
    Add,
    /// `dst + !src + C`.
    Sub,
    /// Wrapping product.
    Mul,
    /// Unsigned quotient, zero on division by zero.
    Div,
    /// Unsigned remainder, zero on division by zero.
    Mod,
    /// Shift left through carry.
    Shl,
    /// Shift right through carry.
    Shr,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
}

impl IntBinaryOp {
    const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "iadd",
            Self::Sub => "isub",
            Self::Mul => "imul",
            Self::Div => "idiv",
            Self::Mod => "imod",
            Self::Shl => "bsl",
            Self::Shr => "bsr",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
        }
    }
}

/// Two-operand IEEE-754 single-precision operation (`dst = dst op src`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum FloatBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl FloatBinaryOp {
    const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "fadd",
            Self::Sub => "fsub",
            Self::Mul => "fmul",
            Self::Div => "fdiv",
        }
    }
}

/// Branch condition evaluated against the current flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum Condition {
    Always,
    Zero,
    NotZero,
    Carry,
    NotCarry,
    Negative,
    NotNegative,
    Overflow,
    NotOverflow,
}

impl Condition {
    /// Returns `true` when the branch is taken under `flags`.
    #[must_use]
    pub const fn holds(self, flags: &FlagSet) -> bool {
        match self {
            Self::Always => true,
            Self::Zero => flags.zero,
            Self::NotZero => !flags.zero,
            Self::Carry => flags.carry,
            Self::NotCarry => !flags.carry,
            Self::Negative => flags.negative,
            Self::NotNegative => !flags.negative,
            Self::Overflow => flags.overflow,
            Self::NotOverflow => !flags.overflow,
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::Always => "jmp",
            Self::Zero => "bz",
            Self::NotZero => "bnz",
            Self::Carry => "bc",
            Self::NotCarry => "bnc",
            Self::Negative => "bn",
            Self::NotNegative => "bnn",
            Self::Overflow => "bv",
            Self::NotOverflow => "bnv",
        }
    }
}

/// One decoded instruction.
///
/// Absolute addresses and immediates are already assembled from their
/// little-endian operand bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Operation {
    /// Clears `C`.
    ClearCarry,
    /// Sets `C`.
    SetCarry,
    /// No effect.
    Nop,
    /// Stops fetching until an interrupt source fires.
    Halt,
    /// Writes the `M` flag.
    SetMemoryMap {
        /// New value of `M`.
        enabled: bool,
    },
    /// Writes the `R` flag.
    SetRing(Ring),
    /// Pops the return address into PC.
    Return,
    /// `dst = value`.
    LoadIntImmediate {
        /// Destination.
        dst: IntRegister,
        /// Literal.
        value: u32,
    },
    /// `dst = f32::from_bits(bits)`.
    LoadFloatImmediate {
        /// Destination.
        dst: FloatRegister,
        /// Literal bit pattern.
        bits: u32,
    },
    /// `dst = mem[addr]`.
    LoadIntAbsolute {
        /// Destination.
        dst: IntRegister,
        /// Virtual address.
        addr: u32,
    },
    /// `dst = mem[addr]` as float bits.
    LoadFloatAbsolute {
        /// Destination.
        dst: FloatRegister,
        /// Virtual address.
        addr: u32,
    },
    /// Integer ALU operation.
    IntBinary {
        /// Operation.
        op: IntBinaryOp,
        /// Left operand and destination.
        dst: IntRegister,
        /// Right operand.
        src: IntRegister,
    },
    /// Float arithmetic.
    FloatBinary {
        /// Operation.
        op: FloatBinaryOp,
        /// Left operand and destination.
        dst: FloatRegister,
        /// Right operand.
        src: FloatRegister,
    },
    /// `dst = src`.
    MoveInt {
        /// Destination.
        dst: IntRegister,
        /// Source.
        src: IntRegister,
    },
    /// `dst = src`.
    MoveFloat {
        /// Destination.
        dst: FloatRegister,
        /// Source.
        src: FloatRegister,
    },
    /// Numeric float-to-unsigned conversion (saturating, NaN becomes 0).
    IntFromFloat {
        /// Destination.
        dst: IntRegister,
        /// Source.
        src: FloatRegister,
    },
    /// Numeric unsigned-to-float conversion.
    FloatFromInt {
        /// Destination.
        dst: FloatRegister,
        /// Source.
        src: IntRegister,
    },
    /// Bit copy from a float register.
    TransmuteIntFromFloat {
        /// Destination.
        dst: IntRegister,
        /// Source.
        src: FloatRegister,
    },
    /// Bit copy from an integer register.
    TransmuteFloatFromInt {
        /// Destination.
        dst: FloatRegister,
        /// Source.
        src: IntRegister,
    },
    /// `dst = mem[addr_reg]`.
    LoadIntIndirect {
        /// Destination.
        dst: IntRegister,
        /// Register holding the virtual address.
        addr: IntRegister,
    },
    /// `dst = mem[addr_reg]` as float bits.
    LoadFloatIndirect {
        /// Destination.
        dst: FloatRegister,
        /// Register holding the virtual address.
        addr: IntRegister,
    },
    /// `mem[addr_reg] = src`.
    StoreIntIndirect {
        /// Register holding the virtual address.
        addr: IntRegister,
        /// Value to store.
        src: IntRegister,
    },
    /// `mem[addr_reg] = src` bits.
    StoreFloatIndirect {
        /// Register holding the virtual address.
        addr: IntRegister,
        /// Value to store.
        src: FloatRegister,
    },
    /// `mem[addr] = src`.
    StoreIntAbsolute {
        /// Virtual address.
        addr: u32,
        /// Value to store.
        src: IntRegister,
    },
    /// `mem[addr] = src` bits.
    StoreFloatAbsolute {
        /// Virtual address.
        addr: u32,
        /// Value to store.
        src: FloatRegister,
    },
    /// `mask = src`.
    WriteMask {
        /// Source.
        src: IntRegister,
    },
    /// `memmap = src`.
    WriteMemmap {
        /// Source.
        src: IntRegister,
    },
    /// `dst = mask`.
    ReadMask {
        /// Destination.
        dst: IntRegister,
    },
    /// `dst = memmap`.
    ReadMemmap {
        /// Destination.
        dst: IntRegister,
    },
    /// `SP -= 4; mem[SP] = src`.
    Push {
        /// Value to push.
        src: IntRegister,
    },
    /// `dst = mem[SP]; SP += 4`.
    Pop {
        /// Destination.
        dst: IntRegister,
    },
    /// `PC = target_reg`.
    JumpRegister {
        /// Register holding the target.
        target: IntRegister,
    },
    /// Pushes the fall-through address, then `PC = target_reg`.
    CallRegister {
        /// Register holding the target.
        target: IntRegister,
    },
    /// `PC = target` when `condition` holds.
    Branch {
        /// Condition on the current flags.
        condition: Condition,
        /// Absolute virtual target.
        target: u32,
    },
    /// Pushes the fall-through address, then `PC = target`.
    Call {
        /// Absolute virtual target.
        target: u32,
    },
}

impl Operation {
    /// Returns `true` for operations only the system ring may execute.
    #[must_use]
    pub const fn requires_system_ring(&self) -> bool {
        matches!(
            self,
            Self::Halt
                | Self::SetMemoryMap { .. }
                | Self::SetRing(_)
                | Self::WriteMask { .. }
                | Self::WriteMemmap { .. }
        )
    }

    /// Flag group written when this operation retires.
    #[must_use]
    pub const fn result_category(&self) -> ResultCategory {
        match self {
            Self::LoadIntImmediate { .. }
            | Self::LoadIntAbsolute { .. }
            | Self::IntBinary { .. }
            | Self::MoveInt { .. }
            | Self::IntFromFloat { .. }
            | Self::TransmuteIntFromFloat { .. }
            | Self::LoadIntIndirect { .. } => ResultCategory::Integer,
            Self::LoadFloatImmediate { .. }
            | Self::LoadFloatAbsolute { .. }
            | Self::FloatBinary { .. }
            | Self::MoveFloat { .. }
            | Self::FloatFromInt { .. }
            | Self::TransmuteFloatFromInt { .. }
            | Self::LoadFloatIndirect { .. } => ResultCategory::Float,
            Self::ClearCarry
            | Self::SetCarry
            | Self::Nop
            | Self::Halt
            | Self::SetMemoryMap { .. }
            | Self::SetRing(_)
            | Self::Return
            | Self::StoreIntIndirect { .. }
            | Self::StoreFloatIndirect { .. }
            | Self::StoreIntAbsolute { .. }
            | Self::StoreFloatAbsolute { .. }
            | Self::WriteMask { .. }
            | Self::WriteMemmap { .. }
            | Self::ReadMask { .. }
            | Self::ReadMemmap { .. }
            | Self::Push { .. }
            | Self::Pop { .. }
            | Self::JumpRegister { .. }
            | Self::CallRegister { .. }
            | Self::Branch { .. }
            | Self::Call { .. } => ResultCategory::NoFlags,
        }
    }
}

struct X(IntRegister);

impl fmt::Display for X {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0.index())
    }
}

struct Fr(FloatRegister);

impl fmt::Display for Fr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0.index())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ClearCarry => f.write_str("clc"),
            Self::SetCarry => f.write_str("sec"),
            Self::Nop => f.write_str("nop"),
            Self::Halt => f.write_str("halt"),
            Self::SetMemoryMap { enabled: true } => f.write_str("mmu.on"),
            Self::SetMemoryMap { enabled: false } => f.write_str("mmu.off"),
            Self::SetRing(Ring::System) => f.write_str("ring.sys"),
            Self::SetRing(Ring::User) => f.write_str("ring.user"),
            Self::Return => f.write_str("ret"),
            Self::LoadIntImmediate { dst, value } => write!(f, "li {}, {value:#x}", X(dst)),
            Self::LoadFloatImmediate { dst, bits } => {
                write!(f, "lf {}, {}", Fr(dst), f32::from_bits(bits))
            }
            Self::LoadIntAbsolute { dst, addr } => write!(f, "ld {}, [{addr:#010x}]", X(dst)),
            Self::LoadFloatAbsolute { dst, addr } => {
                write!(f, "ldf {}, [{addr:#010x}]", Fr(dst))
            }
            Self::IntBinary { op, dst, src } => {
                write!(f, "{} {}, {}", op.mnemonic(), X(dst), X(src))
            }
            Self::FloatBinary { op, dst, src } => {
                write!(f, "{} {}, {}", op.mnemonic(), Fr(dst), Fr(src))
            }
            Self::MoveInt { dst, src } => write!(f, "mov {}, {}", X(dst), X(src)),
            Self::MoveFloat { dst, src } => write!(f, "movf {}, {}", Fr(dst), Fr(src)),
            Self::IntFromFloat { dst, src } => write!(f, "cvt {}, {}", X(dst), Fr(src)),
            Self::FloatFromInt { dst, src } => write!(f, "cvtf {}, {}", Fr(dst), X(src)),
            Self::TransmuteIntFromFloat { dst, src } => {
                write!(f, "bits {}, {}", X(dst), Fr(src))
            }
            Self::TransmuteFloatFromInt { dst, src } => {
                write!(f, "bitsf {}, {}", Fr(dst), X(src))
            }
            Self::LoadIntIndirect { dst, addr } => write!(f, "ld {}, [{}]", X(dst), X(addr)),
            Self::LoadFloatIndirect { dst, addr } => {
                write!(f, "ldf {}, [{}]", Fr(dst), X(addr))
            }
            Self::StoreIntIndirect { addr, src } => write!(f, "st [{}], {}", X(addr), X(src)),
            Self::StoreFloatIndirect { addr, src } => {
                write!(f, "stf [{}], {}", X(addr), Fr(src))
            }
            Self::StoreIntAbsolute { addr, src } => write!(f, "st [{addr:#010x}], {}", X(src)),
            Self::StoreFloatAbsolute { addr, src } => {
                write!(f, "stf [{addr:#010x}], {}", Fr(src))
            }
            Self::WriteMask { src } => write!(f, "wmask {}", X(src)),
            Self::WriteMemmap { src } => write!(f, "wmemmap {}", X(src)),
            Self::ReadMask { dst } => write!(f, "rmask {}", X(dst)),
            Self::ReadMemmap { dst } => write!(f, "rmemmap {}", X(dst)),
            Self::Push { src } => write!(f, "push {}", X(src)),
            Self::Pop { dst } => write!(f, "pop {}", X(dst)),
            Self::JumpRegister { target } => write!(f, "jmp {}", X(target)),
            Self::CallRegister { target } => write!(f, "call {}", X(target)),
            Self::Branch { condition, target } => {
                write!(f, "{} {target:#010x}", condition.suffix())
            }
            Self::Call { target } => write!(f, "call {target:#010x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Condition, IntBinaryOp, Operation, ResultCategory};
    use crate::memory::Ring;
    use crate::state::{FlagSet, FloatRegister, IntRegister};
    use rstest::rstest;

    #[rstest]
    #[case(Operation::Halt)]
    #[case(Operation::SetMemoryMap { enabled: true })]
    #[case(Operation::SetMemoryMap { enabled: false })]
    #[case(Operation::SetRing(Ring::System))]
    #[case(Operation::SetRing(Ring::User))]
    #[case(Operation::WriteMask { src: IntRegister::X0 })]
    #[case(Operation::WriteMemmap { src: IntRegister::X0 })]
    fn privileged_operations_require_system_ring(#[case] op: Operation) {
        assert!(op.requires_system_ring());
        assert_eq!(op.result_category(), ResultCategory::NoFlags);
    }

    #[rstest]
    #[case(Operation::Nop)]
    #[case(Operation::ReadMask { dst: IntRegister::X1 })]
    #[case(Operation::Push { src: IntRegister::X1 })]
    #[case(Operation::Call { target: 0x100 })]
    #[case(Operation::IntBinary { op: IntBinaryOp::Add, dst: IntRegister::X0, src: IntRegister::X1 })]
    fn ordinary_operations_run_in_any_ring(#[case] op: Operation) {
        assert!(!op.requires_system_ring());
    }

    #[test]
    fn conversions_are_categorised_by_destination() {
        let to_int = Operation::IntFromFloat {
            dst: IntRegister::X2,
            src: FloatRegister::F3,
        };
        let to_float = Operation::TransmuteFloatFromInt {
            dst: FloatRegister::F3,
            src: IntRegister::X2,
        };
        assert_eq!(to_int.result_category(), ResultCategory::Integer);
        assert_eq!(to_float.result_category(), ResultCategory::Float);
    }

    #[test]
    fn conditions_read_integer_flags() {
        let flags = FlagSet {
            zero: true,
            overflow: true,
            ..FlagSet::default()
        };
        assert!(Condition::Always.holds(&flags));
        assert!(Condition::Zero.holds(&flags));
        assert!(!Condition::NotZero.holds(&flags));
        assert!(Condition::NotCarry.holds(&flags));
        assert!(Condition::NotNegative.holds(&flags));
        assert!(Condition::Overflow.holds(&flags));
    }

    #[test]
    fn display_uses_register_names() {
        let op = Operation::IntBinary {
            op: IntBinaryOp::Shl,
            dst: IntRegister::X3,
            src: IntRegister::SP,
        };
        assert_eq!(op.to_string(), "bsl x3, x15");
        assert_eq!(
            Operation::Branch {
                condition: Condition::NotZero,
                target: 0x40
            }
            .to_string(),
            "bnz 0x00000040"
        );
    }
}

//! Flag updates applied at retire.

use crate::memory::Ring;
use crate::state::FlagSet;

/// Describes how the `flags` word changes when an operation retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change.
    #[default]
    None,
    /// Integer result: rewrites `Z,V,C,N,P` together.
    Integer {
        /// Result value.
        value: u32,
        /// Carry out.
        carry: bool,
        /// Signed overflow.
        overflow: bool,
    },
    /// Float result: rewrites `A,F` together.
    Float {
        /// Result bit pattern.
        bits: u32,
    },
    /// `clc` / `sec`.
    Carry(bool),
    /// Ring switch.
    Ring(Ring),
    /// Translation enable switch.
    MemoryMap(bool),
    /// New value for the interrupt-mask mirror. Dropped by layouts without
    /// a mirror field.
    InterruptMirror(u8),
}

impl FlagsUpdate {
    /// Applies this update to a decoded flag set.
    pub fn apply(self, flags: &mut FlagSet) {
        match self {
            Self::None => {}
            Self::Integer {
                value,
                carry,
                overflow,
            } => flags.apply_integer_result(value, carry, overflow),
            Self::Float { bits } => flags.apply_float_result(f32::from_bits(bits)),
            Self::Carry(carry) => flags.carry = carry,
            Self::Ring(ring) => flags.user_ring = ring.is_user(),
            Self::MemoryMap(enabled) => flags.memory_map = enabled,
            Self::InterruptMirror(bits) => flags.interrupt_mirror = bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FlagsUpdate;
    use crate::memory::Ring;
    use crate::state::FlagSet;

    #[test]
    fn carry_update_touches_only_carry() {
        let mut flags = FlagSet {
            zero: true,
            nan: true,
            ..FlagSet::default()
        };
        FlagsUpdate::Carry(true).apply(&mut flags);
        assert_eq!(
            flags,
            FlagSet {
                zero: true,
                nan: true,
                carry: true,
                ..FlagSet::default()
            }
        );
    }

    #[test]
    fn float_update_reports_nan_and_infinity() {
        let mut flags = FlagSet::default();
        FlagsUpdate::Float {
            bits: f32::INFINITY.to_bits(),
        }
        .apply(&mut flags);
        assert!(flags.infinite && !flags.nan);

        FlagsUpdate::Float {
            bits: f32::NAN.to_bits(),
        }
        .apply(&mut flags);
        assert!(flags.nan && !flags.infinite);
    }

    #[test]
    fn ring_and_memory_map_updates_flip_single_bits() {
        let mut flags = FlagSet::default();
        FlagsUpdate::Ring(Ring::User).apply(&mut flags);
        FlagsUpdate::MemoryMap(true).apply(&mut flags);
        assert!(flags.user_ring && flags.memory_map);
        FlagsUpdate::Ring(Ring::System).apply(&mut flags);
        assert!(!flags.user_ring);
    }

    #[test]
    fn mirror_update_leaves_arithmetic_flags() {
        let mut flags = FlagSet {
            carry: true,
            ..FlagSet::default()
        };
        FlagsUpdate::InterruptMirror(0b101).apply(&mut flags);
        assert_eq!(flags.interrupt_mirror, 0b101);
        assert!(flags.carry);
    }
}

//! `flags` word codec with a swappable bit-layout table.
//!
//! Revisions of the architecture disagree on where `A`, `F`, `R` and `M`
//! live, so field positions come from a [`FlagLayout`] instead of being
//! hard-coded. [`FlagLayout::CANONICAL`] is the default.

use thiserror::Error;

/// Number of named fields in the `flags` word.
pub const FLAG_FIELD_COUNT: usize = 11;

/// Named field of the `flags` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FlagField {
    /// Mirror of the interrupt `mask` register (8 bits, optional).
    InterruptMirror = 0,
    /// Id of the most recently serviced interrupt (`LLL`, 3 bits).
    LastInterrupt = 1,
    /// `Z`: last integer result was zero.
    Zero = 2,
    /// `V`: last integer operation overflowed.
    Overflow = 3,
    /// `C`: last integer operation carried or borrowed.
    Carry = 4,
    /// `N`: sign bit of last integer result.
    Negative = 5,
    /// `P`: least-significant bit of last integer result.
    Parity = 6,
    /// `A`: last float result was NaN.
    Nan = 7,
    /// `F`: last float result was infinite.
    Infinite = 8,
    /// `R`: user ring active.
    UserRing = 9,
    /// `M`: memory accesses are translated through the MMU.
    MemoryMap = 10,
}

impl FlagField {
    /// Ordered list of all fields.
    pub const ALL: [Self; FLAG_FIELD_COUNT] = [
        Self::InterruptMirror,
        Self::LastInterrupt,
        Self::Zero,
        Self::Overflow,
        Self::Carry,
        Self::Negative,
        Self::Parity,
        Self::Nan,
        Self::Infinite,
        Self::UserRing,
        Self::MemoryMap,
    ];

    /// Returns the table index for this field.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bit width every layout must use for this field.
    #[must_use]
    pub const fn width(self) -> u8 {
        match self {
            Self::InterruptMirror => 8,
            Self::LastInterrupt => 3,
            _ => 1,
        }
    }

    /// Only the mask mirror may be left out of a layout.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(self, Self::InterruptMirror)
    }
}

/// Contiguous bit range inside the 32-bit `flags` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BitRange {
    /// Position of the least-significant bit.
    pub shift: u8,
    /// Number of bits.
    pub width: u8,
}

impl BitRange {
    /// Creates a range of `width` bits starting at `shift`.
    #[must_use]
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    /// Single-bit range.
    #[must_use]
    pub const fn bit(shift: u8) -> Self {
        Self { shift, width: 1 }
    }

    const fn fits_in_word(self) -> bool {
        self.width > 0 && self.width <= 32 && (self.shift as u32 + self.width as u32) <= 32
    }

    /// Word mask covering this range. Bits past bit 31 are dropped.
    #[must_use]
    pub const fn mask(self) -> u32 {
        let low = if self.width >= 32 {
            u32::MAX
        } else {
            (1_u32 << self.width) - 1
        };
        match low.checked_shl(self.shift as u32) {
            Some(mask) => mask,
            None => 0,
        }
    }

    /// Extracts the field value from `word`.
    #[must_use]
    pub const fn extract(self, word: u32) -> u32 {
        match (word & self.mask()).checked_shr(self.shift as u32) {
            Some(value) => value,
            None => 0,
        }
    }

    /// Returns `word` with this range replaced by `value` (truncated to width).
    #[must_use]
    pub const fn insert(self, word: u32, value: u32) -> u32 {
        let shifted = match value.checked_shl(self.shift as u32) {
            Some(shifted) => shifted,
            None => 0,
        };
        (word & !self.mask()) | (shifted & self.mask())
    }
}

/// Rejection reasons for a custom [`FlagLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FlagLayoutError {
    /// A mandatory field has no bit range.
    #[error("flag field {0:?} has no bit range")]
    MissingField(FlagField),
    /// A field uses the wrong number of bits.
    #[error("flag field {field:?} must be {expected} bits wide, got {actual}")]
    WrongWidth {
        /// Offending field.
        field: FlagField,
        /// Width the field requires.
        expected: u8,
        /// Width that was supplied.
        actual: u8,
    },
    /// A field extends past bit 31.
    #[error("flag field {0:?} does not fit in a 32-bit word")]
    OutOfWord(FlagField),
    /// Two fields share at least one bit.
    #[error("flag fields {first:?} and {second:?} overlap")]
    Overlap {
        /// Field declared first.
        first: FlagField,
        /// Field that collides with it.
        second: FlagField,
    },
}

/// Field-to-bit-range table for the `flags` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FlagLayout {
    ranges: [Option<BitRange>; FLAG_FIELD_COUNT],
}

impl FlagLayout {
    /// Widest, most recent revision: `A,F,R,M` on bits 16..=19, bits 0..=7
    /// reserved.
    pub const CANONICAL: Self = Self {
        ranges: [
            None,
            Some(BitRange::new(8, 3)),
            Some(BitRange::bit(11)),
            Some(BitRange::bit(12)),
            Some(BitRange::bit(13)),
            Some(BitRange::bit(14)),
            Some(BitRange::bit(15)),
            Some(BitRange::bit(16)),
            Some(BitRange::bit(17)),
            Some(BitRange::bit(18)),
            Some(BitRange::bit(19)),
        ],
    };

    /// Canonical layout with bits 0..=7 mirroring the `mask` register.
    pub const CANONICAL_MIRRORED: Self = Self::CANONICAL.with_range(
        FlagField::InterruptMirror,
        Some(BitRange::new(0, 8)),
    );

    /// Builds and validates a custom layout.
    ///
    /// # Errors
    ///
    /// Returns a [`FlagLayoutError`] when a mandatory field is missing, has the
    /// wrong width, leaves the word, or overlaps another field.
    pub const fn new(ranges: [Option<BitRange>; FLAG_FIELD_COUNT]) -> Result<Self, FlagLayoutError> {
        let layout = Self { ranges };
        match layout.validate() {
            Ok(()) => Ok(layout),
            Err(err) => Err(err),
        }
    }

    const fn with_range(mut self, field: FlagField, range: Option<BitRange>) -> Self {
        self.ranges[field.index()] = range;
        self
    }

    /// Checks every structural rule a layout must satisfy.
    ///
    /// # Errors
    ///
    /// See [`FlagLayout::new`].
    pub const fn validate(&self) -> Result<(), FlagLayoutError> {
        let mut index = 0;
        while index < FLAG_FIELD_COUNT {
            let field = FlagField::ALL[index];
            match self.ranges[index] {
                None => {
                    if !field.is_optional() {
                        return Err(FlagLayoutError::MissingField(field));
                    }
                }
                Some(range) => {
                    if range.width != field.width() {
                        return Err(FlagLayoutError::WrongWidth {
                            field,
                            expected: field.width(),
                            actual: range.width,
                        });
                    }
                    if !range.fits_in_word() {
                        return Err(FlagLayoutError::OutOfWord(field));
                    }
                    let mut other = 0;
                    while other < index {
                        if let Some(previous) = self.ranges[other] {
                            if previous.mask() & range.mask() != 0 {
                                return Err(FlagLayoutError::Overlap {
                                    first: FlagField::ALL[other],
                                    second: field,
                                });
                            }
                        }
                        other += 1;
                    }
                }
            }
            index += 1;
        }
        Ok(())
    }

    /// Bit range assigned to `field`, if any.
    #[must_use]
    pub const fn range(&self, field: FlagField) -> Option<BitRange> {
        self.ranges[field.index()]
    }

    /// Returns `true` when bits of the word mirror the `mask` register.
    #[must_use]
    pub const fn mirrors_mask(&self) -> bool {
        self.ranges[FlagField::InterruptMirror.index()].is_some()
    }

    /// Union of every bit assigned to a field.
    #[must_use]
    pub const fn defined_mask(&self) -> u32 {
        let mut mask = 0;
        let mut index = 0;
        while index < FLAG_FIELD_COUNT {
            if let Some(range) = self.ranges[index] {
                mask |= range.mask();
            }
            index += 1;
        }
        mask
    }

    /// Bits that must read as zero.
    #[must_use]
    pub const fn reserved_mask(&self) -> u32 {
        !self.defined_mask()
    }
}

impl Default for FlagLayout {
    fn default() -> Self {
        Self::CANONICAL
    }
}

const _: () = assert!(FlagLayout::CANONICAL.validate().is_ok());
const _: () = assert!(FlagLayout::CANONICAL_MIRRORED.validate().is_ok());
const _: () = assert!(FlagLayout::CANONICAL.reserved_mask() == 0xFFF0_00FF);

/// Decoded view of the `flags` word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct FlagSet {
    /// Interrupt-mask mirror bits (zero when the layout has no mirror).
    pub interrupt_mirror: u8,
    /// Last serviced interrupt id (`0..=7`).
    pub last_interrupt: u8,
    /// `Z` flag.
    pub zero: bool,
    /// `V` flag.
    pub overflow: bool,
    /// `C` flag.
    pub carry: bool,
    /// `N` flag.
    pub negative: bool,
    /// `P` flag.
    pub parity: bool,
    /// `A` flag.
    pub nan: bool,
    /// `F` flag.
    pub infinite: bool,
    /// `R` flag.
    pub user_ring: bool,
    /// `M` flag.
    pub memory_map: bool,
}

impl FlagSet {
    /// Reads a field as an unsigned value.
    #[must_use]
    pub const fn field(&self, field: FlagField) -> u32 {
        match field {
            FlagField::InterruptMirror => self.interrupt_mirror as u32,
            FlagField::LastInterrupt => self.last_interrupt as u32,
            FlagField::Zero => self.zero as u32,
            FlagField::Overflow => self.overflow as u32,
            FlagField::Carry => self.carry as u32,
            FlagField::Negative => self.negative as u32,
            FlagField::Parity => self.parity as u32,
            FlagField::Nan => self.nan as u32,
            FlagField::Infinite => self.infinite as u32,
            FlagField::UserRing => self.user_ring as u32,
            FlagField::MemoryMap => self.memory_map as u32,
        }
    }

    /// Writes a field, truncating `value` to the field width.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_field(&mut self, field: FlagField, value: u32) {
        match field {
            FlagField::InterruptMirror => self.interrupt_mirror = value as u8,
            FlagField::LastInterrupt => self.last_interrupt = (value & 0x7) as u8,
            FlagField::Zero => self.zero = value & 1 != 0,
            FlagField::Overflow => self.overflow = value & 1 != 0,
            FlagField::Carry => self.carry = value & 1 != 0,
            FlagField::Negative => self.negative = value & 1 != 0,
            FlagField::Parity => self.parity = value & 1 != 0,
            FlagField::Nan => self.nan = value & 1 != 0,
            FlagField::Infinite => self.infinite = value & 1 != 0,
            FlagField::UserRing => self.user_ring = value & 1 != 0,
            FlagField::MemoryMap => self.memory_map = value & 1 != 0,
        }
    }

    /// Sets `Z,V,C,N,P` for an integer-producing result. `A` and `F` are
    /// left untouched.
    pub const fn apply_integer_result(&mut self, value: u32, carry: bool, overflow: bool) {
        self.zero = value == 0;
        self.negative = value & 0x8000_0000 != 0;
        self.parity = value & 1 != 0;
        self.carry = carry;
        self.overflow = overflow;
    }

    /// Sets `A,F` for a float-producing result. Integer flags are left
    /// untouched.
    pub fn apply_float_result(&mut self, value: f32) {
        self.nan = value.is_nan();
        self.infinite = value.is_infinite();
    }
}

/// Pure codec between the raw `flags` word and [`FlagSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FlagsCodec {
    layout: FlagLayout,
}

impl FlagsCodec {
    /// Codec for a validated layout.
    #[must_use]
    pub const fn new(layout: FlagLayout) -> Self {
        Self { layout }
    }

    /// Layout driving this codec.
    #[must_use]
    pub const fn layout(&self) -> &FlagLayout {
        &self.layout
    }

    /// Decodes a raw word. Reserved bits are ignored.
    #[must_use]
    pub fn decode(&self, word: u32) -> FlagSet {
        let mut set = FlagSet::default();
        for field in FlagField::ALL {
            if let Some(range) = self.layout.range(field) {
                set.set_field(field, range.extract(word));
            }
        }
        set
    }

    /// Encodes a flag set. Reserved bits are always zero.
    #[must_use]
    pub fn encode(&self, set: &FlagSet) -> u32 {
        FlagField::ALL.iter().fold(0, |word, &field| {
            self.layout
                .range(field)
                .map_or(word, |range| range.insert(word, set.field(field)))
        })
    }

    /// Masks reserved bits out of a raw word.
    #[must_use]
    pub const fn sanitize(&self, word: u32) -> u32 {
        word & self.layout.defined_mask()
    }
}

use thiserror::Error;

/// Fault classes. Decode faults are reported to the host, every other class
/// is delivered to the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Address translation rejected an access.
    Memory,
    /// Ring check rejected an operation.
    Privilege,
    /// Decoder rejected an instruction encoding.
    Decode,
}

/// Stable fault taxonomy for instruction-cycle conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum FaultCode {
    /// First- or second-level page-table entry is unmapped.
    #[error("page fault: address is not mapped")]
    PageFault = 0x01,
    /// Mapped page lacks the permission the access requires.
    #[error("protection fault: page permissions deny the access")]
    ProtectionFault = 0x02,
    /// Privileged operation attempted from the user ring.
    #[error("privilege fault: operation requires the system ring")]
    PrivilegeFault = 0x03,
    /// Decoder could not map the fetched bytes to an operation.
    #[error("invalid opcode")]
    InvalidOpcode = 0x04,
}

impl FaultCode {
    /// Converts a fault code to its stable byte value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a stable byte value back into a fault code.
    #[must_use]
    pub const fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::PageFault),
            0x02 => Some(Self::ProtectionFault),
            0x03 => Some(Self::PrivilegeFault),
            0x04 => Some(Self::InvalidOpcode),
            _ => None,
        }
    }

    /// Returns the class for this fault code.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::PageFault | Self::ProtectionFault => FaultClass::Memory,
            Self::PrivilegeFault => FaultClass::Privilege,
            Self::InvalidOpcode => FaultClass::Decode,
        }
    }

    /// Faults delivered to the guest as non-maskable interrupts.
    ///
    /// `InvalidOpcode` is the only fault reported to the host instead.
    #[must_use]
    pub const fn is_interrupt(self) -> bool {
        !matches!(self.class(), FaultClass::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::{FaultClass, FaultCode};

    #[test]
    fn stable_code_roundtrip_is_bijective_for_defined_values() {
        for code in 0x01u8..=0x04 {
            let fault = FaultCode::from_u8(code).expect("defined taxonomy code");
            assert_eq!(fault.as_u8(), code);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(FaultCode::from_u8(0x00).is_none());
        assert!(FaultCode::from_u8(0xFF).is_none());
    }

    #[test]
    fn only_invalid_opcode_bypasses_interrupt_delivery() {
        assert!(FaultCode::PageFault.is_interrupt());
        assert!(FaultCode::ProtectionFault.is_interrupt());
        assert!(FaultCode::PrivilegeFault.is_interrupt());
        assert!(!FaultCode::InvalidOpcode.is_interrupt());
    }

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(FaultCode::PageFault.class(), FaultClass::Memory);
        assert_eq!(FaultCode::ProtectionFault.class(), FaultClass::Memory);
        assert_eq!(FaultCode::PrivilegeFault.class(), FaultClass::Privilege);
        assert_eq!(FaultCode::InvalidOpcode.class(), FaultClass::Decode);
    }

    #[test]
    fn display_text_is_stable() {
        assert_eq!(
            FaultCode::ProtectionFault.to_string(),
            "protection fault: page permissions deny the access"
        );
    }
}

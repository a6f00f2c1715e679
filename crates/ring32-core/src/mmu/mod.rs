//! Two-level virtual-to-physical address translation.
//!
//! The MMU only reads page tables and reports a physical address or an
//! [`MmuFault`]. Turning a fault into an interrupt is the execution engine's
//! job.

mod entry;

pub use entry::{
    PagePermissions, PageTableEntry, VirtualAddress, ENTRY_BYTES, PAGE_BYTES, PAGE_OFFSET_BITS,
    PTE_EXECUTABLE, PTE_FRAME_MASK, PTE_READABLE, PTE_USED, PTE_WRITABLE, TABLE_BYTES,
    TABLE_ENTRIES,
};

use thiserror::Error;

use crate::memory::{AccessKind, PhysicalMemory, Ring};
use crate::FaultCode;

/// Page-table level at which a walk stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum TableLevel {
    /// First-level table rooted at `memmap`.
    First,
    /// Second-level table referenced by a first-level entry.
    Second,
}

/// Translation failure reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MmuFault {
    /// A table entry on the walk is unused.
    #[error("virtual address {vaddr:#010x} is unmapped at the {level:?} level")]
    Unmapped {
        /// Faulting virtual address.
        vaddr: u32,
        /// Level whose entry was unused.
        level: TableLevel,
    },
    /// The page is mapped but denies the requested access.
    #[error("{access:?} access to {vaddr:#010x} denied by page permissions")]
    Protection {
        /// Faulting virtual address.
        vaddr: u32,
        /// Access that was denied.
        access: AccessKind,
    },
}

impl MmuFault {
    /// Fault code the engine delivers for this failure.
    #[must_use]
    pub const fn fault_code(self) -> FaultCode {
        match self {
            Self::Unmapped { .. } => FaultCode::PageFault,
            Self::Protection { .. } => FaultCode::ProtectionFault,
        }
    }

    /// Faulting virtual address.
    #[must_use]
    pub const fn vaddr(self) -> u32 {
        match self {
            Self::Unmapped { vaddr, .. } | Self::Protection { vaddr, .. } => vaddr,
        }
    }
}

/// Whether the system ring honours page permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PermissionPolicy {
    /// Both rings are subject to the R/W/X bits.
    #[default]
    Enforced,
    /// The system ring skips the R/W/X check. Unmapped entries still fault.
    SystemBypass,
}

/// Machine state the MMU needs for one translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TranslationContext {
    /// Current privilege ring.
    pub ring: Ring,
    /// Physical address of the first-level table.
    pub memmap: u32,
    /// Value of the `M` flag.
    pub enabled: bool,
    /// Permission policy for the system ring.
    pub policy: PermissionPolicy,
}

impl TranslationContext {
    /// Context with translation disabled.
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            ring: Ring::System,
            memmap: 0,
            enabled: false,
            policy: PermissionPolicy::Enforced,
        }
    }

    const fn checks_permissions(&self) -> bool {
        match self.policy {
            PermissionPolicy::Enforced => true,
            PermissionPolicy::SystemBypass => self.ring.is_user(),
        }
    }
}

/// Translates `vaddr` for `access`.
///
/// With translation disabled the address is returned unchanged and no
/// permission check is made.
///
/// # Errors
///
/// Returns [`MmuFault::Unmapped`] for a zero first-level entry or a
/// second-level entry without the `Used` bit, and [`MmuFault::Protection`]
/// when the entry lacks the permission bit matching `access`.
pub fn translate(
    vaddr: u32,
    access: AccessKind,
    ctx: &TranslationContext,
    memory: &mut dyn PhysicalMemory,
) -> Result<u32, MmuFault> {
    if !ctx.enabled {
        return Ok(vaddr);
    }

    let parts = VirtualAddress(vaddr);

    let first_entry = memory.read_u32(
        ctx.memmap
            .wrapping_add(parts.first_index() * ENTRY_BYTES),
    );
    if first_entry == 0 {
        tracing::trace!(vaddr, ?access, "first-level entry unused");
        return Err(MmuFault::Unmapped {
            vaddr,
            level: TableLevel::First,
        });
    }

    let entry = PageTableEntry(
        memory.read_u32(first_entry.wrapping_add(parts.second_index() * ENTRY_BYTES)),
    );
    if !entry.is_used() {
        tracing::trace!(vaddr, ?access, "second-level entry unused");
        return Err(MmuFault::Unmapped {
            vaddr,
            level: TableLevel::Second,
        });
    }

    if ctx.checks_permissions() && !entry.permissions().permits(access) {
        tracing::trace!(vaddr, ?access, raw = entry.raw(), "page permissions deny access");
        return Err(MmuFault::Protection { vaddr, access });
    }

    Ok(entry.page_base() | parts.offset())
}

#[cfg(test)]
mod tests {
    use super::{
        translate, MmuFault, PagePermissions, PageTableEntry, PermissionPolicy, TableLevel,
        TranslationContext, VirtualAddress, ENTRY_BYTES,
    };
    use crate::memory::{AccessKind, FlatMemory, PhysicalMemory, Ring};
    use proptest::prelude::*;
    use rstest::rstest;

    const ROOT: u32 = 0x0001_0000;
    const SECOND: u32 = 0x0001_0400;

    fn paged(ring: Ring) -> TranslationContext {
        TranslationContext {
            ring,
            memmap: ROOT,
            enabled: true,
            policy: PermissionPolicy::Enforced,
        }
    }

    fn map(memory: &mut FlatMemory, vaddr: u32, entry: PageTableEntry) {
        let parts = VirtualAddress(vaddr);
        memory.write_u32(ROOT + parts.first_index() * ENTRY_BYTES, SECOND);
        memory.write_u32(SECOND + parts.second_index() * ENTRY_BYTES, entry.raw());
    }

    #[test]
    fn disabled_translation_ignores_tables() {
        let mut memory = FlatMemory::new(0x2_0000);
        let ctx = TranslationContext {
            enabled: false,
            ..paged(Ring::User)
        };
        assert_eq!(
            translate(0xDEAD_BEEF, AccessKind::Write, &ctx, &mut memory),
            Ok(0xDEAD_BEEF)
        );
    }

    #[rstest]
    #[case(AccessKind::Read)]
    #[case(AccessKind::Write)]
    #[case(AccessKind::Execute)]
    fn zero_first_level_entry_is_page_fault_for_every_access(#[case] access: AccessKind) {
        let mut memory = FlatMemory::new(0x2_0000);
        for ring in [Ring::System, Ring::User] {
            assert_eq!(
                translate(0x0304_0506, access, &paged(ring), &mut memory),
                Err(MmuFault::Unmapped {
                    vaddr: 0x0304_0506,
                    level: TableLevel::First,
                })
            );
        }
    }

    #[test]
    fn second_level_entry_without_used_bit_is_page_fault() {
        let mut memory = FlatMemory::new(0x2_0000);
        map(&mut memory, 0x0200_0000, PageTableEntry(0x7000_0003));

        let fault = translate(0x0200_0010, AccessKind::Read, &paged(Ring::System), &mut memory)
            .expect_err("unused entry");
        assert_eq!(
            fault,
            MmuFault::Unmapped {
                vaddr: 0x0200_0010,
                level: TableLevel::Second,
            }
        );
        assert_eq!(fault.fault_code(), crate::FaultCode::PageFault);
    }

    #[test]
    fn read_only_page_rejects_writes_and_allows_reads() {
        let mut memory = FlatMemory::new(0x2_0000);
        map(
            &mut memory,
            0x0500_0000,
            PageTableEntry::mapped(0x0042, PagePermissions::READ_ONLY),
        );
        let ctx = paged(Ring::User);

        let fault = translate(0x0500_1234, AccessKind::Write, &ctx, &mut memory)
            .expect_err("write to read-only page");
        assert_eq!(
            fault,
            MmuFault::Protection {
                vaddr: 0x0500_1234,
                access: AccessKind::Write,
            }
        );
        assert_eq!(fault.fault_code(), crate::FaultCode::ProtectionFault);

        assert_eq!(
            translate(0x0500_1234, AccessKind::Read, &ctx, &mut memory),
            Ok(0x0042_1234)
        );
    }

    #[test]
    fn system_ring_honours_permissions_by_default() {
        let mut memory = FlatMemory::new(0x2_0000);
        map(
            &mut memory,
            0x0600_0000,
            PageTableEntry::mapped(0x0007, PagePermissions::READ_WRITE),
        );

        assert!(matches!(
            translate(0x0600_0000, AccessKind::Execute, &paged(Ring::System), &mut memory),
            Err(MmuFault::Protection { .. })
        ));
    }

    #[test]
    fn system_bypass_policy_skips_only_permission_bits() {
        let mut memory = FlatMemory::new(0x2_0000);
        map(
            &mut memory,
            0x0600_0000,
            PageTableEntry::mapped(0x0007, PagePermissions::NONE),
        );
        let system = TranslationContext {
            policy: PermissionPolicy::SystemBypass,
            ..paged(Ring::System)
        };
        let user = TranslationContext {
            ring: Ring::User,
            ..system
        };

        assert_eq!(
            translate(0x0600_00FF, AccessKind::Write, &system, &mut memory),
            Ok(0x0007_00FF)
        );
        assert!(translate(0x0600_00FF, AccessKind::Write, &user, &mut memory).is_err());
        assert!(matches!(
            translate(0x0700_0000, AccessKind::Read, &system, &mut memory),
            Err(MmuFault::Unmapped { .. })
        ));
    }

    proptest! {
        #[test]
        fn disabled_translation_is_identity(vaddr in any::<u32>(), memmap in any::<u32>()) {
            let mut memory = FlatMemory::new(0x1000);
            let ctx = TranslationContext { memmap, ..TranslationContext::identity() };
            for access in [AccessKind::Read, AccessKind::Write, AccessKind::Execute] {
                prop_assert_eq!(translate(vaddr, access, &ctx, &mut memory), Ok(vaddr));
            }
        }

        #[test]
        fn mapped_page_preserves_offset(offset in 0_u32..0x1_0000, frame in any::<u16>()) {
            let mut memory = FlatMemory::new(0x2_0000);
            map(&mut memory, 0x0A0B_0000, PageTableEntry::mapped(frame, PagePermissions::ALL));
            let phys = translate(0x0A0B_0000 | offset, AccessKind::Read, &paged(Ring::User), &mut memory);
            prop_assert_eq!(phys, Ok((u32::from(frame) << 16) | offset));
        }
    }
}

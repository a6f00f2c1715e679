//! Page-table entry and virtual-address layouts.

use crate::memory::AccessKind;

/// Entries per first- or second-level table.
pub const TABLE_ENTRIES: usize = 256;
/// Size in bytes of one table entry.
pub const ENTRY_BYTES: u32 = 4;
/// Size in bytes of one table (1 KiB).
pub const TABLE_BYTES: u32 = TABLE_ENTRIES as u32 * ENTRY_BYTES;
/// Number of virtual-address bits addressing a byte inside a page.
pub const PAGE_OFFSET_BITS: u32 = 16;
/// Size in bytes of one page (64 KiB).
pub const PAGE_BYTES: u32 = 1 << PAGE_OFFSET_BITS;

/// Second-level entry bit: entry is valid.
pub const PTE_USED: u32 = 1 << 31;
/// Second-level entry bit: page may be read.
pub const PTE_READABLE: u32 = 1 << 30;
/// Second-level entry bit: page may be written.
pub const PTE_WRITABLE: u32 = 1 << 29;
/// Second-level entry bit: page may be fetched from.
pub const PTE_EXECUTABLE: u32 = 1 << 28;
/// Second-level entry bits holding the physical frame number.
pub const PTE_FRAME_MASK: u32 = 0x0000_FFFF;

const _: () = assert!(TABLE_BYTES == 1024);

/// Virtual address split into its two table indices and page offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualAddress(pub u32);

impl VirtualAddress {
    /// Index into the first-level table (bits 31..24).
    #[must_use]
    pub const fn first_index(self) -> u32 {
        self.0 >> 24
    }

    /// Index into the second-level table (bits 23..16).
    #[must_use]
    pub const fn second_index(self) -> u32 {
        (self.0 >> PAGE_OFFSET_BITS) & 0xFF
    }

    /// Byte offset inside the page (bits 15..0).
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & (PAGE_BYTES - 1)
    }

    /// Rebuilds an address from its parts. Indices are truncated to 8 bits.
    #[must_use]
    pub const fn from_parts(first: u32, second: u32, offset: u32) -> Self {
        Self(((first & 0xFF) << 24) | ((second & 0xFF) << PAGE_OFFSET_BITS) | (offset & (PAGE_BYTES - 1)))
    }
}

/// Permission bits carried in the top nibble of a second-level entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PagePermissions {
    /// Reads allowed.
    pub readable: bool,
    /// Writes allowed.
    pub writable: bool,
    /// Instruction fetches allowed.
    pub executable: bool,
}

impl PagePermissions {
    /// No access.
    pub const NONE: Self = Self::new(false, false, false);
    /// Read-only data.
    pub const READ_ONLY: Self = Self::new(true, false, false);
    /// Read/write data.
    pub const READ_WRITE: Self = Self::new(true, true, false);
    /// Read-only code.
    pub const READ_EXECUTE: Self = Self::new(true, false, true);
    /// Everything.
    pub const ALL: Self = Self::new(true, true, true);

    /// Builds a permission set.
    #[must_use]
    pub const fn new(readable: bool, writable: bool, executable: bool) -> Self {
        Self {
            readable,
            writable,
            executable,
        }
    }

    /// Returns `true` when `access` is allowed.
    #[must_use]
    pub const fn permits(self, access: AccessKind) -> bool {
        match access {
            AccessKind::Read => self.readable,
            AccessKind::Write => self.writable,
            AccessKind::Execute => self.executable,
        }
    }
}

/// Second-level page-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageTableEntry(pub u32);

impl PageTableEntry {
    /// Used entry mapping physical frame `frame` with `permissions`.
    #[must_use]
    pub const fn mapped(frame: u16, permissions: PagePermissions) -> Self {
        let mut raw = PTE_USED | frame as u32;
        if permissions.readable {
            raw |= PTE_READABLE;
        }
        if permissions.writable {
            raw |= PTE_WRITABLE;
        }
        if permissions.executable {
            raw |= PTE_EXECUTABLE;
        }
        Self(raw)
    }

    /// Raw entry word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `Used` bit.
    #[must_use]
    pub const fn is_used(self) -> bool {
        self.0 & PTE_USED != 0
    }

    /// Permission nibble.
    #[must_use]
    pub const fn permissions(self) -> PagePermissions {
        PagePermissions::new(
            self.0 & PTE_READABLE != 0,
            self.0 & PTE_WRITABLE != 0,
            self.0 & PTE_EXECUTABLE != 0,
        )
    }

    /// Physical frame number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frame(self) -> u16 {
        (self.0 & PTE_FRAME_MASK) as u16
    }

    /// Physical address of the first byte of the page.
    #[must_use]
    pub const fn page_base(self) -> u32 {
        (self.0 & PTE_FRAME_MASK) << PAGE_OFFSET_BITS
    }
}

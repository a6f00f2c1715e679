//! Physical memory backing store consumed by the MMU and execution engine.

/// Access kinds and privilege rings used by translation.
pub mod access;

pub use access::{AccessKind, Ring};

/// Default size of [`FlatMemory`] (16 MiB).
pub const DEFAULT_PHYSICAL_BYTES: usize = 0x0100_0000;

/// Flat, byte-addressable 32-bit physical address space.
///
/// Used post-translation for instruction fetch and data accesses, and
/// directly for page-table reads.
pub trait PhysicalMemory {
    /// Fills `buf` with bytes starting at `addr`. Addresses wrap at 2^32.
    fn read_bytes(&mut self, addr: u32, buf: &mut [u8]);

    /// Stores `data` starting at `addr`. Addresses wrap at 2^32.
    fn write_bytes(&mut self, addr: u32, data: &[u8]);

    /// Reads a little-endian word.
    fn read_u32(&mut self, addr: u32) -> u32 {
        let mut bytes = [0; 4];
        self.read_bytes(addr, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Writes a little-endian word.
    fn write_u32(&mut self, addr: u32, value: u32) {
        self.write_bytes(addr, &value.to_le_bytes());
    }
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &mut T {
    fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) {
        (**self).read_bytes(addr, buf);
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        (**self).write_bytes(addr, data);
    }
}

/// Zero-initialised RAM image.
///
/// Reads past the end return zero and writes past the end are dropped, so a
/// small image can stand in for the full 4 GiB space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatMemory {
    bytes: Box<[u8]>,
}

impl Default for FlatMemory {
    fn default() -> Self {
        Self::new(DEFAULT_PHYSICAL_BYTES)
    }
}

impl FlatMemory {
    /// Allocates `len` zeroed bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len].into_boxed_slice(),
        }
    }

    /// Size of the backing image in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-sized image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw view of the image.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Copies `data` into the image at `addr`.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        self.write_bytes(addr, data);
    }

    fn slot(&self, addr: u32) -> Option<usize> {
        usize::try_from(addr)
            .ok()
            .filter(|index| *index < self.bytes.len())
    }
}

impl PhysicalMemory for FlatMemory {
    fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) {
        for (offset, byte) in (0_u32..).zip(buf.iter_mut()) {
            *byte = self
                .slot(addr.wrapping_add(offset))
                .map_or(0, |index| self.bytes[index]);
        }
    }

    fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        for (offset, byte) in (0_u32..).zip(data.iter().copied()) {
            if let Some(index) = self.slot(addr.wrapping_add(offset)) {
                self.bytes[index] = byte;
            }
        }
    }
}

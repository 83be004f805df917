// Guest physical memory: a flat byte array plus the address-translation
// constants that relate guest physical addresses to host byte offsets.
//
// `CpuState` does not literally live inside this buffer (see cpustate.rs);
// the tail-of-RAM offsets below are tracked as arithmetic only, matching
// where the reference firmware would place them, so that DTB patching and
// the `ram_size − sizeof(CpuState)` invariant hold exactly.

use std::mem::size_of;

use crate::cpustate::CpuState;

/// Guest physical base address the kernel image is linked to run at.
pub const IMAGE_OFFSET: u32 = 0x8000_0000;

/// First address outside the RAM window; everything at or above this is MMIO.
pub const MMIO_BASE: u32 = 0x1000_0000;

/// Default RAM size used by `Session::setup` when the embedder doesn't override it.
pub const DEFAULT_RAM_SIZE: usize = 64 * 1024 * 1024;

/// Offset of `kernel_cmdline` inside the DTB, and its maximum effective length.
pub const DTB_CMDLINE_OFFSET: usize = 0xC0;
pub const DTB_CMDLINE_MAX: usize = 54;

/// Offset of the skeleton DTB's RAM-size sentinel word, and its value on the wire.
pub const DTB_RAMSIZE_OFFSET: usize = 0x13C;
pub const DTB_RAMSIZE_SENTINEL: u32 = 0x00c0_ff03;

/// A minimal stand-in DTB used when the embedder supplies none. The core
/// treats DTB contents as opaque bytes (device-tree authoring is out of
/// scope, per spec.md §1); this blob exists only so `Session::setup` has
/// something to place and patch when no DTB is supplied.
pub const DEFAULT_DTB: [u8; 0x1000] = build_default_dtb();

const fn build_default_dtb() -> [u8; 0x1000] {
    let mut dtb = [0u8; 0x1000];
    // FDT magic, for cosmetic plausibility only -- never parsed by this crate.
    dtb[0] = 0xd0;
    dtb[1] = 0x0d;
    dtb[2] = 0xfe;
    dtb[3] = 0xed;
    // Laid out so that reading these 4 bytes as a little-endian u32 gives
    // exactly `DTB_RAMSIZE_SENTINEL` -- the value `Session::setup` looks for
    // before patching in the real RAM-size word (see `patch_dtb_ramsize`).
    dtb[DTB_RAMSIZE_OFFSET] = 0x03;
    dtb[DTB_RAMSIZE_OFFSET + 1] = 0xff;
    dtb[DTB_RAMSIZE_OFFSET + 2] = 0xc0;
    dtb[DTB_RAMSIZE_OFFSET + 3] = 0x00;
    dtb
}

/// Guest physical RAM, addressed by host byte offset (`guest_addr - IMAGE_OFFSET`).
pub struct RamImage {
    bytes: Vec<u8>,
}

impl RamImage {
    pub fn new(size: usize) -> Self {
        RamImage { bytes: vec![0u8; size] }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte offset at which the reference firmware would have kept its
    /// `CpuState`; reserved, zero-filled, and excluded from the RAM size
    /// the DTB reports to the guest.
    pub fn cpu_state_offset(&self) -> usize {
        self.bytes.len() - size_of::<CpuState>()
    }

    /// Byte offset of the DTB, immediately before the reserved `CpuState` tail.
    pub fn dtb_offset(&self, dtb_len: usize) -> usize {
        self.cpu_state_offset() - dtb_len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// True if `[guest_addr, guest_addr+size)` lies entirely within RAM.
    pub fn contains(&self, guest_addr: u32, size: usize) -> bool {
        let Some(offset) = guest_addr.checked_sub(IMAGE_OFFSET) else { return false };
        let offset = offset as usize;
        offset.checked_add(size).map_or(false, |end| end <= self.bytes.len())
    }

    pub fn read_u8(&self, guest_addr: u32) -> u8 {
        self.bytes[(guest_addr - IMAGE_OFFSET) as usize]
    }

    pub fn write_u8(&mut self, guest_addr: u32, value: u8) {
        self.bytes[(guest_addr - IMAGE_OFFSET) as usize] = value;
    }

    pub fn read_u16(&self, guest_addr: u32) -> u16 {
        let o = (guest_addr - IMAGE_OFFSET) as usize;
        u16::from_le_bytes([self.bytes[o], self.bytes[o + 1]])
    }

    pub fn write_u16(&mut self, guest_addr: u32, value: u16) {
        let o = (guest_addr - IMAGE_OFFSET) as usize;
        self.bytes[o..o + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn read_u32(&self, guest_addr: u32) -> u32 {
        let o = (guest_addr - IMAGE_OFFSET) as usize;
        u32::from_le_bytes([self.bytes[o], self.bytes[o + 1], self.bytes[o + 2], self.bytes[o + 3]])
    }

    pub fn write_u32(&mut self, guest_addr: u32, value: u32) {
        let o = (guest_addr - IMAGE_OFFSET) as usize;
        self.bytes[o..o + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Copy `data` into RAM starting at host byte offset `offset`.
    pub fn splice_at(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Read the NUL-terminated string starting at `offset`, bounded by RAM size.
    pub fn read_cstr(&self, offset: usize) -> &[u8] {
        let end = self.bytes[offset..].iter().position(|&b| b == 0).map_or(self.bytes.len(), |p| offset + p);
        &self.bytes[offset..end]
    }

    pub fn checksum(&self) -> u8 {
        self.bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }
}

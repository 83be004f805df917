// The MMIO/CSR bridge: every guest access outside RAM, and every read or
// write of the non-standard debug CSRs, funnels through here. Kept as one
// small module so `cpu.rs`'s execute loop never has to know about UART
// registers or terminal escape codes directly -- it just calls `control_store`
// / `control_load` / `other_csr_write` / `other_csr_read`, the same shape the
// teacher's `Bus` uses to route an address to whichever `Device` owns it.

use crate::framebuffer::FramebufferView;
use crate::ram::{RamImage, IMAGE_OFFSET};
use crate::terminal::Terminal;
use crate::uart::{KeyboardQueue, Uart};

pub const UART_DATA: u32 = 0x1000_0000;
pub const UART_LSR: u32 = 0x1000_0005;

/// Debug CSRs outside the standard RISC-V space, used by the guest's early
/// boot console before a real UART driver is up.
pub const CSR_DEBUG_DEC: u32 = 0x136;
pub const CSR_DEBUG_HEX: u32 = 0x137;
pub const CSR_DEBUG_STR: u32 = 0x138;
pub const CSR_DEBUG_CHAR: u32 = 0x139;
pub const CSR_DEBUG_KEYIN: u32 = 0x140;

/// Everything a guest access outside RAM, or a debug-CSR access, can touch
/// for the duration of one `Session::step` call.
pub struct Devices<'a> {
    pub uart: &'a mut Uart,
    pub terminal: &'a mut Terminal,
    pub kb: KeyboardQueue<'a>,
    pub fb: FramebufferView<'a>,
}

fn print_str(devices: &mut Devices<'_>, bytes: &[u8]) {
    log::info!("{}", String::from_utf8_lossy(bytes));
    for &b in bytes {
        devices.terminal.feed_byte(b, &mut devices.fb);
    }
}

/// A guest store to an address outside RAM. Always absorbed, never faults.
pub fn control_store(devices: &mut Devices<'_>, addr: u32, value: u32) {
    match addr {
        UART_DATA => {
            let byte = value as u8;
            devices.terminal.feed_byte(byte, &mut devices.fb);
            devices.uart.note_tx();
            log::info!("{}", byte as char);
        }
        _ => log::trace!("mmio store to unmapped {:#010x} ignored", addr),
    }
}

/// A guest load from an address outside RAM. Unmapped addresses read as zero.
pub fn control_load(devices: &mut Devices<'_>, addr: u32) -> u32 {
    match addr {
        UART_DATA => devices.uart.read_rx_byte(&mut devices.kb).unwrap_or(0) as u32,
        UART_LSR => devices.uart.line_status(&devices.kb) as u32,
        _ => {
            log::trace!("mmio load from unmapped {:#010x} reads 0", addr);
            0
        }
    }
}

/// CSRRW/S/C (and their immediate forms) on a debug CSR number. Standard
/// CSRs never reach here; `cpu.rs` handles those directly.
pub fn other_csr_write(devices: &mut Devices<'_>, ram: &RamImage, csrno: u32, value: u32) {
    match csrno {
        CSR_DEBUG_DEC => print_str(devices, value.to_string().as_bytes()),
        CSR_DEBUG_HEX => print_str(devices, format!("{:08x}", value).as_bytes()),
        CSR_DEBUG_STR => {
            if ram.contains(value, 1) {
                let offset = (value - IMAGE_OFFSET) as usize;
                let bytes = ram.read_cstr(offset).to_vec();
                print_str(devices, &bytes);
            } else {
                log::warn!("DEBUG PASSED INVALID PTR");
            }
        }
        CSR_DEBUG_CHAR => print_str(devices, &[value as u8]),
        _ => log::trace!("write to unmapped debug csr {:#05x}", csrno),
    }
}

/// Returns `None` for a debug CSR this bridge doesn't implement a read for
/// (the caller then synthesizes whatever default standard CSR reads use).
pub fn other_csr_read(devices: &mut Devices<'_>, csrno: u32) -> Option<u32> {
    match csrno {
        CSR_DEBUG_KEYIN => Some(devices.uart.read_rx_byte(&mut devices.kb).map_or(u32::MAX, |b| b as u32)),
        _ => None,
    }
}

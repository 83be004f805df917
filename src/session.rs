// The embedder-facing facade: setup/step/cleanup, binding a borrowed
// framebuffer and keyboard buffer for the duration of each `step` call.
// Everything the original kept as mutable globals (core, ram_image, cursor,
// parser state, log handle) lives as fields here instead, so a `Session` is
// the only piece of mutable state the crate has -- mirrors the teacher's own
// `CPU` struct as the sole owner of registers/memory/bus.

use std::mem::size_of;
use std::sync::Once;

use crate::cpu;
use crate::cpustate::CpuState;
use crate::error::SetupError;
use crate::framebuffer::{FontAtlas, FramebufferView};
use crate::logfile::FileLogger;
use crate::mmio::Devices;
use crate::ram::{self, RamImage};
use crate::terminal::Terminal;
use crate::uart::{KeyboardQueue, Uart};

/// Instructions run per `step`, in chunks no larger than `INNER_BUDGET`
/// (the granularity at which timer/interrupt state is re-checked).
const TOTAL_BUDGET: u32 = 65536 * 5;
const INNER_BUDGET: u32 = 1024;

static LOGGER_INIT: Once = Once::new();

fn install_logger() {
    LOGGER_INIT.call_once(|| {
        if let Ok(logger) = FileLogger::open("rvlog.txt") {
            let _ = log::set_boxed_logger(Box::new(logger));
            log::set_max_level(log::LevelFilter::Trace);
        }
    });
}

pub struct StepResult {
    pub status: u32,
    pub new_kb_len: usize,
}

pub struct Session {
    ram: RamImage,
    state: CpuState,
    uart: Uart,
    terminal: Terminal,
    font: FontAtlas,
    width: usize,
    height: usize,
    first_step: bool,
}

impl Session {
    /// Tolerant setup: missing ROM/font/oversized ROM are logged and the
    /// session proceeds with whatever was loaded, per the "setup errors are
    /// logged and tolerated" contract.
    pub fn setup(
        width: usize,
        height: usize,
        ram_size: usize,
        rom: &[u8],
        dtb: Option<&[u8]>,
        font_bitmap: Vec<u8>,
        font_width: usize,
        font_height: usize,
        cmdline: Option<&str>,
    ) -> Session {
        install_logger();
        if font_bitmap.is_empty() {
            log::warn!("setup: font atlas is empty; glyphs will render blank");
        }
        if rom.is_empty() {
            log::warn!("setup: kernel image is empty");
        }
        Self::build(width, height, ram_size, rom, dtb, font_bitmap, font_width, font_height, cmdline)
    }

    /// Fail-fast variant for embedders that would rather reject a bad
    /// configuration than boot a session that can never make progress.
    pub fn try_setup_strict(
        width: usize,
        height: usize,
        ram_size: usize,
        rom: &[u8],
        dtb: Option<&[u8]>,
        font_bitmap: Vec<u8>,
        font_width: usize,
        font_height: usize,
        cmdline: Option<&str>,
    ) -> Result<Session, SetupError> {
        if font_bitmap.is_empty() {
            return Err(SetupError::FontMissing);
        }
        if rom.is_empty() {
            return Err(SetupError::RomMissing);
        }
        let dtb_len = dtb.map_or(ram::DEFAULT_DTB.len(), <[u8]>::len);
        let budget = ram_size.saturating_sub(size_of::<CpuState>() + dtb_len);
        if rom.len() > budget {
            return Err(SetupError::RomTooLarge { rom_len: rom.len(), ram_size });
        }
        install_logger();
        Ok(Self::build(width, height, ram_size, rom, dtb, font_bitmap, font_width, font_height, cmdline))
    }

    fn build(
        width: usize,
        height: usize,
        ram_size: usize,
        rom: &[u8],
        dtb: Option<&[u8]>,
        font_bitmap: Vec<u8>,
        font_width: usize,
        font_height: usize,
        cmdline: Option<&str>,
    ) -> Session {
        let dtb_bytes: &[u8] = dtb.unwrap_or(&ram::DEFAULT_DTB);
        let min_size = size_of::<CpuState>() + dtb_bytes.len();
        let ram_size = ram_size.max(min_size);
        let mut ram = RamImage::new(ram_size);

        let rom_budget = ram.dtb_offset(dtb_bytes.len());
        let rom_len = rom.len().min(rom_budget);
        if rom.len() > rom_budget {
            log::warn!("setup: kernel image ({} bytes) truncated to fit {}-byte RAM", rom.len(), ram_size);
        }
        ram.splice_at(0, &rom[..rom_len]);

        let dtb_offset = ram.dtb_offset(dtb_bytes.len());
        ram.splice_at(dtb_offset, dtb_bytes);
        patch_dtb_ramsize(&mut ram, dtb_offset);
        if let Some(cmdline) = cmdline {
            write_cmdline(&mut ram, dtb_offset, cmdline);
        }

        let mut state = CpuState::new();
        state.pc = ram::IMAGE_OFFSET;
        state.set_reg(10, 0); // hart ID
        state.set_reg(11, ram::IMAGE_OFFSET + dtb_offset as u32); // dtb pointer

        log::debug!("setup complete, ram checksum {:#04x}", ram.checksum());

        Session {
            ram,
            state,
            uart: Uart::new(),
            terminal: Terminal::new(),
            font: FontAtlas::new(font_bitmap, font_width, font_height),
            width,
            height,
            first_step: true,
        }
    }

    /// Advance the guest by up to the fixed per-call instruction budget,
    /// rendering into `fb_rgba` and draining bytes from `kb_buffer[..kb_len]`.
    pub fn step(&mut self, fb_rgba: &mut [u8], kb_buffer: &mut [u8], kb_len: usize) -> StepResult {
        let mut kb_len = kb_len;

        if self.first_step {
            let mut fb = FramebufferView { buffer: &mut *fb_rgba, width: self.width, height: self.height, font: &self.font };
            fb.clear_screen();
            self.first_step = false;
        }

        let mut status = cpu::status::NORMAL;
        let mut remaining = TOTAL_BUDGET;
        while remaining > 0 {
            let chunk = remaining.min(INNER_BUDGET);
            let mut devices = Devices {
                uart: &mut self.uart,
                terminal: &mut self.terminal,
                kb: KeyboardQueue::new(&mut *kb_buffer, &mut kb_len),
                fb: FramebufferView { buffer: &mut *fb_rgba, width: self.width, height: self.height, font: &self.font },
            };
            let (s, retired) = cpu::run_budget(&mut self.state, &mut self.ram, &mut devices, chunk);
            status = s;
            remaining -= retired.max(1).min(remaining);
            if s != cpu::status::NORMAL {
                break;
            }
        }

        let mut fb = FramebufferView { buffer: &mut *fb_rgba, width: self.width, height: self.height, font: &self.font };
        self.terminal.draw_cursor(&mut fb);

        StepResult { status, new_kb_len: kb_len }
    }

    /// Read-only access to the register/CSR file, for an embedder's own
    /// debug overlay (see `Debugger` in the demo binary).
    pub fn cpu_state(&self) -> &CpuState {
        &self.state
    }

    pub fn cleanup(self) {
        log::info!("session cleanup");
    }
}

fn patch_dtb_ramsize(ram: &mut RamImage, dtb_offset: usize) {
    let word_offset = dtb_offset + ram::DTB_RAMSIZE_OFFSET;
    let bytes = ram.as_slice();
    let current = u32::from_le_bytes([
        bytes[word_offset],
        bytes[word_offset + 1],
        bytes[word_offset + 2],
        bytes[word_offset + 3],
    ]);
    if current != ram::DTB_RAMSIZE_SENTINEL {
        log::debug!("dtb ramsize sentinel not found; skipping patch (supplied a non-default dtb)");
        return;
    }
    let patched = (dtb_offset as u32).to_be_bytes();
    ram.as_mut_slice()[word_offset..word_offset + 4].copy_from_slice(&patched);
}

fn write_cmdline(ram: &mut RamImage, dtb_offset: usize, cmdline: &str) {
    let max = ram::DTB_CMDLINE_MAX;
    let bytes = cmdline.as_bytes();
    let len = bytes.len().min(max);
    let dest = dtb_offset + ram::DTB_CMDLINE_OFFSET;
    ram.as_mut_slice()[dest..dest + len].copy_from_slice(&bytes[..len]);
    ram.as_mut_slice()[dest + len] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_at(ram: &RamImage, offset: usize) -> u32 {
        let bytes = ram.as_slice();
        u32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
    }

    #[test]
    fn patch_dtb_ramsize_writes_the_big_endian_offset_when_the_sentinel_is_present() {
        let mut ram = RamImage::new(0x2000);
        let dtb_offset = 0x100;
        let word_offset = dtb_offset + ram::DTB_RAMSIZE_OFFSET;
        ram.as_mut_slice()[word_offset..word_offset + 4].copy_from_slice(&ram::DTB_RAMSIZE_SENTINEL.to_le_bytes());

        patch_dtb_ramsize(&mut ram, dtb_offset);

        assert_eq!(word_at(&ram, word_offset), dtb_offset as u32);
    }

    #[test]
    fn patch_dtb_ramsize_leaves_a_foreign_dtb_alone() {
        let mut ram = RamImage::new(0x2000);
        let dtb_offset = 0x100;
        let word_offset = dtb_offset + ram::DTB_RAMSIZE_OFFSET;
        ram.as_mut_slice()[word_offset..word_offset + 4].copy_from_slice(&[0xAA; 4]);

        patch_dtb_ramsize(&mut ram, dtb_offset);

        assert_eq!(&ram.as_slice()[word_offset..word_offset + 4], &[0xAA; 4]);
    }

    #[test]
    fn write_cmdline_nul_terminates_and_truncates_to_the_field_width() {
        let mut ram = RamImage::new(0x2000);
        let dtb_offset = 0x100;
        let long = "a".repeat(ram::DTB_CMDLINE_MAX + 20);

        write_cmdline(&mut ram, dtb_offset, &long);

        let dest = dtb_offset + ram::DTB_CMDLINE_OFFSET;
        let bytes = ram.as_slice();
        assert_eq!(&bytes[dest..dest + ram::DTB_CMDLINE_MAX], vec![b'a'; ram::DTB_CMDLINE_MAX].as_slice());
        assert_eq!(bytes[dest + ram::DTB_CMDLINE_MAX], 0);
    }

    #[test]
    fn default_dtb_carries_the_ramsize_sentinel() {
        let bytes = &ram::DEFAULT_DTB[ram::DTB_RAMSIZE_OFFSET..ram::DTB_RAMSIZE_OFFSET + 4];
        assert_eq!(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), ram::DTB_RAMSIZE_SENTINEL);
    }
}

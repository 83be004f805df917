// Shared instruction-encoding helpers and a minimal `Devices` rig for the
// integration tests. Kept separate from any one test file the same way the
// teacher keeps its `TestDevice` harness alongside (not inside) the cases
// that use it.

use rv32ima_term::framebuffer::{FontAtlas, FramebufferView};
use rv32ima_term::mmio::Devices;
use rv32ima_term::ram::RamImage;
use rv32ima_term::terminal::Terminal;
use rv32ima_term::uart::{KeyboardQueue, Uart};

pub const OP_LUI: u32 = 0x37;
pub const OP_LOAD: u32 = 0x03;
pub const OP_IMM: u32 = 0x13;
pub const OP_ALU: u32 = 0x33;
pub const OP_STORE: u32 = 0x23;
pub const OP_SYSTEM: u32 = 0x73;

pub fn encode_u(opcode: u32, rd: u32, imm: u32) -> u32 {
    (imm & 0xFFFF_F000) | (rd << 7) | opcode
}

pub fn encode_i(opcode: u32, rd: u32, funct3: u32, rs1: u32, imm: i32) -> u32 {
    ((imm as u32) << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn encode_r(opcode: u32, rd: u32, funct3: u32, rs1: u32, rs2: u32, funct7: u32) -> u32 {
    (funct7 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (rd << 7) | opcode
}

pub fn encode_s(rs1: u32, rs2: u32, funct3: u32, imm: i32) -> u32 {
    let imm = imm as u32;
    let imm4_0 = imm & 0x1F;
    let imm11_5 = (imm >> 5) & 0x7F;
    (imm11_5 << 25) | (rs2 << 20) | (rs1 << 15) | (funct3 << 12) | (imm4_0 << 7) | OP_STORE
}

/// Write a little-endian instruction stream starting at the guest's reset
/// vector (`ram::IMAGE_OFFSET`).
pub fn write_program(ram: &mut RamImage, words: &[u32]) {
    for (i, &word) in words.iter().enumerate() {
        ram.write_u32(rv32ima_term::ram::IMAGE_OFFSET + (i as u32) * 4, word);
    }
}

/// A font atlas laid out like a 16x16 CP437 sheet, with exactly one lit
/// pixel: the top-left corner of glyph `lit_glyph`. Lets a test confirm a
/// specific glyph was actually blitted without decoding the whole sheet.
pub fn single_pixel_font(lit_glyph: u8) -> FontAtlas {
    use rv32ima_term::framebuffer::{CHAR_HEIGHT, CHAR_WIDTH};
    let cols = 16;
    let width = cols * CHAR_WIDTH;
    let height = 16 * CHAR_HEIGHT;
    let mut data = vec![0u8; width * height];
    let col = lit_glyph as usize % cols;
    let row = lit_glyph as usize / cols;
    data[row * CHAR_HEIGHT * width + col * CHAR_WIDTH] = 255;
    FontAtlas::new(data, width, height)
}

/// Flatten an instruction word stream into the raw little-endian bytes a
/// `Session::setup` ROM argument expects.
pub fn assemble(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

pub fn blank_font() -> FontAtlas {
    use rv32ima_term::framebuffer::{CHAR_HEIGHT, CHAR_WIDTH};
    let width = 16 * CHAR_WIDTH;
    let height = 16 * CHAR_HEIGHT;
    FontAtlas::new(vec![0u8; width * height], width, height)
}

pub struct Harness {
    pub uart: Uart,
    pub terminal: Terminal,
    pub kb_buf: Vec<u8>,
    pub kb_len: usize,
    pub fb_buf: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub font: FontAtlas,
}

impl Harness {
    pub fn new(width: usize, height: usize, font: FontAtlas) -> Self {
        Harness {
            uart: Uart::new(),
            terminal: Terminal::new(),
            kb_buf: vec![0u8; 64],
            kb_len: 0,
            fb_buf: vec![0u8; width * height * 4],
            width,
            height,
            font,
        }
    }

    pub fn devices(&mut self) -> Devices<'_> {
        Devices {
            uart: &mut self.uart,
            terminal: &mut self.terminal,
            kb: KeyboardQueue::new(&mut self.kb_buf, &mut self.kb_len),
            fb: FramebufferView { buffer: &mut self.fb_buf, width: self.width, height: self.height, font: &self.font },
        }
    }
}

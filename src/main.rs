use std::fs;
use std::path::PathBuf;

use clap::Parser;
use minifb::{Key, Window, WindowOptions};
use rv32ima_term::debugger::Debugger;
use rv32ima_term::framebuffer::{CHAR_HEIGHT, CHAR_WIDTH};
use rv32ima_term::ram::DEFAULT_RAM_SIZE;
use rv32ima_term::Session;

const SCREEN_COLS: usize = 80;
const SCREEN_ROWS: usize = 25;

#[derive(Parser)]
#[command(about = "Boot a Linux kernel under a tiny embedded RV32IMA interpreter")]
struct Args {
    /// Raw kernel image (flat binary, linked to run at 0x8000_0000)
    kernel: PathBuf,

    /// Device tree blob; a built-in default is used if omitted
    #[arg(long)]
    dtb: Option<PathBuf>,

    /// Grayscale CP437 font atlas; a blank placeholder is used if omitted
    #[arg(long)]
    font: Option<PathBuf>,

    /// Font atlas width in pixels (ignored without --font)
    #[arg(long, default_value_t = 16 * CHAR_WIDTH)]
    font_width: usize,

    /// Font atlas height in pixels (ignored without --font)
    #[arg(long, default_value_t = 16 * CHAR_HEIGHT)]
    font_height: usize,

    /// Guest RAM size in bytes
    #[arg(long, default_value_t = DEFAULT_RAM_SIZE)]
    ram_size: usize,

    /// Window scale factor
    #[arg(long, default_value_t = 2)]
    scale: usize,

    /// Kernel command line passed via the DTB
    #[arg(long)]
    cmdline: Option<String>,

    /// Print a register dump to the terminal after every step
    #[arg(long)]
    debug: bool,
}

fn blank_font(width: usize, height: usize) -> Vec<u8> {
    vec![0u8; width * height]
}

fn scale_option(scale: usize) -> minifb::Scale {
    match scale {
        1 => minifb::Scale::X1,
        2 => minifb::Scale::X2,
        4 => minifb::Scale::X4,
        8 => minifb::Scale::X8,
        16 => minifb::Scale::X16,
        32 => minifb::Scale::X32,
        other => {
            log::warn!("unsupported --scale {other}; falling back to X2");
            minifb::Scale::X2
        }
    }
}

fn rgba_to_argb(rgba: &[u8], out: &mut [u32]) {
    for (px, word) in rgba.chunks_exact(4).zip(out.iter_mut()) {
        *word = ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32;
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let width = SCREEN_COLS * CHAR_WIDTH;
    let height = SCREEN_ROWS * CHAR_HEIGHT;

    let kernel = fs::read(&args.kernel).unwrap_or_else(|e| {
        log::error!("failed to read kernel image {}: {e}", args.kernel.display());
        Vec::new()
    });
    let dtb = args.dtb.as_ref().map(|path| {
        fs::read(path).unwrap_or_else(|e| {
            log::error!("failed to read dtb {}: {e}", path.display());
            Vec::new()
        })
    });
    let (font_bitmap, font_width, font_height) = match &args.font {
        Some(path) => match fs::read(path) {
            Ok(bytes) => (bytes, args.font_width, args.font_height),
            Err(e) => {
                log::error!("failed to read font {}: {e}; falling back to a blank atlas", path.display());
                (blank_font(args.font_width, args.font_height), args.font_width, args.font_height)
            }
        },
        None => {
            log::warn!("no --font supplied; glyphs will render blank");
            (blank_font(args.font_width, args.font_height), args.font_width, args.font_height)
        }
    };

    let mut session = Session::setup(
        width,
        height,
        args.ram_size,
        &kernel,
        dtb.as_deref(),
        font_bitmap,
        font_width,
        font_height,
        args.cmdline.as_deref(),
    );

    let mut window = Window::new(
        "rv32ima-term",
        width,
        height,
        WindowOptions { scale: scale_option(args.scale), ..WindowOptions::default() },
    )
    .unwrap_or_else(|e| panic!("failed to open window: {e}"));

    let mut rgba = vec![0u8; width * height * 4];
    let mut argb = vec![0u32; width * height];
    let mut kb_buffer = vec![0u8; 1024];
    let mut kb_len = 0usize;
    let mut debugger = Debugger::new();

    while window.is_open() && !window.is_key_down(Key::Escape) {
        for key in window.get_keys_released() {
            if let Some(byte) = key_to_byte(key) {
                if kb_len < kb_buffer.len() {
                    kb_buffer[kb_len] = byte;
                    kb_len += 1;
                }
            }
        }

        let result = session.step(&mut rgba, &mut kb_buffer, kb_len);
        kb_len = result.new_kb_len;

        match result.status {
            0 | 1 | 3 => {}
            0x7777 => log::info!("guest requested restart"),
            0x5555 => {
                log::info!("guest powered off");
                break;
            }
            other => log::warn!("guest faulted with status {:#x}", other),
        }

        rgba_to_argb(&rgba, &mut argb);
        window.update_with_buffer(&argb, width, height).expect("failed to blit frame");

        if args.debug {
            debugger.dump(session.cpu_state());
        }
    }
}

fn key_to_byte(key: Key) -> Option<u8> {
    match key {
        Key::Enter => Some(b'\r'),
        Key::Backspace => Some(0x08),
        Key::Space => Some(b' '),
        Key::Tab => Some(b'\t'),
        Key::A => Some(b'a'),
        Key::B => Some(b'b'),
        Key::C => Some(b'c'),
        Key::D => Some(b'd'),
        Key::E => Some(b'e'),
        Key::F => Some(b'f'),
        Key::G => Some(b'g'),
        Key::H => Some(b'h'),
        Key::I => Some(b'i'),
        Key::J => Some(b'j'),
        Key::K => Some(b'k'),
        Key::L => Some(b'l'),
        Key::M => Some(b'm'),
        Key::N => Some(b'n'),
        Key::O => Some(b'o'),
        Key::P => Some(b'p'),
        Key::Q => Some(b'q'),
        Key::R => Some(b'r'),
        Key::S => Some(b's'),
        Key::T => Some(b't'),
        Key::U => Some(b'u'),
        Key::V => Some(b'v'),
        Key::W => Some(b'w'),
        Key::X => Some(b'x'),
        Key::Y => Some(b'y'),
        Key::Z => Some(b'z'),
        Key::Key0 => Some(b'0'),
        Key::Key1 => Some(b'1'),
        Key::Key2 => Some(b'2'),
        Key::Key3 => Some(b'3'),
        Key::Key4 => Some(b'4'),
        Key::Key5 => Some(b'5'),
        Key::Key6 => Some(b'6'),
        Key::Key7 => Some(b'7'),
        Key::Key8 => Some(b'8'),
        Key::Key9 => Some(b'9'),
        _ => None,
    }
}

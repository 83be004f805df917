// VT100/VT52-flavoured escape sequence parser driving the framebuffer.
//
// The parser is a small explicit state machine, one state per partially
// recognised escape sequence, matching the style of the teacher's own
// `parser.rs` (tag-dispatch over enum variants rather than a regex or
// table-driven approach).

use crate::framebuffer::{FramebufferView, CHAR_HEIGHT, CHAR_WIDTH, CURSOR_GLYPH};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Normal,
    Esc,
    EscBracket,
    EscOpenParen,
    EscCloseParen,
    EscPound,
    EscFive,
    EscSix,
    EscBracketNum,
    EscBracketNumSemi,
    EscBracketNumSemiNum,
    EscBracketQuestion,
    EscBracketQuestionNum,
    EscBracketSemi,
}

pub struct Terminal {
    pub cursor_x: i32,
    pub cursor_y: i32,
    backup_x: i32,
    backup_y: i32,
    state: State,
    num_a: u32,
    num_b: u32,
    /// Frame counter driving the cursor blink; wraps every 60 frames.
    blink_phase: u32,
}

impl Terminal {
    pub fn new() -> Self {
        Terminal {
            cursor_x: 0,
            cursor_y: 0,
            backup_x: 0,
            backup_y: 0,
            state: State::Normal,
            num_a: 0,
            num_b: 0,
            blink_phase: 0,
        }
    }

    fn clamp_cursor(&mut self, fb: &FramebufferView) {
        let max_x = (fb.width.saturating_sub(CHAR_WIDTH)) as i32;
        let max_y = (fb.height.saturating_sub(CHAR_HEIGHT)) as i32;
        self.cursor_x = self.cursor_x.clamp(0, max_x);
        self.cursor_y = self.cursor_y.clamp(0, max_y);
    }

    fn home(&mut self) {
        self.cursor_x = 0;
        self.cursor_y = 0;
    }

    fn scroll_up(&mut self, fb: &mut FramebufferView, n: i32) {
        fb.scroll_up(n as usize);
        self.cursor_y -= n * CHAR_HEIGHT as i32;
        self.clamp_cursor(fb);
    }

    // `cursor_y` is deliberately left untouched here: the upstream behaviour
    // this mirrors does not adjust it on a reverse scroll, unlike `scroll_up`.
    fn scroll_down(&mut self, fb: &mut FramebufferView, n: i32) {
        fb.scroll_down(n as usize);
    }

    fn newline(&mut self, fb: &mut FramebufferView) {
        self.cursor_x = 0;
        self.cursor_y += CHAR_HEIGHT as i32;
        if self.cursor_y + (CHAR_HEIGHT as i32) > fb.height as i32 {
            self.scroll_up(fb, 1);
        }
    }

    fn draw_and_advance(&mut self, byte: u8, fb: &mut FramebufferView) {
        fb.draw_char(self.cursor_x as usize, self.cursor_y as usize, byte);
        self.cursor_x += CHAR_WIDTH as i32;
        if self.cursor_x + (CHAR_WIDTH as i32) > fb.width as i32 {
            self.cursor_x = 0;
            self.cursor_y += CHAR_HEIGHT as i32;
            if self.cursor_y + (CHAR_HEIGHT as i32) > fb.height as i32 {
                self.scroll_up(fb, 1);
            }
        }
    }

    /// Feed one byte from the UART (or a debug-CSR print helper) through the
    /// parser, mutating cursor state and drawing into `fb` as needed.
    pub fn feed_byte(&mut self, byte: u8, fb: &mut FramebufferView) {
        match self.state {
            State::Normal => match byte {
                0x1B => self.state = State::Esc,
                b'\n' | b'\r' => self.newline(fb),
                0x08 => {
                    self.cursor_x = (self.cursor_x - CHAR_WIDTH as i32).max(0);
                }
                0x07 => {}
                _ => self.draw_and_advance(byte, fb),
            },
            State::Esc => self.feed_esc(byte, fb),
            State::EscBracket => self.feed_esc_bracket(byte, fb),
            State::EscOpenParen | State::EscCloseParen | State::EscPound | State::EscFive | State::EscSix => {
                self.state = State::Normal;
            }
            State::EscBracketNum => self.feed_esc_bracket_num(byte, fb),
            State::EscBracketNumSemi => {
                if byte.is_ascii_digit() {
                    self.num_b = (byte - b'0') as u32;
                    self.state = State::EscBracketNumSemiNum;
                } else {
                    self.num_b = 0;
                    self.finish_num_semi(byte, fb);
                }
            }
            State::EscBracketNumSemiNum => {
                if byte.is_ascii_digit() {
                    self.num_b = self.num_b * 10 + (byte - b'0') as u32;
                } else {
                    self.finish_num_semi(byte, fb);
                }
            }
            State::EscBracketQuestion => {
                if byte.is_ascii_digit() {
                    self.num_a = (byte - b'0') as u32;
                    self.state = State::EscBracketQuestionNum;
                } else {
                    self.state = State::Normal;
                }
            }
            State::EscBracketQuestionNum => {
                if byte.is_ascii_digit() {
                    self.num_a = self.num_a * 10 + (byte - b'0') as u32;
                } else {
                    // DEC private mode set/reset (cursor blink, origin mode, ...):
                    // tracked by neither the guest's visible state nor this
                    // parser's invariants, so both `h` and `l` are no-ops.
                    self.state = State::Normal;
                }
            }
            State::EscBracketSemi => {
                if byte == b'H' || byte == b'f' {
                    self.home();
                }
                self.state = State::Normal;
            }
        }
    }

    fn feed_esc(&mut self, byte: u8, fb: &mut FramebufferView) {
        self.state = State::Normal;
        match byte {
            b'[' => self.state = State::EscBracket,
            b'(' => self.state = State::EscOpenParen,
            b')' => self.state = State::EscCloseParen,
            b'#' => self.state = State::EscPound,
            b'5' => self.state = State::EscFive,
            b'6' => self.state = State::EscSix,
            b'D' | b'E' => self.scroll_up(fb, 1),
            b'M' => self.scroll_down(fb, 1),
            b'7' => {
                self.backup_x = self.cursor_x;
                self.backup_y = self.cursor_y;
            }
            b'8' => {
                self.cursor_x = self.backup_x;
                self.cursor_y = self.backup_y;
            }
            b'c' => {
                fb.clear_screen();
                self.home();
                self.backup_x = 0;
                self.backup_y = 0;
            }
            _ => {}
        }
    }

    fn feed_esc_bracket(&mut self, byte: u8, fb: &mut FramebufferView) {
        match byte {
            b'?' => self.state = State::EscBracketQuestion,
            b';' => self.state = State::EscBracketSemi,
            b'H' | b'f' => {
                self.home();
                self.state = State::Normal;
            }
            // Bare K/J (no numeric prefix) are equivalent to ESC[0K / ESC[0J.
            b'K' => {
                fb.clear_from_cursor_right(self.cursor_x as usize, self.cursor_y as usize);
                self.state = State::Normal;
            }
            b'J' => {
                fb.clear_from_cursor_down(self.cursor_y as usize);
                self.state = State::Normal;
            }
            b'm' | b'g' | b'c' => self.state = State::Normal,
            b'0'..=b'9' => {
                self.num_a = (byte - b'0') as u32;
                self.state = State::EscBracketNum;
            }
            _ => self.state = State::Normal,
        }
    }

    fn feed_esc_bracket_num(&mut self, byte: u8, fb: &mut FramebufferView) {
        match byte {
            b'0'..=b'9' => self.num_a = self.num_a * 10 + (byte - b'0') as u32,
            b'A' => {
                self.cursor_y -= self.num_a as i32 * CHAR_HEIGHT as i32;
                self.clamp_cursor(fb);
                self.finish_num(fb);
            }
            b'B' => {
                self.cursor_y += self.num_a as i32 * CHAR_HEIGHT as i32;
                self.clamp_cursor(fb);
                self.finish_num(fb);
            }
            b'C' => {
                self.cursor_x += self.num_a as i32 * CHAR_WIDTH as i32;
                self.clamp_cursor(fb);
                self.finish_num(fb);
            }
            b'D' => {
                self.cursor_x -= self.num_a as i32 * CHAR_WIDTH as i32;
                self.clamp_cursor(fb);
                self.finish_num(fb);
            }
            b'K' => {
                match self.num_a {
                    0 => fb.clear_from_cursor_right(self.cursor_x as usize, self.cursor_y as usize),
                    1 => fb.clear_from_cursor_left(self.cursor_x as usize, self.cursor_y as usize),
                    2 => fb.clear_line(self.cursor_y as usize),
                    _ => {}
                }
                self.finish_num(fb);
            }
            b'J' => {
                match self.num_a {
                    0 => fb.clear_from_cursor_down(self.cursor_y as usize),
                    1 => fb.clear_from_cursor_up(self.cursor_y as usize),
                    2 => fb.clear_screen(),
                    _ => {}
                }
                self.finish_num(fb);
            }
            b'm' | b'g' | b'q' | b'h' | b'l' | b'c' => self.finish_num(fb),
            b';' => {
                self.num_b = 0;
                self.state = State::EscBracketNumSemi;
            }
            _ => self.state = State::Normal,
        }
    }

    fn finish_num(&mut self, _fb: &mut FramebufferView) {
        self.num_a = 0;
        self.state = State::Normal;
    }

    fn finish_num_semi(&mut self, byte: u8, fb: &mut FramebufferView) {
        match byte {
            b'H' | b'f' => {
                self.cursor_y = self.num_a as i32 * CHAR_HEIGHT as i32;
                self.cursor_x = self.num_b as i32 * CHAR_WIDTH as i32;
                self.clamp_cursor(fb);
            }
            b'r' | b'y' => {}
            _ => {}
        }
        self.num_a = 0;
        self.num_b = 0;
        self.state = State::Normal;
    }

    /// Advance the cursor blink phase by one frame and draw the cursor cell.
    /// Called once per `Session::step`, after all UART bytes for the step
    /// have been fed through the parser.
    pub fn draw_cursor(&mut self, fb: &mut FramebufferView) {
        self.blink_phase = (self.blink_phase + 1) % 60;
        let glyph = if self.blink_phase < 30 { CURSOR_GLYPH } else { b' ' };
        fb.draw_char(self.cursor_x as usize, self.cursor_y as usize, glyph);
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

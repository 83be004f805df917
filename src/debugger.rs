// A minimal termion-based register dump, in the spirit of the teacher's
// own box-drawing `Debugger`/`CPU: Display` TUI, scaled down to RV32's
// flatter register file and with no disassembler (this core has none).

use std::io::{stdout, Write};

use termion::{clear, cursor};

use crate::cpustate::CpuState;

pub struct Debugger {
    frame: u64,
}

impl Debugger {
    pub fn new() -> Self {
        Debugger { frame: 0 }
    }

    /// Render one register snapshot to the terminal. Called once per
    /// `Session::step` when the demo binary is launched with `--debug`.
    pub fn dump(&mut self, state: &CpuState) {
        self.frame += 1;
        let mut out = String::new();
        out.push_str(&format!("{}{}step {}\n", clear::All, cursor::Goto(1, 1), self.frame));
        out.push_str(&format!("pc  {:08x}   mstatus {:08x}   mcause {:08x}\n", state.pc, state.mstatus, state.mcause));
        out.push_str(&format!("mepc {:08x}   mtval {:08x}   priv {:?}\n", state.mepc, state.mtval, state.privilege()));
        for row in 0..8 {
            out.push_str("  ");
            for col in 0..4 {
                let idx = row * 4 + col;
                out.push_str(&format!("x{:<2}={:08x} ", idx, state.reg(idx)));
            }
            out.push('\n');
        }
        let mut stdout = stdout();
        let _ = write!(stdout, "{}", out);
        let _ = stdout.flush();
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}
